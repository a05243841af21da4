#![allow(clippy::needless_for_each)]

use crate::api::handlers::{
    auth::{self, login, types},
    health,
    products::{self, types as product_types},
};
use utoipa::{
    openapi::{Contact, License},
    OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        login::login,
        login::verify_otp,
        auth::session::profile,
        auth::session::logout,
        products::create_product,
        products::list_products,
        products::get_product,
        products::update_product,
        products::delete_product,
    ),
    components(schemas(
        health::Health,
        types::ApiResponse,
        types::LoginRequest,
        types::VerifyOtpRequest,
        product_types::Product,
        product_types::ProductInput,
    )),
    tags(
        (name = "kaffino", description = "Service status"),
        (name = "auth", description = "Email OTP login and sessions"),
        (name = "products", description = "Coffee catalog")
    )
)]
struct ApiDoc;

/// The `OpenAPI` document served under `/api-docs/openapi.json`, with the
/// title, version, contact and license taken from `Cargo.toml`.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.info.title = env!("CARGO_PKG_NAME").to_string();
    doc.info.version = env!("CARGO_PKG_VERSION").to_string();
    doc.info.description = non_empty(env!("CARGO_PKG_DESCRIPTION")).map(str::to_string);
    doc.info.contact = contact(env!("CARGO_PKG_AUTHORS"));
    doc.info.license = non_empty(env!("CARGO_PKG_LICENSE")).map(|id| {
        let mut license = License::new(id);
        license.identifier = Some(id.to_string());
        license
    });
    doc
}

// Cargo joins authors with `:`; only the first one is published.
fn contact(authors: &str) -> Option<Contact> {
    let first = authors.split(':').next().and_then(non_empty)?;

    let (name, email) = match first.split_once('<') {
        Some((name, rest)) => (non_empty(name), non_empty(rest.trim_end_matches('>'))),
        None => (Some(first), None),
    };
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
