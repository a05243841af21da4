//! Catalog endpoints.
//!
//! Anyone can browse; creating, updating and deleting products requires an
//! authenticated session.

mod seed;
mod storage;
pub(crate) mod types;

pub use seed::seed_catalog;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use sqlx::PgPool;
use tracing::{error, info};
use uuid::Uuid;

use self::{
    storage::WriteOutcome,
    types::{Product, ProductInput},
};
use super::auth::CurrentSession;

fn require_login(session: &CurrentSession) -> Result<Uuid, Response> {
    session
        .identity
        .user_id()
        .ok_or_else(|| (StatusCode::UNAUTHORIZED, "Login required").into_response())
}

fn validate(payload: Option<Json<ProductInput>>) -> Result<ProductInput, Response> {
    let Some(Json(input)) = payload else {
        return Err((StatusCode::BAD_REQUEST, "Missing payload").into_response());
    };
    let input = input.normalized();
    if let Some(field) = input.missing_field() {
        return Err((StatusCode::BAD_REQUEST, format!("Missing {field}")).into_response());
    }
    Ok(input)
}

fn write_response(outcome: WriteOutcome, created: bool) -> Response {
    match outcome {
        WriteOutcome::Saved(product) => {
            let status = if created {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            (status, Json(product)).into_response()
        }
        WriteOutcome::DuplicateCode => {
            (StatusCode::CONFLICT, "Product code already exists").into_response()
        }
        WriteOutcome::NotFound => (StatusCode::NOT_FOUND, "Product not found").into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/product",
    request_body = ProductInput,
    responses(
        (status = 201, description = "Product created", body = Product),
        (status = 400, description = "Missing payload, code or title"),
        (status = 401, description = "Guest session"),
        (status = 409, description = "Product code already exists")
    ),
    tag = "products"
)]
pub async fn create_product(
    Extension(session): Extension<CurrentSession>,
    pool: Extension<PgPool>,
    payload: Option<Json<ProductInput>>,
) -> Response {
    let user_id = match require_login(&session) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };
    let input = match validate(payload) {
        Ok(input) => input,
        Err(response) => return response,
    };

    match storage::insert_product(&pool, &input).await {
        Ok(outcome) => {
            info!(%user_id, code = %input.code, "product created");
            write_response(outcome, true)
        }
        Err(err) => {
            error!("Failed to create product: {err:#}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create product").into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/products",
    responses(
        (status = 200, description = "Up to 10 products ordered by title", body = [Product])
    ),
    tag = "products"
)]
pub async fn list_products(pool: Extension<PgPool>) -> Response {
    match storage::list_products(&pool).await {
        Ok(products) => Json(products).into_response(),
        Err(err) => {
            error!("Failed to list products: {err:#}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to list products").into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/product/{id}",
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product", body = Product),
        (status = 404, description = "Product not found")
    ),
    tag = "products"
)]
pub async fn get_product(pool: Extension<PgPool>, Path(id): Path<Uuid>) -> Response {
    match storage::get_product(&pool, id).await {
        Ok(Some(product)) => Json(product).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "Product not found").into_response(),
        Err(err) => {
            error!("Failed to get product: {err:#}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to get product").into_response()
        }
    }
}

#[utoipa::path(
    put,
    path = "/product/{id}",
    params(("id" = Uuid, Path, description = "Product id")),
    request_body = ProductInput,
    responses(
        (status = 200, description = "Product updated", body = Product),
        (status = 400, description = "Missing payload, code or title"),
        (status = 401, description = "Guest session"),
        (status = 404, description = "Product not found"),
        (status = 409, description = "Product code already exists")
    ),
    tag = "products"
)]
pub async fn update_product(
    Extension(session): Extension<CurrentSession>,
    pool: Extension<PgPool>,
    Path(id): Path<Uuid>,
    payload: Option<Json<ProductInput>>,
) -> Response {
    if let Err(response) = require_login(&session) {
        return response;
    }
    let input = match validate(payload) {
        Ok(input) => input,
        Err(response) => return response,
    };

    match storage::update_product(&pool, id, &input).await {
        Ok(outcome) => write_response(outcome, false),
        Err(err) => {
            error!("Failed to update product: {err:#}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to update product").into_response()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/product/{id}",
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 204, description = "Product deleted"),
        (status = 401, description = "Guest session"),
        (status = 404, description = "Product not found")
    ),
    tag = "products"
)]
pub async fn delete_product(
    Extension(session): Extension<CurrentSession>,
    pool: Extension<PgPool>,
    Path(id): Path<Uuid>,
) -> Response {
    let user_id = match require_login(&session) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    match storage::delete_product(&pool, id).await {
        Ok(true) => {
            info!(%user_id, %id, "product deleted");
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => (StatusCode::NOT_FOUND, "Product not found").into_response(),
        Err(err) => {
            error!("Failed to delete product: {err:#}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete product").into_response()
        }
    }
}
