use crate::api::{
    email::EmailSender,
    handlers::{
        auth::{
            self, resolve_session, spawn_session_sweep, AuthConfig, AuthState, LoginFlow,
            PgSessionStore, PgUserDirectory, SessionManager, SystemClock, SESSION_SWEEP_INTERVAL,
        },
        health, products, root, websocket,
    },
};
use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    middleware,
    routing::{get, post},
    Extension, Router,
};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer, request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use url::Url;
use utoipa_swagger_ui::SwaggerUi;

pub mod database;
pub mod email;
pub mod handlers;
mod openapi;

pub use openapi::openapi;

/// Start the server
/// # Errors
/// Return error if the database is unreachable, the schema or catalog seed
/// fails, or the listener cannot be bound
pub async fn new(
    port: u16,
    dsn: String,
    auth_config: AuthConfig,
    sender: Arc<dyn EmailSender>,
) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    database::apply_schema(&pool).await?;

    let seeded = products::seed_catalog(&pool).await?;
    if seeded > 0 {
        info!("Seeded catalog with {seeded} products");
    }

    let users = Arc::new(PgUserDirectory::new(pool.clone()));
    let sessions = Arc::new(PgSessionStore::new(
        pool.clone(),
        auth_config.session_ttl_seconds(),
    ));
    let flow = LoginFlow::new(
        &auth_config,
        Arc::new(SystemClock),
        sender,
        users,
        sessions.clone(),
    );
    let sweep = spawn_session_sweep(sessions.clone(), SESSION_SWEEP_INTERVAL);
    let manager = SessionManager::new(sessions, &auth_config);
    let auth_state = Arc::new(AuthState::new(auth_config, flow, manager));

    let app = app(pool, auth_state)?;

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {err}");
            }
            info!("Gracefully shutdown");
        })
        .await?;

    sweep.abort();

    Ok(())
}

/// Build the application router.
///
/// Routes that work with the visitor's session run behind
/// [`resolve_session`]; `/health`, `/websocket` and the API docs do not
/// create sessions.
/// # Errors
/// Return error if the configured frontend base URL is not a valid origin
pub fn app(pool: PgPool, auth_state: Arc<AuthState>) -> Result<Router> {
    let origin = frontend_origin(auth_state.config().frontend_base_url())?;

    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_headers([
            CONTENT_TYPE,
            ACCEPT,
            AUTHORIZATION,
            HeaderName::from_static("x-csrf-token"),
        ])
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ]);

    let session_routes = Router::new()
        .route("/", get(root::root))
        .route("/login", post(auth::login::login))
        .route("/verify-otp", post(auth::login::verify_otp))
        .route("/profile", get(auth::session::profile))
        .route(
            "/logout",
            get(auth::session::logout).post(auth::session::logout),
        )
        .route("/product", post(products::create_product))
        .route("/products", get(products::list_products))
        .route(
            "/product/:id",
            get(products::get_product)
                .put(products::update_product)
                .delete(products::delete_product),
        )
        .layer(middleware::from_fn_with_state(
            auth_state.sessions().clone(),
            resolve_session,
        ));

    let app = Router::new()
        .merge(session_routes)
        .route("/health", get(health::health).options(health::health))
        .route("/websocket", get(websocket::websocket))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(auth_state))
                .layer(Extension(pool)),
        );

    Ok(app)
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

// CORS compares the `Origin` header verbatim, so drop any path or trailing slash.
fn frontend_origin(base_url: &str) -> Result<HeaderValue> {
    let url = Url::parse(base_url).with_context(|| format!("Invalid frontend URL: {base_url}"))?;
    let origin = url.origin();
    if !origin.is_tuple() {
        return Err(anyhow!("Frontend URL has no origin: {base_url}"));
    }
    HeaderValue::from_str(&origin.ascii_serialization()).context("Invalid frontend origin")
}
