//! Cookie-backed sessions.
//!
//! Every request that reaches the catalog or login routes carries a session.
//! Visitors without a valid cookie get a fresh **guest** session; a successful
//! login binds the session to a user and rotates its token. Only a SHA-256
//! hash of the token is stored in `user_sessions`.
//!
//! Expired rows are ignored on lookup and deleted by a periodic sweep
//! ([`spawn_session_sweep`]).

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use axum::{
    extract::{Extension, Request, State},
    http::{
        header::{InvalidHeaderValue, AUTHORIZATION, COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sqlx::{PgPool, Row};
use std::{sync::Arc, time::Duration};
use tokio::{
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use super::{
    state::{AuthConfig, AuthState},
    types::ApiResponse,
    utils::{generate_session_token, hash_session_token},
};
use crate::api::handlers::is_unique_violation;

pub const SESSION_COOKIE_NAME: &str = "kaffino_session";

pub const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Who the current session belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionIdentity {
    Guest { guest_id: Uuid },
    Authenticated { user_id: Uuid, username: String },
}

impl SessionIdentity {
    #[must_use]
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Self::Guest { .. } => None,
            Self::Authenticated { user_id, .. } => Some(*user_id),
        }
    }
}

/// Request extension inserted by [`resolve_session`].
#[derive(Clone, Debug)]
pub struct CurrentSession {
    pub token: String,
    pub identity: SessionIdentity,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Identity for a live session token, `None` if unknown or expired.
    async fn load(&self, token: &str) -> Result<Option<SessionIdentity>>;
    async fn start_guest(&self) -> Result<CurrentSession>;
    /// Attach `user_id` to the session and return its replacement token.
    async fn bind(&self, token: &str, user_id: Uuid, username: &str) -> Result<String>;
    async fn destroy(&self, token: &str) -> Result<()>;
    /// Delete expired sessions and return how many were removed.
    async fn purge_expired(&self) -> Result<u64>;
}

#[derive(Clone, Debug)]
pub struct PgSessionStore {
    pool: PgPool,
    ttl_seconds: i64,
}

impl PgSessionStore {
    #[must_use]
    pub fn new(pool: PgPool, ttl_seconds: i64) -> Self {
        Self { pool, ttl_seconds }
    }

    async fn insert_session(
        &self,
        user_id: Option<Uuid>,
        username: Option<&str>,
    ) -> Result<(String, Uuid)> {
        let query = r"
            INSERT INTO user_sessions (session_hash, user_id, username, expires_at)
            VALUES ($1, $2, $3, NOW() + ($4 * INTERVAL '1 second'))
            RETURNING id
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );

        for _ in 0..3 {
            let token = generate_session_token()?;
            let result = sqlx::query(query)
                .bind(hash_session_token(&token))
                .bind(user_id)
                .bind(username)
                .bind(self.ttl_seconds)
                .fetch_one(&self.pool)
                .instrument(span.clone())
                .await;

            match result {
                Ok(row) => return Ok((token, row.get("id"))),
                Err(err) if is_unique_violation(&err) => {}
                Err(err) => return Err(err).context("failed to insert session"),
            }
        }

        Err(anyhow!("failed to generate unique session token"))
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn load(&self, token: &str) -> Result<Option<SessionIdentity>> {
        let query = r"
            SELECT id, user_id, username
            FROM user_sessions
            WHERE session_hash = $1
              AND expires_at > NOW()
            LIMIT 1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(hash_session_token(token))
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup session")?;

        Ok(row.map(|row| match row.get::<Option<Uuid>, _>("user_id") {
            Some(user_id) => SessionIdentity::Authenticated {
                user_id,
                username: row
                    .get::<Option<String>, _>("username")
                    .unwrap_or_default(),
            },
            None => SessionIdentity::Guest {
                guest_id: row.get("id"),
            },
        }))
    }

    async fn start_guest(&self) -> Result<CurrentSession> {
        let (token, guest_id) = self.insert_session(None, None).await?;
        Ok(CurrentSession {
            token,
            identity: SessionIdentity::Guest { guest_id },
        })
    }

    async fn bind(&self, token: &str, user_id: Uuid, username: &str) -> Result<String> {
        // Rotate the token so a pre-login cookie cannot ride the new identity.
        let query = r"
            UPDATE user_sessions
            SET session_hash = $1,
                user_id = $2,
                username = $3,
                expires_at = NOW() + ($4 * INTERVAL '1 second')
            WHERE session_hash = $5
              AND expires_at > NOW()
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let new_token = generate_session_token()?;
        let result = sqlx::query(query)
            .bind(hash_session_token(&new_token))
            .bind(user_id)
            .bind(username)
            .bind(self.ttl_seconds)
            .bind(hash_session_token(token))
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to bind session")?;

        if result.rows_affected() > 0 {
            return Ok(new_token);
        }

        // The guest row expired or was never persisted.
        debug!("session to bind not found, starting a new one");
        let (token, _) = self.insert_session(Some(user_id), Some(username)).await?;
        Ok(token)
    }

    async fn destroy(&self, token: &str) -> Result<()> {
        // Logout is idempotent; it's fine if no rows are deleted.
        let query = "DELETE FROM user_sessions WHERE session_hash = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(hash_session_token(token))
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete session")?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let query = "DELETE FROM user_sessions WHERE expires_at <= NOW()";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to purge expired sessions")?;
        Ok(result.rows_affected())
    }
}

/// Purge expired sessions every `every`, starting immediately.
///
/// Failures are logged and retried on the next tick. Abort the returned
/// handle to stop the sweep.
pub fn spawn_session_sweep(store: Arc<dyn SessionStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => info!(purged, "expired sessions removed"),
                Err(err) => error!("Failed to purge expired sessions: {err:#}"),
            }
        }
    })
}

/// Session store plus the cookie policy, shared by the middleware and handlers.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    ttl_seconds: i64,
    secure: bool,
}

impl SessionManager {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, config: &AuthConfig) -> Self {
        Self {
            store,
            ttl_seconds: config.session_ttl_seconds(),
            secure: config.session_cookie_secure(),
        }
    }

    #[must_use]
    pub fn store(&self) -> Arc<dyn SessionStore> {
        self.store.clone()
    }

    /// Build an `HttpOnly` cookie for the session token.
    ///
    /// # Errors
    /// Returns an error if the token contains characters not allowed in a header.
    pub fn session_cookie(&self, token: &str) -> Result<HeaderValue, InvalidHeaderValue> {
        let ttl_seconds = self.ttl_seconds;
        let mut cookie = format!(
            "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie)
    }

    /// Build a cookie that expires the session cookie immediately.
    ///
    /// # Errors
    /// Never in practice; the value is static apart from the `Secure` flag.
    pub fn clear_session_cookie(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        let mut cookie =
            format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
        if self.secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie)
    }
}

/// Attach a [`CurrentSession`] to the request, starting a guest session when
/// the request has none.
pub async fn resolve_session(
    State(manager): State<SessionManager>,
    mut request: Request,
    next: Next,
) -> Response {
    let existing = match extract_session_token(request.headers()) {
        Some(token) => match manager.store.load(&token).await {
            Ok(Some(identity)) => Some(CurrentSession { token, identity }),
            Ok(None) => None,
            Err(err) => {
                error!("Failed to load session: {err:#}");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        },
        None => None,
    };

    let (current, is_new) = match existing {
        Some(current) => (current, false),
        None => match manager.store.start_guest().await {
            Ok(current) => (current, true),
            Err(err) => {
                error!("Failed to start guest session: {err:#}");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        },
    };

    let token = current.token.clone();
    request.extensions_mut().insert(current);
    let mut response = next.run(request).await;

    // Handlers that rotate or clear the session set their own cookie.
    if is_new && !response.headers().contains_key(SET_COOKIE) {
        match manager.session_cookie(&token) {
            Ok(cookie) => {
                response.headers_mut().insert(SET_COOKIE, cookie);
            }
            Err(err) => error!("Failed to build session cookie: {err}"),
        }
    }

    response
}

#[utoipa::path(
    get,
    path = "/profile",
    responses(
        (status = 200, description = "Authenticated user", body = ApiResponse),
        (status = 401, description = "Guest session", body = ApiResponse)
    ),
    tag = "auth"
)]
pub async fn profile(Extension(session): Extension<CurrentSession>) -> impl IntoResponse {
    match session.identity {
        SessionIdentity::Authenticated { user_id, username } => (
            StatusCode::OK,
            Json(ApiResponse::ok(
                format!("Welcome, {username}!"),
                json!({ "userID": user_id, "username": username }),
            )),
        ),
        SessionIdentity::Guest { .. } => (
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::error("Login required")),
        ),
    }
}

#[utoipa::path(
    post,
    path = "/logout",
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth"
)]
pub async fn logout(
    Extension(session): Extension<CurrentSession>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let manager = auth_state.sessions();
    if let Err(err) = manager.store().destroy(&session.token).await {
        error!("Failed to delete session: {err:#}");
    }

    // Always clear the cookie, even if the session record was missing.
    let mut headers = HeaderMap::new();
    if let Ok(cookie) = manager.clear_session_cookie() {
        headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, headers)
}

fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    let value = headers.get(COOKIE)?.to_str().ok()?;
    value.split(';').find_map(|pair| {
        let (key, val) = pair.trim().split_once('=')?;
        (key.trim() == SESSION_COOKIE_NAME && !val.trim().is_empty())
            .then(|| val.trim().to_string())
    })
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
