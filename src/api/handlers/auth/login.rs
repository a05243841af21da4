//! `POST /login` and `POST /verify-otp`.
//!
//! Wrong, expired and never-issued codes all answer `400 Invalid OTP` so the
//! response does not reveal whether a code exists for the email.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error};

use super::{
    flow::{LoginError, LoginRequested},
    lockout::format_remaining,
    session::{CurrentSession, SessionIdentity},
    state::AuthState,
    types::{ApiResponse, LoginRequest, VerifyOtpRequest},
    utils::{normalize_email, valid_email},
};

const DECODE_ERROR: &str = "Error decoding JSON body";

#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Code sent, or the session is already logged in", body = ApiResponse),
        (status = 400, description = "Invalid payload or email", body = ApiResponse),
        (status = 429, description = "Email locked after repeated failures", body = ApiResponse),
        (status = 500, description = "Code could not be generated or sent", body = ApiResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    Extension(session): Extension<CurrentSession>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, Json(ApiResponse::error(DECODE_ERROR)));
    };

    let email = normalize_email(&request.email);
    let is_guest = matches!(session.identity, SessionIdentity::Guest { .. });
    if is_guest && !valid_email(&email) {
        debug!("rejected login for malformed email");
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Invalid email address")),
        );
    }

    match auth_state.flow().request_login(&session.identity, &email).await {
        Ok(LoginRequested::AlreadyLoggedIn { user_id }) => (
            StatusCode::OK,
            Json(ApiResponse::ok(
                "Already logged in",
                json!({ "userID": user_id }),
            )),
        ),
        Ok(LoginRequested::CodeSent { email }) => (
            StatusCode::OK,
            Json(ApiResponse::ok(
                "OTP sent successfully",
                json!({ "email": email }),
            )),
        ),
        Err(err) => login_error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/verify-otp",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Login successful; the session cookie is rotated", body = ApiResponse),
        (status = 400, description = "Invalid payload or code", body = ApiResponse),
        (status = 429, description = "Email locked after repeated failures", body = ApiResponse),
        (status = 500, description = "Login could not be persisted", body = ApiResponse)
    ),
    tag = "auth"
)]
pub async fn verify_otp(
    Extension(session): Extension<CurrentSession>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyOtpRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        let (status, body) = login_error_body(StatusCode::BAD_REQUEST, DECODE_ERROR);
        return (status, HeaderMap::new(), body);
    };

    let email = normalize_email(&request.email);
    let code = request.otp.trim();

    match auth_state
        .flow()
        .verify_login(&session.token, &email, code)
        .await
    {
        Ok(verified) => {
            let mut headers = HeaderMap::new();
            match auth_state.sessions().session_cookie(&verified.session_token) {
                Ok(cookie) => {
                    headers.insert(SET_COOKIE, cookie);
                }
                Err(err) => {
                    error!("Failed to build session cookie: {err}");
                    let (status, body) =
                        login_error_response(&LoginError::SessionPersistenceFailed);
                    return (status, HeaderMap::new(), body);
                }
            }
            (
                StatusCode::OK,
                headers,
                Json(ApiResponse::ok(
                    "Login successful",
                    json!({ "userID": verified.user_id }),
                )),
            )
        }
        Err(err) => {
            let (status, body) = login_error_response(&err);
            (status, HeaderMap::new(), body)
        }
    }
}

fn login_error_body(status: StatusCode, message: &str) -> (StatusCode, Json<ApiResponse>) {
    (status, Json(ApiResponse::error(message)))
}

/// Map a login failure to its HTTP status and public message.
fn login_error_response(err: &LoginError) -> (StatusCode, Json<ApiResponse>) {
    match err {
        LoginError::RandomnessUnavailable => {
            login_error_body(StatusCode::INTERNAL_SERVER_ERROR, "Failed to generate OTP")
        }
        LoginError::TooManyAttempts { remaining } => login_error_body(
            StatusCode::TOO_MANY_REQUESTS,
            &format!(
                "Too many failed attempts. Please try again in {}",
                format_remaining(remaining)
            ),
        ),
        LoginError::InvalidOrExpiredCode | LoginError::InvalidCode => {
            login_error_body(StatusCode::BAD_REQUEST, "Invalid OTP")
        }
        LoginError::NotificationDeliveryFailed => login_error_body(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to send email, try again later.",
        ),
        LoginError::UserResolutionFailed | LoginError::SessionPersistenceFailed => {
            login_error_body(StatusCode::INTERNAL_SERVER_ERROR, "Failed to complete login")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{
        guest_session, harness, harness_with, user_session, wrong_code, MemorySessions,
        MemoryUsers, RecordingSender, ALICE,
    };
    use super::*;
    use anyhow::{anyhow, Context, Result};
    use axum::response::Response;
    use std::time::Duration;
    use uuid::Uuid;

    async fn envelope(response: Response) -> Result<ApiResponse> {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn login_payload(email: &str) -> Option<Json<LoginRequest>> {
        Some(Json(LoginRequest {
            email: email.to_string(),
        }))
    }

    fn verify_payload(email: &str, otp: &str) -> Option<Json<VerifyOtpRequest>> {
        Some(Json(VerifyOtpRequest {
            email: email.to_string(),
            otp: otp.to_string(),
        }))
    }

    #[tokio::test]
    async fn login_missing_payload() -> Result<()> {
        let h = harness();
        let response = login(Extension(guest_session("t")), Extension(h.state.clone()), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(envelope(response).await?.error.as_deref(), Some(DECODE_ERROR));
        Ok(())
    }

    #[tokio::test]
    async fn login_invalid_email() -> Result<()> {
        let h = harness();
        let response = login(
            Extension(guest_session("t")),
            Extension(h.state.clone()),
            login_payload("not-an-email"),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(h.sender.count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn login_sends_code_to_normalized_email() -> Result<()> {
        let h = harness();
        let response = login(
            Extension(guest_session("t")),
            Extension(h.state.clone()),
            login_payload("  Alice@Example.com "),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let body = envelope(response).await?;
        assert!(body.success);
        assert_eq!(body.message.as_deref(), Some("OTP sent successfully"));
        assert_eq!(
            body.data.as_ref().and_then(|d| d.get("email")).and_then(|v| v.as_str()),
            Some(ALICE)
        );
        Ok(())
    }

    #[tokio::test]
    async fn login_when_already_logged_in() -> Result<()> {
        let h = harness();
        let user_id = Uuid::new_v4();
        let response = login(
            Extension(user_session("t", user_id)),
            Extension(h.state.clone()),
            login_payload(ALICE),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let body = envelope(response).await?;
        assert_eq!(body.message.as_deref(), Some("Already logged in"));
        assert_eq!(
            body.data.as_ref().and_then(|d| d.get("userID")).and_then(|v| v.as_str()),
            Some(user_id.to_string().as_str())
        );
        assert_eq!(h.sender.count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn login_delivery_failure() -> Result<()> {
        let h = harness_with(
            RecordingSender {
                fail: true,
                ..RecordingSender::default()
            },
            MemoryUsers::default(),
            MemorySessions::default(),
        );
        let response = login(
            Extension(guest_session("t")),
            Extension(h.state.clone()),
            login_payload(ALICE),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            envelope(response).await?.error.as_deref(),
            Some("Failed to send email, try again later.")
        );
        Ok(())
    }

    #[tokio::test]
    async fn verify_success_rotates_cookie() -> Result<()> {
        let h = harness();
        h.state
            .flow()
            .request_login(&guest_session("t").identity, ALICE)
            .await?;
        let code = h.sender.last_code().context("no code sent")?;

        let response = verify_otp(
            Extension(guest_session("guest-token")),
            Extension(h.state.clone()),
            verify_payload(ALICE, &code),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let cookie = response
            .headers()
            .get(SET_COOKIE)
            .context("missing cookie")?
            .to_str()?
            .to_string();
        assert!(cookie.starts_with("kaffino_session=rotated-guest-token;"));

        let body = envelope(response).await?;
        assert_eq!(body.message.as_deref(), Some("Login successful"));
        let bound = h.sessions.bound.lock().map_err(|_| anyhow!("poisoned"))?;
        assert_eq!(
            body.data.as_ref().and_then(|d| d.get("userID")).and_then(|v| v.as_str()),
            Some(bound[0].1.to_string().as_str())
        );
        Ok(())
    }

    #[tokio::test]
    async fn verify_wrong_and_missing_codes_look_the_same() -> Result<()> {
        let h = harness();

        let missing = verify_otp(
            Extension(guest_session("t")),
            Extension(h.state.clone()),
            verify_payload(ALICE, "123456"),
        )
        .await
        .into_response();

        h.state
            .flow()
            .request_login(&guest_session("t").identity, ALICE)
            .await?;
        let code = h.sender.last_code().context("no code sent")?;
        let wrong = verify_otp(
            Extension(guest_session("t")),
            Extension(h.state.clone()),
            verify_payload(ALICE, &wrong_code(&code)),
        )
        .await
        .into_response();

        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
        assert_eq!(wrong.status(), StatusCode::BAD_REQUEST);
        assert_eq!(envelope(missing).await?, envelope(wrong).await?);
        Ok(())
    }

    #[tokio::test]
    async fn verify_lockout_is_429() -> Result<()> {
        let h = harness();
        h.state
            .flow()
            .request_login(&guest_session("t").identity, ALICE)
            .await?;
        let code = h.sender.last_code().context("no code sent")?;
        let wrong = wrong_code(&code);

        let mut last = StatusCode::OK;
        for _ in 0..5 {
            last = verify_otp(
                Extension(guest_session("t")),
                Extension(h.state.clone()),
                verify_payload(ALICE, &wrong),
            )
            .await
            .into_response()
            .status();
        }
        assert_eq!(last, StatusCode::TOO_MANY_REQUESTS);

        let response = verify_otp(
            Extension(guest_session("t")),
            Extension(h.state.clone()),
            verify_payload(ALICE, &code),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let error = envelope(response).await?.error.unwrap_or_default();
        assert!(error.starts_with("Too many failed attempts. Please try again in"));
        Ok(())
    }

    #[tokio::test]
    async fn verify_missing_payload() {
        let h = harness();
        let response = verify_otp(Extension(guest_session("t")), Extension(h.state.clone()), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn error_statuses() {
        let cases = [
            (LoginError::RandomnessUnavailable, StatusCode::INTERNAL_SERVER_ERROR),
            (
                LoginError::TooManyAttempts {
                    remaining: Duration::from_secs(1),
                },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (LoginError::InvalidOrExpiredCode, StatusCode::BAD_REQUEST),
            (LoginError::InvalidCode, StatusCode::BAD_REQUEST),
            (LoginError::NotificationDeliveryFailed, StatusCode::INTERNAL_SERVER_ERROR),
            (LoginError::UserResolutionFailed, StatusCode::INTERNAL_SERVER_ERROR),
            (LoginError::SessionPersistenceFailed, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(login_error_response(&err).0, status, "{err:?}");
        }
    }
}
