//! Email OTP login flow.
//!
//! Issuing a code: refuse when the session is already authenticated or the
//! email is locked out, then generate a 6-digit code, store it and email it.
//! The stored code is kept even when delivery fails, so a late email still
//! works.
//!
//! Verifying a code: the lockout check, code lookup, comparison and attempt
//! bookkeeping all happen while holding the attempt map, so concurrent
//! failures for one email are counted exactly and nothing slips past a
//! lockout another request has just set. Lock order is attempts, then codes.
//! User and session persistence happen after the lock is released.

use chrono::Duration;
use rand::{rngs::OsRng, RngCore};
use std::{sync::Arc, time::Duration as StdDuration};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::{
    clock::Clock,
    lockout::{format_remaining, AttemptState, LoginAttemptTracker},
    otp::{OtpStore, OTP_LENGTH},
    session::{SessionIdentity, SessionStore},
    state::AuthConfig,
    users::UserDirectory,
};
use crate::api::email::EmailSender;

pub const OTP_SUBJECT: &str = "Your OTP for Login";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoginError {
    #[error("secure random source unavailable")]
    RandomnessUnavailable,
    #[error("too many failed attempts, retry in {}", format_remaining(.remaining))]
    TooManyAttempts { remaining: StdDuration },
    #[error("no valid code for this email")]
    InvalidOrExpiredCode,
    #[error("code does not match")]
    InvalidCode,
    #[error("failed to deliver login code")]
    NotificationDeliveryFailed,
    #[error("failed to resolve user")]
    UserResolutionFailed,
    #[error("failed to persist session")]
    SessionPersistenceFailed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoginRequested {
    AlreadyLoggedIn { user_id: Uuid },
    CodeSent { email: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedLogin {
    pub user_id: Uuid,
    /// Replaces the caller's session token.
    pub session_token: String,
}

pub struct LoginFlow {
    otp: OtpStore,
    attempts: LoginAttemptTracker,
    sender: Arc<dyn EmailSender>,
    users: Arc<dyn UserDirectory>,
    sessions: Arc<dyn SessionStore>,
    send_timeout: StdDuration,
}

impl LoginFlow {
    pub fn new(
        config: &AuthConfig,
        clock: Arc<dyn Clock>,
        sender: Arc<dyn EmailSender>,
        users: Arc<dyn UserDirectory>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        let otp_ttl = seconds_to_delta(config.otp_ttl_seconds());
        let lockout = seconds_to_delta(config.lockout_seconds());
        Self {
            otp: OtpStore::new(otp_ttl, clock.clone()),
            attempts: LoginAttemptTracker::new(config.lockout_threshold(), lockout, clock),
            sender,
            users,
            sessions,
            send_timeout: StdDuration::from_secs(config.email_timeout_seconds()),
        }
    }

    /// Issue a login code for `email` and send it.
    ///
    /// # Errors
    /// See [`LoginFlow::request_login_with`].
    pub async fn request_login(
        &self,
        session: &SessionIdentity,
        email: &str,
    ) -> Result<LoginRequested, LoginError> {
        self.request_login_with(&mut OsRng, session, email).await
    }

    /// Issue a login code drawn from `rng`.
    ///
    /// # Errors
    /// `TooManyAttempts` while locked out, `RandomnessUnavailable` when `rng`
    /// fails, `NotificationDeliveryFailed` when the email is not accepted in time.
    #[instrument(skip(self, rng, session))]
    pub async fn request_login_with<R: RngCore + Send>(
        &self,
        rng: &mut R,
        session: &SessionIdentity,
        email: &str,
    ) -> Result<LoginRequested, LoginError> {
        if let SessionIdentity::Authenticated { user_id, .. } = session {
            return Ok(LoginRequested::AlreadyLoggedIn { user_id: *user_id });
        }

        if let Some(remaining) = self.attempts.check_lockout(email).await {
            return Err(LoginError::TooManyAttempts { remaining });
        }

        let code = OtpStore::generate_with(rng, OTP_LENGTH)?;
        let body = format!("Your OTP is: {code}");
        self.otp.store(email, code).await;

        match timeout(self.send_timeout, self.sender.send(email, OTP_SUBJECT, &body)).await {
            Ok(Ok(())) => {
                info!("login code sent");
                Ok(LoginRequested::CodeSent {
                    email: email.to_string(),
                })
            }
            Ok(Err(err)) => {
                error!("Failed to send login code: {err:#}");
                Err(LoginError::NotificationDeliveryFailed)
            }
            Err(_) => {
                error!("Timed out sending login code after {:?}", self.send_timeout);
                Err(LoginError::NotificationDeliveryFailed)
            }
        }
    }

    /// Check `code` for `email` and, on success, bind the session to the user.
    ///
    /// # Errors
    /// `TooManyAttempts`, `InvalidOrExpiredCode` or `InvalidCode` for rejected
    /// codes; `UserResolutionFailed` or `SessionPersistenceFailed` when the
    /// accepted login cannot be persisted.
    #[instrument(skip(self, session_token, code))]
    pub async fn verify_login(
        &self,
        session_token: &str,
        email: &str,
        code: &str,
    ) -> Result<VerifiedLogin, LoginError> {
        {
            let mut attempts = self.attempts.lock().await;
            if let Some(remaining) = attempts.check_lockout(email) {
                return Err(LoginError::TooManyAttempts { remaining });
            }

            let Some(stored) = self.otp.retrieve(email).await else {
                return Err(LoginError::InvalidOrExpiredCode);
            };

            if stored != code {
                return Err(match attempts.record_failure(email) {
                    AttemptState::Locked { remaining } => LoginError::TooManyAttempts { remaining },
                    AttemptState::Accumulating { attempts } => {
                        warn!(attempts, "login code mismatch");
                        LoginError::InvalidCode
                    }
                });
            }

            attempts.reset(email);
            self.otp.remove(email).await;
        }

        let user_id = self.users.resolve_or_create(email).await.map_err(|err| {
            error!("Failed to resolve user: {err:#}");
            LoginError::UserResolutionFailed
        })?;

        let session_token = self
            .sessions
            .bind(session_token, user_id, email)
            .await
            .map_err(|err| {
                error!("Failed to bind session: {err:#}");
                LoginError::SessionPersistenceFailed
            })?;

        info!(%user_id, "login successful");
        Ok(VerifiedLogin {
            user_id,
            session_token,
        })
    }
}

fn seconds_to_delta(seconds: u64) -> Duration {
    i64::try_from(seconds)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}
