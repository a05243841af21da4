//! Auth configuration and shared state.

use super::{flow::LoginFlow, session::SessionManager};

const DEFAULT_SESSION_TTL_SECONDS: i64 = 2 * 60 * 60;
const DEFAULT_OTP_TTL_SECONDS: u64 = 5 * 60;
const DEFAULT_LOCKOUT_THRESHOLD: u32 = 5;
const DEFAULT_LOCKOUT_SECONDS: u64 = 5 * 60;
const DEFAULT_EMAIL_TIMEOUT_SECONDS: u64 = 5;

/// Upper bound for every duration knob: one year.
pub const MAX_DURATION_SECONDS: u64 = 365 * 24 * 60 * 60;

fn bounded_seconds(seconds: u64) -> u64 {
    seconds.clamp(1, MAX_DURATION_SECONDS)
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    session_ttl_seconds: i64,
    otp_ttl_seconds: u64,
    lockout_threshold: u32,
    lockout_seconds: u64,
    email_timeout_seconds: u64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            otp_ttl_seconds: DEFAULT_OTP_TTL_SECONDS,
            lockout_threshold: DEFAULT_LOCKOUT_THRESHOLD,
            lockout_seconds: DEFAULT_LOCKOUT_SECONDS,
            email_timeout_seconds: DEFAULT_EMAIL_TIMEOUT_SECONDS,
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        let seconds = u64::try_from(seconds).unwrap_or(0);
        self.session_ttl_seconds = i64::try_from(bounded_seconds(seconds)).unwrap_or(i64::MAX);
        self
    }

    #[must_use]
    pub fn with_otp_ttl_seconds(mut self, seconds: u64) -> Self {
        self.otp_ttl_seconds = bounded_seconds(seconds);
        self
    }

    #[must_use]
    pub fn with_lockout_threshold(mut self, threshold: u32) -> Self {
        self.lockout_threshold = threshold.max(1);
        self
    }

    #[must_use]
    pub fn with_lockout_seconds(mut self, seconds: u64) -> Self {
        self.lockout_seconds = bounded_seconds(seconds);
        self
    }

    #[must_use]
    pub fn with_email_timeout_seconds(mut self, seconds: u64) -> Self {
        self.email_timeout_seconds = bounded_seconds(seconds);
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn otp_ttl_seconds(&self) -> u64 {
        self.otp_ttl_seconds
    }

    #[must_use]
    pub fn lockout_threshold(&self) -> u32 {
        self.lockout_threshold
    }

    #[must_use]
    pub fn lockout_seconds(&self) -> u64 {
        self.lockout_seconds
    }

    #[must_use]
    pub fn email_timeout_seconds(&self) -> u64 {
        self.email_timeout_seconds
    }

    /// Only mark cookies secure when the frontend is served over HTTPS.
    #[must_use]
    pub fn session_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

pub struct AuthState {
    config: AuthConfig,
    flow: LoginFlow,
    sessions: SessionManager,
}

impl AuthState {
    #[must_use]
    pub fn new(config: AuthConfig, flow: LoginFlow, sessions: SessionManager) -> Self {
        Self {
            config,
            flow,
            sessions,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn flow(&self) -> &LoginFlow {
        &self.flow
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }
}
