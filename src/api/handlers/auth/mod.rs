//! Passwordless login and session handling.
//!
//! A login is two requests: `POST /login` emails a one-time code and
//! `POST /verify-otp` exchanges it for an authenticated session. Codes and
//! failure counters are kept in memory per instance; users and sessions are
//! persisted in `PostgreSQL`.
//!
//! ## Lockout
//!
//! - **Threshold:** 5 failed verifications for one email (configurable).
//! - **Duration:** 5 minutes (configurable). While locked, both new codes and
//!   verifications are refused with `429`.
//! - **Reset:** only a successful verification clears the counter.

pub mod clock;
pub mod flow;
pub mod lockout;
pub(crate) mod login;
pub mod otp;
pub mod session;
mod state;
pub(crate) mod types;
pub mod users;
mod utils;

pub use clock::{Clock, SystemClock};
pub use flow::{LoginError, LoginFlow};
pub use session::{
    resolve_session, spawn_session_sweep, CurrentSession, PgSessionStore, SessionIdentity,
    SessionManager, SessionStore, SESSION_SWEEP_INTERVAL,
};
pub use state::{AuthConfig, AuthState, MAX_DURATION_SECONDS};
pub use users::{PgUserDirectory, UserDirectory};

#[cfg(test)]
pub(crate) mod test_support;
