//! # Kaffino (Coffee Shop Backend)
//!
//! `kaffino` serves the coffee shop catalog and handles customer sign-in.
//!
//! ## Catalog
//!
//! Products live in `PostgreSQL` together with an inventory row carrying stock and
//! price. An empty catalog is seeded with the house products on startup.
//!
//! ## Sessions
//!
//! Every visitor gets a session cookie. Sessions start as **guest** sessions and
//! are bound to a persisted user after a successful login. Only a SHA-256 hash of
//! the cookie token is stored server-side. Guests may browse the catalog but
//! cannot create, update or delete products.
//!
//! ## Login (email OTP)
//!
//! Login is passwordless: `POST /login` emails a 6-digit one-time code that is
//! valid for 5 minutes, and `POST /verify-otp` exchanges it for an authenticated
//! session.
//!
//! - **Lockout:** 5 failed verifications lock the email for 5 minutes. Both new
//!   codes and verifications are refused while locked.
//! - **Enumeration:** wrong, expired and never-issued codes produce the same
//!   response.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
