use clap::{Arg, ArgMatches, Command};

use crate::api::handlers::auth::MAX_DURATION_SECONDS;

pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_OTP_TTL_SECONDS: &str = "otp-ttl-seconds";
pub const ARG_LOCKOUT_THRESHOLD: &str = "lockout-threshold";
pub const ARG_LOCKOUT_SECONDS: &str = "lockout-seconds";

#[derive(Debug, Clone)]
pub struct Options {
    pub frontend_base_url: String,
    pub session_ttl_seconds: i64,
    pub otp_ttl_seconds: u64,
    pub lockout_threshold: u32,
    pub lockout_seconds: u64,
}

impl Options {
    /// Parse auth arguments from matches.
    ///
    /// # Errors
    /// Returns an error if an argument is missing or out of range.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let frontend_base_url = matches
            .get_one::<String>(ARG_FRONTEND_BASE_URL)
            .cloned()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!("missing required argument: --{ARG_FRONTEND_BASE_URL}")
            })?;

        Ok(Self {
            frontend_base_url,
            session_ttl_seconds: matches
                .get_one::<i64>(ARG_SESSION_TTL_SECONDS)
                .copied()
                .unwrap_or(7200),
            otp_ttl_seconds: matches
                .get_one::<u64>(ARG_OTP_TTL_SECONDS)
                .copied()
                .unwrap_or(300),
            lockout_threshold: matches
                .get_one::<u32>(ARG_LOCKOUT_THRESHOLD)
                .copied()
                .unwrap_or(5),
            lockout_seconds: matches
                .get_one::<u64>(ARG_LOCKOUT_SECONDS)
                .copied()
                .unwrap_or(300),
        })
    }
}

// Durations beyond a year are rejected; chrono cannot represent arbitrary u64 seconds.
const fn max_seconds() -> i64 {
    MAX_DURATION_SECONDS as i64
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_session_args(command);
    with_login_args(command)
}

fn with_session_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL, used as the allowed CORS origin")
                .env("KAFFINO_FRONTEND_BASE_URL")
                .default_value("http://localhost:5173"),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session cookie TTL in seconds")
                .env("KAFFINO_SESSION_TTL_SECONDS")
                .default_value("7200")
                .value_parser(clap::value_parser!(i64).range(1..=max_seconds())),
        )
}

fn with_login_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_OTP_TTL_SECONDS)
                .long(ARG_OTP_TTL_SECONDS)
                .help("Lifetime of a login code in seconds")
                .env("KAFFINO_OTP_TTL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64).range(1..=MAX_DURATION_SECONDS)),
        )
        .arg(
            Arg::new(ARG_LOCKOUT_THRESHOLD)
                .long(ARG_LOCKOUT_THRESHOLD)
                .help("Failed code verifications before the email is locked")
                .env("KAFFINO_LOCKOUT_THRESHOLD")
                .default_value("5")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_LOCKOUT_SECONDS)
                .long(ARG_LOCKOUT_SECONDS)
                .help("Lockout duration in seconds")
                .env("KAFFINO_LOCKOUT_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64).range(1..=MAX_DURATION_SECONDS)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::{self, email::ARG_EMAIL_TIMEOUT_SECONDS};

    const DSN: &str = "postgres://user@localhost:5432/kaffino";

    fn parse_with(flag: &str, value: &str) -> Result<ArgMatches, clap::Error> {
        temp_env::with_vars_unset(["KAFFINO_LOCKOUT_THRESHOLD", "KAFFINO_EMAIL_SENDER"], || {
            commands::new().try_get_matches_from(vec![
                "kaffino".to_string(),
                "--dsn".to_string(),
                DSN.to_string(),
                format!("--{flag}"),
                value.to_string(),
            ])
        })
    }

    #[test]
    fn durations_accept_one_year() {
        let year = MAX_DURATION_SECONDS.to_string();
        for flag in [
            ARG_SESSION_TTL_SECONDS,
            ARG_OTP_TTL_SECONDS,
            ARG_LOCKOUT_SECONDS,
            ARG_EMAIL_TIMEOUT_SECONDS,
        ] {
            assert!(parse_with(flag, &year).is_ok(), "{flag} rejected one year");
        }
    }

    #[test]
    fn durations_reject_values_past_one_year() {
        let too_long = (MAX_DURATION_SECONDS + 1).to_string();
        for flag in [
            ARG_SESSION_TTL_SECONDS,
            ARG_OTP_TTL_SECONDS,
            ARG_LOCKOUT_SECONDS,
            ARG_EMAIL_TIMEOUT_SECONDS,
        ] {
            assert!(parse_with(flag, &too_long).is_err(), "{flag} accepted {too_long}");
            assert!(parse_with(flag, "0").is_err(), "{flag} accepted 0");
        }
        assert!(parse_with(ARG_LOCKOUT_SECONDS, "9000000000000000").is_err());
        assert!(parse_with(ARG_OTP_TTL_SECONDS, &u64::MAX.to_string()).is_err());
    }

    #[test]
    fn lockout_threshold_must_be_positive() {
        assert!(parse_with(ARG_LOCKOUT_THRESHOLD, "0").is_err());
        assert!(parse_with(ARG_LOCKOUT_THRESHOLD, "1").is_ok());
    }

    #[test]
    fn parse_reads_bounded_values() -> anyhow::Result<()> {
        let matches = parse_with(ARG_LOCKOUT_SECONDS, "600")?;
        let options = Options::parse(&matches)?;
        assert_eq!(options.lockout_seconds, 600);
        Ok(())
    }
}
