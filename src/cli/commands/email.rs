use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

use crate::api::handlers::auth::MAX_DURATION_SECONDS;

pub const ARG_EMAIL_SENDER: &str = "email-sender";
pub const ARG_EMAIL_FROM: &str = "email-from";
pub const ARG_EMAIL_TIMEOUT_SECONDS: &str = "email-timeout-seconds";
pub const ARG_SMTP_HOST: &str = "smtp-host";
pub const ARG_SMTP_PORT: &str = "smtp-port";
pub const ARG_SMTP_USERNAME: &str = "smtp-username";
pub const ARG_SMTP_PASSWORD: &str = "smtp-password";

#[derive(Debug, Clone)]
pub struct SmtpOptions {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
}

#[derive(Debug, Clone)]
pub struct Options {
    pub from: String,
    pub timeout_seconds: u64,
    /// `None` selects the log-only sender.
    pub smtp: Option<SmtpOptions>,
}

impl Options {
    /// Parse email delivery arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the SMTP sender is selected without its settings.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };

        let sender = get_non_empty(ARG_EMAIL_SENDER).unwrap_or_else(|| "log".to_string());
        let smtp = if sender == "smtp" {
            let host = get_non_empty(ARG_SMTP_HOST)
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{ARG_SMTP_HOST}"))?;
            let username = get_non_empty(ARG_SMTP_USERNAME).ok_or_else(|| {
                anyhow::anyhow!("missing required argument: --{ARG_SMTP_USERNAME}")
            })?;
            let password = get_non_empty(ARG_SMTP_PASSWORD).ok_or_else(|| {
                anyhow::anyhow!("missing required argument: --{ARG_SMTP_PASSWORD}")
            })?;
            Some(SmtpOptions {
                host,
                port: matches.get_one::<u16>(ARG_SMTP_PORT).copied().unwrap_or(587),
                username,
                password: SecretString::from(password),
            })
        } else {
            None
        };

        Ok(Self {
            from: get_non_empty(ARG_EMAIL_FROM)
                .unwrap_or_else(|| "no-reply@kaffino.dev".to_string()),
            timeout_seconds: matches
                .get_one::<u64>(ARG_EMAIL_TIMEOUT_SECONDS)
                .copied()
                .unwrap_or(5),
            smtp,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_EMAIL_SENDER)
                .long(ARG_EMAIL_SENDER)
                .help("How login codes are delivered")
                .long_help(
                    "How login codes are delivered.\n\n`log` writes the message to the service log (local development), `smtp` relays it through --smtp-host.",
                )
                .env("KAFFINO_EMAIL_SENDER")
                .value_parser(["log", "smtp"])
                .default_value("log"),
        )
        .arg(
            Arg::new(ARG_EMAIL_FROM)
                .long(ARG_EMAIL_FROM)
                .help("Sender address for outgoing email")
                .env("KAFFINO_EMAIL_FROM")
                .default_value("no-reply@kaffino.dev"),
        )
        .arg(
            Arg::new(ARG_EMAIL_TIMEOUT_SECONDS)
                .long(ARG_EMAIL_TIMEOUT_SECONDS)
                .help("Upper bound for a single email delivery in seconds")
                .env("KAFFINO_EMAIL_TIMEOUT_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64).range(1..=MAX_DURATION_SECONDS)),
        )
        .arg(
            Arg::new(ARG_SMTP_HOST)
                .long(ARG_SMTP_HOST)
                .help("SMTP relay host (STARTTLS)")
                .env("KAFFINO_SMTP_HOST"),
        )
        .arg(
            Arg::new(ARG_SMTP_PORT)
                .long(ARG_SMTP_PORT)
                .help("SMTP relay port")
                .env("KAFFINO_SMTP_PORT")
                .default_value("587")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_SMTP_USERNAME)
                .long(ARG_SMTP_USERNAME)
                .help("SMTP username")
                .env("KAFFINO_SMTP_USERNAME"),
        )
        .arg(
            Arg::new(ARG_SMTP_PASSWORD)
                .long(ARG_SMTP_PASSWORD)
                .help("SMTP password")
                .env("KAFFINO_SMTP_PASSWORD")
                .hide_env_values(true),
        )
}
