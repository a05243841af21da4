use crate::{
    api::{
        self,
        email::{EmailSender, LogEmailSender, SmtpEmailSender},
        handlers::auth::AuthConfig,
    },
    cli::commands::email::SmtpOptions,
};
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub frontend_base_url: String,
    pub session_ttl_seconds: i64,
    pub otp_ttl_seconds: u64,
    pub lockout_threshold: u32,
    pub lockout_seconds: u64,
    pub email_from: String,
    pub email_timeout_seconds: u64,
    pub smtp: Option<SmtpOptions>,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the email transport cannot be built or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    debug!(
        port = args.port,
        dsn = %redact_dsn(&args.dsn),
        frontend_base_url = %args.frontend_base_url,
        "Server args"
    );

    let sender: Arc<dyn EmailSender> = if let Some(smtp) = &args.smtp {
        info!("Delivering login codes over SMTP via {}", smtp.host);
        Arc::new(SmtpEmailSender::new(smtp, args.email_from.clone())?)
    } else {
        info!("Logging login codes instead of sending email");
        Arc::new(LogEmailSender)
    };

    let auth_config = AuthConfig::new(args.frontend_base_url)
        .with_session_ttl_seconds(args.session_ttl_seconds)
        .with_otp_ttl_seconds(args.otp_ttl_seconds)
        .with_lockout_threshold(args.lockout_threshold)
        .with_lockout_seconds(args.lockout_seconds)
        .with_email_timeout_seconds(args.email_timeout_seconds);

    api::new(args.port, args.dsn, auth_config, sender).await
}

/// Strip the password from a DSN before it reaches the logs.
fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut url) => {
            if url.password().is_some() && url.set_password(Some("****")).is_err() {
                return "<invalid dsn>".to_string();
            }
            url.to_string()
        }
        Err(_) => "<invalid dsn>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_dsn_hides_password() {
        let redacted = redact_dsn("postgres://kaffino:hunter2@db:5432/kaffino");
        assert_eq!(redacted, "postgres://kaffino:****@db:5432/kaffino");
    }

    #[test]
    fn redact_dsn_without_password() {
        let redacted = redact_dsn("postgres://kaffino@db/kaffino");
        assert_eq!(redacted, "postgres://kaffino@db/kaffino");
    }

    #[test]
    fn redact_dsn_invalid() {
        assert_eq!(redact_dsn("not a url"), "<invalid dsn>");
    }
}
