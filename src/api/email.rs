//! Login code delivery.
//!
//! The login flow hands each code to an `EmailSender` and waits for the result
//! (bounded by the configured timeout). There is no outbox and no retry: a
//! failed send is reported to the caller, who may request a new code.
//!
//! - `LogEmailSender` logs the message instead of delivering it (local dev).
//! - `SmtpEmailSender` relays through an SMTP server with STARTTLS.
use crate::cli::commands::email::SmtpOptions;
use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use secrecy::ExposeSecret;
use tracing::{info, instrument};

/// Email delivery abstraction used by the login flow.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver a plain-text message or return an error.
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// Local dev sender that logs the message instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        info!(to_email = %to, subject = %subject, body = %body, "email send stub");
        Ok(())
    }
}

pub struct SmtpEmailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpEmailSender {
    /// Build an SMTP relay transport.
    ///
    /// # Errors
    /// Returns an error if the relay host or the sender address is invalid.
    pub fn new(options: &SmtpOptions, from: String) -> Result<Self> {
        let credentials = Credentials::new(
            options.username.clone(),
            options.password.expose_secret().to_string(),
        );
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&options.host)
            .with_context(|| format!("Invalid SMTP relay host: {}", options.host))?
            .port(options.port)
            .credentials(credentials)
            .build();
        let from = from
            .parse::<Mailbox>()
            .with_context(|| format!("Invalid sender address: {from}"))?;
        Ok(Self { transport, from })
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    #[instrument(skip(self, body))]
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to.parse::<Mailbox>().context("Invalid recipient address")?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .context("Failed to build email message")?;

        self.transport
            .send(message)
            .await
            .context("SMTP relay rejected the message")?;
        Ok(())
    }
}
