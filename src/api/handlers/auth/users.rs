//! User directory: maps a login email to a persisted user id.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::{info_span, Instrument};
use uuid::Uuid;

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Return the id of the user owning `email`, creating the user on first login.
    async fn resolve_or_create(&self, email: &str) -> Result<Uuid>;
}

#[derive(Clone, Debug)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn resolve_or_create(&self, email: &str) -> Result<Uuid> {
        // The no-op update makes RETURNING yield the existing row on conflict,
        // so two first logins for the same email still agree on one id.
        let query = r"
            INSERT INTO users (email)
            VALUES ($1)
            ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email
            RETURNING id
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to resolve user")?;
        Ok(row.get("id"))
    }
}
