//! Shared fakes for login flow and handler tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use rand::RngCore;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};
use uuid::Uuid;

use super::{
    clock::ManualClock,
    flow::LoginFlow,
    session::{CurrentSession, SessionIdentity, SessionManager, SessionStore},
    state::{AuthConfig, AuthState},
    users::UserDirectory,
};
use crate::api::email::EmailSender;

pub(crate) const ALICE: &str = "alice@example.com";

/// Records every message and can be told to fail or hang.
#[derive(Default)]
pub(crate) struct RecordingSender {
    pub(crate) sent: Mutex<Vec<(String, String, String)>>,
    pub(crate) fail: bool,
    pub(crate) hang: bool,
}

impl RecordingSender {
    pub(crate) fn last_code(&self) -> Option<String> {
        let sent = self.sent.lock().ok()?;
        let (_, _, body) = sent.last()?;
        body.strip_prefix("Your OTP is: ").map(str::to_string)
    }

    pub(crate) fn count(&self) -> usize {
        self.sent.lock().map(|sent| sent.len()).unwrap_or_default()
    }
}

#[async_trait]
impl EmailSender for RecordingSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((to.to_string(), subject.to_string(), body.to_string()));
        }
        if self.hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.fail {
            return Err(anyhow!("relay unavailable"));
        }
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct MemoryUsers {
    pub(crate) ids: Mutex<HashMap<String, Uuid>>,
    pub(crate) fail: bool,
}

#[async_trait]
impl UserDirectory for MemoryUsers {
    async fn resolve_or_create(&self, email: &str) -> Result<Uuid> {
        if self.fail {
            return Err(anyhow!("database offline"));
        }
        let mut ids = self.ids.lock().map_err(|_| anyhow!("poisoned"))?;
        Ok(*ids.entry(email.to_string()).or_insert_with(Uuid::new_v4))
    }
}

/// Binds by appending `rotated-` to the old token.
#[derive(Default)]
pub(crate) struct MemorySessions {
    pub(crate) bound: Mutex<Vec<(String, Uuid, String)>>,
    pub(crate) destroyed: Mutex<Vec<String>>,
    pub(crate) fail: bool,
}

#[async_trait]
impl SessionStore for MemorySessions {
    async fn load(&self, _token: &str) -> Result<Option<SessionIdentity>> {
        Ok(None)
    }

    async fn start_guest(&self) -> Result<CurrentSession> {
        Ok(guest_session("guest-token"))
    }

    async fn bind(&self, token: &str, user_id: Uuid, username: &str) -> Result<String> {
        if self.fail {
            return Err(anyhow!("database offline"));
        }
        if let Ok(mut bound) = self.bound.lock() {
            bound.push((token.to_string(), user_id, username.to_string()));
        }
        Ok(format!("rotated-{token}"))
    }

    async fn destroy(&self, token: &str) -> Result<()> {
        if let Ok(mut destroyed) = self.destroyed.lock() {
            destroyed.push(token.to_string());
        }
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        Ok(0)
    }
}

pub(crate) struct FailingRng;

impl RngCore for FailingRng {
    fn next_u32(&mut self) -> u32 {
        0
    }

    fn next_u64(&mut self) -> u64 {
        0
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        dest.fill(0);
    }

    fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> Result<(), rand::Error> {
        Err(rand::Error::new(std::io::Error::other(
            "entropy source offline",
        )))
    }
}

pub(crate) fn guest_session(token: &str) -> CurrentSession {
    CurrentSession {
        token: token.to_string(),
        identity: SessionIdentity::Guest {
            guest_id: Uuid::new_v4(),
        },
    }
}

pub(crate) fn user_session(token: &str, user_id: Uuid) -> CurrentSession {
    CurrentSession {
        token: token.to_string(),
        identity: SessionIdentity::Authenticated {
            user_id,
            username: ALICE.to_string(),
        },
    }
}

/// A six-digit code guaranteed to differ from `code`.
pub(crate) fn wrong_code(code: &str) -> String {
    if code == "000000" {
        "111111".to_string()
    } else {
        "000000".to_string()
    }
}

pub(crate) struct Harness {
    pub(crate) state: Arc<AuthState>,
    pub(crate) clock: Arc<ManualClock>,
    pub(crate) sender: Arc<RecordingSender>,
    pub(crate) sessions: Arc<MemorySessions>,
}

impl Harness {
    pub(crate) fn flow(&self) -> &LoginFlow {
        self.state.flow()
    }
}

pub(crate) fn test_config() -> AuthConfig {
    AuthConfig::new("http://localhost:5173".to_string()).with_email_timeout_seconds(1)
}

pub(crate) fn harness_with(
    sender: RecordingSender,
    users: MemoryUsers,
    sessions: MemorySessions,
) -> Harness {
    harness_with_config(test_config(), sender, users, sessions)
}

pub(crate) fn harness_with_config(
    config: AuthConfig,
    sender: RecordingSender,
    users: MemoryUsers,
    sessions: MemorySessions,
) -> Harness {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let sender = Arc::new(sender);
    let sessions = Arc::new(sessions);
    let flow = LoginFlow::new(
        &config,
        clock.clone(),
        sender.clone(),
        Arc::new(users),
        sessions.clone(),
    );
    let manager = SessionManager::new(sessions.clone(), &config);
    Harness {
        state: Arc::new(AuthState::new(config, flow, manager)),
        clock,
        sender,
        sessions,
    }
}

pub(crate) fn harness() -> Harness {
    harness_with(
        RecordingSender::default(),
        MemoryUsers::default(),
        MemorySessions::default(),
    )
}
