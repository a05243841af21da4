//! One-time login codes.
//!
//! Codes live in memory only, keyed by the normalized email. A code is valid
//! while `now - issued_at <= ttl`; there is no background sweeper, a stale
//! record is dropped the first time it is read after expiry.

use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use tracing::debug;

use super::{clock::Clock, flow::LoginError};

pub const OTP_LENGTH: usize = 6;

// Largest multiple of 10 that fits in a byte; bytes at or above it are
// redrawn so every digit is equally likely.
const DIGIT_REJECTION_BOUND: u8 = 250;

#[derive(Clone, Debug)]
struct OtpRecord {
    code: String,
    issued_at: DateTime<Utc>,
}

pub struct OtpStore {
    records: Mutex<HashMap<String, OtpRecord>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl OtpStore {
    #[must_use]
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    /// Generate `length` decimal digits from the operating system CSPRNG.
    ///
    /// # Errors
    /// Returns `LoginError::RandomnessUnavailable` if the OS source fails.
    pub fn generate(length: usize) -> Result<String, LoginError> {
        Self::generate_with(&mut OsRng, length)
    }

    /// Generate `length` decimal digits from `rng`.
    ///
    /// # Errors
    /// Returns `LoginError::RandomnessUnavailable` if `rng` reports a failure.
    pub fn generate_with<R: RngCore + ?Sized>(
        rng: &mut R,
        length: usize,
    ) -> Result<String, LoginError> {
        let mut code = String::with_capacity(length);
        let mut buf = [0u8; 16];
        while code.len() < length {
            rng.try_fill_bytes(&mut buf).map_err(|err| {
                debug!("secure random source failed: {err}");
                LoginError::RandomnessUnavailable
            })?;
            for byte in buf {
                if code.len() == length {
                    break;
                }
                if byte < DIGIT_REJECTION_BOUND {
                    code.push(char::from(b'0' + byte % 10));
                }
            }
        }
        Ok(code)
    }

    /// Store `code` for `identifier`, replacing any previous code.
    pub async fn store(&self, identifier: &str, code: String) {
        let issued_at = self.clock.now();
        let mut records = self.records.lock().await;
        records.insert(identifier.to_string(), OtpRecord { code, issued_at });
    }

    /// Return the live code for `identifier`, dropping it if it has expired.
    pub async fn retrieve(&self, identifier: &str) -> Option<String> {
        let now = self.clock.now();
        let mut records = self.records.lock().await;
        let record = records.get(identifier)?;
        if now - record.issued_at > self.ttl {
            debug!("expired login code dropped");
            records.remove(identifier);
            return None;
        }
        Some(record.code.clone())
    }

    /// Consume the code for `identifier`.
    pub async fn remove(&self, identifier: &str) {
        self.records.lock().await.remove(identifier);
    }
}

#[cfg(test)]
mod tests {
    use super::super::{clock::ManualClock, test_support::FailingRng};
    use super::*;

    const ALICE: &str = "alice@example.com";

    fn store_with_clock() -> (OtpStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = OtpStore::new(Duration::minutes(5), clock.clone());
        (store, clock)
    }

    /// Replays a fixed byte sequence.
    struct ScriptedRng(Vec<u8>);

    impl RngCore for ScriptedRng {
        fn next_u32(&mut self) -> u32 {
            0
        }

        fn next_u64(&mut self) -> u64 {
            0
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            for slot in dest.iter_mut() {
                *slot = if self.0.is_empty() { 0 } else { self.0.remove(0) };
            }
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
            self.fill_bytes(dest);
            Ok(())
        }
    }

    #[test]
    fn generate_returns_six_digits() -> Result<(), LoginError> {
        for _ in 0..100 {
            let code = OtpStore::generate(OTP_LENGTH)?;
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
        Ok(())
    }

    #[test]
    fn generate_digits_are_uniform() -> Result<(), LoginError> {
        let mut counts = [0u32; 10];
        for _ in 0..10_000 {
            for c in OtpStore::generate(OTP_LENGTH)?.bytes() {
                counts[usize::from(c - b'0')] += 1;
            }
        }
        // 60,000 digits, 6,000 expected per bucket.
        for (digit, count) in counts.iter().enumerate() {
            assert!(
                (5_500..=6_500).contains(count),
                "digit {digit} drawn {count} times"
            );
        }
        Ok(())
    }

    #[test]
    fn generate_skips_biased_bytes() -> Result<(), LoginError> {
        let mut rng = ScriptedRng(vec![250, 255, 3, 251, 19, 249, 0, 10, 100]);
        let code = OtpStore::generate_with(&mut rng, OTP_LENGTH)?;
        assert_eq!(code, "399000");
        Ok(())
    }

    #[test]
    fn generate_fails_without_randomness() {
        let result = OtpStore::generate_with(&mut FailingRng, OTP_LENGTH);
        assert!(matches!(result, Err(LoginError::RandomnessUnavailable)));
    }

    #[tokio::test]
    async fn retrieve_after_store() {
        let (store, _clock) = store_with_clock();
        store.store(ALICE, "123456".to_string()).await;
        assert_eq!(store.retrieve(ALICE).await.as_deref(), Some("123456"));
    }

    #[tokio::test]
    async fn store_overwrites_previous_code() {
        let (store, _clock) = store_with_clock();
        store.store(ALICE, "111111".to_string()).await;
        store.store(ALICE, "222222".to_string()).await;
        assert_eq!(store.retrieve(ALICE).await.as_deref(), Some("222222"));
    }

    #[tokio::test]
    async fn retrieve_at_ttl_boundary_is_valid() {
        let (store, clock) = store_with_clock();
        store.store(ALICE, "123456".to_string()).await;
        clock.advance(Duration::minutes(5));
        assert_eq!(store.retrieve(ALICE).await.as_deref(), Some("123456"));
    }

    #[tokio::test]
    async fn retrieve_after_expiry_is_absent_and_stays_absent() {
        let (store, clock) = store_with_clock();
        store.store(ALICE, "123456".to_string()).await;
        clock.advance(Duration::minutes(5) + Duration::milliseconds(1));
        assert_eq!(store.retrieve(ALICE).await, None);
        assert_eq!(store.retrieve(ALICE).await, None);
        assert!(store.records.lock().await.is_empty());
    }

    #[tokio::test]
    async fn remove_consumes_code() {
        let (store, _clock) = store_with_clock();
        store.store(ALICE, "123456".to_string()).await;
        store.remove(ALICE).await;
        assert_eq!(store.retrieve(ALICE).await, None);
    }

    #[tokio::test]
    async fn identifiers_are_independent() {
        let (store, _clock) = store_with_clock();
        store.store(ALICE, "123456".to_string()).await;
        assert_eq!(store.retrieve("bob@example.com").await, None);
    }
}
