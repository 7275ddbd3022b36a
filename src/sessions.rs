use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;

/// An unconfirmed registration. The activation code is kept only as a SHA-256 digest.
#[derive(Debug, Clone)]
pub struct PendingRegistration {
    pub code_digest: String,
    pub password_hash: String,
    pub expires_at: DateTime<Utc>,
}

impl PendingRegistration {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn matches(&self, code: &str) -> bool {
        self.code_digest.as_bytes().ct_eq(digest(code).as_bytes()).into()
    }
}

pub fn digest(code: &str) -> String {
    let mut hasher: Sha256 = Digest::new();
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

/// Pending registrations keyed by email, one per address.
///
/// Entries are only evicted when a confirmation for the same email arrives, so an
/// abandoned attempt stays in memory until the process exits.
#[derive(Default)]
pub struct SessionTable {
    entries: Mutex<HashMap<String, PendingRegistration>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a fresh attempt, replacing any earlier one for `email`.
    pub async fn put(
        &self,
        email: &str,
        code: &str,
        password_hash: String,
        ttl: Duration,
        now: DateTime<Utc>,
    ) {
        let entry = PendingRegistration {
            code_digest: digest(code),
            password_hash,
            expires_at: now + ttl,
        };
        if self
            .entries
            .lock()
            .await
            .insert(email.to_string(), entry)
            .is_some()
        {
            log::debug!("Replaced pending registration for {}", email);
        }
    }

    pub async fn get(&self, email: &str) -> Option<PendingRegistration> {
        self.entries.lock().await.get(email).cloned()
    }

    /// Removes and returns the entry in one critical section.
    pub async fn remove(&self, email: &str) -> Option<PendingRegistration> {
        self.entries.lock().await.remove(email)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}
