use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand_core::{OsRng, RngCore};
use serde::{Serialize, Serializer};

use crate::auth::hash_password;
use crate::mail::{activation_mail, dispatch, Notifier};
use crate::models::User;
use crate::sessions::SessionTable;
use crate::store::CredentialStore;
use crate::Error;

pub const ACTIVATION_CODE_BYTES: usize = 8;

/// Result of a confirmation attempt. Every outcome consumes the pending entry.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ConfirmOutcome {
    Confirmed,
    TimedOut,
    InvalidCode,
    NotPending,
}

impl Serialize for ConfirmOutcome {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{:?}", self))
    }
}

/// Hex-encoded random token from the OS CSPRNG.
pub fn generate_code() -> String {
    let mut bytes = [0u8; ACTIVATION_CODE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub struct Registrar {
    sessions: SessionTable,
    store: Arc<dyn CredentialStore>,
    notifier: Arc<dyn Notifier>,
    ttl: Duration,
}

impl Registrar {
    pub fn new(store: Arc<dyn CredentialStore>, notifier: Arc<dyn Notifier>, ttl: Duration) -> Self {
        Self {
            sessions: SessionTable::new(),
            store,
            notifier,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issues a new activation code for `email` and mails it. Returns when the code expires.
    pub async fn start(&self, email: &str, password: &str) -> Result<DateTime<Utc>, Error> {
        if !validator::validate_email(email) {
            return Err(Error::InvalidEmail {
                message: format!("`{}` is not a valid email address", email),
            });
        }
        if password.is_empty() {
            return Err(Error::MissingCredentials {
                message: "Provided password was empty!".to_string(),
            });
        }
        if self.store.find_by_email(email).await?.is_some() {
            return Err(Error::UserAlreadyExists {
                message: format!("User with email `{}` already exists!", email),
            });
        }

        let password_hash = hash_password(password)?;
        let code = generate_code();
        let now = Utc::now();
        self.sessions
            .put(email, &code, password_hash, self.ttl, now)
            .await;
        log::info!("Registration pending for {}", email);
        log::debug!("{} registrations pending", self.sessions.len().await);

        dispatch(self.notifier.clone(), activation_mail(email, &code));
        Ok(now + self.ttl)
    }

    pub async fn confirm(&self, email: &str, code: &str) -> Result<ConfirmOutcome, Error> {
        self.confirm_at(email, code, Utc::now()).await
    }

    pub async fn confirm_at(
        &self,
        email: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<ConfirmOutcome, Error> {
        let pending = match self.sessions.remove(email).await {
            Some(pending) => pending,
            None => return Ok(ConfirmOutcome::NotPending),
        };

        if pending.is_expired(now) {
            log::info!("Activation code for {} timed out", email);
            return Ok(ConfirmOutcome::TimedOut);
        }
        if !pending.matches(code) {
            log::info!("Wrong activation code submitted for {}", email);
            return Ok(ConfirmOutcome::InvalidCode);
        }

        self.store
            .insert(&User::new(email.to_string(), pending.password_hash))
            .await?;
        log::info!("Registered {}", email);
        Ok(ConfirmOutcome::Confirmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::verify_password;
    use crate::mail::testing::ChannelNotifier;
    use crate::store::MemoryStore;
    use std::collections::HashSet;
    use tokio::sync::mpsc::UnboundedReceiver;

    use crate::mail::Mail;

    fn registrar() -> (Registrar, Arc<MemoryStore>, UnboundedReceiver<Mail>) {
        let store = Arc::new(MemoryStore::new());
        let (notifier, rx) = ChannelNotifier::new();
        let registrar = Registrar::new(store.clone(), notifier, Duration::seconds(30));
        (registrar, store, rx)
    }

    fn code_from(mail: &Mail) -> String {
        mail.body
            .trim()
            .rsplit(' ')
            .next()
            .unwrap()
            .to_string()
    }

    #[test]
    fn codes_are_fixed_width_hex_and_unique() {
        let codes: HashSet<String> = (0..256).map(|_| generate_code()).collect();
        assert_eq!(codes.len(), 256);
        for code in &codes {
            assert_eq!(code.len(), ACTIVATION_CODE_BYTES * 2);
            assert!(code.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn outcome_serializes_as_name() {
        assert_eq!(
            serde_json::to_value(ConfirmOutcome::TimedOut).unwrap(),
            serde_json::json!("TimedOut")
        );
    }

    #[tokio::test]
    async fn confirm_with_mailed_code_creates_user_once() {
        let (registrar, store, mut rx) = registrar();
        registrar.start("a@b.com", "pw1").await.unwrap();
        let mail = rx.recv().await.unwrap();
        assert_eq!(mail.to, "a@b.com");
        let code = code_from(&mail);

        assert_eq!(
            registrar.confirm("a@b.com", &code).await.unwrap(),
            ConfirmOutcome::Confirmed
        );
        let user = store.find_by_email("a@b.com").await.unwrap().unwrap();
        assert!(user.tasks.is_empty());
        assert!(verify_password("pw1", &user.password_hash).unwrap());

        assert_eq!(
            registrar.confirm("a@b.com", &code).await.unwrap(),
            ConfirmOutcome::NotPending
        );
    }

    #[tokio::test]
    async fn repeated_start_issues_distinct_codes() {
        let (registrar, _, mut rx) = registrar();
        registrar.start("a@b.com", "pw").await.unwrap();
        registrar.start("a@b.com", "pw").await.unwrap();
        let first = code_from(&rx.recv().await.unwrap());
        let second = code_from(&rx.recv().await.unwrap());
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn restart_invalidates_earlier_code() {
        let (registrar, store, mut rx) = registrar();
        registrar.start("a@b.com", "pw").await.unwrap();
        let stale = code_from(&rx.recv().await.unwrap());
        registrar.start("a@b.com", "pw").await.unwrap();
        let fresh = code_from(&rx.recv().await.unwrap());

        assert_eq!(
            registrar.confirm("a@b.com", &stale).await.unwrap(),
            ConfirmOutcome::InvalidCode
        );
        // the mismatch consumed the entry, so even the fresh code is gone now
        assert_eq!(
            registrar.confirm("a@b.com", &fresh).await.unwrap(),
            ConfirmOutcome::NotPending
        );
        assert!(store.find_by_email("a@b.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn only_latest_code_confirms() {
        let (registrar, store, mut rx) = registrar();
        registrar.start("a@b.com", "pw").await.unwrap();
        let _stale = code_from(&rx.recv().await.unwrap());
        registrar.start("a@b.com", "pw2").await.unwrap();
        let fresh = code_from(&rx.recv().await.unwrap());

        assert_eq!(
            registrar.confirm("a@b.com", &fresh).await.unwrap(),
            ConfirmOutcome::Confirmed
        );
        let user = store.find_by_email("a@b.com").await.unwrap().unwrap();
        assert!(verify_password("pw2", &user.password_hash).unwrap());
    }

    #[tokio::test]
    async fn expired_entry_times_out_even_with_right_code() {
        let (registrar, store, mut rx) = registrar();
        registrar.start("a@b.com", "pw").await.unwrap();
        let code = code_from(&rx.recv().await.unwrap());

        let later = Utc::now() + Duration::seconds(31);
        assert_eq!(
            registrar.confirm_at("a@b.com", &code, later).await.unwrap(),
            ConfirmOutcome::TimedOut
        );
        assert_eq!(registrar.sessions.len().await, 0);
        assert!(store.find_by_email("a@b.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn confirm_without_start_is_not_pending() {
        let (registrar, _, _rx) = registrar();
        assert_eq!(
            registrar.confirm("nobody@b.com", "00").await.unwrap(),
            ConfirmOutcome::NotPending
        );
    }

    #[tokio::test]
    async fn start_rejects_bad_input_without_side_effects() {
        let (registrar, store, mut rx) = registrar();
        assert!(matches!(
            registrar.start("not-an-email", "pw").await,
            Err(Error::InvalidEmail { .. })
        ));
        assert!(matches!(
            registrar.start("a@b.com", "").await,
            Err(Error::MissingCredentials { .. })
        ));

        store.insert(&User::new("taken@b.com".into(), "h".into())).await.unwrap();
        assert!(matches!(
            registrar.start("taken@b.com", "pw").await,
            Err(Error::UserAlreadyExists { .. })
        ));

        assert_eq!(registrar.sessions.len().await, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn mail_failure_does_not_fail_start() {
        let store = Arc::new(MemoryStore::new());
        let (notifier, mut rx) = ChannelNotifier::failing();
        let registrar = Registrar::new(store.clone(), notifier, Duration::seconds(30));

        registrar.start("a@b.com", "pw").await.unwrap();
        let code = code_from(&rx.recv().await.unwrap());
        assert_eq!(
            registrar.confirm("a@b.com", &code).await.unwrap(),
            ConfirmOutcome::Confirmed
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_confirms_register_exactly_once() {
        let (registrar, store, mut rx) = registrar();
        let registrar = Arc::new(registrar);
        registrar.start("a@b.com", "pw").await.unwrap();
        let code = code_from(&rx.recv().await.unwrap());

        let attempts: Vec<_> = (0..16)
            .map(|_| {
                let registrar = registrar.clone();
                let code = code.clone();
                tokio::spawn(async move { registrar.confirm("a@b.com", &code).await })
            })
            .collect();

        let mut outcomes = Vec::new();
        for attempt in attempts {
            outcomes.push(attempt.await.unwrap().unwrap());
        }
        let confirmed = outcomes
            .iter()
            .filter(|outcome| **outcome == ConfirmOutcome::Confirmed)
            .count();
        assert_eq!(confirmed, 1);
        assert!(outcomes
            .iter()
            .all(|outcome| matches!(outcome, ConfirmOutcome::Confirmed | ConfirmOutcome::NotPending)));
        assert_eq!(store.find_all().await.unwrap().len(), 1);
        assert_eq!(registrar.sessions.len().await, 0);
    }
}
