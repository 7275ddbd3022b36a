use axum::extract::rejection::QueryRejection;
use axum::extract::Query;
use axum::Extension;
use chrono::{DateTime, Utc};
use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::Pbkdf2;
use rand_core::OsRng;
use serde::{Deserialize, Serialize};

use crate::registration::ConfirmOutcome;
use crate::tasks::ByEmail;
use crate::{breaks, proceeds, AppState, Error, Payload};

pub fn hash_password(password: &str) -> Result<String, Error> {
    Ok(Pbkdf2
        .hash_password(password.as_bytes(), &SaltString::generate(&mut OsRng))?
        .to_string())
}

pub fn verify_password(password: &str, password_hash: &str) -> Result<bool, Error> {
    let hash = PasswordHash::new(password_hash)?;
    Ok(Pbkdf2.verify_password(password.as_bytes(), &hash).is_ok())
}

pub async fn register(
    query: Result<Query<Register>, QueryRejection>,
    Extension(state): Extension<AppState>,
) -> Payload<RegistrationPending> {
    let Query(req) = query?;
    let expires_at = state.registrar.start(&req.email, &req.password).await?;
    proceeds(RegistrationPending {
        pending: true,
        expires_at,
        expires_in_secs: state.registrar.ttl().num_seconds(),
    })
}

pub async fn finish_registration(
    query: Result<Query<FinishRegistration>, QueryRejection>,
    Extension(state): Extension<AppState>,
) -> Payload<RegistrationFinished> {
    let Query(req) = query?;
    let outcome = state.registrar.confirm(&req.email, &req.code).await?;
    let message = match outcome {
        ConfirmOutcome::Confirmed => {
            return proceeds(RegistrationFinished {
                registration: outcome,
            })
        }
        ConfirmOutcome::TimedOut => "Activation code has expired, register again",
        ConfirmOutcome::InvalidCode => "Activation code does not match",
        ConfirmOutcome::NotPending => "No registration is pending for this email",
    };
    breaks(Error::RegistrationFailed {
        outcome,
        message: message.to_string(),
    })
}

pub async fn login(
    query: Result<Query<Login>, QueryRejection>,
    Extension(state): Extension<AppState>,
) -> Payload<LoggedIn> {
    let Query(req) = query?;
    let authenticated = match state.store.find_by_email(&req.email).await? {
        Some(user) => verify_password(&req.password, &user.password_hash)?,
        None => false,
    };
    if !authenticated {
        log::debug!("Rejected login for {}", req.email);
    }
    proceeds(LoggedIn { authenticated })
}

pub async fn delete_user(
    query: Result<Query<ByEmail>, QueryRejection>,
    Extension(state): Extension<AppState>,
) -> Payload<UserDeleted> {
    let Query(req) = query?;
    state.store.delete(&req.email).await?;
    log::info!("Deleted user {}", req.email);
    proceeds(UserDeleted {
        deleted: req.email,
    })
}

pub async fn change_password(
    query: Result<Query<ChangePassword>, QueryRejection>,
    Extension(state): Extension<AppState>,
) -> Payload<PasswordChanged> {
    let Query(req) = query?;
    if req.new_password.is_empty() {
        return breaks(Error::MissingCredentials {
            message: "`new_password` parameter was empty".to_string(),
        });
    }

    let hash = hash_password(&req.new_password)?;
    state.store.update_password(&req.email, &hash).await?;
    log::info!("Password changed for {}", req.email);
    proceeds(PasswordChanged {
        email: req.email,
        changed: true,
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct Register {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FinishRegistration {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Login {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangePassword {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistrationPending {
    pending: bool,
    expires_at: DateTime<Utc>,
    expires_in_secs: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistrationFinished {
    registration: ConfirmOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggedIn {
    authenticated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserDeleted {
    deleted: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PasswordChanged {
    email: String,
    changed: bool,
}
