#![allow(non_snake_case)]

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;

use serde::Serialize;

use crate::registration::ConfirmOutcome;

pub async fn handler404(path: Uri) -> Error {
    Error::NotFound {
        message: format!("Invalid path: {}", path),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Maybe<T> {
    Nothing(Error),
    Fine(Success<T>),
}

pub fn Fine<V>(v: V) -> Maybe<V>
where
    V: Serialize,
{
    Maybe::Fine(Success::of(v))
}

pub fn Nothing<V>(err: Error) -> Maybe<V> {
    Maybe::Nothing(err)
}

#[derive(Debug, Clone, Serialize)]
pub struct Success<V> {
    success: bool,
    #[serde(flatten)]
    value: V,
}

impl<T> IntoResponse for Maybe<T>
where
    T: Serialize,
{
    fn into_response(self) -> Response {
        match self {
            Maybe::Nothing(err) => err.into_response(),
            Maybe::Fine(success) => Json::into_response(Json(success)),
        }
    }
}

impl<V: Serialize> Success<V> {
    pub fn of(value: V) -> Self {
        Self {
            success: true,
            value,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "error")]
pub enum Error {
    NotFound { message: String },
    InvalidPayload { message: String },
    InvalidEmail { message: String },
    MissingCredentials { message: String },
    UserDoesNotExist { message: String },
    UserAlreadyExists { message: String },
    TaskDoesNotExist { message: String },
    RegistrationFailed { outcome: ConfirmOutcome, message: String },
    InternalError { kind: &'static str, message: String },
    Unknown { message: String },
}

impl Error {
    pub fn unknown<S: Into<String>>(msg: S) -> Error {
        Error::Unknown {
            message: msg.into(),
        }
    }

    pub fn no_user(email: &str) -> Error {
        Error::UserDoesNotExist {
            message: format!("User with email `{}` does not exist!", email),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::NotFound { .. }
            | Error::UserDoesNotExist { .. }
            | Error::TaskDoesNotExist { .. } => StatusCode::NOT_FOUND,
            Error::InvalidPayload { .. }
            | Error::InvalidEmail { .. }
            | Error::MissingCredentials { .. }
            | Error::RegistrationFailed { .. } => StatusCode::BAD_REQUEST,
            Error::UserAlreadyExists { .. } => StatusCode::CONFLICT,
            Error::InternalError { .. } | Error::Unknown { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InternalError { kind, message } => write!(f, "{}: {}", kind, message),
            Error::RegistrationFailed { outcome, message } => {
                write!(f, "{:?}: {}", outcome, message)
            }
            Error::NotFound { message }
            | Error::InvalidPayload { message }
            | Error::InvalidEmail { message }
            | Error::MissingCredentials { message }
            | Error::UserDoesNotExist { message }
            | Error::UserAlreadyExists { message }
            | Error::TaskDoesNotExist { message }
            | Error::Unknown { message } => f.write_str(message),
        }
    }
}

impl std::error::Error for Error {}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::InternalError {
            kind: "DatabaseError",
            message: err.to_string(),
        }
    }
}

impl From<uuid::Error> for Error {
    fn from(id: uuid::Error) -> Self {
        Self::InvalidPayload {
            message: format!("Malformed task id: {}", id),
        }
    }
}

impl From<chrono::ParseError> for Error {
    fn from(err: chrono::ParseError) -> Self {
        Self::InvalidPayload {
            message: format!("Malformed deadline, expected RFC 3339: {}", err),
        }
    }
}

impl From<QueryRejection> for Error {
    fn from(rejection: QueryRejection) -> Self {
        Self::InvalidPayload {
            message: format!("Malformed query parameters: {}", rejection),
        }
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidPayload {
            message: format!("Malformed task body: {}", rejection),
        }
    }
}

impl From<pbkdf2::password_hash::Error> for Error {
    fn from(err: pbkdf2::password_hash::Error) -> Self {
        Self::InternalError {
            kind: "HashingError",
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::InternalError {
            kind: "MailError",
            message: err.to_string(),
        }
    }
}
