//! Error handler for gatehouse.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::ValidationErrors;

use crate::crypto::CryptoError;
use crate::token::SigningError;

pub type Result<T> = std::result::Result<T, ServerError>;

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Axum(#[from] JsonRejection),

    #[error("Unauthorized! (token not found)")]
    MissingCredential,

    #[error("Need to refresh token.")]
    ExpiredCredential,

    #[error("Unauthorized!")]
    InvalidCredential,

    #[error("Please Sign In! (Error from refresh Token)")]
    RefreshRejected,

    #[error("cannot sign token")]
    SigningFailure(#[from] SigningError),

    #[error("Account not found!")]
    AccountNotFound,

    #[error("Your account is not active!")]
    AccountInactive,

    #[error("Your account is already active!")]
    AccountAlreadyActive,

    #[error("Email already exists!")]
    AccountConflict,

    #[error("Your Email or Password is incorrect!")]
    CredentialMismatch,

    #[error("Token is invalid")]
    VerificationMismatch,

    #[error("internal server error, {details}")]
    Internal {
        details: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl From<CryptoError> for ServerError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::Mismatch => ServerError::CredentialMismatch,
            err => ServerError::Internal {
                details: "password hashing failed".into(),
                source: Some(Box::new(err)),
            },
        }
    }
}

impl ServerError {
    /// HTTP status returned for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Validation(_) | ServerError::Axum(_) => StatusCode::BAD_REQUEST,
            ServerError::MissingCredential | ServerError::InvalidCredential => {
                StatusCode::UNAUTHORIZED
            },
            ServerError::ExpiredCredential => StatusCode::GONE,
            ServerError::RefreshRejected => StatusCode::FORBIDDEN,
            ServerError::AccountNotFound => StatusCode::NOT_FOUND,
            ServerError::AccountInactive
            | ServerError::AccountAlreadyActive
            | ServerError::CredentialMismatch
            | ServerError::VerificationMismatch => StatusCode::NOT_ACCEPTABLE,
            ServerError::AccountConflict => StatusCode::CONFLICT,
            ServerError::SigningFailure(_) | ServerError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }
}

/// Problem document returned for every error.
#[derive(Debug, Serialize, Deserialize)]
pub struct Problem {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub title: String,
    pub status: u16,
    pub detail: Option<String>,
    pub instance: Option<String>,
    pub errors: Option<Vec<FieldError>>,
}

/// One failed validation rule.
#[derive(Debug, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

fn field_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut fields: Vec<FieldError> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, issues)| {
            issues.iter().map(move |issue| FieldError {
                field: field.to_string(),
                message: issue
                    .message
                    .as_deref()
                    .map_or_else(|| issue.code.to_string(), str::to_owned),
            })
        })
        .collect();
    fields.sort_by(|a, b| a.field.cmp(&b.field));
    fields
}

impl ServerError {
    fn title(&self) -> &'static str {
        match self {
            ServerError::Validation(_) => "There were validation errors with your request.",
            ServerError::Axum(_) => "Malformed request body.",
            ServerError::MissingCredential
            | ServerError::ExpiredCredential
            | ServerError::InvalidCredential
            | ServerError::RefreshRejected => "Authentication failed.",
            ServerError::SigningFailure(_) | ServerError::Internal { .. } => {
                "Internal server error."
            },
            _ => "Request rejected.",
        }
    }

    /// Build the client-facing document. Internal failures carry no detail.
    pub fn problem(&self) -> Problem {
        let status = self.status();
        let detail = (status != StatusCode::INTERNAL_SERVER_ERROR).then(|| self.to_string());
        let errors = match self {
            ServerError::Validation(errors) => Some(field_errors(errors)),
            _ => None,
        };

        Problem {
            kind: None,
            title: self.title().to_owned(),
            status: status.as_u16(),
            detail,
            instance: None,
            errors,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        match &self {
            ServerError::SigningFailure(err) => {
                tracing::error!(error = %err, "token signing failed");
            },
            ServerError::Internal { details, source } => {
                tracing::error!(err = ?source, %details, "server returned 500 status");
            },
            _ => {},
        }

        (self.status(), Json(self.problem())).into_response()
    }
}
