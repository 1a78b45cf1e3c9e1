//! Middlewares for routes.
//!
//! The authentication gate admits a request only when it carries a valid access
//! token. Rejections tell the client what to do next: a missing or invalid
//! token means signing in again, an expired one means calling the refresh
//! route.

use axum::extract::{Request, State};
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::Response;

use crate::AppState;
use crate::cookies::{self, ACCESS_COOKIE};
use crate::error::{Result, ServerError};
use crate::token::{Principal, TokenKind, TokenManager, VerifyError};

const BEARER: &str = "bearer ";

/// Why a request was not authenticated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reason {
    Missing,
    Expired,
    InvalidSignature,
}

impl Reason {
    fn as_str(&self) -> &'static str {
        match self {
            Reason::Missing => "missing",
            Reason::Expired => "expired",
            Reason::InvalidSignature => "invalid_signature",
        }
    }
}

impl From<Reason> for ServerError {
    fn from(reason: Reason) -> Self {
        match reason {
            Reason::Missing => ServerError::MissingCredential,
            Reason::Expired => ServerError::ExpiredCredential,
            Reason::InvalidSignature => ServerError::InvalidCredential,
        }
    }
}

/// Outcome of the gate for one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthResult {
    Authenticated(Principal),
    Unauthenticated(Reason),
}

/// Token of an `Authorization: Bearer` header. The scheme is matched
/// case-insensitively.
fn bearer(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let scheme = value.get(..BEARER.len())?;
    if !scheme.eq_ignore_ascii_case(BEARER) {
        return None;
    }

    Some(value[BEARER.len()..].trim().to_owned()).filter(|token| !token.is_empty())
}

/// Access token from the cookie, or from an `Authorization: Bearer` header.
fn access_token(headers: &HeaderMap) -> Option<String> {
    cookies::read(headers, ACCESS_COOKIE).or_else(|| bearer(headers))
}

/// Decide whether the request headers carry a valid access token.
pub fn authenticate(tokens: &TokenManager, headers: &HeaderMap) -> AuthResult {
    let Some(token) = access_token(headers) else {
        return AuthResult::Unauthenticated(Reason::Missing);
    };

    match tokens.decode(TokenKind::Access, &token) {
        Ok(principal) => AuthResult::Authenticated(principal),
        Err(VerifyError::Expired) => AuthResult::Unauthenticated(Reason::Expired),
        Err(VerifyError::InvalidSignature) => {
            AuthResult::Unauthenticated(Reason::InvalidSignature)
        },
    }
}

/// Middleware admitting only authenticated requests.
///
/// On success the [`Principal`] is added to request extensions.
pub async fn authorize(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    match authenticate(&state.token, req.headers()) {
        AuthResult::Authenticated(principal) => {
            metrics::counter!("auth_gate_outcomes_total", "outcome" => "admitted").increment(1);
            req.extensions_mut().insert(principal);
            Ok(next.run(req).await)
        },
        AuthResult::Unauthenticated(reason) => {
            metrics::counter!("auth_gate_outcomes_total", "outcome" => reason.as_str())
                .increment(1);
            tracing::debug!(reason = reason.as_str(), "request rejected by auth gate");
            Err(reason.into())
        },
    }
}
