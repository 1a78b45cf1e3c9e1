pub mod status;
pub mod users;

use axum::Json;
use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationError};

use crate::error::ServerError;

/// JSON body checked with [`Validate`] before reaching the handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct Valid<T>(pub T);

impl<T, S> FromRequest<S> for Valid<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Valid(value))
    }
}

/// Password must mix letters and digits.
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    let has_letter = password.chars().any(|c| c.is_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());

    if has_letter && has_digit {
        Ok(())
    } else {
        Err(ValidationError::new("weak_password"))
    }
}

/// State backed by memory storage and a clock frozen on
/// [`crate::token::tests::NOW`].
#[cfg(test)]
pub fn state() -> (
    std::sync::Arc<crate::clock::FixedClock>,
    std::sync::Arc<crate::mail::RecordingMailer>,
    crate::AppState,
) {
    use std::sync::Arc;

    use crate::clock::FixedClock;
    use crate::config::{Argon2Params, Configuration};
    use crate::mail::RecordingMailer;
    use crate::token::Secret;

    let clock = Arc::new(FixedClock::new(crate::token::tests::NOW));
    let mail = Arc::new(RecordingMailer::default());
    let config = Configuration {
        argon2: Some(Argon2Params {
            memory_cost: 1024,
            iterations: 1,
            parallelism: 1,
            hash_length: 32,
        }),
        ..Default::default()
    };

    let state = crate::build_state(
        Arc::new(config),
        (Secret::new("access-secret"), Secret::new("refresh-secret")),
        clock.clone(),
        Arc::new(crate::user::MemoryUserRepository::new()),
        mail.clone(),
    )
    .expect("cannot build test state");

    (clock, mail, state)
}
