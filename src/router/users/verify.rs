use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::Result;
use crate::router::Valid;
use crate::user::PublicUser;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Body {
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
    #[validate(length(min = 1, message = "Token is required."))]
    pub token: String,
}

/// Handler to activate an account.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<Json<PublicUser>> {
    Ok(Json(
        state.users.verify_account(&body.email, &body.token).await?,
    ))
}
