use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
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
    #[validate(
        length(
            min = 8,
            max = 256,
            message = "Password must contain at least 8 characters."
        ),
        custom(
            function = "crate::router::validate_password",
            message = "Password must include at least 1 letter and 1 number."
        )
    )]
    pub password: String,
}

/// Handler to create user.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<(StatusCode, Json<PublicUser>)> {
    let user = state.users.create(&body.email, &body.password).await?;

    Ok((StatusCode::CREATED, Json(user)))
}
