use axum::Json;
use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::response::AppendHeaders;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::cookies::{self, ACCESS_COOKIE, REFRESH_COOKIE};
use crate::error::Result;
use crate::router::Valid;
use crate::token::TokenKind;
use crate::user::PublicUser;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Body {
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
    #[validate(length(min = 1, max = 256, message = "Password is required."))]
    pub password: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(flatten)]
    pub user: PublicUser,
}

/// Handler to log in. Tokens are returned in the body and as cookies.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<(AppendHeaders<[(axum::http::HeaderName, String); 2]>, Json<Response>)> {
    let session = state.users.login(&body.email, &body.password).await?;

    // Both cookies outlive the access token so an expired one can still be read.
    let max_age = state.token.lifetime(TokenKind::Refresh);
    let cookies = AppendHeaders([
        (
            SET_COOKIE,
            cookies::session(ACCESS_COOKIE, session.tokens.access_token.clone(), max_age),
        ),
        (
            SET_COOKIE,
            cookies::session(REFRESH_COOKIE, session.tokens.refresh_token.clone(), max_age),
        ),
    ]);

    Ok((
        cookies,
        Json(Response {
            access_token: session.tokens.access_token,
            refresh_token: session.tokens.refresh_token,
            user: session.user,
        }),
    ))
}
