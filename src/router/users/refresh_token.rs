//! Get a new access token with a refresh token.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, HeaderName};
use axum::response::AppendHeaders;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::cookies::{self, ACCESS_COOKIE, REFRESH_COOKIE};
use crate::error::ServerError;
use crate::token::TokenKind;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Body {
    refresh_token: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub access_token: String,
}

/// Refresh token from the cookie, or from a `{"refreshToken": ..}` body.
fn refresh_token(headers: &HeaderMap, body: &[u8]) -> Option<String> {
    cookies::read(headers, REFRESH_COOKIE).or_else(|| {
        serde_json::from_slice::<Body>(body)
            .ok()
            .map(|body| body.refresh_token)
            .filter(|token| !token.is_empty())
    })
}

pub async fn handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(AppendHeaders<[(HeaderName, String); 1]>, Json<Response>), ServerError> {
    let token = refresh_token(&headers, &body).ok_or(ServerError::RefreshRejected)?;
    let access_token = state.users.refresh(&token)?;

    let cookie = cookies::session(
        ACCESS_COOKIE,
        access_token.clone(),
        state.token.lifetime(TokenKind::Refresh),
    );

    Ok((
        AppendHeaders([(SET_COOKIE, cookie)]),
        Json(Response { access_token }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::users::tests::active_user;
    use crate::*;
    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::json;

    #[tokio::test]
    async fn test_refresh_from_cookie_after_expiry() {
        let (clock, mail, state) = router::state();
        let user = active_user(&state, &mail, "ada@example.com").await;
        let session = state.users.login("ada@example.com", "Passw0rd!").await.unwrap();

        clock.advance(state.token.lifetime(TokenKind::Access).as_secs());

        let response = make_request(
            app(state.clone()),
            Method::PUT,
            "/v1/users/refresh_token",
            None,
            Some(&format!("refreshToken={}", session.tokens.refresh_token)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response
                .headers()
                .get(SET_COOKIE)
                .unwrap()
                .to_str()
                .unwrap()
                .starts_with("accessToken=")
        );

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Response = serde_json::from_slice(&bytes).unwrap();
        let principal = state.token.decode(TokenKind::Access, &body.access_token).unwrap();
        assert_eq!(principal.id, user.id);
    }

    #[tokio::test]
    async fn test_refresh_from_body() {
        let (_, mail, state) = router::state();
        active_user(&state, &mail, "ada@example.com").await;
        let session = state.users.login("ada@example.com", "Passw0rd!").await.unwrap();
        let body = json!({ "refreshToken": session.tokens.refresh_token }).to_string();

        let response =
            make_request(app(state), Method::GET, "/v1/users/refresh_token", Some(body), None)
                .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_refresh_from_quoted_cookie() {
        let (_, mail, state) = router::state();
        active_user(&state, &mail, "ada@example.com").await;
        let session = state.users.login("ada@example.com", "Passw0rd!").await.unwrap();

        let response = make_request(
            app(state),
            Method::PUT,
            "/v1/users/refresh_token",
            None,
            Some(&format!(r#"refreshToken="{}""#, session.tokens.refresh_token)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_refresh_rejected() {
        let (clock, mail, state) = router::state();
        active_user(&state, &mail, "ada@example.com").await;
        let session = state.users.login("ada@example.com", "Passw0rd!").await.unwrap();

        let response =
            make_request(app(state.clone()), Method::PUT, "/v1/users/refresh_token", None, None)
                .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        // An access token is not a refresh token.
        let response = make_request(
            app(state.clone()),
            Method::PUT,
            "/v1/users/refresh_token",
            None,
            Some(&format!("refreshToken={}", session.tokens.access_token)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        clock.advance(state.token.lifetime(TokenKind::Refresh).as_secs());
        let response = make_request(
            app(state),
            Method::PUT,
            "/v1/users/refresh_token",
            None,
            Some(&format!("refreshToken={}", session.tokens.refresh_token)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
