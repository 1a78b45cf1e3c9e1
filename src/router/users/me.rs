use axum::extract::State;
use axum::{Extension, Json};

use crate::AppState;
use crate::error::Result;
use crate::token::Principal;
use crate::user::PublicUser;

/// Profile of the authenticated user.
pub async fn handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<PublicUser>> {
    Ok(Json(state.users.profile(&principal).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::users::tests::active_user;
    use crate::token::TokenKind;
    use crate::token::tests::tamper;
    use crate::*;
    use axum::http::{Method, StatusCode, header};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn body_text(response: axum::http::Response<axum::body::Body>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    #[tokio::test]
    async fn test_admitted() {
        let (_, mail, state) = router::state();
        let user = active_user(&state, &mail, "ada@example.com").await;
        let session = state.users.login("ada@example.com", "Passw0rd!").await.unwrap();

        let response = make_request(
            app(state),
            Method::GET,
            "/v1/users/@me",
            None,
            Some(&format!("accessToken={}", session.tokens.access_token)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: PublicUser = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, user);
    }

    #[tokio::test]
    async fn test_admitted_with_bearer() {
        let (_, mail, state) = router::state();
        active_user(&state, &mail, "ada@example.com").await;
        let session = state.users.login("ada@example.com", "Passw0rd!").await.unwrap();

        let response = app(state)
            .oneshot(
                axum::extract::Request::builder()
                    .method(Method::GET)
                    .uri("/v1/users/@me")
                    .header(
                        header::AUTHORIZATION,
                        format!("Bearer {}", session.tokens.access_token),
                    )
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_token() {
        let (_, _, state) = router::state();

        let response = make_request(app(state), Method::GET, "/v1/users/@me", None, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(body_text(response).await.contains("token not found"));
    }

    #[tokio::test]
    async fn test_expired_token() {
        let (clock, mail, state) = router::state();
        let user = active_user(&state, &mail, "ada@example.com").await;
        let session = state.users.login("ada@example.com", "Passw0rd!").await.unwrap();

        clock.advance(state.token.lifetime(TokenKind::Access).as_secs());

        let response = make_request(
            app(state),
            Method::GET,
            "/v1/users/@me",
            None,
            Some(&format!("accessToken={}", session.tokens.access_token)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::GONE);

        let text = body_text(response).await;
        assert!(text.contains("Need to refresh token."));
        assert!(!text.contains(&user.id));
        assert!(!text.contains("ada@example.com"));
    }

    #[tokio::test]
    async fn test_tampered_token() {
        let (_, mail, state) = router::state();
        active_user(&state, &mail, "ada@example.com").await;
        let session = state.users.login("ada@example.com", "Passw0rd!").await.unwrap();

        let response = make_request(
            app(state),
            Method::GET,
            "/v1/users/@me",
            None,
            Some(&format!("accessToken={}", tamper(&session.tokens.access_token))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let text = body_text(response).await;
        assert!(text.contains("Unauthorized!"));
        assert!(!text.contains("token not found"));
    }
}
