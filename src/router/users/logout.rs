use axum::Json;
use axum::http::HeaderName;
use axum::http::header::SET_COOKIE;
use axum::response::AppendHeaders;
use serde::{Deserialize, Serialize};

use crate::cookies::{self, ACCESS_COOKIE, REFRESH_COOKIE};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub logged_out: bool,
}

/// Handler to log out. Tokens are stateless, so only cookies are cleared.
pub async fn handler() -> (AppendHeaders<[(HeaderName, String); 2]>, Json<Response>) {
    (
        AppendHeaders([
            (SET_COOKIE, cookies::removal(ACCESS_COOKIE)),
            (SET_COOKIE, cookies::removal(REFRESH_COOKIE)),
        ]),
        Json(Response { logged_out: true }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::*;
    use axum::http::{Method, StatusCode};

    #[tokio::test]
    async fn test_logout_clears_cookies() {
        let (_, _, state) = router::state();

        let response =
            make_request(app(state), Method::DELETE, "/v1/users/logout", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let cookies: Vec<_> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .map(|value| value.to_str().unwrap().to_owned())
            .collect();
        assert_eq!(cookies.len(), 2);
        assert!(cookies[0].starts_with("accessToken=;"));
        assert!(cookies[1].starts_with("refreshToken=;"));
        assert!(cookies.iter().all(|cookie| cookie.contains("Max-Age=0")));
    }
}
