//! Token cookies.
//!
//! Tokens travel in HttpOnly cookies readable by any origin allowed by CORS,
//! hence `SameSite=None; Secure`.

use std::time::Duration;

use axum::http::{HeaderMap, header};
use cookie::time::Duration as CookieDuration;
use cookie::{Cookie, SameSite};

/// Cookie carrying the access token.
pub const ACCESS_COOKIE: &str = "accessToken";
/// Cookie carrying the refresh token.
pub const REFRESH_COOKIE: &str = "refreshToken";

/// Value of cookie `name` across every `Cookie` header, without surrounding
/// quotes. Empty values count as absent.
pub fn read(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| Cookie::split_parse(value))
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value_trimmed().to_owned())
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` value storing `value` for `max_age`.
pub fn session(name: &'static str, value: String, max_age: Duration) -> String {
    let max_age = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);

    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::None)
        .max_age(CookieDuration::seconds(max_age))
        .build()
        .to_string()
}

/// `Set-Cookie` value telling the browser to drop cookie `name`.
pub fn removal(name: &'static str) -> String {
    let mut cookie = Cookie::build(name)
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::None)
        .build();
    cookie.make_removal();
    cookie.to_string()
}
