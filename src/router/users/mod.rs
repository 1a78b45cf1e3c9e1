//! Users-related HTTP API.
mod login;
mod logout;
mod me;
mod refresh_token;
mod register;
mod verify;

use axum::routing::{delete, get, post, put};
use axum::{Router, middleware};

use crate::AppState;
use crate::middleware::authorize;

pub fn router(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        // `GET /v1/users/@me` goes to `me`. Authorization required.
        .route("/@me", get(me::handler))
        .route_layer(middleware::from_fn_with_state(state, authorize));

    Router::new()
        .route("/register", post(register::handler))
        .route("/verify", put(verify::handler))
        .route("/login", put(login::handler))
        .route("/logout", delete(logout::handler))
        .route(
            "/refresh_token",
            get(refresh_token::handler).put(refresh_token::handler),
        )
        .merge(protected)
}
