//! Gatehouse handles account registration, email verification and login, and
//! authenticates requests with stateless signed tokens.

#![forbid(unsafe_code)]

pub mod clock;
pub mod config;
pub mod cookies;
pub mod crypto;
pub mod error;
pub mod mail;
pub mod middleware;
mod router;
pub mod telemetry;
pub mod token;
pub mod user;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::routing::get;
use axum::{Router, middleware as AxumMiddleware};
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};

use crate::clock::Clock;
use crate::config::Configuration;
use crate::crypto::PasswordManager;
use crate::mail::Mailer;
use crate::token::{Secret, TokenManager, TokenProvider};
use crate::user::{UserRepository, UserService};

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    app: Router,
    method: Method,
    path: &str,
    body: Option<String>,
    cookie: Option<&str>,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        request = request.header(header::COOKIE, cookie);
    }

    app.oneshot(
        request
            .body(axum::body::Body::from(body.unwrap_or_default()))
            .unwrap(),
    )
    .await
    .unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Configuration>,
    pub token: TokenManager,
    pub users: UserService,
}

/// CORS policy. Credentials (cookies) are only allowed with an explicit
/// origin whitelist.
fn cors(config: &Configuration) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    let layer = CorsLayer::new().allow_methods([
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ]);

    if origins.is_empty() {
        layer.allow_origin(Any).allow_headers(Any)
    } else {
        layer
            .allow_origin(AllowOrigin::list(origins))
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            .allow_credentials(true)
    }
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(
                        size_bytes = chunk.len(),
                        latency = ?latency,
                        "sending body chunk"
                    )
                })
                .make_span_with(
                    DefaultMakeSpan::new()
                        .include_headers(true)
                        .level(tracing::Level::INFO),
                )
                .on_request(DefaultOnRequest::new())
                .on_response(
                    DefaultOnResponse::new()
                        .include_headers(true)
                        .latency_unit(LatencyUnit::Micros),
                ),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(10),
        ))
        // Remove senstive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([
            header::AUTHORIZATION,
            header::COOKIE,
            header::SET_COOKIE,
        ]))
        // Responses carry credentials, never cache them.
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(cors(&state.config));

    Router::new()
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(router::status::status))
        .nest("/v1/users", router::users::router(state.clone()))
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Assemble the application state from its collaborators.
pub fn build_state(
    config: Arc<Configuration>,
    (access, refresh): (Secret, Secret),
    clock: Arc<dyn Clock>,
    repo: Arc<dyn UserRepository>,
    mail: Arc<dyn Mailer>,
) -> Result<AppState, Box<dyn std::error::Error + Send + Sync>> {
    config.token.validate()?;
    let (access, refresh) = config.token.policies(access, refresh);
    let token = TokenManager::new(TokenProvider::new(clock), access, refresh);
    let pwd = Arc::new(PasswordManager::new(config.argon2.clone())?);
    let users = UserService::new(repo, pwd, token.clone(), mail, &config.url)?;

    Ok(AppState {
        config,
        token,
        users,
    })
}

/// Initialize the application state.
pub fn initialize_state(
    config: Arc<Configuration>,
) -> Result<AppState, Box<dyn std::error::Error + Send + Sync>> {
    let secrets = config::secrets_from_env()?;

    build_state(
        config,
        secrets,
        Arc::new(clock::SystemClock),
        Arc::new(user::MemoryUserRepository::new()),
        Arc::new(mail::TracingMailer),
    )
}
