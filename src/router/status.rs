//! Public server status for front-end identification.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::config::Configuration;

/// Structured configuration.
#[derive(Debug, Serialize, Deserialize)]
pub struct Status {
    version: String,
    name: String,
    url: String,
}

/// Public server status (configuration).
pub async fn status(State(config): State<Arc<Configuration>>) -> Json<Status> {
    Json(Status {
        version: config.version.clone(),
        name: config.name.clone(),
        url: config.url.clone(),
    })
}
