//! REST API types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ServerError;
use crate::models::{HreflangLink, ImportRun};

/// Links for one item.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HreflangResponse {
    pub item: u64,
    pub default_language: String,
    pub links: Vec<HreflangLink>,
}

/// Retained runs, newest first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunsResponse {
    pub running: bool,
    pub feed_url: String,
    pub runs: Vec<ImportRun>,
}

/// Admin form body.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedForm {
    /// `save` or `clear`
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub import_file: String,
    #[serde(default)]
    pub nonce: String,
}

/// `?default=` override for the hreflang endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RenderQuery {
    #[serde(default)]
    pub default: Option<String>,
}

/// Create an error response body
pub fn error_response(error: &str) -> Value {
    json!({
        "status": "error",
        "error": error,
    })
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServerError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServerError::Store(_) | ServerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(error_response(&self.to_string()))).into_response()
    }
}
