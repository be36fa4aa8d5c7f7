//! Errors that end up as HTTP responses.
//!
//! Each one is rendered as `{"error": "<message>"}` with a fitting status
//! and logged on the way out.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Reasons a websocket request is turned away before upgrade.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("Missing required header information for websocket")]
    MissingParameters,
    #[error("Game token is invalid on websocket upgrade")]
    InvalidGameToken,
    #[error("Player id is invalid on websocket upgrade")]
    InvalidPlayer,
    #[error("Invalid value for numPlayers")]
    InvalidPlayerCount,
}

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("You need to be an administrator to perform this operation.")]
    Forbidden,
    #[error("{0}")]
    Encoding(#[from] serde_json::Error),
}

impl AdminError {
    fn status(&self) -> StatusCode {
        match self {
            AdminError::Forbidden => StatusCode::FORBIDDEN,
            AdminError::Encoding(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn error_body(status: StatusCode, msg: String) -> Response {
    (status, Json(serde_json::json!({ "error": msg }))).into_response()
}

impl IntoResponse for AdmissionError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self, "rejecting websocket request");
        error_body(StatusCode::BAD_REQUEST, self.to_string())
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "admin request failed");
        } else {
            tracing::warn!(error = %self, "admin request refused");
        }
        error_body(status, self.to_string())
    }
}
