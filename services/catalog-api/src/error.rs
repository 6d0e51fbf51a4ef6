//! Service-specific error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Inbound authentication failures.
///
/// These are the only failures answered with a real HTTP error status:
/// query routes encode everything else as `{"error": …}` data so the mobile
/// client has a single happy-path response shape to parse.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Not authorized: Missing token")]
    MissingToken,

    #[error("Not authorized: Invalid token")]
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, self.to_string()).into_response()
    }
}
