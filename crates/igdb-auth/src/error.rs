//! Error types for credential operations

/// Errors from credential storage and refresh.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The durable credential document could not be read or written.
    /// Callers treat this as "no credential", never as a fatal error.
    #[error("credential store unavailable: {0}")]
    StoreUnavailable(String),

    /// The OAuth client-credentials exchange failed. Surfaced to the caller
    /// without retry; retry policy lives in the gateway, not here.
    #[error("credential refresh failed: {0}")]
    RefreshFailed(String),
}

/// Result alias for credential operations.
pub type Result<T> = std::result::Result<T, Error>;
