//! Error types for upstream operations

/// Errors surfaced by the gateway to route handlers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The retry budget is exhausted; carries the last attempt's failure.
    /// No partial result is synthesized.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Credential refresh or store access failed mid-request. Propagated
    /// as-is; a broken token exchange is not retried by the gateway.
    #[error(transparent)]
    Credential(#[from] igdb_auth::Error),
}

/// Result alias for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;
