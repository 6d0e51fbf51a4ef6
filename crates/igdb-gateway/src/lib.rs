//! Upstream gateway for the IGDB query API
//!
//! Executes outbound queries with authentication and resilience: attaches
//! the cached credential, detects authentication failure, triggers a
//! credential refresh, and retries with bounded exponential backoff. The
//! gateway never interprets response payloads: bodies pass through to the
//! route handlers untouched.

pub mod error;
pub mod gateway;

pub use error::{Error, Result};
pub use gateway::{RetryPolicy, UpstreamGateway};
