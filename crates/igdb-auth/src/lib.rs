//! IGDB OAuth authentication library
//!
//! Provides the client-credentials token exchange and the durable credential
//! store shared by every request handler in the catalog service. This crate
//! is a standalone library with no dependency on the service binary, so it can
//! be tested and used independently.
//!
//! Credential flow:
//! 1. Gateway asks `CredentialStore::get()` for the current credential
//! 2. On a cache miss, the store reads the durable credential document
//! 3. When upstream rejects the credential (401), the gateway calls
//!    `CredentialStore::refresh()`
//! 4. `refresh()` runs `token::fetch_token()` (client-credentials grant),
//!    persists the new credential, and updates the in-memory cache

pub mod constants;
pub mod credentials;
pub mod error;
pub mod token;

pub use constants::*;
pub use credentials::{Credential, CredentialStore};
pub use error::{Error, Result};
pub use token::{TokenResponse, fetch_token};
