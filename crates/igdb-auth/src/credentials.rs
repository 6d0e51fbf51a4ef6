//! Durable credential storage
//!
//! Exactly one upstream credential exists process-wide. It lives in a JSON
//! document on disk (the durable store, surviving restarts) and in an
//! in-memory cache guarded by a tokio Mutex. `get()` reads through to the
//! document on a cache miss; `refresh()` writes the new credential back to
//! both. All document writes use atomic temp-file + rename.
//!
//! Concurrent refreshes are not coalesced: each caller runs its own token
//! exchange and the last writer wins. Every caller still ends up holding a
//! valid credential, so convergence after a stampede of 401s is guaranteed
//! without mutual exclusion around the exchange itself.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use common::Secret;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::token;

/// The upstream authorization credential.
///
/// `authorization` is the full header value (`"bearer <token>"`), stored
/// under the `IGDB_AUTHORIZATION` key in the durable document. `obtained_at`
/// is a unix timestamp in milliseconds recorded when the exchange completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(rename = "IGDB_AUTHORIZATION")]
    pub authorization: String,
    /// When the credential was obtained, unix milliseconds
    #[serde(default)]
    pub obtained_at: u64,
}

/// Single source of truth for the upstream credential.
///
/// The Mutex guards only the in-memory cache; the token exchange and the
/// document write happen outside any lock, so readers are never blocked on
/// the network.
pub struct CredentialStore {
    path: PathBuf,
    cache: Mutex<Option<Credential>>,
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: Secret<String>,
}

impl CredentialStore {
    pub fn new(
        path: PathBuf,
        client: reqwest::Client,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: Secret<String>,
    ) -> Self {
        Self {
            path,
            cache: Mutex::new(None),
            client,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret,
        }
    }

    /// The app's client id, sent as the `Client-ID` header on every upstream
    /// request.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Return the current credential.
    ///
    /// Served from the in-memory cache when populated; otherwise one durable
    /// read. A missing document is `Ok(None)` (cold start before the first
    /// refresh). An unreadable or corrupt document is `StoreUnavailable`,
    /// which callers treat as "no credential".
    pub async fn get(&self) -> Result<Option<Credential>> {
        let mut cache = self.cache.lock().await;
        if let Some(credential) = cache.as_ref() {
            return Ok(Some(credential.clone()));
        }

        if !self.path.exists() {
            debug!(path = %self.path.display(), "no credential document, starting unauthenticated");
            return Ok(None);
        }

        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::StoreUnavailable(format!("reading credential document: {e}")))?;
        let credential: Credential = serde_json::from_str(&contents)
            .map_err(|e| Error::StoreUnavailable(format!("parsing credential document: {e}")))?;

        debug!(path = %self.path.display(), "loaded credential from durable store");
        *cache = Some(credential.clone());
        Ok(Some(credential))
    }

    /// Obtain a fresh credential and make it the live one.
    ///
    /// Runs the client-credentials exchange, persists the result to the
    /// durable document, and updates the in-memory cache, in that order.
    /// A failed exchange is `RefreshFailed` and leaves the old credential in
    /// place. A failed durable write does not discard the fresh token: the
    /// cache is still updated and the write failure is logged, matching the
    /// read side where a broken store means "no credential", not "no
    /// service".
    pub async fn refresh(&self) -> Result<Credential> {
        let token = token::fetch_token(
            &self.client,
            &self.token_url,
            &self.client_id,
            self.client_secret.expose(),
        )
        .await?;

        let credential = Credential {
            authorization: token.authorization_header(),
            obtained_at: now_millis(),
        };

        if let Err(e) = write_atomic(&self.path, &credential).await {
            warn!(error = %e, "failed to persist refreshed credential, keeping it in memory");
        }

        *self.cache.lock().await = Some(credential.clone());
        info!("upstream credential refreshed");
        Ok(credential)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Write the credential document atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target, so a crash mid-write cannot corrupt the document. The file
/// holds a live token, so permissions are 0600.
async fn write_atomic(path: &Path, credential: &Credential) -> Result<()> {
    let json = serde_json::to_string_pretty(credential)
        .map_err(|e| Error::StoreUnavailable(format!("serializing credential: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::StoreUnavailable("credential path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".credential.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::StoreUnavailable(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::StoreUnavailable(format!("setting credential permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::StoreUnavailable(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credential");
    Ok(())
}
