//! Avatar validation and storage
//!
//! Uploaded images are validated by sniffing the actual bytes; the declared
//! multipart content type is ignored, since the client controls it. Only
//! JPEG and PNG pass, capped at 2 MiB. Storage goes through the
//! `AvatarStore` capability so the handler stays independent of where the
//! files live; the bundled implementation writes to the local filesystem
//! and mints download-token URLs shaped like the managed storage service's.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use bytes::Bytes;
use thiserror::Error;
use tracing::debug;

/// Upload size ceiling in bytes.
pub const MAX_AVATAR_BYTES: usize = 2 * 1024 * 1024;

/// Upload failures, with the messages the mobile client displays verbatim.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("No file data received or processed.")]
    MissingFile,

    #[error("Received an empty file.")]
    EmptyFile,

    #[error("Invalid file type")]
    InvalidType,

    #[error("File size larger than 2MB")]
    TooLarge,

    #[error("Failed to upload avatar.")]
    Storage(#[from] std::io::Error),
}

/// Validate avatar bytes and return the sniffed content type.
///
/// Order matters for the client-facing message: an oversized GIF reports
/// "Invalid file type", matching the type-then-size checks the app expects.
pub fn validate(bytes: &Bytes) -> Result<&'static str, UploadError> {
    if bytes.is_empty() {
        return Err(UploadError::EmptyFile);
    }

    let mime = match infer::get(bytes).map(|t| t.mime_type()) {
        Some(mime @ ("image/jpeg" | "image/png")) => mime,
        _ => return Err(UploadError::InvalidType),
    };

    if bytes.len() > MAX_AVATAR_BYTES {
        return Err(UploadError::TooLarge);
    }

    Ok(mime)
}

/// Capability for persisting avatar images.
pub trait AvatarStore: Send + Sync {
    /// Persist the image under the caller's uid (replacing any previous
    /// avatar) and return its public URL.
    fn store<'a>(
        &'a self,
        uid: &'a str,
        bytes: Bytes,
        content_type: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, UploadError>> + Send + 'a>>;
}

/// Filesystem-backed avatar store.
///
/// Files land at `{root}/avatar/{uid}`; the public URL embeds a fresh
/// random download token on every upload, so stale links stop working once
/// a new avatar replaces the file.
pub struct FsAvatarStore {
    root: PathBuf,
    public_base_url: String,
}

impl FsAvatarStore {
    pub fn new(root: PathBuf, public_base_url: impl Into<String>) -> Self {
        Self {
            root,
            public_base_url: public_base_url.into(),
        }
    }
}

impl AvatarStore for FsAvatarStore {
    fn store<'a>(
        &'a self,
        uid: &'a str,
        bytes: Bytes,
        content_type: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, UploadError>> + Send + 'a>> {
        Box::pin(async move {
            // The uid names a file; identity-service uids are opaque strings,
            // so path separators must not reach the filesystem layer.
            if uid.is_empty()
                || !uid
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            {
                return Err(UploadError::Storage(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("unsafe uid for avatar path: {uid:?}"),
                )));
            }

            let dir = self.root.join("avatar");
            tokio::fs::create_dir_all(&dir).await?;
            tokio::fs::write(dir.join(uid), &bytes).await?;

            let token = uuid::Uuid::new_v4();
            let url = format!(
                "{}/avatar%2F{uid}?alt=media&token={token}",
                self.public_base_url.trim_end_matches('/')
            );

            debug!(uid, content_type, size = bytes.len(), "stored avatar");
            Ok(url)
        })
    }
}
