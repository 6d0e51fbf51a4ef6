//! OAuth client-credentials token exchange
//!
//! The IGDB API authenticates apps through Twitch's token service: a
//! form-encoded POST with the client id, client secret, and the
//! `client_credentials` grant type. The response carries a bearer token that
//! the caller turns into an `Authorization` header value.

use serde::{Deserialize, Serialize};

use crate::constants::GRANT_TYPE;
use crate::error::{Error, Result};

/// Response from the token endpoint.
///
/// `expires_in` is a delta in seconds from the response time. The service
/// does not schedule proactive refreshes from it (expiry is detected
/// reactively through upstream 401 responses), but the field is kept so the
/// full response stays inspectable in logs and tests.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Token scheme reported by the endpoint, e.g. "bearer"
    pub token_type: String,
    /// Seconds until the access token expires (delta, not absolute)
    #[serde(default)]
    pub expires_in: u64,
}

impl TokenResponse {
    /// Authorization header value for upstream requests:
    /// `"{token_type} {access_token}"`.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

/// Run the client-credentials exchange against the token endpoint.
///
/// Any failure, whether transport, a non-success status, or an unparseable
/// body, is a `RefreshFailed`; the caller decides whether the surrounding request
/// is retried.
pub async fn fetch_token(
    client: &reqwest::Client,
    token_url: &str,
    client_id: &str,
    client_secret: &str,
) -> Result<TokenResponse> {
    let response = client
        .post(token_url)
        .form(&[
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("grant_type", GRANT_TYPE),
        ])
        .send()
        .await
        .map_err(|e| Error::RefreshFailed(format!("token request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::RefreshFailed(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::RefreshFailed(format!("invalid token response: {e}")))
}
