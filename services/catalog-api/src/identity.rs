//! Inbound caller verification
//!
//! The catalog does not manage user accounts itself: an external identity
//! service owns sign-in and issues the bearer tokens the mobile app sends.
//! The `IdentityVerifier` capability turns such a token into a
//! `CallerIdentity` or rejects it. Uses `Pin<Box<dyn Future>>` return types
//! for dyn-compatibility (`Arc<dyn IdentityVerifier>` in the app state).

use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use tracing::warn;

use crate::error::AuthError;

/// Verified caller identity, attached to the request for downstream
/// handlers.
#[derive(Debug, Clone, Deserialize)]
pub struct CallerIdentity {
    pub uid: String,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub anonymous: bool,
}

/// Capability for verifying inbound bearer tokens.
pub trait IdentityVerifier: Send + Sync {
    /// Resolve an id token to a caller identity, or fail with
    /// `AuthError::InvalidToken`.
    fn verify<'a>(
        &'a self,
        id_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<CallerIdentity, AuthError>> + Send + 'a>>;
}

/// Verifier backed by the identity service's HTTP verification endpoint.
///
/// POSTs `{"idToken": …}` and expects the caller identity as JSON. Any
/// failure (transport, non-success status, unparseable body) is an
/// invalid token: the client receives the same 401 either way, and the
/// detail stays in the logs.
pub struct HttpIdentityVerifier {
    client: reqwest::Client,
    verify_url: String,
}

impl HttpIdentityVerifier {
    pub fn new(client: reqwest::Client, verify_url: impl Into<String>) -> Self {
        Self {
            client,
            verify_url: verify_url.into(),
        }
    }
}

impl IdentityVerifier for HttpIdentityVerifier {
    fn verify<'a>(
        &'a self,
        id_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<CallerIdentity, AuthError>> + Send + 'a>> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.verify_url)
                .json(&serde_json::json!({ "idToken": id_token }))
                .send()
                .await
                .map_err(|e| {
                    warn!(error = %e, "identity service unreachable");
                    AuthError::InvalidToken
                })?;

            if !response.status().is_success() {
                return Err(AuthError::InvalidToken);
            }

            response.json::<CallerIdentity>().await.map_err(|e| {
                warn!(error = %e, "identity service returned an unparseable identity");
                AuthError::InvalidToken
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn mock_identity_server(status: u16, body: &'static str) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let app = axum::Router::new().fallback(move || async move {
                (
                    axum::http::StatusCode::from_u16(status).unwrap(),
                    [(axum::http::header::CONTENT_TYPE, "application/json")],
                    body,
                )
            });
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn valid_token_resolves_identity() {
        let url = mock_identity_server(
            200,
            r#"{"uid":"user-1","email_verified":true,"anonymous":false}"#,
        )
        .await;

        let verifier = HttpIdentityVerifier::new(reqwest::Client::new(), url);
        let caller = verifier.verify("token-abc").await.unwrap();
        assert_eq!(caller.uid, "user-1");
        assert!(caller.email_verified);
        assert!(!caller.anonymous);
    }

    #[tokio::test]
    async fn identity_defaults_optional_flags() {
        let url = mock_identity_server(200, r#"{"uid":"user-2"}"#).await;

        let verifier = HttpIdentityVerifier::new(reqwest::Client::new(), url);
        let caller = verifier.verify("token-abc").await.unwrap();
        assert_eq!(caller.uid, "user-2");
        assert!(!caller.email_verified);
        assert!(!caller.anonymous);
    }

    #[tokio::test]
    async fn rejected_token_is_invalid() {
        let url = mock_identity_server(401, r#"{"error":"expired"}"#).await;

        let verifier = HttpIdentityVerifier::new(reqwest::Client::new(), url);
        let err = verifier.verify("token-expired").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn unreachable_service_is_invalid() {
        let verifier = HttpIdentityVerifier::new(reqwest::Client::new(), "http://127.0.0.1:1");
        let err = verifier.verify("token-abc").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }
}
