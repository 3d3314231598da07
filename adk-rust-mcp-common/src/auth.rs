//! Bearer tokens for Vertex AI.
//!
//! Tokens normally come from Application Default Credentials through
//! `gcp_auth`. A fixed token can be supplied instead, for short-lived runs with
//! a token minted elsewhere (`gcloud auth print-access-token`) and for tests.

use std::sync::Arc;

use gcp_auth::TokenProvider;
use tracing::{debug, instrument};

use crate::error::AuthError;

enum TokenSource {
    /// Token provider discovered through ADC
    Provider(Arc<dyn TokenProvider>),
    /// Fixed token, never refreshed
    Static(String),
}

/// Source of access tokens for the Imagen handler.
///
/// Built once at startup and shared by every job; `gcp_auth` caches and
/// refreshes ADC tokens internally.
pub struct AuthProvider {
    source: TokenSource,
}

impl std::fmt::Debug for AuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = match self.source {
            TokenSource::Provider(_) => "adc",
            TokenSource::Static(_) => "static",
        };
        f.debug_struct("AuthProvider").field("source", &source).finish()
    }
}

impl AuthProvider {
    /// Discover Application Default Credentials.
    ///
    /// Returns `AuthError::NotConfigured` when no credential source is found
    /// (service account file, gcloud user credentials, metadata server, or
    /// the gcloud CLI).
    #[instrument(level = "debug", name = "auth_provider_new")]
    pub async fn new() -> Result<Self, AuthError> {
        debug!("Initializing AuthProvider with ADC");

        let provider = gcp_auth::provider().await.map_err(|e| {
            debug!("Failed to initialize ADC: {}", e);
            AuthError::NotConfigured
        })?;

        debug!("AuthProvider initialized successfully");
        Ok(Self {
            source: TokenSource::Provider(provider),
        })
    }

    /// Create a provider that always hands out `token`.
    ///
    /// No network calls are made and the token is never refreshed.
    pub fn with_static_token(token: impl Into<String>) -> Self {
        Self {
            source: TokenSource::Static(token.into()),
        }
    }

    /// Access token for `scopes`. Callers should not cache it.
    #[instrument(level = "debug", name = "get_token", skip(self))]
    pub async fn get_token(&self, scopes: &[&str]) -> Result<String, AuthError> {
        debug!(?scopes, "Requesting token");

        match &self.source {
            TokenSource::Provider(provider) => {
                let token = provider.token(scopes).await.map_err(|e| {
                    debug!("Token refresh failed: {}", e);
                    AuthError::RefreshFailed(e.to_string())
                })?;

                debug!("Token obtained successfully");
                Ok(token.as_str().to_string())
            }
            TokenSource::Static(token) => Ok(token.clone()),
        }
    }
}

/// OAuth2 scopes.
pub mod scopes {
    /// Full access to Google Cloud Platform APIs, as required by Vertex AI.
    pub const CLOUD_PLATFORM: &str = "https://www.googleapis.com/auth/cloud-platform";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_token_ignores_scopes() {
        let auth = AuthProvider::with_static_token("my-token");

        assert_eq!(auth.get_token(&["scope1"]).await.unwrap(), "my-token");
        assert_eq!(auth.get_token(&[scopes::CLOUD_PLATFORM]).await.unwrap(), "my-token");
        assert_eq!(auth.get_token(&[]).await.unwrap(), "my-token");
    }

    #[test]
    fn test_debug_hides_token() {
        let auth = AuthProvider::with_static_token("secret-token");
        let debug = format!("{:?}", auth);
        assert!(debug.contains("static"));
        assert!(!debug.contains("secret-token"));
    }
}
