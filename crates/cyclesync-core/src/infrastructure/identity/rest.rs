//! Identity Toolkit REST identity provider
//!
//! Speaks the password, sign-up, IdP and secure-token endpoints over HTTPS
//! with:
//! - Credential cache so a signed-in user stays signed in across restarts
//! - Background token refresh when a cached id token has expired
//! - Error classification into rejections and availability failures

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use super::credential_cache::{CachedCredentials, CredentialCache};
use crate::config::IdentitySettings;
use crate::domain::identity::{
    FederatedAuthorizer, FederatedCredential, Identity, IdentityProvider, ProviderError,
    ProviderEvent, ProviderListener, ProviderListeners, ProviderResult, ProviderSubscription,
};
use crate::error::{Error, Result};

/// Redirect URI sent with IdP sign-ins from a non-browser client
const IDP_REQUEST_URI: &str = "http://localhost";

/// Fallback token lifetime when the response omits `expiresIn`
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Error messages meaning "the provider answered and said no"
const REJECTION_MESSAGES: &[&str] = &[
    "EMAIL_NOT_FOUND",
    "INVALID_PASSWORD",
    "INVALID_LOGIN_CREDENTIALS",
    "INVALID_EMAIL",
    "EMAIL_EXISTS",
    "USER_DISABLED",
    "WEAK_PASSWORD",
    "INVALID_IDP_RESPONSE",
    "TOKEN_EXPIRED",
    "INVALID_REFRESH_TOKEN",
    "USER_NOT_FOUND",
    "OPERATION_NOT_ALLOWED",
    "TOO_MANY_ATTEMPTS_TRY_LATER",
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    grant_type: &'static str,
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

fn expires_at(expires_in: Option<&str>) -> chrono::DateTime<Utc> {
    let secs = expires_in
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(DEFAULT_EXPIRES_IN_SECS);
    Utc::now() + chrono::Duration::seconds(secs)
}

impl AuthResponse {
    fn into_credentials(self) -> CachedCredentials {
        let mut identity = Identity::new(self.local_id);
        if let Some(email) = self.email.filter(|e| !e.is_empty()) {
            identity = identity.with_email(email);
        }
        if let Some(name) = self.display_name.filter(|n| !n.is_empty()) {
            identity = identity.with_display_name(name);
        }
        CachedCredentials {
            expires_at: expires_at(self.expires_in.as_deref()),
            id_token: self.id_token,
            refresh_token: self.refresh_token,
            identity,
        }
    }
}

/// Map an HTTP error response to a provider error
fn classify_error(status: reqwest::StatusCode, body: &str) -> ProviderError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| body.trim().to_string());

    // Messages look like "WEAK_PASSWORD : Password should be at least 6 characters"
    let code = message.split(" : ").next().unwrap_or_default().trim();

    if REJECTION_MESSAGES.contains(&code) {
        ProviderError::Rejected(message)
    } else if status.is_server_error() {
        ProviderError::Unavailable(format!("Server error ({}): {}", status, message))
    } else {
        ProviderError::Unavailable(format!("HTTP error {}: {}", status, message))
    }
}

fn transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Unavailable("request timed out".to_string())
    } else {
        ProviderError::Unavailable(err.to_string())
    }
}

struct RestInner {
    http_client: HttpClient,
    settings: IdentitySettings,
    cache: CredentialCache,
    current: Mutex<Option<CachedCredentials>>,
    listeners: ProviderListeners,
    authorizer: Option<Arc<dyn FederatedAuthorizer>>,
}

impl RestInner {
    fn current(&self) -> MutexGuard<'_, Option<CachedCredentials>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn api_key(&self) -> ProviderResult<&str> {
        match self.settings.missing().as_slice() {
            [] => Ok(self.settings.api_key.as_deref().unwrap_or_default()),
            missing => Err(ProviderError::Misconfigured(format!(
                "missing {}",
                missing.join(", ")
            ))),
        }
    }

    async fn post_accounts(&self, method: &str, body: serde_json::Value) -> ProviderResult<AuthResponse> {
        let url = format!("{}/accounts:{}", self.settings.endpoint, method);
        debug!(method, "Sending identity request");

        let response = self
            .http_client
            .post(&url)
            .query(&[("key", self.api_key()?)])
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(status, &body));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("Failed to parse response: {}", e)))
    }

    async fn refresh(&self, refresh_token: &str) -> ProviderResult<RefreshResponse> {
        let url = format!("{}/token", self.settings.token_endpoint);
        debug!("Refreshing id token");

        let response = self
            .http_client
            .post(&url)
            .query(&[("key", self.api_key()?)])
            .form(&RefreshRequest {
                grant_type: "refresh_token",
                refresh_token,
            })
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(status, &body));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("Failed to parse response: {}", e)))
    }

    /// Adopt freshly issued credentials and tell listeners
    fn establish(&self, credentials: CachedCredentials) -> Identity {
        if let Err(err) = self.cache.store(&credentials) {
            warn!(error = %err, "Failed to cache credentials, sign in will not survive a restart");
        }
        let identity = credentials.identity.clone();
        *self.current() = Some(credentials);
        info!(user = %identity.id, "Identity provider session established");
        self.listeners
            .emit(ProviderEvent::IdentityChanged(Some(identity.clone())));
        identity
    }

    /// Refresh an expired cached token; a rejection ends the provider session
    async fn refresh_cached(&self) {
        let Some(cached) = self.current().clone() else {
            return;
        };

        match self.refresh(&cached.refresh_token).await {
            Ok(refreshed) => {
                let credentials = CachedCredentials {
                    expires_at: expires_at(refreshed.expires_in.as_deref()),
                    id_token: refreshed.id_token,
                    refresh_token: refreshed.refresh_token,
                    identity: cached.identity,
                };
                if let Err(err) = self.cache.store(&credentials) {
                    warn!(error = %err, "Failed to cache refreshed credentials");
                }
                let mut current = self.current();
                // A sign-out or new sign-in during the refresh wins
                if current.as_ref().map(|c| &c.refresh_token) == Some(&cached.refresh_token) {
                    *current = Some(credentials);
                }
                debug!("Id token refreshed");
            }
            Err(ProviderError::Rejected(reason)) => {
                let still_current = {
                    let mut current = self.current();
                    let same = current.as_ref().map(|c| &c.refresh_token) == Some(&cached.refresh_token);
                    if same {
                        *current = None;
                    }
                    same
                };
                if still_current {
                    if let Err(err) = self.cache.clear() {
                        warn!(error = %err, "Failed to clear rejected credentials");
                    }
                    warn!(%reason, "Cached session rejected by identity provider");
                    self.listeners
                        .emit(ProviderEvent::Error(format!("session expired: {}", reason)));
                }
            }
            Err(err) => {
                warn!(error = %err, "Token refresh failed, keeping cached session");
            }
        }
    }
}

/// Identity provider backed by the Identity Toolkit REST API
#[derive(Clone)]
pub struct RestIdentityProvider {
    inner: Arc<RestInner>,
}

impl fmt::Debug for RestIdentityProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestIdentityProvider")
            .field("endpoint", &self.inner.settings.endpoint)
            .field("configured", &self.inner.settings.is_configured())
            .field("cache", &self.inner.cache.path())
            .field("federated", &self.inner.authorizer.is_some())
            .finish()
    }
}

/// Builder for creating a RestIdentityProvider
pub struct RestIdentityProviderBuilder {
    settings: IdentitySettings,
    credentials_path: Option<PathBuf>,
    authorizer: Option<Arc<dyn FederatedAuthorizer>>,
    timeout_secs: Option<u64>,
}

impl RestIdentityProviderBuilder {
    pub fn new(settings: IdentitySettings) -> Self {
        Self {
            settings,
            credentials_path: None,
            authorizer: None,
            timeout_secs: None,
        }
    }

    /// Persist credentials at `path` (defaults to memory only)
    pub fn credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_path = Some(path.into());
        self
    }

    /// Set the interactive half of federated sign-in
    pub fn authorizer(mut self, authorizer: Arc<dyn FederatedAuthorizer>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    /// Set the request timeout
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Build the provider, loading any cached credentials
    pub fn build(self) -> Result<RestIdentityProvider> {
        let timeout_secs = self.timeout_secs.unwrap_or(self.settings.timeout_secs);
        if timeout_secs == 0 {
            return Err(Error::ConfigError(
                "identity timeout must be greater than zero".to_string(),
            ));
        }

        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(Error::NetworkError)?;

        let cache = match self.credentials_path {
            Some(path) => CredentialCache::new(path),
            None => CredentialCache::in_memory(),
        };
        let current = cache.load();

        Ok(RestIdentityProvider {
            inner: Arc::new(RestInner {
                http_client,
                settings: IdentitySettings {
                    endpoint: self.settings.endpoint.trim_end_matches('/').to_string(),
                    token_endpoint: self.settings.token_endpoint.trim_end_matches('/').to_string(),
                    ..self.settings
                },
                cache,
                current: Mutex::new(current),
                listeners: ProviderListeners::new(),
                authorizer: self.authorizer,
            }),
        })
    }
}

impl RestIdentityProvider {
    pub fn builder(settings: IdentitySettings) -> RestIdentityProviderBuilder {
        RestIdentityProviderBuilder::new(settings)
    }

    /// Identity the provider currently considers signed in
    pub fn current_identity(&self) -> Option<Identity> {
        self.inner.current().as_ref().map(|c| c.identity.clone())
    }

    async fn sign_in_with_idp(&self, credential: FederatedCredential) -> ProviderResult<Identity> {
        let post_body = format!(
            "id_token={}&providerId={}",
            credential.id_token, credential.provider_id
        );
        let response = self
            .inner
            .post_accounts(
                "signInWithIdp",
                json!({
                    "postBody": post_body,
                    "requestUri": IDP_REQUEST_URI,
                    "returnSecureToken": true,
                    "returnIdpCredential": true,
                }),
            )
            .await?;
        Ok(self.inner.establish(response.into_credentials()))
    }
}

#[async_trait]
impl IdentityProvider for RestIdentityProvider {
    fn is_configured(&self) -> bool {
        self.inner.settings.is_configured()
    }

    fn subscribe(&self, listener: ProviderListener) -> ProviderResult<ProviderSubscription> {
        self.inner.api_key()?;

        let (identity, expired) = match self.inner.current().as_ref() {
            Some(cached) => (Some(cached.identity.clone()), cached.is_expired(Utc::now())),
            None => (None, false),
        };
        let subscription = self.inner.listeners.register(listener, identity);

        if expired {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let inner = self.inner.clone();
                    handle.spawn(async move { inner.refresh_cached().await });
                }
                Err(_) => debug!("No async runtime, skipping token refresh"),
            }
        }

        Ok(subscription)
    }

    async fn sign_in(&self, email: &str, password: &str) -> ProviderResult<Identity> {
        let response = self
            .inner
            .post_accounts(
                "signInWithPassword",
                json!({
                    "email": email,
                    "password": password,
                    "returnSecureToken": true,
                }),
            )
            .await?;
        Ok(self.inner.establish(response.into_credentials()))
    }

    async fn sign_up(&self, email: &str, password: &str) -> ProviderResult<Identity> {
        let response = self
            .inner
            .post_accounts(
                "signUp",
                json!({
                    "email": email,
                    "password": password,
                    "returnSecureToken": true,
                }),
            )
            .await?;
        Ok(self.inner.establish(response.into_credentials()))
    }

    async fn sign_in_federated(&self) -> ProviderResult<Identity> {
        self.inner.api_key()?;
        let authorizer = self.inner.authorizer.clone().ok_or_else(|| {
            ProviderError::Unavailable("federated sign in is not available here".to_string())
        })?;
        let credential = authorizer.authorize().await?;
        self.sign_in_with_idp(credential).await
    }

    async fn sign_out(&self) -> ProviderResult<()> {
        let had_session = self.inner.current().take().is_some();
        self.inner
            .cache
            .clear()
            .map_err(|e| ProviderError::Unavailable(format!("failed to clear credentials: {}", e)))?;
        if had_session {
            info!("Identity provider session cleared");
            self.inner.listeners.emit(ProviderEvent::IdentityChanged(None));
        }
        Ok(())
    }
}
