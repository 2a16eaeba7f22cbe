// # HTTP Add-on API Client
//
// This crate talks to the remote add-on service over HTTPS: the public
// catalog, release metadata, the signed-in user's subscriptions and archive
// downloads.
//
// ## Request Model
//
// - One HTTP request per trait call; retries belong to the caller
// - Every request carries `X-Client: Classic Addon Manager v<version>`
// - `X-Token` is attached only once a session token has been set
// - 30 second timeout on every request
//
// ## Response Envelope
//
// All endpoints except the catalog wrap their payload:
//
// ```json
// { "status": true, "message": "", "data": { ... } }
// ```
//
// `status: false` is an error carrying `message`, whatever the HTTP status.
//
// ## Security Requirements
//
// - The session token NEVER appears in logs or Debug output
//
// ## API Reference
//
// - Catalog: GET `/addons` (plain JSON array)
// - Latest release: GET `/latest_release/:name`
// - Specific release: GET `/release/:name/:version`
// - Bulk latest releases: POST `/latest_releases` with `{"addons": [..]}`
// - Subscriptions: GET `/me/addons`
// - Unsubscribe: POST `/addon/:name/unsubscribe`
// - Archive download: GET `/addon/:name/download`

mod fetcher;

pub use fetcher::HttpArchiveFetcher;

use addon_core::traits::ManifestClient;
use addon_core::types::{decode_release_map, AddonManifest, Release, ReleasePayload};
use addon_core::{Error, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Production API base URL
pub const DEFAULT_API_URL: &str = "https://aac.gaijin.dev";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Header identifying this client to the service
const CLIENT_HEADER: &str = "X-Client";

/// Header carrying the session token
const TOKEN_HEADER: &str = "X-Token";

/// Connection settings for [`HttpManifestClient`]
#[derive(Clone)]
pub struct ApiClientConfig {
    /// Base URL for release, account and download endpoints
    pub api_url: String,

    /// Full URL of the public catalog
    pub catalog_url: String,

    /// Value sent in `X-Client`
    pub client_id: String,

    /// Session token, sent as `X-Token` when present
    pub auth_token: Option<String>,

    pub timeout: Duration,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self::with_base_url(DEFAULT_API_URL)
    }
}

impl ApiClientConfig {
    /// Settings pointing every endpoint, the catalog included, at `api_url`
    pub fn with_base_url(api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self {
            catalog_url: format!("{}/addons", api_url),
            api_url,
            client_id: default_client_id(),
            auth_token: None,
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Set the session token
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}

impl std::fmt::Debug for ApiClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClientConfig")
            .field("api_url", &self.api_url)
            .field("catalog_url", &self.catalog_url)
            .field("client_id", &self.client_id)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<REDACTED>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// `X-Client` value for this build
pub fn default_client_id() -> String {
    format!("Classic Addon Manager v{}", env!("CARGO_PKG_VERSION"))
}

/// Session token shared by the manifest client and its archive fetchers
#[derive(Clone, Default)]
pub(crate) struct SessionToken(Arc<RwLock<Option<String>>>);

impl SessionToken {
    fn new(token: Option<String>) -> Self {
        Self(Arc::new(RwLock::new(token)))
    }

    pub(crate) fn get(&self) -> Option<String> {
        match self.0.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set(&self, token: Option<String>) {
        let mut guard = match self.0.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = token;
    }
}

/// Envelope wrapping every non-catalog response
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    #[serde(default = "envelope_ok")]
    status: bool,

    #[serde(default)]
    message: String,

    data: Option<T>,
}

fn envelope_ok() -> bool {
    true
}

/// HTTP implementation of [`ManifestClient`]
///
/// # Security
///
/// The Debug implementation does NOT expose the session token.
pub struct HttpManifestClient {
    config: ApiClientConfig,

    /// Session token
    /// ⚠️ NEVER log this value
    auth_token: SessionToken,

    client: reqwest::Client,
}

// Custom Debug implementation that hides the session token
impl std::fmt::Debug for HttpManifestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpManifestClient")
            .field("api_url", &self.config.api_url)
            .field("catalog_url", &self.config.catalog_url)
            .field("client_id", &self.config.client_id)
            .field("auth_token", &"<REDACTED>")
            .finish()
    }
}

impl HttpManifestClient {
    /// Create a client
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the HTTP client cannot be built.
    pub fn new(config: ApiClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            auth_token: SessionToken::new(config.auth_token.clone()),
            config,
            client,
        })
    }

    /// Client against the production service
    pub fn production() -> Result<Self> {
        Self::new(ApiClientConfig::default())
    }

    /// Replace the session token; `None` signs out
    pub fn set_auth_token(&self, token: Option<String>) {
        self.auth_token.set(token);
    }

    /// Whether a session token is set
    pub fn has_auth_token(&self) -> bool {
        self.current_token().is_some()
    }

    pub fn config(&self) -> &ApiClientConfig {
        &self.config
    }

    /// Archive fetcher that sends this client's headers
    ///
    /// The fetcher shares the session token, so signing in or out later
    /// applies to downloads too.
    pub fn archive_fetcher(&self) -> Result<HttpArchiveFetcher> {
        HttpArchiveFetcher::with_session(
            fetcher::DEFAULT_DOWNLOAD_TIMEOUT,
            self.config.client_id.clone(),
            self.auth_token.clone(),
        )
    }

    fn current_token(&self) -> Option<String> {
        self.auth_token.get()
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url, path)
    }

    /// Attach the client header and, when signed in, the token header
    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.header(CLIENT_HEADER, &self.config.client_id);
        match self.current_token() {
            Some(token) => request.header(TOKEN_HEADER, token),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        self.authorize(request)
            .send()
            .await
            .map_err(|e| Error::network(format!("HTTP request failed: {}", e)))
    }

    /// Decode an enveloped body and unwrap its `data`
    async fn read_envelope<T: DeserializeOwned>(
        response: reqwest::Response,
        what: &str,
    ) -> Result<T> {
        let body = response
            .text()
            .await
            .map_err(|e| Error::network(format!("Failed to read {} response: {}", what, e)))?;

        let envelope: ApiResponse<T> = serde_json::from_str(&body)
            .map_err(|e| Error::network(format!("Failed to parse {} response: {}", what, e)))?;

        if !envelope.status {
            tracing::warn!("{} returned status false: {}", what, envelope.message);
            return Err(Error::network(envelope.message));
        }

        envelope
            .data
            .ok_or_else(|| Error::network(format!("Invalid {} response: data is missing", what)))
    }

    async fn get_release(&self, url: &str, name: &str) -> Result<Release> {
        let response = self.send(self.client.get(url)).await?;

        // Any non-200 here means the add-on has no such release
        if response.status().as_u16() != 200 {
            tracing::error!(
                "Release lookup for {} failed with status {}",
                name,
                response.status()
            );
            return Err(Error::not_found("no release found"));
        }

        let payload: ReleasePayload = Self::read_envelope(response, "release").await?;
        Ok(Release::from(payload))
    }
}

/// Map a non-success status to an error
///
/// `what` names the request for the message; `not_found` is used for 404.
async fn status_error(response: reqwest::Response, what: &str, not_found: &str) -> Error {
    let status = response.status();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read error response".to_string());

    match status.as_u16() {
        401 | 403 => Error::network(format!(
            "Authentication failed: missing or expired session token. Status: {}",
            status
        )),
        404 => Error::not_found(not_found),
        429 => Error::network(format!(
            "Rate limit exceeded. Please retry later. Status: {}",
            status
        )),
        500..=599 => Error::network(format!(
            "Add-on service error (transient): {} - {}",
            status, error_text
        )),
        _ => Error::network(format!("{} failed: {} - {}", what, status, error_text)),
    }
}

#[async_trait]
impl ManifestClient for HttpManifestClient {
    async fn fetch_catalog(&self) -> Result<Vec<AddonManifest>> {
        tracing::debug!("Fetching catalog from {}", self.config.catalog_url);

        let response = self.send(self.client.get(&self.config.catalog_url)).await?;
        if !response.status().is_success() {
            return Err(status_error(response, "Catalog request", "catalog not found").await);
        }

        let manifests: Vec<AddonManifest> = response
            .json()
            .await
            .map_err(|e| Error::network(format!("Failed to parse catalog: {}", e)))?;

        tracing::info!("Retrieved {} addon manifests from remote source", manifests.len());
        Ok(manifests)
    }

    async fn latest_release(&self, name: &str) -> Result<Release> {
        tracing::debug!("Looking up latest release of {}", name);
        self.get_release(&self.endpoint(&format!("/latest_release/{}", name)), name)
            .await
    }

    async fn release(&self, name: &str, version: &str) -> Result<Release> {
        tracing::debug!("Looking up release {} of {}", version, name);
        self.get_release(&self.endpoint(&format!("/release/{}/{}", name, version)), name)
            .await
    }

    async fn latest_releases(&self, names: &[String]) -> Result<HashMap<String, Release>> {
        tracing::debug!("Looking up latest releases of {} add-ons", names.len());

        let body = serde_json::json!({ "addons": names });
        let response = self
            .send(self.client.post(self.endpoint("/latest_releases")).json(&body))
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("Bulk release lookup failed: {} {}", status, error_text);
            return Err(Error::network(format!(
                "failed to fetch bulk releases, status: {}",
                status.as_u16()
            )));
        }

        let data: serde_json::Value = Self::read_envelope(response, "bulk release").await?;
        decode_release_map(data)
    }

    async fn subscribed_addons(&self) -> Result<Vec<AddonManifest>> {
        let response = self.send(self.client.get(self.endpoint("/me/addons"))).await?;
        if !response.status().is_success() {
            return Err(
                status_error(response, "Subscription request", "no subscriptions found").await,
            );
        }

        Self::read_envelope(response, "subscription").await
    }

    async fn unsubscribe(&self, name: &str) -> Result<()> {
        let url = self.endpoint(&format!("/addon/{}/unsubscribe", name));
        let response = self.send(self.client.post(url)).await?;

        if response.status().as_u16() != 200 {
            let not_found = format!("Add-on not found: {}", name);
            return Err(status_error(response, "Unsubscribe", &not_found).await);
        }

        tracing::info!("Unsubscribed from addon: {}", name);
        Ok(())
    }

    fn archive_url(&self, name: &str, _release: &Release) -> String {
        self.endpoint(&format!("/addon/{}/download", name))
    }

    fn client_name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> HttpManifestClient {
        HttpManifestClient::new(ApiClientConfig::with_base_url("http://127.0.0.1:9/"))
            .expect("client builds")
    }

    #[test]
    fn test_default_points_at_production() {
        let config = ApiClientConfig::default();
        assert_eq!(config.api_url, "https://aac.gaijin.dev");
        assert_eq!(config.catalog_url, "https://aac.gaijin.dev/addons");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.auth_token.is_none());
    }

    #[test]
    fn test_client_id_carries_version() {
        assert_eq!(
            default_client_id(),
            format!("Classic Addon Manager v{}", env!("CARGO_PKG_VERSION"))
        );
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let client = client();
        assert_eq!(client.endpoint("/me/addons"), "http://127.0.0.1:9/me/addons");
    }

    #[test]
    fn test_archive_url_uses_download_endpoint() {
        let client = client();
        let release = Release {
            zipball_url: "https://example.invalid/zipball".to_string(),
            tag_name: "v1".to_string(),
            body: String::new(),
            published_at: Default::default(),
            tag: Default::default(),
        };
        assert_eq!(
            client.archive_url("Raid_Frames", &release),
            "http://127.0.0.1:9/addon/Raid_Frames/download"
        );
    }

    #[test]
    fn test_token_can_be_set_and_cleared() {
        let client = client();
        assert!(!client.has_auth_token());

        client.set_auth_token(Some("secret".to_string()));
        assert!(client.has_auth_token());

        client.set_auth_token(None);
        assert!(!client.has_auth_token());
    }

    #[test]
    fn test_token_not_exposed_in_debug() {
        let config = ApiClientConfig::default().with_auth_token("super_secret_token_12345");
        let client = HttpManifestClient::new(config.clone()).unwrap();

        let client_debug = format!("{:?}", client);
        let config_debug = format!("{:?}", config);

        assert!(!client_debug.contains("super_secret_token_12345"));
        assert!(!config_debug.contains("super_secret_token_12345"));
        assert!(client_debug.contains("<REDACTED>"));
        assert!(config_debug.contains("<REDACTED>"));
    }

    #[test]
    fn test_envelope_status_false_keeps_message() {
        let envelope: ApiResponse<serde_json::Value> =
            serde_json::from_str(r#"{"status": false, "message": "addon is private"}"#).unwrap();
        assert!(!envelope.status);
        assert_eq!(envelope.message, "addon is private");
        assert!(envelope.data.is_none());
    }

    #[test]
    fn test_archive_fetcher_shares_session_token() {
        let client = client();
        let fetcher = client.archive_fetcher().unwrap();
        assert!(fetcher.session_token().is_none());

        client.set_auth_token(Some("secret".to_string()));
        assert_eq!(fetcher.session_token().as_deref(), Some("secret"));

        client.set_auth_token(None);
        assert!(fetcher.session_token().is_none());
    }

    #[test]
    fn test_client_name() {
        assert_eq!(client().client_name(), "http");
    }
}
