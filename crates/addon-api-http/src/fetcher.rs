// # HTTP Archive Fetcher
//
// Streams release archives to disk chunk by chunk so large add-ons are never
// held in memory.

use addon_core::traits::ArchiveFetcher;
use addon_core::{Error, Result};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::{default_client_id, SessionToken, CLIENT_HEADER, TOKEN_HEADER};

/// Downloads take longer than metadata calls
pub(crate) const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// HTTP implementation of [`ArchiveFetcher`]
///
/// Use [`HttpManifestClient::archive_fetcher`](crate::HttpManifestClient::archive_fetcher)
/// for downloads that need the signed-in user's token.
#[derive(Clone)]
pub struct HttpArchiveFetcher {
    client: reqwest::Client,
    client_id: String,

    /// ⚠️ NEVER log this value
    token: SessionToken,
}

impl std::fmt::Debug for HttpArchiveFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpArchiveFetcher")
            .field("client_id", &self.client_id)
            .field("token", &"<REDACTED>")
            .finish()
    }
}

impl HttpArchiveFetcher {
    /// Create an anonymous fetcher with the default download timeout
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_DOWNLOAD_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Self::with_session(timeout, default_client_id(), SessionToken::default())
    }

    pub(crate) fn with_session(
        timeout: Duration,
        client_id: String,
        token: SessionToken,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            client_id,
            token,
        })
    }

    #[cfg(test)]
    pub(crate) fn session_token(&self) -> Option<String> {
        self.token.get()
    }
}

#[async_trait]
impl ArchiveFetcher for HttpArchiveFetcher {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<u64> {
        tracing::debug!("Downloading {} to {}", url, destination.display());

        let mut request = self.client.get(url).header(CLIENT_HEADER, &self.client_id);
        if let Some(token) = self.token.get() {
            request = request.header(TOKEN_HEADER, token);
        }

        let mut response = request
            .send()
            .await
            .map_err(|e| Error::network(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::network(format!(
                "Download of {} failed with status {}",
                url,
                response.status()
            )));
        }

        let mut file = tokio::fs::File::create(destination).await.map_err(|e| {
            Error::filesystem(format!("Cannot create {}: {}", destination.display(), e))
        })?;

        let mut written: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Error::network(format!("Download interrupted: {}", e)))?
        {
            file.write_all(&chunk).await.map_err(|e| {
                Error::filesystem(format!("Cannot write {}: {}", destination.display(), e))
            })?;
            written += chunk.len() as u64;
        }

        file.flush().await.map_err(|e| {
            Error::filesystem(format!("Cannot write {}: {}", destination.display(), e))
        })?;

        tracing::debug!("Downloaded {} bytes from {}", written, url);
        Ok(written)
    }
}
