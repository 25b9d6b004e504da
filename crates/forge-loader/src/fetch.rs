//! Module fetching

use crate::error::LoadError;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;

/// Bytes of a fetched module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedModule {
    /// Response body
    pub bytes: Vec<u8>,
    /// Content type the server declared
    pub content_type: String,
}

/// Where module bytes come from
#[async_trait]
pub trait ModuleFetcher: Send + Sync {
    /// Fetch `url` (already cache-busted)
    async fn fetch(&self, url: &str) -> Result<FetchedModule, LoadError>;
}

#[async_trait]
impl<F: ModuleFetcher + ?Sized> ModuleFetcher for std::sync::Arc<F> {
    async fn fetch(&self, url: &str) -> Result<FetchedModule, LoadError> {
        (**self).fetch(url).await
    }
}

/// Whether a content type names JavaScript
#[must_use]
pub fn is_javascript(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    matches!(
        essence.as_str(),
        "text/javascript" | "application/javascript" | "application/x-javascript" | "text/ecmascript" | "application/ecmascript"
    )
}

/// HTTP fetcher backed by `reqwest`
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpFetcher {
    /// Default request timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

    /// Fetcher with the default timeout
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeout(Self::DEFAULT_TIMEOUT)
    }

    /// Fetcher with a per-request timeout
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "falling back to default http client");
                reqwest::Client::new()
            });
        Self { client }
    }

    /// Fetcher using a preconfigured client
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ModuleFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedModule, LoadError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| LoadError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !is_javascript(&content_type) {
            return Err(LoadError::ContentType { found: content_type });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| LoadError::Network(e.to_string()))?;
        Ok(FetchedModule {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn javascript_content_types() {
        assert!(is_javascript("text/javascript; charset=utf-8"));
        assert!(is_javascript("Application/JavaScript"));
        assert!(!is_javascript("text/html"));
        assert!(!is_javascript(""));
    }
}
