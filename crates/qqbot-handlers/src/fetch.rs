//! Attachment download.

use async_trait::async_trait;
use bytes::Bytes;
use qqbot_core::{ImageFetcher, traits::FetchError};

/// Downloads attachments with a plain `GET`.
#[derive(Debug, Clone, Default)]
pub struct HttpImageFetcher {
    http: reqwest::Client,
}

impl HttpImageFetcher {
    /// Create a fetcher sharing `http`.
    #[must_use]
    pub const fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| FetchError::Download(e.to_string()))?;
        resp.bytes()
            .await
            .map_err(|e| FetchError::Download(e.to_string()))
    }
}
