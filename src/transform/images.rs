//! Remote image fetching and data-URI encoding.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::CONTENT_TYPE;

use crate::error::FetchError;

/// Media type assumed when the server does not declare one.
pub const DEFAULT_MEDIA_TYPE: &str = "image/png";

/// Raw image bytes plus the declared media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub media_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl FetchedImage {
    /// Encode as a `data:` URI.
    pub fn to_data_uri(&self) -> String {
        let media_type = self
            .media_type
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_MEDIA_TYPE);
        format!("data:{media_type};base64,{}", STANDARD.encode(&self.bytes))
    }
}

/// Source of remote images referenced by invoice markup.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, FetchError>;
}

/// Fetches images over HTTP(S) with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Request {
                url: String::new(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, FetchError> {
        let classify = |e: reqwest::Error| {
            if e.is_timeout() {
                FetchError::Timeout { url: url.into() }
            } else {
                FetchError::Request {
                    url: url.into(),
                    reason: e.to_string(),
                }
            }
        };

        let response = self.client.get(url).send().await.map_err(classify)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.into(),
                status: status.as_u16(),
            });
        }
        let media_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await.map_err(classify)?;
        Ok(FetchedImage {
            media_type,
            bytes: bytes.to_vec(),
        })
    }
}
