//! Asset transfer and blob persistence
//!
//! [`AssetFetcher`] turns an asset location into bytes and [`BlobSink`]
//! stores named blobs. The bundled implementations are an HTTP fetcher built
//! on `reqwest` and a filesystem sink rooted at an output directory.

use crate::error::{Error, Result};
use crate::types::AssetData;
use crate::utils::ensure_relative;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Bytes of one transferred asset
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedBytes {
    /// Response body
    pub bytes: Vec<u8>,
    /// `Content-Type` reported by the source, if any
    pub content_type: Option<String>,
}

/// Fetches asset bytes from a location
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Fetch the bytes at `url`
    ///
    /// # Errors
    ///
    /// Every failure here is retryable per [`IsRetryable`](crate::retry::IsRetryable),
    /// including non-success statuses such as 404, except malformed requests.
    async fn fetch(&self, url: &Url) -> Result<FetchedBytes>;
}

/// Stores named blobs
#[async_trait]
pub trait BlobSink: Send + Sync {
    /// Persist `bytes` under the relative `name`, replacing any existing blob
    ///
    /// Returns the location the blob was written to.
    async fn persist(&self, name: &Path, bytes: &[u8]) -> Result<PathBuf>;
}

/// Resolve asset data to bytes, fetching only when the bytes are not inline
pub async fn resolve_asset_data(
    fetcher: &dyn AssetFetcher,
    data: &AssetData,
    mime_hint: Option<&str>,
) -> Result<FetchedBytes> {
    match data {
        AssetData::Bytes(bytes) => Ok(FetchedBytes {
            bytes: bytes.clone(),
            content_type: mime_hint.map(str::to_string),
        }),
        AssetData::Location(url) => fetcher.fetch(url).await,
    }
}

/// HTTP(S) fetcher backed by a shared `reqwest` client
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a fetcher whose requests time out after `request_timeout`
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Wrap an already configured client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedBytes> {
        let response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response.bytes().await.map_err(|e| Error::Transfer {
            source_location: url.to_string(),
            reason: e.to_string(),
        })?;

        tracing::debug!(url = %url, size = bytes.len(), ?content_type, "fetched asset");

        Ok(FetchedBytes {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}

/// Filesystem sink writing below a root directory
///
/// Names must be relative and may not contain `..`; intermediate directories
/// are created on demand and existing files are overwritten.
#[derive(Clone, Debug)]
pub struct FsSink {
    root: PathBuf,
}

impl FsSink {
    /// Sink rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Output root
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl BlobSink for FsSink {
    async fn persist(&self, name: &Path, bytes: &[u8]) -> Result<PathBuf> {
        ensure_relative(name)?;
        let target = self.root.join(name);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;
        Ok(target)
    }
}
