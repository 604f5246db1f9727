//! Content-origin blob source.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{CacheError, CacheResult};

/// Where derivation reads source blobs from.
#[async_trait]
pub trait BlobSource: Send + Sync {
    /// Download the blob `(subject, cid)` into `dest`, returning bytes written.
    async fn fetch_to(&self, subject: &str, cid: &str, dest: &Path) -> CacheResult<u64>;
}

/// Downloads blobs from `{base_url}/blob/{did}/{cid}`.
#[derive(Debug, Clone)]
pub struct HttpBlobSource {
    http: Client,
    base_url: String,
}

impl HttpBlobSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> CacheResult<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    pub fn blob_url(&self, subject: &str, cid: &str) -> String {
        format!("{}/blob/{}/{}", self.base_url.trim_end_matches('/'), subject, cid)
    }
}

#[async_trait]
impl BlobSource for HttpBlobSource {
    async fn fetch_to(&self, subject: &str, cid: &str, dest: &Path) -> CacheResult<u64> {
        let url = self.blob_url(subject, cid);
        debug!("Downloading source blob from {}", url);

        let response = self.http.get(&url).send().await?;
        if response.status() != StatusCode::OK {
            return Err(CacheError::source_failed(format!("HTTP {}", response.status())));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        debug!(bytes = written, "Downloaded source blob");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_downloads_blob_to_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blob/did:plc:abc/bafy123"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"video-bytes".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let source = HttpBlobSource::new(server.uri(), Duration::from_secs(5)).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("blob");

        let written = source.fetch_to("did:plc:abc", "bafy123", &dest).await.unwrap();
        assert_eq!(written, 11);
        assert_eq!(std::fs::read(&dest).unwrap(), b"video-bytes");
    }

    #[tokio::test]
    async fn test_non_ok_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let source = HttpBlobSource::new(server.uri(), Duration::from_secs(5)).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let err = source
            .fetch_to("did:plc:abc", "bafy123", &dir.path().join("blob"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "failed to download blob: HTTP 404 Not Found");
    }

    #[test]
    fn test_blob_url_trims_trailing_slash() {
        let source = HttpBlobSource::new("https://appview.example/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            source.blob_url("did:plc:abc", "bafy"),
            "https://appview.example/blob/did:plc:abc/bafy"
        );
    }
}
