//! PDS blob upload client.

use async_trait::async_trait;
use bytes::Bytes;
use douga_models::BlobRef;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::config::AtprotoConfig;
use crate::error::{AtprotoError, AtprotoResult};

/// One blob to relay, with the uploader's own credentials.
#[derive(Debug, Clone)]
pub struct BlobUpload {
    /// `Authorization` header of the original upload
    pub authorization: Option<String>,
    /// `Content-Type` header of the original upload
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Stores a blob on a PDS.
#[async_trait]
pub trait BlobUploader: Send + Sync {
    async fn upload_blob(&self, pds: &str, upload: BlobUpload) -> AtprotoResult<BlobRef>;
}

#[derive(Debug, Deserialize)]
struct UploadBlobOutput {
    blob: BlobRef,
}

/// `com.atproto.repo.uploadBlob` over HTTP.
#[derive(Debug, Clone)]
pub struct PdsClient {
    http: Client,
}

impl PdsClient {
    pub fn new(config: &AtprotoConfig) -> AtprotoResult<Self> {
        let http = Client::builder().timeout(config.relay_timeout).build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl BlobUploader for PdsClient {
    async fn upload_blob(&self, pds: &str, upload: BlobUpload) -> AtprotoResult<BlobRef> {
        let url = format!(
            "{}/xrpc/com.atproto.repo.uploadBlob",
            pds.trim_end_matches('/')
        );
        debug!(bytes = upload.body.len(), "Relaying blob to {}", url);

        let mut request = self.http.post(&url).body(upload.body);
        if let Some(authorization) = upload.authorization {
            request = request.header(AUTHORIZATION, authorization);
        }
        if let Some(content_type) = upload.content_type {
            request = request.header(CONTENT_TYPE, content_type);
        }

        let response = request.send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(AtprotoError::Upload {
                status: status.as_u16(),
                body,
            });
        }

        let output: UploadBlobOutput = response
            .json()
            .await
            .map_err(|e| AtprotoError::InvalidResponse(format!("uploadBlob output: {e}")))?;
        Ok(output.blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_bytes, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn upload(body: &'static [u8]) -> BlobUpload {
        BlobUpload {
            authorization: Some("Bearer service-token".to_string()),
            content_type: Some("video/mp4".to_string()),
            body: Bytes::from_static(body),
        }
    }

    #[tokio::test]
    async fn test_relays_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.repo.uploadBlob"))
            .and(header("authorization", "Bearer service-token"))
            .and(header("content-type", "video/mp4"))
            .and(body_bytes(b"mp4-bytes".to_vec()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "blob": {
                    "$type": "blob",
                    "ref": {"$link": "bafy123"},
                    "mimeType": "video/mp4",
                    "size": 9
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = PdsClient::new(&AtprotoConfig::default()).unwrap();
        let blob = client.upload_blob(&server.uri(), upload(b"mp4-bytes")).await.unwrap();

        assert_eq!(blob.cid(), "bafy123");
        assert_eq!(blob.size, 9);
    }

    #[tokio::test]
    async fn test_non_200_is_reported_with_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
            .mount(&server)
            .await;

        let client = PdsClient::new(&AtprotoConfig::default()).unwrap();
        let err = client.upload_blob(&server.uri(), upload(b"x")).await.unwrap_err();

        assert_eq!(err.to_string(), "upload error 401, bad token");
    }

    #[tokio::test]
    async fn test_malformed_output() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&server)
            .await;

        let client = PdsClient::new(&AtprotoConfig::default()).unwrap();
        let err = client.upload_blob(&server.uri(), upload(b"x")).await.unwrap_err();
        assert!(matches!(err, AtprotoError::InvalidResponse(_)));
    }
}
