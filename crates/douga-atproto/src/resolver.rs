//! Identity resolution.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;

use crate::config::AtprotoConfig;
use crate::did::DidDocument;
use crate::error::{AtprotoError, AtprotoResult};

/// Resolves a DID to its document and storage endpoint.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, did: &str) -> AtprotoResult<DidDocument>;

    /// Resolve the DID and pick its PDS endpoint.
    async fn resolve_pds(&self, did: &str) -> AtprotoResult<String> {
        let doc = self.resolve(did).await?;
        let endpoint = doc.pds_endpoint().ok_or(AtprotoError::NoPds)?;

        let url = Url::parse(endpoint)
            .map_err(|e| AtprotoError::resolution(did, format!("invalid PDS endpoint {endpoint}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AtprotoError::resolution(
                did,
                format!("invalid PDS endpoint {endpoint}: unsupported scheme"),
            ));
        }

        Ok(endpoint.trim_end_matches('/').to_string())
    }
}

/// Resolver for `did:plc` (through the PLC directory) and `did:web`.
#[derive(Debug, Clone)]
pub struct DidResolver {
    http: Client,
    plc_url: String,
}

impl DidResolver {
    pub fn new(config: &AtprotoConfig) -> AtprotoResult<Self> {
        let http = Client::builder().timeout(config.resolve_timeout).build()?;
        Ok(Self {
            http,
            plc_url: config.plc_url.trim_end_matches('/').to_string(),
        })
    }

    /// URL the document for `did` is fetched from.
    pub fn document_url(&self, did: &str) -> AtprotoResult<String> {
        if did.starts_with("did:plc:") {
            return Ok(format!("{}/{}", self.plc_url, did));
        }

        if let Some(host) = did.strip_prefix("did:web:") {
            // Ports are percent-encoded; path-based did:web is not used by atproto.
            let host = host.replace("%3A", ":").replace("%3a", ":");
            if host.is_empty() || host.contains('/') || host.matches(':').count() > 1 {
                return Err(AtprotoError::resolution(did, "invalid did:web host"));
            }
            return Ok(format!("https://{}/.well-known/did.json", host));
        }

        Err(AtprotoError::UnsupportedDid(did.to_string()))
    }
}

#[async_trait]
impl IdentityResolver for DidResolver {
    async fn resolve(&self, did: &str) -> AtprotoResult<DidDocument> {
        let url = self.document_url(did)?;
        debug!(did = %did, "Resolving DID document from {}", url);

        let response = self.http.get(&url).send().await?;
        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                return Err(AtprotoError::resolution(did, "DID not found"));
            }
            status => {
                return Err(AtprotoError::resolution(did, format!("{} returned {}", url, status)));
            }
        }

        let doc: DidDocument = response
            .json()
            .await
            .map_err(|e| AtprotoError::InvalidResponse(format!("DID document for {did}: {e}")))?;

        if doc.id != did {
            return Err(AtprotoError::resolution(
                did,
                format!("document id mismatch: {}", doc.id),
            ));
        }

        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn resolver(plc_url: &str) -> DidResolver {
        DidResolver::new(&AtprotoConfig {
            plc_url: plc_url.to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    fn plc_document(did: &str, services: serde_json::Value) -> serde_json::Value {
        json!({
            "@context": ["https://www.w3.org/ns/did/v1"],
            "id": did,
            "service": services,
        })
    }

    #[test]
    fn test_document_urls() {
        let r = resolver("https://plc.example/");
        assert_eq!(
            r.document_url("did:plc:abc").unwrap(),
            "https://plc.example/did:plc:abc"
        );
        assert_eq!(
            r.document_url("did:web:alice.example").unwrap(),
            "https://alice.example/.well-known/did.json"
        );
        assert_eq!(
            r.document_url("did:web:localhost%3A8080").unwrap(),
            "https://localhost:8080/.well-known/did.json"
        );
        assert!(matches!(
            r.document_url("did:key:z6Mk"),
            Err(AtprotoError::UnsupportedDid(_))
        ));
        assert!(r.document_url("did:web:a.example:path:x").is_err());
    }

    #[tokio::test]
    async fn test_resolves_pds_through_plc() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/did:plc:abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(plc_document(
                "did:plc:abc",
                json!([{
                    "id": "#atproto_pds",
                    "type": "AtprotoPersonalDataServer",
                    "serviceEndpoint": "https://pds.example/"
                }]),
            )))
            .expect(1)
            .mount(&server)
            .await;

        let pds = resolver(&server.uri()).resolve_pds("did:plc:abc").await.unwrap();
        assert_eq!(pds, "https://pds.example");
    }

    #[tokio::test]
    async fn test_missing_pds_service() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/did:plc:abc"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(plc_document("did:plc:abc", json!([]))),
            )
            .mount(&server)
            .await;

        let err = resolver(&server.uri()).resolve_pds("did:plc:abc").await.unwrap_err();
        assert!(matches!(err, AtprotoError::NoPds));
        assert_eq!(err.to_string(), "user has no PDS");
    }

    #[tokio::test]
    async fn test_unknown_did() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = resolver(&server.uri()).resolve("did:plc:nobody").await.unwrap_err();
        assert!(matches!(err, AtprotoError::IdentityResolution { .. }));
    }

    #[tokio::test]
    async fn test_document_id_must_match() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(plc_document("did:plc:other", json!([]))),
            )
            .mount(&server)
            .await;

        let err = resolver(&server.uri()).resolve("did:plc:abc").await.unwrap_err();
        assert!(err.to_string().contains("document id mismatch"));
    }
}
