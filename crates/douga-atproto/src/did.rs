//! DID documents.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Service id fragment of a user's personal data server.
pub const PDS_SERVICE_ID: &str = "#atproto_pds";

/// Service type of a user's personal data server.
pub const PDS_SERVICE_TYPE: &str = "AtprotoPersonalDataServer";

const DID_CONTEXT: &str = "https://www.w3.org/ns/did/v1";

/// A resolved DID document. Only the fields this service reads are modeled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DidDocument {
    #[serde(rename = "@context", default, skip_serializing_if = "Value::is_null")]
    pub context: Value,
    pub id: String,
    #[serde(rename = "alsoKnownAs", default, skip_serializing_if = "Vec::is_empty")]
    pub also_known_as: Vec<String>,
    #[serde(default)]
    pub service: Vec<Service>,
}

/// A `service` entry of a DID document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(rename = "serviceEndpoint")]
    pub service_endpoint: Value,
}

impl Service {
    /// Whether this entry has the given id fragment, absolute or relative.
    fn has_fragment(&self, fragment: &str) -> bool {
        self.id == fragment || self.id.ends_with(fragment)
    }
}

impl DidDocument {
    /// Document published by this service at `/.well-known/did.json`.
    pub fn for_service(hostname: &str) -> Self {
        Self {
            context: Value::Array(vec![Value::String(DID_CONTEXT.to_string())]),
            id: format!("did:web:{}", hostname),
            also_known_as: Vec::new(),
            service: vec![Service {
                id: "#bsky_chat".to_string(),
                service_type: "BskyChatService".to_string(),
                service_endpoint: Value::String(format!("https://{}", hostname)),
            }],
        }
    }

    /// Endpoint of the `#atproto_pds` service, if the document declares one.
    pub fn pds_endpoint(&self) -> Option<&str> {
        self.service
            .iter()
            .find(|s| s.has_fragment(PDS_SERVICE_ID) && s.service_type == PDS_SERVICE_TYPE)
            .and_then(|s| s.service_endpoint.as_str())
            .filter(|endpoint| !endpoint.is_empty())
    }
}
