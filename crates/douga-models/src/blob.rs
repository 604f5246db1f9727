//! Lexicon blob references.

use serde::{Deserialize, Serialize};

/// CID link in DAG-JSON form (`{"$link": "..."}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CidLink {
    #[serde(rename = "$link")]
    pub link: String,
}

/// A blob as returned by `com.atproto.repo.uploadBlob`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobRef {
    #[serde(rename = "$type", default = "blob_type")]
    pub blob_type: String,
    #[serde(rename = "ref")]
    pub reference: CidLink,
    pub mime_type: String,
    pub size: u64,
}

fn blob_type() -> String {
    "blob".to_string()
}

impl BlobRef {
    pub fn new(cid: impl Into<String>, mime_type: impl Into<String>, size: u64) -> Self {
        Self {
            blob_type: blob_type(),
            reference: CidLink { link: cid.into() },
            mime_type: mime_type.into(),
            size,
        }
    }

    /// Content identifier of the stored blob.
    pub fn cid(&self) -> &str {
        &self.reference.link
    }
}
