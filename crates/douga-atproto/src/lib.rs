//! AT Protocol collaborators.
//!
//! - DID documents and service lookup
//! - Identity resolution through the PLC directory and `did:web`
//! - Blob upload to a user's PDS

pub mod config;
pub mod did;
pub mod error;
pub mod pds;
pub mod resolver;

pub use config::AtprotoConfig;
pub use did::{DidDocument, Service, PDS_SERVICE_ID, PDS_SERVICE_TYPE};
pub use error::{AtprotoError, AtprotoResult};
pub use pds::{BlobUpload, BlobUploader, PdsClient};
pub use resolver::{DidResolver, IdentityResolver};
