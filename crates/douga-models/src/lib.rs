//! Shared data models for the douga video service.
//!
//! This crate provides Serde-serializable types for:
//! - Upload jobs and their lifecycle state machine
//! - Derived-artifact cache keys and servable file names
//! - Lexicon blob references
//! - XRPC response views (job status, upload limits)

pub mod artifact;
pub mod blob;
pub mod job;
pub mod xrpc;

// Re-export common types
pub use artifact::{ArtifactFile, ArtifactKey, ArtifactKind, ValidationError};
pub use blob::{BlobRef, CidLink};
pub use job::{Job, JobId, JobState, TransitionError, INITIAL_PROGRESS, RESOLVED_PROGRESS};
pub use xrpc::{JobStatusOutput, JobStatusView, UploadLimits};
