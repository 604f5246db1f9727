//! On-demand derived-artifact cache.
//!
//! This crate provides:
//! - An on-disk artifact store keyed by (subject, content id, kind) with
//!   per-entry single-flight derivation state
//! - Derivation workers that download a source blob and run FFmpeg
//! - A background sweeper reclaiming idle entries and their directories

pub mod cache;
pub mod config;
pub mod derive;
pub mod entry;
pub mod error;
pub mod source;
pub mod store;
pub mod sweeper;

pub use cache::{ArtifactCache, Fetch};
pub use config::CacheConfig;
pub use derive::{Deriver, FfmpegDeriver};
pub use entry::{ArtifactEntry, ArtifactLease, DerivationPhase};
pub use error::{CacheError, CacheResult};
pub use source::{BlobSource, HttpBlobSource};
pub use store::ArtifactStore;
pub use sweeper::EvictionSweeper;
