//! Upload job pipeline.
//!
//! An upload creates a [`Job`](douga_models::Job) in the [`JobRegistry`] and
//! returns at once; a detached [`UploadWorker`] relays the bytes to the
//! owner's PDS and drives the job to a terminal state. The [`JobReaper`]
//! drops terminal jobs after a retention window.

pub mod config;
pub mod error;
pub mod logging;
pub mod queue;
pub mod reaper;
pub mod registry;
pub mod worker;

pub use config::QueueConfig;
pub use error::{QueueError, QueueResult};
pub use logging::{RelayLogger, RelayStage};
pub use queue::UploadQueue;
pub use reaper::JobReaper;
pub use registry::JobRegistry;
pub use worker::{UploadRequest, UploadWorker};
