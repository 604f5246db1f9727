//! Structured logging for upload relays.

use douga_models::{JobId, INITIAL_PROGRESS, RESOLVED_PROGRESS};
use tracing::field::Empty;
use tracing::{error, info, Span};

/// Step of a relay a job is in, recorded on the relay span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayStage {
    /// Looking up the owner's PDS from their DID document.
    Resolve,
    /// Forwarding the bytes to the PDS.
    Upload,
}

impl RelayStage {
    pub fn as_str(self) -> &'static str {
        match self {
            RelayStage::Resolve => "resolve",
            RelayStage::Upload => "upload",
        }
    }

    /// Progress the job reports while in this stage.
    pub fn progress(self) -> u8 {
        match self {
            RelayStage::Resolve => INITIAL_PROGRESS,
            RelayStage::Upload => RESOLVED_PROGRESS,
        }
    }
}

/// Logger for one relay.
///
/// Events inherit `job_id`, `did` and `bytes` from the span returned by
/// [`RelayLogger::span`]; the current stage is recorded on that span as the
/// relay moves along.
#[derive(Debug, Clone)]
pub struct RelayLogger {
    job_id: String,
    owner: String,
    bytes: usize,
}

impl RelayLogger {
    pub fn new(job_id: &JobId, owner: &str, bytes: usize) -> Self {
        Self {
            job_id: job_id.to_string(),
            owner: owner.to_string(),
            bytes,
        }
    }

    /// Span the relay future runs in.
    pub fn span(&self) -> Span {
        tracing::info_span!(
            "relay",
            job_id = %self.job_id,
            did = %self.owner,
            bytes = self.bytes,
            stage = Empty,
        )
    }

    /// Record `stage` on the current relay span.
    pub fn enter(&self, stage: RelayStage) {
        Span::current().record("stage", stage.as_str());
        info!(progress = stage.progress(), "Relay {}", stage.as_str());
    }

    pub fn resolved(&self, pds: &str) {
        info!(pds = %pds, progress = RESOLVED_PROGRESS, "Resolved PDS");
    }

    pub fn stored(&self, cid: &str) {
        info!(cid = %cid, progress = 100u8, "Relay completed");
    }

    pub fn failed(&self, stage: RelayStage, message: &str) {
        error!(stage = stage.as_str(), error = %message, "Relay failed");
    }
}
