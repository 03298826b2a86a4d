//! Event sink traits for pipeline observers
//!
//! Usage counters and similar bookkeeping hang off a sink passed into each
//! pipeline run instead of shared global state.

use std::fmt::Debug;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::pipeline::PipelineStage;
use crate::recovery::RecoveryStage;

/// Result of one collaborator call, after retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Succeeded,
    Failed,
}

impl CallOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallOutcome::Succeeded => "succeeded",
            CallOutcome::Failed => "failed",
        }
    }
}

/// Observer of one pipeline run
pub trait PipelineEventSink: Send + Sync + Debug {
    fn on_stage_entered(&self, stage: PipelineStage);

    fn on_stage_failed(&self, stage: PipelineStage, reason: &str);

    /// Called once per generator or search call with its final outcome
    fn on_collaborator_invoked(&self, collaborator: &str, outcome: CallOutcome, elapsed: Duration);

    fn on_records_recovered(&self, source: &str, count: usize, stage: RecoveryStage);
}

/// Discards all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl PipelineEventSink for NoopEventSink {
    fn on_stage_entered(&self, _stage: PipelineStage) {}

    fn on_stage_failed(&self, _stage: PipelineStage, _reason: &str) {}

    fn on_collaborator_invoked(&self, _collaborator: &str, _outcome: CallOutcome, _elapsed: Duration) {}

    fn on_records_recovered(&self, _source: &str, _count: usize, _stage: RecoveryStage) {}
}

/// Writes every event to the `tracing` subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl PipelineEventSink for TracingEventSink {
    fn on_stage_entered(&self, stage: PipelineStage) {
        debug!(stage = stage.as_str(), "Pipeline stage entered");
    }

    fn on_stage_failed(&self, stage: PipelineStage, reason: &str) {
        warn!(stage = stage.as_str(), "Pipeline stage failed: {}", reason);
    }

    fn on_collaborator_invoked(&self, collaborator: &str, outcome: CallOutcome, elapsed: Duration) {
        info!(
            collaborator,
            outcome = outcome.as_str(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Collaborator invoked"
        );
    }

    fn on_records_recovered(&self, source: &str, count: usize, stage: RecoveryStage) {
        debug!(source, count, stage = stage.as_str(), "Records recovered");
    }
}
