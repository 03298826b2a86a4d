// Marquee Library
// Structured recommendations recovered from free-form agent output

pub mod collaborators;
pub mod config;
pub mod event_sink;
pub mod formatter;
pub mod listing;
pub mod merge;
pub mod pipeline;
pub mod recovery;
pub mod retry;
pub mod types;
pub mod utils;

pub use collaborators::{
    ChatMessage, CollaboratorError, EntityHint, PipelineMode, RawAgentOutput, SearchProvider,
    SearchSession, Sender, TextGenerator,
};
pub use config::{load_config, CatalogKind, ConfigError, MarqueeConfig};
pub use event_sink::{NoopEventSink, PipelineEventSink, TracingEventSink};
pub use listing::{ListingNormalizer, ListingTemplate, RawListing};
pub use merge::merge_satellites;
pub use pipeline::{run_pipeline, Pipeline, PipelineResponse, PipelineStage, PipelineState};
pub use recovery::{recover, RecoveredValue, RecoveryStage, StructuredTextRecoverer};
pub use retry::{RetryPolicy, RetryableCaller};
pub use types::{CanonicalRecord, RecordId, SatelliteRecord, Showtime};
