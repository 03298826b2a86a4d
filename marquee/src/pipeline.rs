//! The request pipeline: generate, recover, normalize, search, merge.
//!
//! One call to [`Pipeline::run`] handles one user query end to end on the
//! calling thread. Every run builds its own records and lookup tables; the
//! only state shared between runs is the read-only configuration.

use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use chrono::Datelike;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::collaborators::{
    ChatMessage, CollaboratorError, EntityHint, PipelineMode, RawAgentOutput, SearchProvider,
    SearchSession, TextGenerator,
};
use crate::config::{CatalogKind, MarqueeConfig};
use crate::event_sink::{CallOutcome, NoopEventSink, PipelineEventSink};
use crate::formatter::{format_response, GENERATION_FAILED_MESSAGE};
use crate::listing::ListingNormalizer;
use crate::merge::merge_satellites;
use crate::recovery::StructuredTextRecoverer;
use crate::retry::{RetryPolicy, RetryableCaller};
use crate::types::{CanonicalRecord, SatelliteRecord};
use crate::utils::preview;

static NOOP_SINK: NoopEventSink = NoopEventSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Generating,
    Recovering,
    Normalizing,
    /// Satellite search, only in [`PipelineMode::PrimaryWithSatellites`]
    Searching,
    Merging,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Generating => "generating",
            PipelineStage::Recovering => "recovering",
            PipelineStage::Normalizing => "normalizing",
            PipelineStage::Searching => "searching",
            PipelineStage::Merging => "merging",
        }
    }
}

/// Terminal state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Done,
    Failed(PipelineStage),
}

/// What the caller gets back, always
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResponse {
    pub response_text: String,
    pub entities: Vec<CanonicalRecord>,
    #[serde(skip)]
    pub state: PipelineState,
}

impl PipelineResponse {
    fn failed(stage: PipelineStage) -> Self {
        Self {
            response_text: GENERATION_FAILED_MESSAGE.to_string(),
            entities: Vec::new(),
            state: PipelineState::Failed(stage),
        }
    }
}

/// Mark records released within the window as current. Older records lose
/// any satellites and are not searched for.
pub fn classify_current_releases(records: &mut [CanonicalRecord], current_year: i32, window_years: i32) {
    for record in records.iter_mut() {
        let is_current = record
            .release_year()
            .is_some_and(|year| year >= current_year - window_years);
        record.is_current_release = Some(is_current);
        if !is_current {
            record.satellite_entities.clear();
        }
    }
}

pub struct Pipeline<'a> {
    generator: &'a dyn TextGenerator,
    search: Option<&'a dyn SearchProvider>,
    sink: &'a dyn PipelineEventSink,
    caller: RetryableCaller,
    recoverer: StructuredTextRecoverer,
    normalizer: ListingNormalizer,
    config: MarqueeConfig,
    current_year: Option<i32>,
}

impl<'a> Pipeline<'a> {
    pub fn new(generator: &'a dyn TextGenerator, config: MarqueeConfig) -> Self {
        Self {
            generator,
            search: None,
            sink: &NOOP_SINK,
            caller: RetryableCaller::new(config.retry.clone()),
            recoverer: StructuredTextRecoverer::new(&config.recovery),
            normalizer: ListingNormalizer::new(&config.catalog),
            config,
            current_year: None,
        }
    }

    pub fn with_search_provider(mut self, provider: &'a dyn SearchProvider) -> Self {
        self.search = Some(provider);
        self
    }

    pub fn with_event_sink(mut self, sink: &'a dyn PipelineEventSink) -> Self {
        self.sink = sink;
        self
    }

    /// Replace the retry wrapper, e.g. one with a recording sleeper.
    pub fn with_retry_caller(mut self, caller: RetryableCaller) -> Self {
        self.caller = caller;
        self
    }

    /// Pin the year used for current-release classification.
    pub fn with_current_year(mut self, year: i32) -> Self {
        self.current_year = Some(year);
        self
    }

    /// Run one query. Never panics and never returns an error: every
    /// failure ends in a response with a user-facing message.
    pub fn run(&self, query: &str, mode: PipelineMode, history: &[ChatMessage]) -> PipelineResponse {
        let started = Instant::now();
        let current = Cell::new(PipelineStage::Generating);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.run_stages(&current, query, mode, history)
        }));
        let response = match outcome {
            Ok(response) => response,
            Err(payload) => {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                let stage = current.get();
                error!(
                    query = %preview(query, 100),
                    stage = stage.as_str(),
                    "Pipeline aborted unexpectedly: {}",
                    reason
                );
                PipelineResponse::failed(stage)
            }
        };
        info!(
            entities = response.entities.len(),
            state = ?response.state,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Pipeline finished"
        );
        response
    }

    fn run_stages(
        &self,
        current: &Cell<PipelineStage>,
        query: &str,
        mode: PipelineMode,
        history: &[ChatMessage],
    ) -> PipelineResponse {
        let sink = self.sink;
        let enter = |stage: PipelineStage| {
            current.set(stage);
            sink.on_stage_entered(stage);
        };

        enter(PipelineStage::Generating);
        let raw = match self.generate(query, history, mode) {
            Ok(raw) => raw,
            Err(e) => {
                if e.is_fatal() {
                    error!(fatal = true, "Text generation unavailable: {}", e);
                } else {
                    error!("Text generation failed: {}", e);
                }
                sink.on_stage_failed(PipelineStage::Generating, &e.to_string());
                return PipelineResponse::failed(PipelineStage::Generating);
            }
        };

        enter(PipelineStage::Recovering);
        let recovery = self.recoverer.recover_with_stage(&raw);
        sink.on_records_recovered("text_generator", recovery.value.len(), recovery.stage);

        enter(PipelineStage::Normalizing);
        let mut records: Vec<CanonicalRecord> = recovery
            .value
            .into_records()
            .iter()
            .map(|raw| self.normalizer.normalize(raw))
            .collect();
        if self.normalizer.kind() == CatalogKind::Movies {
            let year = self
                .current_year
                .unwrap_or_else(|| chrono::Local::now().year());
            classify_current_releases(
                &mut records,
                year,
                self.config.pipeline.current_release_window_years,
            );
        }
        debug!(records = records.len(), "Normalized records");

        let records = match (mode, self.search) {
            (PipelineMode::PrimaryWithSatellites, Some(provider)) => {
                enter(PipelineStage::Searching);
                let satellites = self.search_satellites(provider, &records);
                enter(PipelineStage::Merging);
                merge_satellites(records, satellites)
            }
            (PipelineMode::PrimaryWithSatellites, None) => {
                warn!("Satellite search requested but no search provider is configured");
                records
            }
            (PipelineMode::PrimaryOnly, _) => records,
        };

        let entities: Vec<CanonicalRecord> =
            records.into_iter().map(CanonicalRecord::strip_internal).collect();
        let response_text = format_response(
            self.normalizer.kind(),
            &entities,
            query,
            self.normalizer.site(),
        );
        PipelineResponse {
            response_text,
            entities,
            state: PipelineState::Done,
        }
    }

    fn generate(
        &self,
        query: &str,
        history: &[ChatMessage],
        mode: PipelineMode,
    ) -> Result<RawAgentOutput, CollaboratorError> {
        let started = Instant::now();
        let result = self.caller.call("text_generator", &RetryPolicy::default(), |timeout| {
            self.generator.generate(query, history, mode, timeout)
        });
        let outcome = match result {
            Ok(_) => CallOutcome::Succeeded,
            Err(_) => CallOutcome::Failed,
        };
        self.sink
            .on_collaborator_invoked("text_generator", outcome, started.elapsed());
        result
    }

    /// Search once per eligible record inside a single session. A failed
    /// search only loses that record's satellites.
    fn search_satellites(
        &self,
        provider: &dyn SearchProvider,
        records: &[CanonicalRecord],
    ) -> Vec<SatelliteRecord> {
        let mut session = match provider.open_session() {
            Ok(session) => session,
            Err(e) => {
                warn!("Could not open search session: {}", e);
                self.sink
                    .on_stage_failed(PipelineStage::Searching, &e.to_string());
                return Vec::new();
            }
        };

        let mut satellites = Vec::new();
        for record in records
            .iter()
            .filter(|r| r.is_current_release != Some(false))
        {
            let hint = EntityHint {
                id: record.identifier.clone().filter(|id| !id.is_synthetic()),
                title: record.title.clone(),
            };
            match self.search_one(session.as_mut(), &hint) {
                Ok(found) => satellites.extend(found),
                Err(e) => {
                    warn!(title = %hint.title, "Satellite search failed: {}", e);
                    self.sink
                        .on_stage_failed(PipelineStage::Searching, &e.to_string());
                }
            }
        }
        drop(session);
        satellites
    }

    fn search_one(
        &self,
        session: &mut dyn SearchSession,
        hint: &EntityHint,
    ) -> Result<Vec<SatelliteRecord>, CollaboratorError> {
        let started = Instant::now();
        let result = self
            .caller
            .call("search_provider", &RetryPolicy::default(), |timeout: Duration| {
                session.search(hint, timeout)
            });
        let outcome = if result.is_ok() {
            CallOutcome::Succeeded
        } else {
            CallOutcome::Failed
        };
        self.sink
            .on_collaborator_invoked("search_provider", outcome, started.elapsed());

        let recovery = self.recoverer.recover_with_stage(&result?);
        self.sink
            .on_records_recovered("search_provider", recovery.value.len(), recovery.stage);

        Ok(recovery
            .value
            .into_records()
            .iter()
            .map(SatelliteRecord::from_map)
            .map(|mut satellite| {
                if satellite.movie_id.is_none() && satellite.movie_title.is_none() {
                    satellite.movie_id = hint.id.clone();
                    satellite.movie_title = Some(hint.title.clone());
                }
                satellite
            })
            .collect())
    }
}

/// Run one query with the given collaborators and observer.
pub fn run_pipeline(
    generator: &dyn TextGenerator,
    search: Option<&dyn SearchProvider>,
    config: MarqueeConfig,
    sink: &dyn PipelineEventSink,
    query: &str,
    mode: PipelineMode,
    history: &[ChatMessage],
) -> PipelineResponse {
    let mut pipeline = Pipeline::new(generator, config).with_event_sink(sink);
    if let Some(provider) = search {
        pipeline = pipeline.with_search_provider(provider);
    }
    pipeline.run(query, mode, history)
}
