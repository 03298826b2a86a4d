//! Best-effort recovery of structured records from raw agent output.
//!
//! Agents are asked for JSON and return anything from valid JSON to prose
//! with a half-finished array in a code fence. [`StructuredTextRecoverer`]
//! walks a fixed ladder of increasingly lossy stages and stops at the first
//! one that yields an array or object. It never fails; when nothing can be
//! recovered the result is an empty sequence.

pub mod repair;
pub mod salvage;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::collaborators::RawAgentOutput;
use crate::config::RecoverySettings;
use crate::utils::preview;

use salvage::PatternMatch;

pub type RawRecord = Map<String, Value>;

/// A usable parse result: a list of records or a single mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveredValue {
    Sequence(Vec<RawRecord>),
    Mapping(RawRecord),
}

impl Default for RecoveredValue {
    fn default() -> Self {
        RecoveredValue::Sequence(Vec::new())
    }
}

impl RecoveredValue {
    /// Arrays keep their object elements; scalars are not usable.
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Array(items) => {
                let total = items.len();
                let records: Vec<RawRecord> = items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::Object(map) => Some(map),
                        _ => None,
                    })
                    .collect();
                if records.len() < total {
                    debug!(
                        dropped = total - records.len(),
                        "Dropped non-object array elements"
                    );
                }
                Some(RecoveredValue::Sequence(records))
            }
            Value::Object(map) => Some(RecoveredValue::Mapping(map)),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RecoveredValue::Sequence(records) => records.len(),
            RecoveredValue::Mapping(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_records(self) -> Vec<RawRecord> {
        match self {
            RecoveredValue::Sequence(records) => records,
            RecoveredValue::Mapping(map) => vec![map],
        }
    }
}

/// Which stage of the ladder produced the result
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStage {
    Native,
    DirectParse,
    PreRepair,
    TargetedRepair,
    NearEndTruncation,
    CodeBlock,
    PatternSearch,
    ObjectSalvage,
    DomainFallback,
    Empty,
}

impl RecoveryStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryStage::Native => "native",
            RecoveryStage::DirectParse => "direct_parse",
            RecoveryStage::PreRepair => "pre_repair",
            RecoveryStage::TargetedRepair => "targeted_repair",
            RecoveryStage::NearEndTruncation => "near_end_truncation",
            RecoveryStage::CodeBlock => "code_block",
            RecoveryStage::PatternSearch => "pattern_search",
            RecoveryStage::ObjectSalvage => "object_salvage",
            RecoveryStage::DomainFallback => "domain_fallback",
            RecoveryStage::Empty => "empty",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recovery {
    pub value: RecoveredValue,
    pub stage: RecoveryStage,
}

impl Recovery {
    fn at(stage: RecoveryStage, value: RecoveredValue) -> Self {
        Self { value, stage }
    }

    fn empty() -> Self {
        Self::at(RecoveryStage::Empty, RecoveredValue::default())
    }
}

fn parse(text: &str) -> Result<Option<RecoveredValue>, serde_json::Error> {
    serde_json::from_str::<Value>(text).map(RecoveredValue::from_json)
}

#[derive(Debug, Clone)]
pub struct StructuredTextRecoverer {
    preview_chars: usize,
}

impl Default for StructuredTextRecoverer {
    fn default() -> Self {
        Self::new(&RecoverySettings::default())
    }
}

impl StructuredTextRecoverer {
    pub fn new(settings: &RecoverySettings) -> Self {
        Self {
            preview_chars: settings.log_preview_chars,
        }
    }

    pub fn recover(&self, raw: &RawAgentOutput) -> RecoveredValue {
        self.recover_with_stage(raw).value
    }

    pub fn recover_with_stage(&self, raw: &RawAgentOutput) -> Recovery {
        match raw {
            RawAgentOutput::Native(Value::String(text)) => self.recover_text(text),
            RawAgentOutput::Native(value) => match RecoveredValue::from_json(value.clone()) {
                Some(value) => Recovery::at(RecoveryStage::Native, value),
                None => {
                    debug!("Native agent output is a scalar, nothing to recover");
                    Recovery::empty()
                }
            },
            RawAgentOutput::Text(text) => self.recover_text(text),
        }
    }

    pub fn recover_text(&self, text: &str) -> Recovery {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            debug!("Empty agent output");
            return Recovery::empty();
        }

        let recovery = self.run_ladder(trimmed);
        if recovery.stage == RecoveryStage::Empty {
            warn!(
                input_len = trimmed.len(),
                "Could not recover any structured data from agent output: {}",
                preview(trimmed, self.preview_chars)
            );
        } else if recovery.stage > RecoveryStage::DirectParse {
            debug!(
                stage = recovery.stage.as_str(),
                records = recovery.value.len(),
                "Recovered malformed agent output"
            );
        }
        recovery
    }

    fn run_ladder(&self, text: &str) -> Recovery {
        // Valid JSON is taken as-is, never repaired
        if let Some(value) = parse(text).ok().flatten().and_then(|v| self.unwrap_nested(v)) {
            return Recovery::at(RecoveryStage::DirectParse, value);
        }

        let repaired = repair::pre_repair(text);
        match parse(&repaired) {
            Ok(Some(value)) => {
                if let Some(value) = self.unwrap_nested(value) {
                    return Recovery::at(RecoveryStage::PreRepair, value);
                }
            }
            Ok(None) => {}
            Err(err) => {
                if let Some(value) = repair::targeted_repair(&repaired, &err)
                    .and_then(|fixed| parse(&fixed).ok().flatten())
                    .and_then(|v| self.unwrap_nested(v))
                {
                    return Recovery::at(RecoveryStage::TargetedRepair, value);
                }
                if let Some(value) = repair::truncate_near_end(&repaired, &err)
                    .and_then(|cut| parse(&cut).ok().flatten())
                    .and_then(|v| self.unwrap_nested(v))
                {
                    return Recovery::at(RecoveryStage::NearEndTruncation, value);
                }
            }
        }

        for candidate in salvage::code_block_candidates(text) {
            if let Some(value) = self
                .parse_repaired(candidate)
                .and_then(|v| self.unwrap_nested(v))
            {
                return Recovery::at(RecoveryStage::CodeBlock, value);
            }
        }

        let pattern = match salvage::pattern_candidate(text) {
            Some(PatternMatch::Array(span)) => self.parse_repaired(span),
            Some(PatternMatch::Object(span)) => match self.parse_repaired(span) {
                Some(RecoveredValue::Mapping(map)) => Some(RecoveredValue::Sequence(vec![map])),
                _ => None,
            },
            None => None,
        };
        if let Some(value) = pattern.and_then(|v| self.unwrap_nested(v)) {
            return Recovery::at(RecoveryStage::PatternSearch, value);
        }

        let salvaged = self.salvage_objects(text);
        if !salvaged.is_empty() {
            if let Some(value) = self.unwrap_nested(RecoveredValue::Sequence(salvaged)) {
                return Recovery::at(RecoveryStage::ObjectSalvage, value);
            }
        }

        let titles = salvage::domain_titles(text);
        if !titles.is_empty() {
            return Recovery::at(
                RecoveryStage::DomainFallback,
                RecoveredValue::Sequence(titles),
            );
        }

        Recovery::empty()
    }

    /// Tool-call output often wraps the real payload as a string field
    /// (`{"movies_json": "[...]"}`). When every record is such a wrapper the
    /// payload's records replace it; `None` when the payload cannot be
    /// recovered, so the ladder moves on.
    fn unwrap_nested(&self, value: RecoveredValue) -> Option<RecoveredValue> {
        let Some(payloads) = nested_payloads(&value) else {
            return Some(value);
        };
        let records: Vec<RawRecord> = payloads
            .into_iter()
            .filter_map(|payload| self.parse_repaired(payload))
            .flat_map(RecoveredValue::into_records)
            .collect();
        if records.is_empty() {
            debug!("Nested JSON payload could not be recovered");
            return None;
        }
        Some(RecoveredValue::Sequence(records))
    }

    /// Direct parse, then pre-repair, then one targeted repair.
    fn parse_repaired(&self, text: &str) -> Option<RecoveredValue> {
        if let Ok(Some(value)) = parse(text) {
            return Some(value);
        }
        let repaired = repair::pre_repair(text);
        match parse(&repaired) {
            Ok(value) => value,
            Err(err) => repair::targeted_repair(&repaired, &err)
                .and_then(|fixed| parse(&fixed).ok().flatten()),
        }
    }

    /// Parse each top-level object on its own, keeping the ones that
    /// survive. Only attempted when the text looks like a list of objects.
    fn salvage_objects(&self, text: &str) -> Vec<RawRecord> {
        let spans = salvage::object_spans(text);
        if spans.is_empty() || (!salvage::looks_like_sequence(text) && spans.len() < 2) {
            return Vec::new();
        }

        let mut records = Vec::new();
        let mut dropped = 0usize;
        for span in &spans {
            let candidate = span.slice(text);
            let parsed = match span.end {
                Some(_) => self.parse_repaired(candidate),
                None => parse(&repair::balance_brackets(candidate)).ok().flatten(),
            };
            match parsed {
                Some(RecoveredValue::Mapping(map)) => records.push(map),
                _ => dropped += 1,
            }
        }
        if dropped > 0 {
            debug!(kept = records.len(), dropped, "Salvaged individual objects");
        }
        records
    }
}

/// The string payloads of a value whose records hold nothing but `*_json`
/// string fields, or `None` for any other value.
fn nested_payloads(value: &RecoveredValue) -> Option<Vec<&str>> {
    let records: Vec<&RawRecord> = match value {
        RecoveredValue::Sequence(records) => records.iter().collect(),
        RecoveredValue::Mapping(map) => vec![map],
    };
    if records.is_empty() || records.iter().any(|r| r.is_empty()) {
        return None;
    }
    let mut payloads = Vec::new();
    for (key, field) in records.into_iter().flatten() {
        match field {
            Value::String(payload) if key.ends_with("_json") => payloads.push(payload.as_str()),
            _ => return None,
        }
    }
    Some(payloads)
}

/// Recover with default settings.
pub fn recover(raw: &RawAgentOutput) -> RecoveredValue {
    StructuredTextRecoverer::default().recover(raw)
}
