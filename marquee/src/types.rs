//! Value types shared by every pipeline stage.
//!
//! All of them are created fresh per request and owned by whoever holds
//! them; nothing here is cached or shared across pipeline runs.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const PRICE_NOT_AVAILABLE: &str = "Price not available";
pub const RATING_NOT_AVAILABLE: &str = "Rating not available";
pub const BED_TYPE_NOT_AVAILABLE: &str = "Bed type not available";
pub const HOST_NOT_AVAILABLE: &str = "Host information not available";
pub const AMENITIES_NOT_AVAILABLE: &str = "Amenities information not available";
pub const LOCATION_NOT_AVAILABLE: &str = "Location information not available";
pub const DESCRIPTION_NOT_AVAILABLE: &str = "Description not available";

/// Marker prefix of identifiers derived from a URL hash
pub const SYNTHETIC_ID_PREFIX: &str = "synthetic-";

/// An externally sourced identifier, which upstream tools emit either as a
/// number or as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Number(i64),
    Text(String),
}

impl RecordId {
    /// Lenient conversion from a JSON value. Empty strings and the literal
    /// `undefined` placeholder are not identifiers.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(RecordId::Number(i))
                } else {
                    n.as_f64()
                        .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                        .map(|f| RecordId::Number(f as i64))
                }
            }
            Value::String(s) => {
                let s = s.trim();
                if s.is_empty() || s.eq_ignore_ascii_case("undefined") || s == "null" {
                    None
                } else {
                    Some(RecordId::Text(s.to_string()))
                }
            }
            _ => None,
        }
    }

    /// String form used for id-keyed lookups
    pub fn key(&self) -> String {
        match self {
            RecordId::Number(i) => i.to_string(),
            RecordId::Text(s) => s.clone(),
        }
    }

    /// Integer form, tolerating ids stored as numeric strings
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            RecordId::Number(i) => Some(*i),
            RecordId::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(self, RecordId::Text(s) if s.starts_with(SYNTHETIC_ID_PREFIX))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Number(i) => write!(f, "{}", i),
            RecordId::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for RecordId {
    fn from(i: i64) -> Self {
        RecordId::Number(i)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId::Text(s.to_string())
    }
}

/// One showtime of a satellite entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Showtime {
    pub start_time: String,
    #[serde(default)]
    pub format: String,
}

impl Showtime {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(Showtime {
                start_time: s.trim().to_string(),
                format: String::new(),
            }),
            Value::Object(obj) => {
                let start_time = ["start_time", "time", "startTime"]
                    .iter()
                    .find_map(|k| obj.get(*k).and_then(Value::as_str))
                    .map(str::trim)
                    .filter(|s| !s.is_empty())?;
                let format = obj
                    .get("format")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .trim()
                    .to_string();
                Some(Showtime {
                    start_time: start_time.to_string(),
                    format,
                })
            }
            _ => None,
        }
    }
}

/// A secondary entity attached to a canonical record, e.g. a theater and
/// its showtimes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SatelliteRecord {
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_miles: Option<f64>,
    /// Identifier of the primary entity this satellite belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movie_id: Option<RecordId>,
    /// Title of the primary entity this satellite belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movie_title: Option<String>,
    #[serde(default)]
    pub showtimes: Vec<Showtime>,
}

impl SatelliteRecord {
    /// Normalize one raw satellite mapping. Returns `None` for values that
    /// are not mappings; showtime entries without a time are dropped.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        Some(Self::from_map(obj))
    }

    pub fn from_map(obj: &Map<String, Value>) -> Self {
        let text = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| obj.get(*k).and_then(Value::as_str))
                .map(|s| s.trim().to_string())
                .unwrap_or_default()
        };
        let showtimes = obj
            .get("showtimes")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Showtime::from_value).collect())
            .unwrap_or_default();
        let movie_title = obj
            .get("movie_title")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        SatelliteRecord {
            name: text(&["name", "theater_name"]),
            address: text(&["address", "theater_address"]),
            distance_miles: obj.get("distance_miles").and_then(Value::as_f64),
            movie_id: obj.get("movie_id").and_then(RecordId::from_value),
            movie_title,
            showtimes,
        }
    }

    /// Only satellites with a name and at least one showtime are ever
    /// attached to a record.
    pub fn is_usable(&self) -> bool {
        !self.name.trim().is_empty() && !self.showtimes.is_empty()
    }
}

/// Normalized, display-ready representation of one recommended entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<RecordId>,
    pub title: String,
    pub url: String,
    pub price: String,
    pub rating: String,
    pub bed_type: String,
    pub location: String,
    pub amenities: String,
    pub host: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_current_release: Option<bool>,
    #[serde(default)]
    pub satellite_entities: Vec<SatelliteRecord>,

    /// Set when `identifier` was derived from a URL hash
    #[serde(skip)]
    pub(crate) synthetic_id: bool,
    /// Secondary id field seen on the raw record, used when `identifier`
    /// is missing at merge time
    #[serde(skip)]
    pub(crate) alternate_id: Option<RecordId>,
}

impl CanonicalRecord {
    /// A record carrying only a title and link, every descriptive field at
    /// its sentinel.
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            identifier: None,
            title: title.into(),
            url: url.into(),
            price: PRICE_NOT_AVAILABLE.to_string(),
            rating: RATING_NOT_AVAILABLE.to_string(),
            bed_type: BED_TYPE_NOT_AVAILABLE.to_string(),
            location: LOCATION_NOT_AVAILABLE.to_string(),
            amenities: AMENITIES_NOT_AVAILABLE.to_string(),
            host: HOST_NOT_AVAILABLE.to_string(),
            description: DESCRIPTION_NOT_AVAILABLE.to_string(),
            release_date: None,
            overview: None,
            explanation: None,
            poster_url: None,
            is_current_release: None,
            satellite_entities: Vec::new(),
            synthetic_id: false,
            alternate_id: None,
        }
    }

    pub fn with_identifier(mut self, id: impl Into<RecordId>) -> Self {
        self.identifier = Some(id.into());
        self
    }

    pub fn has_synthetic_id(&self) -> bool {
        self.synthetic_id
    }

    /// Drop bookkeeping that must not leave the pipeline: the synthetic id
    /// marker and any synthetic identifier itself.
    pub fn strip_internal(mut self) -> Self {
        if self.synthetic_id || self.identifier.as_ref().is_some_and(RecordId::is_synthetic) {
            self.identifier = None;
        }
        self.synthetic_id = false;
        self.alternate_id = None;
        self
    }

    /// Year prefix of `release_date`, when it parses
    pub fn release_year(&self) -> Option<i32> {
        let date = self.release_date.as_deref()?;
        date.get(..4)?.parse().ok()
    }
}
