//! Normalization of raw, heterogeneous records into [`CanonicalRecord`]s.
//!
//! Raw records come from agents and provider tools with unpredictable key
//! presence and shape. [`RawListing`] is a read-only view over one raw
//! mapping exposing fallible per-field getters; [`ListingNormalizer`] turns
//! each getter failure into that field's sentinel so one malformed field
//! never affects another.

pub mod template;

pub use template::ListingTemplate;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::config::{CatalogConfig, CatalogKind, SiteUrls};
use crate::recovery::RawRecord;
use crate::types::{
    CanonicalRecord, RecordId, AMENITIES_NOT_AVAILABLE, BED_TYPE_NOT_AVAILABLE,
    DESCRIPTION_NOT_AVAILABLE, HOST_NOT_AVAILABLE, LOCATION_NOT_AVAILABLE, PRICE_NOT_AVAILABLE,
    RATING_NOT_AVAILABLE, SYNTHETIC_ID_PREFIX,
};
use crate::utils::hash::short_digest;

pub const GENERIC_RENTAL_TITLE: &str = "Comfortable Stay";
pub const GENERIC_MOVIE_TITLE: &str = "Unknown Movie";

const MAX_AMENITIES: usize = 5;
const DESCRIPTION_PREVIEW_CHARS: usize = 100;
const UNDEFINED_MARKER: &str = "undefined";

/// Id shapes found in item URLs, tried in order
static URL_ID_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"/rooms/([0-9]+)").unwrap(),
        Regex::new(r"/rooms/([a-zA-Z0-9]+)").unwrap(),
        Regex::new(r"/movie/([0-9]+)").unwrap(),
    ]
});

static BED_COUNT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s+beds?").unwrap());

/// A key was present with a shape the getter cannot use
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FieldError {
    #[error("field '{field}' has unexpected type, expected {expected}")]
    UnexpectedType {
        field: &'static str,
        expected: &'static str,
    },
}

fn unexpected(field: &'static str, expected: &'static str) -> FieldError {
    FieldError::UnexpectedType { field, expected }
}

/// Non-empty trimmed string at `key`. Absent and `null` are `Ok(None)`.
fn opt_str<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
    field: &'static str,
) -> Result<Option<&'a str>, FieldError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            Ok((!s.is_empty()).then_some(s))
        }
        Some(_) => Err(unexpected(field, "string")),
    }
}

fn opt_obj<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
    field: &'static str,
) -> Result<Option<&'a Map<String, Value>>, FieldError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(unexpected(field, "object")),
    }
}

/// Strings that carry the `undefined` placeholder are never used
fn defined(s: &str) -> bool {
    !s.is_empty() && !s.contains(UNDEFINED_MARKER)
}

/// Outcome of identifier resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedId {
    pub id: Option<RecordId>,
    pub synthetic: bool,
}

/// Read-only view over one raw record
#[derive(Debug, Clone, Copy)]
pub struct RawListing<'a> {
    data: &'a RawRecord,
}

impl<'a> RawListing<'a> {
    pub fn new(data: &'a RawRecord) -> Self {
        Self { data }
    }

    // ------------------------------------------------------------------
    // Identifiers and links
    // ------------------------------------------------------------------

    pub fn root_id(&self) -> Option<RecordId> {
        ["tmdb_id", "id"]
            .iter()
            .find_map(|k| self.data.get(*k).and_then(RecordId::from_value))
    }

    /// The plain `id` field, kept aside for the merge stage
    pub fn alternate_id(&self) -> Option<RecordId> {
        self.data.get("id").and_then(RecordId::from_value)
    }

    pub fn nested_listing_id(&self) -> Option<RecordId> {
        self.data
            .get("listing")
            .and_then(Value::as_object)
            .and_then(|listing| listing.get("id"))
            .and_then(RecordId::from_value)
    }

    pub fn raw_url(&self) -> Option<&'a str> {
        self.data
            .get("url")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    fn param_override(&self, key: &str) -> Option<&'a str> {
        self.data
            .get("listingParamOverrides")
            .and_then(Value::as_object)
            .and_then(|o| o.get(key))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| defined(s))
    }

    pub fn photo_id(&self) -> Option<&'a str> {
        self.param_override("photoId").or_else(|| {
            self.data
                .get("photo_id")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| defined(s))
        })
    }

    /// Numeric part of a `Tag:<id>` category tag
    pub fn category_tag_id(&self) -> Option<&'a str> {
        self.param_override("categoryTag")
            .and_then(|tag| tag.strip_prefix("Tag:"))
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn search_url(&self) -> Option<&'a str> {
        self.data
            .get("searchUrl")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| defined(s))
    }

    fn id_from_url(&self) -> Option<RecordId> {
        let url = self.raw_url().filter(|u| defined(u))?;
        URL_ID_PATTERNS.iter().find_map(|re| {
            re.captures(url)
                .and_then(|c| c.get(1))
                .map(|m| match m.as_str().parse::<i64>() {
                    Ok(n) => RecordId::Number(n),
                    Err(_) => RecordId::Text(m.as_str().to_string()),
                })
        })
    }

    /// Root id, nested listing id, id parsed from the URL, then a
    /// `synthetic-` id hashed from the raw URL.
    pub fn resolve_identifier(&self) -> ResolvedId {
        if let Some(id) = self
            .root_id()
            .or_else(|| self.nested_listing_id())
            .or_else(|| self.id_from_url())
        {
            return ResolvedId {
                id: Some(id),
                synthetic: false,
            };
        }
        match self.raw_url() {
            Some(url) => ResolvedId {
                id: Some(RecordId::Text(format!(
                    "{}{}",
                    SYNTHETIC_ID_PREFIX,
                    short_digest(url)
                ))),
                synthetic: true,
            },
            None => ResolvedId {
                id: None,
                synthetic: false,
            },
        }
    }

    /// Exactly one link, from the most to the least specific source. The
    /// result never contains `undefined`.
    pub fn create_valid_url(&self, site: &SiteUrls) -> String {
        let item_id = self
            .nested_listing_id()
            .or_else(|| self.root_id())
            .or_else(|| self.id_from_url())
            .filter(|id| !id.is_synthetic());

        item_id
            .map(|id| site.item_url(&id.key()))
            .filter(|u| defined(u))
            .or_else(|| self.raw_url().filter(|u| defined(u)).map(str::to_string))
            .or_else(|| self.photo_id().and_then(|p| site.photo_url(p)))
            .or_else(|| self.category_tag_id().and_then(|t| site.category_url(t)))
            .or_else(|| self.search_url().map(str::to_string))
            .filter(|u| defined(u))
            .unwrap_or_else(|| site.root.clone())
    }

    // ------------------------------------------------------------------
    // Descriptive fields
    // ------------------------------------------------------------------

    /// Text of `listing.structuredContent.<key>`, either a plain string or
    /// an object with a `body` (or `title`) string.
    fn structured_line(&self, key: &str) -> Result<Option<String>, FieldError> {
        let Some(listing) = opt_obj(self.data, "listing", "listing")? else {
            return Ok(None);
        };
        let Some(content) = opt_obj(listing, "structuredContent", "listing.structuredContent")?
        else {
            return Ok(None);
        };
        match content.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.trim().to_string()).filter(|s| !s.is_empty())),
            Some(Value::Object(line)) => {
                let text = opt_str(line, "body", "listing.structuredContent.body")?
                    .or(opt_str(line, "title", "listing.structuredContent.title")?);
                Ok(text.map(str::to_string))
            }
            Some(_) => Err(unexpected("listing.structuredContent", "string or object")),
        }
    }

    pub fn price(&self) -> Result<Option<String>, FieldError> {
        if let Some(display) = opt_obj(self.data, "structuredDisplayPrice", "structuredDisplayPrice")? {
            if let Some(primary) =
                opt_obj(display, "primaryLine", "structuredDisplayPrice.primaryLine")?
            {
                if let Some(label) = opt_str(
                    primary,
                    "accessibilityLabel",
                    "structuredDisplayPrice.primaryLine.accessibilityLabel",
                )? {
                    return Ok(Some(label.to_string()));
                }
            }
        }
        Ok(opt_str(self.data, "price", "price")?.map(str::to_string))
    }

    pub fn rating(&self) -> Result<Option<String>, FieldError> {
        if let Some(label) = opt_str(self.data, "avgRatingA11yLabel", "avgRatingA11yLabel")? {
            return Ok(Some(label.to_string()));
        }
        for key in ["rating", "vote_average"] {
            match self.data.get(key) {
                None | Some(Value::Null) => continue,
                Some(Value::String(s)) if !s.trim().is_empty() => {
                    return Ok(Some(s.trim().to_string()))
                }
                Some(Value::String(_)) => continue,
                Some(Value::Number(n)) => {
                    return Ok(n.as_f64().map(|score| format!("{:.1}/10", score)))
                }
                Some(_) => return Err(unexpected("rating", "string or number")),
            }
        }
        Ok(None)
    }

    pub fn bed_type(&self) -> Result<Option<String>, FieldError> {
        self.structured_line("primaryLine")
    }

    /// Host name (with a Superhost marker), else provider text that names
    /// the host.
    pub fn host_info(&self) -> Result<Option<String>, FieldError> {
        if let Some(host) = opt_obj(self.data, "host", "host")? {
            if let Some(name) = opt_str(host, "name", "host.name")? {
                let superhost = host
                    .get("isSuperhost")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                return Ok(Some(if superhost {
                    format!("{} - Superhost", name)
                } else {
                    name.to_string()
                }));
            }
        }
        let category = self.structured_line("mapCategoryInfo")?;
        Ok(category.filter(|info| {
            let lower = info.to_lowercase();
            lower.contains("stay with") || lower.contains("hosting for")
        }))
    }

    pub fn location_text(&self) -> Result<Option<String>, FieldError> {
        if let Some(address) = opt_obj(self.data, "address", "address")? {
            let mut parts = Vec::new();
            for key in ["city", "state", "neighborhood"] {
                if let Some(part) = opt_str(address, key, "address")? {
                    parts.push(part);
                }
            }
            if !parts.is_empty() {
                return Ok(Some(parts.join(", ")));
            }
        }
        self.structured_line("secondaryLine")
    }

    pub fn amenities_text(&self) -> Result<Option<String>, FieldError> {
        let items = match self.data.get("amenities") {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Array(items)) => items,
            Some(_) => return Err(unexpected("amenities", "array")),
        };
        let mut names = Vec::with_capacity(MAX_AMENITIES);
        for item in items.iter().take(MAX_AMENITIES) {
            match item {
                Value::String(s) => names.push(s.trim()),
                _ => return Err(unexpected("amenities", "array of strings")),
            }
        }
        names.retain(|s| !s.is_empty());
        Ok((!names.is_empty()).then(|| names.join(", ")))
    }

    pub fn description_preview(&self) -> Result<Option<String>, FieldError> {
        let Some(description) = opt_str(self.data, "description", "description")? else {
            return Ok(None);
        };
        Ok(Some(match description.char_indices().nth(DESCRIPTION_PREVIEW_CHARS) {
            Some((cut, _)) => format!("{}...", description[..cut].trim_end()),
            None => description.to_string(),
        }))
    }

    // ------------------------------------------------------------------
    // Titles
    // ------------------------------------------------------------------

    pub fn best_title(&self, kind: CatalogKind) -> Result<String, FieldError> {
        match kind {
            CatalogKind::Movies => self.movie_title(),
            CatalogKind::Rentals => self.rental_title(),
        }
    }

    fn movie_title(&self) -> Result<String, FieldError> {
        let title = opt_str(self.data, "title", "title")?
            .or(opt_str(self.data, "name", "name")?)
            .unwrap_or(GENERIC_MOVIE_TITLE);
        Ok(title.to_string())
    }

    /// Host sentence, provider category text, bed-derived phrase, generic.
    fn rental_title(&self) -> Result<String, FieldError> {
        if let Some(host) = opt_obj(self.data, "host", "host")? {
            if let Some(name) = opt_str(host, "name", "host.name")? {
                let location = self.location_text().ok().flatten();
                return Ok(match location {
                    Some(location) => format!("Stay hosted by {} in {}", name, location),
                    None => format!("Stay hosted by {}", name),
                });
            }
        }
        if let Some(category) = self.structured_line("mapCategoryInfo")? {
            return Ok(category);
        }
        if let Some(beds) = self.bed_type()? {
            return Ok(title_from_beds(&beds));
        }
        Ok(GENERIC_RENTAL_TITLE.to_string())
    }

    // ------------------------------------------------------------------
    // Movie fields
    // ------------------------------------------------------------------

    fn optional_text(&self, key: &'static str) -> Option<String> {
        match opt_str(self.data, key, key) {
            Ok(value) => value.map(str::to_string),
            Err(e) => {
                debug!("Ignoring {}: {}", key, e);
                None
            }
        }
    }
}

fn title_from_beds(beds: &str) -> String {
    let lower = beds.to_lowercase();
    if lower.contains("queen") {
        return "Comfortable Queen Bed Accommodation".to_string();
    }
    if lower.contains("king") {
        return "Spacious King Bed Accommodation".to_string();
    }
    if lower.contains("double") {
        return "Cozy Double Bed Accommodation".to_string();
    }
    if let Some(count) = BED_COUNT_RE.captures(&lower).and_then(|c| c.get(1)) {
        return match count.as_str() {
            "1" => "Private Room Accommodation".to_string(),
            "2" => "Two-Bed Accommodation".to_string(),
            n => format!("Spacious {}-Bed Accommodation", n),
        };
    }
    format!("Comfortable {} Accommodation", beds)
}

/// Turns raw records into canonical ones for one catalog.
#[derive(Debug, Clone)]
pub struct ListingNormalizer {
    kind: CatalogKind,
    site: SiteUrls,
}

impl ListingNormalizer {
    pub fn new(catalog: &CatalogConfig) -> Self {
        Self {
            kind: catalog.kind,
            site: catalog.site(),
        }
    }

    pub fn kind(&self) -> CatalogKind {
        self.kind
    }

    pub fn site(&self) -> &SiteUrls {
        &self.site
    }

    pub fn generic_title(&self) -> &'static str {
        match self.kind {
            CatalogKind::Movies => GENERIC_MOVIE_TITLE,
            CatalogKind::Rentals => GENERIC_RENTAL_TITLE,
        }
    }

    /// Exactly one canonical record per raw record. Never fails.
    pub fn normalize(&self, raw: &RawRecord) -> CanonicalRecord {
        let listing = RawListing::new(raw);
        let resolved = listing.resolve_identifier();

        let title = field_or(
            "title",
            listing.best_title(self.kind).map(Some),
            self.generic_title(),
        );
        let mut record = CanonicalRecord::new(title, listing.create_valid_url(&self.site));
        record.identifier = resolved.id;
        record.synthetic_id = resolved.synthetic;
        record.alternate_id = listing.alternate_id();

        record.price = field_or("price", listing.price(), PRICE_NOT_AVAILABLE);
        record.rating = field_or("rating", listing.rating(), RATING_NOT_AVAILABLE);
        record.bed_type = field_or("bed_type", listing.bed_type(), BED_TYPE_NOT_AVAILABLE);
        record.location = field_or("location", listing.location_text(), LOCATION_NOT_AVAILABLE);
        record.amenities = field_or("amenities", listing.amenities_text(), AMENITIES_NOT_AVAILABLE);
        record.host = field_or("host", listing.host_info(), HOST_NOT_AVAILABLE);
        record.description = field_or(
            "description",
            listing.description_preview(),
            DESCRIPTION_NOT_AVAILABLE,
        );

        record.release_date = listing.optional_text("release_date");
        record.overview = listing.optional_text("overview");
        record.explanation = listing.optional_text("explanation");
        record.poster_url = listing.optional_text("poster_url");
        if let Some(flag) = raw.get("is_current_release").and_then(Value::as_bool) {
            record.is_current_release = Some(flag);
        }
        record
    }
}

fn field_or(field: &str, value: Result<Option<String>, FieldError>, sentinel: &str) -> String {
    match value {
        Ok(Some(text)) => text,
        Ok(None) => sentinel.to_string(),
        Err(e) => {
            debug!(field, "Field derivation failed, using fallback: {}", e);
            sentinel.to_string()
        }
    }
}
