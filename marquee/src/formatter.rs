//! User-facing response text built from the final records.

use chrono::{DateTime, NaiveDateTime};
use tracing::warn;

use crate::config::{CatalogKind, SiteUrls};
use crate::listing::ListingTemplate;
use crate::types::{CanonicalRecord, Showtime};

const OVERVIEW_MAX_CHARS: usize = 150;
const SHOWTIMES_SHOWN: usize = 3;

pub const GENERATION_FAILED_MESSAGE: &str =
    "I'm experiencing technical difficulties and couldn't process your request. Please try again later.";

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

/// Response text for records of the given kind
pub fn format_response(
    kind: CatalogKind,
    records: &[CanonicalRecord],
    query: &str,
    site: &SiteUrls,
) -> String {
    match kind {
        CatalogKind::Movies => format_movies(records, query),
        CatalogKind::Rentals => format_rentals(records, query, site),
    }
}

pub fn no_results_message(kind: CatalogKind, query: &str) -> String {
    match kind {
        CatalogKind::Movies => format!(
            "I'm sorry, I couldn't find any movies matching '{}'. Could you try a different request? \
             For example, you could ask for action movies, family films, or movies starring a specific actor.",
            query
        ),
        CatalogKind::Rentals => format!(
            "I'm sorry, I couldn't find any listings matching '{}'. Could you try a different \
             location, dates or number of guests?",
            query
        ),
    }
}

fn movies_intro(query: &str, count: usize) -> String {
    let q = query.to_lowercase();
    let any = |terms: &[&str]| terms.iter().any(|t| q.contains(t));
    let s = plural(count);
    if any(&["now playing", "theaters now", "playing now", "showing now", "this weekend", "this week"]) {
        format!(
            "Based on your interest in movies currently playing, I found {} movie{} that you might enjoy.",
            count, s
        )
    } else if any(&["marvel", "superhero", "comic"]) {
        format!("I found {} Marvel/superhero movie{} that match your criteria.", count, s)
    } else if any(&["action", "adventure", "thriller", "exciting"]) {
        format!("I found {} action/thriller movie{} that match your criteria.", count, s)
    } else if any(&["family", "kids", "children"]) {
        format!(
            "I found {} family-friendly movie{} that would be great to watch with kids.",
            count, s
        )
    } else {
        format!(
            "Based on your interest in '{}', I found {} movie{} that you might enjoy.",
            query, count, s
        )
    }
}

/// `HH:MM (format)` for full timestamps; anything short or unparseable is
/// shown as given.
pub fn format_showtime(showtime: &Showtime) -> String {
    let raw = showtime.start_time.trim();
    if raw.len() <= 10 {
        return raw.to_string();
    }
    let normalized = raw.replacen(' ', "T", 1);
    let time = DateTime::parse_from_rfc3339(&normalized)
        .map(|dt| dt.format("%H:%M").to_string())
        .or_else(|_| {
            NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S")
                .or_else(|_| NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M"))
                .map(|dt| dt.format("%H:%M").to_string())
        });
    match time {
        Ok(time) if showtime.format.is_empty() => time,
        Ok(time) => format!("{} ({})", time, showtime.format),
        Err(e) => {
            warn!("Could not parse showtime '{}': {}", raw, e);
            raw.to_string()
        }
    }
}

fn truncate_overview(overview: &str) -> String {
    if overview.chars().count() <= OVERVIEW_MAX_CHARS {
        return overview.to_string();
    }
    let head: String = overview.chars().take(OVERVIEW_MAX_CHARS - 3).collect();
    format!("{}...", head)
}

pub fn format_movies(records: &[CanonicalRecord], query: &str) -> String {
    if records.is_empty() {
        return no_results_message(CatalogKind::Movies, query);
    }

    let mut out = movies_intro(query, records.len());
    out.push_str("\n\n");

    for (i, movie) in records.iter().enumerate() {
        let year = movie
            .release_date
            .as_deref()
            .and_then(|d| d.get(..4))
            .filter(|y| y.chars().all(|c| c.is_ascii_digit()));

        out.push_str(&format!("{}. **{}", i + 1, movie.title));
        if let Some(year) = year {
            out.push_str(&format!(" ({})", year));
        }
        out.push_str("**");
        if let Some(explanation) = movie.explanation.as_deref().filter(|e| !e.is_empty()) {
            out.push_str(&format!(": {}", explanation));
        }
        out.push('\n');

        if let Some(overview) = movie.overview.as_deref().filter(|o| !o.is_empty()) {
            out.push_str(&format!("   {}\n", truncate_overview(overview)));
        }

        let theaters = &movie.satellite_entities;
        match (movie.is_current_release.unwrap_or(false), theaters.first()) {
            (true, Some(first)) => {
                out.push_str(&format!(
                    "   Available at {} theater{}.\n",
                    theaters.len(),
                    plural(theaters.len())
                ));
                let times: Vec<String> = first
                    .showtimes
                    .iter()
                    .take(SHOWTIMES_SHOWN)
                    .map(format_showtime)
                    .collect();
                if times.is_empty() {
                    out.push_str(&format!("   {}: Call theater for showtimes\n", first.name));
                } else {
                    out.push_str(&format!("   {}: {}\n", first.name, times.join(", ")));
                }
            }
            (true, None) => out.push_str(
                "   No theater information available for this current release. \
                 You may need to check local theater websites for showtimes.\n",
            ),
            (false, _) => match year {
                Some(year) => out.push_str(&format!(
                    "   This is a {} release, not currently playing in theaters.\n",
                    year
                )),
                None => out.push_str("   This movie is not currently playing in theaters.\n"),
            },
        }
        out.push('\n');
    }

    if records.iter().any(|m| !m.satellite_entities.is_empty()) {
        out.push_str("Would you like more information about any of these movies or their showtimes?");
    } else {
        out.push_str(
            "Would you like more information about any of these movies or would you prefer different recommendations?",
        );
    }
    out
}

/// Markdown of every listing with a usable link, numbered from 1.
pub fn format_rentals(records: &[CanonicalRecord], query: &str, site: &SiteUrls) -> String {
    let entries: Vec<String> = records
        .iter()
        .map(|r| ListingTemplate::from_record(r, site))
        .filter_map({
            let mut shown = 0usize;
            move |template| {
                let md = template.to_markdown(shown + 1)?;
                shown += 1;
                Some(md)
            }
        })
        .collect();

    if entries.is_empty() {
        return no_results_message(CatalogKind::Rentals, query);
    }

    let mut out = format!(
        "Here {} {} listing{} matching your search:\n\n",
        if entries.len() == 1 { "is" } else { "are" },
        entries.len(),
        plural(entries.len())
    );
    for entry in entries {
        out.push_str(&entry);
    }
    out.trim_end().to_string()
}
