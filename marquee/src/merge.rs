//! Attaches satellite records (theaters and their showtimes) to the
//! canonical records they belong to.

use std::collections::HashMap;

use tracing::debug;

use crate::types::{CanonicalRecord, RecordId, SatelliteRecord};

/// Per-run lookup tables over the usable satellites.
///
/// A satellite is indexed under its primary-entity id (string form and,
/// when numeric, integer form) and under its primary-entity title.
#[derive(Debug, Default)]
pub struct SatelliteIndex {
    by_id: HashMap<String, Vec<SatelliteRecord>>,
    by_int_id: HashMap<i64, Vec<SatelliteRecord>>,
    by_title: HashMap<String, Vec<SatelliteRecord>>,
}

impl SatelliteIndex {
    /// Unusable satellites (no name or no showtimes) are discarded here and
    /// never reach any record.
    pub fn build(satellites: Vec<SatelliteRecord>) -> Self {
        let mut index = Self::default();
        let mut discarded = 0usize;
        for satellite in satellites {
            if !satellite.is_usable() {
                discarded += 1;
                continue;
            }
            if satellite.movie_id.is_none() && satellite.movie_title.is_none() {
                discarded += 1;
                continue;
            }
            if let Some(id) = satellite.movie_id.clone() {
                index.insert_by_id(&id, satellite.clone());
            }
            if let Some(title) = satellite.movie_title.clone() {
                index.by_title.entry(title).or_default().push(satellite);
            }
        }
        if discarded > 0 {
            debug!(discarded, "Discarded unusable satellite records");
        }
        index
    }

    fn insert_by_id(&mut self, id: &RecordId, satellite: SatelliteRecord) {
        if let Some(n) = id.as_integer() {
            self.by_int_id.entry(n).or_default().push(satellite.clone());
        }
        self.by_id.entry(id.key()).or_default().push(satellite);
    }

    /// Id match first (string form, then integer form), then exact title.
    /// A title match is written back under the record's id.
    pub fn lookup(&mut self, id: Option<&RecordId>, title: &str) -> Vec<SatelliteRecord> {
        if let Some(id) = id {
            if let Some(found) = self.by_id.get(&id.key()).filter(|v| !v.is_empty()) {
                return found.clone();
            }
            if let Some(found) = id
                .as_integer()
                .and_then(|n| self.by_int_id.get(&n))
                .filter(|v| !v.is_empty())
            {
                return found.clone();
            }
        }

        let Some(found) = self.by_title.get_mut(title).filter(|v| !v.is_empty()) else {
            return Vec::new();
        };
        if let Some(id) = id {
            for satellite in found.iter_mut() {
                satellite.movie_id = Some(id.clone());
            }
            let healed = found.clone();
            for satellite in healed.iter().cloned() {
                self.insert_by_id(id, satellite);
            }
            return healed;
        }
        found.clone()
    }
}

/// Produce new records with their matching satellites attached. A record
/// that already carries satellites keeps them and is not looked up.
pub fn merge_satellites(
    records: Vec<CanonicalRecord>,
    satellites: Vec<SatelliteRecord>,
) -> Vec<CanonicalRecord> {
    let mut index = SatelliteIndex::build(satellites);
    records
        .into_iter()
        .map(|mut record| {
            if record.identifier.is_none() {
                record.identifier = record.alternate_id.clone();
            }
            if !record.satellite_entities.is_empty() {
                return record;
            }
            let matched = index.lookup(record.identifier.as_ref(), &record.title);
            if !matched.is_empty() {
                debug!(
                    title = %record.title,
                    satellites = matched.len(),
                    "Attached satellite records"
                );
            }
            record.satellite_entities = matched;
            record
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Showtime;
    use pretty_assertions::assert_eq;

    fn satellite(name: &str, id: Option<RecordId>, title: Option<&str>, times: usize) -> SatelliteRecord {
        SatelliteRecord {
            name: name.to_string(),
            address: String::new(),
            distance_miles: None,
            movie_id: id,
            movie_title: title.map(str::to_string),
            showtimes: (0..times)
                .map(|i| Showtime {
                    start_time: format!("2025-03-01T1{}:00:00", i),
                    format: "Standard".to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_id_match_wins_and_unusable_satellites_are_dropped() {
        let records = vec![
            CanonicalRecord::new("Alpha", "https://x/10").with_identifier("10"),
            CanonicalRecord::new("Beta", "https://x/20").with_identifier("20"),
        ];
        let satellites = vec![
            satellite("Cinema One", Some(RecordId::Number(10)), Some("Alpha"), 2),
            satellite("Cinema Two", Some(RecordId::Number(20)), None, 0),
            satellite("Cinema Three", None, Some("Alpha"), 2),
        ];

        let merged = merge_satellites(records, satellites);
        assert_eq!(merged[0].satellite_entities.len(), 1);
        assert_eq!(merged[0].satellite_entities[0].name, "Cinema One");
        let showtimes: usize = merged[0]
            .satellite_entities
            .iter()
            .map(|s| s.showtimes.len())
            .sum();
        assert_eq!(showtimes, 2);
        assert!(merged[1].satellite_entities.is_empty());
    }

    #[test]
    fn test_title_match_backfills_id() {
        let mut index = SatelliteIndex::build(vec![satellite("Cinema", None, Some("Alpha"), 1)]);
        let id = RecordId::Text("10".into());
        let found = index.lookup(Some(&id), "Alpha");
        assert_eq!(found[0].movie_id, Some(id.clone()));

        let again = index.lookup(Some(&RecordId::Number(10)), "Renamed");
        assert_eq!(again.len(), 1);
    }

    #[test]
    fn test_alternate_id_is_written_back() {
        let mut record = CanonicalRecord::new("Alpha", "https://x/10");
        record.alternate_id = Some(RecordId::Number(10));
        let merged = merge_satellites(
            vec![record],
            vec![satellite("Cinema", Some(RecordId::Text("10".into())), None, 1)],
        );
        assert_eq!(merged[0].identifier, Some(RecordId::Number(10)));
        assert_eq!(merged[0].satellite_entities.len(), 1);
    }

    #[test]
    fn test_existing_satellites_are_kept() {
        let mut record = CanonicalRecord::new("Alpha", "https://x/10").with_identifier(10);
        record.satellite_entities.push(satellite("Cached", None, None, 1));
        let merged = merge_satellites(
            vec![record],
            vec![satellite("Fresh", Some(RecordId::Number(10)), None, 1)],
        );
        let names: Vec<_> = merged[0].satellite_entities.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Cached"]);
    }
}
