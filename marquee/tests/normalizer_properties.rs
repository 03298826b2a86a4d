use marquee::config::{CatalogConfig, CatalogKind, SiteUrls};
use marquee::listing::{ListingNormalizer, RawListing, GENERIC_RENTAL_TITLE};
use marquee::recovery::RawRecord;
use marquee::types::{PRICE_NOT_AVAILABLE, RATING_NOT_AVAILABLE};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn raw(value: Value) -> RawRecord {
    value.as_object().cloned().unwrap()
}

fn awkward_records() -> Vec<RawRecord> {
    vec![
        raw(json!({})),
        raw(json!({"url": "https://www.airbnb.com/rooms/undefined"})),
        raw(json!({"id": "undefined", "url": "undefined"})),
        raw(json!({"listing": {"id": "undefined"}, "searchUrl": "https://www.airbnb.com/s/undefined"})),
        raw(json!({"listingParamOverrides": {"photoId": "undefined", "categoryTag": "Tag:undefined"}})),
        raw(json!({"listing": {"id": 4_242_424}, "url": "https://www.airbnb.com/rooms/undefined"})),
        raw(json!({"listing": "not an object", "host": [], "amenities": "pool"})),
        raw(json!({"url": "https://www.airbnb.com/rooms/plus_undefined_suffix"})),
    ]
}

#[test]
fn test_url_never_contains_undefined() {
    let normalizer = ListingNormalizer::new(&CatalogConfig::new(CatalogKind::Rentals));
    for record in awkward_records() {
        let canonical = normalizer.normalize(&record);
        assert!(
            !canonical.url.contains("undefined"),
            "url {:?} from {:?}",
            canonical.url,
            record
        );
        assert!(!canonical.title.is_empty());
    }
}

#[test]
fn test_url_resolution_is_idempotent() {
    let site = SiteUrls::rentals();
    let normalizer = ListingNormalizer::new(&CatalogConfig::new(CatalogKind::Rentals));
    let mut records = awkward_records();
    records.push(raw(json!({"url": "https://www.airbnb.com/rooms/98765"})));
    records.push(raw(json!({"listingParamOverrides": {"photoId": "555"}})));

    for record in records {
        let listing = RawListing::new(&record);
        let first = listing.create_valid_url(&site);
        assert_eq!(first, listing.create_valid_url(&site));

        // Feeding the resolved link back in resolves to the same link
        let canonical = normalizer.normalize(&record);
        let again = normalizer.normalize(&raw(json!({"url": canonical.url})));
        assert_eq!(again.url, first);
    }
}

#[test]
fn test_one_bad_record_does_not_affect_the_batch() {
    let normalizer = ListingNormalizer::new(&CatalogConfig::new(CatalogKind::Rentals));
    let batch: Vec<RawRecord> = (1..=5)
        .map(|i| {
            if i == 3 {
                raw(json!({
                    "id": i,
                    "host": {"name": 42},
                    "avgRatingA11yLabel": "4.8 out of 5"
                }))
            } else {
                raw(json!({
                    "id": i,
                    "host": {"name": format!("Host {}", i)},
                    "structuredDisplayPrice": {"primaryLine": {"accessibilityLabel": "$99 per night"}}
                }))
            }
        })
        .collect();

    let records: Vec<_> = batch.iter().map(|r| normalizer.normalize(r)).collect();
    assert_eq!(records.len(), 5);
    assert_eq!(records[2].title, GENERIC_RENTAL_TITLE);
    assert_eq!(records[2].rating, "4.8 out of 5");
    assert_eq!(records[2].price, PRICE_NOT_AVAILABLE);
    for (i, record) in records.iter().enumerate().filter(|(i, _)| *i != 2) {
        assert_eq!(record.title, format!("Stay hosted by Host {}", i + 1));
        assert_eq!(record.price, "$99 per night");
        assert_eq!(record.rating, RATING_NOT_AVAILABLE);
        assert_eq!(record.url, format!("https://www.airbnb.com/rooms/{}", i + 1));
    }
}

#[test]
fn test_custom_site_templates() {
    let catalog = CatalogConfig {
        kind: CatalogKind::Movies,
        site: Some(SiteUrls {
            root: "https://movies.example.org".to_string(),
            item: "https://movies.example.org/title/{id}".to_string(),
            photo_search: None,
            category_search: None,
        }),
    };
    let normalizer = ListingNormalizer::new(&catalog);
    let record = normalizer.normalize(&raw(json!({"title": "Nosferatu", "id": "426063"})));
    assert_eq!(record.url, "https://movies.example.org/title/426063");

    let unlinked = normalizer.normalize(&raw(json!({"title": "Unknown"})));
    assert_eq!(unlinked.url, "https://movies.example.org");
}
