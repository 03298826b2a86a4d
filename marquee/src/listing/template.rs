//! Fixed-field display projection of a canonical record.

use crate::config::SiteUrls;
use crate::types::{
    CanonicalRecord, AMENITIES_NOT_AVAILABLE, DESCRIPTION_NOT_AVAILABLE, HOST_NOT_AVAILABLE,
    LOCATION_NOT_AVAILABLE,
};

#[derive(Debug, Clone, PartialEq)]
pub struct ListingTemplate {
    pub title: String,
    pub price: String,
    pub bed_type: String,
    pub rating: String,
    pub url: String,
    pub location: String,
    pub host: String,
    pub amenities: String,
    pub description: String,
    site_root: String,
    site_name: String,
}

impl ListingTemplate {
    pub fn from_record(record: &CanonicalRecord, site: &SiteUrls) -> Self {
        Self {
            title: record.title.clone(),
            price: record.price.clone(),
            bed_type: record.bed_type.clone(),
            rating: record.rating.clone(),
            url: record.url.clone(),
            location: record.location.clone(),
            host: record.host.clone(),
            amenities: record.amenities.clone(),
            description: record.description.clone(),
            site_root: site.root.clone(),
            site_name: site_name(&site.root),
        }
    }

    /// Markdown entry numbered `index` (1-based), or `None` when the record
    /// only links to the bare site root and is not worth showing.
    pub fn to_markdown(&self, index: usize) -> Option<String> {
        if self.url.is_empty() || self.url == self.site_root {
            return None;
        }

        let mut md = format!("### {}. **{}**\n", index, self.title);
        md.push_str(&format!("- **Price:** {}\n", self.price));
        md.push_str(&format!("- **Bed Type:** {}\n", self.bed_type));
        md.push_str(&format!("- **Rating:** {}\n", self.rating));

        let optional = [
            ("Location", &self.location, LOCATION_NOT_AVAILABLE),
            ("Host", &self.host, HOST_NOT_AVAILABLE),
            ("Amenities", &self.amenities, AMENITIES_NOT_AVAILABLE),
            ("Description", &self.description, DESCRIPTION_NOT_AVAILABLE),
        ];
        for (label, value, sentinel) in optional {
            if !value.is_empty() && value != sentinel {
                md.push_str(&format!("- **{}:** {}\n", label, value));
            }
        }

        md.push_str(&format!("- [{}]({})\n\n", self.link_label(), self.url));
        Some(md)
    }

    /// Link text chosen by the shape of the URL
    pub fn link_label(&self) -> String {
        let url = self.url.as_str();
        if url.contains("/rooms?photos=") {
            format!("View Listing on {}", self.site_name)
        } else if url.contains("/s/homes?category_tag_id=") {
            format!("View Property on {}", self.site_name)
        } else if url.contains("/s/") {
            format!("Browse {} Listings", self.site_name)
        } else {
            format!("View on {}", self.site_name)
        }
    }
}

/// "https://www.airbnb.com" -> "Airbnb"
fn site_name(root: &str) -> String {
    let host = root
        .split("://")
        .nth(1)
        .unwrap_or(root)
        .trim_start_matches("www.");
    let label = host.split(|c: char| c == '.' || c == '/').next().unwrap_or(host);
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => root.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn template(url: &str) -> ListingTemplate {
        let mut record = CanonicalRecord::new("Stay hosted by Ana", url);
        record.price = "$120 per night".to_string();
        record.host = "Ana - Superhost".to_string();
        ListingTemplate::from_record(&record, &SiteUrls::rentals())
    }

    #[test]
    fn test_site_root_is_suppressed() {
        assert_eq!(template("https://www.airbnb.com").to_markdown(1), None);
        assert_eq!(template("").to_markdown(1), None);
    }

    #[test]
    fn test_markdown_skips_sentinels() {
        let md = template("https://www.airbnb.com/rooms/42").to_markdown(2).unwrap();
        assert_eq!(
            md,
            "### 2. **Stay hosted by Ana**\n\
             - **Price:** $120 per night\n\
             - **Bed Type:** Bed type not available\n\
             - **Rating:** Rating not available\n\
             - **Host:** Ana - Superhost\n\
             - [View on Airbnb](https://www.airbnb.com/rooms/42)\n\n"
        );
    }

    #[test]
    fn test_link_labels_follow_url_shape() {
        assert_eq!(
            template("https://www.airbnb.com/rooms?photos=1").link_label(),
            "View Listing on Airbnb"
        );
        assert_eq!(
            template("https://www.airbnb.com/s/homes?category_tag_id=8").link_label(),
            "View Property on Airbnb"
        );
        assert_eq!(
            template("https://www.airbnb.com/s/Paris/homes").link_label(),
            "Browse Airbnb Listings"
        );
    }
}
