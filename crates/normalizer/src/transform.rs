use chrono::{DateTime, NaiveDateTime, Utc};
use common::text::non_blank;

use crate::error::NormalizeError;
use crate::models::{CategoryRating, NormalizedReview, ReviewSource, ReviewType};
use crate::payloads::RemoteReview;

const PUBLISHED_STATUS: &str = "published";
const DEFAULT_LANGUAGE: &str = "en";
const UNKNOWN_CHANNEL: &str = "unknown";

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

pub fn normalize_review(record: &RemoteReview) -> Result<NormalizedReview, NormalizeError> {
    let id = record.id.to_string();

    let submitted_at = record
        .submitted_at
        .as_deref()
        .ok_or_else(|| NormalizeError::MissingTimestamp { id: id.clone() })?;
    let created_at =
        parse_submitted_at(submitted_at).ok_or_else(|| NormalizeError::MalformedTimestamp {
            id: id.clone(),
            value: submitted_at.to_string(),
        })?;

    let listing_external_id = record.listing_name.trim();
    if listing_external_id.is_empty() {
        return Err(NormalizeError::MissingListing { id });
    }

    let category_ratings: Vec<CategoryRating> = record
        .review_category
        .iter()
        .map(|entry| CategoryRating {
            category: entry.category.clone(),
            rating: entry.rating,
        })
        .collect();

    Ok(NormalizedReview {
        source: ReviewSource::Hostaway,
        external_id: id,
        listing_external_id: listing_external_id.to_string(),
        property_id: None,
        review_type: map_review_type(&record.review_type),
        channel: map_channel(record.channel_name.as_deref()).to_string(),
        rating: overall_rating(record.rating, &category_ratings),
        title: None,
        body: record.public_review.clone(),
        author_name: non_blank(record.guest_name.as_deref()),
        language: DEFAULT_LANGUAGE.to_string(),
        created_at,
        approved: is_published(record.status.as_deref()),
        category_ratings,
    })
}

/// Explicit rating wins, then the unweighted category mean, then zero.
fn overall_rating(explicit: Option<f64>, categories: &[CategoryRating]) -> f64 {
    if let Some(rating) = explicit {
        return rating;
    }
    if categories.is_empty() {
        return 0.0;
    }
    let sum: f64 = categories.iter().map(|c| c.rating).sum();
    sum / categories.len() as f64
}

fn is_published(status: Option<&str>) -> bool {
    status == Some(PUBLISHED_STATUS)
}

pub fn map_review_type(raw: &str) -> ReviewType {
    match raw {
        "host-to-guest" => ReviewType::HostToGuest,
        "guest-to-host" => ReviewType::GuestToHost,
        "public" => ReviewType::Public,
        _ => ReviewType::GuestToHost,
    }
}

pub fn map_channel(raw: Option<&str>) -> &'static str {
    match raw.map(str::trim) {
        Some("Airbnb") => "airbnb",
        Some("Booking.com") => "booking",
        Some("VRBO") => "vrbo",
        Some("Direct") => "direct",
        Some("Expedia") => "expedia",
        Some("TripAdvisor") => "tripadvisor",
        _ => UNKNOWN_CHANNEL,
    }
}

/// Parses provider timestamps. Zone-less values are taken as UTC.
pub fn parse_submitted_at(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payloads::{RemoteCategoryRating, RemoteId};
    use chrono::TimeZone;

    fn record() -> RemoteReview {
        RemoteReview {
            id: RemoteId::Number(55),
            review_type: "guest-to-host".into(),
            status: Some("published".into()),
            rating: None,
            public_review: "Lovely flat, would stay again.".into(),
            review_category: vec![
                RemoteCategoryRating {
                    category: "cleanliness".into(),
                    rating: 8.0,
                },
                RemoteCategoryRating {
                    category: "location".into(),
                    rating: 10.0,
                },
            ],
            submitted_at: Some("2020-09-10 12:00:00".into()),
            guest_name: Some("Amy".into()),
            listing_name: "2B N1 A".into(),
            channel_name: None,
        }
    }

    #[test]
    fn normalizes_published_guest_review() {
        let normalized = normalize_review(&record()).unwrap();
        assert_eq!(normalized.source, ReviewSource::Hostaway);
        assert_eq!(normalized.external_id, "55");
        assert_eq!(normalized.rating, 9.0);
        assert_eq!(normalized.review_type, ReviewType::GuestToHost);
        assert!(normalized.approved);
        assert_eq!(normalized.author_name.as_deref(), Some("Amy"));
        assert_eq!(normalized.body, "Lovely flat, would stay again.");
        assert_eq!(normalized.listing_external_id, "2B N1 A");
        assert_eq!(normalized.language, "en");
        assert_eq!(normalized.channel, "unknown");
        assert_eq!(normalized.category_ratings.len(), 2);
        assert_eq!(
            normalized.created_at,
            Utc.with_ymd_and_hms(2020, 9, 10, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn explicit_rating_is_used_verbatim() {
        for explicit in [0.0, 4.5, 10.0] {
            let mut raw = record();
            raw.rating = Some(explicit);
            assert_eq!(normalize_review(&raw).unwrap().rating, explicit);
        }
    }

    #[test]
    fn category_mean_when_rating_missing() {
        let mut raw = record();
        raw.review_category.push(RemoteCategoryRating {
            category: "communication".into(),
            rating: 7.0,
        });
        let rating = normalize_review(&raw).unwrap().rating;
        assert!((rating - 25.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn zero_when_nothing_to_rate() {
        let mut raw = record();
        raw.review_category.clear();
        assert_eq!(normalize_review(&raw).unwrap().rating, 0.0);
    }

    #[test]
    fn approval_fails_closed() {
        for status in [None, Some(""), Some("archived"), Some("Published"), Some("awaiting")] {
            let mut raw = record();
            raw.status = status.map(str::to_string);
            assert!(!normalize_review(&raw).unwrap().approved, "{status:?}");
        }
    }

    #[test]
    fn review_type_defaults_to_guest_to_host() {
        assert_eq!(map_review_type("host-to-guest"), ReviewType::HostToGuest);
        assert_eq!(map_review_type("public"), ReviewType::Public);
        assert_eq!(map_review_type("mystery"), ReviewType::GuestToHost);
        assert_eq!(map_review_type(""), ReviewType::GuestToHost);
    }

    #[test]
    fn channel_names_map_to_tags() {
        assert_eq!(map_channel(Some("Booking.com")), "booking");
        assert_eq!(map_channel(Some("Airbnb")), "airbnb");
        assert_eq!(map_channel(Some("Carrier pigeon")), "unknown");
        assert_eq!(map_channel(None), "unknown");
    }

    #[test]
    fn malformed_timestamp_is_an_error() {
        let mut raw = record();
        raw.submitted_at = Some("yesterday-ish".into());
        let err = normalize_review(&raw).unwrap_err();
        assert!(matches!(err, NormalizeError::MalformedTimestamp { .. }));
        assert_eq!(err.review_id(), "55");
    }

    #[test]
    fn missing_timestamp_is_an_error() {
        let mut raw = record();
        raw.submitted_at = None;
        assert!(matches!(
            normalize_review(&raw),
            Err(NormalizeError::MissingTimestamp { .. })
        ));
    }

    #[test]
    fn blank_guest_name_becomes_none() {
        let mut raw = record();
        raw.guest_name = Some("   ".into());
        assert_eq!(normalize_review(&raw).unwrap().author_name, None);
    }

    #[test]
    fn parses_rfc3339_timestamps() {
        let parsed = parse_submitted_at("2021-03-01T08:30:00+01:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2021, 3, 1, 7, 30, 0).unwrap());
    }
}
