use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use db::{ReviewCategoryRow, ReviewRow};
use serde::Serialize;
use uuid::Uuid;

use crate::{mean, percentage};

const RECENT_WINDOW_DAYS: i64 = 30;

/// Average and count over a property's approved reviews, as shown publicly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingSummary {
    pub rating_avg: f64,
    pub review_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyMetrics {
    pub total_reviews: usize,
    pub approved_reviews: usize,
    pub pending_reviews: usize,
    pub avg_rating: f64,
    pub approval_rate: f64,
    pub channel_stats: BTreeMap<String, usize>,
    pub category_stats: BTreeMap<String, usize>,
    /// Reviews created within the last 30 days of `now`.
    pub recent_reviews: usize,
}

pub fn rating_summary(reviews: &[ReviewRow]) -> RatingSummary {
    let approved: Vec<&ReviewRow> = reviews.iter().filter(|r| r.approved).collect();
    let sum: f64 = approved.iter().map(|r| r.rating).sum();
    RatingSummary {
        rating_avg: mean(sum, approved.len()),
        review_count: approved.len(),
    }
}

pub fn property_metrics(
    reviews: &[ReviewRow],
    categories: &[ReviewCategoryRow],
    now: DateTime<Utc>,
) -> PropertyMetrics {
    let total = reviews.len();
    let approved = reviews.iter().filter(|r| r.approved).count();
    let sum: f64 = reviews.iter().map(|r| r.rating).sum();
    let recent_cutoff = now - Duration::days(RECENT_WINDOW_DAYS);

    let mut channel_stats = BTreeMap::new();
    for review in reviews {
        *channel_stats.entry(review.channel.clone()).or_insert(0) += 1;
    }

    let ids: HashSet<Uuid> = reviews.iter().map(|r| r.id).collect();
    let mut category_stats = BTreeMap::new();
    for row in categories.iter().filter(|c| ids.contains(&c.review_id)) {
        *category_stats.entry(row.name.clone()).or_insert(0) += 1;
    }

    PropertyMetrics {
        total_reviews: total,
        approved_reviews: approved,
        pending_reviews: total - approved,
        avg_rating: mean(sum, total),
        approval_rate: percentage(approved, total),
        channel_stats,
        category_stats,
        recent_reviews: reviews
            .iter()
            .filter(|r| r.created_at >= recent_cutoff)
            .count(),
    }
}

/// Buckets reviews by their matched property; unmatched reviews are dropped.
pub fn group_by_property(reviews: Vec<ReviewRow>) -> HashMap<Uuid, Vec<ReviewRow>> {
    let mut grouped: HashMap<Uuid, Vec<ReviewRow>> = HashMap::new();
    for review in reviews {
        if let Some(property_id) = review.property_id {
            grouped.entry(property_id).or_default().push(review);
        }
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::tests::review;

    #[test]
    fn rating_summary_counts_only_approved() {
        let reviews = vec![
            review("airbnb", 10.0, true),
            review("airbnb", 2.0, false),
            review("direct", 8.0, true),
        ];
        assert_eq!(
            rating_summary(&reviews),
            RatingSummary {
                rating_avg: 9.0,
                review_count: 2
            }
        );
        assert_eq!(rating_summary(&[]), RatingSummary::default());
    }

    #[test]
    fn metrics_track_recent_reviews_and_channels() {
        let mut fresh = review("airbnb", 9.0, true);
        let now = fresh.created_at + Duration::days(3);
        let mut stale = review("booking", 5.0, false);
        stale.created_at = now - Duration::days(45);
        fresh.created_at = now - Duration::days(3);
        let tag = ReviewCategoryRow {
            review_id: fresh.id,
            category_id: Uuid::new_v4(),
            name: "cleanliness".into(),
            rating: Some(9.0),
        };

        let metrics = property_metrics(&[fresh, stale], &[tag], now);
        assert_eq!(metrics.total_reviews, 2);
        assert_eq!(metrics.pending_reviews, 1);
        assert_eq!(metrics.recent_reviews, 1);
        assert_eq!(metrics.approval_rate, 50.0);
        assert_eq!(metrics.channel_stats.get("booking"), Some(&1));
        assert_eq!(metrics.category_stats.get("cleanliness"), Some(&1));
    }

    #[test]
    fn grouping_skips_unmatched() {
        let property = Uuid::new_v4();
        let mut matched = review("airbnb", 9.0, true);
        matched.property_id = Some(property);
        let unmatched = review("airbnb", 9.0, true);

        let grouped = group_by_property(vec![matched, unmatched]);
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[&property].len(), 1);
    }
}
