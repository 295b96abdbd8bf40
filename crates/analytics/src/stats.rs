use std::collections::{BTreeMap, HashMap};

use db::{ReviewCategoryRow, ReviewRow};
use serde::Serialize;
use uuid::Uuid;

use crate::{mean, percentage};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelBreakdown {
    pub channel: String,
    pub count: usize,
    pub avg_rating: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryBreakdown {
    pub name: String,
    pub count: usize,
    /// Mean overall rating of the reviews tagged with this category.
    pub avg_rating: f64,
    /// Mean of the category's own sub-scores, when any were recorded.
    pub avg_category_rating: Option<f64>,
    /// Share of all reviews in scope that carry this category.
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewStats {
    pub total_reviews: usize,
    pub approved_reviews: usize,
    pub pending_reviews: usize,
    pub avg_rating: f64,
    pub approval_rate: f64,
    pub channel_breakdown: Vec<ChannelBreakdown>,
    pub category_breakdown: Vec<CategoryBreakdown>,
}

#[derive(Default)]
struct CategoryAcc {
    count: usize,
    rating_sum: f64,
    sub_score_sum: f64,
    sub_scores: usize,
}

/// Aggregates `reviews`; `categories` may include rows for reviews outside the set,
/// which are ignored.
pub fn review_stats(reviews: &[ReviewRow], categories: &[ReviewCategoryRow]) -> ReviewStats {
    let total = reviews.len();
    let approved = reviews.iter().filter(|r| r.approved).count();
    let rating_sum: f64 = reviews.iter().map(|r| r.rating).sum();

    let mut channels: BTreeMap<&str, (usize, f64)> = BTreeMap::new();
    for review in reviews {
        let entry = channels.entry(review.channel.as_str()).or_default();
        entry.0 += 1;
        entry.1 += review.rating;
    }

    let ratings: HashMap<Uuid, f64> = reviews.iter().map(|r| (r.id, r.rating)).collect();
    let mut by_category: BTreeMap<&str, CategoryAcc> = BTreeMap::new();
    for row in categories {
        let Some(review_rating) = ratings.get(&row.review_id) else {
            continue;
        };
        let acc = by_category.entry(row.name.as_str()).or_default();
        acc.count += 1;
        acc.rating_sum += review_rating;
        if let Some(sub_score) = row.rating {
            acc.sub_score_sum += sub_score;
            acc.sub_scores += 1;
        }
    }

    ReviewStats {
        total_reviews: total,
        approved_reviews: approved,
        pending_reviews: total - approved,
        avg_rating: mean(rating_sum, total),
        approval_rate: percentage(approved, total),
        channel_breakdown: channels
            .into_iter()
            .map(|(channel, (count, sum))| ChannelBreakdown {
                channel: channel.to_string(),
                count,
                avg_rating: mean(sum, count),
            })
            .collect(),
        category_breakdown: by_category
            .into_iter()
            .map(|(name, acc)| CategoryBreakdown {
                name: name.to_string(),
                count: acc.count,
                avg_rating: mean(acc.rating_sum, acc.count),
                avg_category_rating: (acc.sub_scores > 0)
                    .then(|| mean(acc.sub_score_sum, acc.sub_scores)),
                percentage: percentage(acc.count, total),
            })
            .collect(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    pub(crate) fn review(channel: &str, rating: f64, approved: bool) -> ReviewRow {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        ReviewRow {
            id: Uuid::new_v4(),
            source: "hostaway".into(),
            external_id: Uuid::new_v4().to_string(),
            listing_id: Uuid::new_v4(),
            property_id: None,
            review_type: "guest_to_host".into(),
            channel: channel.into(),
            rating,
            title: None,
            body: String::new(),
            author_name: None,
            language: "en".into(),
            created_at: at,
            approved,
            updated_at: at,
        }
    }

    fn tag(review: &ReviewRow, name: &str, rating: Option<f64>) -> ReviewCategoryRow {
        ReviewCategoryRow {
            review_id: review.id,
            category_id: Uuid::new_v4(),
            name: name.into(),
            rating,
        }
    }

    #[test]
    fn empty_input_yields_zeroes() {
        let stats = review_stats(&[], &[]);
        assert_eq!(stats.total_reviews, 0);
        assert_eq!(stats.avg_rating, 0.0);
        assert_eq!(stats.approval_rate, 0.0);
        assert!(stats.channel_breakdown.is_empty());
    }

    #[test]
    fn totals_and_channel_breakdown() {
        let reviews = vec![
            review("airbnb", 8.0, true),
            review("airbnb", 10.0, false),
            review("booking", 6.0, true),
            review("booking", 4.0, true),
        ];
        let stats = review_stats(&reviews, &[]);
        assert_eq!(stats.total_reviews, 4);
        assert_eq!(stats.approved_reviews, 3);
        assert_eq!(stats.pending_reviews, 1);
        assert_eq!(stats.avg_rating, 7.0);
        assert_eq!(stats.approval_rate, 75.0);
        assert_eq!(
            stats.channel_breakdown,
            vec![
                ChannelBreakdown {
                    channel: "airbnb".into(),
                    count: 2,
                    avg_rating: 9.0
                },
                ChannelBreakdown {
                    channel: "booking".into(),
                    count: 2,
                    avg_rating: 5.0
                },
            ]
        );
    }

    #[test]
    fn category_breakdown_uses_review_and_sub_scores() {
        let a = review("airbnb", 8.0, true);
        let b = review("airbnb", 6.0, true);
        let c = review("direct", 10.0, true);
        let outsider = review("direct", 1.0, true);
        let categories = vec![
            tag(&a, "cleanliness", Some(10.0)),
            tag(&b, "cleanliness", Some(6.0)),
            tag(&b, "location", None),
            tag(&outsider, "location", Some(1.0)),
        ];

        let stats = review_stats(&[a, b, c], &categories);
        let cleanliness = &stats.category_breakdown[0];
        assert_eq!(cleanliness.name, "cleanliness");
        assert_eq!(cleanliness.count, 2);
        assert_eq!(cleanliness.avg_rating, 7.0);
        assert_eq!(cleanliness.avg_category_rating, Some(8.0));
        assert!((cleanliness.percentage - 200.0 / 3.0).abs() < 1e-9);

        let location = &stats.category_breakdown[1];
        assert_eq!(location.count, 1);
        assert_eq!(location.avg_category_rating, None);
    }

    #[test]
    fn serializes_camel_case() {
        let value = serde_json::to_value(review_stats(&[], &[])).unwrap();
        assert!(value.get("approvalRate").is_some());
        assert!(value.get("channelBreakdown").is_some());
    }
}
