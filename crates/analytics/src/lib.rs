//! Aggregations over stored reviews for the moderation dashboard and public pages.

pub mod property;
pub mod stats;

pub use property::{group_by_property, property_metrics, rating_summary, PropertyMetrics, RatingSummary};
pub use stats::{review_stats, CategoryBreakdown, ChannelBreakdown, ReviewStats};

pub(crate) fn mean(sum: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

pub(crate) fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}
