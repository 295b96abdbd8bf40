use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct ReviewRow {
    pub id: Uuid,
    pub source: String,
    pub external_id: String,
    pub listing_id: Uuid,
    pub property_id: Option<Uuid>,
    pub review_type: String,
    pub channel: String,
    pub rating: f64,
    pub title: Option<String>,
    pub body: String,
    pub author_name: Option<String>,
    pub language: String,
    pub created_at: DateTime<Utc>,
    pub approved: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct ListingRow {
    pub id: Uuid,
    pub external_id: String,
    pub name: String,
    pub channel: Option<String>,
    /// Manual listing-to-property mapping maintained by admins.
    pub property_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct PropertyRow {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub price: Option<f64>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<i32>,
    pub guests: Option<i32>,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct CategoryRow {
    pub id: Uuid,
    pub name: String,
}

/// A category attached to a review, with the sub-score recorded at ingestion if any.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct ReviewCategoryRow {
    pub review_id: Uuid,
    pub category_id: Uuid,
    pub name: String,
    pub rating: Option<f64>,
}

/// Mutable review fields written on every sync, keyed by `(external_id, source)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewUpsert {
    pub source: String,
    pub external_id: String,
    pub listing_id: Uuid,
    pub property_id: Option<Uuid>,
    pub review_type: String,
    pub channel: String,
    pub rating: f64,
    pub title: Option<String>,
    pub body: String,
    pub author_name: Option<String>,
    pub language: String,
    pub created_at: DateTime<Utc>,
    pub approved: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListingCreate {
    pub external_id: String,
    pub name: String,
    pub channel: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryRatingUpsert {
    pub name: String,
    pub rating: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PropertyCreate {
    pub slug: String,
    pub name: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub price: Option<f64>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<i32>,
    pub guests: Option<i32>,
    pub image: Option<String>,
}

/// Partial property update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PropertyUpdate {
    pub slug: Option<String>,
    pub name: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub price: Option<f64>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<i32>,
    pub guests: Option<i32>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReviewSort {
    #[default]
    CreatedAt,
    Rating,
    UpdatedAt,
}

impl ReviewSort {
    pub fn column(&self) -> &'static str {
        match self {
            ReviewSort::CreatedAt => "created_at",
            ReviewSort::Rating => "rating",
            ReviewSort::UpdatedAt => "updated_at",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Filters shared by the moderation listing and the statistics queries.
#[derive(Debug, Clone, Default)]
pub struct ReviewFilter {
    pub property_id: Option<Uuid>,
    pub listing_id: Option<Uuid>,
    pub approved: Option<bool>,
    pub channel: Option<String>,
    pub rating_min: Option<f64>,
    pub rating_max: Option<f64>,
    pub category_id: Option<Uuid>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct ReviewQuery {
    pub filter: ReviewFilter,
    pub sort_by: ReviewSort,
    pub sort_order: SortOrder,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Default)]
pub struct PropertySearch {
    pub search: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    /// Minimum average rating over approved reviews.
    pub rating_min: Option<f64>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub guests: Option<i32>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<i32>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestionCounts {
    pub total_reviews: i64,
    pub source_reviews: i64,
    pub approved_reviews: i64,
    pub total_listings: i64,
}
