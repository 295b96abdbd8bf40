use std::collections::HashMap;

use analytics::{PropertyMetrics, RatingSummary};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use db::models::{ListingRow, PropertyRow, ReviewCategoryRow, ReviewRow};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDto {
    pub id: Uuid,
    pub name: String,
    pub rating: Option<f64>,
}

impl From<ReviewCategoryRow> for CategoryDto {
    fn from(row: ReviewCategoryRow) -> Self {
        Self {
            id: row.category_id,
            name: row.name,
            rating: row.rating,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewDto {
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
    pub updated_at: DateTime<Utc>,
    pub approved: bool,
    pub categories: Vec<CategoryDto>,
}

impl ReviewDto {
    pub fn from_row(row: ReviewRow, categories: Vec<CategoryDto>) -> Self {
        Self {
            id: row.id,
            source: row.source,
            external_id: row.external_id,
            listing_id: row.listing_id,
            property_id: row.property_id,
            review_type: row.review_type,
            channel: row.channel,
            rating: row.rating,
            title: row.title,
            body: row.body,
            author_name: row.author_name,
            language: row.language,
            created_at: row.created_at,
            updated_at: row.updated_at,
            approved: row.approved,
            categories,
        }
    }
}

/// Pairs each review with its categories, preserving review order.
pub fn reviews_with_categories(
    reviews: Vec<ReviewRow>,
    categories: Vec<ReviewCategoryRow>,
) -> Vec<ReviewDto> {
    let mut by_review: HashMap<Uuid, Vec<CategoryDto>> = HashMap::new();
    for row in categories {
        by_review
            .entry(row.review_id)
            .or_default()
            .push(CategoryDto::from(row));
    }
    reviews
        .into_iter()
        .map(|review| {
            let categories = by_review.remove(&review.id).unwrap_or_default();
            ReviewDto::from_row(review, categories)
        })
        .collect()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDto {
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

impl From<PropertyRow> for PropertyDto {
    fn from(row: PropertyRow) -> Self {
        Self {
            id: row.id,
            slug: row.slug,
            name: row.name,
            address: row.address,
            city: row.city,
            country: row.country,
            price: row.price,
            bedrooms: row.bedrooms,
            bathrooms: row.bathrooms,
            guests: row.guests,
            image: row.image,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertySummaryDto {
    #[serde(flatten)]
    pub property: PropertyDto,
    #[serde(flatten)]
    pub rating: RatingSummary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDetailDto {
    #[serde(flatten)]
    pub property: PropertyDto,
    #[serde(flatten)]
    pub rating: RatingSummary,
    pub reviews: Vec<ReviewDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyPerformanceDto {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub metrics: PropertyMetrics,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingDto {
    pub id: Uuid,
    pub external_id: String,
    pub name: String,
    pub channel: Option<String>,
    pub property_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<ListingRow> for ListingDto {
    fn from(row: ListingRow) -> Self {
        Self {
            id: row.id,
            external_id: row.external_id,
            name: row.name,
            channel: row.channel,
            property_id: row.property_id,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewPageDto {
    pub reviews: Vec<ReviewDto>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyPageDto {
    pub properties: Vec<PropertySummaryDto>,
    pub next_cursor: Option<String>,
}
