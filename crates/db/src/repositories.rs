use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::Result;
use crate::models::{
    CategoryRatingUpsert, CategoryRow, IngestionCounts, ListingCreate, ListingRow,
    PropertyCreate, PropertyRow, PropertySearch, PropertyUpdate, ReviewCategoryRow,
    ReviewFilter, ReviewQuery, ReviewRow, ReviewUpsert,
};

#[async_trait]
pub trait ReviewRepository: Send + Sync {
    /// Atomic insert-or-update on `(external_id, source)`; returns the durable row id.
    async fn upsert(&self, review: ReviewUpsert) -> Result<Uuid>;
    /// Upsert plus category attachment in one transaction; on failure neither is applied.
    async fn upsert_with_ratings(
        &self,
        review: ReviewUpsert,
        ratings: &[CategoryRatingUpsert],
    ) -> Result<Uuid>;
    async fn get(&self, id: Uuid) -> Result<Option<ReviewRow>>;
    async fn get_by_key(&self, external_id: &str, source: &str) -> Result<Option<ReviewRow>>;
    async fn query(&self, query: ReviewQuery) -> Result<Vec<ReviewRow>>;
    async fn list_matching(&self, filter: ReviewFilter) -> Result<Vec<ReviewRow>>;
    async fn list_for_properties(
        &self,
        property_ids: &[Uuid],
        approved_only: bool,
    ) -> Result<Vec<ReviewRow>>;
    async fn set_approval(&self, id: Uuid, approved: bool) -> Result<Option<ReviewRow>>;
    async fn bulk_set_approval(&self, ids: &[Uuid], approved: bool) -> Result<u64>;
    async fn ingestion_counts(&self, source: &str) -> Result<IngestionCounts>;
    async fn delete_unapproved_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
pub trait ListingRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<ListingRow>>;
    async fn get_by_external_id(&self, external_id: &str) -> Result<Option<ListingRow>>;
    /// Inserts unless a listing with the same external id exists; `None` means another
    /// writer got there first.
    async fn create_if_absent(&self, listing: ListingCreate) -> Result<Option<ListingRow>>;
    async fn set_property(
        &self,
        id: Uuid,
        property_id: Option<Uuid>,
    ) -> Result<Option<ListingRow>>;
}

#[async_trait]
pub trait PropertyRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<PropertyRow>>;
    async fn get_by_slug(&self, slug: &str) -> Result<Option<PropertyRow>>;
    async fn list_all(&self) -> Result<Vec<PropertyRow>>;
    async fn search(&self, search: PropertySearch) -> Result<Vec<PropertyRow>>;
    async fn create(&self, property: PropertyCreate) -> Result<PropertyRow>;
    async fn update(&self, id: Uuid, update: PropertyUpdate) -> Result<Option<PropertyRow>>;
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Upserts each category by name and records its rating against the review.
    /// Existing associations not named here are kept.
    async fn attach_ratings(&self, review_id: Uuid, ratings: &[CategoryRatingUpsert])
        -> Result<()>;
    async fn list(&self) -> Result<Vec<CategoryRow>>;
    async fn list_for_reviews(&self, review_ids: &[Uuid]) -> Result<Vec<ReviewCategoryRow>>;
}

pub trait Repositories: Send + Sync {
    fn reviews(&self) -> &dyn ReviewRepository;
    fn listings(&self) -> &dyn ListingRepository;
    fn properties(&self) -> &dyn PropertyRepository;
    fn categories(&self) -> &dyn CategoryRepository;
}
