use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use db::errors::Result;
use db::{
    CategoryRatingUpsert, CategoryRepository, CategoryRow, DbError, IngestionCounts,
    ListingCreate, ListingRepository, ListingRow, PropertyCreate, PropertyRepository,
    PropertyRow, PropertySearch, PropertyUpdate, Repositories, ReviewCategoryRow, ReviewFilter,
    ReviewQuery, ReviewRepository, ReviewRow, ReviewSort, ReviewUpsert, SortOrder,
};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Clone, Default)]
struct State {
    reviews: Vec<ReviewRow>,
    listings: Vec<ListingRow>,
    properties: Vec<PropertyRow>,
    categories: Vec<CategoryRow>,
    review_categories: HashMap<(Uuid, Uuid), Option<f64>>,
    failing_upserts: HashSet<String>,
    failing_ratings: HashSet<String>,
}

/// In-process [`Repositories`] with the same key semantics as the Postgres schema.
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<State>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent review upsert with this external id fail.
    pub async fn fail_upserts_for(&self, external_id: &str) {
        self.state
            .lock()
            .await
            .failing_upserts
            .insert(external_id.to_string());
    }

    /// Makes category attachment fail for reviews with this external id.
    pub async fn fail_ratings_for(&self, external_id: &str) {
        self.state
            .lock()
            .await
            .failing_ratings
            .insert(external_id.to_string());
    }

    pub async fn review_count(&self) -> usize {
        self.state.lock().await.reviews.len()
    }

    pub async fn listing_count(&self) -> usize {
        self.state.lock().await.listings.len()
    }

    pub async fn insert_property(&self, slug: &str, name: &str) -> PropertyRow {
        let now = Utc::now();
        let row = PropertyRow {
            id: Uuid::new_v4(),
            slug: slug.to_string(),
            name: name.to_string(),
            address: None,
            city: None,
            country: None,
            price: None,
            bedrooms: None,
            bathrooms: None,
            guests: None,
            image: None,
            created_at: now,
            updated_at: now,
        };
        self.state.lock().await.properties.push(row.clone());
        row
    }
}

impl Repositories for MemoryDatabase {
    fn reviews(&self) -> &dyn ReviewRepository {
        self
    }

    fn listings(&self) -> &dyn ListingRepository {
        self
    }

    fn properties(&self) -> &dyn PropertyRepository {
        self
    }

    fn categories(&self) -> &dyn CategoryRepository {
        self
    }
}

fn matches_filter(state: &State, review: &ReviewRow, filter: &ReviewFilter) -> bool {
    if filter.property_id.is_some() && review.property_id != filter.property_id {
        return false;
    }
    if filter.listing_id.is_some_and(|id| review.listing_id != id) {
        return false;
    }
    if filter.approved.is_some_and(|approved| review.approved != approved) {
        return false;
    }
    if filter
        .channel
        .as_deref()
        .is_some_and(|channel| review.channel != channel)
    {
        return false;
    }
    if filter.rating_min.is_some_and(|min| review.rating < min) {
        return false;
    }
    if filter.rating_max.is_some_and(|max| review.rating > max) {
        return false;
    }
    if filter
        .category_id
        .is_some_and(|category| !state.review_categories.contains_key(&(review.id, category)))
    {
        return false;
    }
    if filter.date_from.is_some_and(|from| review.created_at < from) {
        return false;
    }
    if filter.date_to.is_some_and(|to| review.created_at > to) {
        return false;
    }
    true
}

fn apply_upsert(state: &mut State, review: ReviewUpsert) -> Result<Uuid> {
    if state.failing_upserts.contains(&review.external_id) {
        return Err(DbError::NotFound(format!(
            "listing {} vanished during upsert",
            review.listing_id
        )));
    }

    let now = Utc::now();
    if let Some(existing) = state
        .reviews
        .iter_mut()
        .find(|r| r.external_id == review.external_id && r.source == review.source)
    {
        existing.listing_id = review.listing_id;
        existing.property_id = review.property_id;
        existing.review_type = review.review_type;
        existing.channel = review.channel;
        existing.rating = review.rating;
        existing.title = review.title;
        existing.body = review.body;
        existing.author_name = review.author_name;
        existing.language = review.language;
        existing.created_at = review.created_at;
        existing.approved = review.approved;
        existing.updated_at = now;
        return Ok(existing.id);
    }

    let id = Uuid::new_v4();
    state.reviews.push(ReviewRow {
        id,
        source: review.source,
        external_id: review.external_id,
        listing_id: review.listing_id,
        property_id: review.property_id,
        review_type: review.review_type,
        channel: review.channel,
        rating: review.rating,
        title: review.title,
        body: review.body,
        author_name: review.author_name,
        language: review.language,
        created_at: review.created_at,
        approved: review.approved,
        updated_at: now,
    });
    Ok(id)
}

fn apply_ratings(
    state: &mut State,
    review_id: Uuid,
    ratings: &[CategoryRatingUpsert],
) -> Result<()> {
    let blocked = state
        .reviews
        .iter()
        .any(|r| r.id == review_id && state.failing_ratings.contains(&r.external_id));
    if blocked {
        return Err(DbError::NotFound(format!(
            "category attachment rejected for review {review_id}"
        )));
    }
    for rating in ratings {
        let existing = state
            .categories
            .iter()
            .find(|c| c.name == rating.name)
            .map(|c| c.id);
        let category_id = match existing {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4();
                state.categories.push(CategoryRow {
                    id,
                    name: rating.name.clone(),
                });
                id
            }
        };
        state
            .review_categories
            .insert((review_id, category_id), rating.rating);
    }
    Ok(())
}

fn contains_ci(value: Option<&str>, needle: &str) -> bool {
    value.is_some_and(|v| v.to_lowercase().contains(&needle.to_lowercase()))
}

#[async_trait]
impl ReviewRepository for MemoryDatabase {
    async fn upsert(&self, review: ReviewUpsert) -> Result<Uuid> {
        let mut state = self.state.lock().await;
        apply_upsert(&mut state, review)
    }

    async fn upsert_with_ratings(
        &self,
        review: ReviewUpsert,
        ratings: &[CategoryRatingUpsert],
    ) -> Result<Uuid> {
        let mut state = self.state.lock().await;
        let mut staged = state.clone();
        let id = apply_upsert(&mut staged, review)?;
        apply_ratings(&mut staged, id, ratings)?;
        *state = staged;
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<ReviewRow>> {
        let state = self.state.lock().await;
        Ok(state.reviews.iter().find(|r| r.id == id).cloned())
    }

    async fn get_by_key(&self, external_id: &str, source: &str) -> Result<Option<ReviewRow>> {
        let state = self.state.lock().await;
        Ok(state
            .reviews
            .iter()
            .find(|r| r.external_id == external_id && r.source == source)
            .cloned())
    }

    async fn query(&self, query: ReviewQuery) -> Result<Vec<ReviewRow>> {
        let state = self.state.lock().await;
        let mut rows: Vec<ReviewRow> = state
            .reviews
            .iter()
            .filter(|r| matches_filter(&state, r, &query.filter))
            .cloned()
            .collect();

        rows.sort_by(|a, b| {
            let ordering = match query.sort_by {
                ReviewSort::CreatedAt => a.created_at.cmp(&b.created_at),
                ReviewSort::Rating => a.rating.total_cmp(&b.rating),
                ReviewSort::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            };
            let ordering = match query.sort_order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            };
            ordering.then_with(|| a.id.cmp(&b.id))
        });

        Ok(rows
            .into_iter()
            .skip(query.offset.max(0) as usize)
            .take(query.limit.max(0) as usize)
            .collect())
    }

    async fn list_matching(&self, filter: ReviewFilter) -> Result<Vec<ReviewRow>> {
        let state = self.state.lock().await;
        let mut rows: Vec<ReviewRow> = state
            .reviews
            .iter()
            .filter(|r| matches_filter(&state, r, &filter))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn list_for_properties(
        &self,
        property_ids: &[Uuid],
        approved_only: bool,
    ) -> Result<Vec<ReviewRow>> {
        let state = self.state.lock().await;
        let mut rows: Vec<ReviewRow> = state
            .reviews
            .iter()
            .filter(|r| r.property_id.is_some_and(|id| property_ids.contains(&id)))
            .filter(|r| !approved_only || r.approved)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn set_approval(&self, id: Uuid, approved: bool) -> Result<Option<ReviewRow>> {
        let mut state = self.state.lock().await;
        Ok(state.reviews.iter_mut().find(|r| r.id == id).map(|row| {
            row.approved = approved;
            row.updated_at = Utc::now();
            row.clone()
        }))
    }

    async fn bulk_set_approval(&self, ids: &[Uuid], approved: bool) -> Result<u64> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let mut updated = 0;
        for row in state.reviews.iter_mut().filter(|r| ids.contains(&r.id)) {
            row.approved = approved;
            row.updated_at = now;
            updated += 1;
        }
        Ok(updated)
    }

    async fn ingestion_counts(&self, source: &str) -> Result<IngestionCounts> {
        let state = self.state.lock().await;
        Ok(IngestionCounts {
            total_reviews: state.reviews.len() as i64,
            source_reviews: state.reviews.iter().filter(|r| r.source == source).count() as i64,
            approved_reviews: state.reviews.iter().filter(|r| r.approved).count() as i64,
            total_listings: state.listings.len() as i64,
        })
    }

    async fn delete_unapproved_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.lock().await;
        let removed: HashSet<Uuid> = state
            .reviews
            .iter()
            .filter(|r| !r.approved && r.created_at < cutoff)
            .map(|r| r.id)
            .collect();
        state.reviews.retain(|r| !removed.contains(&r.id));
        state
            .review_categories
            .retain(|(review_id, _), _| !removed.contains(review_id));
        Ok(removed.len() as u64)
    }
}

#[async_trait]
impl ListingRepository for MemoryDatabase {
    async fn get(&self, id: Uuid) -> Result<Option<ListingRow>> {
        let state = self.state.lock().await;
        Ok(state.listings.iter().find(|l| l.id == id).cloned())
    }

    async fn get_by_external_id(&self, external_id: &str) -> Result<Option<ListingRow>> {
        let state = self.state.lock().await;
        Ok(state
            .listings
            .iter()
            .find(|l| l.external_id == external_id)
            .cloned())
    }

    async fn create_if_absent(&self, listing: ListingCreate) -> Result<Option<ListingRow>> {
        let mut state = self.state.lock().await;
        if state
            .listings
            .iter()
            .any(|l| l.external_id == listing.external_id)
        {
            return Ok(None);
        }
        let row = ListingRow {
            id: Uuid::new_v4(),
            external_id: listing.external_id,
            name: listing.name,
            channel: listing.channel,
            property_id: None,
            created_at: Utc::now(),
        };
        state.listings.push(row.clone());
        Ok(Some(row))
    }

    async fn set_property(
        &self,
        id: Uuid,
        property_id: Option<Uuid>,
    ) -> Result<Option<ListingRow>> {
        let mut state = self.state.lock().await;
        Ok(state.listings.iter_mut().find(|l| l.id == id).map(|row| {
            row.property_id = property_id;
            row.clone()
        }))
    }
}

#[async_trait]
impl PropertyRepository for MemoryDatabase {
    async fn get(&self, id: Uuid) -> Result<Option<PropertyRow>> {
        let state = self.state.lock().await;
        Ok(state.properties.iter().find(|p| p.id == id).cloned())
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<PropertyRow>> {
        let state = self.state.lock().await;
        Ok(state.properties.iter().find(|p| p.slug == slug).cloned())
    }

    async fn list_all(&self) -> Result<Vec<PropertyRow>> {
        let state = self.state.lock().await;
        let mut rows = state.properties.clone();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn search(&self, search: PropertySearch) -> Result<Vec<PropertyRow>> {
        let state = self.state.lock().await;
        let term = search
            .search
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());

        let mut rows: Vec<PropertyRow> = state
            .properties
            .iter()
            .filter(|p| {
                term.map_or(true, |t| {
                    contains_ci(Some(&p.name), t)
                        || contains_ci(p.address.as_deref(), t)
                        || contains_ci(p.city.as_deref(), t)
                })
            })
            .filter(|p| {
                search
                    .city
                    .as_deref()
                    .map_or(true, |c| contains_ci(p.city.as_deref(), c))
            })
            .filter(|p| {
                search
                    .country
                    .as_deref()
                    .map_or(true, |c| contains_ci(p.country.as_deref(), c))
            })
            .filter(|p| {
                search.rating_min.map_or(true, |min| {
                    let ratings: Vec<f64> = state
                        .reviews
                        .iter()
                        .filter(|r| r.approved && r.property_id == Some(p.id))
                        .map(|r| r.rating)
                        .collect();
                    !ratings.is_empty()
                        && ratings.iter().sum::<f64>() / ratings.len() as f64 >= min
                })
            })
            .filter(|p| search.price_min.map_or(true, |min| p.price.is_some_and(|v| v >= min)))
            .filter(|p| search.price_max.map_or(true, |max| p.price.is_some_and(|v| v <= max)))
            .filter(|p| search.guests.map_or(true, |min| p.guests.is_some_and(|v| v >= min)))
            .filter(|p| search.bedrooms.map_or(true, |min| p.bedrooms.is_some_and(|v| v >= min)))
            .filter(|p| {
                search
                    .bathrooms
                    .map_or(true, |min| p.bathrooms.is_some_and(|v| v >= min))
            })
            .cloned()
            .collect();

        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        Ok(rows
            .into_iter()
            .skip(search.offset.max(0) as usize)
            .take(search.limit.max(0) as usize)
            .collect())
    }

    async fn create(&self, property: PropertyCreate) -> Result<PropertyRow> {
        let mut state = self.state.lock().await;
        if state.properties.iter().any(|p| p.slug == property.slug) {
            return Err(DbError::Conflict(format!(
                "property slug {} already taken",
                property.slug
            )));
        }
        let now = Utc::now();
        let row = PropertyRow {
            id: Uuid::new_v4(),
            slug: property.slug,
            name: property.name,
            address: property.address,
            city: property.city,
            country: property.country,
            price: property.price,
            bedrooms: property.bedrooms,
            bathrooms: property.bathrooms,
            guests: property.guests,
            image: property.image,
            created_at: now,
            updated_at: now,
        };
        state.properties.push(row.clone());
        Ok(row)
    }

    async fn update(&self, id: Uuid, update: PropertyUpdate) -> Result<Option<PropertyRow>> {
        let mut state = self.state.lock().await;
        Ok(state.properties.iter_mut().find(|p| p.id == id).map(|row| {
            if let Some(slug) = update.slug {
                row.slug = slug;
            }
            if let Some(name) = update.name {
                row.name = name;
            }
            row.address = update.address.or(row.address.take());
            row.city = update.city.or(row.city.take());
            row.country = update.country.or(row.country.take());
            row.price = update.price.or(row.price);
            row.bedrooms = update.bedrooms.or(row.bedrooms);
            row.bathrooms = update.bathrooms.or(row.bathrooms);
            row.guests = update.guests.or(row.guests);
            row.image = update.image.or(row.image.take());
            row.updated_at = Utc::now();
            row.clone()
        }))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut state = self.state.lock().await;
        let before = state.properties.len();
        state.properties.retain(|p| p.id != id);
        if state.properties.len() == before {
            return Ok(false);
        }
        for review in state.reviews.iter_mut().filter(|r| r.property_id == Some(id)) {
            review.property_id = None;
        }
        for listing in state.listings.iter_mut().filter(|l| l.property_id == Some(id)) {
            listing.property_id = None;
        }
        Ok(true)
    }
}

#[async_trait]
impl CategoryRepository for MemoryDatabase {
    async fn attach_ratings(
        &self,
        review_id: Uuid,
        ratings: &[CategoryRatingUpsert],
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        apply_ratings(&mut state, review_id, ratings)
    }

    async fn list(&self) -> Result<Vec<CategoryRow>> {
        let state = self.state.lock().await;
        let mut rows = state.categories.clone();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn list_for_reviews(&self, review_ids: &[Uuid]) -> Result<Vec<ReviewCategoryRow>> {
        let state = self.state.lock().await;
        let mut rows: Vec<ReviewCategoryRow> = state
            .review_categories
            .iter()
            .filter(|((review_id, _), _)| review_ids.contains(review_id))
            .filter_map(|((review_id, category_id), rating)| {
                state
                    .categories
                    .iter()
                    .find(|c| c.id == *category_id)
                    .map(|category| ReviewCategoryRow {
                        review_id: *review_id,
                        category_id: *category_id,
                        name: category.name.clone(),
                        rating: *rating,
                    })
            })
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upsert(external_id: &str, listing_id: Uuid, rating: f64) -> ReviewUpsert {
        ReviewUpsert {
            source: "hostaway".into(),
            external_id: external_id.into(),
            listing_id,
            property_id: None,
            review_type: "guest_to_host".into(),
            channel: "airbnb".into(),
            rating,
            title: None,
            body: "ok".into(),
            author_name: None,
            language: "en".into(),
            created_at: Utc::now(),
            approved: false,
        }
    }

    #[tokio::test]
    async fn upsert_keeps_one_row_per_key() {
        let db = MemoryDatabase::new();
        let listing = Uuid::new_v4();
        let first = db.reviews().upsert(upsert("1", listing, 5.0)).await.unwrap();
        let second = db.reviews().upsert(upsert("1", listing, 7.0)).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(db.review_count().await, 1);
        let row = db.reviews().get(first).await.unwrap().unwrap();
        assert_eq!(row.rating, 7.0);
    }

    #[tokio::test]
    async fn failed_rating_attach_rolls_back_upsert() {
        let db = MemoryDatabase::new();
        let listing = Uuid::new_v4();
        let ratings = [CategoryRatingUpsert {
            name: "cleanliness".into(),
            rating: Some(8.0),
        }];
        let id = db
            .reviews()
            .upsert_with_ratings(upsert("1", listing, 5.0), &ratings)
            .await
            .unwrap();

        db.fail_ratings_for("1").await;
        let changed = [CategoryRatingUpsert {
            name: "cleanliness".into(),
            rating: Some(2.0),
        }];
        assert!(db
            .reviews()
            .upsert_with_ratings(upsert("1", listing, 9.0), &changed)
            .await
            .is_err());

        let row = db.reviews().get(id).await.unwrap().unwrap();
        assert_eq!(row.rating, 5.0);
        let categories = db.categories().list_for_reviews(&[id]).await.unwrap();
        assert_eq!(categories[0].rating, Some(8.0));
    }

    #[tokio::test]
    async fn create_if_absent_is_first_writer_wins() {
        let db = MemoryDatabase::new();
        let create = || ListingCreate {
            external_id: "L1".into(),
            name: "Hostaway Listing L1".into(),
            channel: None,
        };
        assert!(db.listings().create_if_absent(create()).await.unwrap().is_some());
        assert!(db.listings().create_if_absent(create()).await.unwrap().is_none());
        assert_eq!(db.listing_count().await, 1);
    }
}
