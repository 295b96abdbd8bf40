use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgConnection, PgPool, Postgres, QueryBuilder};
use tokio::time::{sleep, Duration};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::errors::{DbError, Result};
use crate::models::{
    CategoryRatingUpsert, CategoryRow, IngestionCounts, ListingCreate, ListingRow,
    PropertyCreate, PropertyRow, PropertySearch, PropertyUpdate, ReviewCategoryRow,
    ReviewFilter, ReviewQuery, ReviewRow, ReviewUpsert,
};
use crate::repositories::{
    CategoryRepository, ListingRepository, PropertyRepository, Repositories, ReviewRepository,
};

const REVIEW_COLUMNS: &str = "id, source, external_id, listing_id, property_id, review_type, \
     channel, rating, title, body, author_name, language, created_at, approved, updated_at";

const LISTING_COLUMNS: &str = "id, external_id, name, channel, property_id, created_at";

const PROPERTY_COLUMNS: &str = "id, slug, name, address, city, country, price, bedrooms, \
     bathrooms, guests, image, created_at, updated_at";

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .map_err(DbError::Migration)
}

#[derive(Clone)]
pub struct PgDatabase {
    pool: PgPool,
    review_repo: Arc<PgReviewRepository>,
    listing_repo: Arc<PgListingRepository>,
    property_repo: Arc<PgPropertyRepository>,
    category_repo: Arc<PgCategoryRepository>,
}

impl PgDatabase {
    pub async fn connect(database_url: &str) -> Result<Self> {
        const MAX_ATTEMPTS: u32 = 5;
        const BASE_DELAY_MS: u64 = 500;

        let mut attempts = 0;
        loop {
            match PgPoolOptions::new()
                .max_connections(10)
                .connect(database_url)
                .await
            {
                Ok(pool) => {
                    run_migrations(&pool).await?;
                    return Ok(Self::from_pool(pool));
                }
                Err(err) => {
                    attempts += 1;
                    if attempts >= MAX_ATTEMPTS {
                        return Err(DbError::Query(err));
                    }

                    let exp = (attempts - 1).min(5);
                    let backoff = Duration::from_millis(BASE_DELAY_MS * (1u64 << exp));
                    warn!(
                        attempts,
                        error = %err,
                        wait_ms = backoff.as_millis(),
                        "database connection failed; retrying"
                    );
                    sleep(backoff).await;
                }
            }
        }
    }

    pub fn from_pool(pool: PgPool) -> Self {
        let review_repo = Arc::new(PgReviewRepository { pool: pool.clone() });
        let listing_repo = Arc::new(PgListingRepository { pool: pool.clone() });
        let property_repo = Arc::new(PgPropertyRepository { pool: pool.clone() });
        let category_repo = Arc::new(PgCategoryRepository { pool: pool.clone() });

        Self {
            pool,
            review_repo,
            listing_repo,
            property_repo,
            category_repo,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl Repositories for PgDatabase {
    fn reviews(&self) -> &dyn ReviewRepository {
        &*self.review_repo
    }

    fn listings(&self) -> &dyn ListingRepository {
        &*self.listing_repo
    }

    fn properties(&self) -> &dyn PropertyRepository {
        &*self.property_repo
    }

    fn categories(&self) -> &dyn CategoryRepository {
        &*self.category_repo
    }
}

fn push_condition(builder: &mut QueryBuilder<'_, Postgres>, has_where: &mut bool) {
    builder.push(if *has_where { " AND " } else { " WHERE " });
    *has_where = true;
}

fn push_review_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: ReviewFilter) {
    let mut has_where = false;

    if let Some(property_id) = filter.property_id {
        push_condition(builder, &mut has_where);
        builder.push("property_id = ");
        builder.push_bind(property_id);
    }
    if let Some(listing_id) = filter.listing_id {
        push_condition(builder, &mut has_where);
        builder.push("listing_id = ");
        builder.push_bind(listing_id);
    }
    if let Some(approved) = filter.approved {
        push_condition(builder, &mut has_where);
        builder.push("approved = ");
        builder.push_bind(approved);
    }
    if let Some(channel) = filter.channel {
        push_condition(builder, &mut has_where);
        builder.push("channel = ");
        builder.push_bind(channel);
    }
    if let Some(min) = filter.rating_min {
        push_condition(builder, &mut has_where);
        builder.push("rating >= ");
        builder.push_bind(min);
    }
    if let Some(max) = filter.rating_max {
        push_condition(builder, &mut has_where);
        builder.push("rating <= ");
        builder.push_bind(max);
    }
    if let Some(category_id) = filter.category_id {
        push_condition(builder, &mut has_where);
        builder.push(
            "EXISTS (SELECT 1 FROM review_categories rc WHERE rc.review_id = reviews.id AND rc.category_id = ",
        );
        builder.push_bind(category_id);
        builder.push(")");
    }
    if let Some(from) = filter.date_from {
        push_condition(builder, &mut has_where);
        builder.push("created_at >= ");
        builder.push_bind(from);
    }
    if let Some(to) = filter.date_to {
        push_condition(builder, &mut has_where);
        builder.push("created_at <= ");
        builder.push_bind(to);
    }
}

async fn upsert_review(conn: &mut PgConnection, review: ReviewUpsert) -> Result<Uuid> {
    sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO reviews (
            id, source, external_id, listing_id, property_id, review_type, channel,
            rating, title, body, author_name, language, created_at, approved, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, now())
        ON CONFLICT (external_id, source) DO UPDATE
            SET listing_id = EXCLUDED.listing_id,
                property_id = EXCLUDED.property_id,
                review_type = EXCLUDED.review_type,
                channel = EXCLUDED.channel,
                rating = EXCLUDED.rating,
                title = EXCLUDED.title,
                body = EXCLUDED.body,
                author_name = EXCLUDED.author_name,
                language = EXCLUDED.language,
                created_at = EXCLUDED.created_at,
                approved = EXCLUDED.approved,
                updated_at = now()
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(review.source)
    .bind(review.external_id)
    .bind(review.listing_id)
    .bind(review.property_id)
    .bind(review.review_type)
    .bind(review.channel)
    .bind(review.rating)
    .bind(review.title)
    .bind(review.body)
    .bind(review.author_name)
    .bind(review.language)
    .bind(review.created_at)
    .bind(review.approved)
    .fetch_one(&mut *conn)
    .await
    .map_err(DbError::Query)
}

/// Upserts each category by name and its rating against the review.
async fn attach_category_ratings(
    conn: &mut PgConnection,
    review_id: Uuid,
    ratings: &[CategoryRatingUpsert],
) -> Result<()> {
    for rating in ratings {
        let category_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO categories (id, name)
            VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE
                SET name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&rating.name)
        .fetch_one(&mut *conn)
        .await
        .map_err(DbError::Query)?;

        sqlx::query(
            r#"
            INSERT INTO review_categories (review_id, category_id, rating)
            VALUES ($1, $2, $3)
            ON CONFLICT (review_id, category_id) DO UPDATE
                SET rating = EXCLUDED.rating
            "#,
        )
        .bind(review_id)
        .bind(category_id)
        .bind(rating.rating)
        .execute(&mut *conn)
        .await
        .map_err(DbError::Query)?;
    }
    Ok(())
}

#[derive(Clone)]
struct PgReviewRepository {
    pool: PgPool,
}

#[async_trait]
impl ReviewRepository for PgReviewRepository {
    #[instrument(skip(self, review), fields(external_id = %review.external_id, source = %review.source))]
    async fn upsert(&self, review: ReviewUpsert) -> Result<Uuid> {
        let mut conn = self.pool.acquire().await.map_err(DbError::Query)?;
        upsert_review(&mut conn, review).await
    }

    #[instrument(
        skip(self, review, ratings),
        fields(external_id = %review.external_id, source = %review.source, count = ratings.len())
    )]
    async fn upsert_with_ratings(
        &self,
        review: ReviewUpsert,
        ratings: &[CategoryRatingUpsert],
    ) -> Result<Uuid> {
        let mut tx = self.pool.begin().await.map_err(DbError::Query)?;
        let review_id = upsert_review(&mut tx, review).await?;
        attach_category_ratings(&mut tx, review_id, ratings).await?;
        tx.commit().await.map_err(DbError::Query)?;
        Ok(review_id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<ReviewRow>> {
        let sql = format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = $1");
        sqlx::query_as::<_, ReviewRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    async fn get_by_key(&self, external_id: &str, source: &str) -> Result<Option<ReviewRow>> {
        let sql = format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE external_id = $1 AND source = $2"
        );
        sqlx::query_as::<_, ReviewRow>(&sql)
            .bind(external_id)
            .bind(source)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    #[instrument(skip(self, query))]
    async fn query(&self, query: ReviewQuery) -> Result<Vec<ReviewRow>> {
        let mut builder =
            QueryBuilder::<Postgres>::new(format!("SELECT {REVIEW_COLUMNS} FROM reviews"));
        push_review_filter(&mut builder, query.filter);

        builder.push(" ORDER BY ");
        builder.push(query.sort_by.column());
        builder.push(" ");
        builder.push(query.sort_order.keyword());
        builder.push(", id ");
        builder.push(" LIMIT ");
        builder.push_bind(query.limit);
        builder.push(" OFFSET ");
        builder.push_bind(query.offset);

        builder
            .build_query_as::<ReviewRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    async fn list_matching(&self, filter: ReviewFilter) -> Result<Vec<ReviewRow>> {
        let mut builder =
            QueryBuilder::<Postgres>::new(format!("SELECT {REVIEW_COLUMNS} FROM reviews"));
        push_review_filter(&mut builder, filter);
        builder.push(" ORDER BY created_at DESC, id");

        builder
            .build_query_as::<ReviewRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    async fn list_for_properties(
        &self,
        property_ids: &[Uuid],
        approved_only: bool,
    ) -> Result<Vec<ReviewRow>> {
        if property_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            r#"
            SELECT {REVIEW_COLUMNS}
            FROM reviews
            WHERE property_id = ANY($1) AND ($2 = FALSE OR approved)
            ORDER BY created_at DESC, id
            "#
        );
        sqlx::query_as::<_, ReviewRow>(&sql)
            .bind(property_ids.to_vec())
            .bind(approved_only)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    #[instrument(skip(self))]
    async fn set_approval(&self, id: Uuid, approved: bool) -> Result<Option<ReviewRow>> {
        let sql = format!(
            r#"
            UPDATE reviews
            SET approved = $2,
                updated_at = now()
            WHERE id = $1
            RETURNING {REVIEW_COLUMNS}
            "#
        );
        sqlx::query_as::<_, ReviewRow>(&sql)
            .bind(id)
            .bind(approved)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn bulk_set_approval(&self, ids: &[Uuid], approved: bool) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        sqlx::query(
            r#"
            UPDATE reviews
            SET approved = $1,
                updated_at = now()
            WHERE id = ANY($2)
            "#,
        )
        .bind(approved)
        .bind(ids.to_vec())
        .execute(&self.pool)
        .await
        .map(|done| done.rows_affected())
        .map_err(DbError::Query)
    }

    async fn ingestion_counts(&self, source: &str) -> Result<IngestionCounts> {
        let (total_reviews, source_reviews, approved_reviews, total_listings) =
            sqlx::query_as::<_, (i64, i64, i64, i64)>(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM reviews),
                    (SELECT COUNT(*) FROM reviews WHERE source = $1),
                    (SELECT COUNT(*) FROM reviews WHERE approved),
                    (SELECT COUNT(*) FROM listings)
                "#,
            )
            .bind(source)
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::Query)?;

        Ok(IngestionCounts {
            total_reviews,
            source_reviews,
            approved_reviews,
            total_listings,
        })
    }

    #[instrument(skip(self))]
    async fn delete_unapproved_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        sqlx::query("DELETE FROM reviews WHERE created_at < $1 AND approved = FALSE")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map(|done| done.rows_affected())
            .map_err(DbError::Query)
    }
}

#[derive(Clone)]
struct PgListingRepository {
    pool: PgPool,
}

#[async_trait]
impl ListingRepository for PgListingRepository {
    async fn get(&self, id: Uuid) -> Result<Option<ListingRow>> {
        let sql = format!("SELECT {LISTING_COLUMNS} FROM listings WHERE id = $1");
        sqlx::query_as::<_, ListingRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    async fn get_by_external_id(&self, external_id: &str) -> Result<Option<ListingRow>> {
        let sql = format!("SELECT {LISTING_COLUMNS} FROM listings WHERE external_id = $1");
        sqlx::query_as::<_, ListingRow>(&sql)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    #[instrument(skip(self, listing), fields(external_id = %listing.external_id))]
    async fn create_if_absent(&self, listing: ListingCreate) -> Result<Option<ListingRow>> {
        let sql = format!(
            r#"
            INSERT INTO listings (id, external_id, name, channel)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (external_id) DO NOTHING
            RETURNING {LISTING_COLUMNS}
            "#
        );
        sqlx::query_as::<_, ListingRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(listing.external_id)
            .bind(listing.name)
            .bind(listing.channel)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    async fn set_property(
        &self,
        id: Uuid,
        property_id: Option<Uuid>,
    ) -> Result<Option<ListingRow>> {
        let sql = format!(
            "UPDATE listings SET property_id = $2 WHERE id = $1 RETURNING {LISTING_COLUMNS}"
        );
        sqlx::query_as::<_, ListingRow>(&sql)
            .bind(id)
            .bind(property_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::Query)
    }
}

#[derive(Clone)]
struct PgPropertyRepository {
    pool: PgPool,
}

#[async_trait]
impl PropertyRepository for PgPropertyRepository {
    async fn get(&self, id: Uuid) -> Result<Option<PropertyRow>> {
        let sql = format!("SELECT {PROPERTY_COLUMNS} FROM properties WHERE id = $1");
        sqlx::query_as::<_, PropertyRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<PropertyRow>> {
        let sql = format!("SELECT {PROPERTY_COLUMNS} FROM properties WHERE slug = $1");
        sqlx::query_as::<_, PropertyRow>(&sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    async fn list_all(&self) -> Result<Vec<PropertyRow>> {
        let sql = format!("SELECT {PROPERTY_COLUMNS} FROM properties ORDER BY name, id");
        sqlx::query_as::<_, PropertyRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    #[instrument(skip(self, search))]
    async fn search(&self, search: PropertySearch) -> Result<Vec<PropertyRow>> {
        let mut builder =
            QueryBuilder::<Postgres>::new(format!("SELECT {PROPERTY_COLUMNS} FROM properties p"));
        let mut has_where = false;

        if let Some(term) = search.search.filter(|t| !t.trim().is_empty()) {
            let pattern = format!("%{}%", term.trim());
            push_condition(&mut builder, &mut has_where);
            builder.push("(p.name ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR p.address ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR p.city ILIKE ");
            builder.push_bind(pattern);
            builder.push(")");
        }
        if let Some(city) = search.city {
            push_condition(&mut builder, &mut has_where);
            builder.push("p.city ILIKE ");
            builder.push_bind(format!("%{city}%"));
        }
        if let Some(country) = search.country {
            push_condition(&mut builder, &mut has_where);
            builder.push("p.country ILIKE ");
            builder.push_bind(format!("%{country}%"));
        }
        if let Some(min) = search.rating_min {
            push_condition(&mut builder, &mut has_where);
            builder.push(
                "(SELECT AVG(r.rating) FROM reviews r WHERE r.property_id = p.id AND r.approved) >= ",
            );
            builder.push_bind(min);
        }
        if let Some(min) = search.price_min {
            push_condition(&mut builder, &mut has_where);
            builder.push("p.price >= ");
            builder.push_bind(min);
        }
        if let Some(max) = search.price_max {
            push_condition(&mut builder, &mut has_where);
            builder.push("p.price <= ");
            builder.push_bind(max);
        }
        if let Some(guests) = search.guests {
            push_condition(&mut builder, &mut has_where);
            builder.push("p.guests >= ");
            builder.push_bind(guests);
        }
        if let Some(bedrooms) = search.bedrooms {
            push_condition(&mut builder, &mut has_where);
            builder.push("p.bedrooms >= ");
            builder.push_bind(bedrooms);
        }
        if let Some(bathrooms) = search.bathrooms {
            push_condition(&mut builder, &mut has_where);
            builder.push("p.bathrooms >= ");
            builder.push_bind(bathrooms);
        }

        builder.push(" ORDER BY p.updated_at DESC, p.id LIMIT ");
        builder.push_bind(search.limit);
        builder.push(" OFFSET ");
        builder.push_bind(search.offset);

        builder
            .build_query_as::<PropertyRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    #[instrument(skip(self, property), fields(slug = %property.slug))]
    async fn create(&self, property: PropertyCreate) -> Result<PropertyRow> {
        let sql = format!(
            r#"
            INSERT INTO properties (
                id, slug, name, address, city, country, price, bedrooms, bathrooms, guests, image
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {PROPERTY_COLUMNS}
            "#
        );
        sqlx::query_as::<_, PropertyRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(property.slug)
            .bind(property.name)
            .bind(property.address)
            .bind(property.city)
            .bind(property.country)
            .bind(property.price)
            .bind(property.bedrooms)
            .bind(property.bathrooms)
            .bind(property.guests)
            .bind(property.image)
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    async fn update(&self, id: Uuid, update: PropertyUpdate) -> Result<Option<PropertyRow>> {
        let sql = format!(
            r#"
            UPDATE properties
            SET slug = COALESCE($2, slug),
                name = COALESCE($3, name),
                address = COALESCE($4, address),
                city = COALESCE($5, city),
                country = COALESCE($6, country),
                price = COALESCE($7, price),
                bedrooms = COALESCE($8, bedrooms),
                bathrooms = COALESCE($9, bathrooms),
                guests = COALESCE($10, guests),
                image = COALESCE($11, image),
                updated_at = now()
            WHERE id = $1
            RETURNING {PROPERTY_COLUMNS}
            "#
        );
        sqlx::query_as::<_, PropertyRow>(&sql)
            .bind(id)
            .bind(update.slug)
            .bind(update.name)
            .bind(update.address)
            .bind(update.city)
            .bind(update.country)
            .bind(update.price)
            .bind(update.bedrooms)
            .bind(update.bathrooms)
            .bind(update.guests)
            .bind(update.image)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        sqlx::query("DELETE FROM properties WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map(|done| done.rows_affected() > 0)
            .map_err(DbError::Query)
    }
}

#[derive(Clone)]
struct PgCategoryRepository {
    pool: PgPool,
}

#[async_trait]
impl CategoryRepository for PgCategoryRepository {
    #[instrument(skip(self, ratings), fields(count = ratings.len()))]
    async fn attach_ratings(
        &self,
        review_id: Uuid,
        ratings: &[CategoryRatingUpsert],
    ) -> Result<()> {
        if ratings.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(DbError::Query)?;
        attach_category_ratings(&mut tx, review_id, ratings).await?;
        tx.commit().await.map_err(DbError::Query)
    }

    async fn list(&self) -> Result<Vec<CategoryRow>> {
        sqlx::query_as::<_, CategoryRow>("SELECT id, name FROM categories ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    async fn list_for_reviews(&self, review_ids: &[Uuid]) -> Result<Vec<ReviewCategoryRow>> {
        if review_ids.is_empty() {
            return Ok(Vec::new());
        }
        sqlx::query_as::<_, ReviewCategoryRow>(
            r#"
            SELECT rc.review_id, rc.category_id, c.name, rc.rating
            FROM review_categories rc
            JOIN categories c ON c.id = rc.category_id
            WHERE rc.review_id = ANY($1)
            ORDER BY c.name
            "#,
        )
        .bind(review_ids.to_vec())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)
    }
}
