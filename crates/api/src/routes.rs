use std::sync::Arc;

use analytics::{group_by_property, property_metrics, rating_summary, review_stats, ReviewStats};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use db::models::{
    PropertyCreate, PropertySearch, PropertyUpdate, ReviewFilter, ReviewQuery, ReviewSort,
    SortOrder,
};
use db::Repositories;
use once_cell::sync::Lazy;
use prometheus::{register_int_gauge_vec, Encoder, IntGaugeVec};
use review_sync::{PreviewPage, ReviewSync, SyncStats, SyncSummary};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::dto::{
    reviews_with_categories, ListingDto, PropertyDetailDto, PropertyDto, PropertyPageDto,
    PropertyPerformanceDto, PropertySummaryDto, ReviewDto, ReviewPageDto,
};
use crate::error::{ApiError, ApiResult};

const DEFAULT_PAGE_LIMIT: i64 = 10;
const MAX_PAGE_LIMIT: i64 = 100;
const HOSTAWAY_SOURCE: &str = "hostaway";

#[derive(Clone)]
pub struct ApiState {
    pub repositories: Arc<dyn Repositories>,
    /// `None` when Hostaway credentials are absent; sync endpoints answer 503.
    pub sync: Option<Arc<ReviewSync>>,
    pub metrics_path: &'static str,
}

pub fn build_router(state: Arc<ApiState>) -> Router {
    let metrics_path: &'static str = state.metrics_path;
    Router::new()
        .route("/healthz", get(healthz))
        .route("/reviews", get(list_reviews))
        .route("/reviews/stats", get(reviews_stats))
        .route("/reviews/approval", post(bulk_update_approval))
        .route("/reviews/hostaway/preview", get(preview_hostaway))
        .route("/reviews/:id", get(get_review))
        .route("/reviews/:id/approval", patch(update_approval))
        .route("/properties", get(search_properties).post(create_property))
        .route("/properties/performance", get(properties_performance))
        .route(
            "/properties/:key",
            get(get_property)
                .patch(update_property)
                .delete(delete_property),
        )
        .route("/listings/:id/property", put(assign_listing_property))
        .route("/sync/hostaway", post(run_hostaway_sync))
        .route("/sync/hostaway/stats", get(hostaway_sync_stats))
        .route(metrics_path, get(metrics))
        .with_state(state)
}

static STORED_REVIEWS: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "db_reviews_total",
        "Number of stored reviews grouped by moderation state",
        &["state"]
    )
    .expect("stored reviews gauge")
});

static STORED_LISTINGS: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "db_listings_total",
        "Number of stored listings",
        &["source"]
    )
    .expect("stored listings gauge")
});

async fn refresh_storage_counts(repos: &dyn Repositories) -> Result<(), db::DbError> {
    let counts = repos.reviews().ingestion_counts(HOSTAWAY_SOURCE).await?;
    STORED_REVIEWS
        .with_label_values(&["approved"])
        .set(counts.approved_reviews);
    STORED_REVIEWS
        .with_label_values(&["pending"])
        .set(counts.total_reviews - counts.approved_reviews);
    STORED_LISTINGS
        .with_label_values(&[HOSTAWAY_SOURCE])
        .set(counts.total_listings);
    Ok(())
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewListQuery {
    property_id: Option<Uuid>,
    listing_id: Option<Uuid>,
    approved: Option<bool>,
    channel: Option<String>,
    rating_min: Option<f64>,
    rating_max: Option<f64>,
    category_id: Option<Uuid>,
    date_from: Option<String>,
    date_to: Option<String>,
    sort_by: Option<String>,
    sort_order: Option<String>,
    limit: Option<i64>,
    cursor: Option<String>,
}

#[instrument(skip(state))]
async fn list_reviews(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<ReviewListQuery>,
) -> ApiResult<Json<ReviewPageDto>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_LIMIT)
        .clamp(1, MAX_PAGE_LIMIT);
    let offset = parse_cursor(query.cursor.as_deref())?;
    let filter = ReviewFilter {
        property_id: query.property_id,
        listing_id: query.listing_id,
        approved: query.approved,
        channel: query.channel,
        rating_min: query.rating_min,
        rating_max: query.rating_max,
        category_id: query.category_id,
        date_from: parse_bound(query.date_from.as_deref(), Bound::Start)?,
        date_to: parse_bound(query.date_to.as_deref(), Bound::End)?,
    };

    let mut rows = state
        .repositories
        .reviews()
        .query(ReviewQuery {
            filter,
            sort_by: parse_sort(query.sort_by.as_deref())?,
            sort_order: parse_order(query.sort_order.as_deref())?,
            limit: limit + 1,
            offset,
        })
        .await?;

    let next_cursor = if rows.len() as i64 > limit {
        rows.truncate(limit as usize);
        Some((offset + limit).to_string())
    } else {
        None
    };

    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let categories = state.repositories.categories().list_for_reviews(&ids).await?;
    Ok(Json(ReviewPageDto {
        reviews: reviews_with_categories(rows, categories),
        next_cursor,
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsQuery {
    property_id: Option<Uuid>,
    listing_id: Option<Uuid>,
    date_from: Option<String>,
    date_to: Option<String>,
}

#[instrument(skip(state))]
async fn reviews_stats(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<StatsQuery>,
) -> ApiResult<Json<ReviewStats>> {
    let filter = ReviewFilter {
        property_id: query.property_id,
        listing_id: query.listing_id,
        date_from: parse_bound(query.date_from.as_deref(), Bound::Start)?,
        date_to: parse_bound(query.date_to.as_deref(), Bound::End)?,
        ..ReviewFilter::default()
    };
    Ok(Json(stats_for(state.repositories.as_ref(), filter).await?))
}

async fn stats_for(repos: &dyn Repositories, filter: ReviewFilter) -> ApiResult<ReviewStats> {
    let reviews = repos.reviews().list_matching(filter).await?;
    let ids: Vec<Uuid> = reviews.iter().map(|r| r.id).collect();
    let categories = repos.categories().list_for_reviews(&ids).await?;
    Ok(review_stats(&reviews, &categories))
}

#[instrument(skip(state))]
async fn get_review(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ReviewDto>> {
    let review = state
        .repositories
        .reviews()
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("review {id} not found")))?;
    let categories = state
        .repositories
        .categories()
        .list_for_reviews(&[review.id])
        .await?;
    let mut dto = reviews_with_categories(vec![review], categories);
    dto.pop()
        .map(Json)
        .ok_or_else(|| ApiError::Internal("review vanished while loading".into()))
}

#[derive(Debug, Deserialize)]
struct ApprovalRequest {
    approved: bool,
}

#[instrument(skip(state))]
async fn update_approval(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<ApprovalRequest>,
) -> ApiResult<Json<ReviewDto>> {
    let review = state
        .repositories
        .reviews()
        .set_approval(id, request.approved)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("review {id} not found")))?;
    info!(review_id = %id, approved = request.approved, "review approval updated");
    let categories = state
        .repositories
        .categories()
        .list_for_reviews(&[review.id])
        .await?;
    let mut dto = reviews_with_categories(vec![review], categories);
    dto.pop()
        .map(Json)
        .ok_or_else(|| ApiError::Internal("review vanished while loading".into()))
}

#[derive(Debug, Deserialize)]
struct BulkApprovalRequest {
    ids: Vec<Uuid>,
    approved: bool,
}

#[instrument(skip(state, request), fields(count = request.ids.len()))]
async fn bulk_update_approval(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<BulkApprovalRequest>,
) -> ApiResult<impl IntoResponse> {
    if request.ids.is_empty() {
        return Err(ApiError::bad_request("ids must not be empty"));
    }
    let updated = state
        .repositories
        .reviews()
        .bulk_set_approval(&request.ids, request.approved)
        .await?;
    Ok(Json(json!({ "updated": updated })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PropertySearchQuery {
    search: Option<String>,
    city: Option<String>,
    country: Option<String>,
    rating_min: Option<f64>,
    price_min: Option<f64>,
    price_max: Option<f64>,
    guests: Option<i32>,
    bedrooms: Option<i32>,
    bathrooms: Option<i32>,
    limit: Option<i64>,
    cursor: Option<String>,
}

#[instrument(skip(state))]
async fn search_properties(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<PropertySearchQuery>,
) -> ApiResult<Json<PropertyPageDto>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_LIMIT)
        .clamp(1, MAX_PAGE_LIMIT);
    let offset = parse_cursor(query.cursor.as_deref())?;
    let mut properties = state
        .repositories
        .properties()
        .search(PropertySearch {
            search: query.search,
            city: query.city,
            country: query.country,
            rating_min: query.rating_min,
            price_min: query.price_min,
            price_max: query.price_max,
            guests: query.guests,
            bedrooms: query.bedrooms,
            bathrooms: query.bathrooms,
            limit: limit + 1,
            offset,
        })
        .await?;

    let next_cursor = if properties.len() as i64 > limit {
        properties.truncate(limit as usize);
        Some((offset + limit).to_string())
    } else {
        None
    };

    let ids: Vec<Uuid> = properties.iter().map(|p| p.id).collect();
    let approved = state
        .repositories
        .reviews()
        .list_for_properties(&ids, true)
        .await?;
    let grouped = group_by_property(approved);

    let properties = properties
        .into_iter()
        .map(|property| {
            let rating = grouped
                .get(&property.id)
                .map(|reviews| rating_summary(reviews))
                .unwrap_or_default();
            PropertySummaryDto {
                property: PropertyDto::from(property),
                rating,
            }
        })
        .collect();

    Ok(Json(PropertyPageDto {
        properties,
        next_cursor,
    }))
}

#[instrument(skip(state))]
async fn get_property(
    State(state): State<Arc<ApiState>>,
    Path(slug): Path<String>,
) -> ApiResult<Json<PropertyDetailDto>> {
    let property = state
        .repositories
        .properties()
        .get_by_slug(&slug)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("property {slug} not found")))?;
    let reviews = state
        .repositories
        .reviews()
        .list_for_properties(&[property.id], true)
        .await?;
    let rating = rating_summary(&reviews);
    let ids: Vec<Uuid> = reviews.iter().map(|r| r.id).collect();
    let categories = state.repositories.categories().list_for_reviews(&ids).await?;

    Ok(Json(PropertyDetailDto {
        property: PropertyDto::from(property),
        rating,
        reviews: reviews_with_categories(reviews, categories),
    }))
}

#[instrument(skip(state, request), fields(slug = %request.slug))]
async fn create_property(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<PropertyCreate>,
) -> ApiResult<impl IntoResponse> {
    if request.slug.trim().is_empty() || request.name.trim().is_empty() {
        return Err(ApiError::bad_request("slug and name are required"));
    }
    let property = state.repositories.properties().create(request).await?;
    info!(property_id = %property.id, slug = %property.slug, "property created");
    Ok((StatusCode::CREATED, Json(PropertyDto::from(property))))
}

#[instrument(skip(state, request))]
async fn update_property(
    State(state): State<Arc<ApiState>>,
    Path(key): Path<String>,
    Json(request): Json<PropertyUpdate>,
) -> ApiResult<Json<PropertyDto>> {
    let id = parse_uuid(&key)?;
    let property = state
        .repositories
        .properties()
        .update(id, request)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("property {id} not found")))?;
    Ok(Json(PropertyDto::from(property)))
}

#[instrument(skip(state))]
async fn delete_property(
    State(state): State<Arc<ApiState>>,
    Path(key): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_uuid(&key)?;
    if state.repositories.properties().delete(id).await? {
        info!(property_id = %id, "property deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("property {id} not found")))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PerformanceQuery {
    property_id: Option<Uuid>,
    date_from: Option<String>,
    date_to: Option<String>,
}

#[instrument(skip(state))]
async fn properties_performance(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<PerformanceQuery>,
) -> ApiResult<impl IntoResponse> {
    let filter = ReviewFilter {
        property_id: query.property_id,
        date_from: parse_bound(query.date_from.as_deref(), Bound::Start)?,
        date_to: parse_bound(query.date_to.as_deref(), Bound::End)?,
        ..ReviewFilter::default()
    };
    let reviews = state.repositories.reviews().list_matching(filter).await?;
    let ids: Vec<Uuid> = reviews.iter().map(|r| r.id).collect();
    let categories = state.repositories.categories().list_for_reviews(&ids).await?;
    let summary = review_stats(&reviews, &categories);

    let properties: Vec<_> = match query.property_id {
        Some(id) => state
            .repositories
            .properties()
            .get(id)
            .await?
            .into_iter()
            .collect(),
        None => state.repositories.properties().list_all().await?,
    };
    let grouped = group_by_property(reviews);
    let now = Utc::now();
    let per_property: Vec<PropertyPerformanceDto> = properties
        .into_iter()
        .map(|property| {
            let reviews = grouped.get(&property.id).map(Vec::as_slice).unwrap_or(&[]);
            PropertyPerformanceDto {
                metrics: property_metrics(reviews, &categories, now),
                id: property.id,
                slug: property.slug,
                name: property.name,
            }
        })
        .collect();

    Ok(Json(json!({
        "summary": summary,
        "properties": per_property,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignPropertyRequest {
    property_id: Option<Uuid>,
}

#[instrument(skip(state))]
async fn assign_listing_property(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<AssignPropertyRequest>,
) -> ApiResult<Json<ListingDto>> {
    if let Some(property_id) = request.property_id {
        state
            .repositories
            .properties()
            .get(property_id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("property {property_id} not found")))?;
    }
    let listing = state
        .repositories
        .listings()
        .set_property(id, request.property_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("listing {id} not found")))?;
    info!(listing_id = %id, property_id = ?request.property_id, "listing mapping updated");
    Ok(Json(ListingDto::from(listing)))
}

fn sync_service(state: &ApiState) -> ApiResult<&ReviewSync> {
    state.sync.as_deref().ok_or_else(ApiError::sync_disabled)
}

#[instrument(skip(state))]
async fn run_hostaway_sync(State(state): State<Arc<ApiState>>) -> ApiResult<Json<SyncSummary>> {
    let summary = sync_service(&state)?.sync_all().await?;
    Ok(Json(summary))
}

#[instrument(skip(state))]
async fn hostaway_sync_stats(State(state): State<Arc<ApiState>>) -> ApiResult<Json<SyncStats>> {
    let stats = match state.sync.as_deref() {
        Some(sync) => sync.sync_stats().await?,
        None => SyncStats::from(
            state
                .repositories
                .reviews()
                .ingestion_counts(HOSTAWAY_SOURCE)
                .await?,
        ),
    };
    Ok(Json(stats))
}

#[derive(Debug, Default, Deserialize)]
struct PreviewQuery {
    limit: Option<u32>,
    offset: Option<u32>,
}

#[instrument(skip(state))]
async fn preview_hostaway(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<PreviewQuery>,
) -> ApiResult<Json<PreviewPage>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_LIMIT as u32)
        .clamp(1, MAX_PAGE_LIMIT as u32);
    let page = sync_service(&state)?
        .preview_page(limit, query.offset.unwrap_or(0))
        .await?;
    Ok(Json(page))
}

#[instrument(skip(state))]
async fn metrics(State(state): State<Arc<ApiState>>) -> ApiResult<impl IntoResponse> {
    // Best-effort: refresh counts before scraping metrics
    if let Err(err) = refresh_storage_counts(state.repositories.as_ref()).await {
        warn!(error = %err, "failed to refresh storage counts");
    }
    let encoder = prometheus::TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    let content_type = encoder.format_type().to_string();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    Ok((
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, content_type)],
        buffer,
    ))
}

fn parse_cursor(cursor: Option<&str>) -> ApiResult<i64> {
    match cursor {
        None => Ok(0),
        Some(raw) => raw
            .parse::<i64>()
            .ok()
            .filter(|offset| *offset >= 0)
            .ok_or_else(|| ApiError::bad_request("invalid cursor")),
    }
}

fn parse_uuid(value: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(value).map_err(|_| ApiError::bad_request(format!("invalid id: {value}")))
}

fn parse_sort(value: Option<&str>) -> ApiResult<ReviewSort> {
    match value {
        None | Some("createdAt") => Ok(ReviewSort::CreatedAt),
        Some("rating") => Ok(ReviewSort::Rating),
        Some("updatedAt") => Ok(ReviewSort::UpdatedAt),
        Some(other) => Err(ApiError::bad_request(format!("invalid sortBy: {other}"))),
    }
}

fn parse_order(value: Option<&str>) -> ApiResult<SortOrder> {
    match value.map(str::to_ascii_lowercase).as_deref() {
        None | Some("desc") => Ok(SortOrder::Desc),
        Some("asc") => Ok(SortOrder::Asc),
        Some(other) => Err(ApiError::bad_request(format!("invalid sortOrder: {other}"))),
    }
}

#[derive(Debug, Clone, Copy)]
enum Bound {
    Start,
    End,
}

/// Accepts RFC 3339 timestamps or plain dates; a plain end date covers the whole day.
fn parse_bound(value: Option<&str>, bound: Bound) -> ApiResult<Option<DateTime<Utc>>> {
    let Some(value) = value else {
        return Ok(None);
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }
    match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        Ok(date) => day_bound(date, bound).map(Some),
        Err(_) => Err(ApiError::bad_request(format!("invalid date: {value}"))),
    }
}

fn day_bound(date: NaiveDate, bound: Bound) -> ApiResult<DateTime<Utc>> {
    let start = date
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .ok_or_else(|| ApiError::bad_request(format!("invalid date: {date}")))?;
    match bound {
        Bound::Start => Ok(start),
        Bound::End => start
            .checked_add_signed(Duration::days(1) - Duration::milliseconds(1))
            .ok_or_else(|| ApiError::bad_request(format!("date out of range: {date}"))),
    }
}
