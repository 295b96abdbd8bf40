use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use common::config::SyncConfig;
use db::Repositories;
use db_test_fixture::MemoryDatabase;
use hostaway::{HostawayError, ReviewFeed, ReviewsPage};
use review_sync::{CatalogMatcher, ReviewSync};
use serde_json::{json, Value};
use tower::util::ServiceExt;

use api::{build_router, ApiState};

struct StubFeed {
    records: Vec<Value>,
    failing: bool,
}

#[async_trait]
impl ReviewFeed for StubFeed {
    async fn fetch_reviews(&self, limit: u32, offset: u32) -> Result<ReviewsPage, HostawayError> {
        if self.failing {
            return Err(HostawayError::Transport("connection reset".into()));
        }
        let result: Vec<Value> = self
            .records
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok(ReviewsPage {
            status: Some("success".into()),
            result,
            total_count: Some(self.records.len() as u64),
            limit: Some(limit.into()),
            offset: Some(offset.into()),
        })
    }
}

fn record(id: i64, submitted_at: &str) -> Value {
    json!({
        "id": id,
        "type": "guest-to-host",
        "status": "published",
        "rating": null,
        "publicReview": "Great location and spotless.",
        "reviewCategory": [
            {"category": "cleanliness", "rating": 8},
            {"category": "location", "rating": 10}
        ],
        "submittedAt": submitted_at,
        "guestName": "Sam",
        "listingName": "2B N1 A - 29 Shoreditch Heights"
    })
}

fn sync_for(db: &MemoryDatabase, records: Vec<Value>) -> Arc<ReviewSync> {
    sync_with(db, StubFeed { records, failing: false })
}

fn sync_with(db: &MemoryDatabase, feed: StubFeed) -> Arc<ReviewSync> {
    let repos: Arc<dyn Repositories> = Arc::new(db.clone());
    Arc::new(ReviewSync::new(
        SyncConfig::default(),
        Arc::new(feed),
        repos.clone(),
        Arc::new(CatalogMatcher::new(repos)),
    ))
}

fn app(db: &MemoryDatabase, sync: Option<Arc<ReviewSync>>) -> Router {
    build_router(Arc::new(ApiState {
        repositories: Arc::new(db.clone()),
        sync,
        metrics_path: "/metrics",
    }))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn synced_app() -> (MemoryDatabase, Router) {
    let db = MemoryDatabase::new();
    db.insert_property("shoreditch-heights", "Shoreditch Heights")
        .await;
    let sync = sync_for(
        &db,
        vec![
            record(1, "2024-01-10 09:00:00"),
            record(2, "2024-02-10 09:00:00"),
            record(3, "2024-03-10 09:00:00"),
        ],
    );
    let app = app(&db, Some(sync));
    let (status, summary) = send(&app, Method::POST, "/sync/hostaway", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["syncedCount"], 3);
    (db, app)
}

#[tokio::test]
async fn healthz_ok() {
    let app = app(&MemoryDatabase::new(), None);
    let (status, body) = send(&app, Method::GET, "/healthz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn sync_without_credentials_is_unavailable() {
    let app = app(&MemoryDatabase::new(), None);
    let (status, body) = send(&app, Method::POST, "/sync/hostaway", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "Hostaway integration is not configured");

    let (status, _) = send(&app, Method::GET, "/reviews/hostaway/preview", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, stats) = send(&app, Method::GET, "/sync/hostaway/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["totalReviews"], 0);
}

#[tokio::test]
async fn sync_fetch_failure_is_bad_gateway() {
    let db = MemoryDatabase::new();
    let feed = StubFeed {
        records: vec![record(1, "2024-01-10 09:00:00")],
        failing: true,
    };
    let app = app(&db, Some(sync_with(&db, feed)));

    let (status, body) = send(&app, Method::POST, "/sync/hostaway", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let fields = body.as_object().unwrap();
    assert_eq!(fields.len(), 1);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("failed to fetch reviews:"));
    assert_eq!(db.review_count().await, 0);
}

#[tokio::test]
async fn malformed_date_is_bad_request() {
    let app = app(&MemoryDatabase::new(), None);
    let (status, body) = send(&app, Method::GET, "/reviews?dateTo=2024-13-40", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn reviews_page_with_cursor() {
    let (_db, app) = synced_app().await;

    let (status, first) = send(&app, Method::GET, "/reviews?limit=2", None).await;
    assert_eq!(status, StatusCode::OK);
    let reviews = first["reviews"].as_array().unwrap();
    assert_eq!(reviews.len(), 2);
    assert_eq!(reviews[0]["externalId"], "3");
    assert_eq!(reviews[0]["categories"].as_array().unwrap().len(), 2);
    assert_eq!(first["nextCursor"], "2");

    let (_, second) = send(&app, Method::GET, "/reviews?limit=2&cursor=2", None).await;
    assert_eq!(second["reviews"].as_array().unwrap().len(), 1);
    assert_eq!(second["reviews"][0]["externalId"], "1");
    assert!(second["nextCursor"].is_null());

    let (status, _) = send(&app, Method::GET, "/reviews?cursor=abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reviews_filter_by_date_range() {
    let (_db, app) = synced_app().await;
    let (status, page) = send(
        &app,
        Method::GET,
        "/reviews?dateFrom=2024-02-01&dateTo=2024-02-10",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let reviews = page["reviews"].as_array().unwrap();
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0]["externalId"], "2");
}

#[tokio::test]
async fn approval_toggle_changes_public_rating() {
    let (_db, app) = synced_app().await;

    let (_, detail) = send(&app, Method::GET, "/properties/shoreditch-heights", None).await;
    assert_eq!(detail["reviewCount"], 3);
    assert_eq!(detail["ratingAvg"], 9.0);

    let review_id = detail["reviews"][0]["id"].as_str().unwrap().to_string();
    let (status, updated) = send(
        &app,
        Method::PATCH,
        &format!("/reviews/{review_id}/approval"),
        Some(json!({"approved": false})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["approved"], false);

    let (_, detail) = send(&app, Method::GET, "/properties/shoreditch-heights", None).await;
    assert_eq!(detail["reviewCount"], 2);

    let (_, stats) = send(&app, Method::GET, "/reviews/stats", None).await;
    assert_eq!(stats["totalReviews"], 3);
    assert_eq!(stats["approvedReviews"], 2);
    assert_eq!(stats["pendingReviews"], 1);
}

#[tokio::test]
async fn bulk_approval_requires_ids() {
    let (_db, app) = synced_app().await;
    let (status, _) = send(
        &app,
        Method::POST,
        "/reviews/approval",
        Some(json!({"ids": [], "approved": true})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, page) = send(&app, Method::GET, "/reviews", None).await;
    let ids: Vec<Value> = page["reviews"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].clone())
        .collect();
    let (status, body) = send(
        &app,
        Method::POST,
        "/reviews/approval",
        Some(json!({"ids": ids, "approved": false})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], 3);
}

#[tokio::test]
async fn unknown_review_is_not_found() {
    let app = app(&MemoryDatabase::new(), None);
    let (status, _) = send(
        &app,
        Method::GET,
        "/reviews/3f1a3c5e-7d2b-4b8e-9a61-2f0f6a0c1d11",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn property_lifecycle() {
    let db = MemoryDatabase::new();
    let app = app(&db, None);

    let (status, _) = send(
        &app,
        Method::POST,
        "/properties",
        Some(json!({"slug": " ", "name": "Camden Loft"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, created) = send(
        &app,
        Method::POST,
        "/properties",
        Some(json!({"slug": "camden-loft", "name": "Camden Loft", "city": "London"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        Method::POST,
        "/properties",
        Some(json!({"slug": "camden-loft", "name": "Another"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, updated) = send(
        &app,
        Method::PATCH,
        &format!("/properties/{id}"),
        Some(json!({"price": 180.0})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["price"], 180.0);
    assert_eq!(updated["city"], "London");

    let (_, page) = send(&app, Method::GET, "/properties?city=london", None).await;
    assert_eq!(page["properties"].as_array().unwrap().len(), 1);
    assert_eq!(page["properties"][0]["reviewCount"], 0);

    let (status, _) = send(&app, Method::DELETE, &format!("/properties/{id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, Method::GET, "/properties/camden-loft", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn listing_mapping_checks_property() {
    let (db, app) = synced_app().await;
    let other = db.insert_property("camden-loft", "Camden Loft").await;

    let (_, page) = send(&app, Method::GET, "/reviews?limit=1", None).await;
    let listing_id = page["reviews"][0]["listingId"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/listings/{listing_id}/property"),
        Some(json!({"propertyId": "3f1a3c5e-7d2b-4b8e-9a61-2f0f6a0c1d11"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, listing) = send(
        &app,
        Method::PUT,
        &format!("/listings/{listing_id}/property"),
        Some(json!({"propertyId": other.id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["propertyId"], json!(other.id));
}

#[tokio::test]
async fn performance_reports_per_property() {
    let (_db, app) = synced_app().await;
    let (status, body) = send(&app, Method::GET, "/properties/performance", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"]["totalReviews"], 3);
    let properties = body["properties"].as_array().unwrap();
    assert_eq!(properties.len(), 1);
    assert_eq!(properties[0]["slug"], "shoreditch-heights");
    assert_eq!(properties[0]["metrics"]["totalReviews"], 3);
    assert_eq!(properties[0]["metrics"]["categoryStats"]["location"], 3);
}

#[tokio::test]
async fn preview_reports_without_storing() {
    let db = MemoryDatabase::new();
    let sync = sync_for(
        &db,
        vec![record(1, "2024-01-10 09:00:00"), record(2, "not a date")],
    );
    let app = app(&db, Some(sync));

    let (status, body) = send(&app, Method::GET, "/reviews/hostaway/preview?limit=5", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["limit"], 5);
    assert_eq!(body["reviews"].as_array().unwrap().len(), 2);
    assert!(body["reviews"][1]["error"].is_string());
    assert_eq!(db.review_count().await, 0);
}

#[tokio::test]
async fn metrics_endpoint_exposes_storage_counts() {
    let (_db, app) = synced_app().await;
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("db_reviews_total"));
    assert!(text.contains("review_sync_runs_total"));
}
