use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::config::SyncConfig;
use common::{Classified, ErrorKind};
use db::{CategoryRatingUpsert, IngestionCounts, Repositories, ReviewUpsert};
use hostaway::ReviewFeed;
use normalizer::{decode_record, normalize_review, record_id, NormalizedReview, ReviewSource};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::error::{RecordError, SyncError};
use crate::listing::resolve_listing;
use crate::matcher::PropertyMatcher;
use crate::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Fetching,
    ProcessingRecord { index: usize, total: usize },
    Completed,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncPhase::Idle => f.write_str("idle"),
            SyncPhase::Fetching => f.write_str("fetching"),
            SyncPhase::ProcessingRecord { index, total } => {
                write!(f, "processing record {}/{}", index + 1, total)
            }
            SyncPhase::Completed => f.write_str("completed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFailure {
    pub review_id: String,
    pub kind: ErrorKind,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub total_fetched: usize,
    pub synced_count: usize,
    pub error_count: usize,
    pub errors: Vec<RecordFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SyncSummary {
    pub fn is_clean(&self) -> bool {
        self.error_count == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub total_reviews: i64,
    pub hostaway_reviews: i64,
    pub approved_reviews: i64,
    pub pending_reviews: i64,
    pub total_listings: i64,
}

impl From<IngestionCounts> for SyncStats {
    fn from(counts: IngestionCounts) -> Self {
        Self {
            total_reviews: counts.total_reviews,
            hostaway_reviews: counts.source_reviews,
            approved_reviews: counts.approved_reviews,
            pending_reviews: counts.total_reviews - counts.approved_reviews,
            total_listings: counts.total_listings,
        }
    }
}

/// A fetched record as it would be stored, or why it would be rejected.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewEntry {
    pub review_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized: Option<NormalizedReview>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewPage {
    pub total_count: Option<u64>,
    pub limit: u32,
    pub offset: u32,
    pub reviews: Vec<PreviewEntry>,
}

pub struct ReviewSync {
    config: SyncConfig,
    feed: Arc<dyn ReviewFeed>,
    repos: Arc<dyn Repositories>,
    matcher: Arc<dyn PropertyMatcher>,
    phase: watch::Sender<SyncPhase>,
}

impl ReviewSync {
    pub fn new(
        config: SyncConfig,
        feed: Arc<dyn ReviewFeed>,
        repos: Arc<dyn Repositories>,
        matcher: Arc<dyn PropertyMatcher>,
    ) -> Self {
        let (phase, _) = watch::channel(SyncPhase::Idle);
        Self {
            config,
            feed,
            repos,
            matcher,
            phase,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        *self.phase.borrow()
    }

    fn enter(&self, phase: SyncPhase) {
        debug!(phase = %phase, "sync phase");
        self.phase.send_replace(phase);
    }

    pub async fn run(&self) -> Result<(), SyncError> {
        loop {
            match self.sync_all().await {
                Ok(summary) => {
                    if let Some(days) = self.config.cleanup_after_days {
                        if let Err(err) = self.cleanup_old_reviews(days).await {
                            warn!(error = %err, "review retention cleanup failed");
                        }
                    }
                    debug!(errors = summary.error_count, "sync cycle finished");
                }
                Err(err) if self.config.run_once => return Err(err),
                Err(err) => {
                    error!(error = %err, kind = %err.kind(), "sync run aborted");
                }
            }

            if self.config.run_once {
                break;
            }
            sleep(Duration::from_secs(self.config.interval_secs)).await;
        }
        Ok(())
    }

    /// Fetches every remote review and reconciles it into storage, one record at a
    /// time. Only a feed failure aborts the run; record failures are summarized.
    #[instrument(skip(self))]
    pub async fn sync_all(&self) -> Result<SyncSummary, SyncError> {
        let started_at = Utc::now();
        metrics::RUNS_TOTAL.inc();
        metrics::LAST_RUN_TIMESTAMP.set(started_at.timestamp());
        let _timer = metrics::RUN_DURATION.start_timer();

        self.enter(SyncPhase::Fetching);
        let records = match self.feed.fetch_all_reviews().await {
            Ok(records) => records,
            Err(err) => {
                metrics::RUN_ABORTS_TOTAL.inc();
                self.enter(SyncPhase::Idle);
                return Err(SyncError::Fetch(err));
            }
        };
        metrics::LAST_FETCHED.set(records.len() as i64);
        info!(count = records.len(), "fetched hostaway reviews");

        let total = records.len();
        let mut synced_count = 0;
        let mut errors = Vec::new();
        for (index, record) in records.iter().enumerate() {
            self.enter(SyncPhase::ProcessingRecord { index, total });
            let external_id = record_id(record);
            match self.process_record(record).await {
                Ok(review_id) => {
                    synced_count += 1;
                    metrics::RECORDS_TOTAL.with_label_values(&["synced"]).inc();
                    debug!(%external_id, %review_id, "synced review");
                }
                Err(err) => {
                    let kind = err.kind();
                    metrics::RECORDS_TOTAL.with_label_values(&["error"]).inc();
                    metrics::RECORD_ERRORS_TOTAL
                        .with_label_values(&[kind.as_str()])
                        .inc();
                    warn!(
                        %external_id,
                        kind = %kind,
                        error = %err,
                        "failed to sync review"
                    );
                    errors.push(RecordFailure {
                        review_id: external_id,
                        kind,
                        error: err.to_string(),
                    });
                }
            }
        }

        let summary = SyncSummary {
            total_fetched: total,
            synced_count,
            error_count: errors.len(),
            errors,
            started_at,
            finished_at: Utc::now(),
        };
        if summary.is_clean() {
            metrics::LAST_SUCCESS_TIMESTAMP.set(summary.finished_at.timestamp());
        }
        self.enter(SyncPhase::Completed);
        info!(
            fetched = summary.total_fetched,
            synced = summary.synced_count,
            errors = summary.error_count,
            "hostaway sync completed"
        );
        Ok(summary)
    }

    async fn process_record(&self, raw: &Value) -> Result<Uuid, RecordError> {
        let record = decode_record(raw)?;
        let normalized = normalize_review(&record)?;
        let listing = resolve_listing(
            self.repos.listings(),
            &normalized.listing_external_id,
            Some(normalized.channel.as_str()),
        )
        .await?;
        let property = self.matcher.match_property(&normalized, &listing).await;

        let ratings: Vec<CategoryRatingUpsert> = normalized
            .category_ratings
            .iter()
            .map(|rating| CategoryRatingUpsert {
                name: rating.category.clone(),
                rating: Some(rating.rating),
            })
            .collect();

        let review_id = self
            .repos
            .reviews()
            .upsert_with_ratings(
                to_upsert(normalized, listing.id, property.map(|p| p.id)),
                &ratings,
            )
            .await?;
        Ok(review_id)
    }

    pub async fn sync_stats(&self) -> Result<SyncStats, SyncError> {
        let counts = self
            .repos
            .reviews()
            .ingestion_counts(ReviewSource::Hostaway.as_str())
            .await?;
        Ok(SyncStats::from(counts))
    }

    /// Deletes unapproved reviews created more than `days` days ago.
    #[instrument(skip(self))]
    pub async fn cleanup_old_reviews(&self, days: u32) -> Result<u64, SyncError> {
        let cutoff = Utc::now()
            .checked_sub_signed(chrono::Duration::days(i64::from(days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let deleted = self.repos.reviews().delete_unapproved_before(cutoff).await?;
        metrics::CLEANUP_DELETED_TOTAL.inc_by(deleted);
        info!(deleted, %cutoff, "removed stale unapproved reviews");
        Ok(deleted)
    }

    /// Fetches one page and normalizes it without touching storage.
    pub async fn preview_page(&self, limit: u32, offset: u32) -> Result<PreviewPage, SyncError> {
        let page = self.feed.fetch_reviews(limit, offset).await?;
        let reviews = page
            .result
            .iter()
            .map(|raw| {
                let review_id = record_id(raw);
                match decode_record(raw).and_then(|record| normalize_review(&record)) {
                    Ok(normalized) => PreviewEntry {
                        review_id,
                        normalized: Some(normalized),
                        error: None,
                    },
                    Err(err) => PreviewEntry {
                        review_id,
                        normalized: None,
                        error: Some(err.to_string()),
                    },
                }
            })
            .collect();

        Ok(PreviewPage {
            total_count: page.total_count,
            limit,
            offset,
            reviews,
        })
    }
}

fn to_upsert(review: NormalizedReview, listing_id: Uuid, property_id: Option<Uuid>) -> ReviewUpsert {
    ReviewUpsert {
        source: review.source.as_str().to_string(),
        external_id: review.external_id,
        listing_id,
        property_id: property_id.or(review.property_id),
        review_type: review.review_type.as_str().to_string(),
        channel: review.channel,
        rating: review.rating,
        title: review.title,
        body: review.body,
        author_name: review.author_name,
        language: review.language,
        created_at: review.created_at,
        approved: review.approved,
    }
}
