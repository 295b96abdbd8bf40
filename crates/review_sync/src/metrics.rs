use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

pub static RUNS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("review_sync_runs_total", "Total number of review sync runs attempted")
        .expect("review sync runs total")
});

pub static RUN_ABORTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "review_sync_run_aborts_total",
        "Sync runs that stopped before processing records because the feed could not be read"
    )
    .expect("review sync run aborts")
});

pub static RECORDS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "review_sync_records_total",
        "Fetched review records grouped by outcome",
        &["outcome"]
    )
    .expect("review sync records total")
});

pub static RECORD_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "review_sync_record_errors_total",
        "Record-level ingestion errors grouped by error kind",
        &["kind"]
    )
    .expect("review sync record errors total")
});

pub static LAST_RUN_TIMESTAMP: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "review_sync_last_run_timestamp_seconds",
        "Unix timestamp when the last sync run started"
    )
    .expect("review sync last run timestamp")
});

pub static LAST_SUCCESS_TIMESTAMP: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "review_sync_last_success_timestamp_seconds",
        "Unix timestamp when a sync run last finished without record errors"
    )
    .expect("review sync last success timestamp")
});

pub static LAST_FETCHED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "review_sync_last_fetched_records",
        "Number of records fetched by the most recent sync run"
    )
    .expect("review sync last fetched gauge")
});

pub static RUN_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "review_sync_run_duration_seconds",
        "Duration of review sync runs in seconds",
        vec![0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]
    )
    .expect("review sync run duration histogram")
});

pub static CLEANUP_DELETED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "review_sync_cleanup_deleted_total",
        "Unapproved reviews removed by retention cleanup"
    )
    .expect("review sync cleanup deleted total")
});
