pub mod error;
pub mod listing;
pub mod matcher;
pub mod metrics;
pub mod service;

pub use error::{RecordError, SyncError};
pub use listing::resolve_listing;
pub use matcher::{CatalogMatcher, PropertyMatcher};
pub use service::{
    PreviewEntry, PreviewPage, RecordFailure, ReviewSync, SyncPhase, SyncStats, SyncSummary,
};
