use common::{Classified, ErrorKind};
use db::DbError;
use hostaway::HostawayError;
use normalizer::NormalizeError;

/// Failure of a whole sync run. Record-level problems never surface here.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("failed to fetch reviews: {0}")]
    Fetch(#[from] HostawayError),
    #[error("database error: {0}")]
    Persistence(#[from] DbError),
}

impl Classified for SyncError {
    fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Fetch(err) => err.kind(),
            SyncError::Persistence(err) => err.kind(),
        }
    }
}

/// Failure while ingesting a single fetched record.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error(transparent)]
    Malformed(#[from] NormalizeError),
    #[error(transparent)]
    Persistence(#[from] DbError),
}

impl Classified for RecordError {
    fn kind(&self) -> ErrorKind {
        match self {
            RecordError::Malformed(err) => err.kind(),
            RecordError::Persistence(err) => err.kind(),
        }
    }
}
