use common::{Classified, ErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("query error: {0}")]
    Query(#[source] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DbError {
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DbError::Query(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
            DbError::Conflict(_) => true,
            _ => false,
        }
    }
}

impl Classified for DbError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Persistence
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
