use common::{Classified, ErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("review {id}: submittedAt is missing")]
    MissingTimestamp { id: String },
    #[error("review {id}: unparseable submittedAt {value:?}")]
    MalformedTimestamp { id: String, value: String },
    #[error("review {id}: listingName is missing")]
    MissingListing { id: String },
    #[error("review {id}: invalid record shape: {message}")]
    InvalidShape { id: String, message: String },
}

impl NormalizeError {
    pub fn review_id(&self) -> &str {
        match self {
            NormalizeError::MissingTimestamp { id }
            | NormalizeError::MalformedTimestamp { id, .. }
            | NormalizeError::MissingListing { id }
            | NormalizeError::InvalidShape { id, .. } => id,
        }
    }
}

impl Classified for NormalizeError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::MalformedRecord
    }
}
