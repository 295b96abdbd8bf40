pub mod error;
pub mod models;
pub mod payloads;
pub mod transform;

pub use error::NormalizeError;
pub use models::{CategoryRating, NormalizedReview, ReviewSource, ReviewType};
pub use payloads::{decode_record, record_id, RemoteCategoryRating, RemoteId, RemoteReview};
pub use transform::{map_channel, map_review_type, normalize_review, parse_submitted_at};
