use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::NormalizeError;

const UNKNOWN_ID: &str = "unknown";

/// Review identifier as emitted by the provider; some feeds use numbers, others strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemoteId {
    Number(i64),
    Text(String),
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteId::Number(value) => write!(f, "{value}"),
            RemoteId::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for RemoteId {
    fn from(value: i64) -> Self {
        RemoteId::Number(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCategoryRating {
    pub category: String,
    pub rating: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteReview {
    pub id: RemoteId,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub review_type: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub public_review: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub review_category: Vec<RemoteCategoryRating>,
    #[serde(default)]
    pub submitted_at: Option<String>,
    #[serde(default)]
    pub guest_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub listing_name: String,
    #[serde(default)]
    pub channel_name: Option<String>,
}

/// Best-effort id of a raw record, usable even when the record fails to decode.
pub fn record_id(value: &Value) -> String {
    match value.get("id") {
        Some(Value::Number(number)) => number.to_string(),
        Some(Value::String(text)) => text.clone(),
        _ => UNKNOWN_ID.to_string(),
    }
}

/// Decodes one raw feed record; shape problems stay scoped to that record.
pub fn decode_record(value: &Value) -> Result<RemoteReview, NormalizeError> {
    RemoteReview::deserialize(value).map_err(|err| NormalizeError::InvalidShape {
        id: record_id(value),
        message: err.to_string(),
    })
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
