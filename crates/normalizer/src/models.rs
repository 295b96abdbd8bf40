use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Provider a review was ingested from. Distinct from the booking channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewSource {
    Hostaway,
    Google,
    Airbnb,
    Booking,
    Direct,
}

impl ReviewSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewSource::Hostaway => "hostaway",
            ReviewSource::Google => "google",
            ReviewSource::Airbnb => "airbnb",
            ReviewSource::Booking => "booking",
            ReviewSource::Direct => "direct",
        }
    }
}

impl fmt::Display for ReviewSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hostaway" => Ok(ReviewSource::Hostaway),
            "google" => Ok(ReviewSource::Google),
            "airbnb" => Ok(ReviewSource::Airbnb),
            "booking" => Ok(ReviewSource::Booking),
            "direct" => Ok(ReviewSource::Direct),
            other => Err(format!("unknown review source: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewType {
    GuestToHost,
    HostToGuest,
    Public,
}

impl ReviewType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewType::GuestToHost => "guest_to_host",
            ReviewType::HostToGuest => "host_to_guest",
            ReviewType::Public => "public",
        }
    }
}

impl fmt::Display for ReviewType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "guest_to_host" => Ok(ReviewType::GuestToHost),
            "host_to_guest" => Ok(ReviewType::HostToGuest),
            "public" => Ok(ReviewType::Public),
            other => Err(format!("unknown review type: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRating {
    pub category: String,
    pub rating: f64,
}

/// A remote review mapped onto the internal schema. Transient: it is either
/// inserted or merged into the stored review keyed by `(external_id, source)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedReview {
    pub source: ReviewSource,
    pub external_id: String,
    pub listing_external_id: String,
    pub property_id: Option<Uuid>,
    pub review_type: ReviewType,
    pub channel: String,
    pub rating: f64,
    pub title: Option<String>,
    pub body: String,
    pub author_name: Option<String>,
    pub language: String,
    pub created_at: DateTime<Utc>,
    pub approved: bool,
    pub category_ratings: Vec<CategoryRating>,
}
