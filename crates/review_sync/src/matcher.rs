use std::sync::Arc;

use async_trait::async_trait;
use common::text::{contains_words, normalize_name};
use db::{DbError, ListingRow, PropertyRow, Repositories};
use normalizer::NormalizedReview;
use tracing::{debug, warn};

/// Links an incoming review to a catalogue property. Best effort: a failed lookup
/// is reported as no match.
#[async_trait]
pub trait PropertyMatcher: Send + Sync {
    async fn match_property(
        &self,
        review: &NormalizedReview,
        listing: &ListingRow,
    ) -> Option<PropertyRow>;
}

/// Matches on the admin-maintained listing mapping first, then on property names.
pub struct CatalogMatcher {
    repos: Arc<dyn Repositories>,
}

impl CatalogMatcher {
    pub fn new(repos: Arc<dyn Repositories>) -> Self {
        Self { repos }
    }

    async fn lookup(
        &self,
        review: &NormalizedReview,
        listing: &ListingRow,
    ) -> Result<Option<PropertyRow>, DbError> {
        if let Some(property_id) = listing.property_id {
            if let Some(property) = self.repos.properties().get(property_id).await? {
                return Ok(Some(property));
            }
        }

        let listing_name = normalize_name(&review.listing_external_id);
        if listing_name.is_empty() {
            return Ok(None);
        }

        let properties = self.repos.properties().list_all().await?;
        Ok(best_name_match(&listing_name, properties))
    }
}

fn best_name_match(listing_name: &str, properties: Vec<PropertyRow>) -> Option<PropertyRow> {
    let mut contained: Option<(usize, PropertyRow)> = None;
    for property in properties {
        let name = normalize_name(&property.name);
        if name == listing_name {
            return Some(property);
        }
        if !contains_words(listing_name, &name) {
            continue;
        }
        let longer = contained
            .as_ref()
            .map_or(true, |(best_len, _)| name.len() > *best_len);
        if longer {
            contained = Some((name.len(), property));
        }
    }
    contained.map(|(_, property)| property)
}

#[async_trait]
impl PropertyMatcher for CatalogMatcher {
    async fn match_property(
        &self,
        review: &NormalizedReview,
        listing: &ListingRow,
    ) -> Option<PropertyRow> {
        match self.lookup(review, listing).await {
            Ok(Some(property)) => {
                debug!(
                    listing = %listing.external_id,
                    property = %property.slug,
                    "matched review to property"
                );
                Some(property)
            }
            Ok(None) => None,
            Err(err) => {
                warn!(
                    listing = %listing.external_id,
                    error = %err,
                    "property lookup failed; leaving review unmatched"
                );
                None
            }
        }
    }
}
