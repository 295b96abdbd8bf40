use db::{DbError, ListingCreate, ListingRepository, ListingRow};
use tracing::{debug, info};

pub const PLACEHOLDER_NAME_PREFIX: &str = "Hostaway Listing";

/// Returns the listing for `external_id`, creating a placeholder on first sight.
///
/// Safe to call concurrently: the insert is conditional on the unique external id
/// and a lost race falls back to reading the winner's row.
pub async fn resolve_listing(
    listings: &dyn ListingRepository,
    external_id: &str,
    channel: Option<&str>,
) -> Result<ListingRow, DbError> {
    if let Some(existing) = listings.get_by_external_id(external_id).await? {
        return Ok(existing);
    }

    let created = listings
        .create_if_absent(ListingCreate {
            external_id: external_id.to_string(),
            name: format!("{PLACEHOLDER_NAME_PREFIX} {external_id}"),
            channel: channel.map(str::to_string),
        })
        .await?;

    match created {
        Some(row) => {
            info!(listing_id = %row.id, external_id, "created listing");
            Ok(row)
        }
        None => {
            debug!(external_id, "listing created concurrently; re-reading");
            listings
                .get_by_external_id(external_id)
                .await?
                .ok_or_else(|| DbError::NotFound(format!("listing {external_id}")))
        }
    }
}
