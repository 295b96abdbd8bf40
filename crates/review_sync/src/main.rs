use std::sync::Arc;

use anyhow::Result;
use common::{config::AppConfig, logging};
use db::pg::PgDatabase;
use db::Repositories;
use hostaway::HostawayClient;
use review_sync::{CatalogMatcher, ReviewSync};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logging("info");
    let config = AppConfig::load()?;

    let Some(client) = HostawayClient::from_config(&config.hostaway)? else {
        warn!("hostaway credentials not configured; review sync disabled");
        return Ok(());
    };

    let database = Arc::new(PgDatabase::connect(&config.database.url).await?);
    let repositories: Arc<dyn Repositories> = database.clone() as Arc<dyn Repositories>;
    let matcher = Arc::new(CatalogMatcher::new(repositories.clone()));

    let sync = ReviewSync::new(
        config.sync.clone(),
        Arc::new(client),
        repositories,
        matcher,
    );
    info!(
        interval = config.sync.interval_secs,
        run_once = config.sync.run_once,
        "review sync started"
    );
    sync.run().await?;
    Ok(())
}
