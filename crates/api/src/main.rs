use std::sync::Arc;

use anyhow::Result;
use api::{build_router, ApiState};
use axum::Router;
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
    let database = Arc::new(PgDatabase::connect(&config.database.url).await?);
    let repositories: Arc<dyn Repositories> = database.clone();

    let sync = match HostawayClient::from_config(&config.hostaway)? {
        Some(client) => {
            let matcher = Arc::new(CatalogMatcher::new(repositories.clone()));
            Some(Arc::new(ReviewSync::new(
                config.sync.clone(),
                Arc::new(client),
                repositories.clone(),
                matcher,
            )))
        }
        None => {
            warn!("hostaway credentials not configured; sync endpoints disabled");
            None
        }
    };

    let metrics_path: &'static str =
        Box::leak(config.observability.metrics_path.clone().into_boxed_str());
    let state = Arc::new(ApiState {
        repositories,
        sync,
        metrics_path,
    });
    let app: Router = build_router(state);

    let addr: std::net::SocketAddr = config.api.bind.parse()?;
    info!("api listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
