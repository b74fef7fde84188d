//! Mapcast query daemon binary.

use mapcast_query::{QueryConfig, QueryNode};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mapcast_query=info,mapcast_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Mapcast query daemon");

    let config = match QueryConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Bootstrap failed");
            std::process::exit(1);
        }
    };

    let node = QueryNode::new(config).await?;
    tracing::info!("Bootstrap complete");
    node.run().await?;

    Ok(())
}
