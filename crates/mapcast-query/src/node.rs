//! Query node - the long-running daemon.
//!
//! Architecture:
//! - Single process owning the RocksDB claim store
//! - Object store for claim batches (input) and snapshots (output)
//! - Fixed-interval poll loop running one [`UpdateCycle`] at a time

use crate::config::QueryConfig;
use crate::cycle::{now_ms, UpdateCycle};
use crate::error::Result;
use crate::object_store::{self, ObjectStore};
use crate::storage::Storage;
use std::sync::Arc;

/// A query node instance.
pub struct QueryNode {
    config: QueryConfig,
    cycle: UpdateCycle,
}

impl QueryNode {
    /// Open the claim store and the object store named by the config.
    pub async fn new(config: QueryConfig) -> Result<Self> {
        let objects = object_store::from_config(&config)?;
        Self::with_object_store(config, objects)
    }

    /// Create a node over an already-built object store.
    pub fn with_object_store(config: QueryConfig, objects: Arc<dyn ObjectStore>) -> Result<Self> {
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let storage = Arc::new(Storage::open(&config.db_path)?);
        tracing::info!(path = ?config.db_path, claims = storage.claim_count()?, "Claim store opened");

        let cycle = UpdateCycle::new(
            storage,
            objects,
            config.claim_bucket.clone(),
            config.state_bucket.clone(),
            config.fetch_concurrency,
        );
        Ok(Self { config, cycle })
    }

    /// The update cycle this node runs.
    pub fn cycle(&self) -> &UpdateCycle {
        &self.cycle
    }

    /// Run cycles until one fails or the process is interrupted.
    ///
    /// A failed cycle is returned as an error; the caller is expected to exit
    /// and be restarted by its supervisor.
    pub async fn run(self) -> Result<()> {
        tracing::info!(poll_interval = ?self.config.poll_interval, "Starting main loop");
        tracing::info!("  Endpoint: {}", self.config.endpoint);
        tracing::info!("  Claims: {}", self.config.claim_bucket);
        tracing::info!("  State: {}", self.config.state_bucket);

        loop {
            if let Err(e) = self.cycle.run_once(now_ms()).await {
                tracing::error!(error = %e, "Update failed");
                return Err(e);
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Interrupted, stopping main loop");
                    return Ok(());
                }
            }
        }
    }
}
