//! Mapcast Query - leaderboard daemon
//!
//! Periodically ingests claim batches from an object store, reconciles them
//! into a persistent claim table, and publishes leaderboard snapshots.
//!
//! # Architecture
//!
//! - **Storage**: RocksDB-backed claim table (one row per address)
//! - **Object store**: input batches and published snapshots (S3, filesystem or memory)
//! - **Ingest**: bounded parallel fetch/delete with per-key error capture
//! - **Cycle**: one fetch → reconcile → rank → publish → delete pass
//! - **Node**: configuration and the poll loop
//!
//! # Example
//!
//! ```no_run
//! use mapcast_query::{QueryConfig, QueryNode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = QueryConfig::from_env()?;
//!     let node = QueryNode::new(config).await?;
//!     node.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod cycle;
pub mod error;
pub mod ingest;
pub mod node;
pub mod object_store;
pub mod storage;

pub use config::QueryConfig;
pub use cycle::{CycleReport, UpdateCycle};
pub use error::{Error, Result};
pub use node::QueryNode;
pub use crate::object_store::{FsObjectStore, MemoryObjectStore, ObjectStore, PutOptions, S3ObjectStore};
pub use storage::Storage;
