//! Mapcast Core - claim reconciliation and territorial ranking
//!
//! Pure logic for the Mapcast leaderboard. Claimants assert ownership of
//! network addresses; this crate decides which assertion stands for each
//! address and who dominates each territory.
//!
//! # Architecture
//!
//! - **Claim**: the per-address claim model and batch document parsing
//! - **Reconcile**: the anti-flapping merge rule and batch folding over a [`ClaimTable`]
//! - **Ranking**: per-territory winners rolled up into leaderboard rows
//! - **Activity**: recent-claims feed and public export
//! - **Snapshot**: the published documents built from one view of the claims
//!
//! Nothing here performs I/O or logging; callers get summaries back and
//! report them.
//!
//! # Example
//!
//! ```
//! use mapcast_core::{apply_batch, rank, Claim, Granularity, Window};
//! use std::collections::BTreeMap;
//!
//! let mut table: BTreeMap<String, Claim> = BTreeMap::new();
//! apply_batch(&mut table, vec![Claim::new("192.0.2.1", "alice", 1_000).with_country("US")]).unwrap();
//!
//! let rows = rank(table.values(), Granularity::Country, Window::AllTime, 2_000);
//! assert_eq!(rows[0].name, "alice");
//! ```

pub mod activity;
pub mod claim;
pub mod ranking;
pub mod reconcile;
pub mod snapshot;

pub use activity::{public_export, recent_feed, redact_address, PublicClaim, RecentRow};
pub use claim::{parse_document, Claim, IncomingClaimRecord, MalformedClaim};
pub use ranking::{rank, Granularity, LeaderboardRow, ParseLabelError, Window};
pub use reconcile::{apply_batch, decide, reconcile, ClaimTable, Decision, ReconcileSummary, HYSTERESIS_MS};
pub use snapshot::{ClaimsExport, UnifiedState, CLAIMS_EXPORT_KEY, UNIFIED_STATE_KEY};
