//! One update cycle: ingest new claim batches, reconcile them into the
//! claim store, and republish the leaderboard snapshots.

use crate::error::Result;
use crate::ingest::{delete_objects, fetch_batches};
use crate::object_store::{ObjectStore, PutOptions};
use crate::storage::Storage;
use mapcast_core::{ClaimsExport, ReconcileSummary, UnifiedState, CLAIMS_EXPORT_KEY, UNIFIED_STATE_KEY};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, info};

/// Freshness of the leaderboard snapshot.
pub const UNIFIED_STATE_MAX_AGE_SECS: u32 = 60;

/// Freshness of the public claim export.
pub const CLAIMS_EXPORT_MAX_AGE_SECS: u32 = 300;

/// What one cycle did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Keys listed in the input bucket.
    pub listed: usize,
    /// Keys fetched, parsed and then deleted (or attempted).
    pub consumed: usize,
    /// Keys left in place because they could not be fetched.
    pub fetch_failures: usize,
    /// Keys left in place because they are not claim documents.
    pub undecodable: usize,
    /// Records skipped as malformed.
    pub malformed: usize,
    /// Reconciliation counts, when anything was ingested.
    pub reconcile: Option<ReconcileSummary>,
    /// Claims in the store snapshot the views were computed from.
    pub stored_claims: usize,
    /// Whether `claims.json` was republished.
    pub exported: bool,
    /// Consumed keys whose deletion failed.
    pub delete_failures: Vec<String>,
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Drives update cycles against one claim store and one object store.
pub struct UpdateCycle {
    storage: Arc<Storage>,
    objects: Arc<dyn ObjectStore>,
    claim_bucket: String,
    state_bucket: String,
    concurrency: usize,
}

impl UpdateCycle {
    pub fn new(
        storage: Arc<Storage>,
        objects: Arc<dyn ObjectStore>,
        claim_bucket: impl Into<String>,
        state_bucket: impl Into<String>,
        concurrency: usize,
    ) -> Self {
        Self {
            storage,
            objects,
            claim_bucket: claim_bucket.into(),
            state_bucket: state_bucket.into(),
            concurrency,
        }
    }

    /// Run one cycle as of `now_ms`.
    ///
    /// Fetch and delete failures are logged and tolerated. A store failure
    /// or a failed publication aborts the cycle before anything is deleted,
    /// so the batches are ingested again next time.
    pub async fn run_once(&self, now_ms: i64) -> Result<CycleReport> {
        let bucket = self.claim_bucket.as_str();
        let keys = self.objects.list(bucket).await?;
        info!(bucket_name = bucket, key_count = keys.len(), "Retrieved list of items in bucket");

        let mut report = CycleReport {
            listed: keys.len(),
            ..CycleReport::default()
        };

        let fetched = fetch_batches(self.objects.as_ref(), bucket, keys, self.concurrency).await;
        report.consumed = fetched.consumed_keys.len();
        report.fetch_failures = fetched.failed_keys.len();
        report.undecodable = fetched.undecodable_keys.len();
        report.malformed = fetched.malformed.len();

        if fetched.consumed_keys.is_empty() {
            info!(bucket_name = bucket, "No items to download from bucket");
        } else {
            info!(
                bucket_name = bucket,
                key_count = fetched.consumed_keys.len(),
                claim_count = fetched.claims.len(),
                malformed = fetched.malformed.len(),
                undecodable = fetched.undecodable_keys.len(),
                "Downloaded claim batches from bucket"
            );

            let summary = self.storage.apply_batch(fetched.claims)?;
            info!(
                records = summary.records,
                addresses = summary.addresses,
                inserted = summary.inserted,
                replaced = summary.replaced,
                rejected = summary.rejected,
                written = summary.written,
                overwritten = summary.overwritten,
                "Reconciled claim batch"
            );
            report.reconcile = Some(summary);
        }

        // Every view below reads this one snapshot.
        let claims = self.storage.snapshot_claims()?;
        report.stored_claims = claims.len();

        let state = UnifiedState::compute(&claims, now_ms);
        self.publish(UNIFIED_STATE_KEY, serde_json::to_string(&state)?, UNIFIED_STATE_MAX_AGE_SECS)
            .await?;

        if !fetched.consumed_keys.is_empty() {
            let export = ClaimsExport::new(&claims, now_ms.div_euclid(1000));
            self.publish(CLAIMS_EXPORT_KEY, serde_json::to_string(&export)?, CLAIMS_EXPORT_MAX_AGE_SECS)
                .await?;
            report.exported = true;
        }

        let outcomes = delete_objects(
            self.objects.as_ref(),
            bucket,
            fetched.consumed_keys,
            self.concurrency,
        )
        .await;
        for (key, outcome) in outcomes {
            if let Err(e) = outcome {
                error!(bucket_name = bucket, key = %key, error = %e, "Failed to delete object");
                report.delete_failures.push(key);
            }
        }

        info!(
            stored_claims = report.stored_claims,
            consumed = report.consumed,
            fetch_failures = report.fetch_failures,
            undecodable = report.undecodable,
            delete_failures = report.delete_failures.len(),
            "Update completed"
        );
        Ok(report)
    }

    async fn publish(&self, key: &str, body: String, max_age_secs: u32) -> Result<()> {
        let bytes = body.len();
        self.objects
            .put(&self.state_bucket, key, body, PutOptions::json(max_age_secs))
            .await?;
        info!(bucket_name = %self.state_bucket, key, bytes, "Published snapshot");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::MemoryObjectStore;
    use tempfile::tempdir;

    const NOW: i64 = 1_700_000_000_000;

    fn cycle(store: &MemoryObjectStore, storage: Arc<Storage>) -> UpdateCycle {
        UpdateCycle::new(storage, Arc::new(store.clone()), "claims", "state", 4)
    }

    #[tokio::test]
    async fn empty_bucket_publishes_state_only() {
        let dir = tempdir().unwrap();
        let storage = Arc::new(Storage::open(dir.path()).unwrap());
        let store = MemoryObjectStore::new();

        let report = cycle(&store, storage).run_once(NOW).await.unwrap();
        assert_eq!(report.listed, 0);
        assert!(report.reconcile.is_none());
        assert!(!report.exported);

        let state = store.object("state", UNIFIED_STATE_KEY).unwrap().unwrap();
        assert_eq!(state.options.unwrap().cache_max_age_secs, UNIFIED_STATE_MAX_AGE_SECS);
        assert!(store.object("state", CLAIMS_EXPORT_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_publication_keeps_batches() {
        let dir = tempdir().unwrap();
        let storage = Arc::new(Storage::open(dir.path()).unwrap());
        let store = MemoryObjectStore::new();
        store
            .insert("claims", "01.json", r#"{"ip":"1.1.1.1","name":"A","time_ms":1}"#)
            .unwrap();
        store.fail_put(UNIFIED_STATE_KEY).unwrap();

        assert!(cycle(&store, storage).run_once(NOW).await.is_err());
        assert!(store.object("claims", "01.json").unwrap().is_some());
    }

    #[tokio::test]
    async fn undecodable_document_is_reported_apart_from_fetch_failures() {
        let dir = tempdir().unwrap();
        let storage = Arc::new(Storage::open(dir.path()).unwrap());
        let store = MemoryObjectStore::new();
        store.insert("claims", "01.json", "not json").unwrap();
        store
            .insert("claims", "02.json", r#"{"ip":"1.1.1.1","name":"A","time_ms":1}"#)
            .unwrap();
        store.fail_get("02.json").unwrap();
        let cycle = cycle(&store, storage);

        for _ in 0..2 {
            let report = cycle.run_once(NOW).await.unwrap();
            assert_eq!(report.undecodable, 1);
            assert_eq!(report.fetch_failures, 1);
            assert_eq!(report.consumed, 0);
        }
        assert!(store.object("claims", "01.json").unwrap().is_some());
    }
}
