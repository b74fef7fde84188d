//! Fetching claim batches from the input bucket and deleting consumed ones.
//!
//! Both directions fan out over a bounded number of concurrent requests and
//! capture errors per key: one bad object never stops the others.

use crate::error::Result;
use crate::object_store::ObjectStore;
use futures::stream::{self, StreamExt};
use mapcast_core::{parse_document, Claim, MalformedClaim};
use tracing::{debug, error, warn};

/// Outcome of fetching a set of batch files.
#[derive(Debug, Default)]
pub struct FetchReport {
    /// Keys whose content was ingested; these are deleted after the cycle.
    pub consumed_keys: Vec<String>,
    /// Claims parsed from the consumed keys.
    pub claims: Vec<Claim>,
    /// Keys that could not be fetched; left in place for the next cycle.
    pub failed_keys: Vec<String>,
    /// Keys that fetched but are not claim documents. They stay in the bucket
    /// and fail the same way every cycle until removed by hand.
    pub undecodable_keys: Vec<String>,
    /// Records skipped inside consumed documents.
    pub malformed: Vec<(String, MalformedClaim)>,
}

/// Fetch and parse every key, at most `concurrency` requests at a time.
pub async fn fetch_batches(
    store: &dyn ObjectStore,
    bucket: &str,
    keys: Vec<String>,
    concurrency: usize,
) -> FetchReport {
    let mut results = stream::iter(keys)
        .map(|key| async move {
            let result = store.get(bucket, &key).await;
            (key, result)
        })
        .buffer_unordered(concurrency.max(1));

    let mut report = FetchReport::default();
    while let Some((key, result)) = results.next().await {
        let body = match result {
            Ok(body) => body,
            Err(e) => {
                error!(bucket, key = %key, cause = "fetch", error = %e, "Failed to download object");
                report.failed_keys.push(key);
                continue;
            }
        };

        let records = match parse_document(&body) {
            Ok(records) => records,
            Err(e) => {
                error!(
                    bucket,
                    key = %key,
                    cause = "undecodable",
                    error = %e,
                    "Undecodable claim document left in bucket"
                );
                report.undecodable_keys.push(key);
                continue;
            }
        };

        debug!(bucket, key = %key, records = records.len(), "Downloaded claim document");
        for record in records {
            match record {
                Ok(claim) => report.claims.push(claim),
                Err(malformed) => {
                    warn!(
                        bucket,
                        key = %key,
                        ip = malformed.address.as_deref().unwrap_or("<unknown>"),
                        reason = %malformed.reason,
                        "Skipping malformed claim record"
                    );
                    report.malformed.push((key.clone(), malformed));
                }
            }
        }
        report.consumed_keys.push(key);
    }

    report.consumed_keys.sort();
    report.failed_keys.sort();
    report.undecodable_keys.sort();
    report
}

/// Delete every key, at most `concurrency` requests at a time.
///
/// Returns each key with its outcome, in key order.
pub async fn delete_objects(
    store: &dyn ObjectStore,
    bucket: &str,
    keys: Vec<String>,
    concurrency: usize,
) -> Vec<(String, Result<()>)> {
    let mut outcomes: Vec<(String, Result<()>)> = stream::iter(keys)
        .map(|key| async move {
            let result = store.delete(bucket, &key).await;
            (key, result)
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;
    outcomes.sort_by(|a, b| a.0.cmp(&b.0));
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::{MemoryObjectStore, PutOptions};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const BUCKET: &str = "claims";

    fn seeded() -> MemoryObjectStore {
        let store = MemoryObjectStore::new();
        store
            .insert(BUCKET, "01.json", r#"{"ip":"1.1.1.1","name":"A","time_ms":1}"#)
            .unwrap();
        store
            .insert(
                BUCKET,
                "02.json",
                r#"{"batch":[{"ip":"2.2.2.2","name":"B","time_ms":2},{"ip":"3.3.3.3","time_ms":3}]}"#,
            )
            .unwrap();
        store.insert(BUCKET, "03.json", "garbage").unwrap();
        store
            .insert(BUCKET, "04.json", r#"{"ip":"4.4.4.4","name":"D","time_ms":4}"#)
            .unwrap();
        store.fail_get("04.json").unwrap();
        store
    }

    #[tokio::test]
    async fn fetch_skips_failures_and_malformed_records() {
        let store = seeded();
        let keys = store.list(BUCKET).await.unwrap();

        let report = fetch_batches(&store, BUCKET, keys, 2).await;
        assert_eq!(report.consumed_keys, vec!["01.json", "02.json"]);
        assert_eq!(report.failed_keys, vec!["04.json"]);
        assert_eq!(report.undecodable_keys, vec!["03.json"]);
        assert_eq!(report.claims.len(), 2);
        assert_eq!(report.malformed.len(), 1);
        assert_eq!(report.malformed[0].0, "02.json");
    }

    #[tokio::test]
    async fn delete_failure_does_not_block_others() {
        let store = seeded();
        store.fail_delete("02.json").unwrap();

        let outcomes = delete_objects(
            &store,
            BUCKET,
            vec!["01.json".into(), "02.json".into(), "missing.json".into()],
            4,
        )
        .await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].1.is_ok());
        assert!(outcomes[1].1.is_err());
        assert!(outcomes[2].1.is_err());
        assert!(store.object(BUCKET, "01.json").unwrap().is_none());
        assert!(store.object(BUCKET, "02.json").unwrap().is_some());
    }

    /// Store whose requests take a while and record how many overlap.
    #[derive(Default)]
    struct SlowStore {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl SlowStore {
        async fn request(&self) {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ObjectStore for SlowStore {
        async fn list(&self, _bucket: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        async fn get(&self, _bucket: &str, _key: &str) -> Result<String> {
            self.request().await;
            Ok(r#"{"ip":"1.1.1.1","name":"A","time_ms":1}"#.to_string())
        }

        async fn put(&self, _bucket: &str, _key: &str, _body: String, _options: PutOptions) -> Result<()> {
            Ok(())
        }

        async fn delete(&self, _bucket: &str, _key: &str) -> Result<()> {
            self.request().await;
            Ok(())
        }
    }

    fn keys(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{i:02}.json")).collect()
    }

    #[tokio::test]
    async fn fetch_respects_concurrency_bound() {
        let store = SlowStore::default();
        let report = fetch_batches(&store, BUCKET, keys(12), 3).await;

        assert_eq!(report.consumed_keys.len(), 12);
        let peak = store.peak.load(Ordering::SeqCst);
        assert!(peak > 1, "requests never overlapped");
        assert!(peak <= 3, "peak {peak} exceeds the bound");
    }

    #[tokio::test]
    async fn delete_respects_concurrency_bound() {
        let store = SlowStore::default();
        let outcomes = delete_objects(&store, BUCKET, keys(12), 3).await;

        assert!(outcomes.iter().all(|(_, outcome)| outcome.is_ok()));
        let peak = store.peak.load(Ordering::SeqCst);
        assert!(peak > 1, "requests never overlapped");
        assert!(peak <= 3, "peak {peak} exceeds the bound");
    }
}
