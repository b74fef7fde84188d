//! Persistent claim storage using RocksDB.

use crate::error::{Error, Result};
use mapcast_core::{Claim, ClaimTable, ReconcileSummary};
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use std::collections::HashMap;
use std::path::Path;

const CLAIM_PREFIX: &str = "claim:";

fn claim_key(address: &str) -> String {
    format!("{CLAIM_PREFIX}{address}")
}

/// Storage backend for claims: one row per address.
pub struct Storage {
    db: DB,
}

impl Storage {
    /// Open or create storage at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(Self { db })
    }

    /// Open existing storage without taking the write lock.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let opts = Options::default();
        let db = DB::open_for_read_only(&opts, path, false)?;
        Ok(Self { db })
    }

    /// Get the claim for an address.
    pub fn get_claim(&self, address: &str) -> Result<Option<Claim>> {
        match self.db.get(claim_key(address).as_bytes())? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    /// Number of stored claims.
    pub fn claim_count(&self) -> Result<usize> {
        let prefix = CLAIM_PREFIX.as_bytes();
        let mut count = 0;
        for item in self.db.prefix_iterator(prefix) {
            let (key, _) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            count += 1;
        }
        Ok(count)
    }

    /// Reconcile a batch of incoming claims into the table.
    ///
    /// All accepted rows are written in one atomic `WriteBatch`; if anything
    /// fails nothing from the batch is visible.
    pub fn apply_batch(&self, records: Vec<Claim>) -> Result<ReconcileSummary> {
        let mut staged = StagedClaims {
            db: &self.db,
            pending: HashMap::new(),
            batch: WriteBatch::default(),
        };
        let summary = mapcast_core::apply_batch(&mut staged, records)?;
        self.db.write(staged.batch)?;
        Ok(summary)
    }

    /// All claims as of one RocksDB snapshot.
    pub fn snapshot_claims(&self) -> Result<Vec<Claim>> {
        let snapshot = self.db.snapshot();
        let prefix = CLAIM_PREFIX.as_bytes();
        let mut claims = Vec::new();

        for item in snapshot.iterator(IteratorMode::From(prefix, Direction::Forward)) {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            claims.push(serde_json::from_slice(&value)?);
        }

        Ok(claims)
    }
}

/// Claim table view over the DB that buffers writes for one atomic commit.
struct StagedClaims<'a> {
    db: &'a DB,
    pending: HashMap<String, Claim>,
    batch: WriteBatch,
}

impl ClaimTable for StagedClaims<'_> {
    type Error = Error;

    fn get(&self, address: &str) -> Result<Option<Claim>> {
        if let Some(claim) = self.pending.get(address) {
            return Ok(Some(claim.clone()));
        }
        match self.db.get(claim_key(address).as_bytes())? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    fn upsert(&mut self, claim: Claim) -> Result<bool> {
        let key = claim_key(&claim.address);
        let existed =
            self.pending.contains_key(&claim.address) || self.db.get_pinned(key.as_bytes())?.is_some();
        let value = serde_json::to_vec(&claim)?;
        self.batch.put(key.as_bytes(), value);
        self.pending.insert(claim.address.clone(), claim);
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapcast_core::HYSTERESIS_MS;
    use tempfile::tempdir;

    fn claim(address: &str, name: &str, at: i64) -> Claim {
        Claim::new(address, name, at).with_country("US")
    }

    #[test]
    fn apply_batch_roundtrip() {
        let dir = tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();

        let summary = storage
            .apply_batch(vec![claim("1.1.1.1", "A", 1000), claim("2.2.2.2", "B", 2000)])
            .unwrap();
        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.written, 2);
        assert_eq!(summary.overwritten, 0);

        let loaded = storage.get_claim("1.1.1.1").unwrap().unwrap();
        assert_eq!(loaded, claim("1.1.1.1", "A", 1000));
        assert!(storage.get_claim("3.3.3.3").unwrap().is_none());
        assert_eq!(storage.claim_count().unwrap(), 2);
    }

    #[test]
    fn merge_rule_applies_against_stored_rows() {
        let dir = tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        storage.apply_batch(vec![claim("1.1.1.1", "A", 1000)]).unwrap();

        let summary = storage
            .apply_batch(vec![claim("1.1.1.1", "A", 1000 + HYSTERESIS_MS)])
            .unwrap();
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.written, 0);
        assert_eq!(storage.get_claim("1.1.1.1").unwrap().unwrap().claimed_at_ms, 1000);

        let summary = storage.apply_batch(vec![claim("1.1.1.1", "B", 1001)]).unwrap();
        assert_eq!(summary.replaced, 1);
        assert_eq!(summary.overwritten, 1);
        assert_eq!(storage.get_claim("1.1.1.1").unwrap().unwrap().claimant_name, "B");
    }

    #[test]
    fn claims_persist_across_reopen() {
        let dir = tempdir().unwrap();
        {
            let storage = Storage::open(dir.path()).unwrap();
            storage.apply_batch(vec![claim("1.1.1.1", "A", 1000)]).unwrap();
        }

        let storage = Storage::open(dir.path()).unwrap();
        assert_eq!(storage.snapshot_claims().unwrap(), vec![claim("1.1.1.1", "A", 1000)]);
    }

    #[test]
    fn snapshot_lists_every_claim() {
        let dir = tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        storage
            .apply_batch(vec![
                claim("1.1.1.1", "A", 1000),
                claim("2.2.2.2", "B", 2000),
                claim("2001:db8::", "C", 3000),
            ])
            .unwrap();

        let snapshot = storage.snapshot_claims().unwrap();
        assert_eq!(storage.claim_count().unwrap(), 3);
        let addresses: Vec<&str> = snapshot.iter().map(|c| c.address.as_str()).collect();
        assert_eq!(addresses, vec!["1.1.1.1", "2.2.2.2", "2001:db8::"]);
    }

    #[test]
    fn read_only_open_sees_committed_claims() {
        let dir = tempdir().unwrap();
        {
            let storage = Storage::open(dir.path()).unwrap();
            storage.apply_batch(vec![claim("1.1.1.1", "A", 1000)]).unwrap();
        }

        let reader = Storage::open_read_only(dir.path()).unwrap();
        assert_eq!(reader.claim_count().unwrap(), 1);
    }
}
