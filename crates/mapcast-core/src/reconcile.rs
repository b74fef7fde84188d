//! Anti-flapping merge of incoming claims into the claim table.
//!
//! An incoming claim only replaces the stored one when it is strictly newer.
//! A change of owner is adopted on any newer timestamp; a re-claim by the
//! current owner must be more than [`HYSTERESIS_MS`] newer, so heartbeats do
//! not churn the stored row.

use crate::claim::Claim;
use std::collections::BTreeMap;
use std::convert::Infallible;

/// Minimum gap before a same-owner re-claim advances the stored claim (15 min).
pub const HYSTERESIS_MS: i64 = 900_000;

/// Outcome of folding one incoming record into the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// No prior claim for the address; the record becomes the claim.
    Inserted,
    /// The record replaces the stored claim wholesale.
    Replaced,
    /// The stored claim is kept unchanged.
    Rejected,
}

impl Decision {
    pub fn accepted(self) -> bool {
        !matches!(self, Decision::Rejected)
    }
}

/// Decide whether `incoming` wins against `existing`.
pub fn decide(existing: Option<&Claim>, incoming: &Claim) -> Decision {
    let Some(existing) = existing else {
        return Decision::Inserted;
    };

    let gap = incoming.claimed_at_ms.saturating_sub(existing.claimed_at_ms);
    if gap <= 0 {
        return Decision::Rejected;
    }

    if incoming.claimant_name != existing.claimant_name || gap > HYSTERESIS_MS {
        Decision::Replaced
    } else {
        Decision::Rejected
    }
}

/// Merge one incoming claim against the stored one and return the winner.
pub fn reconcile(existing: Option<Claim>, incoming: Claim) -> Claim {
    match existing {
        Some(existing) if !decide(Some(&existing), &incoming).accepted() => existing,
        _ => incoming,
    }
}

/// Keyed claim table the reconciler folds batches into.
pub trait ClaimTable {
    type Error;

    /// Look up the stored claim for an address.
    fn get(&self, address: &str) -> Result<Option<Claim>, Self::Error>;

    /// Insert or replace the claim keyed by its address.
    /// Returns true if an existing row was replaced.
    fn upsert(&mut self, claim: Claim) -> Result<bool, Self::Error>;
}

impl ClaimTable for BTreeMap<String, Claim> {
    type Error = Infallible;

    fn get(&self, address: &str) -> Result<Option<Claim>, Infallible> {
        Ok(BTreeMap::get(self, address).cloned())
    }

    fn upsert(&mut self, claim: Claim) -> Result<bool, Infallible> {
        Ok(self.insert(claim.address.clone(), claim).is_some())
    }
}

/// Counts from applying one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Records folded.
    pub records: usize,
    /// Distinct addresses seen in the batch.
    pub addresses: usize,
    /// Records that created a new claim.
    pub inserted: usize,
    /// Records that replaced a stored (or earlier in-batch) claim.
    pub replaced: usize,
    /// Records the merge rule turned away.
    pub rejected: usize,
    /// Rows written back to the table.
    pub written: usize,
    /// Written rows that overwrote a row already in the table.
    pub overwritten: usize,
}

/// Fold a batch of records into `table`.
///
/// Records are grouped per address and sorted by claim time before folding,
/// so the stored result does not depend on arrival order. Records with equal
/// timestamps are ordered by their remaining fields. At most one row is
/// written per address, and only when the stored claim changed.
pub fn apply_batch<T: ClaimTable>(
    table: &mut T,
    records: impl IntoIterator<Item = Claim>,
) -> Result<ReconcileSummary, T::Error> {
    let mut by_address: BTreeMap<String, Vec<Claim>> = BTreeMap::new();
    let mut summary = ReconcileSummary::default();
    for record in records {
        summary.records += 1;
        by_address.entry(record.address.clone()).or_default().push(record);
    }
    summary.addresses = by_address.len();

    for (address, mut group) in by_address {
        group.sort_by(|a, b| a.claimed_at_ms.cmp(&b.claimed_at_ms).then_with(|| a.cmp(b)));

        let mut current = table.get(&address)?;
        let mut changed = false;
        for record in group {
            match decide(current.as_ref(), &record) {
                Decision::Inserted => summary.inserted += 1,
                Decision::Replaced => summary.replaced += 1,
                Decision::Rejected => {
                    summary.rejected += 1;
                    continue;
                }
            }
            current = Some(record);
            changed = true;
        }

        if let (true, Some(winner)) = (changed, current) {
            if table.upsert(winner)? {
                summary.overwritten += 1;
            }
            summary.written += 1;
        }
    }

    Ok(summary)
}
