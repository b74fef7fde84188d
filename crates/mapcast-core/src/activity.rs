//! Read-only activity projections: the recent-claims feed and the public
//! claim export.

use crate::claim::Claim;
use crate::ranking::DAY_MS;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;

/// How far back the recent feed looks.
pub const RECENT_WINDOW_MS: i64 = DAY_MS;

/// Maximum rows in the recent feed.
pub const RECENT_LIMIT: usize = 100;

/// A row of the recent-claims feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecentRow {
    pub name: String,
    pub country: Option<String>,
    pub region: Option<String>,
    pub colo: Option<String>,
    pub time_ms: i64,
    /// Address, redacted when it is IPv4.
    pub ip: String,
}

/// The newest claims of the last day, newest first, with IPv4 addresses
/// reduced to their first octet.
pub fn recent_feed<'a>(claims: impl IntoIterator<Item = &'a Claim>, now_ms: i64) -> Vec<RecentRow> {
    let cutoff = now_ms.saturating_sub(RECENT_WINDOW_MS);
    let mut recent: Vec<&Claim> = claims
        .into_iter()
        .filter(|c| c.claimed_at_ms > cutoff)
        .collect();
    recent.sort_by(|a, b| newest_first(a, b));
    recent.truncate(RECENT_LIMIT);

    recent
        .into_iter()
        .map(|c| RecentRow {
            name: c.claimant_name.clone(),
            country: c.country.clone(),
            region: c.region.clone(),
            colo: c.pop.clone(),
            time_ms: c.claimed_at_ms,
            ip: redact_address(&c.address),
        })
        .collect()
}

fn newest_first(a: &Claim, b: &Claim) -> Ordering {
    b.claimed_at_ms
        .cmp(&a.claimed_at_ms)
        .then_with(|| a.address.cmp(&b.address))
}

/// Mask the last three octets of a dotted-quad address (`1.2.3.4` → `1.x.x.x`).
/// Any other address form is returned unchanged.
pub fn redact_address(address: &str) -> String {
    let octets: Vec<&str> = address.split('.').collect();
    let dotted_quad = octets.len() == 4
        && octets
            .iter()
            .all(|o| (1..=3).contains(&o.len()) && o.bytes().all(|b| b.is_ascii_digit()));

    if dotted_quad {
        format!("{}.x.x.x", octets[0])
    } else {
        address.to_string()
    }
}

/// A claim as published in the public export: everything except the address.
///
/// Serialized positionally as
/// `[name, country, region, colo, time_ms, asn, metro, city]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicClaim {
    pub name: String,
    pub country: Option<String>,
    pub region: Option<String>,
    pub colo: Option<String>,
    pub time_ms: i64,
    pub asn: Option<i64>,
    pub metro: Option<String>,
    pub city: Option<String>,
}

impl From<&Claim> for PublicClaim {
    fn from(claim: &Claim) -> Self {
        Self {
            name: claim.claimant_name.clone(),
            country: claim.country.clone(),
            region: claim.region.clone(),
            colo: claim.pop.clone(),
            time_ms: claim.claimed_at_ms,
            asn: claim.asn,
            metro: claim.metro.clone(),
            city: claim.city.clone(),
        }
    }
}

impl Serialize for PublicClaim {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (
            &self.name,
            &self.country,
            &self.region,
            &self.colo,
            self.time_ms,
            self.asn,
            &self.metro,
            &self.city,
        )
            .serialize(serializer)
    }
}

/// Every stored claim without its address, newest first.
pub fn public_export<'a>(claims: impl IntoIterator<Item = &'a Claim>) -> Vec<PublicClaim> {
    let mut all: Vec<&Claim> = claims.into_iter().collect();
    all.sort_by(|a, b| newest_first(a, b));
    all.into_iter().map(PublicClaim::from).collect()
}
