//! Territorial dominance ranking.
//!
//! For one territory granularity and time window, every territory value is
//! awarded to the claimant holding the most addresses there (ties go to the
//! most recent claim, then to the smaller name). Winners are then rolled up
//! per claimant into leaderboard rows.

use crate::claim::Claim;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const HOUR_MS: i64 = 60 * 60 * 1000;
pub const DAY_MS: i64 = 24 * HOUR_MS;
pub const WEEK_MS: i64 = 7 * DAY_MS;
pub const MONTH_MS: i64 = 30 * DAY_MS;

/// Territory attribute claimants compete over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Granularity {
    /// Point-of-presence (`colo` on the wire).
    Pop,
    Region,
    Country,
}

impl Granularity {
    pub const ALL: [Granularity; 3] = [Granularity::Pop, Granularity::Region, Granularity::Country];

    pub fn label(self) -> &'static str {
        match self {
            Granularity::Pop => "colo",
            Granularity::Region => "region",
            Granularity::Country => "country",
        }
    }

    /// The claim's territory value at this granularity.
    pub fn territory_of(self, claim: &Claim) -> Option<&str> {
        match self {
            Granularity::Pop => claim.pop.as_deref(),
            Granularity::Region => claim.region.as_deref(),
            Granularity::Country => claim.country.as_deref(),
        }
    }
}

/// Time range over which claims count towards a ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Window {
    Hourly,
    Daily,
    Weekly,
    Monthly,
    AllTime,
}

impl Window {
    pub const ALL: [Window; 5] = [
        Window::Hourly,
        Window::Daily,
        Window::Weekly,
        Window::Monthly,
        Window::AllTime,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Window::Hourly => "hourly",
            Window::Daily => "daily",
            Window::Weekly => "weekly",
            Window::Monthly => "monthly",
            Window::AllTime => "all-time",
        }
    }

    /// Window length, or `None` for the unbounded window.
    pub fn duration_ms(self) -> Option<i64> {
        match self {
            Window::Hourly => Some(HOUR_MS),
            Window::Daily => Some(DAY_MS),
            Window::Weekly => Some(WEEK_MS),
            Window::Monthly => Some(MONTH_MS),
            Window::AllTime => None,
        }
    }

    /// Whether a claim made at `claimed_at_ms` falls inside the window ending at `now_ms`.
    pub fn contains(self, claimed_at_ms: i64, now_ms: i64) -> bool {
        match self.duration_ms() {
            Some(length) => claimed_at_ms > now_ms.saturating_sub(length),
            None => true,
        }
    }
}

/// Unknown granularity or window label.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} label: {label}")]
pub struct ParseLabelError {
    kind: &'static str,
    label: String,
}

impl FromStr for Granularity {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Granularity::ALL
            .into_iter()
            .find(|g| g.label() == s)
            .ok_or_else(|| ParseLabelError {
                kind: "granularity",
                label: s.to_string(),
            })
    }
}

impl FromStr for Window {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Window::ALL
            .into_iter()
            .find(|w| w.label() == s)
            .ok_or_else(|| ParseLabelError {
                kind: "window",
                label: s.to_string(),
            })
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One claimant's standing for a granularity and window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardRow {
    /// Claimant name.
    pub name: String,

    /// Territories won, ascending. Published as one comma-joined string.
    #[serde(serialize_with = "serialize_joined")]
    pub territories: Vec<String>,

    /// Distinct addresses backing the won territories.
    pub ip_count: u64,

    /// Most recent claim time among the won territories.
    pub latest: i64,

    /// Number of territories won.
    pub score: u64,
}

fn serialize_joined<S: Serializer>(territories: &[String], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&territories.join(","))
}

/// Addresses one claimant holds in one territory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Holding {
    address_count: u64,
    latest: i64,
}

impl Holding {
    /// Dominance order: more addresses, then more recent.
    fn dominance(&self, other: &Holding) -> Ordering {
        self.address_count
            .cmp(&other.address_count)
            .then(self.latest.cmp(&other.latest))
    }
}

/// Rank claimants by territories dominated.
///
/// The store keeps one claim per address, so every claim counts as one
/// distinct address.
pub fn rank<'a>(
    claims: impl IntoIterator<Item = &'a Claim>,
    granularity: Granularity,
    window: Window,
    now_ms: i64,
) -> Vec<LeaderboardRow> {
    // territory -> claimant -> holding
    let mut holdings: BTreeMap<&str, BTreeMap<&str, Holding>> = BTreeMap::new();
    let mut seen: BTreeSet<&str> = BTreeSet::new();

    for claim in claims {
        let Some(territory) = granularity.territory_of(claim) else {
            continue;
        };
        if !window.contains(claim.claimed_at_ms, now_ms) || !seen.insert(claim.address.as_str()) {
            continue;
        }

        let holding = holdings
            .entry(territory)
            .or_default()
            .entry(claim.claimant_name.as_str())
            .or_insert(Holding {
                address_count: 0,
                latest: i64::MIN,
            });
        holding.address_count += 1;
        holding.latest = holding.latest.max(claim.claimed_at_ms);
    }

    let mut rows: BTreeMap<&str, LeaderboardRow> = BTreeMap::new();
    for (territory, claimants) in holdings {
        // Claimants iterate in name order; only a strictly better holding
        // displaces the current winner.
        let mut winner: Option<(&str, Holding)> = None;
        for (name, holding) in claimants {
            match winner {
                Some((_, best)) if holding.dominance(&best) != Ordering::Greater => {}
                _ => winner = Some((name, holding)),
            }
        }
        let Some((name, holding)) = winner else {
            continue;
        };

        let row = rows.entry(name).or_insert_with(|| LeaderboardRow {
            name: name.to_string(),
            territories: Vec::new(),
            ip_count: 0,
            latest: i64::MIN,
            score: 0,
        });
        row.territories.push(territory.to_string());
        row.ip_count += holding.address_count;
        row.latest = row.latest.max(holding.latest);
        row.score += 1;
    }

    let mut rows: Vec<LeaderboardRow> = rows.into_values().collect();
    rows.sort_by(compare_rows);
    rows
}

/// Leaderboard order: score, then addresses, then recency, all descending.
fn compare_rows(a: &LeaderboardRow, b: &LeaderboardRow) -> Ordering {
    b.score
        .cmp(&a.score)
        .then(b.ip_count.cmp(&a.ip_count))
        .then(b.latest.cmp(&a.latest))
        .then_with(|| a.name.cmp(&b.name))
}
