//! Published snapshot documents.

use crate::activity::{public_export, recent_feed, PublicClaim, RecentRow};
use crate::claim::Claim;
use crate::ranking::{rank, Granularity, LeaderboardRow, Window};
use serde::Serialize;
use std::collections::BTreeMap;

/// Object key of the leaderboard snapshot.
pub const UNIFIED_STATE_KEY: &str = "unified-state.json";

/// Object key of the public claim export.
pub const CLAIMS_EXPORT_KEY: &str = "claims.json";

/// Every leaderboard (granularity × window) plus the recent feed.
///
/// Serializes as
/// `{"colo": {"hourly": [...], ...}, "region": {...}, "country": {...}, "recents": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnifiedState {
    #[serde(flatten)]
    pub leaderboards: BTreeMap<&'static str, BTreeMap<&'static str, Vec<LeaderboardRow>>>,
    pub recents: Vec<RecentRow>,
}

impl UnifiedState {
    /// Compute all views from one point-in-time set of claims.
    pub fn compute(claims: &[Claim], now_ms: i64) -> Self {
        let mut leaderboards = BTreeMap::new();
        for granularity in Granularity::ALL {
            let by_window: BTreeMap<&'static str, Vec<LeaderboardRow>> = Window::ALL
                .into_iter()
                .map(|window| (window.label(), rank(claims, granularity, window, now_ms)))
                .collect();
            leaderboards.insert(granularity.label(), by_window);
        }

        Self {
            leaderboards,
            recents: recent_feed(claims, now_ms),
        }
    }

    /// Leaderboard for one granularity and window.
    pub fn leaderboard(&self, granularity: Granularity, window: Window) -> &[LeaderboardRow] {
        self.leaderboards
            .get(granularity.label())
            .and_then(|windows| windows.get(window.label()))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// The full historical export, published when a cycle ingested claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimsExport {
    pub claims: Vec<PublicClaim>,
    /// Epoch seconds at which the export was taken.
    pub query_timestamp: i64,
}

impl ClaimsExport {
    pub fn new(claims: &[Claim], query_timestamp: i64) -> Self {
        Self {
            claims: public_export(claims),
            query_timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::HOUR_MS;

    const NOW: i64 = 1_700_000_000_000;

    fn sample() -> Vec<Claim> {
        vec![
            Claim::new("203.0.113.7", "A", NOW - 10)
                .with_pop("SJC")
                .with_country("US")
                .with_region("California"),
            Claim::new("203.0.113.8", "B", NOW - 2 * HOUR_MS)
                .with_pop("LHR")
                .with_country("GB"),
        ]
    }

    #[test]
    fn unified_state_has_every_view() {
        let state = UnifiedState::compute(&sample(), NOW);
        let json = serde_json::to_value(&state).unwrap();

        for granularity in ["colo", "region", "country"] {
            for window in ["hourly", "daily", "weekly", "monthly", "all-time"] {
                assert!(json[granularity][window].is_array(), "{granularity}/{window}");
            }
        }
        assert_eq!(json["recents"].as_array().unwrap().len(), 2);
        assert_eq!(json["recents"][0]["ip"], "203.x.x.x");
    }

    #[test]
    fn leaderboards_respect_windows() {
        let state = UnifiedState::compute(&sample(), NOW);
        assert_eq!(state.leaderboard(Granularity::Country, Window::Hourly).len(), 1);
        assert_eq!(state.leaderboard(Granularity::Country, Window::Daily).len(), 2);
        assert_eq!(state.leaderboard(Granularity::Region, Window::AllTime).len(), 1);
    }

    #[test]
    fn no_addresses_in_leaderboards_or_export() {
        let claims = sample();
        let state = serde_json::to_string(&UnifiedState::compute(&claims, NOW)).unwrap();
        let (leaderboards, _) = state.split_once("\"recents\"").unwrap();
        assert!(!leaderboards.contains("203.0.113"));

        let export = serde_json::to_value(ClaimsExport::new(&claims, NOW / 1000)).unwrap();
        assert!(!export.to_string().contains("203.0.113"));
        assert_eq!(export["query_timestamp"], NOW / 1000);
        assert_eq!(export["claims"].as_array().unwrap().len(), 2);
    }
}
