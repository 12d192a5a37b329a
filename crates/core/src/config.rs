//! Aggregator configuration: defaults overridable from the environment.

use serde::{Deserialize, Serialize};

/// Per-request result cap for remote application searches.
pub const SEARCH_QUERY_LIMIT: usize = 1000;
pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AggConfig {
    pub search_limit: usize,
    pub zstd_level: i32,
}

impl Default for AggConfig {
    fn default() -> Self {
        Self { search_limit: SEARCH_QUERY_LIMIT, zstd_level: DEFAULT_ZSTD_LEVEL }
    }
}

impl AggConfig {
    /// Read `FLEETVIEW_SEARCH_LIMIT` and `FLEETVIEW_ZSTD_LEVEL`; unset or unparsable values keep defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        let search_limit = get("FLEETVIEW_SEARCH_LIMIT")
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(d.search_limit);
        let zstd_level = get("FLEETVIEW_ZSTD_LEVEL").and_then(|s| s.parse().ok()).unwrap_or(d.zstd_level);
        Self { search_limit, zstd_level }
    }
}
