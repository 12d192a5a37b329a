//! Mark-and-sweep bookkeeping for polled resource passes.
//!
//! A pass starts with the first batch for a key: every uid already cached is a
//! stale candidate. Each item seen in the pass is touched. When the pass ends,
//! whatever was never touched is deleted.

use fleetview_core::Uid;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::cache::{CacheKey, ResourceUidMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Idle,
    InPass,
}

#[derive(Debug, Default)]
pub struct SweepTracker {
    stale: FxHashMap<CacheKey, FxHashSet<Uid>>,
}

impl SweepTracker {
    pub fn new() -> Self { Self::default() }

    pub fn state(&self, key: CacheKey) -> PassState {
        if self.stale.contains_key(&key) { PassState::InPass } else { PassState::Idle }
    }

    /// Start a pass for `key` if none is running. Returns true when a new pass began.
    pub fn begin(&mut self, key: CacheKey, existing: &ResourceUidMap) -> bool {
        if self.stale.contains_key(&key) {
            return false;
        }
        self.stale.insert(key, existing.keys().cloned().collect());
        debug!(key = %key, candidates = existing.len(), "pass started");
        true
    }

    pub fn touch(&mut self, key: CacheKey, uid: &str) {
        if let Some(set) = self.stale.get_mut(&key) {
            set.remove(uid);
        }
    }

    /// Uids that would be removed if the pass ended now.
    pub fn stale_candidates(&self, key: CacheKey) -> usize {
        self.stale.get(&key).map_or(0, |s| s.len())
    }

    /// End the pass for `key`, deleting untouched uids from `map`. Returns how many were removed.
    pub fn sweep(&mut self, key: CacheKey, map: &mut ResourceUidMap) -> usize {
        let Some(stale) = self.stale.remove(&key) else { return 0 };
        let mut removed = 0usize;
        for uid in stale {
            if map.remove(&uid).is_some() {
                removed += 1;
            }
        }
        debug!(key = %key, removed, remaining = map.len(), "pass swept");
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheEntry;
    use crate::compress::{deflate_resource, ZstdCompressor};
    use fleetview_core::{AppType, Transform};

    fn map_of(uids: &[&str]) -> ResourceUidMap {
        let c = ZstdCompressor::default();
        uids.iter()
            .map(|u| {
                let e = CacheEntry {
                    compressed: deflate_resource(&c, u).unwrap(),
                    transform: Transform { app_type: AppType::Argo, clusters: smallvec::SmallVec::new() },
                };
                (u.to_string(), e)
            })
            .collect()
    }

    #[test]
    fn begin_is_idempotent_within_a_pass() {
        let mut t = SweepTracker::new();
        let map = map_of(&["a"]);
        assert_eq!(t.state(CacheKey::LocalArgoApps), PassState::Idle);
        assert!(t.begin(CacheKey::LocalArgoApps, &map));
        assert!(!t.begin(CacheKey::LocalArgoApps, &map_of(&["a", "b"])));
        assert_eq!(t.stale_candidates(CacheKey::LocalArgoApps), 1);
        assert_eq!(t.state(CacheKey::LocalArgoApps), PassState::InPass);
    }

    #[test]
    fn keys_do_not_interfere() {
        let mut t = SweepTracker::new();
        let mut apps = map_of(&["a1", "a2"]);
        let sets = map_of(&["s1"]);
        t.begin(CacheKey::LocalArgoApps, &apps);
        t.begin(CacheKey::AppSets, &sets);
        t.touch(CacheKey::LocalArgoApps, "a1");
        assert_eq!(t.sweep(CacheKey::LocalArgoApps, &mut apps), 1);
        assert_eq!(t.state(CacheKey::LocalArgoApps), PassState::Idle);
        assert_eq!(t.state(CacheKey::AppSets), PassState::InPass);
        assert_eq!(t.stale_candidates(CacheKey::AppSets), 1);
    }

    #[test]
    fn sweep_without_pass_is_noop() {
        let mut t = SweepTracker::new();
        let mut map = map_of(&["a"]);
        assert_eq!(t.sweep(CacheKey::AppSets, &mut map), 0);
        assert_eq!(map.len(), 1);
    }
}
