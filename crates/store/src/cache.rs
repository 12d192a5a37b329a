//! Application cache: one slot per cached resource family.

use fleetview_core::{Transform, Uid};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chunk::PageChunk;
use crate::compress::Compressed;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheKey {
    /// Hub Applications that are not owned by an ApplicationSet.
    LocalArgoApps,
    AppSets,
    /// Flat Applications found through search on managed clusters.
    RemoteArgoApps,
}

impl CacheKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKey::LocalArgoApps => "localArgoApps",
            CacheKey::AppSets => "appset",
            CacheKey::RemoteArgoApps => "remoteArgoApps",
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub compressed: Compressed,
    pub transform: Transform,
}

pub type ResourceUidMap = FxHashMap<Uid, CacheEntry>;

#[derive(Debug, Default)]
pub struct CacheSlot {
    /// Flat list, used by slots fed from search.
    pub resources: Option<Vec<CacheEntry>>,
    /// Uid-keyed entries, used by slots fed from watches.
    pub resource_uid_map: Option<ResourceUidMap>,
    /// Chunks received so far for the search sequence in flight.
    pending: Option<Vec<CacheEntry>>,
}

#[derive(Debug, Default)]
pub struct ApplicationCache {
    slots: FxHashMap<CacheKey, CacheSlot>,
}

impl ApplicationCache {
    pub fn new() -> Self { Self::default() }

    pub fn slot(&self, key: CacheKey) -> Option<&CacheSlot> { self.slots.get(&key) }

    pub fn slot_mut(&mut self, key: CacheKey) -> &mut CacheSlot { self.slots.entry(key).or_default() }

    pub fn resource_uid_map(&self, key: CacheKey) -> Option<&ResourceUidMap> {
        self.slot(key).and_then(|s| s.resource_uid_map.as_ref())
    }

    /// Uid map for `key`, created on first use. Creating it drops the flat `resources` list.
    pub fn resource_uid_map_mut(&mut self, key: CacheKey) -> &mut ResourceUidMap {
        let slot = self.slot_mut(key);
        if slot.resource_uid_map.is_none() {
            slot.resources = None;
        }
        slot.resource_uid_map.get_or_insert_with(ResourceUidMap::default)
    }

    pub fn resources(&self, key: CacheKey) -> &[CacheEntry] {
        self.slot(key).and_then(|s| s.resources.as_deref()).unwrap_or(&[])
    }

    /// Number of cached entries for `key`, whichever shape the slot has.
    pub fn resource_count(&self, key: CacheKey) -> usize {
        match self.slot(key) {
            Some(slot) => slot.resource_uid_map.as_ref().map(|m| m.len()).unwrap_or(0)
                + slot.resources.as_ref().map(|r| r.len()).unwrap_or(0),
            None => 0,
        }
    }
}

/// Store a batch of search results. Unchunked batches replace the slot outright;
/// chunked ones are collected and swapped in when the last chunk lands.
pub fn cache_remote_apps(cache: &mut ApplicationCache, entries: Vec<CacheEntry>, chunk: Option<&PageChunk>, key: CacheKey) {
    let slot = cache.slot_mut(key);
    match chunk {
        None => {
            debug!(key = %key, count = entries.len(), "remote apps cached");
            slot.pending = None;
            slot.resources = Some(entries);
        }
        Some(chunk) => {
            if chunk.is_first() {
                slot.pending = Some(Vec::new());
            }
            let pending = slot.pending.get_or_insert_with(Vec::new);
            pending.extend(entries);
            debug!(key = %key, chunk = chunk.index, total = chunk.total, collected = pending.len(), "remote chunk cached");
            if chunk.is_last() {
                slot.resources = slot.pending.take();
            }
        }
    }
    let (count, label) = (cache.resource_count(key) as f64, key.as_str());
    metrics::gauge!("cache_resources", count, "key" => label);
}
