//! Page chunking for remote application searches.
//!
//! A search for all Argo applications is capped at the configured limit. Once a
//! result hits that cap, the next searches are split by application name prefix
//! so that each request stays under the limit.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cache::{ApplicationCache, CacheKey};

/// Name prefixes per chunk. Kubernetes names start with `[a-z0-9]`.
const CHUNK_PREFIXES: &[&str] = &["abcd", "efgh", "ijkl", "mnop", "qrst", "uvwxyz", "0123456789"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageChunk {
    pub index: usize,
    pub total: usize,
    /// Name filter values (wildcard prefixes) for this chunk.
    pub keys: Vec<String>,
}

impl PageChunk {
    pub fn is_first(&self) -> bool { self.index == 0 }
    pub fn is_last(&self) -> bool { self.index + 1 >= self.total }
}

fn plan_chunks() -> VecDeque<PageChunk> {
    let total = CHUNK_PREFIXES.len();
    CHUNK_PREFIXES
        .iter()
        .enumerate()
        .map(|(index, chars)| PageChunk {
            index,
            total,
            keys: chars.chars().map(|c| format!("{}*", c)).collect(),
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct ChunkCursor {
    pending: VecDeque<PageChunk>,
    current: Option<PageChunk>,
}

impl ChunkCursor {
    pub fn new() -> Self { Self::default() }

    /// Move to the next request. With no chunks left, a new chunked sequence is
    /// planned when the cached result count for `key` reached `limit`; otherwise
    /// the next request is unchunked.
    pub fn advance(&mut self, cache: &ApplicationCache, key: CacheKey, limit: usize) -> Option<&PageChunk> {
        if self.pending.is_empty() {
            let cached = cache.resource_count(key);
            if cached >= limit {
                if self.current.is_none() {
                    info!(key = %key, cached, limit, "search limit reached; switching to chunked search");
                }
                self.pending = plan_chunks();
            } else if self.current.is_some() {
                info!(key = %key, cached, limit, "results under limit; leaving chunked search");
            }
        }
        self.current = self.pending.pop_front();
        self.current.as_ref()
    }

    pub fn current(&self) -> Option<&PageChunk> { self.current.as_ref() }

    /// Chunks still to be requested after the current one.
    pub fn remaining(&self) -> usize { self.pending.len() }

    /// True when results for the current request begin a new sequence.
    pub fn starts_sequence(&self) -> bool { self.current.as_ref().map_or(true, PageChunk::is_first) }
}
