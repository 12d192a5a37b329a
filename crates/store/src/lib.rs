//! Fleetview store: application cache, compression and pass bookkeeping.

#![forbid(unsafe_code)]

pub mod cache;
pub mod chunk;
pub mod compress;
pub mod generation;
pub mod sweep;

pub use cache::{cache_remote_apps, ApplicationCache, CacheEntry, CacheKey, CacheSlot, ResourceUidMap};
pub use chunk::{ChunkCursor, PageChunk};
pub use compress::{deflate_resource, inflate_resource, Compressed, Compressor, ZstdCompressor};
pub use generation::{GenerationReader, Generational, Published};
pub use sweep::{PassState, SweepTracker};
