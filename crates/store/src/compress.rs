//! Compressed resource payloads.

use fleetview_core::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Opaque compressed serialization of a cached resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compressed(Vec<u8>);

impl Compressed {
    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    pub fn as_bytes(&self) -> &[u8] { &self.0 }
}

pub trait Compressor: Send + Sync {
    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>>;
    fn decompress(&self, blob: &[u8]) -> Result<Vec<u8>>;
}

/// zstd when the `zstd` feature is on, otherwise plain bytes.
#[derive(Debug, Clone, Copy)]
pub struct ZstdCompressor {
    #[cfg_attr(not(feature = "zstd"), allow(dead_code))]
    level: i32,
}

impl ZstdCompressor {
    pub fn new(level: i32) -> Self { Self { level } }
}

impl Default for ZstdCompressor {
    fn default() -> Self { Self::new(fleetview_core::config::DEFAULT_ZSTD_LEVEL) }
}

impl Compressor for ZstdCompressor {
    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        #[cfg(feature = "zstd")]
        {
            return Ok(zstd::encode_all(bytes, self.level)?);
        }
        #[cfg(not(feature = "zstd"))]
        Ok(bytes.to_vec())
    }

    fn decompress(&self, blob: &[u8]) -> Result<Vec<u8>> {
        #[cfg(feature = "zstd")]
        {
            return Ok(zstd::decode_all(std::io::Cursor::new(blob))?);
        }
        #[cfg(not(feature = "zstd"))]
        Ok(blob.to_vec())
    }
}

pub fn deflate_resource<T: Serialize>(compressor: &dyn Compressor, resource: &T) -> Result<Compressed> {
    let json = serde_json::to_vec(resource)?;
    let blob = compressor.compress(&json)?;
    metrics::histogram!("cache_compressed_bytes", blob.len() as f64);
    Ok(Compressed(blob))
}

pub fn inflate_resource<T: DeserializeOwned>(compressor: &dyn Compressor, blob: &Compressed) -> Result<T> {
    let json = compressor.decompress(&blob.0)?;
    Ok(serde_json::from_slice(&json)?)
}
