//! # Forecast Result Cache
//!
//! Computed forecast results are cached per location so that repeated status
//! requests within the TTL do not hit the tide provider again.
//!
//! ## Key Scheme
//! Keys are versioned (`tides:location:<id>:v1`) so that a change to the
//! cached payload's shape can ship without reading stale entries.
//!
//! ## Backends
//! - [`MemoryCache`]: process-local map with per-entry expiry
//! - [`FileCache`]: one JSON envelope per key on disk, expiry stored inside
//!   the envelope so it survives restarts
//!
//! Stores deal in opaque strings; (de)serialization of the payload and
//! recovery from corrupt entries is the caller's job.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    io,
    path::PathBuf,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};
use thiserror::Error;
use tokio::sync::Mutex;

/// Payload schema version baked into every key.
pub const CACHE_SCHEMA_VERSION: u32 = 1;

/// Cache key for a location's computed forecast.
pub fn cache_key(location_id: &str) -> String {
    format!("tides:location:{location_id}:v{CACHE_SCHEMA_VERSION}")
}

/// Errors from a cache backend.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache IO: {0}")]
    Io(#[from] io::Error),

    #[error("cache serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Minimal TTL key-value store.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Value for `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Remove `key`. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// In-process cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (Instant, String)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((expires, value)) if Instant::now() < *expires => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let expires = Instant::now() + ttl;
        self.entries
            .lock()
            .await
            .insert(key.to_string(), (expires, value));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

/// On-disk envelope for [`FileCache`].
#[derive(Serialize, Deserialize)]
struct Envelope {
    /// Expiry as UTC epoch seconds
    expires_at: u64,
    value: String,
}

/// Directory-backed cache, one JSON file per key.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File for `key`. Bytes other than ASCII alphanumerics and `-` are
    /// written as `_XX` hex escapes (including `_` itself), so distinct keys
    /// never share a file.
    fn path_for(&self, key: &str) -> PathBuf {
        let mut file = String::with_capacity(key.len());
        for byte in key.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' {
                file.push(char::from(byte));
            } else {
                file.push_str(&format!("_{byte:02X}"));
            }
        }
        self.dir.join(format!("{file}.json"))
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[async_trait]
impl CacheStore for FileCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let path = self.path_for(key);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let envelope: Envelope = serde_json::from_slice(&data)?;
        if envelope.expires_at <= epoch_secs() {
            self.delete(key).await?;
            return Ok(None);
        }
        Ok(Some(envelope.value))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let envelope = Envelope {
            expires_at: epoch_secs() + ttl.as_secs(),
            value,
        };
        let data = serde_json::to_vec(&envelope)?;
        tokio::fs::write(self.path_for(key), data).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
