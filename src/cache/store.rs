//! Durable backing store for cache entries.
//! Uses [`sled`](https://crates.io/crates/sled), an embedded key-value store.
//! Entries are stored as JSON under `SYMBOL:category`.

use sled::Db;

use super::{CacheEntry, CacheKey};
use crate::utils::error::{Error, Result};

/// Write-through persistence for the analysis cache.
pub trait CacheStore: Send + Sync {
    fn save(&self, entry: &CacheEntry) -> Result<()>;
    fn remove(&self, key: &CacheKey) -> Result<()>;
    fn load_all(&self) -> Result<Vec<CacheEntry>>;
}

#[derive(Clone)]
pub struct SledCacheStore {
    db: Db,
}

impl SledCacheStore {
    /// Open or create a cache database at the specified path.
    pub fn open(path: &str) -> Result<Self> {
        let db = sled::open(path).map_err(|e| Error::CacheError(format!("cache open error: {e}")))?;
        Ok(Self { db })
    }

    /// In-memory database discarded on drop.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }
}

impl CacheStore for SledCacheStore {
    fn save(&self, entry: &CacheEntry) -> Result<()> {
        let key = entry.key().storage_key();
        let bytes = serde_json::to_vec(entry)?;
        self.db
            .insert(key.as_bytes(), bytes)
            .map_err(|e| Error::CacheError(format!("cache write error: {e}")))?;
        self.db.flush().map_err(|e| Error::CacheError(format!("cache flush error: {e}")))?;
        Ok(())
    }

    fn remove(&self, key: &CacheKey) -> Result<()> {
        self.db
            .remove(key.storage_key().as_bytes())
            .map_err(|e| Error::CacheError(format!("cache delete error: {e}")))?;
        self.db.flush().map_err(|e| Error::CacheError(format!("cache flush error: {e}")))?;
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<CacheEntry>> {
        let mut out = Vec::new();
        for item in self.db.iter() {
            let (_, value) = item.map_err(|e| Error::CacheError(format!("cache read error: {e}")))?;
            match serde_json::from_slice::<CacheEntry>(&value) {
                | Ok(entry) => out.push(entry),
                | Err(e) => log::warn!("skipping unreadable cache record: {}", e),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::types::Confidence;
    use chrono::Utc;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn save_load_remove() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.sled");
        let store = SledCacheStore::open(path.to_str().unwrap()).unwrap();

        let entry = CacheEntry::new(
            CacheKey::new("btc", "advisory"),
            json!({"score": 61.5}),
            Confidence::new(0.8).unwrap(),
            3.2,
            Utc::now(),
            900,
        );
        store.save(&entry).unwrap();

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].symbol, "BTC");
        assert_eq!(loaded[0].content_hash, entry.content_hash);

        store.remove(&entry.key()).unwrap();
        assert!(store.load_all().unwrap().is_empty());
    }
}
