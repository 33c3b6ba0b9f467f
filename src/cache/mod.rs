//! Adaptive analysis cache.
//!
//! Holds the latest analysis per `(symbol, category)` with a TTL derived from
//! market volatility and analysis confidence. Entries are immutable snapshots
//! behind an `Arc`: readers clone the pointer and never block writers on other
//! keys, while writers to the same key are serialized by the map shard.
//! Write-through happens after the shard lock is released; a write whose entry
//! was already replaced or removed is skipped.
//!
//! Life cycle: Fresh → Stale (lazily, on read) → Evicted (invalidate or LRU).
//! A stale entry reads as a miss but is still listed by [`AdaptiveAnalysisCache::info`].

pub mod store;
pub mod ttl;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::CacheConfig;
use crate::utils::error::Result;
use crate::utils::types::Confidence;

pub use store::{CacheStore, SledCacheStore};
pub use ttl::TtlPolicy;

/// `(symbol, category)` cache key. Symbols are upper-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    pub symbol: String,
    pub category: String,
}

impl CacheKey {
    pub fn new(symbol: &str, category: &str) -> Self {
        Self { symbol: symbol.to_uppercase(), category: category.to_string() }
    }

    pub fn storage_key(&self) -> String {
        format!("{}:{}", self.symbol, self.category)
    }
}

/// Freshness of an entry at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    Fresh,
    Stale,
}

/// Hex SHA-256 of the payload's JSON encoding.
pub fn content_hash(payload: &Value) -> String {
    let bytes = serde_json::to_vec(payload).unwrap_or_default();
    hex::encode(Sha256::digest(&bytes))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CacheEntry {
    pub symbol: String,
    pub category: String,
    pub payload: Value,
    pub content_hash: String,
    pub confidence: Confidence,
    pub volatility: f64,
    pub computed_at: DateTime<Utc>,
    pub ttl_seconds: u64,
    #[serde(skip)]
    last_access: AtomicU64,
}

impl CacheEntry {
    pub fn new(
        key: CacheKey,
        payload: Value,
        confidence: Confidence,
        volatility: f64,
        computed_at: DateTime<Utc>,
        ttl_seconds: u64,
    ) -> Self {
        let content_hash = content_hash(&payload);
        Self {
            symbol: key.symbol,
            category: key.category,
            payload,
            content_hash,
            confidence,
            volatility,
            computed_at,
            ttl_seconds,
            last_access: AtomicU64::new(0),
        }
    }

    pub fn key(&self) -> CacheKey {
        CacheKey { symbol: self.symbol.clone(), category: self.category.clone() }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.computed_at + Duration::seconds(self.ttl_seconds as i64)
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> EntryState {
        if now > self.expires_at() {
            EntryState::Stale
        } else {
            EntryState::Fresh
        }
    }

    fn touch(&self, tick: u64) {
        self.last_access.store(tick, Ordering::Relaxed);
    }

    fn last_access(&self) -> u64 {
        self.last_access.load(Ordering::Relaxed)
    }
}

/// Diagnostics for one entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryInfo {
    pub symbol: String,
    pub category: String,
    pub content_hash: String,
    pub confidence: Confidence,
    pub volatility: f64,
    pub computed_at: DateTime<Utc>,
    pub ttl_seconds: u64,
    pub expires_at: DateTime<Utc>,
    pub state: EntryState,
}

/// Cache-wide diagnostics, optionally filtered to one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheInfo {
    pub capacity: usize,
    pub total_entries: usize,
    pub fresh: usize,
    pub stale: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: Vec<EntryInfo>,
}

pub struct AdaptiveAnalysisCache {
    entries: DashMap<CacheKey, Arc<CacheEntry>>,
    volatility: DashMap<String, f64>,
    policy: TtlPolicy,
    capacity: usize,
    default_volatility: f64,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    store: Option<Arc<dyn CacheStore>>,
    /// Orders store writes against removals
    store_lock: Mutex<()>,
}

impl AdaptiveAnalysisCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            volatility: DashMap::new(),
            capacity: config.capacity.max(1),
            default_volatility: config.default_volatility_pct,
            policy: TtlPolicy::new(config),
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            store: None,
            store_lock: Mutex::new(()),
        }
    }

    /// Cache that writes through to `store`. Call [`warm`](Self::warm) to reload it.
    pub fn with_store(config: CacheConfig, store: Arc<dyn CacheStore>) -> Self {
        let mut cache = Self::new(config);
        cache.store = Some(store);
        cache
    }

    pub fn policy(&self) -> &TtlPolicy {
        &self.policy
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Load still-fresh entries from the backing store. Returns how many were loaded.
    pub fn warm(&self) -> Result<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let now = Utc::now();
        let mut loaded = 0;
        for entry in store.load_all()? {
            if entry.state_at(now) == EntryState::Stale {
                continue;
            }
            entry.touch(self.tick());
            self.entries.insert(entry.key(), Arc::new(entry));
            loaded += 1;
        }
        self.evict_over_capacity(None);
        info!("warmed analysis cache with {} entries", loaded);
        Ok(loaded)
    }

    /// Record the latest absolute 24h change for `symbol`.
    pub fn observe_volatility(&self, symbol: &str, volatility_pct: f64) {
        self.volatility.insert(symbol.to_uppercase(), volatility_pct.abs());
    }

    pub fn volatility_for(&self, symbol: &str) -> f64 {
        self.volatility.get(&symbol.to_uppercase()).map(|v| *v).unwrap_or(self.default_volatility)
    }

    pub fn get(&self, symbol: &str, category: &str) -> Option<Value> {
        self.get_at(symbol, category, Utc::now())
    }

    /// Read as of `now`. Stale entries count as a miss.
    pub fn get_at(&self, symbol: &str, category: &str, now: DateTime<Utc>) -> Option<Value> {
        let key = CacheKey::new(symbol, category);
        let snapshot = self.entries.get(&key).map(|e| Arc::clone(e.value()));
        match snapshot {
            | Some(entry) if entry.state_at(now) == EntryState::Fresh => {
                entry.touch(self.tick());
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.payload.clone())
            }
            | Some(entry) => {
                debug!("cache entry {} is stale since {}", key.storage_key(), entry.expires_at());
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            | None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Typed read; an entry that no longer decodes is treated as a miss.
    pub fn get_as<T: DeserializeOwned>(&self, symbol: &str, category: &str) -> Option<T> {
        let value = self.get(symbol, category)?;
        match serde_json::from_value(value) {
            | Ok(v) => Some(v),
            | Err(e) => {
                warn!("cached {}/{} does not decode: {}", symbol, category, e);
                None
            }
        }
    }

    /// Store `payload` using the last observed volatility for `symbol`.
    pub fn set<T: Serialize>(&self, symbol: &str, category: &str, payload: &T, confidence: Confidence) -> bool {
        let volatility = self.volatility_for(symbol);
        self.set_with_volatility(symbol, category, payload, confidence, volatility)
    }

    /// Store `payload`, replacing any previous entry for the key in one step.
    pub fn set_with_volatility<T: Serialize>(
        &self,
        symbol: &str,
        category: &str,
        payload: &T,
        confidence: Confidence,
        volatility_pct: f64,
    ) -> bool {
        let payload = match serde_json::to_value(payload) {
            | Ok(v) => v,
            | Err(e) => {
                warn!("refusing to cache {}/{}: {}", symbol, category, e);
                return false;
            }
        };
        let key = CacheKey::new(symbol, category);
        let ttl = self.policy.ttl_seconds(volatility_pct, confidence);
        let entry = Arc::new(CacheEntry::new(
            key.clone(),
            payload,
            confidence,
            volatility_pct.abs(),
            Utc::now(),
            ttl,
        ));
        entry.touch(self.tick());

        // the shard lock is released before any store I/O
        if let Some(previous) = self.entries.insert(key.clone(), Arc::clone(&entry)) {
            if previous.content_hash == entry.content_hash {
                debug!("{} unchanged, refreshing ttl to {}s", key.storage_key(), ttl);
            }
        }
        self.persist(&key, &entry);
        debug!("cached {} for {}s (volatility {:.2}%)", key.storage_key(), ttl, volatility_pct.abs());
        self.evict_over_capacity(Some(&key));
        true
    }

    fn store_guard(&self) -> Option<MutexGuard<'_, ()>> {
        self.store.as_ref().map(|_| self.store_lock.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Write `entry` through unless a newer write or a removal already replaced it.
    fn persist(&self, key: &CacheKey, entry: &Arc<CacheEntry>) {
        let Some(store) = &self.store else { return };
        let _guard = self.store_guard();
        let current = self.entries.get(key).map_or(false, |e| Arc::ptr_eq(e.value(), entry));
        if !current {
            debug!("{} superseded before write-through", key.storage_key());
            return;
        }
        if let Err(e) = store.save(entry) {
            warn!("cache write-through failed for {}: {}", key.storage_key(), e);
        }
    }

    /// Remove `key` from memory and store together. With `only`, nothing is
    /// removed unless the map still holds that exact entry.
    fn remove_entry(&self, key: &CacheKey, only: Option<&Arc<CacheEntry>>) -> bool {
        let _guard = self.store_guard();
        let removed = match only {
            | Some(target) => self.entries.remove_if(key, |_, v| Arc::ptr_eq(v, target)),
            | None => self.entries.remove(key),
        };
        if removed.is_none() {
            return false;
        }
        if let Some(store) = &self.store {
            if let Err(e) = store.remove(key) {
                warn!("cache delete failed for {}: {}", key.storage_key(), e);
            }
        }
        true
    }

    fn evict_over_capacity(&self, keep: Option<&CacheKey>) {
        while self.entries.len() > self.capacity {
            let victim = self
                .entries
                .iter()
                .filter(|e| Some(e.key()) != keep)
                .min_by_key(|e| e.value().last_access())
                .map(|e| (e.key().clone(), Arc::clone(e.value())));
            let Some((key, entry)) = victim else { break };
            if self.remove_entry(&key, Some(&entry)) {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!("evicted least recently used {}", key.storage_key());
            }
        }
    }

    /// Drop every category cached for `symbol`. Returns true if anything was removed.
    pub fn invalidate(&self, symbol: &str) -> bool {
        let symbol = symbol.to_uppercase();
        let keys: Vec<CacheKey> =
            self.entries.iter().filter(|e| e.key().symbol == symbol).map(|e| e.key().clone()).collect();
        let removed = keys.iter().filter(|key| self.remove_entry(key, None)).count();
        if removed > 0 {
            info!("invalidated {} cache entries for {}", removed, symbol);
        }
        removed > 0
    }

    /// Remove entries that went stale. Returns how many were removed.
    pub fn purge_stale(&self) -> usize {
        let now = Utc::now();
        let stale: Vec<(CacheKey, Arc<CacheEntry>)> = self
            .entries
            .iter()
            .filter(|e| e.value().state_at(now) == EntryState::Stale)
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();
        let mut removed = 0;
        for (key, entry) in &stale {
            if self.remove_entry(key, Some(entry)) {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                removed += 1;
            }
        }
        removed
    }

    pub fn info(&self, symbol: Option<&str>) -> CacheInfo {
        self.info_at(symbol, Utc::now())
    }

    pub fn info_at(&self, symbol: Option<&str>, now: DateTime<Utc>) -> CacheInfo {
        let symbol = symbol.map(str::to_uppercase);
        let mut entries: Vec<EntryInfo> = self
            .entries
            .iter()
            .filter(|e| symbol.as_deref().map_or(true, |s| e.key().symbol == s))
            .map(|e| {
                let entry = e.value();
                EntryInfo {
                    symbol: entry.symbol.clone(),
                    category: entry.category.clone(),
                    content_hash: entry.content_hash.clone(),
                    confidence: entry.confidence,
                    volatility: entry.volatility,
                    computed_at: entry.computed_at,
                    ttl_seconds: entry.ttl_seconds,
                    expires_at: entry.expires_at(),
                    state: entry.state_at(now),
                }
            })
            .collect();
        entries.sort_by(|a, b| (&a.symbol, &a.category).cmp(&(&b.symbol, &b.category)));
        let fresh = entries.iter().filter(|e| e.state == EntryState::Fresh).count();
        CacheInfo {
            capacity: self.capacity,
            total_entries: entries.len(),
            fresh,
            stale: entries.len() - fresh,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
