//! Response cache with TTL expiry, batched LRU eviction and per-key persistence

use crate::cache::{
    config::CacheConfig,
    entry::CacheEntry,
    invalidation::{InvalidationEvent, InvalidationReason},
    persistence::{DiskStore, ScannedRecord},
    ttl::TtlTable,
    types::{CacheKey, CacheRequest, CacheStats, CacheValue},
};
use crate::error::{CacheError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Content-addressed cache for operation results
///
/// This implementation provides:
/// - Thread-safe access through a single mutex around the in-memory index
/// - Lazy TTL expiration on read, plus an optional sweep
/// - Batched LRU eviction once the entry count exceeds `max_size`
/// - One persisted record per key; disk I/O runs outside the index lock
///
/// Disk writes and deletes for a key are ordered by a per-key stripe lock, taken
/// before the index lock and held across the file operation, so the record on
/// disk always matches the last in-memory change to that key.
///
/// Construct one instance at startup and share it (`Arc<ResponseCache>`) with
/// every component that needs it.
pub struct ResponseCache {
    config: CacheConfig,
    ttl_table: TtlTable,
    disk: Option<DiskStore>,
    state: Mutex<CacheState>,
    stripes: Vec<Mutex<()>>,
}

const WRITE_STRIPES: usize = 16;

/// In-memory index and counters, guarded by one lock
#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, Slot>,
    /// Monotonic access sequence, breaks `last_accessed` ties
    sequence: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
    invalidations: u64,
    persist_failures: u64,
}

struct Slot {
    entry: CacheEntry,
    sequence: u64,
}

impl CacheState {
    fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    fn insert(&mut self, entry: CacheEntry) {
        let sequence = self.next_sequence();
        self.entries
            .insert(entry.key.clone(), Slot { entry, sequence });
    }

    /// Record a read of a live entry, moving it to the back of the LRU order
    fn touch(&mut self, key: &CacheKey, now: DateTime<Utc>) -> Option<&CacheEntry> {
        let sequence = self.next_sequence();
        let slot = self.entries.get_mut(key)?;
        slot.entry.mark_accessed_at(now);
        slot.sequence = sequence;
        Some(&slot.entry)
    }

    /// Least-recently-used keys, oldest first, skipping `protected`
    fn lru_victims(&self, count: usize, protected: Option<&CacheKey>) -> Vec<CacheKey> {
        let mut candidates: Vec<(&DateTime<Utc>, u64, &CacheKey)> = self
            .entries
            .iter()
            .filter(|(key, _)| Some(*key) != protected)
            .map(|(key, slot)| (&slot.entry.last_accessed, slot.sequence, key))
            .collect();
        candidates.sort_unstable();
        candidates
            .into_iter()
            .take(count)
            .map(|(_, _, key)| key.clone())
            .collect()
    }

    fn remove_all(&mut self, keys: &[CacheKey]) {
        for key in keys {
            self.entries.remove(key);
        }
    }
}

impl ResponseCache {
    /// Create a cache, loading any persisted records from the configured directory
    pub fn open(config: CacheConfig) -> Result<Self> {
        config.validate()?;

        let disk = match (&config.directory, config.enabled) {
            (Some(dir), true) => Some(DiskStore::open(dir)?),
            _ => None,
        };

        let cache = Self {
            config,
            ttl_table: TtlTable::default(),
            disk,
            state: Mutex::new(CacheState::default()),
            stripes: (0..WRITE_STRIPES).map(|_| Mutex::new(())).collect(),
        };
        cache.load_from_disk()?;

        info!(
            "Response cache ready (enabled: {}, max_size: {}, directory: {:?}, entries: {})",
            cache.config.enabled,
            cache.config.max_size,
            cache.directory(),
            cache.len()
        );
        Ok(cache)
    }

    /// Memory-only cache with the given capacity
    pub fn in_memory(max_size: usize) -> Result<Self> {
        Self::open(CacheConfig::builder().in_memory().max_size(max_size).build())
    }

    /// Replace the per-operation TTL table
    pub fn with_ttl_table(mut self, table: TtlTable) -> Self {
        self.ttl_table = table;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn ttl_table(&self) -> &TtlTable {
        &self.ttl_table
    }

    /// Directory holding persisted records, if persistence is active
    pub fn directory(&self) -> Option<&Path> {
        self.disk.as_ref().map(DiskStore::dir)
    }

    /// Look up the cached value for `request`
    ///
    /// Expired entries count as misses and are purged on the spot.
    pub fn get(&self, request: &CacheRequest) -> Option<CacheValue> {
        self.get_by_key(&request.key())
    }

    /// Look up by precomputed key
    pub fn get_by_key(&self, key: &CacheKey) -> Option<CacheValue> {
        if !self.config.enabled {
            return None;
        }

        let now = Utc::now();
        {
            let mut state = self.lock();
            let expired = state
                .entries
                .get(key)
                .map(|slot| slot.entry.is_expired_at(now));
            let Some(expired) = expired else {
                return self.load_on_miss(key, now, state);
            };

            if expired {
                state.entries.remove(key);
                state.misses += 1;
                state.expirations += 1;
            } else {
                state.hits += 1;
                let entry = state.touch(key, now)?;
                debug!("Cache hit: {} (access #{})", key.short(), entry.access_count);
                return Some(entry.value.clone());
            }
        }

        let event = InvalidationEvent::new(InvalidationReason::Expired, vec![key.clone()])
            .with_context("expired on read");
        debug!("Dropped {}", event);
        self.remove_file_if_absent(key);
        None
    }

    /// Memory miss: try the record on disk before giving up
    ///
    /// Holds the key's stripe while reading so a concurrent invalidate can't be undone.
    fn load_on_miss(
        &self,
        key: &CacheKey,
        now: DateTime<Utc>,
        state: MutexGuard<'_, CacheState>,
    ) -> Option<CacheValue> {
        let Some(disk) = &self.disk else {
            let mut state = state;
            state.misses += 1;
            debug!("Cache miss: {}", key.short());
            return None;
        };
        drop(state);

        let stripe = self.stripe(key);
        let loaded = match disk.read(key) {
            Ok(loaded) => loaded,
            Err(e) => {
                self.discard_unreadable_locked(disk, key, e);
                None
            }
        };

        let mut state = self.lock();
        let (value, evicted) = match loaded {
            Some(entry) if entry.is_expired_at(now) => {
                state.misses += 1;
                state.expirations += 1;
                let stale = !state.entries.contains_key(key);
                drop(state);
                let event = InvalidationEvent::new(InvalidationReason::Expired, vec![key.clone()])
                    .with_context("expired on disk");
                debug!("Dropped {}", event);
                if stale {
                    Self::delete_record(disk, key);
                }
                return None;
            }
            Some(entry) => {
                // Another thread may have inserted the key while we read the file.
                if !state.entries.contains_key(key) {
                    state.insert(entry);
                }
                state.hits += 1;
                let value = state.touch(key, now).map(|entry| entry.value.clone());
                (value, self.evict_if_needed(&mut state, Some(key)))
            }
            None => {
                state.misses += 1;
                debug!("Cache miss: {}", key.short());
                return None;
            }
        };
        drop(state);
        drop(stripe);

        debug!("Cache hit (loaded from disk): {}", key.short());
        self.remove_files_if_absent(&evicted);
        value
    }

    /// Store `value` for `request`
    ///
    /// `ttl` of `None` or zero falls back to the TTL table, then to the cache default.
    pub fn set(&self, request: &CacheRequest, value: CacheValue, ttl: Option<Duration>) {
        let ttl = match ttl {
            Some(ttl) if !ttl.is_zero() => Some(ttl),
            _ => self
                .ttl_table
                .resolve(request.kind(), self.config.default_ttl),
        };
        self.insert_entry(CacheEntry::new(request.key(), value, ttl));
    }

    /// Store by precomputed key; `ttl` of `None` or zero uses the cache default
    pub fn set_by_key(&self, key: CacheKey, value: CacheValue, ttl: Option<Duration>) {
        let ttl = ttl.filter(|ttl| !ttl.is_zero()).or(self.config.default_ttl);
        self.insert_entry(CacheEntry::new(key, value, ttl));
    }

    fn insert_entry(&self, entry: CacheEntry) {
        if !self.config.enabled {
            return;
        }

        let key = entry.key.clone();
        let stripe = self.stripe(&key);
        let evicted = {
            let mut state = self.lock();
            state.insert(entry.clone());
            self.evict_if_needed(&mut state, Some(&key))
        };
        debug!("Cached entry {} (ttl: {:?})", key.short(), entry.ttl);

        if let Some(disk) = &self.disk {
            if let Err(e) = disk.write(&entry) {
                warn!("Failed to persist cache entry {}: {}", key.short(), e);
                self.lock().persist_failures += 1;
            }
        }
        drop(stripe);

        self.remove_files_if_absent(&evicted);
    }

    /// Remove the entry for `request`; returns whether anything was removed
    pub fn invalidate(&self, request: &CacheRequest) -> bool {
        self.invalidate_by_key(&request.key())
    }

    /// Remove by precomputed key
    pub fn invalidate_by_key(&self, key: &CacheKey) -> bool {
        let _stripe = self.stripe(key);
        let in_memory = {
            let mut state = self.lock();
            let removed = state.entries.remove(key).is_some();
            if removed {
                state.invalidations += 1;
            }
            removed
        };

        let on_disk = match &self.disk {
            Some(disk) => disk.remove(key).unwrap_or_else(|e| {
                warn!("Failed to delete cache record {}: {}", key.short(), e);
                false
            }),
            None => false,
        };

        if !(in_memory || on_disk) {
            return false;
        }
        let event = InvalidationEvent::new(InvalidationReason::Manual, vec![key.clone()]);
        debug!("Invalidated {}", event);
        true
    }

    /// Remove all entries, in memory and on disk, and reset the counters
    ///
    /// Waits for in-flight writes on every key, so none of them lands after the clear.
    /// The returned event lists the keys that were in memory.
    pub fn clear(&self) -> InvalidationEvent {
        let _stripes: Vec<MutexGuard<'_, ()>> = self
            .stripes
            .iter()
            .map(|stripe| stripe.lock().unwrap_or_else(PoisonError::into_inner))
            .collect();

        let keys: Vec<CacheKey> = {
            let mut state = self.lock();
            let keys = state.entries.keys().cloned().collect();
            *state = CacheState::default();
            keys
        };

        if let Some(disk) = &self.disk {
            if let Err(e) = disk.clear() {
                warn!("Failed to clear cache directory {}: {}", disk.dir().display(), e);
            }
        }

        let event = InvalidationEvent::new(InvalidationReason::Cleared, keys);
        info!("Cleared {}", event);
        event
    }

    /// Statistics snapshot
    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            size: state.entries.len(),
            max_size: self.config.max_size,
            hits: state.hits,
            misses: state.misses,
            total_requests: state.hits + state.misses,
            hit_rate: CacheStats::rate(state.hits, state.misses),
            evictions: state.evictions,
            expirations: state.expirations,
            invalidations: state.invalidations,
            persist_failures: state.persist_failures,
        }
    }

    /// True if a live entry exists; does not count as an access
    pub fn contains_key(&self, key: &CacheKey) -> bool {
        let state = self.lock();
        state
            .entries
            .get(key)
            .is_some_and(|slot| !slot.entry.is_expired())
    }

    /// Get number of entries in memory
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Check if cache is empty
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Remove every expired entry from memory and disk
    ///
    /// Uses the same predicate as `get`. Returns `None` when nothing expired.
    pub fn cleanup_expired(&self) -> Option<InvalidationEvent> {
        let now = Utc::now();
        let mut expired: Vec<CacheKey> = {
            let mut state = self.lock();
            let keys: Vec<CacheKey> = state
                .entries
                .iter()
                .filter(|(_, slot)| slot.entry.is_expired_at(now))
                .map(|(key, _)| key.clone())
                .collect();
            state.remove_all(&keys);
            state.expirations += keys.len() as u64;
            keys
        };
        self.remove_files_if_absent(&expired);

        if let Some(disk) = &self.disk {
            match disk.scan() {
                Ok(records) => {
                    for record in records {
                        match record {
                            ScannedRecord::Loaded(entry) if entry.is_expired_at(now) => {
                                if self.remove_file_if_absent(&entry.key) {
                                    expired.push(entry.key);
                                }
                            }
                            ScannedRecord::Loaded(_) => {}
                            ScannedRecord::Corrupted { key, error } => {
                                self.discard_unreadable(&key, error)
                            }
                        }
                    }
                }
                Err(e) => warn!("Cache sweep could not scan directory: {}", e),
            }
        }

        if expired.is_empty() {
            return None;
        }

        let event = InvalidationEvent::new(InvalidationReason::Expired, expired)
            .with_context("expired entry sweep");
        debug!("Cleaned up {}", event);
        Some(event)
    }

    /// Run the LRU pass if the store exceeds capacity; returns evicted keys
    fn evict_if_needed(&self, state: &mut CacheState, protected: Option<&CacheKey>) -> Vec<CacheKey> {
        let len = state.entries.len();
        if len <= self.config.max_size {
            return Vec::new();
        }

        let batch = self.config.eviction_batch(len);
        let victims = state.lru_victims(batch, protected);
        state.remove_all(&victims);
        state.evictions += victims.len() as u64;

        let event = InvalidationEvent::new(InvalidationReason::LeastRecentlyUsed, victims)
            .with_context(format!("store held {} of {} entries", len, self.config.max_size));
        debug!("Evicted {}", event);
        event.keys
    }

    /// Populate memory from the directory, dropping expired and corrupt records
    fn load_from_disk(&self) -> Result<()> {
        let Some(disk) = &self.disk else {
            return Ok(());
        };

        let now = Utc::now();
        let mut live = Vec::new();
        let mut dropped = Vec::new();
        for record in disk.scan()? {
            match record {
                ScannedRecord::Loaded(entry) if entry.is_expired_at(now) => {
                    dropped.push(entry.key)
                }
                ScannedRecord::Loaded(entry) => live.push(entry),
                ScannedRecord::Corrupted { key, error } => self.discard_unreadable(&key, error),
            }
        }
        self.remove_files_if_absent(&dropped);

        // Oldest access first so sequence numbers follow recency.
        live.sort_by_key(|entry| entry.last_accessed);
        let loaded = live.len();

        let trimmed = {
            let mut state = self.lock();
            for entry in live {
                state.insert(entry);
            }
            let excess = state.entries.len().saturating_sub(self.config.max_size);
            let victims = state.lru_victims(excess, None);
            state.remove_all(&victims);
            victims
        };
        self.remove_files_if_absent(&trimmed);

        if loaded > 0 || !dropped.is_empty() {
            info!(
                "Loaded {} cached entries from {} ({} expired, {} over capacity)",
                loaded - trimmed.len(),
                disk.dir().display(),
                dropped.len(),
                trimmed.len()
            );
        }
        Ok(())
    }

    /// Corrupt records are deleted; plain I/O failures are only logged
    fn discard_unreadable(&self, key: &CacheKey, error: CacheError) {
        if let Some(disk) = &self.disk {
            let _stripe = self.stripe(key);
            self.discard_unreadable_locked(disk, key, error);
        }
    }

    /// [`discard_unreadable`](Self::discard_unreadable) for a caller already holding the stripe
    fn discard_unreadable_locked(&self, disk: &DiskStore, key: &CacheKey, error: CacheError) {
        match error {
            CacheError::Corrupted { .. } | CacheError::Serialization(_) => {
                if self.lock().entries.contains_key(key) {
                    return;
                }
                let event = InvalidationEvent::new(InvalidationReason::Corrupted, vec![key.clone()])
                    .with_context(error.to_string());
                warn!("Removing {}", event);
                Self::delete_record(disk, key);
            }
            other => warn!("Could not read cache record {}: {}", key.short(), other),
        }
    }

    /// Delete the record for `key` unless the key is live in memory again
    ///
    /// Returns whether the key was absent (and its record, if any, deleted).
    fn remove_file_if_absent(&self, key: &CacheKey) -> bool {
        let Some(disk) = &self.disk else {
            return !self.lock().entries.contains_key(key);
        };

        let _stripe = self.stripe(key);
        if self.lock().entries.contains_key(key) {
            return false;
        }
        Self::delete_record(disk, key);
        true
    }

    fn remove_files_if_absent(&self, keys: &[CacheKey]) {
        for key in keys {
            self.remove_file_if_absent(key);
        }
    }

    fn delete_record(disk: &DiskStore, key: &CacheKey) {
        if let Err(e) = disk.remove(key) {
            warn!("Failed to delete cache record {}: {}", key.short(), e);
        }
    }

    /// Write-ordering lock for `key`; always taken before the index lock
    fn stripe(&self, key: &CacheKey) -> MutexGuard<'_, ()> {
        let index = key
            .as_str()
            .chars()
            .next()
            .and_then(|c| c.to_digit(16))
            .unwrap_or(0) as usize;
        self.stripes[index % self.stripes.len()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        // A panic while holding the lock can't leave the index half-updated.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Background task that periodically sweeps expired entries
///
/// The sweep does blocking disk I/O, so it runs on the blocking pool.
pub fn spawn_cleanup(cache: Arc<ResponseCache>) -> tokio::task::JoinHandle<()> {
    let interval = cache.config.cleanup_interval;
    info!("Starting cache cleanup task (interval: {:?})", interval);

    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;

            let sweeper = Arc::clone(&cache);
            match tokio::task::spawn_blocking(move || sweeper.cleanup_expired()).await {
                Ok(Some(event)) => debug!("Auto cleanup: {}", event),
                Ok(None) => {}
                Err(e) => warn!("Auto cleanup failed: {}", e),
            }
        }
    })
}
