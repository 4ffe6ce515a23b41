//! Cache entry management with TTL support

use crate::cache::types::{CacheKey, CacheValue};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// One cached result plus its access bookkeeping
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// The cache key
    pub key: CacheKey,

    /// The cached value
    pub value: CacheValue,

    /// When the entry was inserted
    pub created_at: DateTime<Utc>,

    /// Lifetime after `created_at`; `None` never expires
    pub ttl: Option<Duration>,

    /// Number of successful reads (observability only)
    pub access_count: u64,

    /// Last successful read, the LRU ordering key
    pub last_accessed: DateTime<Utc>,
}

impl CacheEntry {
    /// Create a new entry stamped with the current time
    pub fn new(key: CacheKey, value: CacheValue, ttl: Option<Duration>) -> Self {
        Self::created_at(key, value, ttl, Utc::now())
    }

    /// Create an entry with an explicit creation time
    pub fn created_at(
        key: CacheKey,
        value: CacheValue,
        ttl: Option<Duration>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            value,
            created_at,
            ttl,
            access_count: 0,
            last_accessed: created_at,
        }
    }

    /// Point in time after which the entry is expired
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let ttl = chrono::Duration::from_std(self.ttl?).ok()?;
        self.created_at.checked_add_signed(ttl)
    }

    /// Check if the entry has expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Expired iff `now > created_at + ttl`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at() {
            Some(expires_at) => now > expires_at,
            None => false,
        }
    }

    /// Record a read at `now`; `last_accessed` never moves before `created_at`
    pub fn mark_accessed_at(&mut self, now: DateTime<Utc>) {
        self.last_accessed = now.max(self.created_at);
        self.access_count += 1;
    }
}
