//! Core type definitions for the cache system

use crate::error::CacheError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Cache value type - opaque bytes, encoded and decoded by the caller
pub type CacheValue = Vec<u8>;

/// Content hash identifying one (operation, inputs) pair
///
/// Always a 64-character lowercase hex SHA-256 digest, including when deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct CacheKey(String);

impl CacheKey {
    /// Wrap an existing digest, rejecting anything that is not 64 hex characters
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.len() == 64 && raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            Some(Self(raw.to_ascii_lowercase()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for log lines
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl TryFrom<String> for CacheKey {
    type Error = CacheError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw).ok_or(CacheError::InvalidKey(raw))
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of operation whose results are cached
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    /// General AI query
    Query,

    /// Code review
    CodeReview,

    /// Documentation generation
    GenerateDocs,

    /// Quick code fix
    FixCode,

    /// Batch processing default
    BatchProcess,

    /// Caller-defined operation, uses the cache default TTL
    Custom(String),
}

impl OperationKind {
    pub fn as_str(&self) -> &str {
        match self {
            OperationKind::Query => "query",
            OperationKind::CodeReview => "code_review",
            OperationKind::GenerateDocs => "generate_docs",
            OperationKind::FixCode => "fix_code",
            OperationKind::BatchProcess => "batch_process",
            OperationKind::Custom(name) => name,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Custom(name) => write!(f, "custom:{}", name),
            other => f.write_str(other.as_str()),
        }
    }
}

impl FromStr for OperationKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "query" => OperationKind::Query,
            "code_review" | "review" => OperationKind::CodeReview,
            "generate_docs" | "docs" => OperationKind::GenerateDocs,
            "fix_code" | "fix" => OperationKind::FixCode,
            "batch_process" | "batch" => OperationKind::BatchProcess,
            other => OperationKind::Custom(other.to_string()),
        })
    }
}

/// Everything that determines a cached result: operation kind, primary input,
/// and any discriminating parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRequest {
    kind: OperationKind,
    input: String,
    params: BTreeMap<String, String>,
}

impl CacheRequest {
    /// Create a request for the given operation and primary input
    pub fn new(kind: OperationKind, input: impl Into<String>) -> Self {
        Self {
            kind,
            input: input.into(),
            params: BTreeMap::new(),
        }
    }

    /// Add a discriminating parameter (e.g. a system prompt or model name)
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn kind(&self) -> &OperationKind {
        &self.kind
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// Derive the content-addressed key
    ///
    /// Every field is length-prefixed before hashing so that moving bytes across
    /// a field boundary always changes the digest. Params are hashed in sorted
    /// order and the count is included so an empty param can't alias a missing one.
    pub fn key(&self) -> CacheKey {
        let mut hasher = Sha256::new();
        update_field(&mut hasher, self.kind.as_str().as_bytes());
        update_field(&mut hasher, custom_marker(&self.kind));
        update_field(&mut hasher, self.input.as_bytes());
        hasher.update((self.params.len() as u64).to_le_bytes());
        for (name, value) in &self.params {
            update_field(&mut hasher, name.as_bytes());
            update_field(&mut hasher, value.as_bytes());
        }
        CacheKey(hex::encode(hasher.finalize()))
    }
}

fn update_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

// Keeps Custom("query") distinct from Query.
fn custom_marker(kind: &OperationKind) -> &'static [u8] {
    match kind {
        OperationKind::Custom(_) => b"custom",
        _ => b"builtin",
    }
}

/// Statistics snapshot for a cache instance
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CacheStats {
    /// Number of entries currently in memory
    pub size: usize,

    /// Configured maximum entry count
    pub max_size: usize,

    /// Successful lookups since creation or the last clear
    pub hits: u64,

    /// Lookups that found nothing or an expired entry
    pub misses: u64,

    /// hits + misses
    pub total_requests: u64,

    /// Hit rate as a percentage (0.0 - 100.0)
    pub hit_rate: f64,

    /// Entries removed by LRU eviction
    pub evictions: u64,

    /// Entries dropped because their TTL elapsed
    pub expirations: u64,

    /// Entries removed by explicit invalidation
    pub invalidations: u64,

    /// Records that could not be written to disk
    pub persist_failures: u64,
}

impl CacheStats {
    /// Hit rate formatted with two decimals, e.g. `"66.67%"`
    pub fn hit_rate_display(&self) -> String {
        format!("{:.2}%", self.hit_rate)
    }

    /// Compute a hit rate percentage without dividing by zero
    pub fn rate(hits: u64, misses: u64) -> f64 {
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            (hits as f64 / total as f64) * 100.0
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ size: {}/{}, hits: {}, misses: {}, hit_rate: {}, evictions: {}, expirations: {} }}",
            self.size,
            self.max_size,
            self.hits,
            self.misses,
            self.hit_rate_display(),
            self.evictions,
            self.expirations
        )
    }
}
