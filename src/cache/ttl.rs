//! Per-operation default TTLs

use crate::cache::types::OperationKind;
use std::collections::HashMap;
use std::time::Duration;

/// 5 minutes - rapidly changing data
pub const TTL_SHORT: Duration = Duration::from_secs(300);
/// 1 hour - default for most queries
pub const TTL_MEDIUM: Duration = Duration::from_secs(3600);
/// 24 hours - stable data
pub const TTL_LONG: Duration = Duration::from_secs(86_400);
/// 7 days - documentation
pub const TTL_WEEK: Duration = Duration::from_secs(604_800);

/// Default TTL for a registered operation kind; `None` for custom kinds
pub fn builtin_ttl(kind: &OperationKind) -> Option<Duration> {
    match kind {
        OperationKind::Query => Some(TTL_MEDIUM),
        OperationKind::CodeReview => Some(TTL_LONG),
        OperationKind::GenerateDocs => Some(TTL_WEEK),
        OperationKind::FixCode => Some(TTL_SHORT),
        OperationKind::BatchProcess => Some(TTL_MEDIUM),
        OperationKind::Custom(_) => None,
    }
}

/// Operation kind to TTL mapping with caller overrides
///
/// Lookups consult overrides first, then the built-in table. Custom kinds
/// without an override resolve to `None` and fall through to the cache default.
#[derive(Debug, Clone, Default)]
pub struct TtlTable {
    overrides: HashMap<OperationKind, Option<Duration>>,
}

impl TtlTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the TTL for one kind; `None` makes its entries never expire
    pub fn with_override(mut self, kind: OperationKind, ttl: Option<Duration>) -> Self {
        self.overrides.insert(kind, ttl);
        self
    }

    /// Resolve the TTL for `kind`, `fallback` being the cache default
    pub fn resolve(&self, kind: &OperationKind, fallback: Option<Duration>) -> Option<Duration> {
        if let Some(ttl) = self.overrides.get(kind) {
            return *ttl;
        }
        builtin_ttl(kind).or(fallback)
    }
}
