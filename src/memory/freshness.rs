//! Freshness policy: items older than their TTL, or flagged volatile, are
//! summarized as historical and cannot be cited as current evidence.

use chrono::{DateTime, Utc};

use crate::config::FreshnessTtls;
use crate::document::{ContextSource, EvidenceKind, FreshnessClass};
use crate::errors::MemoryError;

/// Maps an evidence kind to its default TTL class. Prices/stock-like tool
/// evidence is volatile; memory/context records default to stable.
pub fn default_class(evidence_kind: EvidenceKind) -> FreshnessClass {
    match evidence_kind {
        EvidenceKind::Tool => FreshnessClass::Volatile,
        EvidenceKind::Memory => FreshnessClass::Reference,
        EvidenceKind::Context => FreshnessClass::Stable,
    }
}

/// Source priority order used by Phase 2.1's staging list: forever-memory
/// first, then research cache, then recent turns, then older turns.
pub fn source_priority(source: ContextSource) -> u8 {
    match source {
        ContextSource::ForeverMemory => 0,
        ContextSource::ResearchCache => 1,
        ContextSource::RecentTurn => 2,
        ContextSource::OlderTurn => 3,
    }
}

pub fn ttl_for(class: FreshnessClass, ttls: &FreshnessTtls) -> chrono::Duration {
    let secs = match class {
        FreshnessClass::Volatile => ttls.volatile_secs,
        FreshnessClass::Stable => ttls.stable_secs,
        FreshnessClass::Reference => ttls.reference_secs,
    };
    chrono::Duration::seconds(secs as i64)
}

/// Whether an item recorded at `recorded_at` is still fresh given its
/// class's TTL, as of `now`.
pub fn is_current(class: FreshnessClass, recorded_at: DateTime<Utc>, now: DateTime<Utc>, ttls: &FreshnessTtls) -> bool {
    now - recorded_at < ttl_for(class, ttls)
}

pub fn parse_class(name: &str) -> Result<FreshnessClass, MemoryError> {
    match name {
        "volatile" => Ok(FreshnessClass::Volatile),
        "stable" => Ok(FreshnessClass::Stable),
        "reference" => Ok(FreshnessClass::Reference),
        other => Err(MemoryError::UnknownFreshnessClass(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volatile_item_expires_within_its_ttl() {
        let ttls = FreshnessTtls { volatile_secs: 60, stable_secs: 1000, reference_secs: 10000 };
        let now = Utc::now();
        let recorded = now - chrono::Duration::seconds(120);
        assert!(!is_current(FreshnessClass::Volatile, recorded, now, &ttls));
    }

    #[test]
    fn reference_item_stays_current_longer() {
        let ttls = FreshnessTtls::default();
        let now = Utc::now();
        let recorded = now - chrono::Duration::hours(12);
        assert!(is_current(FreshnessClass::Reference, recorded, now, &ttls));
    }

    #[test]
    fn source_priority_orders_forever_memory_first() {
        assert!(source_priority(ContextSource::ForeverMemory) < source_priority(ContextSource::ResearchCache));
        assert!(source_priority(ContextSource::RecentTurn) < source_priority(ContextSource::OlderTurn));
    }

    #[test]
    fn parse_class_rejects_unknown_name() {
        assert!(matches!(parse_class("ancient"), Err(MemoryError::UnknownFreshnessClass(_))));
    }
}
