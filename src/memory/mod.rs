//! Context Retrieval (Phase 2.1): builds the staged candidate list that
//! Context Synthesis compresses into §2. Selection only — no LLM call and
//! no summarization happens here; that is [`crate::compressor`]'s job.

pub mod freshness;

use chrono::{DateTime, Utc};

use crate::config::FreshnessTtls;
use crate::document::{ContextItem, ContextSource, FreshnessClass};

/// One retrieval hit before it is staged into a budget-bounded list. The
/// four concrete sources (forever memory, research cache, recent/older
/// turns) all normalize into this shape before staging.
#[derive(Debug, Clone)]
pub struct MemoryCandidate {
    pub text: String,
    pub source: ContextSource,
    pub recorded_at: DateTime<Utc>,
    /// Overrides [`freshness::default_class`] when the candidate's own
    /// metadata already carries a freshness tag (e.g. a research-cache
    /// entry tagged volatile at write time).
    pub freshness_override: Option<FreshnessClass>,
}

impl MemoryCandidate {
    pub fn new(text: impl Into<String>, source: ContextSource, recorded_at: DateTime<Utc>) -> Self {
        Self { text: text.into(), source, recorded_at, freshness_override: None }
    }

    pub fn with_freshness(mut self, class: FreshnessClass) -> Self {
        self.freshness_override = Some(class);
        self
    }
}

/// Rough token estimate; matches the teacher's char-based accounting
/// (`compaction::tracker`) rather than a model-specific tokenizer.
fn estimate_tokens(text: &str) -> u32 {
    (text.len() as u32 / 4).max(1)
}

/// Builds the priority-ordered staging list per Phase 2.1: forever-memory
/// hits first, then research cache, then recent turns, then older turns.
/// Each item is capped at `per_item_cap` tokens; staging stops the moment
/// the running total would exceed `budget`. This is selection, never
/// summarization — a cut item is simply dropped from this turn's context,
/// not truncated in place.
pub fn stage_candidates(
    mut candidates: Vec<MemoryCandidate>,
    budget: u32,
    per_item_cap: u32,
    ttls: &FreshnessTtls,
    now: DateTime<Utc>,
) -> Vec<ContextItem> {
    candidates.sort_by_key(|c| freshness::source_priority(c.source));

    let mut staged = Vec::new();
    let mut used = 0u32;

    for candidate in candidates {
        let class = candidate
            .freshness_override
            .unwrap_or(freshness::default_class(crate::document::EvidenceKind::Context));
        let capped_text: String = candidate.text.chars().take((per_item_cap * 4) as usize).collect();
        let cost = estimate_tokens(&capped_text).min(per_item_cap);

        if used + cost > budget {
            break;
        }
        used += cost;

        let historical = !freshness::is_current(class, candidate.recorded_at, now, ttls);
        staged.push(ContextItem {
            text: capped_text,
            source: candidate.source,
            freshness: class,
            recorded_at: candidate.recorded_at,
            historical,
        });
    }

    staged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_candidates_orders_by_source_priority() {
        let now = Utc::now();
        let candidates = vec![
            MemoryCandidate::new("older turn note", ContextSource::OlderTurn, now),
            MemoryCandidate::new("forever memory fact", ContextSource::ForeverMemory, now),
        ];
        let staged = stage_candidates(candidates, 1_000, 200, &FreshnessTtls::default(), now);
        assert_eq!(staged[0].source, ContextSource::ForeverMemory);
        assert_eq!(staged[1].source, ContextSource::OlderTurn);
    }

    #[test]
    fn stage_candidates_stops_at_budget() {
        let now = Utc::now();
        let long_text = "x".repeat(4_000);
        let candidates = vec![
            MemoryCandidate::new(long_text.clone(), ContextSource::ForeverMemory, now),
            MemoryCandidate::new(long_text, ContextSource::ResearchCache, now),
        ];
        let staged = stage_candidates(candidates, 500, 1_000, &FreshnessTtls::default(), now);
        assert_eq!(staged.len(), 1);
    }

    #[test]
    fn stage_candidates_caps_each_item() {
        let now = Utc::now();
        let long_text = "y".repeat(10_000);
        let candidates = vec![MemoryCandidate::new(long_text, ContextSource::ForeverMemory, now)];
        let staged = stage_candidates(candidates, 10_000, 50, &FreshnessTtls::default(), now);
        assert!(staged[0].text.len() <= 200);
    }

    #[test]
    fn stale_volatile_candidate_is_flagged_historical() {
        let now = Utc::now();
        let stale = now - chrono::Duration::hours(2);
        let ttls = FreshnessTtls { volatile_secs: 60, stable_secs: 1_000, reference_secs: 10_000 };
        let candidates = vec![MemoryCandidate::new("stock price", ContextSource::ResearchCache, stale)
            .with_freshness(FreshnessClass::Volatile)];
        let staged = stage_candidates(candidates, 1_000, 500, &ttls, now);
        assert!(staged[0].historical);
    }
}
