//! Phase 2.1 — Context Retrieval: stages the priority-ordered candidate
//! list (forever memory, research cache, recent turns, older turns) that
//! Phase 2.2 will compress into a §2 draft. No LLM call happens here —
//! this is pure selection against the turn index and whatever long-term
//! stores the caller wires in.

use chrono::Utc;
use tracing::instrument;

use crate::document::{ContextDocument, ContextSource};
use crate::errors::PhaseError;
use crate::memory::{stage_candidates, MemoryCandidate};
use crate::phases::PhaseContext;

/// Per-item token cap used while staging; keeps one verbose turn from
/// crowding out everything else in the candidate list.
const PER_ITEM_TOKEN_CAP: u32 = 300;

/// Extra long-term stores beyond the turn index, supplied by the caller
/// (forever-memory notes, research-cache entries). Each is pre-tagged with
/// its source so staging only has to apply priority ordering and budget.
#[derive(Debug, Clone, Default)]
pub struct ExternalCandidates {
    pub forever_memory: Vec<MemoryCandidate>,
    pub research_cache: Vec<MemoryCandidate>,
}

#[instrument(skip(ctx, doc, external))]
pub fn run(
    ctx: &PhaseContext<'_>,
    doc: &ContextDocument,
    external: ExternalCandidates,
) -> Result<Vec<crate::document::ContextItem>, PhaseError> {
    doc.section_0().ok_or(PhaseError::Document(crate::errors::DocumentError::MissingSection {
        phase: "context_retrieval",
        section: "§0",
    }))?;

    let mut candidates = external.forever_memory;
    candidates.extend(external.research_cache);

    let recent = ctx
        .turn_index
        .recent(20)
        .map_err(|e| crate::errors::MemoryError::CacheReadFailed(e.to_string()))?;

    let now = Utc::now();
    let cutoff = recent.len().min(3);
    for (i, record) in recent.iter().enumerate() {
        let source = if i < cutoff { ContextSource::RecentTurn } else { ContextSource::OlderTurn };
        let text = record
            .response_text
            .clone()
            .unwrap_or_else(|| record.resolved_query.clone());
        candidates.push(MemoryCandidate::new(text, source, record.finished_at));
    }

    let budget = ctx.config.section_budget("§2");
    Ok(stage_candidates(candidates, budget, PER_ITEM_TOKEN_CAP, &ctx.config.engine().freshness, now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::document::{DataRequirements, Mode, QuerySection, UserPurpose};
    use crate::llm::{HttpLlmClient, LlmClient};
    use crate::persistence::index::TurnIndex;
    use crate::persistence::{TurnRecord, TurnWriter};
    use crate::recipes::RecipeRegistry;
    use crate::tools::ToolRegistry;
    use crate::workflows::WorkflowRegistry;
    use tempfile::tempdir;
    use uuid::Uuid;

    fn doc_with_query() -> ContextDocument {
        let mut doc = ContextDocument::new("s1", Mode::Chat);
        doc.commit_section_0(QuerySection {
            raw_query: "q".into(),
            resolved_query: "q".into(),
            user_purpose: UserPurpose::Informational,
            data_requirements: DataRequirements::default(),
            action_verbs: vec![],
            is_followup: false,
        })
        .unwrap();
        doc
    }

    #[test]
    fn run_requires_section_0() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf(), false, None).unwrap();
        let recipes = RecipeRegistry::load(None).unwrap();
        let tools = ToolRegistry::new();
        let workflows = WorkflowRegistry::default();
        let writer = TurnWriter::new(config.turns_dir.clone());
        let index = TurnIndex::new(config.turns_dir.clone());
        let llm: Box<dyn LlmClient> = Box::new(HttpLlmClient::new("http://x", "m"));
        let ctx = PhaseContext { config: &config, llm: llm.as_ref(), recipes: &recipes, tools: &tools, workflows: &workflows, turn_writer: &writer, turn_index: &index };
        let doc = ContextDocument::new("s1", Mode::Chat);

        let err = run(&ctx, &doc, ExternalCandidates::default()).unwrap_err();
        assert!(matches!(err, PhaseError::Document(_)));
    }

    #[test]
    fn run_stages_recent_turns_from_index() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf(), false, None).unwrap();
        std::fs::create_dir_all(&config.turns_dir).unwrap();
        let recipes = RecipeRegistry::load(None).unwrap();
        let tools = ToolRegistry::new();
        let workflows = WorkflowRegistry::default();
        let writer = TurnWriter::new(config.turns_dir.clone());
        let index = TurnIndex::new(config.turns_dir.clone());
        index
            .append(&TurnRecord {
                turn_id: Uuid::new_v4(),
                session_id: "s1".into(),
                started_at: Utc::now(),
                finished_at: Utc::now(),
                raw_query: "past question".into(),
                resolved_query: "past question".into(),
                status: crate::document::TurnStatus::Approved,
                response_text: Some("past answer".into()),
                keywords: vec![],
            })
            .unwrap();
        let llm: Box<dyn LlmClient> = Box::new(HttpLlmClient::new("http://x", "m"));
        let ctx = PhaseContext { config: &config, llm: llm.as_ref(), recipes: &recipes, tools: &tools, workflows: &workflows, turn_writer: &writer, turn_index: &index };
        let doc = doc_with_query();

        let staged = run(&ctx, &doc, ExternalCandidates::default()).unwrap();
        assert_eq!(staged.len(), 1);
        assert_eq!(staged[0].source, ContextSource::RecentTurn);
    }
}
