//! The nine phases of one turn. Each phase is a free function over a
//! shared [`PhaseContext`] and the turn's [`ContextDocument`]; the
//! Orchestrator is the only thing that sequences them.

pub mod context_retrieval;
pub mod context_synthesis;
pub mod context_validator;
pub mod coordinator;
pub mod executor;
pub mod planner;
pub mod query_analyzer;
pub mod query_validator;
pub mod save;
pub mod synthesis;
pub mod validation;

use crate::config::Config;
use crate::llm::LlmClient;
use crate::persistence::TurnWriter;
use crate::persistence::index::TurnIndex;
use crate::recipes::RecipeRegistry;
use crate::tools::ToolRegistry;
use crate::workflows::WorkflowRegistry;

/// Everything a phase needs beyond the document it's operating on. Built
/// once per process and shared (by reference) across every turn.
pub struct PhaseContext<'a> {
    pub config: &'a Config,
    pub llm: &'a dyn LlmClient,
    pub recipes: &'a RecipeRegistry,
    pub tools: &'a ToolRegistry,
    pub workflows: &'a WorkflowRegistry,
    pub turn_writer: &'a TurnWriter,
    pub turn_index: &'a TurnIndex,
}

/// Parses a recipe's required JSON response, mapping a decode failure to
/// the phase-appropriate `LlmError::MalformedOutput`.
pub(crate) fn parse_llm_json<T: serde::de::DeserializeOwned>(
    role: &'static str,
    raw: &str,
) -> Result<T, crate::errors::LlmError> {
    serde_json::from_str(raw).map_err(|e| crate::errors::LlmError::MalformedOutput(role, e.to_string()))
}
