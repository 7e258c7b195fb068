//! Typed error hierarchy for the turn engine.
//!
//! One enum per subsystem, matching the taxonomy in the design's error
//! handling section. Phase handlers and registries return these directly;
//! the Orchestrator is the only place that decides what to do with them
//! (bounded retry, loop-back, HALT, or partial-result short-circuit).

use thiserror::Error;

/// Errors from the ContextDocument itself: out-of-order writes, missing
/// prior sections, or a phase trying to re-open an already-committed one.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("phase {phase} requires section {section} which has not been committed")]
    MissingSection { phase: &'static str, section: &'static str },

    #[error("section {section} was already committed and cannot be written again")]
    AlreadyCommitted { section: &'static str },

    #[error("engine invariant violated: {0}")]
    InvariantViolation(String),
}

/// Errors from the LLM client (transport only; the client retries these
/// internally up to its configured limit before surfacing one here).
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request to {role} endpoint failed: {0}")]
    Transport(&'static str, #[source] reqwest::Error),

    #[error("{role} call returned HTTP {status}: {body}")]
    BadStatus {
        role: &'static str,
        status: u16,
        body: String,
    },

    #[error("{role} response was not valid JSON for the expected schema: {0}")]
    MalformedOutput(&'static str, String),

    #[error("{role} stream ended without a terminal event")]
    StreamTruncated { role: &'static str },

    #[error("exhausted {attempts} retries calling {role}")]
    RetriesExhausted { role: &'static str, attempts: u32 },
}

/// Errors from the Recipe Loader.
#[derive(Debug, Error)]
pub enum RecipeError {
    #[error("failed to read recipe file at {path}: {source}")]
    ReadFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse recipe '{name}': {message}")]
    ParseFailed { name: String, message: String },

    #[error("no recipe registered for phase '{phase}'")]
    NotFound { phase: &'static str },
}

/// Errors from the Tool Registry and mode gate.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("no tool registered for family '{family}'")]
    UnknownFamily { family: String },

    #[error("tool family '{family}' is mutating and mode is chat (read-only)")]
    ModeGateRejected { family: String },

    #[error("tool '{tool}' rejected input: {message}")]
    InvalidInput { tool: String, message: String },

    #[error("tool '{tool}' call failed: {message}")]
    CallFailed { tool: String, message: String },

    #[error("tool '{tool}' timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },

    #[error("code mode write outside repository root: {path}")]
    WriteOutsideRoot { path: std::path::PathBuf },
}

/// Errors from the Workflow Registry / Workflow Engine.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("failed to read workflow bundle at {path}: {source}")]
    ReadFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse workflow bundle '{name}': {message}")]
    ParseFailed { name: String, message: String },

    #[error("workflow '{workflow}' step {step} references unknown tool family '{family}'")]
    UnknownStepFamily {
        workflow: String,
        step: usize,
        family: String,
    },

    #[error(transparent)]
    Tool(#[from] ToolError),
}

/// Errors from the memory/context retrieval subsystem.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("memory store search failed: {0}")]
    SearchFailed(String),

    #[error("research cache read failed: {0}")]
    CacheReadFailed(String),

    #[error("unknown freshness class '{0}'")]
    UnknownFreshnessClass(String),
}

/// Errors from a single phase's execution.
#[derive(Debug, Error)]
pub enum PhaseError {
    #[error("query could not be classified: input was empty or non-textual")]
    UnusableInput,

    #[error("{phase} emitted empty or ill-formed structured output")]
    EmptyOutput { phase: &'static str },

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Recipe(#[from] RecipeError),
}

/// Errors from the Orchestrator: loop limits, budgets, and invariants that
/// span multiple phases.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("{section} exceeded its token budget even after compression")]
    BudgetOverflow { section: &'static str },

    #[error("loop limit '{limit}' exceeded ({count}/{max})")]
    LoopLimit {
        limit: &'static str,
        count: u32,
        max: u32,
    },

    #[error("all validation attempts exhausted without an APPROVE")]
    ValidationExhausted,

    #[error(transparent)]
    Phase(#[from] PhaseError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from turn persistence (Phase 8 / turn directory / index).
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to create turn directory at {path}: {source}")]
    CreateDirFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {artifact} for turn {turn_id}: {source}")]
    WriteFailed {
        artifact: &'static str,
        turn_id: uuid::Uuid,
        #[source]
        source: std::io::Error,
    },

    #[error("turn index entry for {turn_id} could not be serialized: {0}")]
    SerializeFailed {
        turn_id: uuid::Uuid,
        #[source]
        source_message: String,
    },
}

/// Errors surfaced at the Gateway HTTP boundary.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no active turn for session '{session_id}'")]
    NoActiveTurn { session_id: String },

    #[error("intervention '{id}' not found or already resolved")]
    UnknownIntervention { id: String },

    #[error("invalid mode: expected 'chat' or 'code', got '{0}'")]
    InvalidMode(String),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_error_missing_section_carries_both_names() {
        let err = DocumentError::MissingSection {
            phase: "planner",
            section: "§2",
        };
        let msg = err.to_string();
        assert!(msg.contains("planner"));
        assert!(msg.contains("§2"));
    }

    #[test]
    fn tool_error_mode_gate_rejected_is_matchable() {
        let err = ToolError::ModeGateRejected {
            family: "file_delete".to_string(),
        };
        assert!(matches!(err, ToolError::ModeGateRejected { .. }));
        assert!(err.to_string().contains("mode is chat"));
    }

    #[test]
    fn phase_error_converts_from_llm_error() {
        let inner = LlmError::StreamTruncated { role: "planner" };
        let phase_err: PhaseError = inner.into();
        assert!(matches!(phase_err, PhaseError::Llm(LlmError::StreamTruncated { .. })));
    }

    #[test]
    fn orchestrator_error_loop_limit_carries_counts() {
        let err = OrchestratorError::LoopLimit {
            limit: "inner_exec_coord",
            count: 8,
            max: 8,
        };
        let msg = err.to_string();
        assert!(msg.contains("inner_exec_coord"));
        assert!(msg.contains("8/8"));
    }

    #[test]
    fn orchestrator_error_converts_from_phase_error() {
        let inner = PhaseError::UnusableInput;
        let orch_err: OrchestratorError = inner.into();
        assert!(matches!(
            orch_err,
            OrchestratorError::Phase(PhaseError::UnusableInput)
        ));
    }

    #[test]
    fn gateway_error_no_active_turn_carries_session() {
        let err = GatewayError::NoActiveTurn {
            session_id: "s-1".to_string(),
        };
        assert!(err.to_string().contains("s-1"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&DocumentError::AlreadyCommitted { section: "§2" });
        assert_std_error(&RecipeError::NotFound { phase: "planner" });
        assert_std_error(&ToolError::UnknownFamily {
            family: "web_fetch".to_string(),
        });
        assert_std_error(&WorkflowError::UnknownStepFamily {
            workflow: "shop".to_string(),
            step: 0,
            family: "checkout".to_string(),
        });
        assert_std_error(&MemoryError::SearchFailed("x".into()));
        assert_std_error(&PhaseError::UnusableInput);
        assert_std_error(&OrchestratorError::ValidationExhausted);
    }
}
