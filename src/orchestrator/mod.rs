//! Sequential phase orchestration: the single owner of phase sequencing,
//! inner/outer loop limits, retry accounting, and injection checkpointing.
//! No LLM prompting lives here — it calls phase handlers and interprets
//! their results.

pub mod events;
pub mod state;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use crate::document::{
    ContextDocument, Decision, Mode, RevisionMarker, Route, SynthesisDraft, TurnStatus, ValidationAttempt,
    ValidationChecks, ValidatorDecision,
};
use crate::errors::OrchestratorError;
use crate::injection::InjectionManager;
use crate::phases::context_retrieval::ExternalCandidates;
use crate::phases::executor::ExecutorAction;
use crate::phases::{self, PhaseContext};

pub use events::TurnEvent;

/// All bounded counters the Orchestrator enforces, loaded from
/// `EngineToml.loop_limits`. Defaults mirror the turn engine's stated
/// typical values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorLimits {
    pub max_inner_loop_iterations: u32,
    pub max_consecutive_coordinator_failures: u32,
    pub max_context_validator_retries: u32,
    pub max_revise: u32,
    pub max_retry: u32,
    pub max_validation_attempts: u32,
}

impl Default for OrchestratorLimits {
    fn default() -> Self {
        Self {
            max_inner_loop_iterations: 8,
            max_consecutive_coordinator_failures: 3,
            max_context_validator_retries: 2,
            max_revise: 2,
            max_retry: 1,
            max_validation_attempts: 3,
        }
    }
}

/// What one completed turn produced, handed back to the Gateway.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub turn_id: uuid::Uuid,
    pub response_text: String,
    pub status: TurnStatus,
}

pub struct Orchestrator<'a> {
    ctx: &'a PhaseContext<'a>,
    injections: &'a InjectionManager,
    events: broadcast::Sender<TurnEvent>,
}

impl<'a> Orchestrator<'a> {
    /// `events` is the Gateway's per-turn progress channel. A send that
    /// finds no subscribers (no one watching the SSE stream) is not an
    /// error — the turn still has to run.
    pub fn new(ctx: &'a PhaseContext<'a>, injections: &'a InjectionManager, events: broadcast::Sender<TurnEvent>) -> Self {
        Self { ctx, injections, events }
    }

    fn emit(&self, event: TurnEvent) {
        let _ = self.events.send(event);
    }

    /// Drives one turn from raw query to archived response. `turn_id` is
    /// caller-supplied (the Gateway mints it before this call so it can
    /// frame the SSE stream with the same id the archive ends up under).
    #[instrument(skip(self, conversation_buffer, external))]
    pub async fn run_turn(
        &self,
        turn_id: uuid::Uuid,
        session_id: &str,
        mode: Mode,
        raw_query: &str,
        conversation_buffer: &[String],
        external: ExternalCandidates,
    ) -> Result<TurnOutcome, OrchestratorError> {
        let mut doc = ContextDocument::with_turn_id(turn_id, session_id, mode);
        self.injections.register(session_id);
        let result = self.drive(&mut doc, raw_query, conversation_buffer, external).await;
        self.injections.release(session_id);
        result
    }

    async fn drive(
        &self,
        doc: &mut ContextDocument,
        raw_query: &str,
        conversation_buffer: &[String],
        external: ExternalCandidates,
    ) -> Result<TurnOutcome, OrchestratorError> {
        let limits = self.ctx.config.loop_limits();

        self.emit(TurnEvent::PhaseStarted { phase: "query_analyzer" });
        phases::query_analyzer::run(self.ctx, doc, raw_query, conversation_buffer).await?;
        self.emit(TurnEvent::PhaseFinished { phase: "query_analyzer" });

        self.emit(TurnEvent::PhaseStarted { phase: "query_validator" });
        let query_decision = phases::query_validator::run(self.ctx, doc).await?;
        self.emit(TurnEvent::PhaseFinished { phase: "query_validator" });
        if query_decision == ValidatorDecision::Clarify {
            return self.clarify(doc).await;
        }
        // A 1.5 RETRY cannot re-invoke Phase 1 under the append-only §0
        // model (§0 commits exactly once); we record the verdict in §1
        // and proceed with the query already resolved, same as a PASS.

        let mut context_retries = 0u32;
        loop {
            self.emit(TurnEvent::PhaseStarted { phase: "context_retrieval" });
            let staged = phases::context_retrieval::run(self.ctx, doc, external.clone())?;
            self.emit(TurnEvent::PhaseFinished { phase: "context_retrieval" });

            self.emit(TurnEvent::PhaseStarted { phase: "context_synthesis" });
            phases::context_synthesis::run(self.ctx, doc, staged).await?;
            self.emit(TurnEvent::PhaseFinished { phase: "context_synthesis" });

            self.emit(TurnEvent::PhaseStarted { phase: "context_validator" });
            let (decision, issues) = phases::context_validator::run(self.ctx, doc).await?;
            self.emit(TurnEvent::PhaseFinished { phase: "context_validator" });
            if decision == ValidatorDecision::Pass {
                break;
            }
            context_retries += 1;
            if context_retries > limits.max_context_validator_retries {
                return self
                    .halt(doc, format!("could not assemble reliable context: {}", issues.join("; ")))
                    .await;
            }
        }

        let mut prior_reasons = Vec::new();
        let mut revise_count = 0u32;
        let mut retry_count = 0u32;
        let mut best_seen: Option<(f64, String)> = None;
        let mut final_decision = Decision::Fail;
        let mut turn_cancelled = false;
        let mut run_planner = true;

        loop {
            if run_planner {
                self.emit(TurnEvent::PhaseStarted { phase: "planner" });
                phases::planner::run(self.ctx, doc, &prior_reasons).await?;
                self.emit(TurnEvent::PhaseFinished { phase: "planner" });
                // §4.5: only a §3 route of Executor needs the tactical loop — if §2
                // already answers §0, the Planner routes straight to Synthesis and
                // phases 4/5 are skipped entirely (E1).
                let route = doc.section_3().expect("planner just committed §3").route;
                if route == Route::Executor {
                    turn_cancelled = self.run_inner_loop(doc, &limits).await?;
                }
            }
            run_planner = true;

            let hints = doc.section_7().attempts.last().map(|a| a.revision_hints.clone()).unwrap_or_default();
            self.emit(TurnEvent::PhaseStarted { phase: "synthesis" });
            phases::synthesis::run(self.ctx, doc, &hints).await?;
            self.emit(TurnEvent::PhaseFinished { phase: "synthesis" });

            self.emit(TurnEvent::PhaseStarted { phase: "validation" });
            let decision = phases::validation::run(self.ctx, doc).await?;
            self.emit(TurnEvent::PhaseFinished { phase: "validation" });
            let attempt = doc.section_7().attempts.last().expect("validation just appended an attempt");
            let confidence = attempt.confidence;
            let reason_tags = attempt.reason_tags.clone();
            final_decision = decision;
            self.emit(TurnEvent::ValidationAttempt { attempt: attempt.attempt, decision, confidence });

            if best_seen.as_ref().map(|(c, _)| confidence > *c).unwrap_or(true) {
                let text = doc.section_6().map(|d| d.text.clone()).unwrap_or_default();
                best_seen = Some((confidence, text));
            }

            if turn_cancelled {
                break;
            }
            if doc.section_7().attempts.len() as u32 >= limits.max_validation_attempts {
                break;
            }

            match decision {
                Decision::Approve | Decision::Fail => break,
                Decision::Revise => {
                    if revise_count >= limits.max_revise {
                        break;
                    }
                    revise_count += 1;
                    run_planner = false;
                }
                Decision::Retry => {
                    if retry_count >= limits.max_retry {
                        break;
                    }
                    retry_count += 1;
                    doc.record_revision(RevisionMarker {
                        attempt: doc.section_7().attempts.len() as u32,
                        from_phase: "phase_7",
                        reason_tags: reason_tags.clone(),
                        at: Utc::now(),
                    });
                    prior_reasons = reason_tags;
                }
            }
        }

        let response_text = if final_decision == Decision::Approve && !turn_cancelled {
            doc.section_6().map(|d| d.text.clone()).unwrap_or_default()
        } else {
            best_seen
                .map(|(_, text)| text)
                .unwrap_or_else(|| doc.section_6().map(|d| d.text.clone()).unwrap_or_default())
        };

        let status = if turn_cancelled {
            TurnStatus::Partial
        } else {
            match final_decision {
                Decision::Approve => TurnStatus::Approved,
                Decision::Revise | Decision::Retry => TurnStatus::Partial,
                Decision::Fail => TurnStatus::Failed,
            }
        };

        phases::save::run(self.ctx, doc, status).await?;
        self.emit(TurnEvent::Finished { status });
        Ok(TurnOutcome { turn_id: doc.turn_id, response_text, status })
    }

    /// Runs the executor/coordinator tactical loop. Returns `true` if a
    /// pending CANCEL was observed and the turn should wind down early.
    async fn run_inner_loop(&self, doc: &mut ContextDocument, limits: &OrchestratorLimits) -> Result<bool, OrchestratorError> {
        let mut consecutive_failures = 0u32;

        for iteration in 0..limits.max_inner_loop_iterations {
            let drain = self.injections.checkpoint(&doc.session_id);
            if drain.cancelled {
                info!(turn_id = %doc.turn_id, "inner loop cancelled by injection");
                self.emit(TurnEvent::Cancelled);
                return Ok(true);
            }
            for note in &drain.redirects {
                self.emit(TurnEvent::Redirected { note: note.clone() });
            }

            self.emit(TurnEvent::InnerLoopIteration { iteration });
            let action = phases::executor::run(self.ctx, doc, &drain.redirects).await?;
            match action {
                ExecutorAction::Execute { command } => {
                    let status = phases::coordinator::run(self.ctx, doc, &command).await?;
                    if let Some(entry) = doc.section_4().entries.last() {
                        let name = match &entry.invocation {
                            crate::document::Invocation::Workflow { name, .. } => name.clone(),
                            crate::document::Invocation::Tool { tool, .. } => tool.clone(),
                            crate::document::Invocation::Blocked { reason } => reason.clone(),
                        };
                        self.emit(TurnEvent::ToolInvoked { name, status });
                    }
                    if status == crate::document::EntryStatus::Failed {
                        consecutive_failures += 1;
                    } else {
                        consecutive_failures = 0;
                    }
                    if consecutive_failures >= limits.max_consecutive_coordinator_failures {
                        warn!(turn_id = %doc.turn_id, "inner loop forced to stop: too many consecutive coordinator failures");
                        break;
                    }
                }
                ExecutorAction::Analyze => {}
                ExecutorAction::Complete => break,
                ExecutorAction::Blocked { reason } => {
                    info!(turn_id = %doc.turn_id, reason, "executor reported blocked");
                    break;
                }
            }
        }
        Ok(false)
    }

    /// §1.5 CLARIFY: bypasses phases 3–7 entirely with a clarification
    /// response built from the validator's gap list.
    async fn clarify(&self, doc: &mut ContextDocument) -> Result<TurnOutcome, OrchestratorError> {
        let issues = doc.section_1().map(|v| v.issues.clone()).unwrap_or_default();
        let message = if issues.is_empty() {
            "Could you clarify what you're looking for?".to_string()
        } else {
            format!("Before I continue, could you clarify: {}", issues.join("; "))
        };
        doc.write_section_6(SynthesisDraft { text: message.clone(), source_map: vec![] })?;
        doc.append_section_7(ValidationAttempt {
            attempt: 0,
            decision: Decision::Approve,
            confidence: 1.0,
            checks: ValidationChecks {
                claims_supported: true,
                no_hallucinations: true,
                query_addressed: false,
                coherent_format: true,
            },
            issues,
            revision_hints: vec![],
            suggested_fixes: None,
            reason_tags: vec![],
        })?;
        phases::save::run(self.ctx, doc, TurnStatus::Clarification).await?;
        self.emit(TurnEvent::Finished { status: TurnStatus::Clarification });
        Ok(TurnOutcome { turn_id: doc.turn_id, response_text: message, status: TurnStatus::Clarification })
    }

    /// Early termination path for a §2-validator retry exhaustion or any
    /// other pre-synthesis HALT: synthesizes a failure explanation so
    /// Phase 8's invariants (§6/§7 present) still hold.
    async fn halt(&self, doc: &mut ContextDocument, message: String) -> Result<TurnOutcome, OrchestratorError> {
        if doc.section_6().is_none() {
            doc.write_section_6(SynthesisDraft { text: message.clone(), source_map: vec![] })?;
        }
        if doc.section_7().attempts.is_empty() {
            doc.append_section_7(ValidationAttempt {
                attempt: 0,
                decision: Decision::Fail,
                confidence: 0.0,
                checks: ValidationChecks::default(),
                issues: vec![message.clone()],
                revision_hints: vec![],
                suggested_fixes: None,
                reason_tags: vec![],
            })?;
        }
        phases::save::run(self.ctx, doc, TurnStatus::Failed).await?;
        self.emit(TurnEvent::Finished { status: TurnStatus::Failed });
        Ok(TurnOutcome { turn_id: doc.turn_id, response_text: message, status: TurnStatus::Failed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::document::Mode;
    use crate::llm::{ChatMessage, CompletionRequest, LlmClient};
    use crate::persistence::index::TurnIndex;
    use crate::persistence::TurnWriter;
    use crate::recipes::RecipeRegistry;
    use crate::tools::ToolRegistry;
    use crate::workflows::WorkflowRegistry;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    /// Routes canned responses by recipe role so a whole turn can run
    /// against one stub.
    struct ScriptedLlm {
        calls: AtomicUsize,
    }

    impl ScriptedLlm {
        fn new() -> Self {
            Self { calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, request: CompletionRequest) -> Result<String, crate::errors::LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let body = match request.role {
                "query_analyzer" => serde_json::json!({
                    "raw_query": "",
                    "resolved_query": "find a quiet laptop",
                    "user_purpose": "informational",
                    "data_requirements": {},
                    "action_verbs": ["find"],
                    "is_followup": false,
                }),
                "query_validator" | "context_validator" => serde_json::json!({ "decision": "pass", "issues": [] }),
                "context_synthesis" => serde_json::json!({ "items": [], "preferences": [], "open_questions": [] }),
                "planner" => serde_json::json!({
                    "goals": [{ "id": "g1", "description": "find a quiet laptop", "priority": 1, "depends_on": [] }],
                    "approach": "search the catalog",
                    "route": "executor",
                    "success_criteria": ["at least one match"],
                    "workpad": null,
                    "revision": 0,
                }),
                "executor" => serde_json::json!({ "action": "complete" }),
                "synthesis" => serde_json::json!({ "text": "The X1 Carbon is quiet and fits your budget.", "source_map": [] }),
                "validator" => serde_json::json!({
                    "checks": { "claims_supported": true, "no_hallucinations": true, "query_addressed": true, "coherent_format": true },
                    "confidence": 0.9,
                    "issues": [],
                    "revision_hints": [],
                    "suggested_fixes": null,
                    "reason_tags": [],
                }),
                other => panic!("unexpected role in test: {other}"),
            };
            Ok(body.to_string())
        }
    }

    fn harness(dir: &std::path::Path) -> (Config, RecipeRegistry, ToolRegistry, WorkflowRegistry, TurnWriter, TurnIndex) {
        let config = Config::new(dir.to_path_buf(), false, None).unwrap();
        let recipes = RecipeRegistry::load(None).unwrap();
        let tools = ToolRegistry::new();
        let workflows = WorkflowRegistry::default();
        let writer = TurnWriter::new(config.turns_dir.clone());
        let index = TurnIndex::new(config.turns_dir.clone());
        (config, recipes, tools, workflows, writer, index)
    }

    #[tokio::test]
    async fn happy_path_turn_approves_on_first_attempt() {
        let dir = tempdir().unwrap();
        let (config, recipes, tools, workflows, writer, index) = harness(dir.path());
        let llm = ScriptedLlm::new();
        let ctx = PhaseContext { config: &config, llm: &llm, recipes: &recipes, tools: &tools, workflows: &workflows, turn_writer: &writer, turn_index: &index };
        let injections = InjectionManager::new();
        let (events_tx, _events_rx) = broadcast::channel(32);
        let orchestrator = Orchestrator::new(&ctx, &injections, events_tx);

        let outcome = orchestrator
            .run_turn(uuid::Uuid::new_v4(), "s1", Mode::Chat, "what laptop should I buy", &[], ExternalCandidates::default())
            .await
            .unwrap();

        assert_eq!(outcome.status, TurnStatus::Approved);
        assert!(outcome.response_text.contains("X1 Carbon"));
        assert!(!injections.has_active_turn("s1"));
    }

    /// Like [`ScriptedLlm`], but the Planner routes straight to Synthesis
    /// with an empty goal list — the E1 trivial-query fast path — and
    /// panics if `executor` or `coordinator` is ever prompted, since
    /// phases 4/5 must be skipped entirely for this route.
    struct TrivialRouteLlm;

    #[async_trait]
    impl LlmClient for TrivialRouteLlm {
        async fn complete(&self, request: CompletionRequest) -> Result<String, crate::errors::LlmError> {
            let body = match request.role {
                "query_analyzer" => serde_json::json!({
                    "raw_query": "",
                    "resolved_query": "what time is it",
                    "user_purpose": "trivial",
                    "data_requirements": {},
                    "action_verbs": [],
                    "is_followup": false,
                }),
                "query_validator" | "context_validator" => serde_json::json!({ "decision": "pass", "issues": [] }),
                "context_synthesis" => serde_json::json!({ "items": [], "preferences": [], "open_questions": [] }),
                "planner" => serde_json::json!({
                    "goals": [],
                    "approach": "answer directly from context",
                    "route": "synthesis",
                    "success_criteria": [],
                    "workpad": null,
                    "revision": 0,
                }),
                "synthesis" => serde_json::json!({ "text": "It's whatever time your system clock says.", "source_map": [] }),
                "validator" => serde_json::json!({
                    "checks": { "claims_supported": true, "no_hallucinations": true, "query_addressed": true, "coherent_format": true },
                    "confidence": 0.9,
                    "issues": [],
                    "revision_hints": [],
                    "suggested_fixes": null,
                    "reason_tags": [],
                }),
                other => panic!("phase 4/5 must be skipped on a synthesis route, got unexpected role: {other}"),
            };
            Ok(body.to_string())
        }
    }

    #[tokio::test]
    async fn trivial_query_routes_straight_to_synthesis_skipping_executor_and_coordinator() {
        let dir = tempdir().unwrap();
        let (config, recipes, tools, workflows, writer, index) = harness(dir.path());
        let llm = TrivialRouteLlm;
        let ctx = PhaseContext { config: &config, llm: &llm, recipes: &recipes, tools: &tools, workflows: &workflows, turn_writer: &writer, turn_index: &index };
        let injections = InjectionManager::new();
        let (events_tx, _events_rx) = broadcast::channel(32);
        let orchestrator = Orchestrator::new(&ctx, &injections, events_tx);

        let outcome = orchestrator
            .run_turn(uuid::Uuid::new_v4(), "s1", Mode::Chat, "what time is it", &[], ExternalCandidates::default())
            .await
            .unwrap();

        assert_eq!(outcome.status, TurnStatus::Approved);
        assert!(outcome.response_text.contains("system clock"));
    }

    #[tokio::test]
    async fn cancel_mid_inner_loop_marks_turn_partial() {
        let dir = tempdir().unwrap();
        let (config, recipes, tools, workflows, writer, index) = harness(dir.path());
        let llm = ScriptedLlm::new();
        let ctx = PhaseContext { config: &config, llm: &llm, recipes: &recipes, tools: &tools, workflows: &workflows, turn_writer: &writer, turn_index: &index };
        let injections = InjectionManager::new();
        injections.register("s1");
        injections.submit("s1", crate::injection::InjectionMessage::Cancel);
        let (events_tx, _events_rx) = broadcast::channel(32);
        let orchestrator = Orchestrator::new(&ctx, &injections, events_tx);

        let mut doc = ContextDocument::new("s1", Mode::Chat);
        let outcome = orchestrator.drive(&mut doc, "what laptop should I buy", &[], ExternalCandidates::default()).await.unwrap();

        assert_eq!(outcome.status, TurnStatus::Partial);
    }
}
