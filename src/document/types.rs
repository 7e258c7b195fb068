//! Section payload types for the [`super::ContextDocument`].
//!
//! Each type here is the committed content of one §; the document itself
//! only tracks ordering and commit state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Closed set of classified user intents. Ambiguous queries must map to
/// `Clarification`, never be guessed into one of the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserPurpose {
    TransactionalShopping,
    Informational,
    Navigational,
    Code,
    Recall,
    Clarification,
    Retry,
    Metadata,
    Trivial,
}

impl UserPurpose {
    pub fn is_trivial(&self) -> bool {
        matches!(self, Self::Trivial)
    }
}

/// Explicit constraints extracted from the query. `extra` carries any flag
/// the closed fields don't name, keyed by flag name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataRequirements {
    #[serde(default)]
    pub needs_current_prices: bool,
    #[serde(default)]
    pub freshness_tolerance: Option<String>,
    #[serde(default)]
    pub must_avoid: Vec<String>,
    #[serde(default)]
    pub budget: Option<f64>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// §0 — resolved query, classification, and extracted constraints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySection {
    pub raw_query: String,
    pub resolved_query: String,
    pub user_purpose: UserPurpose,
    pub data_requirements: DataRequirements,
    pub action_verbs: Vec<String>,
    pub is_followup: bool,
}

/// Verdict shared by the §1.5 query validator and the (unpersisted) §2.5
/// context validator gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorDecision {
    Pass,
    Retry,
    Clarify,
}

/// §1 — query-analyzer validation verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryValidation {
    pub decision: ValidatorDecision,
    pub issues: Vec<String>,
}

/// Where a §2 candidate record came from, in retrieval priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextSource {
    ForeverMemory,
    ResearchCache,
    RecentTurn,
    OlderTurn,
}

/// TTL class governing whether a §2 item may still be cited as current
/// evidence in §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreshnessClass {
    Volatile,
    Stable,
    Reference,
}

/// A single piece of synthesized context carried in §2.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextItem {
    pub text: String,
    pub source: ContextSource,
    pub freshness: FreshnessClass,
    pub recorded_at: DateTime<Utc>,
    /// True once the item has aged out of its TTL or is flagged volatile;
    /// historical items cannot be cited as current evidence in §6.
    pub historical: bool,
}

/// §2 — selected and synthesized context, committed only after §2.5 passes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextBundle {
    pub items: Vec<ContextItem>,
    pub preferences: Vec<String>,
    pub open_questions: Vec<String>,
}

/// One strategic goal within §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub description: String,
    pub priority: u32,
    pub depends_on: Vec<String>,
}

/// Ephemeral planning scratch space; never persisted to long-term memory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workpad {
    pub assumptions: Vec<String>,
    pub constraints: Vec<String>,
    pub risks: Vec<String>,
    pub open_questions: Vec<String>,
}

/// Where Phase 3 sends the turn next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Executor,
    Synthesis,
    Clarify,
    Brainstorm,
}

/// §3 — strategic plan. `revision` bumps on every replan so later phases
/// can detect that backtracking occurred.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategicPlan {
    pub goals: Vec<Goal>,
    pub approach: String,
    pub route: Route,
    pub success_criteria: Vec<String>,
    pub workpad: Option<Workpad>,
    pub revision: u32,
}

/// Evidence class backing a [`Claim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    Tool,
    Memory,
    Context,
}

/// A single attributable fact extracted from a tool or context result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub id: Uuid,
    pub text: String,
    pub source_ref: String,
    pub evidence_kind: EvidenceKind,
    pub confidence: f64,
}

impl Claim {
    pub fn new(
        text: impl Into<String>,
        source_ref: impl Into<String>,
        evidence_kind: EvidenceKind,
        confidence: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            source_ref: source_ref.into(),
            evidence_kind,
            confidence,
        }
    }
}

/// What the Coordinator dispatched to in one §4 entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Invocation {
    Workflow { name: String, step_count: usize },
    Tool { family: String, tool: String },
    Blocked { reason: String },
}

/// Terminal state of one §4 entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Ok,
    Failed,
    Blocked,
}

/// One append-only §4 record: an executor command, what it dispatched to,
/// and the claims extracted from the result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEntry {
    pub iteration: u32,
    pub executor_command: String,
    pub invocation: Invocation,
    pub raw_result: serde_json::Value,
    pub claims: Vec<Claim>,
    pub status: EntryStatus,
}

/// Marks a RETRY loop-back in §4 without truncating prior entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionMarker {
    pub attempt: u32,
    pub from_phase: &'static str,
    pub reason_tags: Vec<RetryReason>,
    pub at: DateTime<Utc>,
}

/// §4 — append-only execution log plus any revision markers recorded
/// across RETRY loop-backs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub entries: Vec<ExecutionEntry>,
    pub revision_markers: Vec<RevisionMarker>,
}

/// One sentence of §6, with the claim or §2 record it traces back to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMapEntry {
    pub sentence: String,
    pub claim_id: Option<Uuid>,
    pub context_item_index: Option<usize>,
}

/// §6 — synthesized draft response and its source map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisDraft {
    pub text: String,
    pub source_map: Vec<SourceMapEntry>,
}

/// Closed set of structured reasons a RETRY can cite, so the Planner can
/// select a backtracking level without parsing prose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryReason {
    RequirementViolation,
    ToolFailure,
    MissingEvidence,
    WorkflowMismatch,
    GoalDependencyFailure,
}

/// Terminal decision of one validation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Revise,
    Retry,
    Fail,
}

/// The four boolean gates Phase 7 evaluates.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ValidationChecks {
    pub claims_supported: bool,
    pub no_hallucinations: bool,
    pub query_addressed: bool,
    pub coherent_format: bool,
}

impl ValidationChecks {
    pub fn all_pass(&self) -> bool {
        self.claims_supported && self.no_hallucinations && self.query_addressed && self.coherent_format
    }
}

/// One sub-block of §7: the result of a single validation attempt. §7
/// accumulates these; it never overwrites a prior attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationAttempt {
    pub attempt: u32,
    pub decision: Decision,
    pub confidence: f64,
    pub checks: ValidationChecks,
    pub issues: Vec<String>,
    pub revision_hints: Vec<String>,
    pub suggested_fixes: Option<String>,
    pub reason_tags: Vec<RetryReason>,
}

/// §7 — validation history across all attempts of this turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub attempts: Vec<ValidationAttempt>,
}

impl ValidationRecord {
    /// The attempt with the highest confidence seen so far, used for
    /// best-seen tracking when every attempt ends in FAIL.
    pub fn best_seen(&self) -> Option<&ValidationAttempt> {
        self.attempts
            .iter()
            .max_by(|a, b| a.confidence.partial_cmp(&b.confidence).unwrap())
    }
}

/// Final status recorded in §8 / the turn index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Approved,
    Partial,
    Failed,
    Clarification,
}

/// §8 — save record written once the turn is finalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveRecord {
    pub turn_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub archive_path: String,
    pub index_entries_written: Vec<String>,
}
