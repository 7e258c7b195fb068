//! Phase 3 — Planner: decomposes §0/§2 into goals, decides the route, and
//! on a RETRY loop-back selects how far to backtrack from the prior
//! validation's reason tags. Writes §3 fresh on every invocation.

use std::collections::HashMap;
use tracing::instrument;

use crate::document::{ContextDocument, RetryReason, Route, StrategicPlan};
use crate::errors::PhaseError;
use crate::llm::{ChatMessage, CompletionRequest};
use crate::phases::{PhaseContext, parse_llm_json};

/// How far the Orchestrator should loop back, derived from the prior
/// validation's reason tags (spec §5's backtracking-level selection).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BacktrackLevel {
    /// Stay in the current tactical loop — Executor/Coordinator retry.
    Tactical,
    /// Re-run retrieval/synthesis — §2 was insufficient.
    Context,
    /// Re-run the planner itself with a revised approach.
    Strategic,
}

pub fn backtrack_level(reasons: &[RetryReason]) -> BacktrackLevel {
    if reasons.iter().any(|r| matches!(r, RetryReason::GoalDependencyFailure)) {
        BacktrackLevel::Strategic
    } else if reasons.iter().any(|r| matches!(r, RetryReason::MissingEvidence)) {
        BacktrackLevel::Context
    } else {
        BacktrackLevel::Tactical
    }
}

#[instrument(skip(ctx, doc, prior_reason_tags))]
pub async fn run(
    ctx: &PhaseContext<'_>,
    doc: &mut ContextDocument,
    prior_reason_tags: &[RetryReason],
) -> Result<StrategicPlan, PhaseError> {
    let section_0 = doc
        .section_0()
        .ok_or(PhaseError::Document(crate::errors::DocumentError::MissingSection {
            phase: "planner",
            section: "§0",
        }))?;
    let section_2 = doc
        .section_2()
        .ok_or(PhaseError::Document(crate::errors::DocumentError::MissingSection {
            phase: "planner",
            section: "§2",
        }))?;

    let recipe = ctx.recipes.get("planner")?;
    let policy = ctx.config.role_policy("planner");

    let mut slots = HashMap::new();
    slots.insert("section_0", serde_json::to_string(section_0).unwrap_or_default());
    slots.insert("section_2", serde_json::to_string(section_2).unwrap_or_default());
    slots.insert("prior_validation", serde_json::to_string(prior_reason_tags).unwrap_or_default());
    let system_prompt = recipe.render(&slots);

    let response = ctx
        .llm
        .complete(CompletionRequest {
            role: "planner",
            messages: vec![ChatMessage::system(system_prompt), ChatMessage::user(section_0.resolved_query.clone())],
            temperature: policy.temperature,
            max_tokens: policy.max_tokens,
            json_schema: Some(recipe.json_schema.clone()),
        })
        .await?;

    let mut plan: StrategicPlan = parse_llm_json("planner", &response)?;
    // An empty goal list is only invalid on the tactical route — a plan that
    // routes straight to Synthesis/Clarify/Brainstorm has nothing for the
    // Executor to decompose and is exactly the E1 trivial-query fast path.
    if plan.goals.is_empty() && plan.route == Route::Executor {
        return Err(PhaseError::EmptyOutput { phase: "planner" });
    }

    let revision = doc.section_3().map(|p| p.revision + 1).unwrap_or(0);
    plan.revision = revision;

    doc.write_section_3(plan.clone())?;
    Ok(plan)
}
