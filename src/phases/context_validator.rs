//! Phase 2.5 — Context Validator: gates the §2.2 draft. On PASS, commits
//! §2 so later phases can read it; on RETRY/CLARIFY the draft stays
//! uncommitted and the Orchestrator loops back into retrieval/synthesis.

use std::collections::HashMap;
use tracing::instrument;

use crate::document::{ContextDocument, ValidatorDecision};
use crate::errors::PhaseError;
use crate::llm::{ChatMessage, CompletionRequest};
use crate::phases::{PhaseContext, parse_llm_json};

#[instrument(skip(ctx, doc))]
pub async fn run(ctx: &PhaseContext<'_>, doc: &mut ContextDocument) -> Result<(ValidatorDecision, Vec<String>), PhaseError> {
    let draft = doc
        .section_2_draft()
        .ok_or(PhaseError::Document(crate::errors::DocumentError::MissingSection {
            phase: "context_validator",
            section: "§2 draft",
        }))?;

    let recipe = ctx.recipes.get("context_validator")?;
    let policy = ctx.config.role_policy("validator");

    let draft_json = serde_json::to_string(draft).unwrap_or_default();
    let mut slots = HashMap::new();
    slots.insert("section_2", draft_json.clone());
    let system_prompt = recipe.render(&slots);

    let response = ctx
        .llm
        .complete(CompletionRequest {
            role: "context_validator",
            messages: vec![ChatMessage::system(system_prompt), ChatMessage::user(draft_json)],
            temperature: policy.temperature,
            max_tokens: policy.max_tokens,
            json_schema: Some(recipe.json_schema.clone()),
        })
        .await?;

    let validation: crate::document::QueryValidation = parse_llm_json("context_validator", &response)?;

    if validation.decision == ValidatorDecision::Pass {
        doc.commit_section_2()?;
    }

    Ok((validation.decision, validation.issues))
}
