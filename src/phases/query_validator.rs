//! Phase 1.5 — Query Validator: checks §0 for coverage, consistency, and
//! contradictions before any retrieval happens. Commits §1; the returned
//! decision tells the Orchestrator whether to proceed, loop back into
//! Phase 1, or route straight to clarification.

use std::collections::HashMap;
use tracing::instrument;

use crate::document::{ContextDocument, QueryValidation, ValidatorDecision};
use crate::errors::PhaseError;
use crate::llm::{ChatMessage, CompletionRequest};
use crate::phases::{PhaseContext, parse_llm_json};

#[instrument(skip(ctx, doc))]
pub async fn run(ctx: &PhaseContext<'_>, doc: &mut ContextDocument) -> Result<ValidatorDecision, PhaseError> {
    let section_0 = doc
        .section_0()
        .ok_or(PhaseError::Document(crate::errors::DocumentError::MissingSection {
            phase: "query_validator",
            section: "§0",
        }))?;

    let recipe = ctx.recipes.get("query_validator")?;
    let policy = ctx.config.role_policy("validator");

    let mut slots = HashMap::new();
    slots.insert("section_0", serde_json::to_string(section_0).unwrap_or_default());
    let system_prompt = recipe.render(&slots);

    let response = ctx
        .llm
        .complete(CompletionRequest {
            role: "query_validator",
            messages: vec![ChatMessage::system(system_prompt), ChatMessage::user(section_0.resolved_query.clone())],
            temperature: policy.temperature,
            max_tokens: policy.max_tokens,
            json_schema: Some(recipe.json_schema.clone()),
        })
        .await?;

    let validation: QueryValidation = parse_llm_json("query_validator", &response)?;
    let decision = validation.decision;
    doc.commit_section_1(validation)?;
    Ok(decision)
}
