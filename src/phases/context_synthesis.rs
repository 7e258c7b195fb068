//! Phase 2.2 — Context Synthesis: compresses the staged candidate list
//! into a coherent §2 draft. Writes the draft only; §2.5 must pass it
//! before it becomes visible to later phases.

use std::collections::HashMap;
use tracing::instrument;

use crate::document::{ContextBundle, ContextDocument, ContextItem};
use crate::errors::PhaseError;
use crate::llm::{ChatMessage, CompletionRequest};
use crate::phases::{PhaseContext, parse_llm_json};

#[instrument(skip(ctx, doc, staged))]
pub async fn run(
    ctx: &PhaseContext<'_>,
    doc: &mut ContextDocument,
    staged: Vec<ContextItem>,
) -> Result<(), PhaseError> {
    let recipe = ctx.recipes.get("context_synthesis")?;
    let policy = ctx.config.role_policy("context_synthesis");

    let staged_json = serde_json::to_string(&staged).unwrap_or_default();
    let mut slots = HashMap::new();
    slots.insert("staged", staged_json.clone());
    let system_prompt = recipe.render(&slots);

    let response = ctx
        .llm
        .complete(CompletionRequest {
            role: "context_synthesis",
            messages: vec![ChatMessage::system(system_prompt), ChatMessage::user(staged_json)],
            temperature: policy.temperature,
            max_tokens: policy.max_tokens,
            json_schema: Some(recipe.json_schema.clone()),
        })
        .await?;

    let mut bundle: ContextBundle = parse_llm_json("context_synthesis", &response)?;
    if bundle.items.is_empty() {
        bundle.items = staged;
    }

    doc.write_section_2_draft(bundle)?;
    Ok(())
}
