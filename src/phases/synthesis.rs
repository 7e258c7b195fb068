//! Phase 6 — Synthesis: drafts the user-facing response from §0/§2/§4 and
//! attributes every sentence it can to a claim or context record. Rewritten
//! on every REVISE; attempt history lives in §7, not here.

use std::collections::HashMap;
use tracing::instrument;

use crate::document::{ContextDocument, SynthesisDraft};
use crate::errors::PhaseError;
use crate::llm::{ChatMessage, CompletionRequest};
use crate::phases::{PhaseContext, parse_llm_json};

#[instrument(skip(ctx, doc, revision_hints))]
pub async fn run(ctx: &PhaseContext<'_>, doc: &mut ContextDocument, revision_hints: &[String]) -> Result<(), PhaseError> {
    let section_0 = doc
        .section_0()
        .ok_or(PhaseError::Document(crate::errors::DocumentError::MissingSection {
            phase: "synthesis",
            section: "§0",
        }))?;
    let section_2 = doc
        .section_2()
        .ok_or(PhaseError::Document(crate::errors::DocumentError::MissingSection {
            phase: "synthesis",
            section: "§2",
        }))?;

    let recipe = ctx.recipes.get("synthesis")?;
    let policy = ctx.config.role_policy("synthesis");

    let mut slots = HashMap::new();
    slots.insert("section_0", serde_json::to_string(section_0).unwrap_or_default());
    slots.insert("section_2", serde_json::to_string(section_2).unwrap_or_default());
    slots.insert("section_4", serde_json::to_string(doc.section_4()).unwrap_or_default());
    slots.insert("revision_hints", revision_hints.join("\n"));
    let system_prompt = recipe.render(&slots);

    let mut user_message = section_0.resolved_query.clone();
    if !revision_hints.is_empty() {
        user_message.push_str("\n\naddress these issues from the prior attempt:\n");
        user_message.push_str(&revision_hints.join("\n"));
    }

    let response = ctx
        .llm
        .complete(CompletionRequest {
            role: "synthesis",
            messages: vec![ChatMessage::system(system_prompt), ChatMessage::user(user_message)],
            temperature: policy.temperature,
            max_tokens: policy.max_tokens,
            json_schema: Some(recipe.json_schema.clone()),
        })
        .await?;

    let draft: SynthesisDraft = parse_llm_json("synthesis", &response)?;
    if draft.text.trim().is_empty() {
        return Err(PhaseError::EmptyOutput { phase: "synthesis" });
    }

    doc.write_section_6(draft)?;
    Ok(())
}
