//! Phase 1 — Query Analyzer: resolves pronouns against the rolling
//! conversation buffer, classifies `user_purpose`, and extracts
//! `data_requirements`. Commits §0.

use std::collections::HashMap;
use tracing::instrument;

use crate::document::{ContextDocument, QuerySection};
use crate::errors::PhaseError;
use crate::llm::{ChatMessage, CompletionRequest};
use crate::phases::{PhaseContext, parse_llm_json};

#[instrument(skip(ctx, doc, conversation_buffer))]
pub async fn run(
    ctx: &PhaseContext<'_>,
    doc: &mut ContextDocument,
    raw_query: &str,
    conversation_buffer: &[String],
) -> Result<(), PhaseError> {
    if raw_query.trim().is_empty() {
        return Err(PhaseError::UnusableInput);
    }

    let recipe = ctx.recipes.get("query_analyzer")?;
    let policy = ctx.config.role_policy("query_analyzer");

    let mut slots = HashMap::new();
    slots.insert("raw_query", raw_query.to_string());
    let system_prompt = recipe.render(&slots);

    let buffer_context = conversation_buffer.join("\n");

    let response = ctx
        .llm
        .complete(CompletionRequest {
            role: "query_analyzer",
            messages: vec![
                ChatMessage::system(system_prompt),
                ChatMessage::user(format!("recent turns:\n{buffer_context}\n\nquery: {raw_query}")),
            ],
            temperature: policy.temperature,
            max_tokens: policy.max_tokens,
            json_schema: Some(recipe.json_schema.clone()),
        })
        .await?;

    let mut section: QuerySection = parse_llm_json("query_analyzer", &response)?;
    section.raw_query = raw_query.to_string();

    if section.resolved_query.trim().is_empty() {
        return Err(PhaseError::EmptyOutput { phase: "query_analyzer" });
    }

    doc.commit_section_0(section)?;
    Ok(())
}
