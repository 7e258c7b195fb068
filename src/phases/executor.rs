//! Phase 4 — Executor: issues one natural-language action over the
//! cumulative §4 evidence. Does not touch tools itself — the Coordinator
//! (phase 5) interprets the action and dispatches.

use std::collections::HashMap;
use tracing::instrument;

use crate::document::ContextDocument;
use crate::errors::PhaseError;
use crate::llm::{ChatMessage, CompletionRequest};
use crate::phases::{PhaseContext, parse_llm_json};

/// One of the four closed actions the executor may emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorAction {
    Execute { command: String },
    Analyze,
    Complete,
    Blocked { reason: String },
}

#[derive(serde::Deserialize)]
struct RawAction {
    action: String,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

#[instrument(skip(ctx, doc, injected_notes))]
pub async fn run(
    ctx: &PhaseContext<'_>,
    doc: &ContextDocument,
    injected_notes: &[String],
) -> Result<ExecutorAction, PhaseError> {
    let section_3 = doc
        .section_3()
        .ok_or(PhaseError::Document(crate::errors::DocumentError::MissingSection {
            phase: "executor",
            section: "§3",
        }))?;

    let recipe = ctx.recipes.get("executor")?;
    let policy = ctx.config.role_policy("executor");

    let mut slots = HashMap::new();
    slots.insert("section_3", serde_json::to_string(section_3).unwrap_or_default());
    slots.insert("section_4", serde_json::to_string(doc.section_4()).unwrap_or_default());
    slots.insert("injected_notes", injected_notes.join("\n"));
    let system_prompt = recipe.render(&slots);

    let mut user_message = section_3.approach.clone();
    if !injected_notes.is_empty() {
        user_message.push_str("\n\nuser guidance received mid-turn:\n");
        user_message.push_str(&injected_notes.join("\n"));
    }

    let response = ctx
        .llm
        .complete(CompletionRequest {
            role: "executor",
            messages: vec![ChatMessage::system(system_prompt), ChatMessage::user(user_message)],
            temperature: policy.temperature,
            max_tokens: policy.max_tokens,
            json_schema: Some(recipe.json_schema.clone()),
        })
        .await?;

    let raw: RawAction = parse_llm_json("executor", &response)?;
    match raw.action.as_str() {
        "execute" => Ok(ExecutorAction::Execute { command: raw.command.unwrap_or_default() }),
        "analyze" => Ok(ExecutorAction::Analyze),
        "complete" => Ok(ExecutorAction::Complete),
        "blocked" => Ok(ExecutorAction::Blocked { reason: raw.reason.unwrap_or_default() }),
        other => {
            tracing::warn!(action = other, "executor emitted an action outside the closed set");
            Err(PhaseError::EmptyOutput { phase: "executor" })
        }
    }
}
