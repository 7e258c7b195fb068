//! Phase 5 — Coordinator: interprets one Executor command by matching it
//! against the Workflow Registry first, falling back to a direct tool-family
//! call. Appends one §4 entry either way; enforces the mode gate before any
//! mutating dispatch.

use std::collections::HashMap;
use tracing::{info, instrument};

use crate::document::{ContextDocument, EntryStatus, EvidenceKind, ExecutionEntry, Invocation};
use crate::errors::PhaseError;
use crate::llm::{ChatMessage, CompletionRequest};
use crate::phases::{parse_llm_json, PhaseContext};
use crate::workflows::engine::WorkflowEngine;

#[derive(serde::Serialize)]
struct CatalogEntry<'a> {
    family: &'a str,
    mutating: bool,
}

#[derive(serde::Deserialize)]
struct RawCoordinatorMatch {
    family: Option<String>,
}

/// Prompts the `"coordinator"` recipe with the tool catalog (§4.7 step 3)
/// and returns the matched family, or `None` if the model declined to pick
/// one or picked something outside the catalog — the Coordinator must never
/// invent a tool.
async fn match_family(
    ctx: &PhaseContext<'_>,
    command: &str,
    catalog: &[&crate::tools::ToolFamilySpec],
) -> Result<Option<String>, PhaseError> {
    if catalog.is_empty() {
        return Ok(None);
    }

    let recipe = ctx.recipes.get("coordinator")?;
    let policy = ctx.config.role_policy("coordinator");
    let entries: Vec<_> = catalog.iter().map(|f| CatalogEntry { family: &f.family, mutating: f.mutating }).collect();

    let mut slots = HashMap::new();
    slots.insert("command", command.to_string());
    slots.insert("catalog", serde_json::to_string(&entries).unwrap_or_default());
    let system_prompt = recipe.render(&slots);

    let response = ctx
        .llm
        .complete(CompletionRequest {
            role: "coordinator",
            messages: vec![ChatMessage::system(system_prompt), ChatMessage::user(command.to_string())],
            temperature: policy.temperature,
            max_tokens: policy.max_tokens,
            json_schema: Some(recipe.json_schema.clone()),
        })
        .await?;

    let raw: RawCoordinatorMatch = parse_llm_json("coordinator", &response)?;
    Ok(raw.family.filter(|family| catalog.iter().any(|f| &f.family == family)))
}

#[instrument(skip(ctx, doc))]
pub async fn run(ctx: &PhaseContext<'_>, doc: &mut ContextDocument, command: &str) -> Result<EntryStatus, PhaseError> {
    let mode = doc.mode;
    let iteration = doc.section_4().entries.len() as u32;
    let purpose = doc
        .section_0()
        .map(|q| q.user_purpose)
        .unwrap_or(crate::document::UserPurpose::Trivial);
    let data_requirements = doc
        .section_0()
        .map(|q| q.data_requirements.clone())
        .unwrap_or_default();

    if let Some((bundle, slots)) = ctx.workflows.find_match(command, purpose, &data_requirements) {
        info!(workflow = %bundle.name, "coordinator matched workflow");
        let engine = WorkflowEngine::new(ctx.tools);
        let outcome = engine.run(bundle, mode, slots).await;

        let entry = match outcome {
            Ok(outcome) => {
                let claims: Vec<_> = outcome.steps.iter().flat_map(|s| s.claims.clone()).collect();
                let status = if outcome.aborted { EntryStatus::Failed } else { EntryStatus::Ok };
                ExecutionEntry {
                    iteration,
                    executor_command: command.to_string(),
                    invocation: Invocation::Workflow { name: bundle.name.clone(), step_count: outcome.steps.len() },
                    raw_result: serde_json::to_value(&outcome.steps).unwrap_or_default(),
                    claims,
                    status,
                }
            }
            Err(e) => ExecutionEntry {
                iteration,
                executor_command: command.to_string(),
                invocation: Invocation::Blocked { reason: e.to_string() },
                raw_result: serde_json::json!({ "error": e.to_string() }),
                claims: vec![],
                status: EntryStatus::Failed,
            },
        };
        let status = entry.status;
        doc.append_section_4(entry)?;
        return Ok(status);
    }

    let catalog = ctx.tools.families_for_mode(mode);
    let matched = match_family(ctx, command, &catalog).await?;
    let Some(family) = matched else {
        let reason = if catalog.is_empty() {
            "no tool family available for this mode".to_string()
        } else {
            "no catalog family matched the command".to_string()
        };
        info!(command, "coordinator blocked: {reason}");
        let entry = ExecutionEntry {
            iteration,
            executor_command: command.to_string(),
            invocation: Invocation::Blocked { reason },
            raw_result: serde_json::Value::Null,
            claims: vec![],
            status: EntryStatus::Blocked,
        };
        doc.append_section_4(entry)?;
        return Ok(EntryStatus::Blocked);
    };

    let result = ctx.tools.invoke(&family, mode, serde_json::json!({ "command": command })).await;
    let entry = match result {
        Ok(result) => ExecutionEntry {
            iteration,
            executor_command: command.to_string(),
            invocation: Invocation::Tool { family: family.clone(), tool: family.clone() },
            raw_result: result.data,
            claims: result.claims,
            status: EntryStatus::Ok,
        },
        Err(e) => ExecutionEntry {
            iteration,
            executor_command: command.to_string(),
            invocation: Invocation::Blocked { reason: e.to_string() },
            raw_result: serde_json::json!({ "error": e.to_string() }),
            claims: vec![crate::document::Claim::new(
                format!("tool call failed: {e}"),
                format!("iteration:{iteration}"),
                EvidenceKind::Tool,
                0.0,
            )],
            status: EntryStatus::Failed,
        },
    };
    let status = entry.status;
    doc.append_section_4(entry)?;
    Ok(status)
}
