//! NERVES: the LLM-powered compressor the Orchestrator calls when a
//! section's rendered size crosses its configured budget. Blind truncation
//! is forbidden — every compaction goes through the `"nerves"` recipe so
//! the summary keeps open questions and unresolved claims instead of just
//! cutting off text.

use std::collections::HashMap;
use tracing::{info, warn};

use crate::config::Config;
use crate::errors::LlmError;
use crate::llm::{ChatMessage, CompletionRequest, LlmClient};
use crate::recipes::RecipeRegistry;

/// Mirrors the teacher's `ContextTracker::should_compact`: only worth
/// triggering once there's enough accumulated content to meaningfully
/// shrink, not on every marginal byte over budget.
const MIN_CONTENT_TOKENS_TO_COMPACT: u32 = 200;

fn estimate_tokens(text: &str) -> u32 {
    (text.len() as u32 / 4).max(1)
}

/// Whether `content`'s estimated size already exceeds `budget` by enough
/// to be worth an LLM round trip.
pub fn should_compact(content: &str, budget: u32) -> bool {
    let used = estimate_tokens(content);
    used > budget && used >= MIN_CONTENT_TOKENS_TO_COMPACT
}

/// Compresses `content` down toward `budget` tokens via the `"nerves"`
/// recipe. Returns the original content unchanged if it's already within
/// budget — callers should still prefer guarding with [`should_compact`]
/// to avoid a wasted call.
pub async fn compact_if_needed(
    llm: &dyn LlmClient,
    config: &Config,
    recipes: &RecipeRegistry,
    section: &str,
    content: &str,
) -> Result<Option<String>, LlmError> {
    let budget = config.section_budget(section);
    if !should_compact(content, budget) {
        return Ok(None);
    }

    let recipe = recipes
        .get("nerves")
        .map_err(|e| LlmError::MalformedOutput("nerves", e.to_string()))?;
    let policy = config.role_policy("nerves");

    let mut slots = HashMap::new();
    slots.insert("content", content.to_string());
    let system_prompt = recipe.render(&slots);

    info!(section, budget, content_tokens = estimate_tokens(content), "compacting section via nerves");

    let response = llm
        .complete(CompletionRequest {
            role: "nerves",
            messages: vec![ChatMessage::system(system_prompt), ChatMessage::user(content.to_string())],
            temperature: policy.temperature,
            max_tokens: policy.max_tokens,
            json_schema: Some(recipe.json_schema.clone()),
        })
        .await?;

    let summary = extract_summary(&response)?;

    if estimate_tokens(&summary) >= estimate_tokens(content) {
        warn!(section, "nerves summary did not shrink content, keeping original");
        return Ok(None);
    }

    Ok(Some(summary))
}

fn extract_summary(raw: &str) -> Result<String, LlmError> {
    let parsed: serde_json::Value = serde_json::from_str(raw)
        .map_err(|_| LlmError::MalformedOutput("nerves", "response was not valid json".into()))?;
    parsed
        .get("summary")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| LlmError::MalformedOutput("nerves", "missing summary field".into()))
}
