//! Recipe Loader: per-phase prompt templates and structured-output schemas.
//!
//! Phase handlers never branch on which phase they are; they look up a
//! [`Recipe`] by name and hand its template + schema to the LLM client.
//! This mirrors the teacher's `PhasesFile`/`Phase` load-from-JSON pattern,
//! but keyed by phase name rather than number, and with a JSON schema
//! alongside the budget.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::errors::RecipeError;

/// One phase's prompt template and expected structured-output schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub phase: String,
    pub role: &'static str,
    pub system_prompt: String,
    pub json_schema: serde_json::Value,
}

impl Recipe {
    /// Renders the system prompt with `{{slot}}`-style substitutions.
    pub fn render(&self, slots: &HashMap<&str, String>) -> String {
        let mut rendered = self.system_prompt.clone();
        for (key, value) in slots {
            rendered = rendered.replace(&format!("{{{{{key}}}}}"), value);
        }
        rendered
    }
}

/// Serializable shape of a recipe pack file (`recipes.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipePack {
    pub recipes: Vec<Recipe>,
}

/// Holds every phase's recipe, keyed by phase name.
#[derive(Debug, Clone)]
pub struct RecipeRegistry {
    recipes: HashMap<String, Recipe>,
}

impl RecipeRegistry {
    /// Loads a recipe pack from `path` if given and present, falling back
    /// to the built-in defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, RecipeError> {
        if let Some(path) = path {
            if path.exists() {
                let content = std::fs::read_to_string(path).map_err(|e| RecipeError::ReadFailed {
                    path: path.to_path_buf(),
                    source: e,
                })?;
                let pack: RecipePack = serde_json::from_str(&content).map_err(|e| RecipeError::ParseFailed {
                    name: path.display().to_string(),
                    message: e.to_string(),
                })?;
                let recipes = pack.recipes.into_iter().map(|r| (r.phase.clone(), r)).collect();
                return Ok(Self { recipes });
            }
        }
        Ok(Self::defaults())
    }

    pub fn get(&self, phase: &str) -> Result<&Recipe, RecipeError> {
        self.recipes
            .get(phase)
            .ok_or_else(|| RecipeError::NotFound { phase: phase_static(phase) })
    }

    fn defaults() -> Self {
        let recipes = default_recipes().into_iter().map(|r| (r.phase.clone(), r)).collect();
        Self { recipes }
    }
}

fn phase_static(phase: &str) -> &'static str {
    match phase {
        "query_analyzer" => "query_analyzer",
        "query_validator" => "query_validator",
        "context_synthesis" => "context_synthesis",
        "context_validator" => "context_validator",
        "planner" => "planner",
        "executor" => "executor",
        "coordinator" => "coordinator",
        "synthesis" => "synthesis",
        "validation" => "validation",
        "nerves" => "nerves",
        _ => "unknown",
    }
}

fn default_recipes() -> Vec<Recipe> {
    vec![
        Recipe {
            phase: "query_analyzer".into(),
            role: "query_analyzer",
            system_prompt: "Resolve pronouns using the rolling buffer, classify user_purpose \
                from the closed set, and extract data_requirements. Input: {{raw_query}}"
                .into(),
            json_schema: serde_json::json!({
                "type": "object",
                "required": ["resolved_query", "user_purpose", "data_requirements"],
            }),
        },
        Recipe {
            phase: "query_validator".into(),
            role: "validator",
            system_prompt: "Check §0 for coverage, consistency, and contradictions. \
                Emit decision and issues. §0: {{section_0}}"
                .into(),
            json_schema: serde_json::json!({
                "type": "object",
                "required": ["decision", "issues"],
            }),
        },
        Recipe {
            phase: "context_synthesis".into(),
            role: "context_synthesis",
            system_prompt: "Compress the staged candidate list into a coherent §2 draft, \
                preserving preferences, open questions, and fresh findings. Staged: {{staged}}"
                .into(),
            json_schema: serde_json::json!({
                "type": "object",
                "required": ["items", "preferences", "open_questions"],
            }),
        },
        Recipe {
            phase: "context_validator".into(),
            role: "validator",
            system_prompt: "Check §2 for coverage, consistency, and contradictions with \
                preferences. Emit decision and issues. §2: {{section_2}}"
                .into(),
            json_schema: serde_json::json!({
                "type": "object",
                "required": ["decision", "issues"],
            }),
        },
        Recipe {
            phase: "planner".into(),
            role: "planner",
            system_prompt: "Decide route, decompose goals, and (on RETRY) select a \
                backtracking level from the prior validation reason tags. §0: {{section_0}} \
                §2: {{section_2}} prior §7: {{prior_validation}}"
                .into(),
            json_schema: serde_json::json!({
                "type": "object",
                "required": ["goals", "approach", "route", "success_criteria"],
            }),
        },
        Recipe {
            phase: "executor".into(),
            role: "executor",
            system_prompt: "Issue one natural-language action over the cumulative §4 \
                evidence: EXECUTE, ANALYZE, COMPLETE, or BLOCKED. §3: {{section_3}} \
                §4: {{section_4}}"
                .into(),
            json_schema: serde_json::json!({
                "type": "object",
                "required": ["action"],
            }),
        },
        Recipe {
            phase: "coordinator".into(),
            role: "coordinator",
            system_prompt: "Match the Executor's command against the tool family catalog below. \
                Respond with the single best-matching family name, or null if none of the \
                catalog entries plausibly realize the command — never invent a family not in \
                the catalog. Command: {{command}} Catalog: {{catalog}}"
                .into(),
            json_schema: serde_json::json!({
                "type": "object",
                "required": ["family"],
            }),
        },
        Recipe {
            phase: "synthesis".into(),
            role: "synthesis",
            system_prompt: "Write the draft response and source map from §0, §2, §4. \
                Every fact must cite a claim or context record; historical items are not \
                current evidence. §0: {{section_0}} §2: {{section_2}} §4: {{section_4}}"
                .into(),
            json_schema: serde_json::json!({
                "type": "object",
                "required": ["text", "source_map"],
            }),
        },
        Recipe {
            phase: "validation".into(),
            role: "validator",
            system_prompt: "Score claims_supported, no_hallucinations, query_addressed, \
                coherent_format and an overall confidence for §6 against §0/§2/§4. \
                §6: {{section_6}}"
                .into(),
            json_schema: serde_json::json!({
                "type": "object",
                "required": ["checks", "confidence", "decision"],
            }),
        },
        Recipe {
            phase: "nerves".into(),
            role: "nerves",
            system_prompt: "Summarize the following section content, keeping it under the \
                token budget without dropping open questions or unresolved claims: \
                {{content}}"
                .into(),
            json_schema: serde_json::json!({
                "type": "object",
                "required": ["summary"],
            }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_phase() {
        let registry = RecipeRegistry::defaults();
        for phase in [
            "query_analyzer",
            "query_validator",
            "context_synthesis",
            "context_validator",
            "planner",
            "executor",
            "coordinator",
            "synthesis",
            "validation",
            "nerves",
        ] {
            assert!(registry.get(phase).is_ok(), "missing recipe for {phase}");
        }
    }

    #[test]
    fn unknown_phase_errors() {
        let registry = RecipeRegistry::defaults();
        let err = registry.get("not_a_phase").unwrap_err();
        assert!(matches!(err, RecipeError::NotFound { .. }));
    }

    #[test]
    fn render_substitutes_slots() {
        let registry = RecipeRegistry::defaults();
        let recipe = registry.get("query_analyzer").unwrap();
        let mut slots = HashMap::new();
        slots.insert("raw_query", "hello".to_string());
        let rendered = recipe.render(&slots);
        assert!(rendered.contains("hello"));
        assert!(!rendered.contains("{{raw_query}}"));
    }

    #[test]
    fn load_falls_back_to_defaults_when_no_path() {
        let registry = RecipeRegistry::load(None).unwrap();
        assert!(registry.get("planner").is_ok());
    }
}
