//! Phase 7 — Validation: scores one §6 draft against the four gates and
//! turns that score plus §0/§2/§4 grounding into a terminal decision.
//! Appends one attempt to §7 per call; never overwrites a prior attempt.

use std::collections::HashMap;
use tracing::instrument;

use crate::document::{ContextDocument, Decision, ValidationAttempt, ValidationChecks};
use crate::errors::PhaseError;
use crate::llm::{ChatMessage, CompletionRequest};
use crate::phases::{PhaseContext, parse_llm_json};

#[derive(serde::Deserialize)]
struct RawValidation {
    checks: ValidationChecks,
    confidence: f64,
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default)]
    revision_hints: Vec<String>,
    #[serde(default)]
    suggested_fixes: Option<String>,
    #[serde(default)]
    reason_tags: Vec<crate::document::RetryReason>,
}

#[instrument(skip(ctx, doc))]
pub async fn run(ctx: &PhaseContext<'_>, doc: &mut ContextDocument) -> Result<Decision, PhaseError> {
    let section_0 = doc
        .section_0()
        .ok_or(PhaseError::Document(crate::errors::DocumentError::MissingSection {
            phase: "validation",
            section: "§0",
        }))?;
    let section_6 = doc
        .section_6()
        .ok_or(PhaseError::Document(crate::errors::DocumentError::MissingSection {
            phase: "validation",
            section: "§6",
        }))?;

    let recipe = ctx.recipes.get("validation")?;
    let policy = ctx.config.role_policy("validator");

    let mut slots = HashMap::new();
    slots.insert("section_0", serde_json::to_string(section_0).unwrap_or_default());
    slots.insert("section_2", serde_json::to_string(&doc.section_2()).unwrap_or_default());
    slots.insert("section_4", serde_json::to_string(doc.section_4()).unwrap_or_default());
    slots.insert("section_6", serde_json::to_string(section_6).unwrap_or_default());
    let system_prompt = recipe.render(&slots);

    let response = ctx
        .llm
        .complete(CompletionRequest {
            role: "validator",
            messages: vec![ChatMessage::system(system_prompt), ChatMessage::user(section_6.text.clone())],
            temperature: policy.temperature,
            max_tokens: policy.max_tokens,
            json_schema: Some(recipe.json_schema.clone()),
        })
        .await?;

    let raw: RawValidation = parse_llm_json("validation", &response)?;
    let engine = ctx.config.engine();

    // §4.9's decision table splits on check *kind*, not just pass/fail count:
    // claims_supported/coherent_format failing alone is a minor, fixable
    // issue; query_addressed or no_hallucinations failing is approach-level
    // and needs a replan, not a rewrite.
    let approach_level_issue = !raw.checks.query_addressed || !raw.checks.no_hallucinations;
    let minor_issue_only = !raw.checks.all_pass() && !approach_level_issue;

    let decision = if raw.checks.all_pass() && raw.confidence >= engine.approve_threshold {
        Decision::Approve
    } else if raw.confidence < engine.fail_threshold {
        Decision::Fail
    } else if minor_issue_only && raw.confidence >= engine.revise_threshold {
        Decision::Revise
    } else if approach_level_issue && raw.confidence < engine.revise_threshold {
        Decision::Retry
    } else if raw.checks.all_pass() {
        // Checks all pass but confidence fell short of approve_threshold —
        // treat as a minor issue needing another pass at wording.
        Decision::Revise
    } else {
        Decision::Retry
    };

    let attempt = ValidationAttempt {
        attempt: doc.section_7().attempts.len() as u32,
        decision,
        confidence: raw.confidence,
        checks: raw.checks,
        issues: raw.issues,
        revision_hints: raw.revision_hints,
        suggested_fixes: raw.suggested_fixes,
        reason_tags: raw.reason_tags,
    };

    doc.append_section_7(attempt)?;
    Ok(decision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::document::{ContextBundle, DataRequirements, Mode, QuerySection, SynthesisDraft, UserPurpose};
    use crate::llm::LlmClient;
    use crate::persistence::index::TurnIndex;
    use crate::persistence::TurnWriter;
    use crate::recipes::RecipeRegistry;
    use crate::tools::ToolRegistry;
    use crate::workflows::WorkflowRegistry;
    use async_trait::async_trait;
    use tempfile::tempdir;

    struct StubLlm(String);

    #[async_trait]
    impl LlmClient for StubLlm {
        async fn complete(&self, _request: CompletionRequest) -> Result<String, crate::errors::LlmError> {
            Ok(self.0.clone())
        }
    }

    fn doc_with_draft() -> ContextDocument {
        let mut doc = ContextDocument::new("s1", Mode::Chat);
        doc.commit_section_0(QuerySection {
            raw_query: "q".into(),
            resolved_query: "q".into(),
            user_purpose: UserPurpose::Informational,
            data_requirements: DataRequirements::default(),
            action_verbs: vec![],
            is_followup: false,
        })
        .unwrap();
        doc.write_section_2_draft(ContextBundle::default()).unwrap();
        doc.commit_section_2().unwrap();
        doc.write_section_6(SynthesisDraft { text: "answer".into(), source_map: vec![] }).unwrap();
        doc
    }

    fn checks_pass() -> serde_json::Value {
        serde_json::json!({
            "claims_supported": true,
            "no_hallucinations": true,
            "query_addressed": true,
            "coherent_format": true,
        })
    }

    #[tokio::test]
    async fn run_approves_high_confidence_passing_checks() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf(), false, None).unwrap();
        let recipes = RecipeRegistry::load(None).unwrap();
        let tools = ToolRegistry::new();
        let workflows = WorkflowRegistry::default();
        let writer = TurnWriter::new(config.turns_dir.clone());
        let index = TurnIndex::new(config.turns_dir.clone());
        let response = serde_json::json!({
            "checks": checks_pass(),
            "confidence": 0.95,
            "issues": [],
            "revision_hints": [],
            "suggested_fixes": null,
            "reason_tags": [],
        })
        .to_string();
        let llm = StubLlm(response);
        let ctx = PhaseContext { config: &config, llm: &llm, recipes: &recipes, tools: &tools, workflows: &workflows, turn_writer: &writer, turn_index: &index };
        let mut doc = doc_with_draft();

        let decision = run(&ctx, &mut doc).await.unwrap();
        assert_eq!(decision, Decision::Approve);
        assert_eq!(doc.section_7().attempts.len(), 1);
    }

    #[tokio::test]
    async fn run_revises_on_a_minor_issue_at_revise_band_confidence() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf(), false, None).unwrap();
        let recipes = RecipeRegistry::load(None).unwrap();
        let tools = ToolRegistry::new();
        let workflows = WorkflowRegistry::default();
        let writer = TurnWriter::new(config.turns_dir.clone());
        let index = TurnIndex::new(config.turns_dir.clone());
        let response = serde_json::json!({
            "checks": {
                "claims_supported": false,
                "no_hallucinations": true,
                "query_addressed": true,
                "coherent_format": true,
            },
            "confidence": 0.65,
            "issues": ["unsupported claim about price"],
            "revision_hints": ["cite the price claim"],
            "suggested_fixes": null,
            "reason_tags": [],
        })
        .to_string();
        let llm = StubLlm(response);
        let ctx = PhaseContext { config: &config, llm: &llm, recipes: &recipes, tools: &tools, workflows: &workflows, turn_writer: &writer, turn_index: &index };
        let mut doc = doc_with_draft();

        let decision = run(&ctx, &mut doc).await.unwrap();
        assert_eq!(decision, Decision::Revise);
    }

    #[tokio::test]
    async fn run_retries_on_an_approach_level_issue() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf(), false, None).unwrap();
        let recipes = RecipeRegistry::load(None).unwrap();
        let tools = ToolRegistry::new();
        let workflows = WorkflowRegistry::default();
        let writer = TurnWriter::new(config.turns_dir.clone());
        let index = TurnIndex::new(config.turns_dir.clone());
        let response = serde_json::json!({
            "checks": {
                "claims_supported": true,
                "no_hallucinations": true,
                "query_addressed": false,
                "coherent_format": true,
            },
            "confidence": 0.40,
            "issues": ["did not address the budget constraint"],
            "revision_hints": [],
            "suggested_fixes": "replan around the stated budget",
            "reason_tags": ["missing_evidence"],
        })
        .to_string();
        let llm = StubLlm(response);
        let ctx = PhaseContext { config: &config, llm: &llm, recipes: &recipes, tools: &tools, workflows: &workflows, turn_writer: &writer, turn_index: &index };
        let mut doc = doc_with_draft();

        let decision = run(&ctx, &mut doc).await.unwrap();
        assert_eq!(decision, Decision::Retry);
    }

    #[tokio::test]
    async fn run_fails_below_the_fail_threshold() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf(), false, None).unwrap();
        let recipes = RecipeRegistry::load(None).unwrap();
        let tools = ToolRegistry::new();
        let workflows = WorkflowRegistry::default();
        let writer = TurnWriter::new(config.turns_dir.clone());
        let index = TurnIndex::new(config.turns_dir.clone());
        let response = serde_json::json!({
            "checks": {
                "claims_supported": false,
                "no_hallucinations": false,
                "query_addressed": false,
                "coherent_format": false,
            },
            "confidence": 0.10,
            "issues": ["response is unrelated to the query"],
            "revision_hints": [],
            "suggested_fixes": null,
            "reason_tags": ["goal_dependency_failure"],
        })
        .to_string();
        let llm = StubLlm(response);
        let ctx = PhaseContext { config: &config, llm: &llm, recipes: &recipes, tools: &tools, workflows: &workflows, turn_writer: &writer, turn_index: &index };
        let mut doc = doc_with_draft();

        let decision = run(&ctx, &mut doc).await.unwrap();
        assert_eq!(decision, Decision::Fail);
    }
}
