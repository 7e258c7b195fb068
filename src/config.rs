//! Runtime configuration for the turn engine.
//!
//! Read once at startup from environment variables plus an optional TOML
//! override file. [`Config`] is the resolved, path-canonicalized runtime
//! view; [`EngineToml`] is the serializable shape of the override file,
//! mirroring the teacher's split between a thin runtime `Config` and a
//! unified serializable settings struct.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::orchestrator::OrchestratorLimits;

/// Temperature + max-token policy for one LLM role (query_analyzer, planner,
/// executor, synthesis, validator, nerves, ...).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RolePolicy {
    pub temperature: f32,
    pub max_tokens: u32,
}

/// TTL, in seconds, for one freshness class. Items older than their class's
/// TTL are summarized as historical and cannot be cited as current evidence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FreshnessTtls {
    pub volatile_secs: u64,
    pub stable_secs: u64,
    pub reference_secs: u64,
}

impl Default for FreshnessTtls {
    fn default() -> Self {
        Self {
            volatile_secs: 60 * 30,
            stable_secs: 60 * 60 * 24,
            reference_secs: 60 * 60 * 24 * 30,
        }
    }
}

/// Per-phase prompt token budgets, keyed by section name (`"§2"`, `"§4"`, ...).
pub type SectionBudgets = HashMap<String, u32>;

fn default_section_budgets() -> SectionBudgets {
    [
        ("§2".to_string(), 4_000u32),
        ("§3".to_string(), 2_000),
        ("§4".to_string(), 8_000),
        ("§6".to_string(), 2_000),
    ]
    .into_iter()
    .collect()
}

fn default_role_policies() -> HashMap<String, RolePolicy> {
    [
        (
            "query_analyzer".to_string(),
            RolePolicy { temperature: 0.0, max_tokens: 512 },
        ),
        (
            "context_synthesis".to_string(),
            RolePolicy { temperature: 0.2, max_tokens: 1_500 },
        ),
        (
            "planner".to_string(),
            RolePolicy { temperature: 0.3, max_tokens: 1_500 },
        ),
        (
            "executor".to_string(),
            RolePolicy { temperature: 0.2, max_tokens: 1_500 },
        ),
        (
            "coordinator".to_string(),
            RolePolicy { temperature: 0.0, max_tokens: 512 },
        ),
        (
            "synthesis".to_string(),
            RolePolicy { temperature: 0.4, max_tokens: 2_000 },
        ),
        (
            "validator".to_string(),
            RolePolicy { temperature: 0.0, max_tokens: 800 },
        ),
        (
            "nerves".to_string(),
            RolePolicy { temperature: 0.1, max_tokens: 1_000 },
        ),
    ]
    .into_iter()
    .collect()
}

/// Serializable override file, conventionally `.turnkit/engine.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineToml {
    pub llm_endpoint: String,
    pub llm_model: String,
    pub role_policies: HashMap<String, RolePolicy>,
    pub section_budgets: SectionBudgets,
    pub loop_limits: OrchestratorLimits,
    pub freshness: FreshnessTtls,
    /// All four checks pass and confidence is at or above this → APPROVE.
    pub approve_threshold: f64,
    /// Only `claims_supported`/`coherent_format` failing, confidence at or
    /// above this (and below `approve_threshold`) → REVISE.
    pub revise_threshold: f64,
    /// Confidence below this, or loop limits exhausted → FAIL. Between this
    /// and `revise_threshold` with an approach-level failure → RETRY.
    pub fail_threshold: f64,
}

impl Default for EngineToml {
    fn default() -> Self {
        Self {
            llm_endpoint: "http://localhost:11434/v1".to_string(),
            llm_model: "local-model".to_string(),
            role_policies: default_role_policies(),
            section_budgets: default_section_budgets(),
            loop_limits: OrchestratorLimits::default(),
            freshness: FreshnessTtls::default(),
            approve_threshold: 0.80,
            revise_threshold: 0.50,
            fail_threshold: 0.30,
        }
    }
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub turns_dir: PathBuf,
    pub log_dir: PathBuf,
    pub memory_store_path: PathBuf,
    pub research_cache_path: PathBuf,
    pub code_mode_root: PathBuf,
    pub verbose: bool,
    engine: EngineToml,
}

impl Config {
    /// Resolve configuration for `project_dir`, optionally overridden by a
    /// TOML file at `engine_toml_path` (defaults to
    /// `<project_dir>/.turnkit/engine.toml` when present).
    pub fn new(
        project_dir: PathBuf,
        verbose: bool,
        engine_toml_path: Option<PathBuf>,
    ) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("failed to resolve project directory")?;

        let default_toml_path = project_dir.join(".turnkit/engine.toml");
        let toml_path = engine_toml_path.unwrap_or(default_toml_path);

        let mut engine = EngineToml::default();
        if toml_path.exists() {
            let raw = std::fs::read_to_string(&toml_path)
                .with_context(|| format!("failed to read {}", toml_path.display()))?;
            engine = toml::from_str(&raw)
                .with_context(|| format!("failed to parse {}", toml_path.display()))?;
        }

        if let Ok(endpoint) = std::env::var("TURNKIT_LLM_ENDPOINT") {
            engine.llm_endpoint = endpoint;
        }
        if let Ok(model) = std::env::var("TURNKIT_LLM_MODEL") {
            engine.llm_model = model;
        }

        let turnkit_dir = project_dir.join(".turnkit");
        let turns_dir = turnkit_dir.join("turns");
        let log_dir = turnkit_dir.join("logs");
        let memory_store_path = turnkit_dir.join("memory");
        let research_cache_path = turnkit_dir.join("research_cache");
        let code_mode_root = project_dir.clone();

        Ok(Self {
            project_dir,
            turns_dir,
            log_dir,
            memory_store_path,
            research_cache_path,
            code_mode_root,
            verbose,
            engine,
        })
    }

    pub fn engine(&self) -> &EngineToml {
        &self.engine
    }

    pub fn llm_endpoint(&self) -> &str {
        &self.engine.llm_endpoint
    }

    pub fn llm_model(&self) -> &str {
        &self.engine.llm_model
    }

    pub fn role_policy(&self, role: &str) -> RolePolicy {
        self.engine
            .role_policies
            .get(role)
            .copied()
            .unwrap_or(RolePolicy { temperature: 0.2, max_tokens: 1_000 })
    }

    pub fn section_budget(&self, section: &str) -> u32 {
        self.engine
            .section_budgets
            .get(section)
            .copied()
            .unwrap_or(2_000)
    }

    pub fn loop_limits(&self) -> OrchestratorLimits {
        self.engine.loop_limits
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.turns_dir).context("failed to create turns directory")?;
        std::fs::create_dir_all(&self.log_dir).context("failed to create log directory")?;
        std::fs::create_dir_all(&self.memory_store_path)
            .context("failed to create memory store directory")?;
        std::fs::create_dir_all(&self.research_cache_path)
            .context("failed to create research cache directory")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_new_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf(), false, None).unwrap();
        assert_eq!(config.llm_model(), "local-model");
        assert_eq!(config.section_budget("§4"), 8_000);
        assert_eq!(config.section_budget("§unknown"), 2_000);
    }

    #[test]
    fn test_config_turns_dir_under_turnkit() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf(), false, None).unwrap();
        assert_eq!(
            config.turns_dir,
            dir.path().canonicalize().unwrap().join(".turnkit/turns")
        );
    }

    #[test]
    fn test_config_reads_toml_override() {
        let dir = tempdir().unwrap();
        let turnkit_dir = dir.path().join(".turnkit");
        std::fs::create_dir_all(&turnkit_dir).unwrap();
        std::fs::write(
            turnkit_dir.join("engine.toml"),
            "llm_endpoint = \"http://example.test/v1\"\nllm_model = \"big-model\"\napprove_threshold = 0.9\nrevise_threshold = 0.3\n",
        )
        .unwrap();
        let config = Config::new(dir.path().to_path_buf(), false, None).unwrap();
        assert_eq!(config.llm_endpoint(), "http://example.test/v1");
        assert_eq!(config.llm_model(), "big-model");
        assert_eq!(config.engine().approve_threshold, 0.9);
    }

    #[test]
    fn test_ensure_directories() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf(), false, None).unwrap();
        config.ensure_directories().unwrap();
        assert!(config.turns_dir.exists());
        assert!(config.memory_store_path.exists());
    }

    #[test]
    fn test_role_policy_falls_back_for_unknown_role() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf(), false, None).unwrap();
        let policy = config.role_policy("made_up_role");
        assert_eq!(policy.max_tokens, 1_000);
    }
}
