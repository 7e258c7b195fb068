//! Workflow Registry: declarative workflow bundles (triggers, step list,
//! success criteria) loaded at startup. Purely data; [`engine`] is what
//! interprets a bundle against a live Coordinator invocation.

pub mod engine;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::document::{DataRequirements, UserPurpose};
use crate::errors::WorkflowError;

/// How a workflow's trigger is matched against an Executor command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    /// Exact command literal match.
    Literal { text: String },
    /// Regex with named capture groups bound as step slots.
    Pattern { regex: String },
    /// Matches on §0's classified purpose / data requirements instead of
    /// command text.
    Purpose { purpose: UserPurpose },
}

/// What happens when a step's tool call fails.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnFailure {
    Abort,
    Continue,
    FallbackStep,
}

/// One declarative step: a tool-family call with templated arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub tool_family: String,
    /// `{{slot}}` template bound from command slots, §0, §2, or prior
    /// step outputs.
    pub arg_template: serde_json::Value,
    pub on_failure: OnFailure,
    #[serde(default)]
    pub fallback_step: Option<usize>,
}

/// A declarative workflow bundle. Purely data — [`engine::WorkflowEngine`]
/// is the only thing that executes one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowBundle {
    pub name: String,
    pub priority: i32,
    pub triggers: Vec<Trigger>,
    pub inputs: Vec<String>,
    pub steps: Vec<WorkflowStep>,
    pub outputs: Vec<String>,
    pub success_criteria: Vec<String>,
    pub fallback: Option<String>,
}

/// Serializable shape of a workflow bundle file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowFile {
    pub bundles: Vec<WorkflowBundle>,
}

/// Loaded workflow catalog, ordered by descending priority for trigger
/// resolution.
#[derive(Debug, Clone, Default)]
pub struct WorkflowRegistry {
    bundles: Vec<WorkflowBundle>,
}

impl WorkflowRegistry {
    pub fn load(path: Option<&Path>) -> Result<Self, WorkflowError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| WorkflowError::ReadFailed { path: path.to_path_buf(), source: e })?;
        let file: WorkflowFile = serde_json::from_str(&content).map_err(|e| WorkflowError::ParseFailed {
            name: path.display().to_string(),
            message: e.to_string(),
        })?;
        let mut bundles = file.bundles;
        bundles.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(Self { bundles })
    }

    /// Registers a bundle directly (used by tests and the self-building
    /// flow's private tool specs).
    pub fn insert(&mut self, bundle: WorkflowBundle) {
        let pos = self
            .bundles
            .iter()
            .position(|b| b.priority < bundle.priority)
            .unwrap_or(self.bundles.len());
        self.bundles.insert(pos, bundle);
    }

    /// Finds the highest-priority bundle whose trigger matches `command`
    /// against the given purpose, returning any slots extracted from a
    /// pattern trigger.
    pub fn find_match(
        &self,
        command: &str,
        purpose: UserPurpose,
        _data_requirements: &DataRequirements,
    ) -> Option<(&WorkflowBundle, HashMap<String, String>)> {
        for bundle in &self.bundles {
            for trigger in &bundle.triggers {
                match trigger {
                    Trigger::Literal { text } if text == command => {
                        return Some((bundle, HashMap::new()));
                    }
                    Trigger::Pattern { regex } => {
                        if let Ok(re) = regex::Regex::new(regex) {
                            if let Some(captures) = re.captures(command) {
                                let slots = re
                                    .capture_names()
                                    .flatten()
                                    .filter_map(|name| {
                                        captures.name(name).map(|m| (name.to_string(), m.as_str().to_string()))
                                    })
                                    .collect();
                                return Some((bundle, slots));
                            }
                        }
                    }
                    Trigger::Purpose { purpose: p } if *p == purpose => {
                        return Some((bundle, HashMap::new()));
                    }
                    _ => {}
                }
            }
        }
        None
    }
}
