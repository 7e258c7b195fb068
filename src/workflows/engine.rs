//! Workflow Engine: executes one bundle's declarative step list against
//! the Tool Registry, threading prior step outputs into later templates.

use serde_json::Value;
use std::collections::HashMap;
use tracing::{info, warn};

use crate::document::{Claim, EvidenceKind, Mode};
use crate::errors::{ToolError, WorkflowError};
use crate::tools::ToolRegistry;
use crate::workflows::{OnFailure, WorkflowBundle, WorkflowStep};

/// Result of running one step.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub step_index: usize,
    pub tool_family: String,
    pub output: Value,
    pub claims: Vec<Claim>,
    pub failed: bool,
}

/// Aggregate result of a whole workflow invocation.
#[derive(Debug, Clone)]
pub struct WorkflowOutcome {
    pub workflow: String,
    pub steps: Vec<StepOutcome>,
    pub aborted: bool,
}

pub struct WorkflowEngine<'a> {
    tools: &'a ToolRegistry,
}

impl<'a> WorkflowEngine<'a> {
    pub fn new(tools: &'a ToolRegistry) -> Self {
        Self { tools }
    }

    pub async fn run(
        &self,
        bundle: &WorkflowBundle,
        mode: Mode,
        mut slots: HashMap<String, String>,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let mut outputs: Vec<Value> = Vec::new();
        let mut steps = Vec::new();
        let mut aborted = false;

        let mut index = 0usize;
        while index < bundle.steps.len() {
            let step = &bundle.steps[index];
            if self.tools.family(&step.tool_family).is_err() {
                return Err(WorkflowError::UnknownStepFamily {
                    workflow: bundle.name.clone(),
                    step: index,
                    family: step.tool_family.clone(),
                });
            }

            let args = render_args(&step.arg_template, &slots, &outputs);
            info!(workflow = %bundle.name, step = index, family = %step.tool_family, "running workflow step");

            match self.tools.invoke(&step.tool_family, mode, args).await {
                Ok(result) => {
                    outputs.push(result.data.clone());
                    for claim in &result.claims {
                        slots.insert(format!("claim_{}_text", claim.id), claim.text.clone());
                    }
                    steps.push(StepOutcome {
                        step_index: index,
                        tool_family: step.tool_family.clone(),
                        output: result.data,
                        claims: result.claims,
                        failed: false,
                    });
                    index += 1;
                }
                Err(e) => {
                    warn!(workflow = %bundle.name, step = index, error = %e, "workflow step failed");
                    steps.push(failed_step_outcome(index, step, &e));
                    match step.on_failure {
                        OnFailure::Abort => {
                            aborted = true;
                            break;
                        }
                        OnFailure::Continue => {
                            outputs.push(Value::Null);
                            index += 1;
                        }
                        OnFailure::FallbackStep => {
                            index = step.fallback_step.unwrap_or(index + 1);
                        }
                    }
                }
            }
        }

        Ok(WorkflowOutcome { workflow: bundle.name.clone(), steps, aborted })
    }
}

fn failed_step_outcome(index: usize, step: &WorkflowStep, error: &ToolError) -> StepOutcome {
    StepOutcome {
        step_index: index,
        tool_family: step.tool_family.clone(),
        output: serde_json::json!({ "error": error.to_string() }),
        claims: vec![Claim::new(
            format!("tool call to {} failed: {error}", step.tool_family),
            format!("step:{index}"),
            EvidenceKind::Tool,
            0.0,
        )],
        failed: true,
    }
}

/// Binds `{{slot}}` placeholders in a template against the command's
/// extracted slots and any prior step's raw output (by index, e.g.
/// `{{steps.0.result}}`).
fn render_args(template: &Value, slots: &HashMap<String, String>, outputs: &[Value]) -> Value {
    match template {
        Value::String(s) => {
            let mut rendered = s.clone();
            for (key, value) in slots {
                rendered = rendered.replace(&format!("{{{{{key}}}}}"), value);
            }
            for (i, output) in outputs.iter().enumerate() {
                if let Some(text) = output.as_str() {
                    rendered = rendered.replace(&format!("{{{{steps.{i}.result}}}}"), text);
                }
            }
            Value::String(rendered)
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_args(v, slots, outputs)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|v| render_args(v, slots, outputs)).collect()),
        other => other.clone(),
    }
}
