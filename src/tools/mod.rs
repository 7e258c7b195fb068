//! Tool Registry: the catalog of tool families (abstract contracts) and
//! tool instances (RPC endpoints realizing them). Enforces the mode gate
//! before any network call ever happens.

pub mod mode;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use crate::document::Mode;
use crate::errors::ToolError;

/// Abstract contract for a family of tools (e.g. `web_fetch`, `file_write`).
/// Multiple tool instances can realize one family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolFamilySpec {
    pub family: String,
    pub mutating: bool,
    pub input_schema: Value,
    pub output_schema: Value,
    pub timeout: Duration,
}

/// Normalized result of a tool RPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub status: ToolStatus,
    pub data: Value,
    #[serde(default)]
    pub claims: Vec<crate::document::Claim>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Ok,
    Error,
}

/// A concrete tool instance realizing a family's RPC contract. The engine
/// never implements these; it only calls them (`spec.md` out-of-scope
/// list). Tests substitute a stub.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn family(&self) -> &str;
    async fn invoke(&self, mode: Mode, input: Value) -> Result<ToolResult, ToolError>;
}

/// Catalog of registered families and the tools that realize them.
pub struct ToolRegistry {
    families: HashMap<String, ToolFamilySpec>,
    tools: HashMap<String, Vec<Box<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { families: HashMap::new(), tools: HashMap::new() }
    }

    pub fn register_family(&mut self, spec: ToolFamilySpec) {
        self.tools.entry(spec.family.clone()).or_default();
        self.families.insert(spec.family.clone(), spec);
    }

    pub fn register_tool(&mut self, tool: Box<dyn Tool>) -> Result<(), ToolError> {
        let family = tool.family().to_string();
        if !self.families.contains_key(&family) {
            return Err(ToolError::UnknownFamily { family });
        }
        self.tools.entry(family).or_default().push(tool);
        Ok(())
    }

    pub fn family(&self, family: &str) -> Result<&ToolFamilySpec, ToolError> {
        self.families
            .get(family)
            .ok_or_else(|| ToolError::UnknownFamily { family: family.to_string() })
    }

    /// Families matching `mode`, for restricting the catalog shown to the
    /// Coordinator when it picks a tool directly.
    pub fn families_for_mode(&self, mode: Mode) -> Vec<&ToolFamilySpec> {
        self.families
            .values()
            .filter(|f| mode.is_code() || !f.mutating)
            .collect()
    }

    /// Invokes the first tool registered for `family`, enforcing the mode
    /// gate before dispatch.
    pub async fn invoke(&self, family: &str, mode: Mode, input: Value) -> Result<ToolResult, ToolError> {
        let spec = self.family(family)?;
        mode::check_mutation(mode, family, spec.mutating)?;

        let tool = self
            .tools
            .get(family)
            .and_then(|tools| tools.first())
            .ok_or_else(|| ToolError::UnknownFamily { family: family.to_string() })?;

        match tokio::time::timeout(spec.timeout, tool.invoke(mode, input)).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout { tool: tool.name().to_string(), secs: spec.timeout.as_secs() }),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubTool {
        name: String,
        family: String,
    }

    #[async_trait]
    impl Tool for StubTool {
        fn name(&self) -> &str {
            &self.name
        }

        fn family(&self) -> &str {
            &self.family
        }

        async fn invoke(&self, _mode: Mode, _input: Value) -> Result<ToolResult, ToolError> {
            Ok(ToolResult { status: ToolStatus::Ok, data: Value::Null, claims: vec![], warnings: vec![] })
        }
    }

    fn family_spec(name: &str, mutating: bool) -> ToolFamilySpec {
        ToolFamilySpec {
            family: name.to_string(),
            mutating,
            input_schema: serde_json::json!({}),
            output_schema: serde_json::json!({}),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn invoke_rejects_mutating_family_in_chat_mode() {
        let mut registry = ToolRegistry::new();
        registry.register_family(family_spec("file_delete", true));
        registry
            .register_tool(Box::new(StubTool { name: "fs".into(), family: "file_delete".into() }))
            .unwrap();
        let err = registry
            .invoke("file_delete", Mode::Chat, Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ModeGateRejected { .. }));
    }

    #[tokio::test]
    async fn invoke_succeeds_for_read_only_family_in_chat_mode() {
        let mut registry = ToolRegistry::new();
        registry.register_family(family_spec("web_fetch", false));
        registry
            .register_tool(Box::new(StubTool { name: "http".into(), family: "web_fetch".into() }))
            .unwrap();
        let result = registry.invoke("web_fetch", Mode::Chat, Value::Null).await.unwrap();
        assert_eq!(result.status, ToolStatus::Ok);
    }

    #[test]
    fn register_tool_errors_for_unknown_family() {
        let mut registry = ToolRegistry::new();
        let err = registry
            .register_tool(Box::new(StubTool { name: "x".into(), family: "ghost".into() }))
            .unwrap_err();
        assert!(matches!(err, ToolError::UnknownFamily { .. }));
    }

    #[test]
    fn families_for_mode_hides_mutating_families_in_chat() {
        let mut registry = ToolRegistry::new();
        registry.register_family(family_spec("web_fetch", false));
        registry.register_family(family_spec("file_write", true));
        assert_eq!(registry.families_for_mode(Mode::Chat).len(), 1);
        assert_eq!(registry.families_for_mode(Mode::Code).len(), 2);
    }
}
