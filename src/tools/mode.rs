//! The mode gate: `chat` is read-only, `code` permits mutating tools
//! scoped to a declared repository root.

use std::path::{Path, PathBuf};

pub use crate::document::Mode;

use crate::errors::ToolError;

/// Checks one prospective tool invocation against the active mode.
/// Called by both the Coordinator (§4.7) and, per the defense-in-depth
/// requirement, the tool server endpoint itself.
pub fn check_mutation(mode: Mode, family: &str, mutating: bool) -> Result<(), ToolError> {
    if mutating && !mode.is_code() {
        return Err(ToolError::ModeGateRejected { family: family.to_string() });
    }
    Ok(())
}

/// In code mode, a write target must resolve inside `repo_root`. Returns
/// an error (surfaced by the Orchestrator as an intervention) if not.
pub fn check_write_scope(repo_root: &Path, target: &Path) -> Result<(), ToolError> {
    let resolved = if target.is_absolute() {
        target.to_path_buf()
    } else {
        repo_root.join(target)
    };
    let resolved = normalize(&resolved);
    let root = normalize(repo_root);
    if resolved.starts_with(&root) {
        Ok(())
    } else {
        Err(ToolError::WriteOutsideRoot { path: target.to_path_buf() })
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_mode_rejects_mutating_tool() {
        let err = check_mutation(Mode::Chat, "file_delete", true).unwrap_err();
        assert!(matches!(err, ToolError::ModeGateRejected { .. }));
    }

    #[test]
    fn chat_mode_allows_read_only_tool() {
        assert!(check_mutation(Mode::Chat, "web_fetch", false).is_ok());
    }

    #[test]
    fn code_mode_allows_mutating_tool() {
        assert!(check_mutation(Mode::Code, "file_write", true).is_ok());
    }

    #[test]
    fn write_inside_root_is_allowed() {
        let root = Path::new("/repo");
        assert!(check_write_scope(root, Path::new("src/lib.rs")).is_ok());
    }

    #[test]
    fn write_escaping_root_is_rejected() {
        let root = Path::new("/repo");
        let err = check_write_scope(root, Path::new("../etc/passwd")).unwrap_err();
        assert!(matches!(err, ToolError::WriteOutsideRoot { .. }));
    }
}
