//! Workspace lookups used when opening an execution session.

use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::transform::REQUIREMENTS_FILE;

/// Prefix of per-workspace kernel spec names.
pub const KERNEL_SPEC_PREFIX: &str = "ws_";

/// Workspace settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Directory holding one subdirectory per workspace.
    pub root: String,
    /// Packages installed by the preamble when a workspace lists none.
    pub default_packages: Vec<String>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: "~/.local/share/jbridge/workspaces".to_string(),
            default_packages: ["duckdb", "pandas", "pyarrow", "rich"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Read-only view of the workspace root.
#[derive(Debug, Clone)]
pub struct WorkspaceDirectory {
    root: PathBuf,
    default_packages: Vec<String>,
}

impl WorkspaceDirectory {
    pub fn new(root: impl Into<PathBuf>, default_packages: Vec<String>) -> Self {
        Self {
            root: root.into(),
            default_packages,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn default_packages(&self) -> &[String] {
        &self.default_packages
    }

    /// Packages the preamble should install for `workspace`.
    ///
    /// Reads the workspace's requirements file. Any failure, or no workspace at
    /// all, yields the default list.
    pub async fn required_packages(&self, workspace: Option<&str>) -> Vec<String> {
        let Some(name) = workspace else {
            return self.default_packages.clone();
        };
        let path = self.root.join(name).join(REQUIREMENTS_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => parse_requirements(&text),
            Err(e) => {
                debug!("No requirements at {}: {}", path.display(), e);
                self.default_packages.clone()
            }
        }
    }
}

/// Keep ASCII alphanumerics, `-` and `_`. Returns `None` when nothing is left.
pub fn sanitize_name(raw: &str) -> Option<String> {
    let name: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if name.is_empty() { None } else { Some(name) }
}

/// Kernel spec registered for a workspace.
pub fn kernel_spec_name(workspace: &str) -> String {
    format!("{KERNEL_SPEC_PREFIX}{workspace}")
}

/// Package names from a requirements file: stripped, non-blank, not comments.
pub fn parse_requirements(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory(root: &Path) -> WorkspaceDirectory {
        WorkspaceDirectory::new(root, WorkspaceConfig::default().default_packages)
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("sales-2024_q1").as_deref(), Some("sales-2024_q1"));
        assert_eq!(sanitize_name("../etc/passwd").as_deref(), Some("etcpasswd"));
        assert_eq!(sanitize_name("a b;c").as_deref(), Some("abc"));
        assert_eq!(sanitize_name("../"), None);
        assert_eq!(sanitize_name(""), None);
    }

    #[test]
    fn test_kernel_spec_name() {
        assert_eq!(kernel_spec_name("sales"), "ws_sales");
    }

    #[test]
    fn test_parse_requirements() {
        let text = "# data\n  pandas==2.2  \n\nduckdb\n#rich\r\npolars\r\n";
        assert_eq!(parse_requirements(text), vec!["pandas==2.2", "duckdb", "polars"]);
    }

    #[tokio::test]
    async fn test_required_packages_from_workspace() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("sales")).unwrap();
        std::fs::write(root.path().join("sales/requirements.txt"), "polars\n# x\n").unwrap();

        let dir = directory(root.path());
        assert_eq!(dir.required_packages(Some("sales")).await, vec!["polars"]);
    }

    #[tokio::test]
    async fn test_required_packages_fallback() {
        let root = tempfile::tempdir().unwrap();
        let dir = directory(root.path());
        let defaults = vec!["duckdb", "pandas", "pyarrow", "rich"];

        assert_eq!(dir.required_packages(None).await, defaults);
        assert_eq!(dir.required_packages(Some("missing")).await, defaults);
    }
}
