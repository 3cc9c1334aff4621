//! Kernel preamble sent once per execution session.

use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

const EMBEDDED: &str = include_str!("../assets/kernel_bootstrap.py");

/// Bootstrap settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Preamble file to use instead of the built-in one.
    pub script_path: Option<String>,
}

/// Values substituted into the preamble.
#[derive(Debug, Clone)]
pub struct BootstrapParams<'a> {
    pub kernel_id: &'a str,
    pub session_id: &'a str,
    pub server_url: &'a str,
    pub session_link: &'a str,
    pub required_packages: &'a [String],
}

/// The preamble source, loaded once at startup.
#[derive(Debug, Clone)]
pub struct BootstrapTemplate {
    source: String,
}

impl BootstrapTemplate {
    /// The preamble compiled into the binary.
    pub fn embedded() -> Self {
        Self {
            source: EMBEDDED.to_string(),
        }
    }

    /// Read a preamble from disk.
    pub fn load(path: &Path) -> io::Result<Self> {
        Ok(Self {
            source: std::fs::read_to_string(path)?,
        })
    }

    pub fn from_source(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Fill in the placeholders. Unknown `{{...}}` sequences are left alone.
    pub fn render(&self, params: &BootstrapParams<'_>) -> String {
        let packages = serde_json::to_string(params.required_packages)
            .unwrap_or_else(|_| "[]".to_string());
        self.source
            .replace("{{KERNEL_ID}}", params.kernel_id)
            .replace("{{SESSION_ID}}", params.session_id)
            .replace("{{SERVER_URL}}", params.server_url)
            .replace("{{SESSION_LINK}}", params.session_link)
            .replace("{{REQUIRED_PACKAGES}}", &packages)
    }
}

impl Default for BootstrapTemplate {
    fn default() -> Self {
        Self::embedded()
    }
}
