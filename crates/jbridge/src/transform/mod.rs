//! Code transform pipeline.
//!
//! Client code goes through two steps before it reaches the kernel:
//!
//! 1. It is rendered as a Jinja template against a [`TemplateContext`].
//!    Rendering failures fall back to the raw code.
//! 2. It is wrapped according to its [`Mode`] so that the kernel only ever
//!    receives plain code in its own language.

mod wrap;

use std::collections::BTreeMap;
use std::env;

use jbridge_protocol::Mode;
use log::debug;
use minijinja::Environment;
use serde::Serialize;
use thiserror::Error;

pub use wrap::{ENV_FILE, REQUIREMENTS_FILE, SQL_HELPER, string_literal};

/// Errors from the transform pipeline. Never surfaced to the client.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("template render failed: {0}")]
    Render(#[from] minijinja::Error),
}

/// Variables available to client templates.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TemplateContext {
    pub user_id: String,
    pub workspace: Option<String>,
    /// Local date, `%Y-%m-%d`.
    pub date: String,
    /// Process environment snapshot.
    pub env: BTreeMap<String, String>,
}

impl TemplateContext {
    /// Snapshot the current process for a request in `workspace`.
    pub fn capture(workspace: Option<&str>) -> Self {
        let user_id = env::var("USER_ID")
            .or_else(|_| env::var("USER"))
            .unwrap_or_else(|_| "system".to_string());
        let env = env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();

        Self {
            user_id,
            workspace: workspace.map(str::to_string),
            date: chrono::Local::now().format("%Y-%m-%d").to_string(),
            env,
        }
    }
}

/// Render `raw` as a template.
pub fn render(raw: &str, context: &TemplateContext) -> Result<String, TransformError> {
    let env = Environment::new();
    Ok(env.render_str(raw, context)?)
}

/// Produce the code to send to the kernel.
///
/// Empty output means there is nothing to execute.
pub fn transform(raw: &str, mode: Mode, filename: Option<&str>, context: &TemplateContext) -> String {
    let rendered = match render(raw, context) {
        Ok(rendered) => rendered,
        Err(err) => {
            debug!("Using raw code, {}", err);
            raw.to_string()
        }
    };

    if rendered.is_empty() {
        return rendered;
    }

    match (mode, filename) {
        (Mode::Sql, _) => wrap::sql(&rendered),
        (Mode::System, Some(REQUIREMENTS_FILE)) => wrap::requirements(&rendered),
        (Mode::System, Some(ENV_FILE)) => wrap::dotenv(&rendered),
        _ => rendered,
    }
}
