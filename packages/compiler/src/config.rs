//! Compiler Configuration
//!
//! Knobs for the lowering pass, loadable from a JSON file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{CompileError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompilerConfig {
    /// Attribute stamped on every created element with the component name
    pub scope_attribute: Option<String>,
    /// Clear a loop's parent in one operation when the loop is its only child
    pub bulk_clear: bool,
    /// Wrap construction in the view-depth counter and flush at depth zero
    pub batch_flush: bool,
    /// End every if-region transition with `_rebind()`
    pub rebind_after_toggle: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            scope_attribute: Some("data-scope".to_string()),
            bulk_clear: true,
            batch_flush: true,
            rebind_after_toggle: true,
        }
    }
}

impl CompilerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: CompilerConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if let Some(attr) = &self.scope_attribute {
            if attr.is_empty() || attr.chars().any(char::is_whitespace) {
                return Err(CompileError::Config(format!(
                    "scopeAttribute `{}` is not a valid attribute name",
                    attr
                )));
            }
        }
        Ok(())
    }
}
