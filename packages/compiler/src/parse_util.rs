//! Parse Utilities
//!
//! Source positions carried by the view tree and reported by structural errors.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Originating position of a node in the source file the parser read.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SourceLine {
    /// Path or URL of the source file, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// 1-based line number; 0 means unknown
    #[serde(default)]
    pub line: usize,
}

impl SourceLine {
    pub fn new(line: usize) -> Self {
        SourceLine { file: None, line }
    }

    pub fn in_file(file: impl Into<String>, line: usize) -> Self {
        SourceLine {
            file: Some(file.into()),
            line,
        }
    }

    pub fn is_known(&self) -> bool {
        self.line > 0
    }
}

impl fmt::Display for SourceLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, self.is_known()) {
            (Some(file), true) => write!(f, "{}:{}", file, self.line),
            (Some(file), false) => write!(f, "{}", file),
            (None, true) => write!(f, "line {}", self.line),
            (None, false) => write!(f, "<unknown>"),
        }
    }
}

/// Sanitize identifier by replacing non-word characters with underscores
pub fn sanitize_identifier(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// `count` -> `Count`, used to build change-callback names.
pub fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
