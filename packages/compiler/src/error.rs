//! Compile Errors
//!
//! Structural errors detected before lowering. Any of them aborts the whole
//! compilation; lowering never produces partial output.

use std::fmt;
use thiserror::Error;

use crate::parse_util::SourceLine;

pub type Result<T> = std::result::Result<T, CompileError>;

/// How a prop is declared to be passed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropPassing {
    ByValue,
    ByReference,
}

impl PropPassing {
    pub fn from_reference(is_reference: bool) -> Self {
        if is_reference {
            PropPassing::ByReference
        } else {
            PropPassing::ByValue
        }
    }
}

impl fmt::Display for PropPassing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropPassing::ByValue => write!(f, "by value"),
            PropPassing::ByReference => write!(f, "by reference (`&`)"),
        }
    }
}

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("{line}: component `{component}` is used in a view but declares no view")]
    MissingView { component: String, line: SourceLine },

    #[error("{line}: unknown component `{name}`")]
    UnknownComponent { name: String, line: SourceLine },

    #[error("{line}: component `{component}` has no prop named `{prop}`")]
    UnknownProp {
        component: String,
        prop: String,
        line: SourceLine,
    },

    #[error("{line}: prop `{prop}` of `{component}` must be passed {expected}")]
    ReferenceMismatch {
        component: String,
        prop: String,
        expected: PropPassing,
        line: SourceLine,
    },

    #[error("{line}: `{member}` of type `{actual}` cannot be rendered as `{expected}`")]
    TypeMismatch {
        member: String,
        actual: String,
        expected: String,
        line: SourceLine,
    },

    #[error("{line}: `{name}` is not a state variable of a handle type and cannot receive a node ref")]
    InvalidRef { name: String, line: SourceLine },

    #[error("{line}: circular dependency between components: {}", .cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String>, line: SourceLine },

    #[error("{line}: keyed loop over `{iterable}` needs a key expression")]
    MissingKey { iterable: String, line: SourceLine },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode configuration: {0}")]
    Json(#[from] serde_json::Error),
}

impl CompileError {
    /// Originating line, for errors tied to a source position
    pub fn line(&self) -> Option<&SourceLine> {
        match self {
            CompileError::MissingView { line, .. }
            | CompileError::UnknownComponent { line, .. }
            | CompileError::UnknownProp { line, .. }
            | CompileError::ReferenceMismatch { line, .. }
            | CompileError::TypeMismatch { line, .. }
            | CompileError::InvalidRef { line, .. }
            | CompileError::CircularDependency { line, .. }
            | CompileError::MissingKey { line, .. } => Some(line),
            CompileError::Config(_) | CompileError::Io(_) | CompileError::Json(_) => None,
        }
    }
}
