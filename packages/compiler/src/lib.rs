#![deny(clippy::all)]

//! Reactive View Compiler
//!
//! Lowers component definitions (state, props, methods and a declarative view tree)
//! into an initial-construction program and the sync procedures that keep the
//! rendered tree up to date when state changes.

pub mod ast;
pub mod config;
pub mod error;
pub mod parse_util;
pub mod pipeline;
pub mod schema;

pub use config::CompilerConfig;
pub use error::{CompileError, Result};
pub use pipeline::emit::emit_listing;
pub use pipeline::ir::ComponentProgram;
pub use pipeline::{compile_component, compile_unit};
pub use schema::{DefaultMethodSchema, MethodSchema};
