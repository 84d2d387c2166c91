#![deny(clippy::all)]

/**
 * Reactive View Compiler CLI
 *
 * Loads component definitions from JSON files, lowers them and renders the
 * generated programs.
 */
pub use reactive_view_compiler as compiler;

pub mod perform_compile;

/// CLI version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
