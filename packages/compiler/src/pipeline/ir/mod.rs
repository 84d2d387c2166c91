//! IR Module
//!
//! Handles, primitive ops, procedure statements and the reactive-site records that
//! lowering produces.

pub mod handle;
pub mod ops;
pub mod program;
pub mod regions;
pub mod stmt;

pub use handle::*;
pub use ops::*;
pub use program::*;
pub use regions::*;
pub use stmt::*;
