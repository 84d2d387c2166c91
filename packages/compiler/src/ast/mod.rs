//! View Tree Model
//!
//! Input consumed by lowering: expressions, statements, view nodes and component
//! definitions.

pub mod component;
pub mod expression;
pub mod statement;
pub mod view;

pub use component::*;
pub use expression::*;
pub use statement::*;
pub use view::*;
