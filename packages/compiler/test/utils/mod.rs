#![allow(dead_code)]
#![allow(unused_imports)]

//! Integration Test Utilities
//!
//! Component builders plus a machine that executes compiled programs and records
//! every primitive op.

pub mod machine;

pub use fixtures::*;
pub use machine::{count, kinds, Applied, Machine, Value, HOST};
