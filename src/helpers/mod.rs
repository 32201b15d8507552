//! Small focused utilities shared across the crate.

#[macro_use]
pub mod macros;
pub mod count;
