//! Implementations of some placement heuristics.

pub mod common;
pub mod degree;
pub mod estimation;
pub mod local;
pub mod random;
