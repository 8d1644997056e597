//! Compile-time rewrites over the AST.

pub mod constant_fold;

pub use constant_fold::{fold_unit, ConstantFolder};
