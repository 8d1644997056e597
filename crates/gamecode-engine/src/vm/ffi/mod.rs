//! Native library loading for VM imports.

pub mod loader;

pub use loader::{Library, LoadError};
