//! On-disk module cache.
//!
//! Compiled containers are persisted as `<module>.nimo`, keyed by module
//! name (the source file stem). The cache is the unit of separate
//! compilation: the driver writes one entry per successfully compiled unit,
//! and the VM's dependency loader reads the same entries back. Keys are
//! unique per unit, so parallel compilation of distinct units needs no
//! locking.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::bytecode::{Module, ModuleError};

/// File extension of cached containers.
pub const CACHE_EXTENSION: &str = "nimo";

/// Errors raised by cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem failure.
    #[error("cache I/O error for `{name}`: {source}")]
    Io {
        /// Module name involved.
        name: String,
        /// Underlying error.
        source: io::Error,
    },

    /// A cached container failed to encode or decode.
    #[error("cached module `{name}` is invalid: {source}")]
    Invalid {
        /// Module name involved.
        name: String,
        /// Underlying container error.
        source: ModuleError,
    },

    /// The requested module has no cache entry.
    #[error("module `{0}` is not in the cache")]
    Missing(String),
}

/// Directory-backed container cache.
#[derive(Debug, Clone)]
pub struct ModuleCache {
    root: PathBuf,
}

impl ModuleCache {
    /// Open (creating if needed) a cache rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| CacheError::Io {
            name: root.display().to_string(),
            source,
        })?;
        Ok(Self { root })
    }

    /// Path a module is cached at.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.{CACHE_EXTENSION}"))
    }

    /// True when the module has a cache entry.
    pub fn contains(&self, name: &str) -> bool {
        self.path_for(name).is_file()
    }

    /// Serialize and persist a compiled module.
    pub fn store(&self, name: &str, module: &Module) -> Result<(), CacheError> {
        let bytes = module.encode().map_err(|source| CacheError::Invalid {
            name: name.to_string(),
            source,
        })?;
        let path = self.path_for(name);
        fs::write(&path, bytes).map_err(|source| CacheError::Io {
            name: name.to_string(),
            source,
        })?;
        debug!(module = name, path = %path.display(), "cached module");
        Ok(())
    }

    /// Load a cached module back.
    pub fn load(&self, name: &str) -> Result<Module, CacheError> {
        let path = self.path_for(name);
        if !path.is_file() {
            return Err(CacheError::Missing(name.to_string()));
        }
        let bytes = fs::read(&path).map_err(|source| CacheError::Io {
            name: name.to_string(),
            source,
        })?;
        Module::decode(&bytes).map_err(|source| CacheError::Invalid {
            name: name.to_string(),
            source,
        })
    }

    /// Cache directory root.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{ConstValue, Opcode};
    use crate::bytecode::tag;

    #[test]
    fn store_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ModuleCache::open(dir.path()).unwrap();

        let mut module = Module::new();
        module.add_constant("ANSWER", tag::U32, ConstValue::Int(42));
        module.emit(Opcode::Return);
        cache.store("answers", &module).unwrap();

        assert!(cache.contains("answers"));
        let loaded = cache.load("answers").unwrap();
        assert_eq!(loaded.constants, module.constants);
        assert_eq!(loaded.code, module.code);
    }

    #[test]
    fn missing_module_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ModuleCache::open(dir.path()).unwrap();
        assert!(matches!(cache.load("absent"), Err(CacheError::Missing(_))));
    }
}
