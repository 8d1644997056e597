//! The gamecode virtual machine.
//!
//! Single-threaded by design: one program counter, one value stack, one
//! frame stack. Native calls are synchronous and block execution until they
//! return. There is no cancellation or timeout model; failures surface as
//! [`VmError`] to the embedding driver.

pub mod ffi;
pub mod interpreter;
pub mod linker;
pub mod value;

use thiserror::Error;

use crate::bytecode::ModuleError;
use crate::compiler::CacheError;

pub use ffi::{Library, LoadError};
pub use interpreter::Vm;
pub use linker::ModuleRegion;
pub use value::{NativeFn, NativeType, Value};

/// Errors raised while loading, linking, or executing bytecode.
#[derive(Debug, Error)]
pub enum VmError {
    /// More values were popped than pushed.
    #[error("stack underflow")]
    StackUnderflow,

    /// A value had the wrong shape for an operation.
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        /// What the operation needed.
        expected: &'static str,
        /// What it found.
        found: &'static str,
    },

    /// Integer division or modulo by zero.
    #[error("division by zero at pc {pc}")]
    DivisionByZero {
        /// Faulting program counter.
        pc: usize,
    },

    /// `Power` with a negative exponent.
    #[error("negative exponent at pc {pc}")]
    NegativeExponent {
        /// Faulting program counter.
        pc: usize,
    },

    /// A jump or function referenced a label its module never declared.
    #[error("module `{module}` references unknown label {label}")]
    UnknownLabel {
        /// Module being linked.
        module: String,
        /// Missing label id.
        label: u8,
    },

    /// A jump executed at a site the linker never mapped.
    #[error("jump site at pc {pc} was never linked")]
    UnlinkedJump {
        /// Faulting program counter.
        pc: usize,
    },

    /// Constant index out of the current module's table.
    #[error("constant index {index} out of range")]
    UnknownConstant {
        /// Requested index.
        index: usize,
    },

    /// Import index out of the current module's table.
    #[error("import index {index} out of range")]
    UnknownImport {
        /// Requested index.
        index: usize,
    },

    /// A constant's type tag has no runtime conversion.
    #[error("constant `{name}` has unsupported type tag {tag}")]
    UnsupportedConstant {
        /// Constant name.
        name: String,
        /// Offending tag.
        tag: u16,
    },

    /// A constant's value could not be marshaled.
    #[error("constant `{name}` in module `{module}` cannot be marshaled")]
    InvalidConstant {
        /// Module the constant came from.
        module: String,
        /// Constant name.
        name: String,
    },

    /// A type id was still unresolved when an instruction used it.
    #[error("type `{name}` is still unresolved at first use")]
    UnresolvedType {
        /// Unresolved type name.
        name: String,
    },

    /// The code buffer ended inside an instruction.
    #[error("instruction at pc {pc} is truncated")]
    TruncatedInstruction {
        /// Faulting program counter.
        pc: usize,
    },

    /// The program counter left every loaded module's region.
    #[error("pc {pc} falls outside every loaded module")]
    NoRegion {
        /// Faulting program counter.
        pc: usize,
    },

    /// A `Copy` operand outside the frame-relative window.
    #[error("copy operand {operand} is out of frame range")]
    InvalidCopyOperand {
        /// Raw operand byte.
        operand: u8,
    },

    /// Native marshaling supports a bounded argument count.
    #[error("native calls support at most 8 arguments, got {0}")]
    TooManyNativeArguments(usize),

    /// A dependency was referenced but no cache was provided.
    #[error("dependency `{0}` cannot be loaded without a module cache")]
    MissingDependency(String),

    /// Native library or symbol resolution failed.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// A dependency's cache entry was missing or invalid.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// A container failed to decode.
    #[error(transparent)]
    Module(#[from] ModuleError),
}

/// Result alias for VM operations.
pub type VmResult<T> = Result<T, VmError>;
