//! The compilation pipeline for one translation unit.
//!
//! Order is fixed: parent linking, decorator registration and application,
//! constant folding, code generation. Each unit owns its arena, registry,
//! and tables, so distinct units can compile in parallel as long as their
//! cache keys never collide.

pub mod cache;
pub mod codegen;
pub mod decorator;
pub mod optimize;

use thiserror::Error;
use tracing::debug;

use crate::ast::{link_parents, Ast};
use crate::bytecode::{Module, ModuleError};

pub use cache::{CacheError, ModuleCache, CACHE_EXTENSION};
pub use codegen::CodeGenerator;
pub use decorator::{DecoratorRegistry, ScriptError};
pub use optimize::fold_unit;

/// Compilation errors for one unit.
#[derive(Debug, Error)]
pub enum CompileError {
    /// Decorator compilation or evaluation failed.
    #[error("decorator error: {0}")]
    Script(#[from] ScriptError),

    /// Container serialization failed.
    #[error("module error: {0}")]
    Module(#[from] ModuleError),

    /// The arena has no root unit node.
    #[error("unit has no root node")]
    MissingRoot,

    /// A call target is neither a registered import nor a registered
    /// function label.
    #[error("call to `{0}` resolves to neither an import nor a function")]
    UnresolvedCallee(String),

    /// A name in expression position is neither a constant nor a current
    /// parameter.
    #[error("variable `{0}` resolves to neither a constant nor a parameter")]
    UnresolvedVariable(String),

    /// A type name has no table entry where one is required.
    #[error("unknown type `{0}`")]
    UnknownType(String),

    /// A constant initializer is not a literal the table can hold.
    #[error("constant `{name}` has an unsupported initializer")]
    UnsupportedConstInit {
        /// Constant name.
        name: String,
    },

    /// An expression shape has no lowering.
    #[error("expression `{0}` cannot be lowered")]
    UnsupportedExpression(&'static str),

    /// A float literal where only integers can be encoded.
    #[error("literal cannot be encoded as an operand or constant")]
    UnsupportedLiteral,

    /// Label ids must fit an 8-bit operand.
    #[error("too many labels for one unit")]
    TooManyLabels,

    /// Constant indices must fit an 8-bit operand.
    #[error("too many constants for positional addressing")]
    TooManyConstants,

    /// Import indices must fit an 8-bit operand.
    #[error("too many imports for positional addressing")]
    TooManyImports,

    /// Frame-relative parameter addressing is limited by the copy bias.
    #[error("too many parameters for frame-relative addressing")]
    TooManyParameters,

    /// Argument counts must fit an 8-bit operand.
    #[error("too many arguments in call to `{0}`")]
    TooManyArguments(String),

    /// Persisting the compiled container failed.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Result alias for compilation.
pub type CompileResult<T> = Result<T, CompileError>;

/// Compile one unit: link parents, run decorators, fold constants, generate
/// code and tables.
pub fn compile_unit(ast: &mut Ast) -> CompileResult<Module> {
    link_parents(ast);

    let registry = DecoratorRegistry::build(ast)?;
    let applied = registry.apply(ast)?;
    if applied > 0 {
        debug!(applied, "decorations applied");
    }

    fold_unit(ast);
    CodeGenerator::new().generate(ast)
}

/// Compile a unit and persist the container under `name` in the cache.
/// Nothing is cached when compilation fails.
pub fn compile_and_cache(
    ast: &mut Ast,
    name: &str,
    cache: &ModuleCache,
) -> CompileResult<Module> {
    let module = compile_unit(ast)?;
    cache.store(name, &module)?;
    Ok(module)
}
