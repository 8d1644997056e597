//! Gamecode language back end.
//!
//! This crate implements the gamecode toolchain from the parse tree down:
//! - **AST**: typed node arena and traversal protocols (`ast` module)
//! - **Compiler**: decorator engine, constant folding, bytecode generation,
//!   and the on-disk module cache (`compiler` module)
//! - **Bytecode**: opcodes and the segmented module container (`bytecode`
//!   module)
//! - **VM**: loader, cross-module label linker, and interpreter with native
//!   call marshaling (`vm` module)
//!
//! The grammar-driven parser is an external collaborator: it hands the
//! compiler an [`ast::Ast`] already shaped to the node variants defined
//! here.
//!
//! # Example
//!
//! ```rust,ignore
//! use gamecode_engine::{ast, compiler, vm::Vm};
//!
//! let mut unit: ast::Ast = parse(source); // external parser
//! let module = compiler::compile_unit(&mut unit)?;
//!
//! let mut vm = Vm::new();
//! vm.load_main(&module, None)?;
//! vm.run()?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![cfg_attr(test, allow(unused_imports))]

/// AST module: node arena, variants, visitors, and the node factory.
pub mod ast;

/// Bytecode module: opcodes, encoding primitives, and the container.
pub mod bytecode;

/// Compiler module: decorators, folding, codegen, and the module cache.
pub mod compiler;

/// VM module: loader, linker, and interpreter.
pub mod vm;

pub use ast::{Ast, Node, NodeFactory, NodeId};
pub use bytecode::{Module, ModuleError, Opcode};
pub use compiler::{
    compile_and_cache, compile_unit, CompileError, CompileResult, DecoratorRegistry, ModuleCache,
};
pub use vm::{Vm, VmError, VmResult};
