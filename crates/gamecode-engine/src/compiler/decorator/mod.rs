//! The decorator engine.
//!
//! Source code can declare compile-time annotations that rewrite the
//! declarations they are attached to:
//!
//! ```text
//! decorator log(self, root, target) {
//!     target.statements.insert(0, factory.call("trace", target.name))
//! }
//!
//! [[log]]
//! run() { .. }
//! ```
//!
//! Declaring `decorator NAME(a, b, c) { .. }` registers a transform under
//! `NAME`; its body is compiled once into a [`Script`]. Applying a matching
//! `Decoration` evaluates that script with the three declared names bound to
//! the triggering decoration node, the AST root, and the decorated
//! declaration. All three alias the same arena, so the script's splices
//! mutate the declaration subtree in place.
//!
//! This stage runs exactly once per unit, strictly after parent linking and
//! strictly before constant folding and code generation.

pub mod eval;
pub mod script;

use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::debug;

use crate::ast::{visitor, Ast, Node, NodeId, Visitor};

pub use eval::{Evaluator, ListField, ScriptValue};
pub use script::{Script, ScriptExpr, ScriptStmt};

/// Errors raised while compiling or evaluating decorator bodies.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// A node kind outside the decorator grammar subset appeared in a body.
    #[error("node kind `{kind}` is not allowed in a decorator body")]
    UnsupportedNode {
        /// Offending node kind.
        kind: &'static str,
    },

    /// A body expression had no compilable form.
    #[error("decorator body expression cannot be compiled")]
    UnsupportedBody,

    /// A binding in a body had no initializer.
    #[error("binding `{0}` in a decorator body has no initializer")]
    MissingInitializer(String),

    /// A name was not bound.
    #[error("unknown binding `{0}`")]
    UnknownBinding(String),

    /// Free function calls have no meaning inside a body.
    #[error("unknown function `{0}`")]
    UnknownFunction(String),

    /// A field read had no match for the node kind.
    #[error("node kind `{kind}` has no field `{field}`")]
    UnknownField {
        /// Receiver node kind.
        kind: &'static str,
        /// Requested field.
        field: String,
    },

    /// A method call had no match for the receiver.
    #[error("`{receiver}` has no method `{method}`")]
    UnknownMethod {
        /// Receiver value kind.
        receiver: &'static str,
        /// Requested method.
        method: String,
    },

    /// The factory has no such constructor.
    #[error("factory has no constructor `{0}`")]
    UnknownFactoryMethod(String),

    /// Wrong number of arguments to a method.
    #[error("wrong number of arguments for `{method}`")]
    ArgumentMismatch {
        /// Offending method.
        method: String,
    },

    /// A value had the wrong shape.
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        /// What the operation needed.
        expected: &'static str,
        /// What it got.
        found: &'static str,
    },

    /// List index out of range.
    #[error("index {index} out of range for list of length {len}")]
    IndexOutOfRange {
        /// Requested index.
        index: i64,
        /// List length.
        len: usize,
    },

    /// Unknown operator spelling passed to the factory.
    #[error("unknown operator `{0}`")]
    UnknownOperator(String),

    /// Division by zero during script arithmetic.
    #[error("division by zero in decorator body")]
    DivisionByZero,
}

/// A registered decorator: its three formal names and compiled body.
#[derive(Debug, Clone)]
pub struct CompiledDecorator {
    /// Formal binding names: decoration, root, target.
    pub formals: [String; 3],
    /// Compiled body.
    pub script: Script,
}

/// Name → compiled transform. Built once per unit before application;
/// immutable afterward (no mutating accessors exist).
#[derive(Debug, Default)]
pub struct DecoratorRegistry {
    decorators: FxHashMap<String, CompiledDecorator>,
}

impl DecoratorRegistry {
    /// Scan a unit for `decorator` definitions and compile each body.
    pub fn build(ast: &mut Ast) -> Result<Self, ScriptError> {
        let Some(root) = ast.root() else { return Ok(Self::default()) };

        let mut scan = DefScan::default();
        visitor::walk(&mut scan, ast, root, None);

        let mut decorators = FxHashMap::default();
        for id in scan.defs {
            let Node::DecoratorDef(def) = ast.node(id).clone() else { continue };
            let compiled = CompiledDecorator {
                formals: def.formals.clone(),
                script: script::compile_body(ast, &def.statements)?,
            };
            debug!(name = %def.name, "registered decorator");
            decorators.insert(def.name, compiled);
        }
        Ok(Self { decorators })
    }

    /// Look up a decorator by decoration key.
    pub fn get(&self, name: &str) -> Option<&CompiledDecorator> {
        self.decorators.get(name)
    }

    /// Number of registered decorators.
    pub fn len(&self) -> usize {
        self.decorators.len()
    }

    /// True when no decorators are registered.
    pub fn is_empty(&self) -> bool {
        self.decorators.is_empty()
    }

    /// Apply every matching decoration in the unit. Returns how many
    /// decorations fired.
    pub fn apply(&self, ast: &mut Ast) -> Result<usize, ScriptError> {
        let Some(root) = ast.root() else { return Ok(0) };

        // Snapshot the decoration sites first; applications splice new nodes
        // into the very subtrees being scanned.
        let mut scan = DecorationScan { sites: Vec::new() };
        visitor::walk(&mut scan, ast, root, None);

        let mut applied = 0;
        for (decoration, target) in scan.sites {
            let key = match ast.node(decoration) {
                Node::Decoration(d) => d.key.clone(),
                _ => continue,
            };
            let Some(compiled) = self.get(&key) else { continue };
            debug!(key = %key, "applying decorator");
            let mut evaluator =
                Evaluator::new(ast, &compiled.formals, decoration, root, target);
            evaluator.run(&compiled.script)?;
            applied += 1;
        }
        Ok(applied)
    }
}

/// Collects `decorator` definitions without descending into their bodies.
#[derive(Default)]
struct DefScan {
    defs: Vec<NodeId>,
}

impl Visitor for DefScan {
    fn visit_decorator_def(&mut self, _ast: &Ast, id: NodeId, _parent: Option<NodeId>) -> bool {
        self.defs.push(id);
        false
    }
}

/// Collects (decoration, decorated declaration) pairs. The decorated
/// declaration is the decoration's syntactic parent.
struct DecorationScan {
    sites: Vec<(NodeId, NodeId)>,
}

impl Visitor for DecorationScan {
    fn visit_decoration(&mut self, _ast: &Ast, id: NodeId, parent: Option<NodeId>) -> bool {
        if let Some(target) = parent {
            self.sites.push((id, target));
        }
        false
    }

    fn visit_decorator_def(&mut self, _ast: &Ast, _id: NodeId, _parent: Option<NodeId>) -> bool {
        false
    }
}
