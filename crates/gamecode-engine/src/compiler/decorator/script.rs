//! Compiled form of a decorator body.
//!
//! A decorator body is restricted to a fixed grammar subset: variable
//! bindings, calls, dotted paths, binary expressions, `if` and `for`. The
//! [`ScriptCompiler`] lowers that subset, node by node via the bottom-up
//! transform, into the [`Script`] tree the sandboxed evaluator runs. The
//! compilation happens once per decorator declaration; applying the
//! decorator re-runs only the evaluator.

use rustc_hash::FxHashMap;

use crate::ast::{visitor, Ast, BinaryOp, Node, NodeId, Number, PathSeg, Transformer};

use super::ScriptError;

/// A compiled decorator body.
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    /// Statements in body order.
    pub stmts: Vec<ScriptStmt>,
}

/// One statement of a compiled body.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStmt {
    /// `name = expr` binding.
    Let { name: String, value: ScriptExpr },
    /// Expression evaluated for its effect.
    Expr(ScriptExpr),
    /// Conditional.
    If { cond: ScriptExpr, then_body: Vec<ScriptStmt>, else_body: Vec<ScriptStmt> },
    /// Iteration over a node list.
    For { binding: String, iterable: ScriptExpr, body: Vec<ScriptStmt> },
}

/// One expression of a compiled body.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptExpr {
    /// String literal.
    Str(String),
    /// Numeric literal.
    Num(Number),
    /// Dotted path: bindings, field reads, method calls.
    Path(Vec<ScriptSeg>),
    /// Free function call (always an error at evaluation time; kept so the
    /// evaluator can name the offender).
    Call(ScriptCall),
    /// Binary operation.
    Binary { lhs: Box<ScriptExpr>, op: BinaryOp, rhs: Box<ScriptExpr> },
}

/// A call with its evaluated-in-order arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptCall {
    /// Method or constructor name.
    pub name: String,
    /// Argument expressions.
    pub args: Vec<ScriptExpr>,
}

/// One path segment.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptSeg {
    /// Plain identifier: binding root or field read.
    Ident(String),
    /// Method call on the value so far.
    Call(ScriptCall),
}

/// Compile a decorator body (its statement list) into a [`Script`].
pub fn compile_body(ast: &mut Ast, statements: &[NodeId]) -> Result<Script, ScriptError> {
    let mut compiler = ScriptCompiler::default();
    for &stmt in statements {
        visitor::transform(&mut compiler, ast, stmt);
    }
    if let Some(err) = compiler.error.take() {
        return Err(err);
    }
    let stmts = statements
        .iter()
        .map(|id| compiler.take_stmt(*id))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Script { stmts })
}

/// Bottom-up compiler from body nodes to script form. Produces an
/// expression or statement per node in side tables; parents assemble their
/// children from those tables (children always run first).
#[derive(Default)]
struct ScriptCompiler {
    exprs: FxHashMap<NodeId, ScriptExpr>,
    stmts: FxHashMap<NodeId, ScriptStmt>,
    error: Option<ScriptError>,
}

impl ScriptCompiler {
    fn take_expr(&mut self, id: NodeId) -> Result<ScriptExpr, ScriptError> {
        self.exprs.remove(&id).ok_or(ScriptError::UnsupportedBody)
    }

    fn take_stmt(&mut self, id: NodeId) -> Result<ScriptStmt, ScriptError> {
        if let Some(stmt) = self.stmts.remove(&id) {
            return Ok(stmt);
        }
        // A bare expression in statement position.
        self.take_expr(id).map(ScriptStmt::Expr)
    }

    fn take_stmts(&mut self, ids: &[NodeId]) -> Result<Vec<ScriptStmt>, ScriptError> {
        ids.iter().map(|id| self.take_stmt(*id)).collect()
    }

    fn fail(&mut self, err: ScriptError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }
}

impl Transformer for ScriptCompiler {
    fn transform_node(&mut self, ast: &Ast, id: NodeId) -> Option<Node> {
        if self.error.is_some() {
            return None;
        }
        match ast.node(id) {
            Node::String(s) => {
                self.exprs.insert(id, ScriptExpr::Str(s.value.clone()));
            }
            Node::Number(n) => {
                self.exprs.insert(id, ScriptExpr::Num(n.value));
            }
            Node::Binary(b) => {
                let (lhs, rhs) = (b.lhs, b.rhs);
                let op = b.op;
                match (self.take_expr(lhs), self.take_expr(rhs)) {
                    (Ok(l), Ok(r)) => {
                        self.exprs.insert(
                            id,
                            ScriptExpr::Binary { lhs: Box::new(l), op, rhs: Box::new(r) },
                        );
                    }
                    (Err(e), _) | (_, Err(e)) => self.fail(e),
                }
            }
            Node::Call(c) => {
                let name = c.callee.clone();
                let args: Result<Vec<_>, _> =
                    c.arguments.clone().into_iter().map(|a| self.take_expr(a)).collect();
                match args {
                    Ok(args) => {
                        self.exprs.insert(id, ScriptExpr::Call(ScriptCall { name, args }));
                    }
                    Err(e) => self.fail(e),
                }
            }
            Node::Path(p) => {
                let mut segs = Vec::with_capacity(p.segments.len());
                for seg in p.segments.clone() {
                    match seg {
                        PathSeg::Ident(name) => segs.push(ScriptSeg::Ident(name)),
                        PathSeg::Call(call_id) => match self.take_expr(call_id) {
                            Ok(ScriptExpr::Call(call)) => segs.push(ScriptSeg::Call(call)),
                            Ok(_) | Err(_) => {
                                self.fail(ScriptError::UnsupportedBody);
                                return None;
                            }
                        },
                    }
                }
                self.exprs.insert(id, ScriptExpr::Path(segs));
            }
            Node::Var(v) => {
                let Some(init) = v.init else {
                    self.fail(ScriptError::MissingInitializer(v.name.clone()));
                    return None;
                };
                let name = v.name.clone();
                match self.take_expr(init) {
                    Ok(value) => {
                        self.stmts.insert(id, ScriptStmt::Let { name, value });
                    }
                    Err(e) => self.fail(e),
                }
            }
            Node::If(stmt) => {
                let (cond_id, then_ids, else_ids) =
                    (stmt.condition, stmt.then_branch.clone(), stmt.else_branch.clone());
                let cond = self.take_expr(cond_id);
                let then_body = self.take_stmts(&then_ids);
                let else_body = self.take_stmts(&else_ids);
                match (cond, then_body, else_body) {
                    (Ok(cond), Ok(then_body), Ok(else_body)) => {
                        self.stmts.insert(id, ScriptStmt::If { cond, then_body, else_body });
                    }
                    (Err(e), ..) | (_, Err(e), _) | (.., Err(e)) => self.fail(e),
                }
            }
            Node::For(stmt) => {
                let (binding, iterable_id, body_ids) =
                    (stmt.binding.clone(), stmt.iterable, stmt.body.clone());
                let iterable = self.take_expr(iterable_id);
                let body = self.take_stmts(&body_ids);
                match (iterable, body) {
                    (Ok(iterable), Ok(body)) => {
                        self.stmts.insert(id, ScriptStmt::For { binding, iterable, body });
                    }
                    (Err(e), _) | (_, Err(e)) => self.fail(e),
                }
            }
            // Type annotations inside bindings carry no script meaning.
            Node::TypeRef(_) => {}
            other => self.fail(ScriptError::UnsupportedNode { kind: other.kind() }),
        }
        None
    }
}
