//! Sandboxed evaluation of compiled decorator bodies.
//!
//! The evaluator is deliberately capability-limited: it can read fields of
//! AST nodes, compare and combine plain values, and splice nodes built
//! through the [`NodeFactory`] into the shared arena. There is no ambient
//! I/O, no reflection, and no way to run host code; everything a decorator
//! can do is enumerated here.

use rustc_hash::FxHashMap;

use crate::ast::{Ast, BinaryOp, Node, NodeFactory, NodeId, Number};

use super::script::{Script, ScriptCall, ScriptExpr, ScriptSeg, ScriptStmt};
use super::ScriptError;

/// Which node list a list value refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListField {
    /// A statement list (unit, namespace, block, function body).
    Statements,
    /// A declaration's decorations.
    Decorations,
    /// A function's formal parameters.
    Parameters,
    /// A struct's body members.
    Body,
}

/// A value inside decorator evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    /// Absence of a value.
    Unit,
    /// Comparison result.
    Bool(bool),
    /// Numeric value.
    Num(Number),
    /// String value.
    Str(String),
    /// A node of the unit's arena; all bindings alias the same tree.
    Node(NodeId),
    /// A live view of a node's child list; mutations go straight into the
    /// arena.
    List { owner: NodeId, field: ListField },
    /// The node-factory capability.
    Factory,
}

impl ScriptValue {
    fn kind(&self) -> &'static str {
        match self {
            ScriptValue::Unit => "unit",
            ScriptValue::Bool(_) => "bool",
            ScriptValue::Num(_) => "number",
            ScriptValue::Str(_) => "string",
            ScriptValue::Node(_) => "node",
            ScriptValue::List { .. } => "list",
            ScriptValue::Factory => "factory",
        }
    }

    fn truthy(&self) -> bool {
        match self {
            ScriptValue::Unit => false,
            ScriptValue::Bool(b) => *b,
            ScriptValue::Num(n) => n.as_f64() != 0.0,
            ScriptValue::Str(s) => !s.is_empty(),
            ScriptValue::Node(_) | ScriptValue::List { .. } | ScriptValue::Factory => true,
        }
    }
}

/// Evaluator for one decorator application.
pub struct Evaluator<'a> {
    ast: &'a mut Ast,
    bindings: FxHashMap<String, ScriptValue>,
    factory: NodeFactory,
}

impl<'a> Evaluator<'a> {
    /// Bind the three formal names plus the factory capability.
    pub fn new(
        ast: &'a mut Ast,
        formals: &[String; 3],
        decoration: NodeId,
        root: NodeId,
        target: NodeId,
    ) -> Self {
        let mut bindings = FxHashMap::default();
        bindings.insert("factory".to_string(), ScriptValue::Factory);
        bindings.insert(formals[0].clone(), ScriptValue::Node(decoration));
        bindings.insert(formals[1].clone(), ScriptValue::Node(root));
        bindings.insert(formals[2].clone(), ScriptValue::Node(target));
        Self { ast, bindings, factory: NodeFactory::new() }
    }

    /// Run a compiled body to completion.
    pub fn run(&mut self, script: &Script) -> Result<(), ScriptError> {
        for stmt in &script.stmts {
            self.eval_stmt(stmt)?;
        }
        Ok(())
    }

    fn eval_stmt(&mut self, stmt: &ScriptStmt) -> Result<(), ScriptError> {
        match stmt {
            ScriptStmt::Let { name, value } => {
                let value = self.eval_expr(value)?;
                self.bindings.insert(name.clone(), value);
            }
            ScriptStmt::Expr(expr) => {
                self.eval_expr(expr)?;
            }
            ScriptStmt::If { cond, then_body, else_body } => {
                let body = if self.eval_expr(cond)?.truthy() { then_body } else { else_body };
                for stmt in body {
                    self.eval_stmt(stmt)?;
                }
            }
            ScriptStmt::For { binding, iterable, body } => {
                let items = match self.eval_expr(iterable)? {
                    ScriptValue::List { owner, field } => self.list_items(owner, field)?,
                    other => {
                        return Err(ScriptError::TypeMismatch {
                            expected: "list",
                            found: other.kind(),
                        })
                    }
                };
                for item in items {
                    self.bindings.insert(binding.clone(), ScriptValue::Node(item));
                    for stmt in body {
                        self.eval_stmt(stmt)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn eval_expr(&mut self, expr: &ScriptExpr) -> Result<ScriptValue, ScriptError> {
        match expr {
            ScriptExpr::Str(s) => Ok(ScriptValue::Str(s.clone())),
            ScriptExpr::Num(n) => Ok(ScriptValue::Num(*n)),
            ScriptExpr::Binary { lhs, op, rhs } => {
                let lhs = self.eval_expr(lhs)?;
                let rhs = self.eval_expr(rhs)?;
                apply_binary(*op, lhs, rhs)
            }
            ScriptExpr::Call(call) => Err(ScriptError::UnknownFunction(call.name.clone())),
            ScriptExpr::Path(segments) => self.eval_path(segments),
        }
    }

    fn eval_path(&mut self, segments: &[ScriptSeg]) -> Result<ScriptValue, ScriptError> {
        let mut segments = segments.iter();
        let mut current = match segments.next() {
            Some(ScriptSeg::Ident(name)) => self
                .bindings
                .get(name)
                .cloned()
                .ok_or_else(|| ScriptError::UnknownBinding(name.clone()))?,
            Some(ScriptSeg::Call(call)) => {
                return Err(ScriptError::UnknownFunction(call.name.clone()))
            }
            None => return Ok(ScriptValue::Unit),
        };
        for seg in segments {
            current = match seg {
                ScriptSeg::Ident(field) => self.field_of(&current, field)?,
                ScriptSeg::Call(call) => self.method_call(&current, call)?,
            };
        }
        Ok(current)
    }

    fn field_of(&self, value: &ScriptValue, field: &str) -> Result<ScriptValue, ScriptError> {
        let ScriptValue::Node(id) = value else {
            return Err(ScriptError::UnknownField { kind: value.kind(), field: field.to_string() });
        };
        let id = *id;
        let node = self.ast.node(id);
        let found = match (node, field) {
            (Node::Decoration(d), "key") => Some(ScriptValue::Str(d.key.clone())),
            (Node::Decoration(d), "value") => Some(match d.value {
                Some(value) => self.literal_value(value)?,
                None => ScriptValue::Unit,
            }),
            (Node::Var(v), "name") => Some(ScriptValue::Str(v.name.clone())),
            (Node::Var(v), "init") => Some(match v.init {
                Some(init) => ScriptValue::Node(init),
                None => ScriptValue::Unit,
            }),
            (Node::Var(_), "decorations") => list(id, ListField::Decorations),
            (Node::FnDef(f), "name") => Some(ScriptValue::Str(f.name.clone())),
            (Node::FnDef(_), "statements") => list(id, ListField::Statements),
            (Node::FnDef(_), "parameters") => list(id, ListField::Parameters),
            (Node::FnDef(_), "decorations") => list(id, ListField::Decorations),
            (Node::FnDecl(f), "name") => Some(ScriptValue::Str(f.name.clone())),
            (Node::FnDecl(_), "parameters") => list(id, ListField::Parameters),
            (Node::FnDecl(_), "decorations") => list(id, ListField::Decorations),
            (Node::Unit(_), "statements") => list(id, ListField::Statements),
            (Node::Block(_), "statements") => list(id, ListField::Statements),
            (Node::Namespace(n), "name") => Some(ScriptValue::Str(n.name.clone())),
            (Node::Namespace(_), "statements") => list(id, ListField::Statements),
            (Node::Struct(s), "name") => Some(ScriptValue::Str(s.name.clone())),
            (Node::Struct(_), "body") => list(id, ListField::Body),
            (Node::Struct(_), "decorations") => list(id, ListField::Decorations),
            (Node::Param(p), "name") => Some(ScriptValue::Str(p.name.clone())),
            (Node::Call(c), "name") => Some(ScriptValue::Str(c.callee.clone())),
            (Node::String(s), "value") => Some(ScriptValue::Str(s.value.clone())),
            (Node::Number(n), "value") => Some(ScriptValue::Num(n.value)),
            _ => None,
        };
        found.ok_or_else(|| ScriptError::UnknownField {
            kind: self.ast.node(id).kind(),
            field: field.to_string(),
        })
    }

    fn literal_value(&self, id: NodeId) -> Result<ScriptValue, ScriptError> {
        match self.ast.node(id) {
            Node::String(s) => Ok(ScriptValue::Str(s.value.clone())),
            Node::Number(n) => Ok(ScriptValue::Num(n.value)),
            other => Err(ScriptError::TypeMismatch { expected: "literal", found: other.kind() }),
        }
    }

    fn method_call(
        &mut self,
        receiver: &ScriptValue,
        call: &ScriptCall,
    ) -> Result<ScriptValue, ScriptError> {
        let args = call
            .args
            .iter()
            .map(|arg| self.eval_expr(arg))
            .collect::<Result<Vec<_>, _>>()?;
        match receiver {
            ScriptValue::Factory => self.factory_method(&call.name, args),
            ScriptValue::List { owner, field } => {
                self.list_method(*owner, *field, &call.name, args)
            }
            other => Err(ScriptError::UnknownMethod {
                receiver: other.kind(),
                method: call.name.clone(),
            }),
        }
    }

    // ========================================================================
    // Factory methods
    // ========================================================================

    fn factory_method(
        &mut self,
        name: &str,
        args: Vec<ScriptValue>,
    ) -> Result<ScriptValue, ScriptError> {
        let method = || ScriptError::ArgumentMismatch { method: name.to_string() };
        match name {
            "call" => {
                let mut args = args.into_iter();
                let callee = expect_str(args.next().ok_or_else(method)?)?;
                let arguments = args
                    .map(|arg| self.value_to_node(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ScriptValue::Node(self.factory.call(self.ast, &callee, arguments)))
            }
            "string" => {
                let [value] = take_args::<1>(args, method)?;
                let value = expect_str(value)?;
                Ok(ScriptValue::Node(self.factory.string(self.ast, &value)))
            }
            "number" => {
                let [value] = take_args::<1>(args, method)?;
                let ScriptValue::Num(n) = value else {
                    return Err(ScriptError::TypeMismatch {
                        expected: "number",
                        found: value.kind(),
                    });
                };
                Ok(ScriptValue::Node(self.factory.number(self.ast, n)))
            }
            "type_ref" => {
                let [value] = take_args::<1>(args, method)?;
                let name = expect_str(value)?;
                Ok(ScriptValue::Node(self.factory.type_ref(self.ast, &name)))
            }
            "variable" => {
                let mut args = args.into_iter();
                let var_name = expect_str(args.next().ok_or_else(method)?)?;
                let ty_name = expect_str(args.next().ok_or_else(method)?)?;
                let init = match args.next() {
                    Some(value) => Some(self.value_to_node(value)?),
                    None => None,
                };
                let ty = self.factory.type_ref(self.ast, &ty_name);
                Ok(ScriptValue::Node(self.factory.variable(self.ast, &var_name, ty, init)))
            }
            "decoration" => {
                let mut args = args.into_iter();
                let key = expect_str(args.next().ok_or_else(method)?)?;
                let value = match args.next() {
                    Some(value) => Some(self.value_to_node(value)?),
                    None => None,
                };
                Ok(ScriptValue::Node(self.factory.decoration(self.ast, &key, value)))
            }
            "function_declaration" => {
                let [value] = take_args::<1>(args, method)?;
                let fn_name = expect_str(value)?;
                Ok(ScriptValue::Node(self.factory.function_declaration(
                    self.ast,
                    &fn_name,
                    Vec::new(),
                    None,
                    Vec::new(),
                )))
            }
            "function_definition" => {
                let [value] = take_args::<1>(args, method)?;
                let fn_name = expect_str(value)?;
                Ok(ScriptValue::Node(self.factory.function_definition(
                    self.ast,
                    &fn_name,
                    Vec::new(),
                    None,
                    Vec::new(),
                )))
            }
            "binary" => {
                let [lhs, op, rhs] = take_args::<3>(args, method)?;
                let lhs = self.value_to_node(lhs)?;
                let op = parse_operator(&expect_str(op)?)?;
                let rhs = self.value_to_node(rhs)?;
                Ok(ScriptValue::Node(self.factory.binary(self.ast, lhs, op, rhs)))
            }
            "path" => {
                let names = args.into_iter().map(expect_str).collect::<Result<Vec<_>, _>>()?;
                let refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
                Ok(ScriptValue::Node(self.factory.path(self.ast, &refs)))
            }
            _ => Err(ScriptError::UnknownFactoryMethod(name.to_string())),
        }
    }

    // ========================================================================
    // List methods
    // ========================================================================

    fn list_method(
        &mut self,
        owner: NodeId,
        field: ListField,
        name: &str,
        args: Vec<ScriptValue>,
    ) -> Result<ScriptValue, ScriptError> {
        let method = || ScriptError::ArgumentMismatch { method: name.to_string() };
        match name {
            "insert" => {
                let [index, value] = take_args::<2>(args, method)?;
                let ScriptValue::Num(Number::Int(index)) = index else {
                    return Err(ScriptError::TypeMismatch {
                        expected: "integer index",
                        found: index.kind(),
                    });
                };
                let node = self.value_to_node(value)?;
                let list = self.list_mut(owner, field)?;
                if index < 0 || index as usize > list.len() {
                    return Err(ScriptError::IndexOutOfRange { index, len: list.len() });
                }
                list.insert(index as usize, node);
                Ok(ScriptValue::Unit)
            }
            "push" => {
                let [value] = take_args::<1>(args, method)?;
                let node = self.value_to_node(value)?;
                self.list_mut(owner, field)?.push(node);
                Ok(ScriptValue::Unit)
            }
            "len" => {
                if !args.is_empty() {
                    return Err(method());
                }
                let len = self.list_items(owner, field)?.len();
                Ok(ScriptValue::Num(Number::Int(len as i64)))
            }
            _ => Err(ScriptError::UnknownMethod { receiver: "list", method: name.to_string() }),
        }
    }

    fn list_items(&self, owner: NodeId, field: ListField) -> Result<Vec<NodeId>, ScriptError> {
        list_of(self.ast.node(owner), field)
            .map(|v| v.clone())
            .ok_or(ScriptError::TypeMismatch { expected: "list", found: "node" })
    }

    fn list_mut(
        &mut self,
        owner: NodeId,
        field: ListField,
    ) -> Result<&mut Vec<NodeId>, ScriptError> {
        list_of_mut(self.ast.node_mut(owner), field)
            .ok_or(ScriptError::TypeMismatch { expected: "list", found: "node" })
    }

    /// Coerce a value to a node id, allocating literal nodes on demand.
    fn value_to_node(&mut self, value: ScriptValue) -> Result<NodeId, ScriptError> {
        match value {
            ScriptValue::Node(id) => Ok(id),
            ScriptValue::Str(s) => Ok(self.factory.string(self.ast, &s)),
            ScriptValue::Num(n) => Ok(self.factory.number(self.ast, n)),
            other => Err(ScriptError::TypeMismatch { expected: "node", found: other.kind() }),
        }
    }
}

fn list(owner: NodeId, field: ListField) -> Option<ScriptValue> {
    Some(ScriptValue::List { owner, field })
}

fn list_of(node: &Node, field: ListField) -> Option<&Vec<NodeId>> {
    match (node, field) {
        (Node::Unit(n), ListField::Statements) => Some(&n.statements),
        (Node::Namespace(n), ListField::Statements) => Some(&n.statements),
        (Node::Block(n), ListField::Statements) => Some(&n.statements),
        (Node::FnDef(n), ListField::Statements) => Some(&n.statements),
        (Node::Var(n), ListField::Decorations) => Some(&n.decorations),
        (Node::FnDecl(n), ListField::Decorations) => Some(&n.decorations),
        (Node::FnDef(n), ListField::Decorations) => Some(&n.decorations),
        (Node::Struct(n), ListField::Decorations) => Some(&n.decorations),
        (Node::InterfaceFn(n), ListField::Decorations) => Some(&n.decorations),
        (Node::FnDecl(n), ListField::Parameters) => Some(&n.params),
        (Node::FnDef(n), ListField::Parameters) => Some(&n.params),
        (Node::InterfaceFn(n), ListField::Parameters) => Some(&n.params),
        (Node::Struct(n), ListField::Body) => Some(&n.body),
        _ => None,
    }
}

fn list_of_mut(node: &mut Node, field: ListField) -> Option<&mut Vec<NodeId>> {
    match (node, field) {
        (Node::Unit(n), ListField::Statements) => Some(&mut n.statements),
        (Node::Namespace(n), ListField::Statements) => Some(&mut n.statements),
        (Node::Block(n), ListField::Statements) => Some(&mut n.statements),
        (Node::FnDef(n), ListField::Statements) => Some(&mut n.statements),
        (Node::Var(n), ListField::Decorations) => Some(&mut n.decorations),
        (Node::FnDecl(n), ListField::Decorations) => Some(&mut n.decorations),
        (Node::FnDef(n), ListField::Decorations) => Some(&mut n.decorations),
        (Node::Struct(n), ListField::Decorations) => Some(&mut n.decorations),
        (Node::InterfaceFn(n), ListField::Decorations) => Some(&mut n.decorations),
        (Node::FnDecl(n), ListField::Parameters) => Some(&mut n.params),
        (Node::FnDef(n), ListField::Parameters) => Some(&mut n.params),
        (Node::InterfaceFn(n), ListField::Parameters) => Some(&mut n.params),
        (Node::Struct(n), ListField::Body) => Some(&mut n.body),
        _ => None,
    }
}

fn take_args<const N: usize>(
    args: Vec<ScriptValue>,
    err: impl Fn() -> ScriptError,
) -> Result<[ScriptValue; N], ScriptError> {
    <[ScriptValue; N]>::try_from(args).map_err(|_| err())
}

fn expect_str(value: ScriptValue) -> Result<String, ScriptError> {
    match value {
        ScriptValue::Str(s) => Ok(s),
        other => Err(ScriptError::TypeMismatch { expected: "string", found: other.kind() }),
    }
}

fn parse_operator(op: &str) -> Result<BinaryOp, ScriptError> {
    Ok(match op {
        "+" => BinaryOp::Add,
        "-" => BinaryOp::Sub,
        "*" => BinaryOp::Mul,
        "/" => BinaryOp::Div,
        "%" => BinaryOp::Mod,
        "<<" => BinaryOp::Shl,
        ">>" => BinaryOp::Shr,
        "&" => BinaryOp::BitAnd,
        "|" => BinaryOp::BitOr,
        "^" => BinaryOp::BitXor,
        "==" => BinaryOp::Eq,
        "!=" => BinaryOp::Ne,
        "<" => BinaryOp::Lt,
        "<=" => BinaryOp::Le,
        ">" => BinaryOp::Gt,
        ">=" => BinaryOp::Ge,
        "&&" => BinaryOp::And,
        "||" => BinaryOp::Or,
        _ => return Err(ScriptError::UnknownOperator(op.to_string())),
    })
}

fn apply_binary(
    op: BinaryOp,
    lhs: ScriptValue,
    rhs: ScriptValue,
) -> Result<ScriptValue, ScriptError> {
    use ScriptValue::{Bool, Num, Str};
    match op {
        BinaryOp::Eq => Ok(Bool(values_equal(&lhs, &rhs))),
        BinaryOp::Ne => Ok(Bool(!values_equal(&lhs, &rhs))),
        BinaryOp::And => Ok(Bool(lhs.truthy() && rhs.truthy())),
        BinaryOp::Or => Ok(Bool(lhs.truthy() || rhs.truthy())),
        BinaryOp::Add => match (lhs, rhs) {
            (Str(a), Str(b)) => Ok(Str(a + &b)),
            (Num(a), Num(b)) => Ok(Num(num_arith(op, a, b)?)),
            (lhs, _) => Err(ScriptError::TypeMismatch {
                expected: "number or string",
                found: lhs.kind(),
            }),
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => match (lhs, rhs) {
            (Num(a), Num(b)) => Ok(Num(num_arith(op, a, b)?)),
            (lhs, _) => Err(ScriptError::TypeMismatch { expected: "number", found: lhs.kind() }),
        },
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => match (lhs, rhs) {
            (Num(a), Num(b)) => {
                let (a, b) = (a.as_f64(), b.as_f64());
                Ok(Bool(match op {
                    BinaryOp::Lt => a < b,
                    BinaryOp::Le => a <= b,
                    BinaryOp::Gt => a > b,
                    _ => a >= b,
                }))
            }
            (lhs, _) => Err(ScriptError::TypeMismatch { expected: "number", found: lhs.kind() }),
        },
        BinaryOp::Shl | BinaryOp::Shr | BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => {
            match (lhs, rhs) {
                (Num(Number::Int(a)), Num(Number::Int(b))) => Ok(Num(Number::Int(match op {
                    BinaryOp::Shl => a.wrapping_shl(b as u32),
                    BinaryOp::Shr => a.wrapping_shr(b as u32),
                    BinaryOp::BitAnd => a & b,
                    BinaryOp::BitOr => a | b,
                    _ => a ^ b,
                }))),
                (lhs, _) => {
                    Err(ScriptError::TypeMismatch { expected: "integer", found: lhs.kind() })
                }
            }
        }
    }
}

fn values_equal(lhs: &ScriptValue, rhs: &ScriptValue) -> bool {
    match (lhs, rhs) {
        (ScriptValue::Num(a), ScriptValue::Num(b)) => a.as_f64() == b.as_f64(),
        _ => lhs == rhs,
    }
}

fn num_arith(op: BinaryOp, a: Number, b: Number) -> Result<Number, ScriptError> {
    if let (Number::Int(a), Number::Int(b)) = (a, b) {
        let v = match op {
            BinaryOp::Add => a.wrapping_add(b),
            BinaryOp::Sub => a.wrapping_sub(b),
            BinaryOp::Mul => a.wrapping_mul(b),
            BinaryOp::Div if b != 0 => a.wrapping_div(b),
            BinaryOp::Mod if b != 0 => a.wrapping_rem(b),
            _ => return Err(ScriptError::DivisionByZero),
        };
        return Ok(Number::Int(v));
    }
    let (a, b) = (a.as_f64(), b.as_f64());
    let v = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        _ => a % b,
    };
    Ok(Number::Float(v))
}
