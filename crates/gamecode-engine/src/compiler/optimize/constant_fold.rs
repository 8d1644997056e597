//! Constant folding.
//!
//! A bottom-up rewrite that collapses literal-literal arithmetic before code
//! generation. Folding only fires when every operand is already a numeric
//! literal; anything else is left for the VM.
//!
//! Division policy: operand representation is preserved. Integer/integer
//! division truncates toward zero and never folds on a zero divisor;
//! division involving a float operand is exact IEEE f64. Integer arithmetic
//! wraps (two's complement). Shifts and bitwise operators fold integers
//! only.

use crate::ast::{
    visitor, Ast, BinaryOp, Node, NodeId, Number, NumberLiteral, Transformer, UnaryOp,
};

/// Fold constant expressions in a whole unit.
pub fn fold_unit(ast: &mut Ast) {
    let Some(root) = ast.root() else { return };
    visitor::transform(&mut ConstantFolder, ast, root);
}

/// Bottom-up constant folder.
pub struct ConstantFolder;

impl Transformer for ConstantFolder {
    fn transform_node(&mut self, ast: &Ast, id: NodeId) -> Option<Node> {
        match ast.node(id) {
            Node::Unary(u) if u.op == UnaryOp::Neg => {
                let value = number_of(ast, u.operand)?;
                let negated = match value {
                    Number::Int(v) => Number::Int(v.wrapping_neg()),
                    Number::Float(v) => Number::Float(-v),
                };
                Some(Node::Number(NumberLiteral { value: negated }))
            }
            Node::Binary(b) => {
                let lhs = number_of(ast, b.lhs)?;
                let rhs = number_of(ast, b.rhs)?;
                let value = eval_binary(b.op, lhs, rhs)?;
                Some(Node::Number(NumberLiteral { value }))
            }
            _ => None,
        }
    }
}

fn number_of(ast: &Ast, id: NodeId) -> Option<Number> {
    match ast.node(id) {
        Node::Number(n) => Some(n.value),
        _ => None,
    }
}

fn eval_binary(op: BinaryOp, lhs: Number, rhs: Number) -> Option<Number> {
    use Number::{Float, Int};
    match (op, lhs, rhs) {
        (BinaryOp::Add, Int(a), Int(b)) => Some(Int(a.wrapping_add(b))),
        (BinaryOp::Sub, Int(a), Int(b)) => Some(Int(a.wrapping_sub(b))),
        (BinaryOp::Mul, Int(a), Int(b)) => Some(Int(a.wrapping_mul(b))),
        (BinaryOp::Div, Int(a), Int(b)) if b != 0 => Some(Int(a.wrapping_div(b))),
        (BinaryOp::Mod, Int(a), Int(b)) if b != 0 => Some(Int(a.wrapping_rem(b))),
        (BinaryOp::Shl, Int(a), Int(b)) if (0..64).contains(&b) => Some(Int(a << b)),
        (BinaryOp::Shr, Int(a), Int(b)) if (0..64).contains(&b) => Some(Int(a >> b)),
        (BinaryOp::BitAnd, Int(a), Int(b)) => Some(Int(a & b)),
        (BinaryOp::BitOr, Int(a), Int(b)) => Some(Int(a | b)),

        // Mixed or float operands: plain arithmetic is exact IEEE, the
        // integer-only operators never fire.
        (BinaryOp::Add, a, b) => Some(Float(a.as_f64() + b.as_f64())),
        (BinaryOp::Sub, a, b) => Some(Float(a.as_f64() - b.as_f64())),
        (BinaryOp::Mul, a, b) => Some(Float(a.as_f64() * b.as_f64())),
        (BinaryOp::Div, a, b) if b.as_f64() != 0.0 => Some(Float(a.as_f64() / b.as_f64())),
        (BinaryOp::Mod, a, b) if b.as_f64() != 0.0 => Some(Float(a.as_f64() % b.as_f64())),

        _ => None,
    }
}
