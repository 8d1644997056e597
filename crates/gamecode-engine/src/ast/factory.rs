//! Node synthesis for decorator transforms (and tests).
//!
//! The factory is the only node-creation capability handed to decorator
//! scripts: it can build the declaration and expression shapes a transform
//! is allowed to splice into the tree, nothing else.

use super::{
    Ast, BinaryExpr, BinaryOp, CallExpr, Decoration, FnDecl, FnDef, Node, NodeId, Number,
    NumberLiteral, PathExpr, PathSeg, StringLiteral, TypeRef, VarDecl,
};

/// Factory over an [`Ast`] arena. Stateless; every method allocates into the
/// arena passed to it.
#[derive(Debug, Default, Clone, Copy)]
pub struct NodeFactory;

impl NodeFactory {
    /// Create a factory.
    pub fn new() -> Self {
        Self
    }

    /// Variable declaration `ty name = init`.
    pub fn variable(
        &self,
        ast: &mut Ast,
        name: &str,
        ty: NodeId,
        init: Option<NodeId>,
    ) -> NodeId {
        ast.alloc(Node::Var(VarDecl {
            decorations: Vec::new(),
            is_static: false,
            ty,
            name: name.to_string(),
            init,
        }))
    }

    /// Type reference by name.
    pub fn type_ref(&self, ast: &mut Ast, name: &str) -> NodeId {
        ast.alloc(Node::TypeRef(TypeRef {
            is_const: false,
            name: name.to_string(),
            template_args: Vec::new(),
        }))
    }

    /// Decoration `[[key: value]]`.
    pub fn decoration(&self, ast: &mut Ast, key: &str, value: Option<NodeId>) -> NodeId {
        ast.alloc(Node::Decoration(Decoration { key: key.to_string(), value }))
    }

    /// Function prototype.
    pub fn function_declaration(
        &self,
        ast: &mut Ast,
        name: &str,
        params: Vec<NodeId>,
        return_type: Option<String>,
        decorations: Vec<NodeId>,
    ) -> NodeId {
        ast.alloc(Node::FnDecl(FnDecl {
            decorations,
            name: name.to_string(),
            params,
            return_type,
        }))
    }

    /// Function definition.
    pub fn function_definition(
        &self,
        ast: &mut Ast,
        name: &str,
        params: Vec<NodeId>,
        return_type: Option<String>,
        statements: Vec<NodeId>,
    ) -> NodeId {
        ast.alloc(Node::FnDef(FnDef {
            decorations: Vec::new(),
            name: name.to_string(),
            params,
            return_type,
            statements,
        }))
    }

    /// Call expression.
    pub fn call(&self, ast: &mut Ast, callee: &str, arguments: Vec<NodeId>) -> NodeId {
        ast.alloc(Node::Call(CallExpr { callee: callee.to_string(), arguments }))
    }

    /// String literal.
    pub fn string(&self, ast: &mut Ast, value: &str) -> NodeId {
        ast.alloc(Node::String(StringLiteral { value: value.to_string() }))
    }

    /// Numeric literal.
    pub fn number(&self, ast: &mut Ast, value: Number) -> NodeId {
        ast.alloc(Node::Number(NumberLiteral { value }))
    }

    /// Binary operation.
    pub fn binary(&self, ast: &mut Ast, lhs: NodeId, op: BinaryOp, rhs: NodeId) -> NodeId {
        ast.alloc(Node::Binary(BinaryExpr { lhs, op, rhs }))
    }

    /// Qualified-name path `a.b.c`.
    pub fn path(&self, ast: &mut Ast, names: &[&str]) -> NodeId {
        ast.alloc(Node::Path(PathExpr {
            segments: names.iter().map(|n| PathSeg::Ident(n.to_string())).collect(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_builds_call_with_string_argument() {
        let mut ast = Ast::new();
        let f = NodeFactory::new();
        let msg = f.string(&mut ast, "entering");
        let call = f.call(&mut ast, "trace", vec![msg]);

        let Node::Call(c) = ast.node(call) else { panic!() };
        assert_eq!(c.callee, "trace");
        assert_eq!(c.arguments, vec![msg]);
    }
}
