//! Shared builders for shaping units the way the external parser would.

#![allow(dead_code)]

use gamecode_engine::ast::{
    Ast, CallExpr, Decoration, FnDecl, FnDef, Node, NodeId, Number, NumberLiteral, Param,
    PathExpr, PathSeg, ReturnStmt, StringLiteral, TypeRef, Unit, UseDecl, VarDecl,
};

/// Allocate the unit root over `statements` and mark it as the root.
pub fn unit(ast: &mut Ast, imports: &[&str], statements: Vec<NodeId>) -> NodeId {
    let imports = imports
        .iter()
        .map(|m| ast.alloc(Node::Use(UseDecl { module: (*m).to_string() })))
        .collect();
    let id = ast.alloc(Node::Unit(Unit {
        package: "main".to_string(),
        imports,
        statements,
    }));
    ast.set_root(id);
    id
}

pub fn type_ref(ast: &mut Ast, name: &str, is_const: bool) -> NodeId {
    ast.alloc(Node::TypeRef(TypeRef {
        is_const,
        name: name.to_string(),
        template_args: Vec::new(),
    }))
}

pub fn num(ast: &mut Ast, value: i64) -> NodeId {
    ast.alloc(Node::Number(NumberLiteral { value: Number::Int(value) }))
}

pub fn string(ast: &mut Ast, value: &str) -> NodeId {
    ast.alloc(Node::String(StringLiteral { value: value.to_string() }))
}

pub fn path(ast: &mut Ast, name: &str) -> NodeId {
    ast.alloc(Node::Path(PathExpr { segments: vec![PathSeg::Ident(name.to_string())] }))
}

pub fn call(ast: &mut Ast, callee: &str, arguments: Vec<NodeId>) -> NodeId {
    ast.alloc(Node::Call(CallExpr { callee: callee.to_string(), arguments }))
}

/// `const <ty> <name> = <value>;`
pub fn const_int(ast: &mut Ast, name: &str, ty: &str, value: i64) -> NodeId {
    let ty = type_ref(ast, ty, true);
    let init = num(ast, value);
    ast.alloc(Node::Var(VarDecl {
        decorations: Vec::new(),
        is_static: false,
        ty,
        name: name.to_string(),
        init: Some(init),
    }))
}

/// Local variable declaration with no initializer.
pub fn local_var(ast: &mut Ast, name: &str, ty: &str) -> NodeId {
    let ty = type_ref(ast, ty, false);
    ast.alloc(Node::Var(VarDecl {
        decorations: Vec::new(),
        is_static: false,
        ty,
        name: name.to_string(),
        init: None,
    }))
}

/// Function prototype imported from a native library via `[[lib: ..]]`.
pub fn lib_fn_decl(ast: &mut Ast, name: &str, library: &str) -> NodeId {
    let value = string(ast, library);
    let decoration = ast.alloc(Node::Decoration(Decoration {
        key: "lib".to_string(),
        value: Some(value),
    }));
    ast.alloc(Node::FnDecl(FnDecl {
        decorations: vec![decoration],
        name: name.to_string(),
        params: Vec::new(),
        return_type: None,
    }))
}

/// Function definition with named `u32` parameters.
pub fn fn_def(ast: &mut Ast, name: &str, params: &[&str], statements: Vec<NodeId>) -> NodeId {
    let params = params
        .iter()
        .map(|p| {
            let ty = type_ref(ast, "u32", false);
            ast.alloc(Node::Param(Param { ty, name: (*p).to_string() }))
        })
        .collect();
    ast.alloc(Node::FnDef(FnDef {
        decorations: Vec::new(),
        name: name.to_string(),
        params,
        return_type: None,
        statements,
    }))
}

/// `return <value>;`
pub fn return_stmt(ast: &mut Ast, value: Option<NodeId>) -> NodeId {
    ast.alloc(Node::Return(ReturnStmt { value }))
}
