//! Decorator engine: registration, application, and in-place splicing.

mod common;

use common::*;
use gamecode_engine::ast::{
    link_parents, Ast, BinaryExpr, BinaryOp, CallExpr, Decoration, DecoratorDef, IfStmt, Node,
    NodeId, PathExpr, PathSeg,
};
use gamecode_engine::bytecode::{tag, ConstValue};
use gamecode_engine::compiler::{compile_unit, DecoratorRegistry};

/// Build `target.statements.insert(0, factory.call("trace", <arg>))`.
fn inject_trace_stmt(ast: &mut Ast, arg: &str) -> NodeId {
    let trace_name = string(ast, "trace");
    let trace_arg = string(ast, arg);
    let factory_call = ast.alloc(Node::Call(CallExpr {
        callee: "call".to_string(),
        arguments: vec![trace_name, trace_arg],
    }));
    let factory_path = ast.alloc(Node::Path(PathExpr {
        segments: vec![PathSeg::Ident("factory".to_string()), PathSeg::Call(factory_call)],
    }));
    let zero = num(ast, 0);
    let insert_call = ast.alloc(Node::Call(CallExpr {
        callee: "insert".to_string(),
        arguments: vec![zero, factory_path],
    }));
    ast.alloc(Node::Path(PathExpr {
        segments: vec![
            PathSeg::Ident("target".to_string()),
            PathSeg::Ident("statements".to_string()),
            PathSeg::Call(insert_call),
        ],
    }))
}

fn log_decorator(ast: &mut Ast) -> NodeId {
    let body = inject_trace_stmt(ast, "entered");
    ast.alloc(Node::DecoratorDef(DecoratorDef {
        name: "log".to_string(),
        formals: ["self".to_string(), "root".to_string(), "target".to_string()],
        statements: vec![body],
    }))
}

fn decorated_fn(ast: &mut Ast, key: &str, name: &str) -> NodeId {
    let decoration =
        ast.alloc(Node::Decoration(Decoration { key: key.to_string(), value: None }));
    let ret = return_stmt(ast, None);
    let f = fn_def(ast, name, &[], vec![ret]);
    let Node::FnDef(def) = ast.node_mut(f) else { unreachable!() };
    def.decorations.push(decoration);
    f
}

#[test]
fn log_decorator_injects_first_statement() {
    let mut ast = Ast::new();
    let def = log_decorator(&mut ast);
    let f = decorated_fn(&mut ast, "log", "run");
    unit(&mut ast, &[], vec![def, f]);

    link_parents(&mut ast);
    let registry = DecoratorRegistry::build(&mut ast).unwrap();
    assert_eq!(registry.len(), 1);
    let applied = registry.apply(&mut ast).unwrap();
    assert_eq!(applied, 1);

    // Statement list grew by one and the injected call leads.
    let Node::FnDef(def) = ast.node(f) else { panic!() };
    assert_eq!(def.statements.len(), 2);
    let Node::Call(injected) = ast.node(def.statements[0]) else {
        panic!("first statement is not the injected call: {:?}", ast.node(def.statements[0]));
    };
    assert_eq!(injected.callee, "trace");
    assert_eq!(injected.arguments.len(), 1);
    let Node::String(arg) = ast.node(injected.arguments[0]) else { panic!() };
    assert_eq!(arg.value, "entered");
}

#[test]
fn unmatched_decoration_keys_are_left_alone() {
    let mut ast = Ast::new();
    let def = log_decorator(&mut ast);
    let f = decorated_fn(&mut ast, "inline", "run");
    unit(&mut ast, &[], vec![def, f]);

    link_parents(&mut ast);
    let registry = DecoratorRegistry::build(&mut ast).unwrap();
    let applied = registry.apply(&mut ast).unwrap();
    assert_eq!(applied, 0);

    let Node::FnDef(def) = ast.node(f) else { panic!() };
    assert_eq!(def.statements.len(), 1);
}

#[test]
fn decorator_conditions_read_the_decoration_value() {
    // decorator flag(self, root, target) {
    //     if self.value == "on" { target.statements.insert(0, ..) }
    // }
    let mut ast = Ast::new();
    let value_path = ast.alloc(Node::Path(PathExpr {
        segments: vec![PathSeg::Ident("self".to_string()), PathSeg::Ident("value".to_string())],
    }));
    let on = string(&mut ast, "on");
    let cond = ast.alloc(Node::Binary(BinaryExpr { lhs: value_path, op: BinaryOp::Eq, rhs: on }));
    let inject = inject_trace_stmt(&mut ast, "flagged");
    let body = ast.alloc(Node::If(IfStmt {
        condition: cond,
        then_branch: vec![inject],
        else_branch: vec![],
    }));
    let def = ast.alloc(Node::DecoratorDef(DecoratorDef {
        name: "flag".to_string(),
        formals: ["self".to_string(), "root".to_string(), "target".to_string()],
        statements: vec![body],
    }));

    // Two functions, one decorated [[flag: "on"]], one [[flag: "off"]].
    let on_value = string(&mut ast, "on");
    let deco_on = ast.alloc(Node::Decoration(Decoration {
        key: "flag".to_string(),
        value: Some(on_value),
    }));
    let f_on = fn_def(&mut ast, "enabled", &[], vec![]);
    if let Node::FnDef(d) = ast.node_mut(f_on) {
        d.decorations.push(deco_on);
    }

    let off_value = string(&mut ast, "off");
    let deco_off = ast.alloc(Node::Decoration(Decoration {
        key: "flag".to_string(),
        value: Some(off_value),
    }));
    let f_off = fn_def(&mut ast, "disabled", &[], vec![]);
    if let Node::FnDef(d) = ast.node_mut(f_off) {
        d.decorations.push(deco_off);
    }

    unit(&mut ast, &[], vec![def, f_on, f_off]);

    link_parents(&mut ast);
    let registry = DecoratorRegistry::build(&mut ast).unwrap();
    registry.apply(&mut ast).unwrap();

    let Node::FnDef(enabled) = ast.node(f_on) else { panic!() };
    assert_eq!(enabled.statements.len(), 1, "matching value injects");
    let Node::FnDef(disabled) = ast.node(f_off) else { panic!() };
    assert_eq!(disabled.statements.len(), 0, "non-matching value leaves the body alone");
}

#[test]
fn decorated_unit_compiles_end_to_end() {
    // The injected trace("entered") call must resolve against the trace
    // import and hoist its string argument.
    let mut ast = Ast::new();
    let def = log_decorator(&mut ast);
    let import = lib_fn_decl(&mut ast, "trace", "trace.dll");
    let f = decorated_fn(&mut ast, "log", "run");
    unit(&mut ast, &[], vec![def, import, f]);

    let module = compile_unit(&mut ast).unwrap();

    assert_eq!(module.import_index("trace"), Some(0));
    assert_eq!(module.constants.len(), 1);
    assert_eq!(module.constants[0].type_id, tag::STRLIT);
    assert_eq!(module.constants[0].value, ConstValue::Str("entered".to_string()));
    // One function, its label marker, and at least the injected call plus
    // the trailing return.
    assert_eq!(module.functions.len(), 1);
    assert_eq!(module.functions[0].name, "run");
}

#[test]
fn three_bindings_alias_one_tree() {
    // decorator tag(self, root, target) {
    //     root.statements.len()   -- reads through the root binding
    //     target.statements.insert(0, factory.call("trace", self.key))
    // }
    let mut ast = Ast::new();
    let len_call = ast.alloc(Node::Call(CallExpr { callee: "len".to_string(), arguments: vec![] }));
    let root_read = ast.alloc(Node::Path(PathExpr {
        segments: vec![
            PathSeg::Ident("root".to_string()),
            PathSeg::Ident("statements".to_string()),
            PathSeg::Call(len_call),
        ],
    }));

    let trace_name = string(&mut ast, "trace");
    let key_path = ast.alloc(Node::Path(PathExpr {
        segments: vec![PathSeg::Ident("self".to_string()), PathSeg::Ident("key".to_string())],
    }));
    let factory_call = ast.alloc(Node::Call(CallExpr {
        callee: "call".to_string(),
        arguments: vec![trace_name, key_path],
    }));
    let factory_path = ast.alloc(Node::Path(PathExpr {
        segments: vec![PathSeg::Ident("factory".to_string()), PathSeg::Call(factory_call)],
    }));
    let zero = num(&mut ast, 0);
    let insert = ast.alloc(Node::Call(CallExpr {
        callee: "insert".to_string(),
        arguments: vec![zero, factory_path],
    }));
    let splice = ast.alloc(Node::Path(PathExpr {
        segments: vec![
            PathSeg::Ident("target".to_string()),
            PathSeg::Ident("statements".to_string()),
            PathSeg::Call(insert),
        ],
    }));
    let def = ast.alloc(Node::DecoratorDef(DecoratorDef {
        name: "tag".to_string(),
        formals: ["self".to_string(), "root".to_string(), "target".to_string()],
        statements: vec![root_read, splice],
    }));

    let f = decorated_fn(&mut ast, "tag", "run");
    unit(&mut ast, &[], vec![def, f]);

    link_parents(&mut ast);
    let registry = DecoratorRegistry::build(&mut ast).unwrap();
    registry.apply(&mut ast).unwrap();

    // The injected call's argument is the decoration's own key, read
    // through the `self` binding.
    let Node::FnDef(def) = ast.node(f) else { panic!() };
    let Node::Call(injected) = ast.node(def.statements[0]) else { panic!() };
    let Node::String(arg) = ast.node(injected.arguments[0]) else { panic!() };
    assert_eq!(arg.value, "tag");
}
