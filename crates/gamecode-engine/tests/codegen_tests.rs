//! Code generation scenarios: constants, imports, calls, conditionals, and
//! the symbol tables.

mod common;

use common::*;
use gamecode_engine::ast::{Ast, BinaryExpr, BinaryOp, Node};
use gamecode_engine::bytecode::{tag, ConstValue, Opcode, FIRST_DYNAMIC_TYPE_ID};
use gamecode_engine::compiler::{compile_unit, CompileError};

fn op(o: Opcode) -> u8 {
    o.to_u8()
}

#[test]
fn constant_then_function_using_it() {
    // const u32 ANSWER = 42; foo() { return ANSWER; }
    let mut ast = Ast::new();
    let answer = const_int(&mut ast, "ANSWER", "u32", 42);
    let value = path(&mut ast, "ANSWER");
    let ret = return_stmt(&mut ast, Some(value));
    let foo = fn_def(&mut ast, "foo", &[], vec![ret]);
    unit(&mut ast, &[], vec![answer, foo]);

    let module = compile_unit(&mut ast).unwrap();

    // Exactly one constant, ANSWER at index 0, tagged u32.
    assert_eq!(module.constants.len(), 1);
    assert_eq!(module.constants[0].name, "ANSWER");
    assert_eq!(module.constants[0].type_id, tag::U32);
    assert_eq!(module.constants[0].value, ConstValue::Int(42));
    assert_eq!(module.constant_index_by_name("ANSWER"), Some(0));

    // foo's code begins with a label marker and ends with a return.
    assert_eq!(
        module.code,
        vec![
            op(Opcode::Label),
            0,
            op(Opcode::PushU8),
            0,
            op(Opcode::ResolveAddrOfConstIndex),
            op(Opcode::Return),
        ]
    );
    assert_eq!(module.functions.len(), 1);
    assert_eq!(module.functions[0].name, "foo");
    assert_eq!(module.functions[0].label, 0);
}

#[test]
fn import_call_emits_resolve_then_push_then_call() {
    // [[lib: "kernel32.dll"]] ExitProcess();  ExitProcess(0);
    let mut ast = Ast::new();
    let decl = lib_fn_decl(&mut ast, "ExitProcess", "kernel32.dll");
    let zero = num(&mut ast, 0);
    let call = call(&mut ast, "ExitProcess", vec![zero]);
    unit(&mut ast, &[], vec![decl, call]);

    let module = compile_unit(&mut ast).unwrap();

    assert_eq!(module.imports.len(), 1);
    assert_eq!(module.imports[0].library, "kernel32.dll");
    assert_eq!(module.imports[0].functions, vec!["ExitProcess".to_string()]);
    assert_eq!(module.import_index("ExitProcess"), Some(0));

    assert_eq!(
        module.code,
        vec![
            op(Opcode::PushU8),
            0,
            op(Opcode::ResolveAddrOfImportIndex),
            op(Opcode::PushZero),
            op(Opcode::Call),
            1,
        ]
    );
}

#[test]
fn string_arguments_hoist_into_the_constant_table_once() {
    let mut ast = Ast::new();
    let decl = lib_fn_decl(&mut ast, "print", "libc.so");
    let a = string(&mut ast, "hello");
    let first = call(&mut ast, "print", vec![a]);
    let b = string(&mut ast, "hello");
    let second = call(&mut ast, "print", vec![b]);
    unit(&mut ast, &[], vec![decl, first, second]);

    let module = compile_unit(&mut ast).unwrap();

    // Deduplicated by value: one table entry, both calls load index 0.
    assert_eq!(module.constants.len(), 1);
    assert_eq!(module.constants[0].type_id, tag::STRLIT);
    assert_eq!(module.constants[0].value, ConstValue::Str("hello".to_string()));

    let loads = module
        .code
        .windows(3)
        .filter(|w| {
            w[0] == op(Opcode::PushU8)
                && w[1] == 0
                && w[2] == op(Opcode::ResolveAddrOfConstIndex)
        })
        .count();
    assert_eq!(loads, 2);
}

#[test]
fn literal_arguments_use_the_narrowest_push() {
    let mut ast = Ast::new();
    let decl = lib_fn_decl(&mut ast, "sink", "libc.so");
    let args = [0i64, 1, 200, 40_000, 70_000, 5_000_000_000]
        .iter()
        .map(|v| num(&mut ast, *v))
        .collect();
    let call = call(&mut ast, "sink", args);
    unit(&mut ast, &[], vec![decl, call]);

    let module = compile_unit(&mut ast).unwrap();

    let mut expected = vec![op(Opcode::PushU8), 0, op(Opcode::ResolveAddrOfImportIndex)];
    expected.extend([op(Opcode::PushZero), op(Opcode::PushOne)]);
    expected.extend([op(Opcode::PushU8), 200]);
    expected.push(op(Opcode::PushU16));
    expected.extend(40_000u16.to_le_bytes());
    expected.push(op(Opcode::PushU32));
    expected.extend(70_000u32.to_le_bytes());
    // 5_000_000_000 exceeds u32: hoisted and loaded by address.
    expected.extend([op(Opcode::PushU8), 0, op(Opcode::ResolveAddrOfConstIndex)]);
    expected.extend([op(Opcode::Call), 6]);
    assert_eq!(module.code, expected);

    assert_eq!(module.constants.len(), 1);
    assert_eq!(module.constants[0].value, ConstValue::Int(5_000_000_000));
    assert_eq!(module.constants[0].type_id, tag::PTR);
}

#[test]
fn unknown_callee_is_a_hard_error() {
    let mut ast = Ast::new();
    let call = call(&mut ast, "missing", vec![]);
    unit(&mut ast, &[], vec![call]);

    match compile_unit(&mut ast) {
        Err(CompileError::UnresolvedCallee(name)) => assert_eq!(name, "missing"),
        other => panic!("expected UnresolvedCallee, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn local_function_call_uses_invoke_with_label_and_argc() {
    let mut ast = Ast::new();
    let callee = fn_def(&mut ast, "helper", &["x"], vec![]);
    let five = num(&mut ast, 5);
    let invoke = call(&mut ast, "helper", vec![five]);
    let caller_body = vec![invoke];
    let caller = fn_def(&mut ast, "run", &[], caller_body);
    unit(&mut ast, &[], vec![callee, caller]);

    let module = compile_unit(&mut ast).unwrap();

    // helper = label 0, run = label 1.
    assert_eq!(module.functions.len(), 2);
    assert_eq!(module.functions[0].label, 0);
    assert_eq!(module.functions[1].label, 1);

    assert_eq!(
        module.code,
        vec![
            op(Opcode::Label),
            0,
            op(Opcode::Return),
            op(Opcode::Label),
            1,
            op(Opcode::PushU8),
            5,
            op(Opcode::Invoke),
            0,
            1,
            op(Opcode::Return),
        ]
    );
}

#[test]
fn parameter_arguments_copy_from_frame_slots() {
    let mut ast = Ast::new();
    let callee = fn_def(&mut ast, "helper", &["x"], vec![]);
    let arg_a = path(&mut ast, "a");
    let arg_b = path(&mut ast, "b");
    let inner_a = call(&mut ast, "helper", vec![arg_a]);
    let inner_b = call(&mut ast, "helper", vec![arg_b]);
    let caller = fn_def(&mut ast, "run", &["a", "b"], vec![inner_a, inner_b]);
    unit(&mut ast, &[], vec![callee, caller]);

    let module = compile_unit(&mut ast).unwrap();

    // Two parameters: `a` sits two below the frame pointer, `b` one below.
    // Operands carry the bias-32 encoding.
    let copies: Vec<u8> = module
        .code
        .windows(2)
        .filter(|w| w[0] == op(Opcode::Copy))
        .map(|w| w[1])
        .collect();
    assert_eq!(copies, vec![30, 31]);
}

#[test]
fn if_else_lowering_allocates_else_and_merge_labels() {
    let mut ast = Ast::new();
    let decl = lib_fn_decl(&mut ast, "sink", "libc.so");
    let lhs = num(&mut ast, 1);
    let rhs = num(&mut ast, 2);
    let cond = ast.alloc(Node::Binary(BinaryExpr { lhs, op: BinaryOp::Eq, rhs }));
    let one = num(&mut ast, 1);
    let then_call = call(&mut ast, "sink", vec![one]);
    let zero = num(&mut ast, 0);
    let else_call = call(&mut ast, "sink", vec![zero]);
    let if_stmt = ast.alloc(Node::If(gamecode_engine::ast::IfStmt {
        condition: cond,
        then_branch: vec![then_call],
        else_branch: vec![else_call],
    }));
    unit(&mut ast, &[], vec![decl, if_stmt]);

    let module = compile_unit(&mut ast).unwrap();

    assert_eq!(
        module.code,
        vec![
            op(Opcode::PushOne),
            op(Opcode::PushU8),
            2,
            op(Opcode::Equal),
            op(Opcode::JumpIf),
            0, // else label
            op(Opcode::PushU8),
            0,
            op(Opcode::ResolveAddrOfImportIndex),
            op(Opcode::PushOne),
            op(Opcode::Call),
            1,
            op(Opcode::Goto),
            1, // merge label
            op(Opcode::Label),
            0,
            op(Opcode::PushU8),
            0,
            op(Opcode::ResolveAddrOfImportIndex),
            op(Opcode::PushZero),
            op(Opcode::Call),
            1,
            op(Opcode::Label),
            1,
        ]
    );
}

#[test]
fn comparison_operators_generalize() {
    for (ast_op, expected_tail) in [
        (BinaryOp::Ne, vec![op(Opcode::Equal), op(Opcode::Not)]),
        (BinaryOp::Lt, vec![op(Opcode::Less)]),
        (BinaryOp::Ge, vec![op(Opcode::LessEqual)]),
    ] {
        let mut ast = Ast::new();
        let lhs = num(&mut ast, 1);
        let rhs = num(&mut ast, 2);
        let cond = ast.alloc(Node::Binary(BinaryExpr { lhs, op: ast_op, rhs }));
        let if_stmt = ast.alloc(Node::If(gamecode_engine::ast::IfStmt {
            condition: cond,
            then_branch: vec![],
            else_branch: vec![],
        }));
        unit(&mut ast, &[], vec![if_stmt]);

        let module = compile_unit(&mut ast).unwrap();
        let jump_at = module
            .code
            .iter()
            .position(|b| *b == op(Opcode::JumpIf))
            .expect("conditional jump emitted");
        assert_eq!(&module.code[jump_at - expected_tail.len()..jump_at], &expected_tail[..]);
    }
}

#[test]
fn local_variable_with_unknown_type_mints_an_unresolved_id() {
    let mut ast = Ast::new();
    let var = local_var(&mut ast, "p", "Point");
    let body = vec![var];
    let f = fn_def(&mut ast, "run", &[], body);
    unit(&mut ast, &[], vec![f]);

    let module = compile_unit(&mut ast).unwrap();

    assert_eq!(module.unresolved_types.len(), 1);
    assert_eq!(module.unresolved_types[0].name, "Point");
    let id = module.unresolved_types[0].id;
    assert!(id >= FIRST_DYNAMIC_TYPE_ID);

    let mut expected = vec![op(Opcode::Label), 0, op(Opcode::Init)];
    expected.extend(id.to_le_bytes());
    expected.push(op(Opcode::Return));
    assert_eq!(module.code, expected);
}

#[test]
fn aliases_and_structs_share_the_id_counter() {
    use gamecode_engine::ast::{AliasDecl, Compose, StructDecl, TypeRef, VarDecl};

    let mut ast = Ast::new();
    // alias BYTEPTR = const ptr<const u8>
    let inner = ast.alloc(Node::TypeRef(TypeRef {
        is_const: true,
        name: "u8".to_string(),
        template_args: vec![],
    }));
    let aliased = ast.alloc(Node::TypeRef(TypeRef {
        is_const: true,
        name: "ptr".to_string(),
        template_args: vec![inner],
    }));
    let alias = ast.alloc(Node::Alias(AliasDecl { alias: "BYTEPTR".to_string(), ty: aliased }));

    // struct Point { u32 x; u32 y; compose Base; }
    let tx = ast.alloc(Node::TypeRef(TypeRef {
        is_const: false,
        name: "u32".to_string(),
        template_args: vec![],
    }));
    let x = ast.alloc(Node::Var(VarDecl {
        decorations: vec![],
        is_static: false,
        ty: tx,
        name: "x".to_string(),
        init: None,
    }));
    let ty = ast.alloc(Node::TypeRef(TypeRef {
        is_const: false,
        name: "u32".to_string(),
        template_args: vec![],
    }));
    let y = ast.alloc(Node::Var(VarDecl {
        decorations: vec![],
        is_static: false,
        ty,
        name: "y".to_string(),
        init: None,
    }));
    let base = ast.alloc(Node::Compose(Compose { type_name: "Base".to_string() }));
    let point = ast.alloc(Node::Struct(StructDecl {
        decorations: vec![],
        name: "Point".to_string(),
        template_params: vec![],
        body: vec![x, y, base],
    }));
    unit(&mut ast, &[], vec![alias, point]);

    let module = compile_unit(&mut ast).unwrap();

    // BYTEPTR = 64, the synthesized member type = 65, Point = 66.
    assert_eq!(module.type_id("BYTEPTR"), Some(64));
    assert_eq!(module.type_id("__Point_u32"), Some(65));
    assert_eq!(module.struct_id("Point"), Some(66));

    let point_def = &module.structs[0];
    assert_eq!(point_def.members.len(), 2);
    assert_eq!(point_def.members[0].order, 0);
    assert_eq!(point_def.members[0].name, "x");
    assert_eq!(point_def.members[1].order, 1);
    assert_eq!(point_def.members[1].name, "y");
    // Both members share the synthesized per-struct type entry.
    assert_eq!(point_def.members[0].type_id, point_def.members[1].type_id);
    assert_eq!(point_def.composes.len(), 1);
    assert_eq!(point_def.composes[0].order, 2);
    assert_eq!(point_def.composes[0].name, "Base");

    // Orders form one contiguous sequence over members and composes.
    let mut orders: Vec<u16> = point_def
        .members
        .iter()
        .map(|m| m.order)
        .chain(point_def.composes.iter().map(|c| c.order))
        .collect();
    orders.sort_unstable();
    assert_eq!(orders, vec![0, 1, 2]);
}

#[test]
fn dynamic_ids_are_unique_within_a_unit() {
    let mut ast = Ast::new();
    let a = local_var(&mut ast, "a", "First");
    let b = local_var(&mut ast, "b", "Second");
    let c = local_var(&mut ast, "c", "First"); // repeat keeps the first id
    let f = fn_def(&mut ast, "run", &[], vec![a, b, c]);
    unit(&mut ast, &[], vec![f]);

    let module = compile_unit(&mut ast).unwrap();

    let ids: Vec<u16> = module.unresolved_types.iter().map(|u| u.id).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.iter().all(|id| *id >= FIRST_DYNAMIC_TYPE_ID));
    assert_ne!(ids[0], ids[1]);
}

#[test]
fn use_declarations_become_dependencies_in_order() {
    let mut ast = Ast::new();
    unit(&mut ast, &["syscalls", "strings", "syscalls"], vec![]);

    let module = compile_unit(&mut ast).unwrap();
    assert_eq!(module.dependencies, vec!["syscalls".to_string(), "strings".to_string()]);
}
