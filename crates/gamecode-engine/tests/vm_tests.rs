//! Interpreter behavior: frame discipline, control flow, constants, and
//! native call marshaling.

mod common;

use std::ffi::c_void;
use std::sync::atomic::{AtomicU64, Ordering};

use common::*;
use gamecode_engine::ast::{Ast, BinaryExpr, BinaryOp, IfStmt, Node};
use gamecode_engine::bytecode::{tag, ConstValue, Module, Opcode};
use gamecode_engine::compiler::compile_unit;
use gamecode_engine::vm::{NativeFn, NativeType, Value, Vm, VmError};

fn run_module(module: &Module) -> Vm {
    let mut vm = Vm::new();
    vm.load_main(module, None).unwrap();
    vm.run().unwrap();
    vm
}

#[test]
fn arithmetic_opcodes_fold_the_stack() {
    let cases = [
        (Opcode::Add, 40u8, 2u8, 42i64),
        (Opcode::Subtract, 50, 8, 42),
        (Opcode::Multiply, 6, 7, 42),
        (Opcode::Divide, 85, 2, 42),
        (Opcode::Modulo, 47, 5, 2),
        (Opcode::Power, 2, 5, 32),
    ];
    for (op, a, b, expected) in cases {
        let mut m = Module::new();
        m.emit_u8(Opcode::PushU8, a);
        m.emit_u8(Opcode::PushU8, b);
        m.emit(op);
        let vm = run_module(&m);
        assert_eq!(vm.stack_depth(), 1);
        assert_eq!(vm.stack()[0].as_int().unwrap(), expected, "{:?}", op);
    }
}

#[test]
fn division_by_zero_is_fatal() {
    let mut m = Module::new();
    m.emit(Opcode::PushOne);
    m.emit(Opcode::PushZero);
    m.emit(Opcode::Divide);

    let mut vm = Vm::new();
    vm.load_main(&m, None).unwrap();
    assert!(matches!(vm.run(), Err(VmError::DivisionByZero { .. })));
}

#[test]
fn frame_balance_across_invoke_and_return() {
    let mut m = Module::new();
    let callee = m.add_label("callee");
    let end = m.add_label("end");
    m.emit_u8(Opcode::PushU8, 7); // sentinel below the call
    m.emit_u8(Opcode::PushU8, 5); // the single argument
    m.emit_u8x2(Opcode::Invoke, callee as u8, 1);
    m.emit_u8(Opcode::Goto, end as u8);
    m.emit_u8(Opcode::Label, callee as u8);
    m.emit_u8(Opcode::PushU8, 9); // callee-local value
    m.emit(Opcode::Return);
    m.emit_u8(Opcode::Label, end as u8);

    let vm = run_module(&m);

    // Locals, frame bookkeeping, and the argument are all gone; only the
    // sentinel pushed before the call survives.
    assert_eq!(vm.stack_depth(), 1);
    assert_eq!(vm.stack()[0].as_int().unwrap(), 7);
}

#[test]
fn copy_reads_parameters_frame_relative() {
    static LAST: AtomicU64 = AtomicU64::new(0);
    extern "C" fn record(v: u64) -> u64 {
        LAST.store(v, Ordering::SeqCst);
        v
    }

    // callee(x) { record(x) } invoked with 5.
    let mut m = Module::new();
    m.add_import("test.dll", "record");
    let callee = m.add_label("callee");
    let end = m.add_label("end");
    m.emit_u8(Opcode::PushU8, 5);
    m.emit_u8x2(Opcode::Invoke, callee as u8, 1);
    m.emit_u8(Opcode::Goto, end as u8);
    m.emit_u8(Opcode::Label, callee as u8);
    m.emit_u8(Opcode::PushU8, 0);
    m.emit(Opcode::ResolveAddrOfImportIndex);
    m.emit_u8(Opcode::Copy, 31); // single parameter, one below the frame
    m.emit_u8(Opcode::Call, 1);
    m.emit(Opcode::Return);
    m.emit_u8(Opcode::Label, end as u8);

    let mut vm = Vm::new();
    vm.register_native(
        "test.dll",
        "record",
        NativeFn::new(record as *const c_void, NativeType::U32),
    );
    vm.load_main(&m, None).unwrap();
    vm.run().unwrap();

    assert_eq!(LAST.load(Ordering::SeqCst), 5);
}

#[test]
fn jump_if_branches_only_on_a_false_condition() {
    // False condition jumps over the push.
    let mut m = Module::new();
    let skip = m.add_label("skip");
    m.emit(Opcode::PushZero);
    m.emit_u8(Opcode::JumpIf, skip as u8);
    m.emit_u8(Opcode::PushU8, 11);
    m.emit_u8(Opcode::Label, skip as u8);
    let vm = run_module(&m);
    assert_eq!(vm.stack_depth(), 0);

    // True condition falls through into it.
    let mut m = Module::new();
    let skip = m.add_label("skip");
    m.emit(Opcode::PushOne);
    m.emit_u8(Opcode::JumpIf, skip as u8);
    m.emit_u8(Opcode::PushU8, 11);
    m.emit_u8(Opcode::Label, skip as u8);
    let vm = run_module(&m);
    assert_eq!(vm.stack_depth(), 1);
    assert_eq!(vm.stack()[0].as_int().unwrap(), 11);
}

#[test]
fn constants_convert_by_type_tag_before_pushing() {
    static LEN: AtomicU64 = AtomicU64::new(0);
    extern "C" fn take_str(p: u64) -> u64 {
        let len = unsafe { std::ffi::CStr::from_ptr(p as *const _) }.to_bytes().len() as u64;
        LEN.store(len, Ordering::SeqCst);
        len
    }

    let mut m = Module::new();
    m.add_import("test.dll", "take_str");
    m.add_constant("GREETING", tag::STRLIT, ConstValue::Str("hello".into()));
    m.add_constant("FLAGS", tag::U32, ConstValue::Int(42));
    // take_str(GREETING)
    m.emit_u8(Opcode::PushU8, 0);
    m.emit(Opcode::ResolveAddrOfImportIndex);
    m.emit_u8(Opcode::PushU8, 0);
    m.emit(Opcode::ResolveAddrOfConstIndex);
    m.emit_u8(Opcode::Call, 1);
    // push FLAGS directly
    m.emit_u8(Opcode::PushU8, 1);
    m.emit(Opcode::PushConst);

    let mut vm = Vm::new();
    vm.register_native(
        "test.dll",
        "take_str",
        NativeFn::new(take_str as *const c_void, NativeType::U32),
    );
    vm.load_main(&m, None).unwrap();
    vm.run().unwrap();

    assert_eq!(LEN.load(Ordering::SeqCst), 5);
    assert_eq!(vm.stack_depth(), 2);
    assert!(matches!(vm.stack()[0], Value::U32(5)));
    assert!(matches!(vm.stack()[1], Value::U32(42)));
}

#[test]
fn void_imports_push_no_result() {
    static HITS: AtomicU64 = AtomicU64::new(0);
    extern "C" fn fire() -> u64 {
        HITS.fetch_add(1, Ordering::SeqCst);
        0
    }

    let mut m = Module::new();
    m.add_import("test.dll", "fire");
    m.emit_u8(Opcode::PushU8, 0);
    m.emit(Opcode::ResolveAddrOfImportIndex);
    m.emit_u8(Opcode::Call, 0);

    let mut vm = Vm::new();
    vm.register_native(
        "test.dll",
        "fire",
        NativeFn::new(fire as *const c_void, NativeType::Void),
    );
    vm.load_main(&m, None).unwrap();
    vm.run().unwrap();

    assert_eq!(HITS.load(Ordering::SeqCst), 1);
    assert_eq!(vm.stack_depth(), 0);
}

#[test]
fn unresolved_type_is_fatal_at_first_use() {
    let mut m = Module::new();
    let ghost = m.add_unresolved_type("Ghost");
    m.emit_u16(Opcode::Init, ghost);

    let mut vm = Vm::new();
    vm.load_main(&m, None).unwrap();
    match vm.run() {
        Err(VmError::UnresolvedType { name }) => assert_eq!(name, "Ghost"),
        other => panic!("expected UnresolvedType, got {:?}", other),
    }
}

#[test]
fn unassigned_opcodes_execute_as_no_ops() {
    let mut m = Module::new();
    m.code.push(99); // width 1, unassigned
    m.emit_u8(Opcode::PushU8, 3);

    let vm = run_module(&m);
    assert_eq!(vm.stack_depth(), 1);
    assert_eq!(vm.stack()[0].as_int().unwrap(), 3);
}

#[test]
fn entry_point_prefers_the_run_function() {
    static LAST: AtomicU64 = AtomicU64::new(0);
    extern "C" fn record(v: u64) -> u64 {
        LAST.store(v, Ordering::SeqCst);
        v
    }

    // other() { record(1) }  run() { record(2) }
    let mut ast = Ast::new();
    let import = lib_fn_decl(&mut ast, "record", "test.dll");
    let one = num(&mut ast, 1);
    let call_one = call(&mut ast, "record", vec![one]);
    let other = fn_def(&mut ast, "other", &[], vec![call_one]);
    let two = num(&mut ast, 2);
    let call_two = call(&mut ast, "record", vec![two]);
    let run = fn_def(&mut ast, "run", &[], vec![call_two]);
    unit(&mut ast, &[], vec![import, other, run]);

    let module = compile_unit(&mut ast).unwrap();

    let mut vm = Vm::new();
    vm.register_native(
        "test.dll",
        "record",
        NativeFn::new(record as *const c_void, NativeType::I32),
    );
    vm.load_main(&module, None).unwrap();
    vm.run().unwrap();

    // Execution started at `run`, not at pc 0.
    assert_eq!(LAST.load(Ordering::SeqCst), 2);
}

#[test]
fn compiled_if_else_takes_the_true_branch() {
    static LAST: AtomicU64 = AtomicU64::new(99);
    extern "C" fn record(v: u64) -> u64 {
        LAST.store(v, Ordering::SeqCst);
        v
    }

    // run() { if (2 == 2) { record(1) } else { record(0) } }
    let mut ast = Ast::new();
    let import = lib_fn_decl(&mut ast, "record", "test.dll");
    let lhs = num(&mut ast, 2);
    let rhs = num(&mut ast, 2);
    let cond = ast.alloc(Node::Binary(BinaryExpr { lhs, op: BinaryOp::Eq, rhs }));
    let one = num(&mut ast, 1);
    let then_call = call(&mut ast, "record", vec![one]);
    let zero = num(&mut ast, 0);
    let else_call = call(&mut ast, "record", vec![zero]);
    let if_stmt = ast.alloc(Node::If(IfStmt {
        condition: cond,
        then_branch: vec![then_call],
        else_branch: vec![else_call],
    }));
    let run = fn_def(&mut ast, "run", &[], vec![if_stmt]);
    unit(&mut ast, &[], vec![import, run]);

    let module = compile_unit(&mut ast).unwrap();

    let mut vm = Vm::new();
    vm.register_native(
        "test.dll",
        "record",
        NativeFn::new(record as *const c_void, NativeType::I32),
    );
    vm.load_main(&module, None).unwrap();
    vm.run().unwrap();

    assert_eq!(LAST.load(Ordering::SeqCst), 1);
}

#[test]
fn missing_native_library_fails_the_run() {
    let mut m = Module::new();
    m.add_import("definitely-not-a-real-library.dll", "Nope");
    m.emit(Opcode::Nop);

    let mut vm = Vm::new();
    vm.load_main(&m, None).unwrap();
    assert!(matches!(vm.run(), Err(VmError::Load(_))));
}
