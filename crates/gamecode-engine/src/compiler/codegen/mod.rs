//! Bytecode generation.
//!
//! A top-down visitor lowers a decorated, folded unit into a flat
//! instruction stream plus the module's symbol tables. The unit handler
//! drives everything explicitly: dependency entries first, then each
//! top-level statement in source order, so descent order *is* emission
//! order.

use tracing::debug;

use crate::ast::{visitor, Ast, BinaryOp, Node, NodeId, Number, TypeRef, Visitor};
use crate::bytecode::{tag, ConstValue, Module, Opcode, TypeParam, COPY_BIAS};

use super::{CompileError, CompileResult};

/// One-shot bytecode generator for a single translation unit. Owns the
/// module being built, the per-function parameter scopes, and the
/// synthesized-constant counter; nothing is shared across units.
pub struct CodeGenerator {
    module: Module,
    param_scopes: Vec<Vec<String>>,
    string_counter: usize,
    error: Option<CompileError>,
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeGenerator {
    /// Create a generator with empty tables.
    pub fn new() -> Self {
        Self {
            module: Module::new(),
            param_scopes: Vec::new(),
            string_counter: 0,
            error: None,
        }
    }

    /// Lower a unit and return the finished module.
    pub fn generate(mut self, ast: &Ast) -> CompileResult<Module> {
        let root = ast.root().ok_or(CompileError::MissingRoot)?;
        visitor::walk(&mut self, ast, root, None);
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        Ok(self.module)
    }

    fn check(&mut self, result: CompileResult<()>) {
        if let Err(err) = result {
            if self.error.is_none() {
                self.error = Some(err);
            }
        }
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn gen_stmt(&mut self, ast: &Ast, id: NodeId) -> CompileResult<()> {
        match ast.node(id) {
            Node::Use(u) => {
                self.module.add_dependency(&u.module);
                Ok(())
            }
            Node::Namespace(n) => {
                for &stmt in &n.statements {
                    self.gen_stmt(ast, stmt)?;
                }
                Ok(())
            }
            Node::Block(b) => {
                for &stmt in &b.statements {
                    self.gen_stmt(ast, stmt)?;
                }
                Ok(())
            }
            Node::FnDecl(_) => self.gen_fn_decl(ast, id),
            Node::FnDef(_) => self.gen_fn_def(ast, id),
            Node::Var(_) => self.gen_var(ast, id),
            Node::Alias(_) => self.gen_alias(ast, id),
            Node::Struct(_) => self.gen_struct(ast, id),
            Node::If(_) => self.gen_if(ast, id),
            Node::Return(r) => match r.value {
                Some(value) => self.gen_expr(ast, value),
                None => Ok(()),
            },
            Node::Call(_) => self.gen_call(ast, id),
            // Statement kinds that carry no code today: enums, interfaces,
            // decorator machinery (compile-time only), loose type and scope
            // references, and the unlowered iteration/matching forms.
            Node::Enum(_)
            | Node::Interface(_)
            | Node::InterfaceFn(_)
            | Node::DecoratorDef(_)
            | Node::Decoration(_)
            | Node::TypeRef(_)
            | Node::ScopedName(_)
            | Node::For(_)
            | Node::Match(_)
            | Node::MatchCase(_) => Ok(()),
            _ => self.gen_expr(ast, id),
        }
    }

    fn gen_fn_decl(&mut self, ast: &Ast, id: NodeId) -> CompileResult<()> {
        let Node::FnDecl(decl) = ast.node(id) else { unreachable!() };
        // A `lib` decoration carrying a library name registers a native
        // import instead of emitting code.
        for &deco in &decl.decorations {
            let Node::Decoration(d) = ast.node(deco) else { continue };
            if d.key != "lib" {
                continue;
            }
            if let Some(value) = d.value {
                if let Node::String(lib) = ast.node(value) {
                    self.module.add_import(&lib.value, &decl.name);
                    debug!(library = %lib.value, function = %decl.name, "registered import");
                }
            }
        }
        Ok(())
    }

    fn gen_fn_def(&mut self, ast: &Ast, id: NodeId) -> CompileResult<()> {
        let Node::FnDef(def) = ast.node(id) else { unreachable!() };
        let label = self.module.add_label(&def.name);
        self.module.add_function(&def.name, label);

        let mut params = Vec::with_capacity(def.params.len());
        for &param in &def.params {
            if let Node::Param(p) = ast.node(param) {
                params.push(p.name.clone());
            }
        }
        self.param_scopes.push(params);

        self.emit_label(label)?;
        for &stmt in &def.statements {
            self.gen_stmt(ast, stmt)?;
        }
        self.module.emit(Opcode::Return);
        self.param_scopes.pop();
        Ok(())
    }

    fn gen_var(&mut self, ast: &Ast, id: NodeId) -> CompileResult<()> {
        let Node::Var(var) = ast.node(id) else { unreachable!() };
        let Node::TypeRef(ty) = ast.node(var.ty) else {
            return Err(CompileError::UnknownType(var.name.clone()));
        };

        if ty.is_const {
            // A const-qualified declaration with an initializer becomes a
            // named constant; it owns no stack slot and emits no code.
            if let Some(init) = var.init {
                let type_id = self
                    .module
                    .type_id(&ty.name)
                    .ok_or_else(|| CompileError::UnknownType(ty.name.clone()))?;
                let value = match ast.node(init) {
                    Node::Number(n) => match n.value {
                        Number::Int(v) => ConstValue::Int(v),
                        Number::Float(_) => {
                            return Err(CompileError::UnsupportedConstInit {
                                name: var.name.clone(),
                            })
                        }
                    },
                    Node::String(s) => ConstValue::Str(s.value.clone()),
                    _ => {
                        return Err(CompileError::UnsupportedConstInit {
                            name: var.name.clone(),
                        })
                    }
                };
                self.module.add_constant(&var.name, type_id, value);
            }
            return Ok(());
        }

        // Local variable: resolve the type through the type table, then the
        // struct table, and mint an unresolved id when neither knows the
        // name yet.
        let type_id = self
            .module
            .type_id(&ty.name)
            .or_else(|| self.module.struct_id(&ty.name))
            .unwrap_or_else(|| self.module.add_unresolved_type(&ty.name));
        self.module.emit_u16(Opcode::Init, type_id);
        Ok(())
    }

    fn gen_alias(&mut self, ast: &Ast, id: NodeId) -> CompileResult<()> {
        let Node::Alias(alias) = ast.node(id) else { unreachable!() };
        let Node::TypeRef(ty) = ast.node(alias.ty) else {
            return Err(CompileError::UnknownType(alias.alias.clone()));
        };
        let base = self
            .module
            .type_id(&ty.name)
            .ok_or_else(|| CompileError::UnknownType(ty.name.clone()))?;
        let params = self.resolve_type_params(ast, ty)?;
        self.module.add_type(&alias.alias, ty.is_const, base, params);
        Ok(())
    }

    fn resolve_type_params(&self, ast: &Ast, ty: &TypeRef) -> CompileResult<Vec<TypeParam>> {
        let mut params = Vec::with_capacity(ty.template_args.len());
        for &arg in &ty.template_args {
            let Node::TypeRef(arg) = ast.node(arg) else { continue };
            let type_id = self
                .module
                .type_id(&arg.name)
                .ok_or_else(|| CompileError::UnknownType(arg.name.clone()))?;
            params.push(TypeParam { is_const: arg.is_const, type_id });
        }
        Ok(params)
    }

    fn gen_struct(&mut self, ast: &Ast, id: NodeId) -> CompileResult<()> {
        let Node::Struct(def) = ast.node(id) else { unreachable!() };
        let mut members = Vec::new();
        let mut composes = Vec::new();
        let mut order: u16 = 0;

        for &member in &def.body {
            match ast.node(member) {
                Node::Var(var) => {
                    let Node::TypeRef(ty) = ast.node(var.ty) else {
                        return Err(CompileError::UnknownType(var.name.clone()));
                    };
                    let base = self
                        .module
                        .type_id(&ty.name)
                        .ok_or_else(|| CompileError::UnknownType(ty.name.clone()))?;
                    let params = self.resolve_type_params(ast, ty)?;
                    // Each member gets a synthesized per-struct type entry
                    // so its constness and template shape survive next to
                    // the base type.
                    let member_type = format!("__{}_{}", def.name, ty.name);
                    let type_id =
                        self.module.add_type(&member_type, ty.is_const, base, params);
                    members.push(crate::bytecode::StructMember {
                        order,
                        name: var.name.clone(),
                        is_static: var.is_static,
                        type_id,
                    });
                    order += 1;
                }
                Node::Compose(c) => {
                    composes.push(crate::bytecode::ComposeMember {
                        order,
                        name: c.type_name.clone(),
                    });
                    order += 1;
                }
                // Methods are visited elsewhere; they are not part of the
                // struct's data layout.
                Node::FnDef(_) | Node::FnDecl(_) => {}
                _ => {}
            }
        }

        self.module.add_struct(&def.name, members, composes);
        Ok(())
    }

    fn gen_if(&mut self, ast: &Ast, id: NodeId) -> CompileResult<()> {
        let Node::If(stmt) = ast.node(id) else { unreachable!() };
        self.gen_condition(ast, stmt.condition)?;

        let else_name = format!("else_{}", self.module.code.len());
        let else_label = self.module.add_label(&else_name);
        self.emit_jump(Opcode::JumpIf, else_label)?;

        let end_name = format!("ifEnd_{}", self.module.code.len());
        let end_label = self.module.add_label(&end_name);

        for &then_stmt in &stmt.then_branch {
            self.gen_stmt(ast, then_stmt)?;
        }
        self.emit_jump(Opcode::Goto, end_label)?;

        self.emit_label(else_label)?;
        for &else_stmt in &stmt.else_branch {
            self.gen_stmt(ast, else_stmt)?;
        }
        self.emit_label(end_label)?;
        Ok(())
    }

    /// Lower a condition so that a true condition leaves a truthy value on
    /// the stack (`JumpIf` then falls through into the then-branch).
    fn gen_condition(&mut self, ast: &Ast, id: NodeId) -> CompileResult<()> {
        if let Node::Binary(b) = ast.node(id) {
            if b.op.is_comparison() {
                // Greater-than forms swap operands and reuse Less/LessEqual.
                let (first, second) = match b.op {
                    BinaryOp::Gt | BinaryOp::Ge => (b.rhs, b.lhs),
                    _ => (b.lhs, b.rhs),
                };
                let op = b.op;
                self.gen_expr(ast, first)?;
                self.gen_expr(ast, second)?;
                match op {
                    BinaryOp::Eq => self.module.emit(Opcode::Equal),
                    BinaryOp::Ne => {
                        self.module.emit(Opcode::Equal);
                        self.module.emit(Opcode::Not);
                    }
                    BinaryOp::Lt | BinaryOp::Gt => self.module.emit(Opcode::Less),
                    BinaryOp::Le | BinaryOp::Ge => self.module.emit(Opcode::LessEqual),
                    _ => unreachable!(),
                }
                return Ok(());
            }
        }
        self.gen_expr(ast, id)
    }

    // ========================================================================
    // Calls
    // ========================================================================

    fn gen_call(&mut self, ast: &Ast, id: NodeId) -> CompileResult<()> {
        let Node::Call(call) = ast.node(id) else { unreachable!() };
        let arguments = call.arguments.clone();
        let callee = call.callee.clone();

        // Hoist string-literal arguments into the constant table
        // (deduplicated by value) before any of the call's own code.
        for &arg in &arguments {
            if let Node::String(s) = ast.node(arg) {
                let value = ConstValue::Str(s.value.clone());
                if self.module.constant_index_by_value(&value).is_none() {
                    let name = format!("__s{}", self.string_counter);
                    self.string_counter += 1;
                    self.module.add_constant(&name, tag::STRLIT, value);
                }
            }
        }

        let import_index = self.module.import_index(&callee);
        if let Some(index) = import_index {
            // Native call: resolve the function address first, arguments
            // land above it.
            let index = u8::try_from(index).map_err(|_| CompileError::TooManyImports)?;
            self.module.emit_u8(Opcode::PushU8, index);
            self.module.emit(Opcode::ResolveAddrOfImportIndex);
        }

        for &arg in &arguments {
            self.gen_expr(ast, arg)?;
        }

        let argc =
            u8::try_from(arguments.len()).map_err(|_| CompileError::TooManyArguments(callee.clone()))?;
        match import_index {
            Some(_) => self.module.emit_u8(Opcode::Call, argc),
            None => {
                let label = self
                    .module
                    .label_index(&callee)
                    .ok_or_else(|| CompileError::UnresolvedCallee(callee.clone()))?;
                let label = u8::try_from(label).map_err(|_| CompileError::TooManyLabels)?;
                self.module.emit_u8x2(Opcode::Invoke, label, argc);
            }
        }
        Ok(())
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn gen_expr(&mut self, ast: &Ast, id: NodeId) -> CompileResult<()> {
        match ast.node(id) {
            Node::Number(n) => self.gen_number(n.value),
            Node::String(s) => {
                let value = ConstValue::Str(s.value.clone());
                let index = match self.module.constant_index_by_value(&value) {
                    Some(index) => index,
                    None => {
                        let name = format!("__s{}", self.string_counter);
                        self.string_counter += 1;
                        self.module.add_constant(&name, tag::STRLIT, value)
                    }
                };
                self.push_const_addr(index)
            }
            Node::Path(p) => {
                let Some(head) = p.head().map(str::to_string) else {
                    return Err(CompileError::UnsupportedExpression("path"));
                };
                self.gen_name(&head)
            }
            Node::Call(_) => self.gen_call(ast, id),
            Node::Binary(b) => {
                let (lhs, op, rhs) = (b.lhs, b.op, b.rhs);
                self.gen_expr(ast, lhs)?;
                self.gen_expr(ast, rhs)?;
                let opcode = match op {
                    BinaryOp::Add => Opcode::Add,
                    BinaryOp::Sub => Opcode::Subtract,
                    BinaryOp::Mul => Opcode::Multiply,
                    BinaryOp::Div => Opcode::Divide,
                    BinaryOp::Mod => Opcode::Modulo,
                    BinaryOp::Eq => Opcode::Equal,
                    BinaryOp::Lt => Opcode::Less,
                    BinaryOp::Le => Opcode::LessEqual,
                    _ => return Err(CompileError::UnsupportedExpression(op.as_str())),
                };
                self.module.emit(opcode);
                Ok(())
            }
            Node::Unary(u) => {
                let (op, operand) = (u.op, u.operand);
                self.gen_expr(ast, operand)?;
                match op {
                    crate::ast::UnaryOp::Neg => self.module.emit(Opcode::Negate),
                    crate::ast::UnaryOp::Not => self.module.emit(Opcode::Not),
                }
                Ok(())
            }
            Node::Cast(c) => self.gen_expr(ast, c.operand),
            other => Err(CompileError::UnsupportedExpression(other.kind())),
        }
    }

    /// Resolve a bare name: a declared constant loads by address, a current
    /// parameter copies from its frame slot.
    fn gen_name(&mut self, name: &str) -> CompileResult<()> {
        if let Some(index) = self.module.constant_index_by_name(name) {
            return self.push_const_addr(index);
        }
        if let Some(scope) = self.param_scopes.last() {
            if let Some(position) = scope.iter().position(|p| p == name) {
                let depth = scope.len() - position;
                if depth > COPY_BIAS as usize {
                    return Err(CompileError::TooManyParameters);
                }
                self.module.emit_u8(Opcode::Copy, COPY_BIAS - depth as u8);
                return Ok(());
            }
        }
        Err(CompileError::UnresolvedVariable(name.to_string()))
    }

    /// Literal tiering keeps common small literals out of the constant
    /// table: 0 and 1 have dedicated opcodes, then the narrowest push that
    /// fits, and only wide or negative values are hoisted.
    fn gen_number(&mut self, value: Number) -> CompileResult<()> {
        let Number::Int(v) = value else {
            return Err(CompileError::UnsupportedLiteral);
        };
        match v {
            0 => self.module.emit(Opcode::PushZero),
            1 => self.module.emit(Opcode::PushOne),
            2..=255 => self.module.emit_u8(Opcode::PushU8, v as u8),
            256..=65535 => self.module.emit_u16(Opcode::PushU16, v as u16),
            65536..=4294967295 => self.module.emit_u32(Opcode::PushU32, v as u32),
            _ => {
                // Out of range for inline pushes: hoist into the constant
                // table and load by address. i32 when it fits, otherwise the
                // ptr tag, the format's only 8-byte payload.
                let value = ConstValue::Int(v);
                let index = match self.module.constant_index_by_value(&value) {
                    Some(index) => index,
                    None => {
                        let name = format!("__n{}", self.string_counter);
                        self.string_counter += 1;
                        let tag = if i32::try_from(v).is_ok() { tag::I32 } else { tag::PTR };
                        self.module.add_constant(&name, tag, value)
                    }
                };
                return self.push_const_addr(index);
            }
        }
        Ok(())
    }

    fn push_const_addr(&mut self, index: usize) -> CompileResult<()> {
        let index = u8::try_from(index).map_err(|_| CompileError::TooManyConstants)?;
        self.module.emit_u8(Opcode::PushU8, index);
        self.module.emit(Opcode::ResolveAddrOfConstIndex);
        Ok(())
    }

    fn emit_label(&mut self, label: u16) -> CompileResult<()> {
        let label = u8::try_from(label).map_err(|_| CompileError::TooManyLabels)?;
        self.module.emit_u8(Opcode::Label, label);
        Ok(())
    }

    fn emit_jump(&mut self, op: Opcode, label: u16) -> CompileResult<()> {
        let label = u8::try_from(label).map_err(|_| CompileError::TooManyLabels)?;
        self.module.emit_u8(op, label);
        Ok(())
    }
}

impl Visitor for CodeGenerator {
    fn visit_unit(&mut self, ast: &Ast, id: NodeId, _parent: Option<NodeId>) -> bool {
        let Node::Unit(unit) = ast.node(id) else { return false };

        for &import in &unit.imports {
            if let Node::Use(u) = ast.node(import) {
                self.module.add_dependency(&u.module);
            }
        }
        for &stmt in &unit.statements {
            let result = self.gen_stmt(ast, stmt);
            self.check(result);
            if self.error.is_some() {
                break;
            }
        }
        // The unit handler drives all generation itself.
        false
    }
}
