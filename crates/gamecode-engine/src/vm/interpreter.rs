//! The bytecode interpreter.
//!
//! One program counter, one value stack, one frame stack. Each step decodes
//! the opcode, dispatches through an exhaustive match (unassigned bytes are
//! a no-op), executes the handler, and advances by the instruction's width
//! unless the handler produced a jump.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::bytecode::{instruction_width, Intrinsic, Module, Opcode, COPY_BIAS};
use crate::compiler::ModuleCache;

use super::ffi::Library;
use super::linker::{self, ModuleRegion};
use super::value::{NativeFn, Value};
use super::{VmError, VmResult};

/// Control-flow directive from one executed instruction.
#[derive(Debug)]
enum ControlFlow {
    /// Advance by the instruction's width.
    Continue,
    /// Set the program counter to an absolute offset.
    Jump(usize),
    /// Stop execution.
    Halt,
}

/// One function activation. Pushed and popped atomically; the value stack
/// holds only arguments, locals, and operands.
#[derive(Debug, Clone, Copy)]
struct Frame {
    /// Program counter to resume at after `Return`.
    return_pc: usize,
    /// Caller's frame pointer.
    saved_fp: usize,
    /// Arguments the callee consumes on return.
    arg_count: usize,
}

/// The gamecode virtual machine.
pub struct Vm {
    code: Vec<u8>,
    regions: Vec<ModuleRegion>,
    /// Absolute jump/invoke site → absolute target.
    jump_sites: FxHashMap<usize, usize>,
    /// Function name → absolute code offset. Later-loaded modules win, so
    /// the main module's entry shadows same-named dependency entries.
    functions: FxHashMap<String, usize>,
    loaded: FxHashSet<String>,
    /// Host-registered native symbols, consulted before the OS loader.
    overrides: FxHashMap<(String, String), NativeFn>,
    libraries: FxHashMap<String, Library>,
    natives_resolved: bool,
    stack: Vec<Value>,
    frames: Vec<Frame>,
    fp: usize,
    pc: usize,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    /// Create an empty VM.
    pub fn new() -> Self {
        Self {
            code: Vec::new(),
            regions: Vec::new(),
            jump_sites: FxHashMap::default(),
            functions: FxHashMap::default(),
            loaded: FxHashSet::default(),
            overrides: FxHashMap::default(),
            libraries: FxHashMap::default(),
            natives_resolved: false,
            stack: Vec::new(),
            frames: Vec::new(),
            fp: 0,
            pc: 0,
        }
    }

    /// Install a native symbol ahead of the OS loader. Hosts use this to
    /// expose functions without a shared library; tests use it to avoid
    /// platform lookups.
    pub fn register_native(&mut self, library: &str, function: &str, f: NativeFn) {
        self.overrides.insert((library.to_string(), function.to_string()), f);
    }

    // ========================================================================
    // Loading and linking
    // ========================================================================

    /// Load the main module. Dependencies are loaded first (recursively,
    /// depth-first, memoized by name) from `cache`, so their code precedes
    /// the main module's in the concatenated buffer.
    pub fn load_main(&mut self, module: &Module, cache: Option<&ModuleCache>) -> VmResult<()> {
        self.load_recursive("main", module, cache)?;
        self.resolve_types();
        Ok(())
    }

    fn load_recursive(
        &mut self,
        name: &str,
        module: &Module,
        cache: Option<&ModuleCache>,
    ) -> VmResult<()> {
        if !self.loaded.insert(name.to_string()) {
            return Ok(());
        }
        for dep in &module.dependencies {
            if self.loaded.contains(dep) {
                continue;
            }
            let cache = cache.ok_or_else(|| VmError::MissingDependency(dep.clone()))?;
            let dep_module = cache.load(dep)?;
            self.load_recursive(dep, &dep_module, Some(cache))?;
        }
        self.link(name, module)
    }

    /// Link one module's code at the current end of the buffer.
    fn link(&mut self, name: &str, module: &Module) -> VmResult<()> {
        let base = self.code.len();
        let local_labels = linker::scan_labels(&module.code);
        linker::map_jump_sites(name, &module.code, base, &local_labels, &mut self.jump_sites)?;

        for f in &module.functions {
            let label = u8::try_from(f.label).map_err(|_| VmError::UnknownLabel {
                module: name.to_string(),
                label: u8::MAX,
            })?;
            let target = local_labels.get(&label).copied().ok_or(VmError::UnknownLabel {
                module: name.to_string(),
                label,
            })?;
            self.functions.insert(f.name.clone(), base + target);
        }

        self.regions.push(linker::build_region(name, module, base)?);
        self.code.extend_from_slice(&module.code);
        debug!(module = name, base, len = module.code.len(), "linked module");
        Ok(())
    }

    /// Reconcile unresolved type ids against every loaded module's type and
    /// struct tables. Ids that stay unresolved become fatal at first use.
    fn resolve_types(&mut self) {
        let declared: FxHashSet<String> = self
            .regions
            .iter()
            .flat_map(|r| r.declared_types.iter().cloned())
            .collect();
        for region in &mut self.regions {
            let resolved: Vec<u16> = region
                .unresolved
                .iter()
                .filter(|(_, name)| declared.contains(*name))
                .map(|(id, _)| *id)
                .collect();
            region.resolved.extend(resolved);
        }
    }

    /// Resolve every import to a native symbol: host-registered overrides
    /// first, then the OS loader. A missing library or symbol fails the
    /// run.
    fn load_imports(&mut self) -> VmResult<()> {
        if self.natives_resolved {
            return Ok(());
        }
        for region in &mut self.regions {
            let mut natives = Vec::with_capacity(region.imports.len());
            for (library, function) in &region.imports {
                let key = (library.clone(), function.clone());
                let native = match self.overrides.get(&key) {
                    Some(native) => *native,
                    None => {
                        if !self.libraries.contains_key(library) {
                            debug!(library = %library, "loading native library");
                            self.libraries.insert(library.clone(), Library::open(library)?);
                        }
                        let lib = &self.libraries[library];
                        NativeFn::new(lib.symbol(function)?, super::value::NativeType::I32)
                    }
                };
                natives.push(native);
            }
            region.natives = natives;
        }
        self.natives_resolved = true;
        Ok(())
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Execute from the entry point: the main module's `run` function if
    /// its table has one, else program counter 0.
    pub fn run(&mut self) -> VmResult<()> {
        self.load_imports()?;
        self.pc = self.functions.get("run").copied().unwrap_or(0);
        self.execute()
    }

    /// Execute from the current program counter until the code ends or the
    /// outermost frame returns.
    fn execute(&mut self) -> VmResult<()> {
        let end = self.code.len();
        while self.pc < end {
            let raw = self.code[self.pc];
            let width = instruction_width(raw);
            if self.pc + width > end {
                return Err(VmError::TruncatedInstruction { pc: self.pc });
            }
            match self.step(raw)? {
                ControlFlow::Continue => self.pc += width,
                ControlFlow::Jump(target) => self.pc = target,
                ControlFlow::Halt => break,
            }
        }
        Ok(())
    }

    fn step(&mut self, raw: u8) -> VmResult<ControlFlow> {
        // Unassigned opcode values execute as no-ops.
        let Some(op) = Opcode::from_u8(raw) else { return Ok(ControlFlow::Continue) };
        match op {
            Opcode::Nop | Opcode::Label => {}
            Opcode::PushZero => self.stack.push(Value::Int(0)),
            Opcode::PushOne => self.stack.push(Value::Int(1)),
            Opcode::PushU8 => {
                let v = self.code[self.pc + 1];
                self.stack.push(Value::Int(v as i64));
            }
            Opcode::PushU16 => {
                let v = self.operand_u16();
                self.stack.push(Value::Int(v as i64));
            }
            Opcode::PushU32 => {
                let v = self.operand_u32();
                self.stack.push(Value::Int(v as i64));
            }
            Opcode::Pop => {
                self.pop()?;
            }

            Opcode::Add => self.binary_arith(op)?,
            Opcode::Subtract => self.binary_arith(op)?,
            Opcode::Multiply => self.binary_arith(op)?,
            Opcode::Divide => self.binary_arith(op)?,
            Opcode::Modulo => self.binary_arith(op)?,
            Opcode::Power => self.binary_arith(op)?,
            Opcode::Negate => {
                let v = self.pop()?.as_int()?;
                self.stack.push(Value::Int(v.wrapping_neg()));
            }
            Opcode::Increase => {
                let v = self.pop()?.as_int()?;
                self.stack.push(Value::Int(v.wrapping_add(1)));
            }
            Opcode::Decrease => {
                let v = self.pop()?.as_int()?;
                self.stack.push(Value::Int(v.wrapping_sub(1)));
            }

            Opcode::Equal => {
                let right = self.pop()?;
                let left = self.pop()?;
                self.stack.push(Value::Bool(left.equals(&right)));
            }
            Opcode::Less => {
                let right = self.pop()?.as_int()?;
                let left = self.pop()?.as_int()?;
                self.stack.push(Value::Bool(left < right));
            }
            Opcode::LessEqual => {
                let right = self.pop()?.as_int()?;
                let left = self.pop()?.as_int()?;
                self.stack.push(Value::Bool(left <= right));
            }
            Opcode::Not => {
                let v = self.pop()?;
                self.stack.push(Value::Bool(!v.truthy()));
            }

            Opcode::JumpIf => {
                // Branch on a false condition; a true condition falls
                // through into the then-code.
                let condition = self.pop()?;
                if !condition.truthy() {
                    return Ok(ControlFlow::Jump(self.jump_target()?));
                }
            }
            Opcode::Goto => return Ok(ControlFlow::Jump(self.jump_target()?)),

            Opcode::Invoke => {
                let arg_count = self.code[self.pc + 2] as usize;
                let target = self.jump_target()?;
                self.frames.push(Frame {
                    return_pc: self.pc + op.width(),
                    saved_fp: self.fp,
                    arg_count,
                });
                self.fp = self.stack.len();
                return Ok(ControlFlow::Jump(target));
            }
            Opcode::Return => {
                // Drop locals, restore the caller's frame, consume the
                // arguments. A return with no frame ends the program.
                self.stack.truncate(self.fp);
                let Some(frame) = self.frames.pop() else { return Ok(ControlFlow::Halt) };
                self.fp = frame.saved_fp;
                if self.stack.len() < frame.arg_count {
                    return Err(VmError::StackUnderflow);
                }
                self.stack.truncate(self.stack.len() - frame.arg_count);
                return Ok(ControlFlow::Jump(frame.return_pc));
            }
            Opcode::Copy => {
                let operand = self.code[self.pc + 1];
                if operand > COPY_BIAS {
                    return Err(VmError::InvalidCopyOperand { operand });
                }
                let depth = (COPY_BIAS - operand) as usize;
                let slot = self
                    .fp
                    .checked_sub(depth)
                    .filter(|slot| *slot < self.stack.len())
                    .ok_or(VmError::StackUnderflow)?;
                let value = self.stack[slot].clone();
                self.stack.push(value);
            }

            Opcode::PushConst | Opcode::ResolveAddrOfConstIndex => {
                let index = self.pop()?.as_int()? as usize;
                let region = self.current_region()?;
                let value = region
                    .constants
                    .get(index)
                    .cloned()
                    .ok_or(VmError::UnknownConstant { index })?;
                self.stack.push(value);
            }
            Opcode::ResolveAddrOfImportIndex => {
                let index = self.pop()?.as_int()? as usize;
                let region = self.current_region()?;
                let native =
                    region.natives.get(index).copied().ok_or(VmError::UnknownImport { index })?;
                self.stack.push(Value::Native(native));
            }
            Opcode::Call => {
                let arg_count = self.code[self.pc + 1] as usize;
                if self.stack.len() < arg_count + 1 {
                    return Err(VmError::StackUnderflow);
                }
                let args: Vec<Value> = self.stack.split_off(self.stack.len() - arg_count);
                let func = match self.pop()? {
                    Value::Native(f) => f,
                    other => {
                        return Err(VmError::TypeMismatch {
                            expected: "native function",
                            found: other.kind(),
                        })
                    }
                };
                let words: Vec<u64> = args.iter().map(Value::to_word).collect();
                let raw = unsafe { func.call(&words)? };
                if let Some(result) = func.convert_result(raw) {
                    self.stack.push(result);
                }
            }

            Opcode::Init => {
                let type_id = self.operand_u16();
                let region = self.current_region()?;
                if let Some(name) = region.unresolved.get(&type_id) {
                    if !region.resolved.contains(&type_id) {
                        return Err(VmError::UnresolvedType { name: name.clone() });
                    }
                }
                // Reserve the local's stack slot.
                self.stack.push(Value::Int(0));
            }

            Opcode::CallIntrinsic => {
                let intrinsic = self.code[self.pc + 1];
                if intrinsic == Intrinsic::Breakpoint as u8 {
                    debug!(
                        pc = self.pc,
                        fp = self.fp,
                        stack_depth = self.stack.len(),
                        frames = self.frames.len(),
                        "breakpoint"
                    );
                }
            }
        }
        Ok(ControlFlow::Continue)
    }

    fn binary_arith(&mut self, op: Opcode) -> VmResult<()> {
        let right = self.pop()?.as_int()?;
        let left = self.pop()?.as_int()?;
        let value = match op {
            Opcode::Add => left.wrapping_add(right),
            Opcode::Subtract => left.wrapping_sub(right),
            Opcode::Multiply => left.wrapping_mul(right),
            Opcode::Divide => {
                if right == 0 {
                    return Err(VmError::DivisionByZero { pc: self.pc });
                }
                left.wrapping_div(right)
            }
            Opcode::Modulo => {
                if right == 0 {
                    return Err(VmError::DivisionByZero { pc: self.pc });
                }
                left.wrapping_rem(right)
            }
            Opcode::Power => {
                let exponent = u32::try_from(right)
                    .map_err(|_| VmError::NegativeExponent { pc: self.pc })?;
                left.wrapping_pow(exponent)
            }
            _ => unreachable!(),
        };
        self.stack.push(Value::Int(value));
        Ok(())
    }

    fn pop(&mut self) -> VmResult<Value> {
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }

    fn operand_u16(&self) -> u16 {
        u16::from_le_bytes([self.code[self.pc + 1], self.code[self.pc + 2]])
    }

    fn operand_u32(&self) -> u32 {
        u32::from_le_bytes([
            self.code[self.pc + 1],
            self.code[self.pc + 2],
            self.code[self.pc + 3],
            self.code[self.pc + 4],
        ])
    }

    fn jump_target(&self) -> VmResult<usize> {
        self.jump_sites.get(&self.pc).copied().ok_or(VmError::UnlinkedJump { pc: self.pc })
    }

    fn current_region(&self) -> VmResult<&ModuleRegion> {
        self.regions
            .iter()
            .find(|r| r.contains(self.pc))
            .ok_or(VmError::NoRegion { pc: self.pc })
    }

    // ========================================================================
    // Introspection (hosts and tests)
    // ========================================================================

    /// Current value-stack contents.
    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    /// Current value-stack depth.
    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Absolute jump site → target table built at link time.
    pub fn jump_sites(&self) -> &FxHashMap<usize, usize> {
        &self.jump_sites
    }

    /// Function name → absolute offset table.
    pub fn functions(&self) -> &FxHashMap<String, usize> {
        &self.functions
    }

    /// Loaded module regions in load order.
    pub fn regions(&self) -> &[ModuleRegion] {
        &self.regions
    }
}
