//! Cross-module label linking.
//!
//! Loading concatenates every module's code into one buffer, dependencies
//! first. Per module, label resolution is two passes over the raw code:
//! pass one maps each internal label id to its in-module program counter,
//! pass two maps every `JumpIf`/`Goto`/`Invoke` *site* offset (absolute,
//! post-concatenation) to its *target* offset by adding the module's base.
//! Function entries are rewritten from label ids to absolute offsets the
//! same way. Instruction widths come from the opcode thresholds, so both
//! passes walk the code without any table.

use std::ffi::CString;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::bytecode::{instruction_width, tag, ConstValue, Module, Opcode};

use super::value::{NativeFn, Value};
use super::{VmError, VmResult};

/// One loaded module's slice of the concatenated code, plus the tables its
/// instructions address positionally. Constant and import indices are
/// per-module; the interpreter picks the region by the current program
/// counter.
#[derive(Debug)]
pub struct ModuleRegion {
    /// Module name (cache key).
    pub name: String,
    /// First absolute code offset of this module.
    pub start: usize,
    /// One past the last absolute code offset.
    pub end: usize,
    /// Constants pre-converted to runtime values, in table order.
    pub constants: Vec<Value>,
    /// Flat `(library, function)` list, library-major.
    pub imports: Vec<(String, String)>,
    /// Resolved native symbols, parallel to `imports`. Filled when the VM
    /// loads its imports.
    pub natives: Vec<NativeFn>,
    /// Declared dynamic type names (types and structs).
    pub declared_types: FxHashSet<String>,
    /// Unresolved type id → name.
    pub unresolved: FxHashMap<u16, String>,
    /// Unresolved ids satisfied by some loaded module.
    pub resolved: FxHashSet<u16>,
}

impl ModuleRegion {
    /// True when `pc` falls inside this region.
    pub fn contains(&self, pc: usize) -> bool {
        self.start <= pc && pc < self.end
    }
}

/// Pass one: map label id → in-module pc.
pub fn scan_labels(code: &[u8]) -> FxHashMap<u8, usize> {
    let mut labels = FxHashMap::default();
    let mut pc = 0;
    while pc < code.len() {
        let op = code[pc];
        let width = instruction_width(op);
        if pc + width > code.len() {
            break;
        }
        if op == Opcode::Label.to_u8() {
            labels.insert(code[pc + 1], pc);
        }
        pc += width;
    }
    labels
}

/// Pass two: record absolute site → absolute target for every jump and
/// invoke in `code`, offset by `base`.
pub fn map_jump_sites(
    module_name: &str,
    code: &[u8],
    base: usize,
    local_labels: &FxHashMap<u8, usize>,
    sites: &mut FxHashMap<usize, usize>,
) -> VmResult<()> {
    let jump_ops =
        [Opcode::JumpIf.to_u8(), Opcode::Goto.to_u8(), Opcode::Invoke.to_u8()];
    let mut pc = 0;
    while pc < code.len() {
        let op = code[pc];
        let width = instruction_width(op);
        if pc + width > code.len() {
            break;
        }
        if jump_ops.contains(&op) {
            let label = code[pc + 1];
            let target = local_labels.get(&label).copied().ok_or(VmError::UnknownLabel {
                module: module_name.to_string(),
                label,
            })?;
            sites.insert(base + pc, base + target);
        }
        pc += width;
    }
    Ok(())
}

/// Build a region for a decoded module whose code begins at `base`.
///
/// Constants are converted to runtime values here, so an unsupported or
/// malformed constant fails the load instead of the first instruction that
/// touches it.
pub fn build_region(name: &str, module: &Module, base: usize) -> VmResult<ModuleRegion> {
    let mut constants = Vec::with_capacity(module.constants.len());
    for c in &module.constants {
        constants.push(convert_constant(name, &c.name, c.type_id, &c.value)?);
    }

    let imports = module
        .imports
        .iter()
        .flat_map(|lib| {
            lib.functions.iter().map(|f| (lib.library.clone(), f.clone()))
        })
        .collect();

    let declared_types = module
        .types
        .iter()
        .filter(|t| t.id >= crate::bytecode::FIRST_DYNAMIC_TYPE_ID)
        .map(|t| t.name.clone())
        .chain(module.structs.iter().map(|s| s.name.clone()))
        .collect();

    let unresolved =
        module.unresolved_types.iter().map(|u| (u.id, u.name.clone())).collect();

    Ok(ModuleRegion {
        name: name.to_string(),
        start: base,
        end: base + module.code.len(),
        constants,
        imports,
        natives: Vec::new(),
        declared_types,
        unresolved,
        resolved: FxHashSet::default(),
    })
}

/// Convert a table constant to the value the VM pushes for it. The table
/// stores source-level values; native calls need machine-ready
/// representations.
fn convert_constant(
    module: &str,
    name: &str,
    type_tag: u16,
    value: &ConstValue,
) -> VmResult<Value> {
    let mismatch = || VmError::InvalidConstant { module: module.to_string(), name: name.to_string() };
    match type_tag {
        tag::STRLIT => match value {
            ConstValue::Str(s) => {
                let cstr = CString::new(s.as_str()).map_err(|_| mismatch())?;
                Ok(Value::Str(Arc::new(cstr)))
            }
            _ => Err(mismatch()),
        },
        tag::U32 => match value {
            ConstValue::Int(v) => Ok(Value::U32(*v as u32)),
            _ => Err(mismatch()),
        },
        tag::I32 => match value {
            ConstValue::Int(v) => Ok(Value::I32(*v as i32)),
            _ => Err(mismatch()),
        },
        tag::PTR => match value {
            ConstValue::Int(v) => Ok(Value::Ptr(*v as u64)),
            _ => Err(mismatch()),
        },
        other => Err(VmError::UnsupportedConstant {
            name: name.to_string(),
            tag: other,
        }),
    }
}
