//! The gamecode module container.
//!
//! A module is the unit of separate compilation: the code generator fills
//! one in, the cache persists it, and the VM loader reads it back. On disk
//! it is a 4-byte magic followed by self-delimiting segments of
//! `(u16 kind, u16 payload length, payload)`. Unknown segment kinds are
//! skipped by length so old readers tolerate new writers.

use rustc_hash::FxHashMap;
use thiserror::Error;

use super::encoder::{ByteReader, ByteWriter, DecodeError};
use super::opcode::Opcode;
use super::types::{tag, BUILTIN_TYPES, FIRST_DYNAMIC_TYPE_ID};

/// Container magic, the first four bytes of every module.
pub const MAGIC: u32 = 0x4E49_4D4F;

/// Segment kind numbers.
pub mod segment {
    #![allow(missing_docs)] // kinds are described by their names

    pub const IMPORTS: u16 = 0;
    pub const CODE: u16 = 1;
    pub const CONSTANTS: u16 = 2;
    pub const TYPES: u16 = 3;
    pub const DEPENDENCIES: u16 = 4;
    pub const FUNCTIONS: u16 = 5;
    pub const STRUCTS: u16 = 6;
    pub const UNRESOLVED_TYPES: u16 = 7;
}

fn segment_name(kind: u16) -> &'static str {
    match kind {
        segment::IMPORTS => "imports",
        segment::CODE => "code",
        segment::CONSTANTS => "constants",
        segment::TYPES => "types",
        segment::DEPENDENCIES => "dependencies",
        segment::FUNCTIONS => "functions",
        segment::STRUCTS => "structs",
        segment::UNRESOLVED_TYPES => "unresolved types",
        _ => "unknown",
    }
}

/// Container encoding/decoding errors.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// Low-level decode failure outside any segment.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The first four bytes were not the container magic.
    #[error("invalid magic number: expected {MAGIC:#010x}, got {0:#010x}")]
    InvalidMagic(u32),

    /// A segment declared more payload than the container holds.
    #[error("{kind} segment overruns the container: {need} bytes declared, {have} left")]
    SegmentOverrun {
        /// Segment that failed.
        kind: &'static str,
        /// Declared payload length.
        need: usize,
        /// Bytes actually remaining.
        have: usize,
    },

    /// A segment's payload failed to decode.
    #[error("{kind} segment is corrupt: {source}")]
    SegmentCorrupt {
        /// Segment that failed.
        kind: &'static str,
        /// Underlying decode failure.
        source: DecodeError,
    },

    /// A segment grew past the u16 length field.
    #[error("{0} segment exceeds the 64 KiB segment limit")]
    SegmentTooLarge(&'static str),

    /// A constant resolved to a type tag the format cannot encode.
    #[error("constant `{name}` has unsupported type tag {tag}")]
    UnsupportedConstant {
        /// Constant name.
        name: String,
        /// Resolved base type tag.
        tag: u16,
    },

    /// A constant's value shape does not match its resolved type tag.
    #[error("constant `{name}` value does not match its type tag {tag}")]
    ConstantTypeMismatch {
        /// Constant name.
        name: String,
        /// Resolved base type tag.
        tag: u16,
    },
}

/// One `(is_const, type id)` template argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeParam {
    /// `const` qualifier of the argument.
    pub is_const: bool,
    /// Argument type id.
    pub type_id: u16,
}

/// A named type entry: builtins seeded at creation, dynamic entries derived
/// from aliases and struct members.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    /// Type name.
    pub name: String,
    /// Assigned id.
    pub id: u16,
    /// `const` qualifier.
    pub is_const: bool,
    /// Base type this entry derives from (self-referential for builtins).
    pub base: u16,
    /// Template arguments in declaration order.
    pub params: Vec<TypeParam>,
}

/// A struct data member. `order` fixes the layout position.
#[derive(Debug, Clone, PartialEq)]
pub struct StructMember {
    /// Layout position.
    pub order: u16,
    /// Member name.
    pub name: String,
    /// Static storage marker.
    pub is_static: bool,
    /// Member type id.
    pub type_id: u16,
}

/// A struct embedding entry, sharing the member order space.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposeMember {
    /// Layout position.
    pub order: u16,
    /// Embedded type name.
    pub name: String,
}

/// A struct table entry.
#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    /// Struct name.
    pub name: String,
    /// Assigned id (shared counter space with types).
    pub id: u16,
    /// Data members.
    pub members: Vec<StructMember>,
    /// Embedded members.
    pub composes: Vec<ComposeMember>,
}

/// A constant's value. The representation must match the constant's
/// resolved base tag when the module is encoded.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    /// Integer payload (u32/i32/ptr tags).
    Int(i64),
    /// String payload (strlit tag).
    Str(String),
}

/// A named constant. Its position in the constants table is its only
/// bytecode addressing handle, so insertion order is semantically
/// significant.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantDef {
    /// Constant name.
    pub name: String,
    /// Declared type id (resolved to a base tag when encoded).
    pub type_id: u16,
    /// Source-level value.
    pub value: ConstValue,
}

/// A bytecode function: name and per-module label index.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    /// Function name.
    pub name: String,
    /// Label index the function's code starts at.
    pub label: u16,
}

/// A native import library and its functions, in declaration order. The
/// global flat position across all libraries (library-major) is the index
/// `ResolveAddrOfImportIndex` consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportLib {
    /// Library name passed to the OS loader.
    pub library: String,
    /// Imported function names in declaration order.
    pub functions: Vec<String>,
}

/// A type name referenced before (or never) declared, carrying the id
/// minted for it.
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedType {
    /// Referenced type name.
    pub name: String,
    /// Id minted for the reference.
    pub id: u16,
}

/// A compiled gamecode module: symbol tables plus the code stream.
///
/// Also the builder the code generator writes into; the dynamic id counter
/// and the label table live here, scoped to one translation unit.
#[derive(Debug, Clone)]
pub struct Module {
    /// Modules referenced via `use`, in first-seen order.
    pub dependencies: Vec<String>,
    /// Native import libraries in declaration order.
    pub imports: Vec<ImportLib>,
    /// Type table: builtins first, then dynamic entries in insertion order.
    pub types: Vec<TypeDef>,
    /// Struct table in declaration order.
    pub structs: Vec<StructDef>,
    /// Constant table in insertion order (positionally addressed).
    pub constants: Vec<ConstantDef>,
    /// Function table.
    pub functions: Vec<FunctionDef>,
    /// Types still unresolved at the end of generation.
    pub unresolved_types: Vec<UnresolvedType>,
    /// Flat instruction stream.
    pub code: Vec<u8>,
    /// Label names in declaration order; index = label id. Generation-time
    /// only, never serialized.
    labels: Vec<String>,
    /// Next dynamic type/struct id.
    next_type_id: u16,
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}

impl Module {
    /// Create an empty module with the builtin type table seeded.
    pub fn new() -> Self {
        let types = BUILTIN_TYPES
            .iter()
            .map(|(name, id)| TypeDef {
                name: (*name).to_string(),
                id: *id,
                is_const: false,
                base: *id,
                params: Vec::new(),
            })
            .collect();
        Self {
            dependencies: Vec::new(),
            imports: Vec::new(),
            types,
            structs: Vec::new(),
            constants: Vec::new(),
            functions: Vec::new(),
            unresolved_types: Vec::new(),
            code: Vec::new(),
            labels: Vec::new(),
            next_type_id: FIRST_DYNAMIC_TYPE_ID,
        }
    }

    // ========================================================================
    // Table registration
    // ========================================================================

    /// Record a `use` dependency (first occurrence wins).
    pub fn add_dependency(&mut self, name: &str) {
        if !self.dependencies.iter().any(|d| d == name) {
            self.dependencies.push(name.to_string());
        }
    }

    /// Register a native import. Functions accumulate per library in
    /// declaration order.
    pub fn add_import(&mut self, library: &str, function: &str) {
        match self.imports.iter_mut().find(|lib| lib.library == library) {
            Some(lib) => lib.functions.push(function.to_string()),
            None => self.imports.push(ImportLib {
                library: library.to_string(),
                functions: vec![function.to_string()],
            }),
        }
    }

    /// Register a derived type, returning its id. An existing name keeps
    /// its id; ids are never reassigned within a unit.
    pub fn add_type(
        &mut self,
        name: &str,
        is_const: bool,
        base: u16,
        params: Vec<TypeParam>,
    ) -> u16 {
        if let Some(existing) = self.types.iter().find(|t| t.name == name) {
            return existing.id;
        }
        let id = self.next_type_id;
        self.next_type_id += 1;
        self.types.push(TypeDef { name: name.to_string(), id, is_const, base, params });
        id
    }

    /// Register a struct, returning its id (shared counter space with
    /// types).
    pub fn add_struct(
        &mut self,
        name: &str,
        members: Vec<StructMember>,
        composes: Vec<ComposeMember>,
    ) -> u16 {
        if let Some(existing) = self.structs.iter().find(|s| s.name == name) {
            return existing.id;
        }
        let id = self.next_type_id;
        self.next_type_id += 1;
        self.structs.push(StructDef { name: name.to_string(), id, members, composes });
        id
    }

    /// Mint an id for a type name that has not been declared yet.
    pub fn add_unresolved_type(&mut self, name: &str) -> u16 {
        if let Some(existing) = self.unresolved_types.iter().find(|u| u.name == name) {
            return existing.id;
        }
        let id = self.next_type_id;
        self.next_type_id += 1;
        self.unresolved_types.push(UnresolvedType { name: name.to_string(), id });
        id
    }

    /// Register a named constant, returning its positional index. A
    /// re-registered name keeps its original slot.
    pub fn add_constant(&mut self, name: &str, type_id: u16, value: ConstValue) -> usize {
        if let Some(index) = self.constant_index_by_name(name) {
            return index;
        }
        self.constants.push(ConstantDef { name: name.to_string(), type_id, value });
        self.constants.len() - 1
    }

    /// Register a label, returning its dense index.
    pub fn add_label(&mut self, name: &str) -> u16 {
        if let Some(index) = self.labels.iter().position(|l| l == name) {
            return index as u16;
        }
        self.labels.push(name.to_string());
        (self.labels.len() - 1) as u16
    }

    /// Register a function name against a label index.
    pub fn add_function(&mut self, name: &str, label: u16) {
        if !self.functions.iter().any(|f| f.name == name) {
            self.functions.push(FunctionDef { name: name.to_string(), label });
        }
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    /// Id of a declared type by name.
    pub fn type_id(&self, name: &str) -> Option<u16> {
        self.types.iter().find(|t| t.name == name).map(|t| t.id)
    }

    /// Id of a declared struct by name.
    pub fn struct_id(&self, name: &str) -> Option<u16> {
        self.structs.iter().find(|s| s.name == name).map(|s| s.id)
    }

    /// Label index by name.
    pub fn label_index(&self, name: &str) -> Option<u16> {
        self.labels.iter().position(|l| l == name).map(|i| i as u16)
    }

    /// True when `name` is an imported native function.
    pub fn is_import_function(&self, name: &str) -> bool {
        self.imports.iter().any(|lib| lib.functions.iter().any(|f| f == name))
    }

    /// Global flat index of an imported function (library-major).
    pub fn import_index(&self, name: &str) -> Option<usize> {
        let mut index = 0;
        for lib in &self.imports {
            for f in &lib.functions {
                if f == name {
                    return Some(index);
                }
                index += 1;
            }
        }
        None
    }

    /// Positional index of a constant by name.
    pub fn constant_index_by_name(&self, name: &str) -> Option<usize> {
        self.constants.iter().position(|c| c.name == name)
    }

    /// Positional index of the first constant holding `value`.
    pub fn constant_index_by_value(&self, value: &ConstValue) -> Option<usize> {
        self.constants.iter().position(|c| &c.value == value)
    }

    /// Resolve a type id down to its builtin base tag by walking derived
    /// entries.
    pub fn resolve_base_tag(&self, id: u16) -> Option<u16> {
        if id < FIRST_DYNAMIC_TYPE_ID {
            return Some(id);
        }
        let ty = self.types.iter().find(|t| t.id == id)?;
        self.resolve_base_tag(ty.base)
    }

    // ========================================================================
    // Code emission
    // ========================================================================

    /// Emit a width-1 instruction.
    pub fn emit(&mut self, op: Opcode) {
        debug_assert_eq!(op.width(), 1);
        self.code.push(op.to_u8());
    }

    /// Emit a width-2 instruction with its u8 operand.
    pub fn emit_u8(&mut self, op: Opcode, operand: u8) {
        debug_assert_eq!(op.width(), 2);
        self.code.push(op.to_u8());
        self.code.push(operand);
    }

    /// Emit a width-3 instruction with two u8 operands.
    pub fn emit_u8x2(&mut self, op: Opcode, first: u8, second: u8) {
        debug_assert_eq!(op.width(), 3);
        self.code.push(op.to_u8());
        self.code.push(first);
        self.code.push(second);
    }

    /// Emit a width-3 instruction with a u16 operand.
    pub fn emit_u16(&mut self, op: Opcode, operand: u16) {
        debug_assert_eq!(op.width(), 3);
        self.code.push(op.to_u8());
        self.code.extend_from_slice(&operand.to_le_bytes());
    }

    /// Emit a width-5 instruction with a u32 operand.
    pub fn emit_u32(&mut self, op: Opcode, operand: u32) {
        debug_assert_eq!(op.width(), 5);
        self.code.push(op.to_u8());
        self.code.extend_from_slice(&operand.to_le_bytes());
    }

    // ========================================================================
    // Encoding
    // ========================================================================

    /// Serialize the module to container bytes.
    pub fn encode(&self) -> Result<Vec<u8>, ModuleError> {
        let mut out = ByteWriter::new();
        out.emit_u32(MAGIC);

        self.write_segment(&mut out, segment::DEPENDENCIES, self.encode_dependencies()?)?;
        for lib in &self.imports {
            self.write_segment(&mut out, segment::IMPORTS, Self::encode_import(lib)?)?;
        }
        self.write_segment(&mut out, segment::TYPES, self.encode_types()?)?;
        self.write_segment(&mut out, segment::STRUCTS, self.encode_structs()?)?;
        self.write_segment(&mut out, segment::UNRESOLVED_TYPES, self.encode_unresolved()?)?;
        self.write_segment(&mut out, segment::CONSTANTS, self.encode_constants()?)?;
        self.write_segment(&mut out, segment::FUNCTIONS, self.encode_functions()?)?;
        self.write_segment(&mut out, segment::CODE, self.code.clone())?;

        Ok(out.into_bytes())
    }

    fn write_segment(
        &self,
        out: &mut ByteWriter,
        kind: u16,
        payload: Vec<u8>,
    ) -> Result<(), ModuleError> {
        if payload.len() > u16::MAX as usize {
            return Err(ModuleError::SegmentTooLarge(segment_name(kind)));
        }
        out.emit_u16(kind);
        out.emit_u16(payload.len() as u16);
        out.emit_bytes(&payload);
        Ok(())
    }

    fn encode_dependencies(&self) -> Result<Vec<u8>, ModuleError> {
        let mut w = ByteWriter::new();
        w.emit_u8(self.dependencies.len() as u8);
        for dep in &self.dependencies {
            w.emit_name(dep)?;
        }
        Ok(w.into_bytes())
    }

    fn encode_import(lib: &ImportLib) -> Result<Vec<u8>, ModuleError> {
        let mut w = ByteWriter::new();
        w.emit_name(&lib.library)?;
        for func in &lib.functions {
            w.emit_name(func)?;
        }
        Ok(w.into_bytes())
    }

    fn encode_types(&self) -> Result<Vec<u8>, ModuleError> {
        let mut w = ByteWriter::new();
        for ty in &self.types {
            if ty.id < FIRST_DYNAMIC_TYPE_ID {
                continue;
            }
            w.emit_name(&ty.name)?;
            w.emit_u16(ty.id);
            w.emit_u16(ty.base);
            w.emit_u8(ty.is_const as u8);
            w.emit_u8(ty.params.len() as u8);
            for param in &ty.params {
                w.emit_u8(param.is_const as u8);
                w.emit_u16(param.type_id);
            }
        }
        Ok(w.into_bytes())
    }

    fn encode_structs(&self) -> Result<Vec<u8>, ModuleError> {
        let mut w = ByteWriter::new();
        w.emit_u8(self.structs.len() as u8);
        for def in &self.structs {
            w.emit_name(&def.name)?;
            w.emit_u16(def.id);
            w.emit_u16(def.members.len() as u16);
            w.emit_u16(def.composes.len() as u16);
            w.emit_u8(0); // template parameters: reserved
            for m in &def.members {
                w.emit_u16(m.order);
                w.emit_name(&m.name)?;
                w.emit_u8(m.is_static as u8);
                w.emit_u16(m.type_id);
            }
            for c in &def.composes {
                w.emit_u16(c.order);
                w.emit_name(&c.name)?;
            }
        }
        Ok(w.into_bytes())
    }

    fn encode_unresolved(&self) -> Result<Vec<u8>, ModuleError> {
        let mut w = ByteWriter::new();
        w.emit_u8(self.unresolved_types.len() as u8);
        for u in &self.unresolved_types {
            w.emit_name(&u.name)?;
            w.emit_u16(u.id);
        }
        Ok(w.into_bytes())
    }

    fn encode_constants(&self) -> Result<Vec<u8>, ModuleError> {
        let mut w = ByteWriter::new();
        for c in &self.constants {
            let resolved =
                self.resolve_base_tag(c.type_id).ok_or(ModuleError::UnsupportedConstant {
                    name: c.name.clone(),
                    tag: c.type_id,
                })?;
            w.emit_u8(resolved as u8);
            w.emit_name(&c.name)?;
            match (resolved, &c.value) {
                (tag::STRLIT, ConstValue::Str(s)) => w.emit_name(s)?,
                (tag::U32, ConstValue::Int(v)) => w.emit_u32(*v as u32),
                (tag::I32, ConstValue::Int(v)) => w.emit_i32(*v as i32),
                (tag::PTR, ConstValue::Int(v)) => {
                    w.emit_u8(8); // pointer width
                    w.emit_u64(*v as u64);
                }
                (tag::STRLIT | tag::U32 | tag::I32 | tag::PTR, _) => {
                    return Err(ModuleError::ConstantTypeMismatch {
                        name: c.name.clone(),
                        tag: resolved,
                    })
                }
                _ => {
                    return Err(ModuleError::UnsupportedConstant {
                        name: c.name.clone(),
                        tag: resolved,
                    })
                }
            }
        }
        Ok(w.into_bytes())
    }

    fn encode_functions(&self) -> Result<Vec<u8>, ModuleError> {
        let mut w = ByteWriter::new();
        w.emit_u8(self.functions.len() as u8);
        for f in &self.functions {
            w.emit_name(&f.name)?;
            w.emit_u16(f.label);
        }
        Ok(w.into_bytes())
    }

    // ========================================================================
    // Decoding
    // ========================================================================

    /// Read a module back from container bytes. A bad magic or a truncated
    /// segment fails the whole read; no partial state escapes.
    pub fn decode(data: &[u8]) -> Result<Self, ModuleError> {
        let mut reader = ByteReader::new(data);
        let magic = reader.read_u32()?;
        if magic != MAGIC {
            return Err(ModuleError::InvalidMagic(magic));
        }

        let mut module = Module::new();
        while reader.has_more() {
            let kind = reader.read_u16()?;
            let len = reader.read_u16()? as usize;
            if len > reader.remaining() {
                return Err(ModuleError::SegmentOverrun {
                    kind: segment_name(kind),
                    need: len,
                    have: reader.remaining(),
                });
            }
            let payload = reader.read_bytes(len)?;
            let corrupt = |source| ModuleError::SegmentCorrupt { kind: segment_name(kind), source };
            match kind {
                segment::DEPENDENCIES => module.decode_dependencies(payload).map_err(corrupt)?,
                segment::IMPORTS => module.decode_import(payload).map_err(corrupt)?,
                segment::TYPES => module.decode_types(payload).map_err(corrupt)?,
                segment::STRUCTS => module.decode_structs(payload).map_err(corrupt)?,
                segment::UNRESOLVED_TYPES => module.decode_unresolved(payload).map_err(corrupt)?,
                segment::CONSTANTS => module.decode_constants(payload).map_err(corrupt)?,
                segment::FUNCTIONS => module.decode_functions(payload).map_err(corrupt)?,
                segment::CODE => module.code = payload.to_vec(),
                _ => {
                    // Unknown segment kind: already consumed by length.
                    tracing::trace!(kind, len, "skipping unknown segment");
                }
            }
        }

        // Keep the id counter clear of every id the container carries.
        let max_id = module
            .types
            .iter()
            .map(|t| t.id)
            .chain(module.structs.iter().map(|s| s.id))
            .chain(module.unresolved_types.iter().map(|u| u.id))
            .max()
            .unwrap_or(0);
        module.next_type_id = module.next_type_id.max(max_id.saturating_add(1));
        Ok(module)
    }

    fn decode_dependencies(&mut self, payload: &[u8]) -> Result<(), DecodeError> {
        let mut r = ByteReader::new(payload);
        let _count = r.read_u8()?;
        while r.has_more() {
            let name = r.read_name()?;
            self.add_dependency(&name);
        }
        Ok(())
    }

    fn decode_import(&mut self, payload: &[u8]) -> Result<(), DecodeError> {
        let mut r = ByteReader::new(payload);
        let library = r.read_name()?;
        while r.has_more() {
            let function = r.read_name()?;
            self.add_import(&library, &function);
        }
        Ok(())
    }

    fn decode_types(&mut self, payload: &[u8]) -> Result<(), DecodeError> {
        let mut r = ByteReader::new(payload);
        while r.has_more() {
            let name = r.read_name()?;
            let id = r.read_u16()?;
            let base = r.read_u16()?;
            let is_const = r.read_u8()? != 0;
            let param_count = r.read_u8()? as usize;
            let mut params = Vec::with_capacity(param_count);
            for _ in 0..param_count {
                let is_const = r.read_u8()? != 0;
                let type_id = r.read_u16()?;
                params.push(TypeParam { is_const, type_id });
            }
            self.types.push(TypeDef { name, id, is_const, base, params });
        }
        Ok(())
    }

    fn decode_structs(&mut self, payload: &[u8]) -> Result<(), DecodeError> {
        let mut r = ByteReader::new(payload);
        let _count = r.read_u8()?;
        while r.has_more() {
            let name = r.read_name()?;
            let id = r.read_u16()?;
            let member_count = r.read_u16()? as usize;
            let compose_count = r.read_u16()? as usize;
            let _template_count = r.read_u8()?;
            let mut members = Vec::with_capacity(member_count);
            for _ in 0..member_count {
                let order = r.read_u16()?;
                let mname = r.read_name()?;
                let is_static = r.read_u8()? != 0;
                let type_id = r.read_u16()?;
                members.push(StructMember { order, name: mname, is_static, type_id });
            }
            let mut composes = Vec::with_capacity(compose_count);
            for _ in 0..compose_count {
                let order = r.read_u16()?;
                let cname = r.read_name()?;
                composes.push(ComposeMember { order, name: cname });
            }
            self.structs.push(StructDef { name, id, members, composes });
        }
        Ok(())
    }

    fn decode_unresolved(&mut self, payload: &[u8]) -> Result<(), DecodeError> {
        let mut r = ByteReader::new(payload);
        let _count = r.read_u8()?;
        while r.has_more() {
            let name = r.read_name()?;
            let id = r.read_u16()?;
            self.unresolved_types.push(UnresolvedType { name, id });
        }
        Ok(())
    }

    fn decode_constants(&mut self, payload: &[u8]) -> Result<(), DecodeError> {
        let mut r = ByteReader::new(payload);
        while r.has_more() {
            let tag_offset = r.position();
            let type_id = r.read_u8()? as u16;
            let name = r.read_name()?;
            let value = match type_id {
                tag::STRLIT => ConstValue::Str(r.read_name()?),
                tag::U32 => ConstValue::Int(r.read_u32()? as i64),
                tag::I32 => ConstValue::Int(r.read_i32()? as i64),
                tag::PTR => {
                    let _width = r.read_u8()?;
                    ConstValue::Int(r.read_u64()? as i64)
                }
                // An unknown tag leaves the rest of the segment unframed.
                other => {
                    return Err(DecodeError::InvalidTag {
                        tag: other as u8,
                        offset: tag_offset,
                    })
                }
            };
            self.constants.push(ConstantDef { name, type_id, value });
        }
        Ok(())
    }

    fn decode_functions(&mut self, payload: &[u8]) -> Result<(), DecodeError> {
        let mut r = ByteReader::new(payload);
        let _count = r.read_u8()?;
        while r.has_more() {
            let name = r.read_name()?;
            let label = r.read_u16()?;
            self.functions.push(FunctionDef { name, label });
        }
        Ok(())
    }

    /// Map label id → label name, for diagnostics.
    pub fn label_names(&self) -> FxHashMap<u16, &str> {
        self.labels.iter().enumerate().map(|(i, n)| (i as u16, n.as_str())).collect()
    }
}
