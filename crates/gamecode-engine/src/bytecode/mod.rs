//! Bytecode: opcodes, encoding primitives, and the module container.

pub mod encoder;
pub mod module;
pub mod opcode;
pub mod types;

pub use encoder::{ByteReader, ByteWriter, DecodeError};
pub use module::{
    segment, ComposeMember, ConstValue, ConstantDef, FunctionDef, ImportLib, Module, ModuleError,
    StructDef, StructMember, TypeDef, TypeParam, UnresolvedType, MAGIC,
};
pub use opcode::{
    instruction_width, Intrinsic, Opcode, COPY_BIAS, FIRST_FIVE_BYTE_OP, FIRST_THREE_BYTE_OP,
    FIRST_TWO_BYTE_OP,
};
pub use types::{tag, BUILTIN_TYPES, FIRST_DYNAMIC_TYPE_ID};
