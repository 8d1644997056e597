//! Opcodes for the gamecode VM.
//!
//! Instruction width is derived purely from the opcode's numeric value:
//! everything below [`FIRST_TWO_BYTE_OP`] is a bare opcode, then the
//! one-operand bands follow. Decoding therefore never needs a lookup table
//! beyond three threshold comparisons.

/// First opcode value with a 1-byte operand (width 2).
pub const FIRST_TWO_BYTE_OP: u8 = 127;
/// First opcode value with a 2-byte operand (width 3).
pub const FIRST_THREE_BYTE_OP: u8 = 200;
/// First opcode value with a 4-byte operand (width 5).
pub const FIRST_FIVE_BYTE_OP: u8 = 210;

/// Instruction width in bytes for a raw opcode value, including the opcode
/// byte itself.
pub fn instruction_width(opcode: u8) -> usize {
    if opcode >= FIRST_FIVE_BYTE_OP {
        5
    } else if opcode >= FIRST_THREE_BYTE_OP {
        3
    } else if opcode >= FIRST_TWO_BYTE_OP {
        2
    } else {
        1
    }
}

/// Bytecode opcode enumeration.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ===== Width 1 (no operand) =====
    /// No operation.
    Nop = 0,
    /// Pop a global import index, push the resolved native function.
    ResolveAddrOfImportIndex = 1,
    /// Pop locals, leave the current frame, drop its arguments.
    Return = 2,
    /// Pop b, pop a, push a + b.
    Add = 3,
    /// Pop b, pop a, push a - b.
    Subtract = 4,
    /// Pop b, pop a, push a * b.
    Multiply = 5,
    /// Pop b, pop a, push a / b.
    Divide = 6,
    /// Pop a, push -a.
    Negate = 7,
    /// Pop b, pop a, push a % b.
    Modulo = 8,
    /// Pop b, pop a, push a ** b.
    Power = 9,
    /// Pop b, pop a, push a == b.
    Equal = 10,
    /// Pop b, pop a, push a < b.
    Less = 11,
    /// Pop b, pop a, push a <= b.
    LessEqual = 12,
    /// Pop a, push !a.
    Not = 13,
    /// Push the literal 1.
    PushOne = 14,
    /// Push the literal 0.
    PushZero = 15,
    /// Pop a, push a + 1.
    Increase = 16,
    /// Pop a, push a - 1.
    Decrease = 17,
    /// Pop a constant index, push the constant's converted value.
    PushConst = 18,
    /// Pop a constant index, push the constant's address/value for native
    /// calls.
    ResolveAddrOfConstIndex = 19,
    /// Pop and discard the top of stack.
    Pop = 20,

    // ===== Width 2 (u8 operand) =====
    /// Invoke a VM intrinsic by number.
    CallIntrinsic = 127,
    /// Push an 8-bit literal.
    PushU8 = 128,
    /// Pop a condition; jump to the linked target when it is false.
    JumpIf = 129,
    /// Label marker; operand is the per-module label id. No-op at run time.
    Label = 130,
    /// Unconditional jump to the linked target.
    Goto = 131,
    /// Call a native function; operand is the argument count.
    Call = 132,
    /// Push a copy of a parameter slot; operand is the frame-relative slot
    /// biased by [`COPY_BIAS`].
    Copy = 133,

    // ===== Width 3 (two u8 or one u16 operand) =====
    /// Push a 16-bit literal.
    PushU16 = 200,
    /// Enter a bytecode function; operands are label id and argument count.
    Invoke = 201,
    /// Reserve a local slot; operand is the u16 type id.
    Init = 202,

    // ===== Width 5 (u32 operand) =====
    /// Push a 32-bit literal.
    PushU32 = 210,
}

/// Bias added to `Copy`'s frame-relative slot so the operand stays an
/// unsigned byte.
pub const COPY_BIAS: u8 = 32;

/// VM intrinsics, selected by `CallIntrinsic`'s operand.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intrinsic {
    /// Dump interpreter state to the log.
    Breakpoint = 0,
}

impl Opcode {
    /// Raw byte value.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Decode a raw byte. Returns `None` for unassigned values; the
    /// interpreter treats those as no-ops.
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Opcode::Nop,
            1 => Opcode::ResolveAddrOfImportIndex,
            2 => Opcode::Return,
            3 => Opcode::Add,
            4 => Opcode::Subtract,
            5 => Opcode::Multiply,
            6 => Opcode::Divide,
            7 => Opcode::Negate,
            8 => Opcode::Modulo,
            9 => Opcode::Power,
            10 => Opcode::Equal,
            11 => Opcode::Less,
            12 => Opcode::LessEqual,
            13 => Opcode::Not,
            14 => Opcode::PushOne,
            15 => Opcode::PushZero,
            16 => Opcode::Increase,
            17 => Opcode::Decrease,
            18 => Opcode::PushConst,
            19 => Opcode::ResolveAddrOfConstIndex,
            20 => Opcode::Pop,
            127 => Opcode::CallIntrinsic,
            128 => Opcode::PushU8,
            129 => Opcode::JumpIf,
            130 => Opcode::Label,
            131 => Opcode::Goto,
            132 => Opcode::Call,
            133 => Opcode::Copy,
            200 => Opcode::PushU16,
            201 => Opcode::Invoke,
            202 => Opcode::Init,
            210 => Opcode::PushU32,
            _ => return None,
        })
    }

    /// Instruction width in bytes, opcode byte included.
    pub fn width(self) -> usize {
        instruction_width(self.to_u8())
    }
}
