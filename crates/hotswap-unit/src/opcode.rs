//! Instruction set for type unit method bodies
//!
//! Opcodes are single bytes followed by fixed-size operands. The set is
//! split in two halves:
//! - source opcodes, which a compiler may emit into a type unit
//! - engine opcodes (0xE0-0xEF), which only the rewriter emits
//!
//! Every engine opcode that replaces a source opcode has the same encoded
//! length as the instruction it replaces, so rewriting a body in place
//! never invalidates branch offsets.
//!
//! Opcode ranges:
//! - 0x00-0x0F: Stack manipulation & constants
//! - 0x10-0x1F: Local variables
//! - 0x20-0x2F: Integer arithmetic (i32 and i64)
//! - 0x30-0x3F: Float arithmetic
//! - 0x50-0x5F: Comparison & logical
//! - 0x90-0x9F: Control flow
//! - 0xA0-0xAF: Invocation
//! - 0xB0-0xBF: Object operations
//! - 0xE0-0xEF: Engine (dispatch, field extension, capture sites)
//! - 0xF0-0xFF: Closures

/// Bytecode opcode enumeration
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ===== Stack Manipulation & Constants (0x00-0x0F) =====
    /// No operation
    Nop = 0x00,
    /// Pop top value from stack
    Pop = 0x01,
    /// Duplicate top stack value
    Dup = 0x02,
    /// Swap top two stack values
    Swap = 0x03,
    /// Push null constant
    ConstNull = 0x04,
    /// Push true constant
    ConstTrue = 0x05,
    /// Push false constant
    ConstFalse = 0x06,
    /// Push 32-bit integer constant (operand: i32)
    ConstI32 = 0x07,
    /// Push 64-bit float constant (operand: f64)
    ConstF64 = 0x08,
    /// Push string constant from pool (operand: u32 index)
    ConstStr = 0x09,
    /// Push 64-bit integer constant (operand: i64)
    ConstI64 = 0x0A,

    // ===== Local Variables (0x10-0x1F) =====
    /// Load local variable onto stack (operand: u16 index)
    LoadLocal = 0x10,
    /// Store top of stack to local variable (operand: u16 index)
    StoreLocal = 0x11,

    // ===== Integer Arithmetic (0x20-0x2F) =====
    /// i32 addition: pop b, pop a, push a + b
    Iadd = 0x20,
    /// i32 subtraction: pop b, pop a, push a - b
    Isub = 0x21,
    /// i32 multiplication: pop b, pop a, push a * b
    Imul = 0x22,
    /// i32 division: pop b, pop a, push a / b
    Idiv = 0x23,
    /// i32 modulo: pop b, pop a, push a % b
    Imod = 0x24,
    /// i32 negation: pop a, push -a
    Ineg = 0x25,
    /// i64 addition
    Ladd = 0x28,
    /// i64 subtraction
    Lsub = 0x29,
    /// i64 multiplication
    Lmul = 0x2A,
    /// i64 division
    Ldiv = 0x2B,
    /// Widen i32 to i64
    I2l = 0x2C,

    // ===== Float Arithmetic (0x30-0x3F) =====
    /// Float addition
    Fadd = 0x30,
    /// Float subtraction
    Fsub = 0x31,
    /// Float multiplication
    Fmul = 0x32,
    /// Float division
    Fdiv = 0x33,

    // ===== Comparison & Logical (0x50-0x5F) =====
    /// Integer equality: pop b, pop a, push a == b
    Ieq = 0x50,
    /// Integer inequality
    Ine = 0x51,
    /// Integer less than
    Ilt = 0x52,
    /// Integer less or equal
    Ile = 0x53,
    /// Integer greater than
    Igt = 0x54,
    /// Integer greater or equal
    Ige = 0x55,
    /// Logical not
    Not = 0x58,

    // ===== Control Flow (0x90-0x9F) =====
    /// Unconditional jump (operand: i32 offset)
    Jmp = 0x90,
    /// Jump if false (operand: i32 offset)
    JmpIfFalse = 0x91,
    /// Jump if true (operand: i32 offset)
    JmpIfTrue = 0x92,
    /// Return top of stack
    Return = 0x93,
    /// Return without a value
    ReturnVoid = 0x94,

    // ===== Invocation (0xA0-0xAF) =====
    /// Call a static method (operands: u32 type name, u32 signature key)
    InvokeStatic = 0xA0,
    /// Call an instance method (operands: u32 owner name, u32 signature key)
    InvokeVirtual = 0xA1,
    /// Call a closure's functional method (operand: u32 signature key)
    InvokeClosure = 0xA2,

    // ===== Object Operations (0xB0-0xBF) =====
    /// Allocate an instance (operand: u32 type name)
    New = 0xB0,
    /// Read a field (operands: u32 owner name, u32 field name)
    GetField = 0xB1,
    /// Write a field (operands: u32 owner name, u32 field name)
    PutField = 0xB2,

    // ===== Engine (0xE0-0xEF) =====
    /// Look up and invoke the current implementation (operands: u32 signature key, u16 argc)
    Dispatch = 0xE0,
    /// Static call resolved through the target's executor table (operands: u32 type, u32 signature)
    InvokeDynamicStatic = 0xE1,
    /// Instance call resolved through the receiver's executor table (operands: u32 owner, u32 signature)
    InvokeDynamicVirtual = 0xE2,
    /// Read a baseline slot (operands: u32 owner name, u32 slot)
    GetFieldSlot = 0xE3,
    /// Write a baseline slot (operands: u32 owner name, u32 slot)
    PutFieldSlot = 0xE4,
    /// Read an extension field (operands: u32 owner name, u32 field name)
    GetExtField = 0xE5,
    /// Write an extension field (operands: u32 owner name, u32 field name)
    PutExtField = 0xE6,
    /// Create a closure through a capture site (operands: u32 site key, u8 count, u8 flags)
    MakeCaptured = 0xE7,
    /// Read a captured variable by host position (operands: u32 owner name, u32 position)
    GetCaptured = 0xE8,
    /// Read the enclosing instance of a closure (operands: u32 owner name, u32 field name)
    GetEnclosing = 0xE9,

    // ===== Closures (0xF0-0xFF) =====
    /// Create a closure host instance (operands: u32 host name, u8 count, u8 flags)
    MakeClosure = 0xF0,
}

/// Flags carried by `MakeClosure` / `MakeCaptured`
pub mod closure_flags {
    /// The closure captures the enclosing instance (pushed before the captured values)
    pub const CAPTURES_THIS: u8 = 1 << 0;
}

impl Opcode {
    /// Convert a byte to an opcode
    ///
    /// Returns `None` if the byte doesn't correspond to a valid opcode.
    pub fn from_u8(byte: u8) -> Option<Self> {
        use Opcode::*;
        let op = match byte {
            0x00 => Nop,
            0x01 => Pop,
            0x02 => Dup,
            0x03 => Swap,
            0x04 => ConstNull,
            0x05 => ConstTrue,
            0x06 => ConstFalse,
            0x07 => ConstI32,
            0x08 => ConstF64,
            0x09 => ConstStr,
            0x0A => ConstI64,
            0x10 => LoadLocal,
            0x11 => StoreLocal,
            0x20 => Iadd,
            0x21 => Isub,
            0x22 => Imul,
            0x23 => Idiv,
            0x24 => Imod,
            0x25 => Ineg,
            0x28 => Ladd,
            0x29 => Lsub,
            0x2A => Lmul,
            0x2B => Ldiv,
            0x2C => I2l,
            0x30 => Fadd,
            0x31 => Fsub,
            0x32 => Fmul,
            0x33 => Fdiv,
            0x50 => Ieq,
            0x51 => Ine,
            0x52 => Ilt,
            0x53 => Ile,
            0x54 => Igt,
            0x55 => Ige,
            0x58 => Not,
            0x90 => Jmp,
            0x91 => JmpIfFalse,
            0x92 => JmpIfTrue,
            0x93 => Return,
            0x94 => ReturnVoid,
            0xA0 => InvokeStatic,
            0xA1 => InvokeVirtual,
            0xA2 => InvokeClosure,
            0xB0 => New,
            0xB1 => GetField,
            0xB2 => PutField,
            0xE0 => Dispatch,
            0xE1 => InvokeDynamicStatic,
            0xE2 => InvokeDynamicVirtual,
            0xE3 => GetFieldSlot,
            0xE4 => PutFieldSlot,
            0xE5 => GetExtField,
            0xE6 => PutExtField,
            0xE7 => MakeCaptured,
            0xE8 => GetCaptured,
            0xE9 => GetEnclosing,
            0xF0 => MakeClosure,
            _ => return None,
        };
        Some(op)
    }

    /// Convert opcode to byte
    #[inline]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Get the mnemonic of the opcode
    pub fn name(self) -> &'static str {
        use Opcode::*;
        match self {
            Nop => "NOP",
            Pop => "POP",
            Dup => "DUP",
            Swap => "SWAP",
            ConstNull => "CONST_NULL",
            ConstTrue => "CONST_TRUE",
            ConstFalse => "CONST_FALSE",
            ConstI32 => "CONST_I32",
            ConstF64 => "CONST_F64",
            ConstStr => "CONST_STR",
            ConstI64 => "CONST_I64",
            LoadLocal => "LOAD_LOCAL",
            StoreLocal => "STORE_LOCAL",
            Iadd => "IADD",
            Isub => "ISUB",
            Imul => "IMUL",
            Idiv => "IDIV",
            Imod => "IMOD",
            Ineg => "INEG",
            Ladd => "LADD",
            Lsub => "LSUB",
            Lmul => "LMUL",
            Ldiv => "LDIV",
            I2l => "I2L",
            Fadd => "FADD",
            Fsub => "FSUB",
            Fmul => "FMUL",
            Fdiv => "FDIV",
            Ieq => "IEQ",
            Ine => "INE",
            Ilt => "ILT",
            Ile => "ILE",
            Igt => "IGT",
            Ige => "IGE",
            Not => "NOT",
            Jmp => "JMP",
            JmpIfFalse => "JMP_IF_FALSE",
            JmpIfTrue => "JMP_IF_TRUE",
            Return => "RETURN",
            ReturnVoid => "RETURN_VOID",
            InvokeStatic => "INVOKE_STATIC",
            InvokeVirtual => "INVOKE_VIRTUAL",
            InvokeClosure => "INVOKE_CLOSURE",
            New => "NEW",
            GetField => "GET_FIELD",
            PutField => "PUT_FIELD",
            Dispatch => "DISPATCH",
            InvokeDynamicStatic => "INVOKE_DYNAMIC_STATIC",
            InvokeDynamicVirtual => "INVOKE_DYNAMIC_VIRTUAL",
            GetFieldSlot => "GET_FIELD_SLOT",
            PutFieldSlot => "PUT_FIELD_SLOT",
            GetExtField => "GET_EXT_FIELD",
            PutExtField => "PUT_EXT_FIELD",
            MakeCaptured => "MAKE_CAPTURED",
            GetCaptured => "GET_CAPTURED",
            GetEnclosing => "GET_ENCLOSING",
            MakeClosure => "MAKE_CLOSURE",
        }
    }

    /// Number of operand bytes following the opcode byte
    pub fn operand_len(self) -> usize {
        use Opcode::*;
        match self {
            ConstI32 | ConstStr => 4,
            ConstF64 | ConstI64 => 8,
            LoadLocal | StoreLocal => 2,
            Jmp | JmpIfFalse | JmpIfTrue => 4,
            InvokeClosure | New => 4,
            InvokeStatic | InvokeVirtual | GetField | PutField => 8,
            Dispatch => 6,
            InvokeDynamicStatic | InvokeDynamicVirtual => 8,
            GetFieldSlot | PutFieldSlot | GetExtField | PutExtField => 8,
            GetCaptured | GetEnclosing => 8,
            MakeClosure | MakeCaptured => 6,
            _ => 0,
        }
    }

    /// Check if this opcode is a jump instruction
    pub fn is_jump(self) -> bool {
        matches!(self, Opcode::Jmp | Opcode::JmpIfFalse | Opcode::JmpIfTrue)
    }

    /// Check if this opcode invokes a method
    pub fn is_invoke(self) -> bool {
        matches!(
            self,
            Opcode::InvokeStatic
                | Opcode::InvokeVirtual
                | Opcode::InvokeClosure
                | Opcode::Dispatch
                | Opcode::InvokeDynamicStatic
                | Opcode::InvokeDynamicVirtual
        )
    }

    /// Check if this opcode is a return instruction
    pub fn is_return(self) -> bool {
        matches!(self, Opcode::Return | Opcode::ReturnVoid)
    }

    /// Check if this opcode ends a basic block without fallthrough
    pub fn is_terminator(self) -> bool {
        self.is_return() || self == Opcode::Jmp
    }

    /// Check if only the rewriter may emit this opcode
    pub fn is_engine_only(self) -> bool {
        (0xE0..=0xEF).contains(&self.to_u8())
    }
}
