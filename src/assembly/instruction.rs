//! CIL instruction representation.
//!
//! Instructions are kept in a structured form rather than as raw bytes: branch operands name
//! the index of the target instruction and debug sequence points travel with the instruction
//! they describe. Inserting or prepending instructions therefore never invalidates targets or
//! source mappings; concrete byte offsets only exist once a body is encoded.

use strum::IntoStaticStr;

use crate::metadata::{sequencepoints::SequencePoint, token::Token};

/// Control flow behaviour of an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Falls through to the next instruction
    Sequential,
    /// Branches or falls through
    ConditionalBranch,
    /// Always branches
    UnconditionalBranch,
    /// Leaves a protected region, emptying the evaluation stack
    Leave,
    /// Calls a method and continues with the next instruction
    Call,
    /// Returns from the method
    Return,
    /// Throws an exception
    Throw,
    /// Ends a finally or fault handler
    EndFinally,
}

/// Encoded form of an instruction's inline operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    /// No operand
    None,
    /// Signed 8-bit immediate
    Int8,
    /// Unsigned 8-bit variable index
    UInt8,
    /// Unsigned 16-bit variable index
    UInt16,
    /// Signed 32-bit immediate
    Int32,
    /// Signed 64-bit immediate
    Int64,
    /// 64-bit floating point immediate
    Float64,
    /// Metadata token
    Token,
    /// 8-bit relative branch target
    ShortTarget,
    /// 32-bit relative branch target
    Target,
}

/// Number of stack slots an instruction pops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackPops {
    /// A fixed number of slots
    Fixed(u8),
    /// The arguments of the called method, including `this` if present
    Call,
    /// The constructor arguments, `this` is created by the instruction
    NewObj,
    /// One slot if the enclosing method returns a value
    Return,
    /// Every slot on the stack
    All,
}

/// Number of stack slots an instruction pushes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackPushes {
    /// A fixed number of slots
    Fixed(u8),
    /// One slot if the called method returns a value
    Call,
}

/// Static description of an opcode
#[derive(Debug, Clone, Copy)]
pub struct OpCodeInfo {
    /// Encoded opcode bytes (one, or two for the `0xFE` prefixed page)
    pub bytes: &'static [u8],
    /// Inline operand encoding
    pub operand: OperandType,
    /// Stack slots consumed
    pub pops: StackPops,
    /// Stack slots produced
    pub pushes: StackPushes,
    /// Control flow behaviour
    pub flow: FlowType,
}

impl OpCodeInfo {
    const fn new(
        bytes: &'static [u8],
        operand: OperandType,
        pops: StackPops,
        pushes: StackPushes,
        flow: FlowType,
    ) -> Self {
        OpCodeInfo {
            bytes,
            operand,
            pops,
            pushes,
            flow,
        }
    }

    /// Encoded size of the opcode and its operand
    #[must_use]
    pub fn size(&self) -> usize {
        self.bytes.len()
            + match self.operand {
                OperandType::None => 0,
                OperandType::Int8 | OperandType::UInt8 | OperandType::ShortTarget => 1,
                OperandType::UInt16 => 2,
                OperandType::Int32 | OperandType::Token | OperandType::Target => 4,
                OperandType::Int64 | OperandType::Float64 => 8,
            }
    }
}

/// The CIL opcodes this crate emits or rewrites
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
pub enum OpCode {
    #[strum(serialize = "nop")]
    Nop,
    #[strum(serialize = "ldarg.0")]
    Ldarg0,
    #[strum(serialize = "ldarg.1")]
    Ldarg1,
    #[strum(serialize = "ldarg.2")]
    Ldarg2,
    #[strum(serialize = "ldarg.3")]
    Ldarg3,
    #[strum(serialize = "ldarg.s")]
    LdargS,
    #[strum(serialize = "ldarg")]
    Ldarg,
    #[strum(serialize = "ldloc.0")]
    Ldloc0,
    #[strum(serialize = "ldloc.1")]
    Ldloc1,
    #[strum(serialize = "ldloc.s")]
    LdlocS,
    #[strum(serialize = "stloc.0")]
    Stloc0,
    #[strum(serialize = "stloc.1")]
    Stloc1,
    #[strum(serialize = "stloc.s")]
    StlocS,
    #[strum(serialize = "ldnull")]
    Ldnull,
    #[strum(serialize = "ldc.i4.0")]
    LdcI4_0,
    #[strum(serialize = "ldc.i4.1")]
    LdcI4_1,
    #[strum(serialize = "ldc.i4.s")]
    LdcI4S,
    #[strum(serialize = "ldc.i4")]
    LdcI4,
    #[strum(serialize = "ldc.i8")]
    LdcI8,
    #[strum(serialize = "ldc.r8")]
    LdcR8,
    #[strum(serialize = "dup")]
    Dup,
    #[strum(serialize = "pop")]
    Pop,
    #[strum(serialize = "call")]
    Call,
    #[strum(serialize = "ret")]
    Ret,
    #[strum(serialize = "br.s")]
    BrS,
    #[strum(serialize = "brfalse.s")]
    BrfalseS,
    #[strum(serialize = "brtrue.s")]
    BrtrueS,
    #[strum(serialize = "br")]
    Br,
    #[strum(serialize = "brfalse")]
    Brfalse,
    #[strum(serialize = "brtrue")]
    Brtrue,
    #[strum(serialize = "add")]
    Add,
    #[strum(serialize = "callvirt")]
    Callvirt,
    #[strum(serialize = "ldstr")]
    Ldstr,
    #[strum(serialize = "newobj")]
    Newobj,
    #[strum(serialize = "castclass")]
    Castclass,
    #[strum(serialize = "throw")]
    Throw,
    #[strum(serialize = "ldfld")]
    Ldfld,
    #[strum(serialize = "stfld")]
    Stfld,
    #[strum(serialize = "ldsfld")]
    Ldsfld,
    #[strum(serialize = "stsfld")]
    Stsfld,
    #[strum(serialize = "box")]
    Box,
    #[strum(serialize = "ldtoken")]
    Ldtoken,
    #[strum(serialize = "endfinally")]
    Endfinally,
    #[strum(serialize = "leave")]
    Leave,
    #[strum(serialize = "leave.s")]
    LeaveS,
    #[strum(serialize = "ceq")]
    Ceq,
}

impl OpCode {
    /// Static description of this opcode
    #[must_use]
    #[rustfmt::skip]
    pub fn info(self) -> OpCodeInfo {
        use FlowType as F;
        use OperandType as O;
        use StackPops as P;
        use StackPushes as S;

        match self {
            OpCode::Nop => OpCodeInfo::new(&[0x00], O::None, P::Fixed(0), S::Fixed(0), F::Sequential),
            OpCode::Ldarg0 => OpCodeInfo::new(&[0x02], O::None, P::Fixed(0), S::Fixed(1), F::Sequential),
            OpCode::Ldarg1 => OpCodeInfo::new(&[0x03], O::None, P::Fixed(0), S::Fixed(1), F::Sequential),
            OpCode::Ldarg2 => OpCodeInfo::new(&[0x04], O::None, P::Fixed(0), S::Fixed(1), F::Sequential),
            OpCode::Ldarg3 => OpCodeInfo::new(&[0x05], O::None, P::Fixed(0), S::Fixed(1), F::Sequential),
            OpCode::Ldloc0 => OpCodeInfo::new(&[0x06], O::None, P::Fixed(0), S::Fixed(1), F::Sequential),
            OpCode::Ldloc1 => OpCodeInfo::new(&[0x07], O::None, P::Fixed(0), S::Fixed(1), F::Sequential),
            OpCode::Stloc0 => OpCodeInfo::new(&[0x0A], O::None, P::Fixed(1), S::Fixed(0), F::Sequential),
            OpCode::Stloc1 => OpCodeInfo::new(&[0x0B], O::None, P::Fixed(1), S::Fixed(0), F::Sequential),
            OpCode::LdargS => OpCodeInfo::new(&[0x0E], O::UInt8, P::Fixed(0), S::Fixed(1), F::Sequential),
            OpCode::LdlocS => OpCodeInfo::new(&[0x11], O::UInt8, P::Fixed(0), S::Fixed(1), F::Sequential),
            OpCode::StlocS => OpCodeInfo::new(&[0x13], O::UInt8, P::Fixed(1), S::Fixed(0), F::Sequential),
            OpCode::Ldnull => OpCodeInfo::new(&[0x14], O::None, P::Fixed(0), S::Fixed(1), F::Sequential),
            OpCode::LdcI4_0 => OpCodeInfo::new(&[0x16], O::None, P::Fixed(0), S::Fixed(1), F::Sequential),
            OpCode::LdcI4_1 => OpCodeInfo::new(&[0x17], O::None, P::Fixed(0), S::Fixed(1), F::Sequential),
            OpCode::LdcI4S => OpCodeInfo::new(&[0x1F], O::Int8, P::Fixed(0), S::Fixed(1), F::Sequential),
            OpCode::LdcI4 => OpCodeInfo::new(&[0x20], O::Int32, P::Fixed(0), S::Fixed(1), F::Sequential),
            OpCode::LdcI8 => OpCodeInfo::new(&[0x21], O::Int64, P::Fixed(0), S::Fixed(1), F::Sequential),
            OpCode::LdcR8 => OpCodeInfo::new(&[0x23], O::Float64, P::Fixed(0), S::Fixed(1), F::Sequential),
            OpCode::Dup => OpCodeInfo::new(&[0x25], O::None, P::Fixed(1), S::Fixed(2), F::Sequential),
            OpCode::Pop => OpCodeInfo::new(&[0x26], O::None, P::Fixed(1), S::Fixed(0), F::Sequential),
            OpCode::Call => OpCodeInfo::new(&[0x28], O::Token, P::Call, S::Call, F::Call),
            OpCode::Ret => OpCodeInfo::new(&[0x2A], O::None, P::Return, S::Fixed(0), F::Return),
            OpCode::BrS => OpCodeInfo::new(&[0x2B], O::ShortTarget, P::Fixed(0), S::Fixed(0), F::UnconditionalBranch),
            OpCode::BrfalseS => OpCodeInfo::new(&[0x2C], O::ShortTarget, P::Fixed(1), S::Fixed(0), F::ConditionalBranch),
            OpCode::BrtrueS => OpCodeInfo::new(&[0x2D], O::ShortTarget, P::Fixed(1), S::Fixed(0), F::ConditionalBranch),
            OpCode::Br => OpCodeInfo::new(&[0x38], O::Target, P::Fixed(0), S::Fixed(0), F::UnconditionalBranch),
            OpCode::Brfalse => OpCodeInfo::new(&[0x39], O::Target, P::Fixed(1), S::Fixed(0), F::ConditionalBranch),
            OpCode::Brtrue => OpCodeInfo::new(&[0x3A], O::Target, P::Fixed(1), S::Fixed(0), F::ConditionalBranch),
            OpCode::Add => OpCodeInfo::new(&[0x58], O::None, P::Fixed(2), S::Fixed(1), F::Sequential),
            OpCode::Callvirt => OpCodeInfo::new(&[0x6F], O::Token, P::Call, S::Call, F::Call),
            OpCode::Ldstr => OpCodeInfo::new(&[0x72], O::Token, P::Fixed(0), S::Fixed(1), F::Sequential),
            OpCode::Newobj => OpCodeInfo::new(&[0x73], O::Token, P::NewObj, S::Fixed(1), F::Call),
            OpCode::Castclass => OpCodeInfo::new(&[0x74], O::Token, P::Fixed(1), S::Fixed(1), F::Sequential),
            OpCode::Throw => OpCodeInfo::new(&[0x7A], O::None, P::Fixed(1), S::Fixed(0), F::Throw),
            OpCode::Ldfld => OpCodeInfo::new(&[0x7B], O::Token, P::Fixed(1), S::Fixed(1), F::Sequential),
            OpCode::Stfld => OpCodeInfo::new(&[0x7D], O::Token, P::Fixed(2), S::Fixed(0), F::Sequential),
            OpCode::Ldsfld => OpCodeInfo::new(&[0x7E], O::Token, P::Fixed(0), S::Fixed(1), F::Sequential),
            OpCode::Stsfld => OpCodeInfo::new(&[0x80], O::Token, P::Fixed(1), S::Fixed(0), F::Sequential),
            OpCode::Box => OpCodeInfo::new(&[0x8C], O::Token, P::Fixed(1), S::Fixed(1), F::Sequential),
            OpCode::Ldtoken => OpCodeInfo::new(&[0xD0], O::Token, P::Fixed(0), S::Fixed(1), F::Sequential),
            OpCode::Endfinally => OpCodeInfo::new(&[0xDC], O::None, P::All, S::Fixed(0), F::EndFinally),
            OpCode::Leave => OpCodeInfo::new(&[0xDD], O::Target, P::All, S::Fixed(0), F::Leave),
            OpCode::LeaveS => OpCodeInfo::new(&[0xDE], O::ShortTarget, P::All, S::Fixed(0), F::Leave),
            OpCode::Ceq => OpCodeInfo::new(&[0xFE, 0x01], O::None, P::Fixed(2), S::Fixed(1), F::Sequential),
            OpCode::Ldarg => OpCodeInfo::new(&[0xFE, 0x09], O::UInt16, P::Fixed(0), S::Fixed(1), F::Sequential),
        }
    }

    /// The assembler mnemonic, e.g. `ldarg.0`
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        self.into()
    }
}

/// Immediate operand values
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Immediate {
    /// Signed 8-bit
    Int8(i8),
    /// Signed 32-bit
    Int32(i32),
    /// Signed 64-bit
    Int64(i64),
    /// 64-bit floating point
    Float64(f64),
}

/// Inline operand of an instruction
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    /// No operand
    None,
    /// An immediate value
    Immediate(Immediate),
    /// A metadata or user-string token
    Token(Token),
    /// Index of the branch target instruction within the same body
    Target(usize),
    /// Argument or local variable index
    Variable(u16),
}

/// A single CIL instruction
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// The opcode
    pub opcode: OpCode,
    /// Inline operand
    pub operand: Operand,
    /// Source location of this instruction, if it starts a sequence point
    pub sequence_point: Option<SequencePoint>,
}

impl Instruction {
    /// An instruction without operand
    #[must_use]
    pub fn new(opcode: OpCode) -> Self {
        Instruction {
            opcode,
            operand: Operand::None,
            sequence_point: None,
        }
    }

    /// An instruction with a token operand
    #[must_use]
    pub fn with_token(opcode: OpCode, token: Token) -> Self {
        Instruction {
            opcode,
            operand: Operand::Token(token),
            sequence_point: None,
        }
    }

    /// A branch to the instruction at `target`
    #[must_use]
    pub fn branch(opcode: OpCode, target: usize) -> Self {
        Instruction {
            opcode,
            operand: Operand::Target(target),
            sequence_point: None,
        }
    }

    /// An instruction with an immediate operand
    #[must_use]
    pub fn with_immediate(opcode: OpCode, value: Immediate) -> Self {
        Instruction {
            opcode,
            operand: Operand::Immediate(value),
            sequence_point: None,
        }
    }

    /// An instruction with an argument or local index operand
    #[must_use]
    pub fn with_variable(opcode: OpCode, index: u16) -> Self {
        Instruction {
            opcode,
            operand: Operand::Variable(index),
            sequence_point: None,
        }
    }

    /// Attaches a sequence point
    #[must_use]
    pub fn at(mut self, sequence_point: SequencePoint) -> Self {
        self.sequence_point = Some(sequence_point);
        self
    }

    /// Static description of the opcode
    #[must_use]
    pub fn info(&self) -> OpCodeInfo {
        self.opcode.info()
    }

    /// Branch target index, if this is a branch
    #[must_use]
    pub fn target(&self) -> Option<usize> {
        match self.operand {
            Operand::Target(target) => Some(target),
            _ => None,
        }
    }

    /// Token operand, if any
    #[must_use]
    pub fn token(&self) -> Option<Token> {
        match self.operand {
            Operand::Token(token) => Some(token),
            _ => None,
        }
    }
}
