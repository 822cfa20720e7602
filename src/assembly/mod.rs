//! CIL instruction model, encoding and stack analysis.
//!
//! # Key Components
//!
//! - [`Instruction`], [`OpCode`], [`Operand`] - structured instructions whose branch operands
//!   name target instructions by index and which carry their own sequence points
//! - [`InstructionEncoder`] - two-pass encoder producing bytecode and instruction offsets
//! - [`InstructionAssembler`] - fluent builder for straight-line code that derives the
//!   maximum stack depth while emitting
//! - [`compute_max_stack`] - flow-sensitive stack depth analysis used to validate bodies
//!   before they are written

mod assembler;
mod encoder;
mod instruction;
mod stack;

pub use assembler::InstructionAssembler;
pub use encoder::{EncodedCode, InstructionEncoder};
pub use instruction::{
    FlowType, Immediate, Instruction, OpCode, OpCodeInfo, Operand, OperandType, StackPops,
    StackPushes,
};
pub use stack::{compute_max_stack, stack_effect, StackEffects};
