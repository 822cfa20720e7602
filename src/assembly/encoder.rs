//! CIL instruction encoding.
//!
//! [`InstructionEncoder`] turns a structured instruction list into CIL bytecode. Encoding
//! happens in two passes: the first assigns every instruction its byte offset, the second
//! writes opcodes and operands and resolves branch targets (instruction indices) into
//! relative byte displacements.

use crate::{
    assembly::{Immediate, Instruction, Operand, OperandType},
    Error, Result,
};

/// Encoded bytecode together with the offset of every instruction
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EncodedCode {
    /// CIL bytecode
    pub bytes: Vec<u8>,
    /// Byte offset of each instruction, in instruction order
    pub offsets: Vec<u32>,
}

impl EncodedCode {
    /// Byte offset of the instruction at `index`; `index == len` yields the code size
    #[must_use]
    pub fn offset_of(&self, index: usize) -> Option<u32> {
        if index == self.offsets.len() {
            u32::try_from(self.bytes.len()).ok()
        } else {
            self.offsets.get(index).copied()
        }
    }

    /// Size of the bytecode in bytes
    #[must_use]
    pub fn code_size(&self) -> usize {
        self.bytes.len()
    }
}

/// Encoder for structured instruction sequences
pub struct InstructionEncoder<'a> {
    instructions: &'a [Instruction],
}

impl<'a> InstructionEncoder<'a> {
    /// Creates an encoder over `instructions`
    #[must_use]
    pub fn new(instructions: &'a [Instruction]) -> Self {
        InstructionEncoder { instructions }
    }

    /// Computes the byte offset of every instruction without encoding.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the code exceeds the 32-bit offset range.
    pub fn offsets(&self) -> Result<Vec<u32>> {
        let mut offsets = Vec::with_capacity(self.instructions.len());
        let mut position: usize = 0;
        for instruction in self.instructions {
            offsets.push(
                u32::try_from(position)
                    .map_err(|_| malformed_error!("Method body exceeds u32 range"))?,
            );
            position += instruction.info().size();
        }
        Ok(offsets)
    }

    /// Encodes the instructions.
    ///
    /// # Errors
    /// Returns [`crate::Error::UndefinedBranchTarget`] for branches outside the body and
    /// [`crate::Error::Malformed`] for operands that do not match their opcode or short
    /// branches out of range.
    pub fn encode(&self) -> Result<EncodedCode> {
        let offsets = self.offsets()?;
        let mut bytes = Vec::new();

        for (index, instruction) in self.instructions.iter().enumerate() {
            let info = instruction.info();
            bytes.extend_from_slice(info.bytes);
            let next = i64::from(offsets[index]) + i64::try_from(info.size()).unwrap_or(i64::MAX);

            match (info.operand, instruction.operand) {
                (OperandType::None, Operand::None) => {}
                (OperandType::Int8, Operand::Immediate(Immediate::Int8(value))) => {
                    bytes.extend_from_slice(&value.to_le_bytes());
                }
                (OperandType::Int32, Operand::Immediate(Immediate::Int32(value))) => {
                    bytes.extend_from_slice(&value.to_le_bytes());
                }
                (OperandType::Int64, Operand::Immediate(Immediate::Int64(value))) => {
                    bytes.extend_from_slice(&value.to_le_bytes());
                }
                (OperandType::Float64, Operand::Immediate(Immediate::Float64(value))) => {
                    bytes.extend_from_slice(&value.to_le_bytes());
                }
                (OperandType::UInt8, Operand::Variable(variable)) => {
                    let short = u8::try_from(variable).map_err(|_| {
                        malformed_error!(
                            "Variable index {} does not fit {}",
                            variable,
                            instruction.opcode.mnemonic()
                        )
                    })?;
                    bytes.push(short);
                }
                (OperandType::UInt16, Operand::Variable(variable)) => {
                    bytes.extend_from_slice(&variable.to_le_bytes());
                }
                (OperandType::Token, Operand::Token(token)) => {
                    bytes.extend_from_slice(&token.value().to_le_bytes());
                }
                (OperandType::ShortTarget, Operand::Target(target)) => {
                    let delta = self.displacement(&offsets, target, next)?;
                    let short = i8::try_from(delta).map_err(|_| {
                        malformed_error!(
                            "Short branch at instruction {} cannot reach {} ({} bytes)",
                            index,
                            target,
                            delta
                        )
                    })?;
                    bytes.extend_from_slice(&short.to_le_bytes());
                }
                (OperandType::Target, Operand::Target(target)) => {
                    let delta = self.displacement(&offsets, target, next)?;
                    let long = i32::try_from(delta)
                        .map_err(|_| malformed_error!("Branch displacement {} too large", delta))?;
                    bytes.extend_from_slice(&long.to_le_bytes());
                }
                (expected, found) => {
                    return Err(malformed_error!(
                        "Operand {:?} does not match {} ({:?})",
                        found,
                        instruction.opcode.mnemonic(),
                        expected
                    ))
                }
            }
        }

        Ok(EncodedCode { bytes, offsets })
    }

    fn displacement(&self, offsets: &[u32], target: usize, next: i64) -> Result<i64> {
        let target_offset = offsets
            .get(target)
            .ok_or(Error::UndefinedBranchTarget {
                target,
                len: self.instructions.len(),
            })?;
        Ok(i64::from(*target_offset) - next)
    }
}
