//! CIL method bodies.
//!
//! A [`MethodBody`] owns its instructions, exception handlers, declared maximum stack depth
//! and local variable signature. It is encoded as described in ECMA-335 II.25.4:
//!
//! - **Tiny** header (1 byte) for bodies under 64 bytes with `max_stack <= 8`, no locals and
//!   no exception handlers
//! - **Fat** header (12 bytes) for everything else, followed by a 4-byte aligned fat
//!   exception-handling section when handlers exist

use crate::{
    assembly::{EncodedCode, Instruction, InstructionEncoder},
    metadata::{
        method::{encode_exception_handlers, ExceptionHandler, MethodBodyFlags},
        token::Token,
    },
    utils::align_to_4,
    Error, Result,
};

/// A method body
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MethodBody {
    /// Instruction sequence
    pub instructions: Vec<Instruction>,
    /// Exception handlers, ranges are instruction indices
    pub exception_handlers: Vec<ExceptionHandler>,
    /// Declared maximum evaluation stack depth
    pub max_stack: u16,
    /// Zero-initialize local variables
    pub init_locals: bool,
    /// `StandAloneSig` token of the local variable signature
    pub local_var_sig: Option<Token>,
}

/// An encoded body together with its instruction offsets
#[derive(Debug, Clone)]
pub struct EncodedBody {
    /// Header, code and exception sections
    pub bytes: Vec<u8>,
    /// The encoded code, offsets relative to the first instruction
    pub code: EncodedCode,
}

impl MethodBody {
    /// A body with the given instructions and declared stack depth
    #[must_use]
    pub fn new(instructions: Vec<Instruction>, max_stack: u16) -> Self {
        MethodBody {
            instructions,
            exception_handlers: Vec::new(),
            max_stack,
            init_locals: false,
            local_var_sig: None,
        }
    }

    /// Inserts `instruction` at `index`, keeping every existing instruction's identity.
    ///
    /// Branch targets and handler ranges that referenced an instruction at or after `index`
    /// are moved along with it.
    ///
    /// # Errors
    /// Returns [`crate::Error::UndefinedBranchTarget`] if `index` is past the end of the body.
    pub fn insert(&mut self, index: usize, instruction: Instruction) -> Result<()> {
        if index > self.instructions.len() {
            return Err(Error::UndefinedBranchTarget {
                target: index,
                len: self.instructions.len(),
            });
        }

        for existing in &mut self.instructions {
            if let crate::assembly::Operand::Target(target) = &mut existing.operand {
                if *target >= index {
                    *target += 1;
                }
            }
        }
        for handler in &mut self.exception_handlers {
            handler.shift_for_insert(index);
        }

        self.instructions.insert(index, instruction);
        Ok(())
    }

    /// Checks that every branch target and handler range lies inside the body.
    ///
    /// # Errors
    /// Returns [`crate::Error::UndefinedBranchTarget`] for the first violation found.
    pub fn validate_targets(&self) -> Result<()> {
        let len = self.instructions.len();
        for instruction in &self.instructions {
            if let Some(target) = instruction.target() {
                if target >= len {
                    return Err(Error::UndefinedBranchTarget { target, len });
                }
            }
        }
        for handler in &self.exception_handlers {
            let bounds = [
                handler.try_start,
                handler.try_end,
                handler.handler_start,
                handler.handler_end,
            ];
            if let Some(target) = bounds.into_iter().find(|bound| *bound > len) {
                return Err(Error::UndefinedBranchTarget { target, len });
            }
            if handler.try_start >= handler.try_end || handler.handler_start >= handler.handler_end
            {
                return Err(malformed_error!("Empty exception handler range - {:?}", handler));
            }
        }
        Ok(())
    }

    fn is_tiny(&self, code_size: usize) -> bool {
        code_size < 64
            && self.max_stack <= 8
            && self.local_var_sig.is_none()
            && self.exception_handlers.is_empty()
            && !self.init_locals
    }

    /// Encodes header, code and exception sections.
    ///
    /// # Errors
    /// Returns an error if the instructions or handlers cannot be encoded.
    pub fn encode(&self) -> Result<EncodedBody> {
        self.validate_targets()?;
        let code = InstructionEncoder::new(&self.instructions).encode()?;
        let code_size = code.code_size();

        let mut bytes = Vec::with_capacity(code_size + 12);
        if self.is_tiny(code_size) {
            #[allow(clippy::cast_possible_truncation)]
            bytes.push(((code_size as u8) << 2) | MethodBodyFlags::TINY_FORMAT.bits() as u8);
            bytes.extend_from_slice(&code.bytes);
            return Ok(EncodedBody { bytes, code });
        }

        let mut flags = MethodBodyFlags::FAT_FORMAT;
        if !self.exception_handlers.is_empty() {
            flags |= MethodBodyFlags::MORE_SECTS;
        }
        if self.init_locals {
            flags |= MethodBodyFlags::INIT_LOCALS;
        }
        // header size in dwords lives in the top nibble
        let header = flags.bits() | (3 << 12);
        let code_size_u32 = u32::try_from(code_size)
            .map_err(|_| malformed_error!("Method body size exceeds u32 range"))?;

        bytes.extend_from_slice(&header.to_le_bytes());
        bytes.extend_from_slice(&self.max_stack.to_le_bytes());
        bytes.extend_from_slice(&code_size_u32.to_le_bytes());
        bytes.extend_from_slice(&self.local_var_sig.map_or(0, |token| token.value()).to_le_bytes());
        bytes.extend_from_slice(&code.bytes);

        if !self.exception_handlers.is_empty() {
            bytes.resize(align_to_4(bytes.len()), 0);
            bytes.extend_from_slice(&encode_exception_handlers(&self.exception_handlers, &code)?);
        }

        Ok(EncodedBody { bytes, code })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::OpCode,
        metadata::{method::ExceptionHandlerFlags, sequencepoints::SequencePoint},
    };

    #[test]
    fn test_tiny() {
        let body = MethodBody::new(
            vec![Instruction::new(OpCode::Ldarg0), Instruction::new(OpCode::Ret)],
            1,
        );
        let encoded = body.encode().unwrap();
        assert_eq!(encoded.bytes, vec![0x0A, 0x02, 0x2A]);
    }

    #[test]
    fn test_fat() {
        let mut body = MethodBody::new(vec![Instruction::new(OpCode::Ret)], 16);
        body.init_locals = true;
        let encoded = body.encode().unwrap();
        assert_eq!(
            encoded.bytes,
            vec![0x13, 0x30, 0x10, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x2A]
        );
    }

    #[test]
    fn test_fat_with_exceptions() {
        let mut body = MethodBody::new(
            vec![
                Instruction::new(OpCode::Nop),
                Instruction::branch(OpCode::LeaveS, 4),
                Instruction::new(OpCode::Nop),
                Instruction::new(OpCode::Endfinally),
                Instruction::new(OpCode::Ret),
            ],
            0,
        );
        body.exception_handlers.push(ExceptionHandler {
            flags: ExceptionHandlerFlags::FINALLY,
            try_start: 0,
            try_end: 2,
            handler_start: 2,
            handler_end: 4,
            class_token: None,
            filter_start: None,
        });

        let encoded = body.encode().unwrap();
        // 12 header + 6 code, padded to 20, then 28 section bytes
        assert_eq!(encoded.bytes.len(), 48);
        assert_eq!(encoded.bytes[0] & 0x08, 0x08);
        assert_eq!(encoded.bytes[20], 0x41);
    }

    #[test]
    fn test_insert_keeps_targets() {
        let sp = SequencePoint::new(0, 10, 1, 10, 12);
        let mut body = MethodBody::new(
            vec![
                Instruction::new(OpCode::Ldarg0).at(sp),
                Instruction::branch(OpCode::BrtrueS, 3),
                Instruction::new(OpCode::Nop),
                Instruction::new(OpCode::Ret),
            ],
            1,
        );

        body.insert(0, Instruction::new(OpCode::Ret)).unwrap();
        assert_eq!(body.instructions.len(), 5);
        assert_eq!(body.instructions[0].opcode, OpCode::Ret);
        assert_eq!(body.instructions[1].sequence_point, Some(sp));
        assert_eq!(body.instructions[2].target(), Some(4));
        assert_eq!(body.instructions[4].opcode, OpCode::Ret);
        body.validate_targets().unwrap();
    }

    #[test]
    fn test_insert_out_of_range() {
        let mut body = MethodBody::new(vec![Instruction::new(OpCode::Ret)], 0);
        assert!(body.insert(2, Instruction::new(OpCode::Nop)).is_err());
    }
}
