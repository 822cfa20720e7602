//! Fluent CIL assembler with stack tracking.
//!
//! [`InstructionAssembler`] builds straight-line instruction sequences and keeps track of
//! the evaluation stack while doing so, so the maximum depth of a generated body never has
//! to be written by hand. Call-like instructions take the callee's signature to know how
//! many slots they consume and produce.
//!
//! ```rust,no_run
//! use dotpatch::assembly::InstructionAssembler;
//! use dotpatch::metadata::{signatures::{MethodSignature, TypeSignature}, token::Token};
//!
//! let ctor = MethodSignature::new_instance(TypeSignature::Void, vec![]);
//! let mut asm = InstructionAssembler::new();
//! asm.newobj(Token::new(0x0A000001), &ctor)?.ret()?;
//! let (instructions, max_stack) = asm.finish()?;
//! assert_eq!(max_stack, 1);
//! # Ok::<(), dotpatch::Error>(())
//! ```

use crate::{
    assembly::{Instruction, OpCode},
    metadata::{signatures::MethodSignature, token::Token},
    Result,
};

/// Builder for branch-free instruction sequences
#[derive(Debug, Default)]
pub struct InstructionAssembler {
    instructions: Vec<Instruction>,
    depth: u16,
    max_depth: u16,
}

impl InstructionAssembler {
    /// Creates an empty assembler
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn emit(&mut self, instruction: Instruction, pops: u16, pushes: u16) -> Result<&mut Self> {
        if pops > self.depth {
            return Err(malformed_error!(
                "Stack underflow emitting {} - depth {}, pops {}",
                instruction.opcode.mnemonic(),
                self.depth,
                pops
            ));
        }
        self.depth = self.depth - pops + pushes;
        self.max_depth = self.max_depth.max(self.depth);
        self.instructions.push(instruction);
        Ok(self)
    }

    /// `nop`
    ///
    /// # Errors
    /// Never fails, returns `Result` for chaining.
    pub fn nop(&mut self) -> Result<&mut Self> {
        self.emit(Instruction::new(OpCode::Nop), 0, 0)
    }

    /// Loads argument `index`, using the shortest encoding
    ///
    /// # Errors
    /// Never fails, returns `Result` for chaining.
    pub fn ldarg(&mut self, index: u16) -> Result<&mut Self> {
        let instruction = match index {
            0 => Instruction::new(OpCode::Ldarg0),
            1 => Instruction::new(OpCode::Ldarg1),
            2 => Instruction::new(OpCode::Ldarg2),
            3 => Instruction::new(OpCode::Ldarg3),
            4..=255 => Instruction::with_variable(OpCode::LdargS, index),
            _ => Instruction::with_variable(OpCode::Ldarg, index),
        };
        self.emit(instruction, 0, 1)
    }

    /// `ldnull`
    ///
    /// # Errors
    /// Never fails, returns `Result` for chaining.
    pub fn ldnull(&mut self) -> Result<&mut Self> {
        self.emit(Instruction::new(OpCode::Ldnull), 0, 1)
    }

    /// `dup`
    ///
    /// # Errors
    /// Returns an error if the stack is empty.
    pub fn dup(&mut self) -> Result<&mut Self> {
        self.emit(Instruction::new(OpCode::Dup), 1, 2)
    }

    /// `pop`
    ///
    /// # Errors
    /// Returns an error if the stack is empty.
    pub fn pop(&mut self) -> Result<&mut Self> {
        self.emit(Instruction::new(OpCode::Pop), 1, 0)
    }

    /// `ldtoken` of a type, method or field handle
    ///
    /// # Errors
    /// Never fails, returns `Result` for chaining.
    pub fn ldtoken(&mut self, token: Token) -> Result<&mut Self> {
        self.emit(Instruction::with_token(OpCode::Ldtoken, token), 0, 1)
    }

    /// `ldstr` of a user string token
    ///
    /// # Errors
    /// Never fails, returns `Result` for chaining.
    pub fn ldstr(&mut self, token: Token) -> Result<&mut Self> {
        self.emit(Instruction::with_token(OpCode::Ldstr, token), 0, 1)
    }

    /// `call` of `method` with the given signature
    ///
    /// # Errors
    /// Returns an error if the stack holds fewer values than the call consumes.
    pub fn call(&mut self, method: Token, signature: &MethodSignature) -> Result<&mut Self> {
        self.emit(
            Instruction::with_token(OpCode::Call, method),
            signature.argument_slots(),
            u16::from(!signature.return_type.is_void()),
        )
    }

    /// `callvirt` of `method` with the given signature
    ///
    /// # Errors
    /// Returns an error if the stack holds fewer values than the call consumes.
    pub fn callvirt(&mut self, method: Token, signature: &MethodSignature) -> Result<&mut Self> {
        self.emit(
            Instruction::with_token(OpCode::Callvirt, method),
            signature.argument_slots(),
            u16::from(!signature.return_type.is_void()),
        )
    }

    /// `newobj` of the constructor `ctor`
    ///
    /// # Errors
    /// Returns an error if the stack holds fewer values than the constructor consumes.
    pub fn newobj(&mut self, ctor: Token, signature: &MethodSignature) -> Result<&mut Self> {
        self.emit(
            Instruction::with_token(OpCode::Newobj, ctor),
            u16::try_from(signature.params.len()).unwrap_or(u16::MAX),
            1,
        )
    }

    /// `ret`, returning the top of stack if one value is left
    ///
    /// # Errors
    /// Returns an error if more than one value is left on the stack.
    pub fn ret(&mut self) -> Result<&mut Self> {
        if self.depth > 1 {
            return Err(malformed_error!(
                "{} values left on the stack at ret",
                self.depth
            ));
        }
        let depth = self.depth;
        self.emit(Instruction::new(OpCode::Ret), depth, 0)
    }

    /// Current evaluation stack depth
    #[must_use]
    pub fn depth(&self) -> u16 {
        self.depth
    }

    /// Returns the instructions and the maximum stack depth they reach.
    ///
    /// # Errors
    /// Returns an error if nothing was emitted or the sequence does not end in `ret`.
    pub fn finish(self) -> Result<(Vec<Instruction>, u16)> {
        let last = self
            .instructions
            .last()
            .map(|instruction| instruction.opcode)
            .ok_or_else(|| malformed_error!("Empty instruction sequence"))?;
        if last != OpCode::Ret {
            return Err(malformed_error!(
                "Instruction sequence ends in {} instead of ret",
                last.mnemonic()
            ));
        }
        Ok((self.instructions, self.max_depth))
    }
}
