//! Evaluation stack depth analysis.
//!
//! [`compute_max_stack`] walks every reachable path through a method body, including
//! exception handler entries, and returns the deepest evaluation stack any instruction
//! observes. It is independent of [`crate::assembly::InstructionAssembler`]'s linear
//! bookkeeping, which is what makes it useful as a cross-check before a body is written.

use crate::{
    assembly::{FlowType, Instruction, StackPops, StackPushes},
    metadata::{method::MethodBody, signatures::MethodSignature, token::Token},
    Result,
};

/// Resolves the stack effect of call-like instructions.
///
/// Implemented by [`crate::metadata::module::Module`], which knows the signature behind
/// every `MethodDef`, `MemberRef` and `MethodSpec` token.
pub trait StackEffects {
    /// Signature of the method a `call`, `callvirt` or `newobj` operand refers to
    ///
    /// # Errors
    /// Returns [`crate::Error::TokenNotFound`] if the token does not resolve to a method.
    fn call_signature(&self, token: Token) -> Result<MethodSignature>;
}

/// Number of slots `instruction` pops and pushes, given the depth before it.
///
/// # Errors
/// Returns an error if a call target cannot be resolved.
pub fn stack_effect(
    instruction: &Instruction,
    depth: u16,
    returns_value: bool,
    effects: &dyn StackEffects,
) -> Result<(u16, u16)> {
    let info = instruction.info();

    let signature = match (info.pops, info.pushes) {
        (StackPops::Call | StackPops::NewObj, _) | (_, StackPushes::Call) => {
            let token = instruction.token().ok_or_else(|| {
                malformed_error!("{} without token operand", instruction.opcode.mnemonic())
            })?;
            Some(effects.call_signature(token)?)
        }
        _ => None,
    };

    let pops = match info.pops {
        StackPops::Fixed(count) => u16::from(count),
        StackPops::Call => signature.as_ref().map_or(0, MethodSignature::argument_slots),
        StackPops::NewObj => signature
            .as_ref()
            .map_or(0, |sig| u16::try_from(sig.params.len()).unwrap_or(u16::MAX)),
        StackPops::Return => u16::from(returns_value),
        StackPops::All => depth,
    };
    let pushes = match info.pushes {
        StackPushes::Fixed(count) => u16::from(count),
        StackPushes::Call => {
            u16::from(signature.as_ref().is_some_and(|sig| !sig.return_type.is_void()))
        }
    };

    Ok((pops, pushes))
}

/// Computes the maximum evaluation stack depth of `body`.
///
/// Handler blocks are entered with the exception object on the stack (catch and filter) or
/// with an empty stack (finally and fault).
///
/// # Errors
/// Returns [`crate::Error::Malformed`] on stack underflow, inconsistent depths at a join
/// point, a non-empty stack at `ret`, or control falling off the end of the body, and
/// [`crate::Error::UndefinedBranchTarget`] for branches outside the body.
pub fn compute_max_stack(
    body: &MethodBody,
    returns_value: bool,
    effects: &dyn StackEffects,
) -> Result<u16> {
    body.validate_targets()?;

    let instructions = &body.instructions;
    let mut depths: Vec<Option<u16>> = vec![None; instructions.len()];
    let mut worklist = Vec::new();
    let mut max_depth = 0u16;

    let enter = |index: usize,
                 depth: u16,
                 depths: &mut Vec<Option<u16>>,
                 worklist: &mut Vec<usize>|
     -> Result<()> {
        let slot = depths
            .get_mut(index)
            .ok_or_else(|| malformed_error!("Control flow falls off the end of the method body"))?;
        match *slot {
            Some(existing) if existing != depth => Err(malformed_error!(
                "Inconsistent stack depth at instruction {} - {} vs {}",
                index,
                existing,
                depth
            )),
            Some(_) => Ok(()),
            None => {
                *slot = Some(depth);
                worklist.push(index);
                Ok(())
            }
        }
    };

    if !instructions.is_empty() {
        enter(0, 0, &mut depths, &mut worklist)?;
    }
    for handler in &body.exception_handlers {
        enter(
            handler.handler_start,
            handler.handler_entry_depth(),
            &mut depths,
            &mut worklist,
        )?;
        if let Some(filter) = handler.filter_start {
            enter(filter, 1, &mut depths, &mut worklist)?;
        }
    }

    while let Some(index) = worklist.pop() {
        let instruction = &instructions[index];
        let depth = depths[index].unwrap_or(0);
        max_depth = max_depth.max(depth);

        let (pops, pushes) = stack_effect(instruction, depth, returns_value, effects)?;
        if pops > depth {
            return Err(malformed_error!(
                "Stack underflow at instruction {} ({}) - depth {}, pops {}",
                index,
                instruction.opcode.mnemonic(),
                depth,
                pops
            ));
        }
        let after = depth - pops + pushes;
        max_depth = max_depth.max(after);

        match instruction.info().flow {
            FlowType::Sequential | FlowType::Call => {
                enter(index + 1, after, &mut depths, &mut worklist)?;
            }
            FlowType::ConditionalBranch => {
                if let Some(target) = instruction.target() {
                    enter(target, after, &mut depths, &mut worklist)?;
                }
                enter(index + 1, after, &mut depths, &mut worklist)?;
            }
            FlowType::UnconditionalBranch | FlowType::Leave => {
                if let Some(target) = instruction.target() {
                    enter(target, after, &mut depths, &mut worklist)?;
                }
            }
            FlowType::Return => {
                if after != 0 {
                    return Err(malformed_error!(
                        "Stack not empty at return (instruction {}) - {} slots left",
                        index,
                        after
                    ));
                }
            }
            FlowType::Throw | FlowType::EndFinally => {}
        }
    }

    Ok(max_depth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{Immediate, OpCode},
        metadata::{
            method::{ExceptionHandler, ExceptionHandlerFlags},
            signatures::TypeSignature,
        },
        Error,
    };

    struct Signatures;

    impl StackEffects for Signatures {
        fn call_signature(&self, token: Token) -> Result<MethodSignature> {
            match token.value() {
                // instance void Add(!0, !1)
                0x0A000001 => Ok(MethodSignature::new_instance(
                    TypeSignature::Void,
                    vec![TypeSignature::GenericParamType(0), TypeSignature::GenericParamType(1)],
                )),
                // instance void .ctor()
                0x0A000002 => Ok(MethodSignature::new_instance(TypeSignature::Void, vec![])),
                // static int32 Get(int32)
                0x06000001 => Ok(MethodSignature::new_static(
                    TypeSignature::I4,
                    vec![TypeSignature::I4],
                )),
                _ => Err(Error::TokenNotFound(token)),
            }
        }
    }

    #[test]
    fn test_lookup_shape() {
        let mut instructions = vec![Instruction::with_token(OpCode::Newobj, Token::new(0x0A000002))];
        for _ in 0..2 {
            instructions.push(Instruction::new(OpCode::Dup));
            instructions.push(Instruction::with_token(OpCode::Ldtoken, Token::new(0x2B000001)));
            instructions.push(Instruction::with_token(OpCode::Ldtoken, Token::new(0x06000002)));
            instructions.push(Instruction::with_token(OpCode::Callvirt, Token::new(0x0A000001)));
        }
        instructions.push(Instruction::new(OpCode::Ret));

        let body = MethodBody::new(instructions, 0);
        assert_eq!(compute_max_stack(&body, true, &Signatures).unwrap(), 4);
    }

    #[test]
    fn test_branches_join() {
        // ldarg.0; brtrue.s 4; ldc.i4.0; br.s 5; ldc.i4.1; call Get; ret
        let body = MethodBody::new(
            vec![
                Instruction::new(OpCode::Ldarg0),
                Instruction::branch(OpCode::BrtrueS, 4),
                Instruction::new(OpCode::LdcI4_0),
                Instruction::branch(OpCode::BrS, 5),
                Instruction::new(OpCode::LdcI4_1),
                Instruction::with_token(OpCode::Call, Token::new(0x06000001)),
                Instruction::new(OpCode::Ret),
            ],
            0,
        );
        assert_eq!(compute_max_stack(&body, true, &Signatures).unwrap(), 1);
    }

    #[test]
    fn test_inconsistent_join() {
        // ldarg.0; brtrue.s 3; ldc.i4.0; ret
        let body = MethodBody::new(
            vec![
                Instruction::new(OpCode::Ldarg0),
                Instruction::branch(OpCode::BrtrueS, 3),
                Instruction::new(OpCode::LdcI4_0),
                Instruction::new(OpCode::Ret),
            ],
            0,
        );
        assert!(compute_max_stack(&body, true, &Signatures).is_err());
    }

    #[test]
    fn test_underflow() {
        let body = MethodBody::new(
            vec![Instruction::new(OpCode::Pop), Instruction::new(OpCode::Ret)],
            0,
        );
        assert!(compute_max_stack(&body, false, &Signatures).is_err());
    }

    #[test]
    fn test_prepended_ret_ignores_dead_code() {
        let body = MethodBody::new(
            vec![
                Instruction::new(OpCode::Ret),
                Instruction::with_immediate(OpCode::LdcI4S, Immediate::Int8(5)),
                Instruction::new(OpCode::Pop),
                Instruction::new(OpCode::Ret),
            ],
            1,
        );
        assert_eq!(compute_max_stack(&body, false, &Signatures).unwrap(), 0);
    }

    #[test]
    fn test_catch_handler_entry() {
        // try { nop; leave.s 5 } catch { pop; leave.s 5 } ret
        let mut body = MethodBody::new(
            vec![
                Instruction::new(OpCode::Nop),
                Instruction::branch(OpCode::LeaveS, 4),
                Instruction::new(OpCode::Pop),
                Instruction::branch(OpCode::LeaveS, 4),
                Instruction::new(OpCode::Ret),
            ],
            0,
        );
        body.exception_handlers.push(ExceptionHandler {
            flags: ExceptionHandlerFlags::EXCEPTION,
            try_start: 0,
            try_end: 2,
            handler_start: 2,
            handler_end: 4,
            class_token: Some(Token::new(0x01000009)),
            filter_start: None,
        });
        assert_eq!(compute_max_stack(&body, false, &Signatures).unwrap(), 1);
    }

    #[test]
    fn test_falls_off_end() {
        let body = MethodBody::new(vec![Instruction::new(OpCode::Nop)], 0);
        assert!(compute_max_stack(&body, false, &Signatures).is_err());
    }
}
