//! Non-generic forwarding stubs for observed generic instantiations.
//!
//! The runtime dispatcher cannot redirect a call site that binds `Get<int>` to a generic
//! method definition in another module; it needs a concrete method to jump to. For every
//! instantiation the scanner saw in the base module, one static method is added to the
//! wrapper container:
//!
//! ```text
//! public static int __Gen_Wrapper__Get_0_0(int key)
//! {
//!     ldarg.0
//!     call   !!0 Game.Cache::Get<int32>(int32)
//!     ret
//! }
//! ```
//!
//! Instance methods get their receiver as an explicit first parameter: the object reference
//! for classes, a managed pointer (`ref S`) for value types. Instantiations the scan did not
//! observe get no wrapper and keep running the base module's code.

use crate::{
    assembly::InstructionAssembler,
    metadata::{
        method::{MethodAttributes, MethodBody},
        module::{MethodDefBuilder, Module},
        signatures::{MethodSignature, TypeSignature},
        token::Token,
    },
    patch::{
        collaborators::{WrapperBodyGenerator, WrapperRequest},
        generics::{GenericMethodRecord, OrdinalAllocator},
        PatchConfig,
    },
    Error, Result,
};

/// Name prefix of generated wrappers
pub const WRAPPER_PREFIX: &str = "__Gen_Wrapper__";

/// Name of the wrapper for instantiation `instantiation` of method `ordinal`
#[must_use]
pub fn wrapper_name(method: &str, ordinal: u32, instantiation: usize) -> String {
    format!("{WRAPPER_PREFIX}{method}_{ordinal}_{instantiation}")
}

/// Finds the wrapper container type in the patch module.
///
/// # Errors
/// Returns [`crate::Error::LookupMethodMissing`] if the patch module does not define it.
pub fn find_container(module: &Module, config: &PatchConfig) -> Result<Token> {
    module
        .find_type(&config.wrapper_type)
        .ok_or_else(|| Error::LookupMethodMissing(config.wrapper_type.clone()))
}

/// Wrapper generator emitting `ldarg.*; call <instantiation>; ret`
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardingWrapperGenerator;

impl ForwardingWrapperGenerator {
    /// The concrete method the wrapper calls, created in `patch` if needed
    fn callee(
        patch: &mut Module,
        method: Token,
        owner_is_generic: bool,
        request: &WrapperRequest<'_>,
    ) -> Result<(Token, MethodSignature)> {
        let row = patch.method(method).ok_or(Error::TokenNotFound(method))?;
        let name = row.name.clone();
        let signature = row.signature.clone();
        let method_is_generic = row.is_generic();
        let owner = patch.type_def_signature(row.declaring_type);

        let mut callee = method;
        if owner_is_generic {
            let instance = patch.add_type_spec(TypeSignature::GenericInst(
                Box::new(owner),
                request.type_args.to_vec(),
            ));
            callee = patch.add_member_ref(instance, &name, signature.clone());
        }
        if method_is_generic {
            callee = patch.add_method_spec(callee, request.method_args.to_vec());
        }
        Ok((callee, signature))
    }
}

impl WrapperBodyGenerator for ForwardingWrapperGenerator {
    fn generate(&self, patch: &mut Module, request: &WrapperRequest<'_>) -> Result<Token> {
        let row = patch
            .method(request.method)
            .ok_or(Error::TokenNotFound(request.method))?;
        let owner = patch
            .type_def(row.declaring_type)
            .ok_or(Error::TokenNotFound(row.declaring_type))?;
        let method_name = row.name.clone();
        let full_name = patch.method_full_name(request.method)?;

        if owner.generic_params.len() != request.type_args.len()
            || row.generic_params.len() != request.method_args.len()
        {
            return Err(Error::GenericNotConcrete(format!(
                "{full_name} takes {} type and {} method arguments, got {} and {}",
                owner.generic_params.len(),
                row.generic_params.len(),
                request.type_args.len(),
                request.method_args.len()
            )));
        }
        if let Some(open) = request
            .type_args
            .iter()
            .chain(request.method_args)
            .find(|arg| !arg.is_concrete())
        {
            return Err(Error::GenericNotConcrete(format!(
                "{full_name} instantiated with {open:?}"
            )));
        }

        let owner_is_generic = !owner.generic_params.is_empty();
        let owner_signature = patch.type_def_signature(owner.token);
        let mut receiver = if owner_is_generic {
            TypeSignature::GenericInst(Box::new(owner_signature), request.type_args.to_vec())
        } else {
            owner_signature
        };
        if patch.is_value_type(owner.token) {
            receiver = TypeSignature::ByRef(Box::new(receiver));
        }

        let concrete = row
            .signature
            .substitute(request.type_args, request.method_args)?;
        let mut params = Vec::with_capacity(concrete.params.len() + 1);
        if concrete.has_this {
            params.push(receiver);
        }
        params.extend(concrete.params);
        let wrapper_signature = MethodSignature::new_static(concrete.return_type, params);

        let (callee, callee_signature) =
            Self::callee(patch, request.method, owner_is_generic, request)?;

        let mut asm = InstructionAssembler::new();
        for slot in 0..callee_signature.argument_slots() {
            asm.ldarg(slot)?;
        }
        asm.call(callee, &callee_signature)?.ret()?;
        let (instructions, max_stack) = asm.finish()?;

        MethodDefBuilder::new(&wrapper_name(
            &method_name,
            request.ordinal,
            request.instantiation,
        ))
        .flags(MethodAttributes::PUBLIC | MethodAttributes::STATIC | MethodAttributes::HIDE_BY_SIG)
        .signature(wrapper_signature)
        .body(MethodBody::new(instructions, max_stack))
        .build(patch, request.container)
    }
}

/// Assigns ordinals and generates one wrapper per recorded instantiation.
///
/// Records without instantiations are left alone and consume no ordinal. Returns the number
/// of wrappers generated.
///
/// # Errors
/// Returns [`crate::Error::LookupMethodMissing`] if the container type is absent and
/// propagates failures of `generator`.
pub fn generate_wrappers(
    patch: &mut Module,
    records: &mut [GenericMethodRecord],
    config: &PatchConfig,
    ordinals: &mut OrdinalAllocator,
    generator: &dyn WrapperBodyGenerator,
) -> Result<usize> {
    if records.iter().all(|record| record.instantiations.is_empty()) {
        return Ok(0);
    }
    let container = find_container(patch, config)?;

    let mut generated = 0;
    for record in records
        .iter_mut()
        .filter(|record| !record.instantiations.is_empty())
    {
        let ordinal = ordinals.allocate();
        record.ordinal = Some(ordinal);

        for (position, instantiation) in record.instantiations.iter_mut().enumerate() {
            let request = WrapperRequest {
                container,
                method: record.method,
                ordinal,
                instantiation: position,
                type_args: &instantiation.type_args,
                method_args: &instantiation.method_args,
            };
            let wrapper = generator.generate(patch, &request)?;
            instantiation.wrapper = Some(wrapper);
            generated += 1;
        }

        log::debug!(
            "Generated {} wrappers for {} (ordinal {})",
            record.instantiations.len(),
            record.method,
            ordinal
        );
    }
    Ok(generated)
}
