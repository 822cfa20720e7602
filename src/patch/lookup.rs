//! The runtime lookup table.
//!
//! The wrapper container declares a static method returning
//! `Dictionary<MethodBase, MethodBase>`. Its body is replaced with straight-line code that
//! builds the table when the runtime calls it after loading the patch:
//!
//! ```text
//! newobj   instance void Dictionary`2<MethodBase, MethodBase>::.ctor()
//! dup
//! ldtoken  <base instantiation, imported>
//! ldtoken  <wrapper>
//! callvirt instance void Dictionary`2<MethodBase, MethodBase>::Add(!0, !1)
//! ...                     one dup/ldtoken/ldtoken/callvirt group per instantiation
//! ret
//! ```
//!
//! Entries appear in record order, then instantiation order.

use std::collections::HashSet;

use crate::{
    assembly::{InstructionAssembler, OpCode},
    metadata::{
        importer::Importer,
        method::MethodBody,
        module::Module,
        signatures::{MethodSignature, TypeSignature},
        token::Token,
    },
    patch::{generics::GenericMethodRecord, wrappers::find_container, PatchConfig},
    Error, Result,
};

/// One key/value pair of the lookup table, both in patch-module token space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LookupEntry {
    /// The base-module instantiation, imported into the patch module
    pub base: Token,
    /// The wrapper that replaces it
    pub wrapper: Token,
}

/// Finds the lookup-table method in the wrapper container.
///
/// # Errors
/// Returns [`crate::Error::LookupMethodMissing`] if the container or the method is absent.
pub fn find_lookup_method(module: &Module, config: &PatchConfig) -> Result<Token> {
    let container = find_container(module, config)?;
    module
        .find_method(container, &config.lookup_method)
        .ok_or_else(|| {
            Error::LookupMethodMissing(format!(
                "{}::{}",
                config.wrapper_type, config.lookup_method
            ))
        })
}

/// Replaces the body of the lookup-table method.
///
/// Base handles are imported from `base` into `patch`. Returns the emitted entries.
///
/// # Errors
/// Returns [`crate::Error::LookupMethodMissing`] if the method is absent or does not return
/// a two-argument generic instance, [`crate::Error::DuplicateInstantiation`] if two base
/// handles import to the same key and [`crate::Error::Malformed`] if an instantiation has no
/// wrapper.
pub fn emit_lookup_table(
    patch: &mut Module,
    base: &Module,
    records: &[GenericMethodRecord],
    config: &PatchConfig,
) -> Result<Vec<LookupEntry>> {
    let method = find_lookup_method(patch, config)?;
    let dictionary = patch
        .method(method)
        .ok_or(Error::TokenNotFound(method))?
        .signature
        .return_type
        .clone();
    let is_dictionary = matches!(
        &dictionary,
        TypeSignature::GenericInst(open, args)
            if matches!(**open, TypeSignature::Class(_)) && args.len() == 2
    );
    if !is_dictionary {
        return Err(Error::LookupMethodMissing(format!(
            "{}::{} returns {dictionary:?}",
            config.wrapper_type, config.lookup_method
        )));
    }

    let mut pending = Vec::new();
    for record in records {
        for (position, instantiation) in record.instantiations.iter().enumerate() {
            let wrapper = instantiation.wrapper.ok_or_else(|| {
                malformed_error!(
                    "Instantiation {} of {} has no wrapper",
                    position,
                    record.method
                )
            })?;
            pending.push((instantiation.base_method, wrapper));
        }
    }

    // keys are compared after import, where distinct base handles may collapse into one
    let mut importer = Importer::new(base, patch);
    let mut seen = HashSet::new();
    let mut entries = Vec::with_capacity(pending.len());
    for (base_method, wrapper) in pending {
        let key = importer.import_method(base_method)?;
        if !seen.insert(key) {
            return Err(Error::DuplicateInstantiation(base_method));
        }
        entries.push(LookupEntry { base: key, wrapper });
    }

    let dictionary = patch.add_type_spec(dictionary);
    let ctor_signature = MethodSignature::new_instance(TypeSignature::Void, vec![]);
    let add_signature = MethodSignature::new_instance(
        TypeSignature::Void,
        vec![
            TypeSignature::GenericParamType(0),
            TypeSignature::GenericParamType(1),
        ],
    );
    let ctor = patch.add_member_ref(dictionary, ".ctor", ctor_signature.clone());
    let add = patch.add_member_ref(dictionary, "Add", add_signature.clone());

    let mut asm = InstructionAssembler::new();
    asm.newobj(ctor, &ctor_signature)?;
    for entry in &entries {
        asm.dup()?
            .ldtoken(entry.base)?
            .ldtoken(entry.wrapper)?
            .callvirt(add, &add_signature)?;
    }
    asm.ret()?;
    let (instructions, max_stack) = asm.finish()?;

    let row = patch.method_mut(method).ok_or(Error::TokenNotFound(method))?;
    row.body = Some(MethodBody::new(instructions, max_stack));

    log::debug!(
        "Lookup table {} holds {} entries, max stack {}",
        method,
        entries.len(),
        max_stack
    );
    Ok(entries)
}

/// Reads the entries back from an emitted lookup-table body.
///
/// # Errors
/// Returns [`crate::Error::LookupMethodMissing`] if the method is absent and
/// [`crate::Error::Malformed`] if the body does not have the emitted shape.
pub fn read_lookup_table(module: &Module, config: &PatchConfig) -> Result<Vec<LookupEntry>> {
    let method = find_lookup_method(module, config)?;
    let body = module
        .method(method)
        .and_then(|row| row.body.as_ref())
        .ok_or_else(|| malformed_error!("Lookup table method has no body"))?;

    let instructions = &body.instructions;
    let shape_error = || malformed_error!("Unexpected lookup table body shape");
    let (first, rest) = instructions.split_first().ok_or_else(shape_error)?;
    let (last, groups) = rest.split_last().ok_or_else(shape_error)?;
    if first.opcode != OpCode::Newobj || last.opcode != OpCode::Ret || groups.len() % 4 != 0 {
        return Err(shape_error());
    }

    groups
        .chunks_exact(4)
        .map(|group| {
            let opcodes = [group[0].opcode, group[1].opcode, group[2].opcode, group[3].opcode];
            if opcodes != [OpCode::Dup, OpCode::Ldtoken, OpCode::Ldtoken, OpCode::Callvirt] {
                return Err(shape_error());
            }
            Ok(LookupEntry {
                base: group[1].token().ok_or_else(shape_error)?,
                wrapper: group[2].token().ok_or_else(shape_error)?,
            })
        })
        .collect()
}
