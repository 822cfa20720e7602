//! Signature blob encoders.
//!
//! Each encoder produces the ECMA-335 binary form of one signature kind, ready to be stored
//! in the blob heap:
//!
//! - [`encode_type_signature`] - a single `Type` production
//! - [`encode_method_signature`] - `MethodDefSig` / `MethodRefSig`
//! - [`encode_field_signature`] - `FieldSig`
//! - [`encode_typespec_signature`] - `TypeSpec` blobs
//! - [`encode_local_var_signature`] - `LocalVarSig` blobs of `StandAloneSig` rows
//! - [`encode_method_spec_signature`] - `MethodSpec` instantiation blobs

use crate::{
    metadata::{
        signatures::{MethodSignature, TypeSignature, CALLING_CONVENTION, SIGNATURE_HEADER},
        tables::TableId,
        token::Token,
        typesystem::ELEMENT_TYPE,
    },
    utils::write_compressed_uint,
    Result,
};

/// Encodes a token as a `TypeDefOrRef` coded index according to ECMA-335 §II.24.2.6.
///
/// - TypeDef (0x02): `(rid << 2) | 0`
/// - TypeRef (0x01): `(rid << 2) | 1`
/// - TypeSpec (0x1B): `(rid << 2) | 2`
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the token points into any other table.
pub fn encode_type_def_or_ref_coded_index(token: Token) -> Result<u32> {
    let rid = token.row();

    match token.table_id() {
        Some(TableId::TypeDef) => Ok(rid << 2),
        Some(TableId::TypeRef) => Ok((rid << 2) | 1),
        Some(TableId::TypeSpec) => Ok((rid << 2) | 2),
        _ => Err(malformed_error!(
            "Invalid token table 0x{:02X} for TypeDefOrRef coded index - {}",
            token.table(),
            token
        )),
    }
}

/// Appends the encoding of `signature` to `buffer`.
///
/// # Errors
/// Returns an error if a class or value-type token is not a valid `TypeDefOrRef` target.
pub fn encode_type_signature(signature: &TypeSignature, buffer: &mut Vec<u8>) -> Result<()> {
    match signature {
        TypeSignature::Void => buffer.push(ELEMENT_TYPE::VOID),
        TypeSignature::Boolean => buffer.push(ELEMENT_TYPE::BOOLEAN),
        TypeSignature::Char => buffer.push(ELEMENT_TYPE::CHAR),
        TypeSignature::I1 => buffer.push(ELEMENT_TYPE::I1),
        TypeSignature::U1 => buffer.push(ELEMENT_TYPE::U1),
        TypeSignature::I2 => buffer.push(ELEMENT_TYPE::I2),
        TypeSignature::U2 => buffer.push(ELEMENT_TYPE::U2),
        TypeSignature::I4 => buffer.push(ELEMENT_TYPE::I4),
        TypeSignature::U4 => buffer.push(ELEMENT_TYPE::U4),
        TypeSignature::I8 => buffer.push(ELEMENT_TYPE::I8),
        TypeSignature::U8 => buffer.push(ELEMENT_TYPE::U8),
        TypeSignature::R4 => buffer.push(ELEMENT_TYPE::R4),
        TypeSignature::R8 => buffer.push(ELEMENT_TYPE::R8),
        TypeSignature::String => buffer.push(ELEMENT_TYPE::STRING),
        TypeSignature::Object => buffer.push(ELEMENT_TYPE::OBJECT),
        TypeSignature::I => buffer.push(ELEMENT_TYPE::I),
        TypeSignature::U => buffer.push(ELEMENT_TYPE::U),
        TypeSignature::Class(token) => {
            buffer.push(ELEMENT_TYPE::CLASS);
            write_compressed_uint(encode_type_def_or_ref_coded_index(*token)?, buffer);
        }
        TypeSignature::ValueType(token) => {
            buffer.push(ELEMENT_TYPE::VALUETYPE);
            write_compressed_uint(encode_type_def_or_ref_coded_index(*token)?, buffer);
        }
        TypeSignature::GenericParamType(index) => {
            buffer.push(ELEMENT_TYPE::VAR);
            write_compressed_uint(*index, buffer);
        }
        TypeSignature::GenericParamMethod(index) => {
            buffer.push(ELEMENT_TYPE::MVAR);
            write_compressed_uint(*index, buffer);
        }
        TypeSignature::GenericInst(base, args) => {
            buffer.push(ELEMENT_TYPE::GENERICINST);
            match base.as_ref() {
                TypeSignature::Class(_) | TypeSignature::ValueType(_) => {
                    encode_type_signature(base, buffer)?;
                }
                other => {
                    return Err(malformed_error!(
                        "Generic instantiation over non-class type - {:?}",
                        other
                    ))
                }
            }
            write_compressed_uint(u32::try_from(args.len()).unwrap_or(u32::MAX), buffer);
            for arg in args {
                encode_type_signature(arg, buffer)?;
            }
        }
        TypeSignature::SzArray(inner) => {
            buffer.push(ELEMENT_TYPE::SZARRAY);
            encode_type_signature(inner, buffer)?;
        }
        TypeSignature::ByRef(inner) => {
            buffer.push(ELEMENT_TYPE::BYREF);
            encode_type_signature(inner, buffer)?;
        }
    }

    Ok(())
}

/// Encodes a method signature (ECMA-335 §II.23.2.1).
///
/// ```text
/// [HASTHIS] [GENERIC GenParamCount] ParamCount RetType Param*
/// ```
///
/// # Errors
/// Returns an error if any contained type cannot be encoded.
pub fn encode_method_signature(signature: &MethodSignature) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();

    let mut calling_convention = CALLING_CONVENTION::DEFAULT;
    if signature.has_this {
        calling_convention |= CALLING_CONVENTION::HASTHIS;
    }
    if signature.generic_param_count > 0 {
        calling_convention |= CALLING_CONVENTION::GENERIC;
    }
    buffer.push(calling_convention);

    if signature.generic_param_count > 0 {
        write_compressed_uint(signature.generic_param_count, &mut buffer);
    }

    write_compressed_uint(
        u32::try_from(signature.params.len()).unwrap_or(u32::MAX),
        &mut buffer,
    );
    encode_type_signature(&signature.return_type, &mut buffer)?;
    for param in &signature.params {
        encode_type_signature(param, &mut buffer)?;
    }

    Ok(buffer)
}

/// Encodes a field signature (ECMA-335 §II.23.2.4).
///
/// # Errors
/// Returns an error if the field type cannot be encoded.
pub fn encode_field_signature(field_type: &TypeSignature) -> Result<Vec<u8>> {
    let mut buffer = vec![SIGNATURE_HEADER::FIELD];
    encode_type_signature(field_type, &mut buffer)?;
    Ok(buffer)
}

/// Encodes a type specification blob (ECMA-335 §II.23.2.14).
///
/// # Errors
/// Returns an error if the type cannot be encoded.
pub fn encode_typespec_signature(signature: &TypeSignature) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    encode_type_signature(signature, &mut buffer)?;
    Ok(buffer)
}

/// Encodes a local variable signature (ECMA-335 §II.23.2.6).
///
/// ```text
/// 0x07 Count Type+
/// ```
///
/// # Errors
/// Returns an error if a local type cannot be encoded.
pub fn encode_local_var_signature(locals: &[TypeSignature]) -> Result<Vec<u8>> {
    let mut buffer = vec![SIGNATURE_HEADER::LOCAL_SIG];
    write_compressed_uint(u32::try_from(locals.len()).unwrap_or(u32::MAX), &mut buffer);
    for local in locals {
        encode_type_signature(local, &mut buffer)?;
    }
    Ok(buffer)
}

/// Encodes a method instantiation blob (ECMA-335 §II.23.2.15).
///
/// ```text
/// 0x0A GenArgCount Type+
/// ```
///
/// # Errors
/// Returns an error if the instantiation is empty or a type cannot be encoded.
pub fn encode_method_spec_signature(instantiation: &[TypeSignature]) -> Result<Vec<u8>> {
    if instantiation.is_empty() {
        return Err(malformed_error!("Method instantiation without arguments"));
    }

    let mut buffer = vec![SIGNATURE_HEADER::METHOD_SPEC];
    write_compressed_uint(
        u32::try_from(instantiation.len()).unwrap_or(u32::MAX),
        &mut buffer,
    );
    for arg in instantiation {
        encode_type_signature(arg, &mut buffer)?;
    }
    Ok(buffer)
}
