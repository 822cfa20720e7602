//! Custom attribute blob encoding (ECMA-335 II.23.3).
//!
//! ```text
//! Prolog(0x0001) FixedArg* NumNamed(u16) NamedArg*
//! NamedArg = FIELD|PROPERTY FieldOrPropType SerString FixedArg
//! ```
//!
//! Fixed arguments are only supported for parameterless constructors, which is all the
//! annotation shapes need; named arguments carry every value.

use crate::{
    metadata::customattributes::{
        CustomAttributeArgument, CustomAttributeValue, FieldOrPropType, SERIALIZATION_TYPE,
    },
    utils::write_ser_string,
    Result,
};

/// Encodes a custom attribute value into its blob form.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if fixed arguments are present or a named argument's
/// value does not match its declared type.
pub fn encode_custom_attribute_value(value: &CustomAttributeValue) -> Result<Vec<u8>> {
    if !value.fixed_args.is_empty() {
        return Err(malformed_error!(
            "Fixed custom attribute arguments are not supported - {} given",
            value.fixed_args.len()
        ));
    }

    let mut buffer = vec![0x01, 0x00];

    let count = u16::try_from(value.named_args.len())
        .map_err(|_| malformed_error!("Too many named arguments - {}", value.named_args.len()))?;
    buffer.extend_from_slice(&count.to_le_bytes());

    for named in &value.named_args {
        buffer.push(if named.is_field {
            SERIALIZATION_TYPE::FIELD
        } else {
            SERIALIZATION_TYPE::PROPERTY
        });
        encode_field_or_prop_type(&named.arg_type, &mut buffer);
        write_ser_string(Some(&named.name), &mut buffer);
        encode_argument(&named.arg_type, &named.value, &mut buffer)?;
    }

    Ok(buffer)
}

fn encode_field_or_prop_type(arg_type: &FieldOrPropType, buffer: &mut Vec<u8>) {
    match arg_type {
        FieldOrPropType::Boolean => buffer.push(SERIALIZATION_TYPE::BOOLEAN),
        FieldOrPropType::I4 => buffer.push(SERIALIZATION_TYPE::I4),
        FieldOrPropType::U4 => buffer.push(SERIALIZATION_TYPE::U4),
        FieldOrPropType::String => buffer.push(SERIALIZATION_TYPE::STRING),
        FieldOrPropType::Type => buffer.push(SERIALIZATION_TYPE::TYPE),
        FieldOrPropType::SzArray(inner) => {
            buffer.push(SERIALIZATION_TYPE::SZARRAY);
            encode_field_or_prop_type(inner, buffer);
        }
    }
}

fn encode_argument(
    arg_type: &FieldOrPropType,
    value: &CustomAttributeArgument,
    buffer: &mut Vec<u8>,
) -> Result<()> {
    match (arg_type, value) {
        (FieldOrPropType::Boolean, CustomAttributeArgument::Bool(flag)) => {
            buffer.push(u8::from(*flag));
        }
        (FieldOrPropType::I4, CustomAttributeArgument::I4(number)) => {
            buffer.extend_from_slice(&number.to_le_bytes());
        }
        (FieldOrPropType::U4, CustomAttributeArgument::U4(number)) => {
            buffer.extend_from_slice(&number.to_le_bytes());
        }
        (FieldOrPropType::String, CustomAttributeArgument::String(text)) => {
            write_ser_string(text.as_deref(), buffer);
        }
        (FieldOrPropType::Type, CustomAttributeArgument::Type(name)) => {
            write_ser_string(Some(name), buffer);
        }
        (FieldOrPropType::SzArray(inner), CustomAttributeArgument::Array(items)) => {
            let len = u32::try_from(items.len())
                .map_err(|_| malformed_error!("Array argument too long - {}", items.len()))?;
            buffer.extend_from_slice(&len.to_le_bytes());
            for item in items {
                encode_argument(inner, item, buffer)?;
            }
        }
        (expected, found) => {
            return Err(malformed_error!(
                "Argument {:?} does not match declared type {:?}",
                found,
                expected
            ))
        }
    }

    Ok(())
}
