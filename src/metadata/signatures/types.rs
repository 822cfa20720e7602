use crate::{metadata::token::Token, Error, Result};

/// A type as it appears in a signature blob.
///
/// Class and value-type references carry a `TypeDef`, `TypeRef` or `TypeSpec` token of the
/// module the signature belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum TypeSignature {
    #[default]
    /// void
    Void,
    /// bool
    Boolean,
    /// char
    Char,
    /// signed 8bit integer
    I1,
    /// unsigned 8bit integer
    U1,
    /// signed 16bit integer
    I2,
    /// unsigned 16bit integer
    U2,
    /// signed 32bit integer
    I4,
    /// unsigned 32bit integer
    U4,
    /// signed 64bit integer
    I8,
    /// unsigned 64bit integer
    U8,
    /// 32bit floating-point
    R4,
    /// 64bit floating-point
    R8,
    /// System.String
    String,
    /// System.Object
    Object,
    /// signed integer, sized to executing platform
    I,
    /// unsigned integer, sized to executing platform
    U,
    /// CIL Class
    Class(Token),
    /// CIL value-type
    ValueType(Token),
    /// Generic type parameter (`!n`)
    GenericParamType(u32),
    /// Generic method parameter (`!!n`)
    GenericParamMethod(u32),
    /// Generic type and its arguments
    GenericInst(Box<TypeSignature>, Vec<TypeSignature>),
    /// Single dimension array
    SzArray(Box<TypeSignature>),
    /// Type by reference
    ByRef(Box<TypeSignature>),
}

impl TypeSignature {
    /// True for `void`
    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self, TypeSignature::Void)
    }

    /// True if no generic parameter (`!n` or `!!n`) appears anywhere in this signature
    #[must_use]
    pub fn is_concrete(&self) -> bool {
        match self {
            TypeSignature::GenericParamType(_) | TypeSignature::GenericParamMethod(_) => false,
            TypeSignature::GenericInst(base, args) => {
                base.is_concrete() && args.iter().all(TypeSignature::is_concrete)
            }
            TypeSignature::SzArray(inner) | TypeSignature::ByRef(inner) => inner.is_concrete(),
            _ => true,
        }
    }

    /// Replaces generic parameters with concrete arguments.
    ///
    /// `!n` is taken from `type_args`, `!!n` from `method_args`.
    ///
    /// # Errors
    /// Returns [`crate::Error::GenericNotConcrete`] if a parameter index has no argument.
    pub fn substitute(
        &self,
        type_args: &[TypeSignature],
        method_args: &[TypeSignature],
    ) -> Result<TypeSignature> {
        Ok(match self {
            TypeSignature::GenericParamType(index) => type_args
                .get(*index as usize)
                .cloned()
                .ok_or_else(|| Error::GenericNotConcrete(format!("!{index}")))?,
            TypeSignature::GenericParamMethod(index) => method_args
                .get(*index as usize)
                .cloned()
                .ok_or_else(|| Error::GenericNotConcrete(format!("!!{index}")))?,
            TypeSignature::GenericInst(base, args) => TypeSignature::GenericInst(
                Box::new(base.substitute(type_args, method_args)?),
                args.iter()
                    .map(|arg| arg.substitute(type_args, method_args))
                    .collect::<Result<Vec<_>>>()?,
            ),
            TypeSignature::SzArray(inner) => {
                TypeSignature::SzArray(Box::new(inner.substitute(type_args, method_args)?))
            }
            TypeSignature::ByRef(inner) => {
                TypeSignature::ByRef(Box::new(inner.substitute(type_args, method_args)?))
            }
            other => other.clone(),
        })
    }
}

/// Method signature (`MethodDefSig` / `MethodRefSig`, ECMA-335 II.23.2.1)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct MethodSignature {
    /// Instance method, `this` is passed as hidden first argument
    pub has_this: bool,
    /// Number of generic parameters declared by the method itself
    pub generic_param_count: u32,
    /// Return type
    pub return_type: TypeSignature,
    /// Parameter types, not including `this`
    pub params: Vec<TypeSignature>,
}

impl MethodSignature {
    /// A static method signature
    #[must_use]
    pub fn new_static(return_type: TypeSignature, params: Vec<TypeSignature>) -> Self {
        MethodSignature {
            has_this: false,
            generic_param_count: 0,
            return_type,
            params,
        }
    }

    /// An instance method signature
    #[must_use]
    pub fn new_instance(return_type: TypeSignature, params: Vec<TypeSignature>) -> Self {
        MethodSignature {
            has_this: true,
            generic_param_count: 0,
            return_type,
            params,
        }
    }

    /// Number of stack slots consumed by a call, including `this`
    #[must_use]
    pub fn argument_slots(&self) -> u16 {
        let params = u16::try_from(self.params.len()).unwrap_or(u16::MAX);
        params.saturating_add(u16::from(self.has_this))
    }

    /// Replaces generic parameters in the return and parameter types.
    ///
    /// The result describes a non-generic method: `generic_param_count` is reset to zero.
    ///
    /// # Errors
    /// Returns [`crate::Error::GenericNotConcrete`] if a parameter index has no argument.
    pub fn substitute(
        &self,
        type_args: &[TypeSignature],
        method_args: &[TypeSignature],
    ) -> Result<MethodSignature> {
        Ok(MethodSignature {
            has_this: self.has_this,
            generic_param_count: 0,
            return_type: self.return_type.substitute(type_args, method_args)?,
            params: self
                .params
                .iter()
                .map(|param| param.substitute(type_args, method_args))
                .collect::<Result<Vec<_>>>()?,
        })
    }
}

#[allow(non_snake_case, dead_code, missing_docs)]
/// Calling convention bits of the first signature byte
pub mod CALLING_CONVENTION {
    pub const DEFAULT: u8 = 0x00;
    pub const GENERIC: u8 = 0x10;
    pub const HASTHIS: u8 = 0x20;
}

#[allow(non_snake_case, dead_code, missing_docs)]
/// Leading bytes of non-method signature blobs
pub mod SIGNATURE_HEADER {
    pub const FIELD: u8 = 0x06;
    pub const LOCAL_SIG: u8 = 0x07;
    pub const METHOD_SPEC: u8 = 0x0A;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute_nested() {
        let list = Token::new(0x01000003);
        let open = TypeSignature::GenericInst(
            Box::new(TypeSignature::Class(list)),
            vec![TypeSignature::SzArray(Box::new(
                TypeSignature::GenericParamMethod(0),
            ))],
        );

        let closed = open.substitute(&[], &[TypeSignature::String]).unwrap();
        assert_eq!(
            closed,
            TypeSignature::GenericInst(
                Box::new(TypeSignature::Class(list)),
                vec![TypeSignature::SzArray(Box::new(TypeSignature::String))],
            )
        );
        assert!(closed.is_concrete());
        assert!(!open.is_concrete());
    }

    #[test]
    fn test_substitute_missing_argument() {
        let sig = TypeSignature::GenericParamType(1);
        let result = sig.substitute(&[TypeSignature::I4], &[]);
        assert!(matches!(result, Err(Error::GenericNotConcrete(_))));
    }

    #[test]
    fn test_method_signature_substitute() {
        let sig = MethodSignature {
            has_this: true,
            generic_param_count: 1,
            return_type: TypeSignature::GenericParamMethod(0),
            params: vec![TypeSignature::I4, TypeSignature::GenericParamType(0)],
        };

        let closed = sig
            .substitute(&[TypeSignature::Boolean], &[TypeSignature::String])
            .unwrap();
        assert_eq!(closed.generic_param_count, 0);
        assert_eq!(closed.return_type, TypeSignature::String);
        assert_eq!(closed.params, vec![TypeSignature::I4, TypeSignature::Boolean]);
        assert_eq!(closed.argument_slots(), 3);
    }
}
