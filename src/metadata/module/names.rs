//! Type naming: metadata full names and reflection names.
//!
//! Metadata full names separate nested types with `/` (`Game.Outer/Inner`). Reflection names,
//! which custom attribute `Type` arguments carry, use `+` for nesting, spell generic arguments
//! in brackets and assembly-qualify types that live outside the core library.

use crate::{
    metadata::{
        module::Module,
        signatures::TypeSignature,
        tables::{ResolutionScope, TableId},
        token::Token,
    },
    Error, Result,
};

const MAX_RECURSION_DEPTH: usize = 50;

const CORE_LIBRARIES: &[&str] = &[
    "mscorlib",
    "netstandard",
    "System.Private.CoreLib",
    "System.Runtime",
];

fn join_name(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}.{name}")
    }
}

impl Module {
    /// Metadata full name of a `TypeDef` or `TypeRef`
    ///
    /// # Errors
    /// Returns [`crate::Error::TokenNotFound`] if the token does not resolve.
    pub fn type_full_name(&self, token: Token) -> Result<String> {
        self.type_name_with(token, '/', 0).map(|(name, _)| name)
    }

    /// Whether the `TypeDef` behind `token` is a value type.
    ///
    /// A type is a value type when it extends `System.ValueType`, or `System.Enum` without
    /// being `System.Enum` itself. Anything that does not resolve counts as a class.
    #[must_use]
    pub fn is_value_type(&self, token: Token) -> bool {
        let Some(row) = self.type_def(token) else {
            return false;
        };
        let Some(base) = row.extends else {
            return false;
        };
        match self.type_full_name(base).as_deref() {
            Ok("System.ValueType") => true,
            Ok("System.Enum") => !(row.namespace == "System" && row.name == "Enum"),
            _ => false,
        }
    }

    /// `CLASS` or `VALUETYPE` signature of a `TypeDef`, whichever the type is
    #[must_use]
    pub fn type_def_signature(&self, token: Token) -> TypeSignature {
        if self.is_value_type(token) {
            TypeSignature::ValueType(token)
        } else {
            TypeSignature::Class(token)
        }
    }

    /// `Type::Method` display name of a `MethodDef`
    ///
    /// # Errors
    /// Returns [`crate::Error::TokenNotFound`] if the method or its owner does not resolve.
    pub fn method_full_name(&self, token: Token) -> Result<String> {
        let method = self.method(token).ok_or(Error::TokenNotFound(token))?;
        Ok(format!(
            "{}::{}",
            self.type_full_name(method.declaring_type)?,
            method.name
        ))
    }

    /// Reflection name of a signature, as used by custom attribute `Type` arguments
    ///
    /// # Errors
    /// Returns [`crate::Error::GenericNotConcrete`] if the signature contains a generic
    /// parameter and [`crate::Error::TokenNotFound`] for unresolved type tokens.
    pub fn reflection_name(&self, signature: &TypeSignature) -> Result<String> {
        self.reflection_name_at(signature, 0)
    }

    fn reflection_parts(
        &self,
        signature: &TypeSignature,
        depth: usize,
    ) -> Result<(String, Option<String>)> {
        if depth > MAX_RECURSION_DEPTH {
            return Err(Error::RecursionLimit(MAX_RECURSION_DEPTH));
        }

        let primitive = |name: &str| -> Result<(String, Option<String>)> {
            Ok((format!("System.{name}"), None))
        };
        match signature {
            TypeSignature::Void => primitive("Void"),
            TypeSignature::Boolean => primitive("Boolean"),
            TypeSignature::Char => primitive("Char"),
            TypeSignature::I1 => primitive("SByte"),
            TypeSignature::U1 => primitive("Byte"),
            TypeSignature::I2 => primitive("Int16"),
            TypeSignature::U2 => primitive("UInt16"),
            TypeSignature::I4 => primitive("Int32"),
            TypeSignature::U4 => primitive("UInt32"),
            TypeSignature::I8 => primitive("Int64"),
            TypeSignature::U8 => primitive("UInt64"),
            TypeSignature::R4 => primitive("Single"),
            TypeSignature::R8 => primitive("Double"),
            TypeSignature::String => primitive("String"),
            TypeSignature::Object => primitive("Object"),
            TypeSignature::I => primitive("IntPtr"),
            TypeSignature::U => primitive("UIntPtr"),
            TypeSignature::Class(token) | TypeSignature::ValueType(token) => {
                if token.is_table(TableId::TypeSpec) {
                    let spec = self.type_spec(*token).ok_or(Error::TokenNotFound(*token))?;
                    self.reflection_parts(&spec.signature, depth + 1)
                } else {
                    self.type_name_with(*token, '+', depth + 1)
                }
            }
            TypeSignature::GenericParamType(index) => {
                Err(Error::GenericNotConcrete(format!("!{index}")))
            }
            TypeSignature::GenericParamMethod(index) => {
                Err(Error::GenericNotConcrete(format!("!!{index}")))
            }
            TypeSignature::GenericInst(base, args) => {
                let (base_name, assembly) = self.reflection_parts(base, depth + 1)?;
                let args = args
                    .iter()
                    .map(|arg| {
                        self.reflection_name_at(arg, depth + 1)
                            .map(|name| format!("[{name}]"))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok((format!("{base_name}[{}]", args.join(",")), assembly))
            }
            TypeSignature::SzArray(inner) => {
                let (name, assembly) = self.reflection_parts(inner, depth + 1)?;
                Ok((format!("{name}[]"), assembly))
            }
            TypeSignature::ByRef(inner) => {
                let (name, assembly) = self.reflection_parts(inner, depth + 1)?;
                Ok((format!("{name}&"), assembly))
            }
        }
    }

    fn reflection_name_at(&self, signature: &TypeSignature, depth: usize) -> Result<String> {
        let (name, assembly) = self.reflection_parts(signature, depth)?;
        Ok(match assembly {
            Some(assembly) => format!("{name}, {assembly}"),
            None => name,
        })
    }

    /// Name of a `TypeDef` / `TypeRef` with `separator` between nesting levels, plus the
    /// assembly that has to qualify it (`None` for this module and the core library)
    fn type_name_with(
        &self,
        token: Token,
        separator: char,
        depth: usize,
    ) -> Result<(String, Option<String>)> {
        if depth > MAX_RECURSION_DEPTH {
            return Err(Error::RecursionLimit(MAX_RECURSION_DEPTH));
        }

        if let Some(row) = self.type_def(token) {
            return match row.enclosing {
                Some(enclosing) => {
                    let (outer, assembly) = self.type_name_with(enclosing, separator, depth + 1)?;
                    Ok((format!("{outer}{separator}{}", row.name), assembly))
                }
                None => Ok((join_name(&row.namespace, &row.name), None)),
            };
        }

        if let Some(row) = self.type_ref(token) {
            return match &row.scope {
                ResolutionScope::Nested(enclosing) => {
                    let (outer, assembly) =
                        self.type_name_with(*enclosing, separator, depth + 1)?;
                    Ok((format!("{outer}{separator}{}", row.name), assembly))
                }
                ResolutionScope::Assembly(assembly) => {
                    let qualifier = if CORE_LIBRARIES.contains(&assembly.as_str()) {
                        None
                    } else {
                        Some(assembly.clone())
                    };
                    Ok((join_name(&row.namespace, &row.name), qualifier))
                }
            };
        }

        Err(Error::TokenNotFound(token))
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        metadata::{
            module::TypeDefBuilder, signatures::TypeSignature, tables::ResolutionScope,
            typesystem::TypeAttributes,
        },
        test::empty_module,
        Error,
    };

    #[test]
    fn test_primitive_names() {
        let module = empty_module("Patch");
        assert_eq!(module.reflection_name(&TypeSignature::I4).unwrap(), "System.Int32");
        assert_eq!(module.reflection_name(&TypeSignature::String).unwrap(), "System.String");
        assert_eq!(
            module
                .reflection_name(&TypeSignature::SzArray(Box::new(TypeSignature::U1)))
                .unwrap(),
            "System.Byte[]"
        );
    }

    #[test]
    fn test_nested_definition_uses_plus() {
        let mut module = empty_module("Patch");
        let outer = TypeDefBuilder::new("Game", "Outer").build(&mut module).unwrap();
        let inner = TypeDefBuilder::new("", "Inner")
            .flags(TypeAttributes::NESTED_PUBLIC)
            .nested_in(outer)
            .build(&mut module)
            .unwrap();
        assert_eq!(
            module.reflection_name(&TypeSignature::Class(inner)).unwrap(),
            "Game.Outer+Inner"
        );
    }

    #[test]
    fn test_external_reference_is_qualified() {
        let mut module = empty_module("Patch");
        let list = module.add_type_ref(
            ResolutionScope::Assembly("mscorlib".to_string()),
            "System.Collections.Generic",
            "List`1",
        );
        let enemy = module.add_type_ref(
            ResolutionScope::Assembly("Assembly-CSharp".to_string()),
            "Game",
            "Enemy",
        );

        let sig = TypeSignature::GenericInst(
            Box::new(TypeSignature::Class(list)),
            vec![TypeSignature::Class(enemy)],
        );
        assert_eq!(
            module.reflection_name(&sig).unwrap(),
            "System.Collections.Generic.List`1[[Game.Enemy, Assembly-CSharp]]"
        );
        assert_eq!(
            module.reflection_name(&TypeSignature::ValueType(enemy)).unwrap(),
            "Game.Enemy, Assembly-CSharp"
        );
    }

    #[test]
    fn test_open_generic_rejected() {
        let module = empty_module("Patch");
        assert!(matches!(
            module.reflection_name(&TypeSignature::GenericParamMethod(0)),
            Err(Error::GenericNotConcrete(_))
        ));
    }
}
