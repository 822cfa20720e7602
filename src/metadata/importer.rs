//! Cross-module reference import.
//!
//! [`Importer`] turns types and methods of one module (the base module) into references that
//! are valid inside another (the patch module). Definitions become `TypeRef` / `MemberRef`
//! rows scoped to the source assembly; references and specifications are rebuilt with every
//! contained token translated. The target module deduplicates, so importing the same entity
//! twice yields the same token.
//!
//! Methods declared on generic types are only imported through a closed reference (a
//! `MemberRef` whose parent is an instantiated `TypeSpec`); the `MethodDef` itself would need
//! the open `Type<!0>` as parent, which nothing in the target module binds.

use crate::{
    metadata::{
        module::Module,
        signatures::{MethodSignature, TypeSignature},
        tables::{ResolutionScope, TableId},
        token::Token,
    },
    Error, Result,
};

const MAX_IMPORT_DEPTH: usize = 50;

/// Imports references from `source` into `target`
pub struct Importer<'a> {
    source: &'a Module,
    target: &'a mut Module,
}

impl<'a> Importer<'a> {
    /// Creates an importer between two modules
    pub fn new(source: &'a Module, target: &'a mut Module) -> Self {
        Importer { source, target }
    }

    /// Imports a `TypeDef`, `TypeRef` or `TypeSpec` of the source module
    ///
    /// # Errors
    /// Returns [`crate::Error::TokenNotFound`] if the token does not resolve in the source.
    pub fn import_type(&mut self, token: Token) -> Result<Token> {
        self.import_type_at(token, 0)
    }

    /// Imports a method (`MethodDef`, `MemberRef` or `MethodSpec`) of the source module
    ///
    /// # Errors
    /// Returns [`crate::Error::TokenNotFound`] if the token does not resolve in the source and
    /// [`crate::Error::GenericNotConcrete`] for a `MethodDef` of a generic type.
    pub fn import_method(&mut self, token: Token) -> Result<Token> {
        self.import_method_at(token, 0)
    }

    /// Translates every token inside `signature`
    ///
    /// # Errors
    /// Returns [`crate::Error::TokenNotFound`] if a contained token does not resolve.
    pub fn import_signature(&mut self, signature: &TypeSignature) -> Result<TypeSignature> {
        self.import_signature_at(signature, 0)
    }

    fn check_depth(depth: usize) -> Result<()> {
        if depth > MAX_IMPORT_DEPTH {
            return Err(Error::RecursionLimit(MAX_IMPORT_DEPTH));
        }
        Ok(())
    }

    fn import_type_at(&mut self, token: Token, depth: usize) -> Result<Token> {
        Self::check_depth(depth)?;

        match token.table_id() {
            Some(TableId::TypeDef) => {
                let row = self.source.type_def(token).ok_or(Error::TokenNotFound(token))?;
                let scope = match row.enclosing {
                    Some(enclosing) => {
                        ResolutionScope::Nested(self.import_type_at(enclosing, depth + 1)?)
                    }
                    None => ResolutionScope::Assembly(self.source.name.clone()),
                };
                Ok(self.target.add_type_ref(scope, &row.namespace, &row.name))
            }
            Some(TableId::TypeRef) => {
                let row = self.source.type_ref(token).ok_or(Error::TokenNotFound(token))?;
                let scope = match &row.scope {
                    ResolutionScope::Nested(enclosing) => {
                        ResolutionScope::Nested(self.import_type_at(*enclosing, depth + 1)?)
                    }
                    ResolutionScope::Assembly(assembly) => ResolutionScope::Assembly(assembly.clone()),
                };
                Ok(self.target.add_type_ref(scope, &row.namespace, &row.name))
            }
            Some(TableId::TypeSpec) => {
                let row = self.source.type_spec(token).ok_or(Error::TokenNotFound(token))?;
                let signature = self.import_signature_at(&row.signature, depth + 1)?;
                Ok(self.target.add_type_spec(signature))
            }
            _ => Err(Error::TokenNotFound(token)),
        }
    }

    fn import_signature_at(
        &mut self,
        signature: &TypeSignature,
        depth: usize,
    ) -> Result<TypeSignature> {
        Self::check_depth(depth)?;

        Ok(match signature {
            TypeSignature::Class(token) => {
                TypeSignature::Class(self.import_type_at(*token, depth + 1)?)
            }
            TypeSignature::ValueType(token) => {
                TypeSignature::ValueType(self.import_type_at(*token, depth + 1)?)
            }
            TypeSignature::GenericInst(base, args) => TypeSignature::GenericInst(
                Box::new(self.import_signature_at(base, depth + 1)?),
                args.iter()
                    .map(|arg| self.import_signature_at(arg, depth + 1))
                    .collect::<Result<Vec<_>>>()?,
            ),
            TypeSignature::SzArray(inner) => {
                TypeSignature::SzArray(Box::new(self.import_signature_at(inner, depth + 1)?))
            }
            TypeSignature::ByRef(inner) => {
                TypeSignature::ByRef(Box::new(self.import_signature_at(inner, depth + 1)?))
            }
            other => other.clone(),
        })
    }

    fn import_method_signature(
        &mut self,
        signature: &MethodSignature,
        depth: usize,
    ) -> Result<MethodSignature> {
        Ok(MethodSignature {
            has_this: signature.has_this,
            generic_param_count: signature.generic_param_count,
            return_type: self.import_signature_at(&signature.return_type, depth + 1)?,
            params: signature
                .params
                .iter()
                .map(|param| self.import_signature_at(param, depth + 1))
                .collect::<Result<Vec<_>>>()?,
        })
    }

    fn import_method_at(&mut self, token: Token, depth: usize) -> Result<Token> {
        Self::check_depth(depth)?;

        match token.table_id() {
            Some(TableId::MethodDef) => {
                let row = self.source.method(token).ok_or(Error::TokenNotFound(token))?;
                let owner = self
                    .source
                    .type_def(row.declaring_type)
                    .ok_or(Error::TokenNotFound(row.declaring_type))?;

                if !owner.generic_params.is_empty() {
                    return Err(Error::GenericNotConcrete(format!(
                        "{} is declared on a generic type and needs an instantiated parent",
                        self.source.method_full_name(token)?
                    )));
                }

                let parent = self.import_type_at(row.declaring_type, depth + 1)?;
                let signature = self.import_method_signature(&row.signature, depth)?;
                Ok(self.target.add_member_ref(parent, &row.name, signature))
            }
            Some(TableId::MemberRef) => {
                let row = self.source.member_ref(token).ok_or(Error::TokenNotFound(token))?;
                let parent = self.import_type_at(row.parent, depth + 1)?;
                let signature = self.import_method_signature(&row.signature, depth)?;
                Ok(self.target.add_member_ref(parent, &row.name, signature))
            }
            Some(TableId::MethodSpec) => {
                let row = self.source.method_spec(token).ok_or(Error::TokenNotFound(token))?;
                let method = self.import_method_at(row.method, depth + 1)?;
                let instantiation = row
                    .instantiation
                    .iter()
                    .map(|arg| self.import_signature_at(arg, depth + 1))
                    .collect::<Result<Vec<_>>>()?;
                Ok(self.target.add_method_spec(method, instantiation))
            }
            _ => Err(Error::TokenNotFound(token)),
        }
    }
}
