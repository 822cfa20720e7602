//! The in-memory module model.
//!
//! A [`Module`] holds the metadata rows of one compiled unit: type references and
//! definitions, fields, methods with their bodies, member references, type and method
//! specifications, local signatures, custom attributes, user strings and source documents.
//!
//! # Token stability
//!
//! Every table is append-only. Rows are never removed or reordered, so a token handed out
//! once keeps resolving to the same row for the lifetime of the module and in every image
//! written from it. Method and field ownership is recorded explicitly on the owning
//! [`TypeDef`] instead of being implied by row order, which is what allows new methods to be
//! appended to an existing type without renumbering anything.
//!
//! # Deduplication
//!
//! References (`TypeRef`, `MemberRef`, `TypeSpec`, `MethodSpec`) and user strings are
//! deduplicated on insertion: adding an identical reference twice returns the first token.

mod builders;
mod names;

pub use builders::{MethodDefBuilder, TypeDefBuilder};

use uguid::Guid;

use crate::{
    assembly::StackEffects,
    metadata::{
        customattributes::CustomAttributeValue,
        sequencepoints::Document,
        signatures::{MethodSignature, TypeSignature},
        tables::{
            CustomAttribute, FieldDef, MemberRef, MethodDef, MethodSpec, ResolutionScope,
            StandAloneSig, TableId, TypeDef, TypeRef, TypeSpec, USERSTRING_TABLE_ID,
        },
        token::Token,
        typesystem::FieldAttributes,
    },
    Error, Result,
};

/// A mutable, append-only metadata module
#[derive(Debug, Clone)]
pub struct Module {
    /// Assembly name of the module, e.g. `Assembly-CSharp`
    pub name: String,
    /// Module version identifier
    pub mvid: Guid,
    type_refs: Vec<TypeRef>,
    type_defs: Vec<TypeDef>,
    fields: Vec<FieldDef>,
    methods: Vec<MethodDef>,
    member_refs: Vec<MemberRef>,
    custom_attributes: Vec<CustomAttribute>,
    standalone_sigs: Vec<StandAloneSig>,
    type_specs: Vec<TypeSpec>,
    method_specs: Vec<MethodSpec>,
    user_strings: Vec<String>,
    documents: Vec<Document>,
}

fn row_token(table: TableId, len: usize) -> Token {
    Token::from_parts(table, u32::try_from(len + 1).unwrap_or(u32::MAX))
}

fn row_index(token: Token, table: TableId) -> Option<usize> {
    if token.is_table(table) && token.row() > 0 {
        Some(token.row() as usize - 1)
    } else {
        None
    }
}

impl Module {
    /// Creates an empty module
    #[must_use]
    pub fn new(name: &str, mvid: Guid) -> Self {
        Module {
            name: name.to_string(),
            mvid,
            type_refs: Vec::new(),
            type_defs: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            member_refs: Vec::new(),
            custom_attributes: Vec::new(),
            standalone_sigs: Vec::new(),
            type_specs: Vec::new(),
            method_specs: Vec::new(),
            user_strings: Vec::new(),
            documents: Vec::new(),
        }
    }

    /// Adds a type reference, returning the existing token for an identical row
    pub fn add_type_ref(&mut self, scope: ResolutionScope, namespace: &str, name: &str) -> Token {
        if let Some(existing) = self
            .type_refs
            .iter()
            .find(|row| row.scope == scope && row.namespace == namespace && row.name == name)
        {
            return existing.token;
        }

        let token = row_token(TableId::TypeRef, self.type_refs.len());
        self.type_refs.push(TypeRef {
            token,
            scope,
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        token
    }

    pub(crate) fn push_type_def(&mut self, mut row: TypeDef) -> Token {
        let token = row_token(TableId::TypeDef, self.type_defs.len());
        row.token = token;
        self.type_defs.push(row);
        token
    }

    pub(crate) fn push_method_def(&mut self, mut row: MethodDef) -> Result<Token> {
        let token = row_token(TableId::MethodDef, self.methods.len());
        row.token = token;
        self.type_def_mut(row.declaring_type)
            .ok_or(Error::TokenNotFound(row.declaring_type))?
            .methods
            .push(token);
        self.methods.push(row);
        Ok(token)
    }

    /// Adds a field to `declaring_type`
    ///
    /// # Errors
    /// Returns [`crate::Error::TokenNotFound`] if the declaring type does not exist.
    pub fn add_field(
        &mut self,
        declaring_type: Token,
        name: &str,
        flags: FieldAttributes,
        signature: TypeSignature,
    ) -> Result<Token> {
        let token = row_token(TableId::Field, self.fields.len());
        self.type_def_mut(declaring_type)
            .ok_or(Error::TokenNotFound(declaring_type))?
            .fields
            .push(token);
        self.fields.push(FieldDef {
            token,
            declaring_type,
            name: name.to_string(),
            flags,
            signature,
        });
        Ok(token)
    }

    /// Adds a method reference, returning the existing token for an identical row
    pub fn add_member_ref(&mut self, parent: Token, name: &str, signature: MethodSignature) -> Token {
        if let Some(existing) = self
            .member_refs
            .iter()
            .find(|row| row.parent == parent && row.name == name && row.signature == signature)
        {
            return existing.token;
        }

        let token = row_token(TableId::MemberRef, self.member_refs.len());
        self.member_refs.push(MemberRef {
            token,
            parent,
            name: name.to_string(),
            signature,
        });
        token
    }

    /// Adds a type specification, returning the existing token for an identical row
    pub fn add_type_spec(&mut self, signature: TypeSignature) -> Token {
        if let Some(existing) = self.type_specs.iter().find(|row| row.signature == signature) {
            return existing.token;
        }

        let token = row_token(TableId::TypeSpec, self.type_specs.len());
        self.type_specs.push(TypeSpec { token, signature });
        token
    }

    /// Adds a generic method instantiation, returning the existing token for an identical row
    pub fn add_method_spec(&mut self, method: Token, instantiation: Vec<TypeSignature>) -> Token {
        if let Some(existing) = self
            .method_specs
            .iter()
            .find(|row| row.method == method && row.instantiation == instantiation)
        {
            return existing.token;
        }

        let token = row_token(TableId::MethodSpec, self.method_specs.len());
        self.method_specs.push(MethodSpec {
            token,
            method,
            instantiation,
        });
        token
    }

    /// Adds a local variable signature
    pub fn add_standalone_sig(&mut self, locals: Vec<TypeSignature>) -> Token {
        let token = row_token(TableId::StandAloneSig, self.standalone_sigs.len());
        self.standalone_sigs.push(StandAloneSig { token, locals });
        token
    }

    /// Attaches a custom attribute to `parent`
    ///
    /// # Errors
    /// Returns [`crate::Error::TokenNotFound`] if the parent or constructor does not resolve.
    pub fn add_custom_attribute(
        &mut self,
        parent: Token,
        constructor: Token,
        value: CustomAttributeValue,
    ) -> Result<Token> {
        if !self.contains(parent) {
            return Err(Error::TokenNotFound(parent));
        }
        if !(constructor.is_table(TableId::MethodDef) || constructor.is_table(TableId::MemberRef))
            || !self.contains(constructor)
        {
            return Err(Error::TokenNotFound(constructor));
        }

        let token = row_token(TableId::CustomAttribute, self.custom_attributes.len());
        self.custom_attributes.push(CustomAttribute {
            token,
            parent,
            constructor,
            value,
        });
        Ok(token)
    }

    /// Adds a user string, returning the `ldstr` token
    pub fn add_user_string(&mut self, value: &str) -> Token {
        let index = self
            .user_strings
            .iter()
            .position(|existing| existing == value)
            .unwrap_or_else(|| {
                self.user_strings.push(value.to_string());
                self.user_strings.len() - 1
            });
        Token::new(
            (u32::from(USERSTRING_TABLE_ID) << 24) | u32::try_from(index + 1).unwrap_or(0x00FF_FFFF),
        )
    }

    /// Adds a source document, returning its index
    pub fn add_document(&mut self, name: &str) -> u32 {
        if let Some(index) = self.documents.iter().position(|doc| doc.name == name) {
            return u32::try_from(index).unwrap_or(u32::MAX);
        }
        self.documents.push(Document {
            name: name.to_string(),
        });
        u32::try_from(self.documents.len() - 1).unwrap_or(u32::MAX)
    }

    /// Returns true if `token` resolves to a row of this module
    #[must_use]
    pub fn contains(&self, token: Token) -> bool {
        let row = token.row() as usize;
        if row == 0 {
            return false;
        }
        if token.table() == USERSTRING_TABLE_ID {
            return row <= self.user_strings.len();
        }
        let len = match token.table_id() {
            Some(TableId::TypeRef) => self.type_refs.len(),
            Some(TableId::TypeDef) => self.type_defs.len(),
            Some(TableId::Field) => self.fields.len(),
            Some(TableId::MethodDef) => self.methods.len(),
            Some(TableId::MemberRef) => self.member_refs.len(),
            Some(TableId::CustomAttribute) => self.custom_attributes.len(),
            Some(TableId::StandAloneSig) => self.standalone_sigs.len(),
            Some(TableId::TypeSpec) => self.type_specs.len(),
            Some(TableId::MethodSpec) => self.method_specs.len(),
            None => 0,
        };
        row <= len
    }

    /// Looks up a `TypeRef` row
    #[must_use]
    pub fn type_ref(&self, token: Token) -> Option<&TypeRef> {
        row_index(token, TableId::TypeRef).and_then(|index| self.type_refs.get(index))
    }

    /// Looks up a `TypeDef` row
    #[must_use]
    pub fn type_def(&self, token: Token) -> Option<&TypeDef> {
        row_index(token, TableId::TypeDef).and_then(|index| self.type_defs.get(index))
    }

    /// Looks up a `TypeDef` row for modification
    pub fn type_def_mut(&mut self, token: Token) -> Option<&mut TypeDef> {
        row_index(token, TableId::TypeDef).and_then(|index| self.type_defs.get_mut(index))
    }

    /// Looks up a `Field` row
    #[must_use]
    pub fn field(&self, token: Token) -> Option<&FieldDef> {
        row_index(token, TableId::Field).and_then(|index| self.fields.get(index))
    }

    /// Looks up a `MethodDef` row
    #[must_use]
    pub fn method(&self, token: Token) -> Option<&MethodDef> {
        row_index(token, TableId::MethodDef).and_then(|index| self.methods.get(index))
    }

    /// Looks up a `MethodDef` row for modification
    pub fn method_mut(&mut self, token: Token) -> Option<&mut MethodDef> {
        row_index(token, TableId::MethodDef).and_then(|index| self.methods.get_mut(index))
    }

    /// Looks up a `MemberRef` row
    #[must_use]
    pub fn member_ref(&self, token: Token) -> Option<&MemberRef> {
        row_index(token, TableId::MemberRef).and_then(|index| self.member_refs.get(index))
    }

    /// Looks up a `TypeSpec` row
    #[must_use]
    pub fn type_spec(&self, token: Token) -> Option<&TypeSpec> {
        row_index(token, TableId::TypeSpec).and_then(|index| self.type_specs.get(index))
    }

    /// Looks up a `MethodSpec` row
    #[must_use]
    pub fn method_spec(&self, token: Token) -> Option<&MethodSpec> {
        row_index(token, TableId::MethodSpec).and_then(|index| self.method_specs.get(index))
    }

    /// Looks up a `StandAloneSig` row
    #[must_use]
    pub fn standalone_sig(&self, token: Token) -> Option<&StandAloneSig> {
        row_index(token, TableId::StandAloneSig).and_then(|index| self.standalone_sigs.get(index))
    }

    /// Looks up a user string by its `ldstr` token
    #[must_use]
    pub fn user_string(&self, token: Token) -> Option<&str> {
        if token.table() != USERSTRING_TABLE_ID || token.row() == 0 {
            return None;
        }
        self.user_strings
            .get(token.row() as usize - 1)
            .map(String::as_str)
    }

    /// All type references, in token order
    #[must_use]
    pub fn type_refs(&self) -> &[TypeRef] {
        &self.type_refs
    }

    /// All type definitions, in token order
    #[must_use]
    pub fn type_defs(&self) -> &[TypeDef] {
        &self.type_defs
    }

    /// All fields, in token order
    #[must_use]
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// All methods, in token order
    #[must_use]
    pub fn methods(&self) -> &[MethodDef] {
        &self.methods
    }

    /// All member references, in token order
    #[must_use]
    pub fn member_refs(&self) -> &[MemberRef] {
        &self.member_refs
    }

    /// All custom attributes, in token order
    #[must_use]
    pub fn custom_attributes(&self) -> &[CustomAttribute] {
        &self.custom_attributes
    }

    /// All local variable signatures, in token order
    #[must_use]
    pub fn standalone_sigs(&self) -> &[StandAloneSig] {
        &self.standalone_sigs
    }

    /// All type specifications, in token order
    #[must_use]
    pub fn type_specs(&self) -> &[TypeSpec] {
        &self.type_specs
    }

    /// All method specifications, in token order
    #[must_use]
    pub fn method_specs(&self) -> &[MethodSpec] {
        &self.method_specs
    }

    /// All user strings, in token order
    #[must_use]
    pub fn user_strings(&self) -> &[String] {
        &self.user_strings
    }

    /// All source documents, in index order
    #[must_use]
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// Custom attributes attached to `parent`, in insertion order
    pub fn custom_attributes_of(&self, parent: Token) -> impl Iterator<Item = &CustomAttribute> {
        self.custom_attributes
            .iter()
            .filter(move |attribute| attribute.parent == parent)
    }

    /// Finds a type definition by full name (`Namespace.Name`, nested types as `Outer/Inner`)
    #[must_use]
    pub fn find_type(&self, full_name: &str) -> Option<Token> {
        self.type_defs
            .iter()
            .find(|row| {
                self.type_full_name(row.token)
                    .is_ok_and(|name| name == full_name)
            })
            .map(|row| row.token)
    }

    /// Finds a method of `declaring_type` by name
    #[must_use]
    pub fn find_method(&self, declaring_type: Token, name: &str) -> Option<Token> {
        self.type_def(declaring_type)?
            .methods
            .iter()
            .copied()
            .find(|token| self.method(*token).is_some_and(|method| method.name == name))
    }

    /// The declaring type of a `MethodDef`
    #[must_use]
    pub fn method_owner(&self, method: Token) -> Option<Token> {
        self.method(method).map(|row| row.declaring_type)
    }
}

impl StackEffects for Module {
    fn call_signature(&self, token: Token) -> Result<MethodSignature> {
        match token.table_id() {
            Some(TableId::MethodDef) => self
                .method(token)
                .map(|row| row.signature.clone())
                .ok_or(Error::TokenNotFound(token)),
            Some(TableId::MemberRef) => self
                .member_ref(token)
                .map(|row| row.signature.clone())
                .ok_or(Error::TokenNotFound(token)),
            // slot counts do not depend on the method instantiation
            Some(TableId::MethodSpec) => {
                let spec = self.method_spec(token).ok_or(Error::TokenNotFound(token))?;
                self.call_signature(spec.method)
            }
            _ => Err(Error::TokenNotFound(token)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{method::MethodAttributes, typesystem::TypeAttributes},
        test::empty_module,
    };

    #[test]
    fn test_type_ref_dedup() {
        let mut module = empty_module("Patch");
        let scope = ResolutionScope::Assembly("mscorlib".to_string());
        let first = module.add_type_ref(scope.clone(), "System", "Object");
        let second = module.add_type_ref(scope.clone(), "System", "Object");
        let third = module.add_type_ref(scope, "System", "Type");

        assert_eq!(first, second);
        assert_eq!(first, Token::new(0x01000001));
        assert_eq!(third, Token::new(0x01000002));
        assert_eq!(module.type_refs().len(), 2);
    }

    #[test]
    fn test_nested_type_names() -> Result<()> {
        let mut module = empty_module("Patch");
        let outer = TypeDefBuilder::new("Game", "Outer")
            .flags(TypeAttributes::PUBLIC)
            .build(&mut module)?;
        let inner = TypeDefBuilder::new("", "Inner")
            .flags(TypeAttributes::NESTED_PUBLIC)
            .nested_in(outer)
            .build(&mut module)?;

        assert_eq!(module.type_full_name(inner)?, "Game.Outer/Inner");
        assert_eq!(module.find_type("Game.Outer/Inner"), Some(inner));
        assert_eq!(module.find_type("Game.Inner"), None);
        Ok(())
    }

    #[test]
    fn test_append_keeps_tokens() -> Result<()> {
        let mut module = empty_module("Patch");
        let ty = TypeDefBuilder::new("Game", "Player").build(&mut module)?;
        let first = MethodDefBuilder::new("Update")
            .flags(MethodAttributes::PUBLIC)
            .signature(MethodSignature::new_instance(TypeSignature::Void, vec![]))
            .build(&mut module, ty)?;
        let second = MethodDefBuilder::new("Fire")
            .flags(MethodAttributes::PUBLIC)
            .signature(MethodSignature::new_instance(TypeSignature::Void, vec![]))
            .build(&mut module, ty)?;

        assert_eq!(first, Token::new(0x06000001));
        assert_eq!(second, Token::new(0x06000002));
        assert_eq!(module.type_def(ty).map(|t| t.methods.clone()), Some(vec![first, second]));
        assert_eq!(module.find_method(ty, "Fire"), Some(second));
        assert_eq!(module.method_owner(first), Some(ty));
        Ok(())
    }

    #[test]
    fn test_contains_and_user_strings() {
        let mut module = empty_module("Patch");
        let hello = module.add_user_string("hello");
        assert_eq!(module.add_user_string("hello"), hello);
        assert_eq!(hello, Token::new(0x70000001));
        assert_eq!(module.user_string(hello), Some("hello"));
        assert!(module.contains(hello));
        assert!(!module.contains(Token::new(0x70000002)));
        assert!(!module.contains(Token::new(0x02000001)));
        assert!(!module.contains(Token::new(0x02000000)));
    }

    #[test]
    fn test_custom_attribute_requires_rows() {
        let mut module = empty_module("Patch");
        let result = module.add_custom_attribute(
            Token::new(0x06000001),
            Token::new(0x0A000001),
            CustomAttributeValue::default(),
        );
        assert!(matches!(result, Err(Error::TokenNotFound(_))));
    }

    #[test]
    fn test_method_spec_call_signature() -> Result<()> {
        let mut module = empty_module("Patch");
        let ty = TypeDefBuilder::new("Game", "Cache").build(&mut module)?;
        let get = MethodDefBuilder::new("Get")
            .flags(MethodAttributes::PUBLIC | MethodAttributes::STATIC)
            .generic_param("T")
            .signature(MethodSignature::new_static(
                TypeSignature::GenericParamMethod(0),
                vec![TypeSignature::I4],
            ))
            .build(&mut module, ty)?;
        let spec = module.add_method_spec(get, vec![TypeSignature::String]);

        let sig = module.call_signature(spec)?;
        assert_eq!(sig.params.len(), 1);
        assert_eq!(sig.generic_param_count, 1);
        assert!(module.call_signature(Token::new(0x2B000009)).is_err());
        Ok(())
    }
}
