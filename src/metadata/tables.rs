//! Metadata table identifiers and row types of the in-memory module model.
//!
//! Only the tables the patch pipeline reads or appends to are modelled. The numeric values
//! of [`TableId`] are the ECMA-335 table numbers, so tokens produced here are valid metadata
//! tokens.
//!
//! # Reference
//! * [ECMA-335 Partition II, Section 22](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf) - Metadata Tables

use strum::{EnumCount, EnumIter};

use crate::metadata::{
    customattributes::CustomAttributeValue,
    method::{MethodAttributes, MethodBody, MethodImplAttributes},
    signatures::{MethodSignature, TypeSignature},
    token::Token,
    typesystem::{FieldAttributes, TypeAttributes},
};

/// Identifiers for the metadata tables of the module model.
///
/// The order of the variants is the order in which tables are serialized.
#[derive(Clone, Copy, PartialEq, Debug, EnumIter, EnumCount, Eq, Hash, PartialOrd, Ord)]
pub enum TableId {
    /// `TypeRef` table (0x01) - References to types defined in other modules.
    TypeRef = 0x01,
    /// `TypeDef` table (0x02) - Type definitions of this module.
    TypeDef = 0x02,
    /// `Field` table (0x04) - Field definitions.
    Field = 0x04,
    /// `MethodDef` table (0x06) - Method definitions, including their bodies.
    MethodDef = 0x06,
    /// `MemberRef` table (0x0A) - References to methods of other types or instantiations.
    MemberRef = 0x0A,
    /// `CustomAttribute` table (0x0C) - Attributes attached to metadata rows.
    CustomAttribute = 0x0C,
    /// `StandAloneSig` table (0x11) - Local variable signatures.
    StandAloneSig = 0x11,
    /// `TypeSpec` table (0x1B) - Constructed types (generic instances, arrays).
    TypeSpec = 0x1B,
    /// `MethodSpec` table (0x2B) - Generic method instantiations.
    MethodSpec = 0x2B,
}

impl TableId {
    /// Maps the high byte of a token to a table identifier.
    #[must_use]
    pub fn from_raw(value: u8) -> Option<TableId> {
        match value {
            0x01 => Some(TableId::TypeRef),
            0x02 => Some(TableId::TypeDef),
            0x04 => Some(TableId::Field),
            0x06 => Some(TableId::MethodDef),
            0x0A => Some(TableId::MemberRef),
            0x0C => Some(TableId::CustomAttribute),
            0x11 => Some(TableId::StandAloneSig),
            0x1B => Some(TableId::TypeSpec),
            0x2B => Some(TableId::MethodSpec),
            _ => None,
        }
    }
}

/// Token table byte used by `ldstr` operands (user string heap).
pub const USERSTRING_TABLE_ID: u8 = 0x70;

/// Resolution scope of a [`TypeRef`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResolutionScope {
    /// The type lives at the top level of the named assembly
    Assembly(String),
    /// The type is nested in another `TypeRef`
    Nested(Token),
}

/// A row of the `TypeRef` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef {
    /// Token of this row
    pub token: Token,
    /// Where the referenced type is defined
    pub scope: ResolutionScope,
    /// Namespace (empty for nested types)
    pub namespace: String,
    /// Simple name
    pub name: String,
}

/// A row of the `TypeDef` table.
#[derive(Debug, Clone)]
pub struct TypeDef {
    /// Token of this row
    pub token: Token,
    /// Namespace (empty for nested types)
    pub namespace: String,
    /// Simple name, including the generic arity suffix if any
    pub name: String,
    /// Type attributes
    pub flags: TypeAttributes,
    /// Base type (`TypeDef`, `TypeRef` or `TypeSpec`), `None` for interfaces and roots
    pub extends: Option<Token>,
    /// Enclosing type for nested types
    pub enclosing: Option<Token>,
    /// Names of the generic parameters, in declaration order
    pub generic_params: Vec<String>,
    /// Fields owned by this type, in declaration order
    pub fields: Vec<Token>,
    /// Methods owned by this type, in declaration order
    pub methods: Vec<Token>,
}

/// A row of the `Field` table.
#[derive(Debug, Clone)]
pub struct FieldDef {
    /// Token of this row
    pub token: Token,
    /// Owning type
    pub declaring_type: Token,
    /// Field name
    pub name: String,
    /// Field attributes
    pub flags: FieldAttributes,
    /// Field type
    pub signature: TypeSignature,
}

/// A row of the `MethodDef` table.
#[derive(Debug, Clone)]
pub struct MethodDef {
    /// Token of this row
    pub token: Token,
    /// Owning type
    pub declaring_type: Token,
    /// Method name
    pub name: String,
    /// Method attributes
    pub flags: MethodAttributes,
    /// Implementation attributes
    pub impl_flags: MethodImplAttributes,
    /// Calling convention, parameters and return type
    pub signature: MethodSignature,
    /// Names of the method's own generic parameters
    pub generic_params: Vec<String>,
    /// CIL body, absent for abstract, extern and runtime-implemented methods
    pub body: Option<MethodBody>,
}

impl MethodDef {
    /// True for methods with the `static` attribute
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodAttributes::STATIC)
    }

    /// True for the type initializer (`.cctor`)
    #[must_use]
    pub fn is_static_constructor(&self) -> bool {
        self.name == ".cctor" && self.is_static()
    }

    /// True when the method declares its own generic parameters
    #[must_use]
    pub fn is_generic(&self) -> bool {
        !self.generic_params.is_empty()
    }

    /// True when the method has a body with at least one instruction
    #[must_use]
    pub fn has_body(&self) -> bool {
        self.body.as_ref().is_some_and(|body| !body.instructions.is_empty())
    }
}

/// A row of the `MemberRef` table (method references only).
#[derive(Debug, Clone, PartialEq)]
pub struct MemberRef {
    /// Token of this row
    pub token: Token,
    /// `TypeRef`, `TypeDef` or `TypeSpec` the member belongs to
    pub parent: Token,
    /// Member name
    pub name: String,
    /// Method signature as declared on the open type
    pub signature: MethodSignature,
}

/// A row of the `TypeSpec` table.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeSpec {
    /// Token of this row
    pub token: Token,
    /// The constructed type
    pub signature: TypeSignature,
}

/// A row of the `MethodSpec` table.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodSpec {
    /// Token of this row
    pub token: Token,
    /// The generic method being instantiated (`MethodDef` or `MemberRef`)
    pub method: Token,
    /// Method generic arguments
    pub instantiation: Vec<TypeSignature>,
}

/// A row of the `StandAloneSig` table (local variable signatures only).
#[derive(Debug, Clone, PartialEq)]
pub struct StandAloneSig {
    /// Token of this row
    pub token: Token,
    /// Local variable types, in slot order
    pub locals: Vec<TypeSignature>,
}

/// A row of the `CustomAttribute` table.
#[derive(Debug, Clone)]
pub struct CustomAttribute {
    /// Token of this row
    pub token: Token,
    /// The row the attribute is attached to
    pub parent: Token,
    /// Constructor of the attribute type (`MethodDef` or `MemberRef`)
    pub constructor: Token,
    /// Decoded arguments
    pub value: CustomAttributeValue,
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_table_id_roundtrip() {
        for table in TableId::iter() {
            assert_eq!(TableId::from_raw(table as u8), Some(table));
        }
        assert_eq!(TableId::from_raw(0x70), None);
        assert_eq!(TableId::COUNT, 9);
    }
}
