//! Custom attribute values and their serialization types.
//!
//! These types follow ECMA-335 II.23.3. Only the argument kinds that annotations of this crate
//! produce or inspect are modelled.

/// A custom attribute value with fixed and named arguments
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CustomAttributeValue {
    /// Fixed arguments from the constructor signature
    pub fixed_args: Vec<CustomAttributeArgument>,
    /// Named arguments (fields and properties)
    pub named_args: Vec<CustomAttributeNamedArgument>,
}

impl CustomAttributeValue {
    /// Looks up a named field argument
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&CustomAttributeArgument> {
        self.named_args
            .iter()
            .find(|arg| arg.is_field && arg.name == name)
            .map(|arg| &arg.value)
    }
}

/// A single custom attribute argument value
#[derive(Debug, Clone, PartialEq)]
pub enum CustomAttributeArgument {
    /// Boolean value
    Bool(bool),
    /// Signed 32-bit integer
    I4(i32),
    /// Unsigned 32-bit integer
    U4(u32),
    /// UTF-8 string, `None` is the null string
    String(Option<String>),
    /// Type reference, stored as its reflection name
    Type(String),
    /// Single-dimension array of arguments
    Array(Vec<CustomAttributeArgument>),
}

impl CustomAttributeArgument {
    /// The value as a signed 32-bit integer
    #[must_use]
    pub fn as_i4(&self) -> Option<i32> {
        match self {
            CustomAttributeArgument::I4(value) => Some(*value),
            _ => None,
        }
    }

    /// The value as a list of type names, if this is an array of `Type` arguments
    #[must_use]
    pub fn as_type_names(&self) -> Option<Vec<String>> {
        match self {
            CustomAttributeArgument::Array(items) => items
                .iter()
                .map(|item| match item {
                    CustomAttributeArgument::Type(name) => Some(name.clone()),
                    _ => None,
                })
                .collect(),
            _ => None,
        }
    }
}

/// Declared type of a named argument (`FieldOrPropType`, ECMA-335 II.23.3)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldOrPropType {
    /// bool
    Boolean,
    /// int32
    I4,
    /// uint32
    U4,
    /// string
    String,
    /// System.Type
    Type,
    /// Single-dimension array of the inner type
    SzArray(Box<FieldOrPropType>),
}

/// A named argument (field or property) of a custom attribute
#[derive(Debug, Clone, PartialEq)]
pub struct CustomAttributeNamedArgument {
    /// Whether this is a field (true) or property (false)
    pub is_field: bool,
    /// Name of the field or property
    pub name: String,
    /// Declared type of the argument
    pub arg_type: FieldOrPropType,
    /// Value of the argument
    pub value: CustomAttributeArgument,
}

impl CustomAttributeNamedArgument {
    /// A named field argument
    #[must_use]
    pub fn field(name: &str, arg_type: FieldOrPropType, value: CustomAttributeArgument) -> Self {
        CustomAttributeNamedArgument {
            is_field: true,
            name: name.to_string(),
            arg_type,
            value,
        }
    }
}

/// .NET `CorSerializationType` constants as defined in corhdr.h
#[allow(non_snake_case, dead_code, missing_docs)]
pub mod SERIALIZATION_TYPE {
    pub const BOOLEAN: u8 = 0x02;
    pub const I4: u8 = 0x08;
    pub const U4: u8 = 0x09;
    pub const STRING: u8 = 0x0E;
    pub const SZARRAY: u8 = 0x1D;
    pub const TYPE: u8 = 0x50;
    pub const FIELD: u8 = 0x53;
    pub const PROPERTY: u8 = 0x54;
}
