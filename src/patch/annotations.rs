//! Discovery annotations on patched generic methods and their wrappers.
//!
//! Two custom attribute shapes, both defined in the support module:
//!
//! - `GenericMethodIndexAttribute { index }` on a patched generic method
//! - `GenericMethodWrapperAttribute { index, instantiationOrdinal, typeArguments }` on each
//!   wrapper, where `typeArguments` lists the declaring type's generic arguments followed by
//!   the method's own
//!
//! All values are written as named field arguments. The runtime dispatcher reads them back
//! to pair a concrete method with its wrapper; [`find_index_annotation`] and
//! [`find_wrapper_annotation`] perform the same queries.

use crate::{
    metadata::{
        customattributes::{
            CustomAttributeArgument, CustomAttributeNamedArgument, CustomAttributeValue,
            FieldOrPropType,
        },
        module::Module,
        signatures::{MethodSignature, TypeSignature},
        tables::{ResolutionScope, TableId},
        token::Token,
    },
    patch::{generics::GenericMethodRecord, PatchConfig},
    Error, Result,
};

/// Named field holding the ordinal index
pub const INDEX_FIELD: &str = "index";
/// Named field holding the instantiation ordinal
pub const INSTANTIATION_ORDINAL_FIELD: &str = "instantiationOrdinal";
/// Named field holding the generic arguments
pub const TYPE_ARGUMENTS_FIELD: &str = "typeArguments";

const INDEX_SHAPE: &str = "GenericMethodIndex";
const WRAPPER_SHAPE: &str = "GenericMethodWrapper";

/// A well-known type of the support module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportType {
    /// Assembly that defines the type
    pub assembly: String,
    /// Namespace
    pub namespace: String,
    /// Simple name
    pub name: String,
}

impl SupportType {
    fn resolve(support: &Module, full_name: &str) -> Result<Self> {
        let missing = || Error::SupportTypeMissing(full_name.to_string());

        let token = support.find_type(full_name).ok_or_else(missing)?;
        let row = support.type_def(token).ok_or_else(missing)?;
        let has_default_ctor = row.methods.iter().any(|method| {
            support.method(*method).is_some_and(|method| {
                method.name == ".ctor" && !method.is_static() && method.signature.params.is_empty()
            })
        });
        if !has_default_ctor {
            return Err(missing());
        }

        Ok(SupportType {
            assembly: support.name.clone(),
            namespace: row.namespace.clone(),
            name: row.name.clone(),
        })
    }

    /// `Namespace.Name`
    #[must_use]
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    /// Imports the default constructor of this type into `module`
    pub fn import_ctor(&self, module: &mut Module) -> Token {
        let type_ref = module.add_type_ref(
            ResolutionScope::Assembly(self.assembly.clone()),
            &self.namespace,
            &self.name,
        );
        module.add_member_ref(
            type_ref,
            ".ctor",
            MethodSignature::new_instance(TypeSignature::Void, vec![]),
        )
    }
}

/// The annotation types, resolved once from the support module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportTypes {
    /// Type of the annotation on patched generic methods
    pub index_attribute: SupportType,
    /// Type of the annotation on wrappers
    pub wrapper_attribute: SupportType,
}

impl SupportTypes {
    /// Looks the annotation types up in the support module.
    ///
    /// # Errors
    /// Returns [`crate::Error::SupportTypeMissing`] if a type is absent or lacks a public
    /// parameterless constructor.
    pub fn resolve(support: &Module, config: &PatchConfig) -> Result<Self> {
        if support.name != config.support_module {
            log::warn!(
                "Resolving support types from '{}', expected '{}'",
                support.name,
                config.support_module
            );
        }

        Ok(SupportTypes {
            index_attribute: SupportType::resolve(support, &config.index_attribute)?,
            wrapper_attribute: SupportType::resolve(support, &config.wrapper_attribute)?,
        })
    }
}

/// The `{ index }` annotation of a patched generic method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexAnnotation {
    /// Ordinal index
    pub index: i32,
}

/// The annotation of a wrapper method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapperAnnotation {
    /// Ordinal index of the wrapped method
    pub index: i32,
    /// Position of the instantiation
    pub instantiation_ordinal: i32,
    /// Reflection names of the generic arguments
    pub type_arguments: Vec<String>,
}

/// Attaches annotations to methods of the patch module
pub struct AnnotationWriter<'a> {
    module: &'a mut Module,
    support: &'a SupportTypes,
    index_ctor: Token,
    wrapper_ctor: Token,
}

impl<'a> AnnotationWriter<'a> {
    /// Imports both annotation constructors into `module`
    pub fn new(module: &'a mut Module, support: &'a SupportTypes) -> Self {
        let index_ctor = support.index_attribute.import_ctor(module);
        let wrapper_ctor = support.wrapper_attribute.import_ctor(module);
        AnnotationWriter {
            module,
            support,
            index_ctor,
            wrapper_ctor,
        }
    }

    /// Tags a patched generic method with its ordinal index.
    ///
    /// # Errors
    /// Returns [`crate::Error::DuplicateAnnotation`] if the method is already tagged.
    pub fn annotate_generic_method(&mut self, method: Token, index: u32) -> Result<Token> {
        if find_index_annotation(self.module, method, self.support).is_some() {
            return Err(Error::DuplicateAnnotation {
                method,
                shape: INDEX_SHAPE,
            });
        }

        let value = CustomAttributeValue {
            fixed_args: Vec::new(),
            named_args: vec![CustomAttributeNamedArgument::field(
                INDEX_FIELD,
                FieldOrPropType::I4,
                CustomAttributeArgument::I4(to_i4(index)?),
            )],
        };
        self.module.add_custom_attribute(method, self.index_ctor, value)
    }

    /// Tags a wrapper with the ordinal index, its instantiation ordinal and the generic
    /// arguments it pins.
    ///
    /// # Errors
    /// Returns [`crate::Error::DuplicateAnnotation`] if the wrapper is already tagged and
    /// [`crate::Error::GenericNotConcrete`] if an argument is not a closed type.
    pub fn annotate_wrapper(
        &mut self,
        wrapper: Token,
        index: u32,
        instantiation_ordinal: usize,
        type_args: &[TypeSignature],
    ) -> Result<Token> {
        if find_wrapper_annotation(self.module, wrapper, self.support).is_some() {
            return Err(Error::DuplicateAnnotation {
                method: wrapper,
                shape: WRAPPER_SHAPE,
            });
        }

        let names = type_args
            .iter()
            .map(|arg| {
                self.module
                    .reflection_name(arg)
                    .map(CustomAttributeArgument::Type)
            })
            .collect::<Result<Vec<_>>>()?;

        let value = CustomAttributeValue {
            fixed_args: Vec::new(),
            named_args: vec![
                CustomAttributeNamedArgument::field(
                    INDEX_FIELD,
                    FieldOrPropType::I4,
                    CustomAttributeArgument::I4(to_i4(index)?),
                ),
                CustomAttributeNamedArgument::field(
                    INSTANTIATION_ORDINAL_FIELD,
                    FieldOrPropType::I4,
                    CustomAttributeArgument::I4(to_i4(instantiation_ordinal)?),
                ),
                CustomAttributeNamedArgument::field(
                    TYPE_ARGUMENTS_FIELD,
                    FieldOrPropType::SzArray(Box::new(FieldOrPropType::Type)),
                    CustomAttributeArgument::Array(names),
                ),
            ],
        };
        self.module
            .add_custom_attribute(wrapper, self.wrapper_ctor, value)
    }
}

/// Annotates every record that received an ordinal, and each of its wrappers.
///
/// Returns the number of annotations written.
///
/// # Errors
/// Returns [`crate::Error::DuplicateAnnotation`] if a method is already tagged and
/// [`crate::Error::Malformed`] if a record with an ordinal lacks a wrapper.
pub fn annotate_records(
    module: &mut Module,
    records: &[GenericMethodRecord],
    support: &SupportTypes,
) -> Result<usize> {
    let mut writer = AnnotationWriter::new(module, support);
    let mut written = 0;
    for record in records {
        let Some(ordinal) = record.ordinal else {
            continue;
        };
        writer.annotate_generic_method(record.method, ordinal)?;
        written += 1;

        for (position, instantiation) in record.instantiations.iter().enumerate() {
            let wrapper = instantiation.wrapper.ok_or_else(|| {
                malformed_error!(
                    "Instantiation {} of {} has no wrapper",
                    position,
                    record.method
                )
            })?;
            writer.annotate_wrapper(wrapper, ordinal, position, &instantiation.all_args())?;
            written += 1;
        }
    }
    Ok(written)
}

fn to_i4<T: TryInto<i32>>(value: T) -> Result<i32> {
    value
        .try_into()
        .map_err(|_| malformed_error!("Annotation value does not fit an int32"))
}

/// Full name of the type whose constructor `ctor` is
fn attribute_type(module: &Module, ctor: Token) -> Option<String> {
    let owner = match ctor.table_id()? {
        TableId::MemberRef => module.member_ref(ctor)?.parent,
        TableId::MethodDef => module.method_owner(ctor)?,
        _ => return None,
    };
    module.type_full_name(owner).ok()
}

fn find_annotation<'m>(
    module: &'m Module,
    method: Token,
    attribute: &SupportType,
) -> Option<&'m CustomAttributeValue> {
    let full_name = attribute.full_name();
    module
        .custom_attributes_of(method)
        .find(|row| attribute_type(module, row.constructor).is_some_and(|name| name == full_name))
        .map(|row| &row.value)
}

/// Reads the index annotation of `method`, if any
#[must_use]
pub fn find_index_annotation(
    module: &Module,
    method: Token,
    support: &SupportTypes,
) -> Option<IndexAnnotation> {
    let value = find_annotation(module, method, &support.index_attribute)?;
    Some(IndexAnnotation {
        index: value.field(INDEX_FIELD)?.as_i4()?,
    })
}

/// Reads the wrapper annotation of `method`, if any
#[must_use]
pub fn find_wrapper_annotation(
    module: &Module,
    method: Token,
    support: &SupportTypes,
) -> Option<WrapperAnnotation> {
    let value = find_annotation(module, method, &support.wrapper_attribute)?;
    Some(WrapperAnnotation {
        index: value.field(INDEX_FIELD)?.as_i4()?,
        instantiation_ordinal: value.field(INSTANTIATION_ORDINAL_FIELD)?.as_i4()?,
        type_arguments: value.field(TYPE_ARGUMENTS_FIELD)?.as_type_names()?,
    })
}
