//! Module image serialization.
//!
//! # Layout
//!
//! ```text
//! +--------------------+  0
//! | "DPMD"  version    |  magic, u16 version, u16 reserved
//! | MVID               |  16 bytes
//! | name               |  u32 #Strings offset
//! | section sizes      |  5 x u32: tables, #Strings, #Blob, #US, bodies
//! +--------------------+  48
//! | tables             |  u8 count, (u8 id, u32 rows) per table, then the rows
//! | #Strings           |
//! | #Blob              |
//! | #US                |
//! | method bodies      |  tiny/fat bodies, each 4-byte aligned
//! +--------------------+
//! ```
//!
//! Tables are written in table-id order and rows in token order; every token of the module
//! is written verbatim. The writer holds no state besides the module, so identical modules
//! produce identical bytes.

use std::collections::HashMap;

use sha1::{Digest, Sha1};
use strum::IntoEnumIterator;
use uguid::Guid;

use crate::{
    assembly::compute_max_stack,
    metadata::{
        customattributes::encode_custom_attribute_value,
        method::EncodedBody,
        module::Module,
        signatures::{
            encode_field_signature, encode_local_var_signature, encode_method_signature,
            encode_method_spec_signature, encode_typespec_signature,
        },
        tables::{ResolutionScope, TableId},
        token::Token,
    },
    utils::{align_to_4, read_bytes_at, read_le_at},
    writer::{
        heaps::{BlobHeapBuilder, HeapBuilder, StringHeapBuilder, UserStringHeapBuilder},
        symbols::write_symbols,
    },
    Error, Result,
};

/// Magic bytes at the start of every module image
pub const IMAGE_MAGIC: [u8; 4] = *b"DPMD";
/// Current image format version
pub const IMAGE_VERSION: u16 = 1;
/// Size of the fixed image header
pub const IMAGE_HEADER_SIZE: usize = 48;

/// Body offset stored for methods without a body
const NO_BODY: u32 = u32::MAX;

/// SHA-1 digest of a module image
pub type ImageDigest = [u8; 20];

/// Computes the digest the symbol file is bound to
#[must_use]
pub fn image_digest(image: &[u8]) -> ImageDigest {
    let mut hasher = Sha1::new();
    hasher.update(image);
    hasher.finalize().into()
}

/// The fixed header of a module image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHeader {
    /// Format version
    pub version: u16,
    /// Module version identifier
    pub mvid: Guid,
    /// Offset of the module name in `#Strings`
    pub name: u32,
    /// Sizes of tables, `#Strings`, `#Blob`, `#US` and body sections
    pub sections: [u32; 5],
}

impl ImageHeader {
    /// Parses the header of a module image
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the magic does not match and
    /// [`crate::Error::OutOfBounds`] if the data is truncated.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut offset = 0;
        if read_bytes_at(data, &mut offset, 4)? != IMAGE_MAGIC.as_slice() {
            return Err(malformed_error!("Not a module image - bad magic"));
        }
        let version = read_le_at::<u16>(data, &mut offset)?;
        let _reserved = read_le_at::<u16>(data, &mut offset)?;
        let mut mvid = [0u8; 16];
        mvid.copy_from_slice(read_bytes_at(data, &mut offset, 16)?);
        let name = read_le_at::<u32>(data, &mut offset)?;
        let mut sections = [0u32; 5];
        for section in &mut sections {
            *section = read_le_at::<u32>(data, &mut offset)?;
        }

        let total = sections
            .iter()
            .try_fold(IMAGE_HEADER_SIZE, |acc, size| acc.checked_add(*size as usize))
            .ok_or(Error::OutOfBounds)?;
        if total != data.len() {
            return Err(malformed_error!(
                "Image size {} does not match its sections ({})",
                data.len(),
                total
            ));
        }

        Ok(ImageHeader {
            version,
            mvid: Guid::from_bytes(mvid),
            name,
            sections,
        })
    }

    /// Reads the module name from the `#Strings` section of `image`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the name lies outside the section and
    /// [`crate::Error::Malformed`] if it is unterminated or not UTF-8.
    pub fn module_name(&self, image: &[u8]) -> Result<String> {
        let start = IMAGE_HEADER_SIZE
            .checked_add(self.sections[0] as usize)
            .ok_or(Error::OutOfBounds)?;
        let end = start
            .checked_add(self.sections[1] as usize)
            .ok_or(Error::OutOfBounds)?;
        let strings = image.get(start..end).ok_or(Error::OutOfBounds)?;
        let tail = strings.get(self.name as usize..).ok_or(Error::OutOfBounds)?;
        let length = tail
            .iter()
            .position(|byte| *byte == 0)
            .ok_or_else(|| malformed_error!("Unterminated module name"))?;
        String::from_utf8(tail[..length].to_vec())
            .map_err(|_| malformed_error!("Module name is not UTF-8"))
    }
}

/// Serialized image and symbol file of one module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenModule {
    /// The module image
    pub image: Vec<u8>,
    /// The debug symbol file, bound to `digest`
    pub symbols: Vec<u8>,
    /// Digest of `image`
    pub digest: ImageDigest,
}

/// Checks every method body against an independent stack analysis.
///
/// # Errors
/// Returns [`crate::Error::StackDepth`] for the first body whose declared maximum is below
/// what its instructions require, and propagates analysis failures.
pub fn validate_stack_depths(module: &Module) -> Result<()> {
    for method in module.methods() {
        let Some(body) = &method.body else {
            continue;
        };
        let required = compute_max_stack(body, !method.signature.return_type.is_void(), module)?;
        if required > body.max_stack {
            return Err(Error::StackDepth {
                method: method.token,
                declared: body.max_stack,
                required,
            });
        }
    }
    Ok(())
}

/// Writes a [`Module`] and its symbols.
///
/// Every write first runs [`validate_stack_depths`]; there is no way to skip it.
pub struct ModuleWriter<'a> {
    module: &'a Module,
}

struct Sections {
    tables: Vec<u8>,
    strings: StringHeapBuilder,
    blobs: BlobHeapBuilder,
    user_strings: UserStringHeapBuilder,
    bodies: Vec<u8>,
}

fn put_u8(buffer: &mut Vec<u8>, value: u8) {
    buffer.push(value);
}

fn put_u16(buffer: &mut Vec<u8>, value: u16) {
    buffer.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(buffer: &mut Vec<u8>, value: u32) {
    buffer.extend_from_slice(&value.to_le_bytes());
}

fn put_count(buffer: &mut Vec<u8>, count: usize) -> Result<()> {
    let count = u32::try_from(count).map_err(|_| malformed_error!("Count exceeds u32 range"))?;
    put_u32(buffer, count);
    Ok(())
}

fn put_tokens(buffer: &mut Vec<u8>, tokens: &[Token]) -> Result<()> {
    put_count(buffer, tokens.len())?;
    for token in tokens {
        put_u32(buffer, token.value());
    }
    Ok(())
}

impl<'a> ModuleWriter<'a> {
    /// A writer for `module`
    #[must_use]
    pub fn new(module: &'a Module) -> Self {
        ModuleWriter { module }
    }

    /// Serializes the module image and its symbol file.
    ///
    /// Validation runs before any byte is produced.
    ///
    /// # Errors
    /// Returns [`crate::Error::StackDepth`] if validation fails, and encoding errors for
    /// signatures, attribute blobs or bodies that cannot be represented.
    pub fn write(&self) -> Result<WrittenModule> {
        validate_stack_depths(self.module)?;

        let bodies = self
            .module
            .methods()
            .iter()
            .filter_map(|method| {
                method
                    .body
                    .as_ref()
                    .map(|body| body.encode().map(|encoded| (method.token, encoded)))
            })
            .collect::<Result<Vec<(Token, EncodedBody)>>>()?;

        let image = self.write_image(&bodies)?;
        let digest = image_digest(&image);
        let symbols = write_symbols(self.module, &bodies, &digest)?;

        Ok(WrittenModule {
            image,
            symbols,
            digest,
        })
    }

    fn write_image(&self, bodies: &[(Token, EncodedBody)]) -> Result<Vec<u8>> {
        let mut sections = Sections {
            tables: Vec::new(),
            strings: StringHeapBuilder::default(),
            blobs: BlobHeapBuilder::default(),
            user_strings: UserStringHeapBuilder::default(),
            bodies: Vec::new(),
        };
        let name = sections.strings.add(&self.module.name)?;

        let mut body_offsets = HashMap::with_capacity(bodies.len());
        for (token, encoded) in bodies {
            sections.bodies.resize(align_to_4(sections.bodies.len()), 0);
            let offset = u32::try_from(sections.bodies.len())
                .map_err(|_| malformed_error!("Body section exceeds u32 range"))?;
            sections.bodies.extend_from_slice(&encoded.bytes);
            body_offsets.insert(*token, offset);
        }
        sections.bodies.resize(align_to_4(sections.bodies.len()), 0);

        for value in self.module.user_strings() {
            sections.user_strings.add(value)?;
        }

        self.write_tables(&mut sections, &body_offsets)?;
        sections.tables.resize(align_to_4(sections.tables.len()), 0);

        let strings = sections.strings.finish();
        let blobs = sections.blobs.finish();
        let user_strings = sections.user_strings.finish();

        let mut image = Vec::with_capacity(
            IMAGE_HEADER_SIZE
                + sections.tables.len()
                + strings.len()
                + blobs.len()
                + user_strings.len()
                + sections.bodies.len(),
        );
        image.extend_from_slice(&IMAGE_MAGIC);
        put_u16(&mut image, IMAGE_VERSION);
        put_u16(&mut image, 0);
        image.extend_from_slice(&self.module.mvid.to_bytes());
        put_u32(&mut image, name);
        for section in [
            &sections.tables,
            &strings,
            &blobs,
            &user_strings,
            &sections.bodies,
        ] {
            put_count(&mut image, section.len())?;
        }

        image.extend_from_slice(&sections.tables);
        image.extend_from_slice(&strings);
        image.extend_from_slice(&blobs);
        image.extend_from_slice(&user_strings);
        image.extend_from_slice(&sections.bodies);
        Ok(image)
    }

    fn row_count(&self, table: TableId) -> usize {
        let module = self.module;
        match table {
            TableId::TypeRef => module.type_refs().len(),
            TableId::TypeDef => module.type_defs().len(),
            TableId::Field => module.fields().len(),
            TableId::MethodDef => module.methods().len(),
            TableId::MemberRef => module.member_refs().len(),
            TableId::CustomAttribute => module.custom_attributes().len(),
            TableId::StandAloneSig => module.standalone_sigs().len(),
            TableId::TypeSpec => module.type_specs().len(),
            TableId::MethodSpec => module.method_specs().len(),
        }
    }

    fn write_tables(
        &self,
        sections: &mut Sections,
        body_offsets: &HashMap<Token, u32>,
    ) -> Result<()> {
        let present: Vec<TableId> = TableId::iter()
            .filter(|table| self.row_count(*table) > 0)
            .collect();

        let tables = &mut sections.tables;
        #[allow(clippy::cast_possible_truncation)]
        put_u8(tables, present.len() as u8);
        for table in &present {
            put_u8(tables, *table as u8);
            put_count(tables, self.row_count(*table))?;
        }

        for table in present {
            self.write_rows(table, sections, body_offsets)?;
        }
        Ok(())
    }

    fn write_rows(
        &self,
        table: TableId,
        sections: &mut Sections,
        body_offsets: &HashMap<Token, u32>,
    ) -> Result<()> {
        let module = self.module;
        let Sections {
            tables,
            strings,
            blobs,
            ..
        } = sections;

        match table {
            TableId::TypeRef => {
                for row in module.type_refs() {
                    match &row.scope {
                        ResolutionScope::Assembly(assembly) => {
                            put_u8(tables, 0);
                            put_u32(tables, strings.add(assembly)?);
                        }
                        ResolutionScope::Nested(enclosing) => {
                            put_u8(tables, 1);
                            put_u32(tables, enclosing.value());
                        }
                    }
                    put_u32(tables, strings.add(&row.namespace)?);
                    put_u32(tables, strings.add(&row.name)?);
                }
            }
            TableId::TypeDef => {
                for row in module.type_defs() {
                    put_u32(tables, row.flags.bits());
                    put_u32(tables, strings.add(&row.namespace)?);
                    put_u32(tables, strings.add(&row.name)?);
                    put_u32(tables, row.extends.map_or(0, |token| token.value()));
                    put_u32(tables, row.enclosing.map_or(0, |token| token.value()));
                    put_count(tables, row.generic_params.len())?;
                    for param in &row.generic_params {
                        put_u32(tables, strings.add(param)?);
                    }
                    put_tokens(tables, &row.fields)?;
                    put_tokens(tables, &row.methods)?;
                }
            }
            TableId::Field => {
                for row in module.fields() {
                    put_u32(tables, row.declaring_type.value());
                    put_u16(tables, row.flags.bits());
                    put_u32(tables, strings.add(&row.name)?);
                    put_u32(tables, blobs.add(&encode_field_signature(&row.signature)?)?);
                }
            }
            TableId::MethodDef => {
                for row in module.methods() {
                    let body = body_offsets.get(&row.token).copied().unwrap_or(NO_BODY);
                    put_u32(tables, row.declaring_type.value());
                    put_u16(tables, row.flags.bits());
                    put_u16(tables, row.impl_flags.bits());
                    put_u32(tables, strings.add(&row.name)?);
                    put_u32(tables, blobs.add(&encode_method_signature(&row.signature)?)?);
                    put_count(tables, row.generic_params.len())?;
                    for param in &row.generic_params {
                        put_u32(tables, strings.add(param)?);
                    }
                    put_u32(tables, body);
                }
            }
            TableId::MemberRef => {
                for row in module.member_refs() {
                    put_u32(tables, row.parent.value());
                    put_u32(tables, strings.add(&row.name)?);
                    put_u32(tables, blobs.add(&encode_method_signature(&row.signature)?)?);
                }
            }
            TableId::CustomAttribute => {
                for row in module.custom_attributes() {
                    put_u32(tables, row.parent.value());
                    put_u32(tables, row.constructor.value());
                    put_u32(tables, blobs.add(&encode_custom_attribute_value(&row.value)?)?);
                }
            }
            TableId::StandAloneSig => {
                for row in module.standalone_sigs() {
                    put_u32(tables, blobs.add(&encode_local_var_signature(&row.locals)?)?);
                }
            }
            TableId::TypeSpec => {
                for row in module.type_specs() {
                    put_u32(tables, blobs.add(&encode_typespec_signature(&row.signature)?)?);
                }
            }
            TableId::MethodSpec => {
                for row in module.method_specs() {
                    put_u32(tables, row.method.value());
                    put_u32(
                        tables,
                        blobs.add(&encode_method_spec_signature(&row.instantiation)?)?,
                    );
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{Instruction, OpCode},
        metadata::{
            method::{MethodAttributes, MethodBody},
            module::MethodDefBuilder,
            signatures::{MethodSignature, TypeSignature},
        },
        test::{generic_cache_module, scenario_patch},
    };

    #[test]
    fn test_image_header() {
        let (module, _) = generic_cache_module("Patch");
        let written = ModuleWriter::new(&module).write().unwrap();

        assert_eq!(&written.image[..4], b"DPMD");
        let header = ImageHeader::parse(&written.image).unwrap();
        assert_eq!(header.version, IMAGE_VERSION);
        assert_eq!(header.mvid, module.mvid);
        // name is the first string
        assert_eq!(header.name, 1);
        assert_eq!(header.module_name(&written.image).unwrap(), "Patch");
        assert!(header.sections.iter().all(|size| size % 4 == 0));
        assert_eq!(written.digest, image_digest(&written.image));
    }

    #[test]
    fn test_deterministic() {
        let first = ModuleWriter::new(&scenario_patch()).write().unwrap();
        let second = ModuleWriter::new(&scenario_patch()).write().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            ImageHeader::parse(b"MZ\x90\x00"),
            Err(Error::OutOfBounds) | Err(Error::Malformed { .. })
        ));

        let (module, _) = generic_cache_module("Patch");
        let mut image = ModuleWriter::new(&module).write().unwrap().image;
        image.push(0);
        assert!(ImageHeader::parse(&image).is_err());
    }

    #[test]
    fn test_stack_depth_rejected_before_writing() {
        let (mut module, get) = generic_cache_module("Patch");
        module.method_mut(get).unwrap().body = Some(MethodBody::new(
            vec![
                Instruction::new(OpCode::Ldnull),
                Instruction::new(OpCode::Dup),
                Instruction::new(OpCode::Pop),
                Instruction::new(OpCode::Ret),
            ],
            1,
        ));

        assert!(matches!(
            ModuleWriter::new(&module).write(),
            Err(Error::StackDepth { method, declared: 1, required: 2 }) if method == get
        ));
    }

    #[test]
    fn test_method_without_body() {
        let (mut module, get) = generic_cache_module("Patch");
        let cache = module.method(get).unwrap().declaring_type;
        let peek = MethodDefBuilder::new("Peek")
            .flags(MethodAttributes::PUBLIC | MethodAttributes::STATIC)
            .signature(MethodSignature::new_static(TypeSignature::Void, vec![]))
            .build(&mut module, cache)
            .unwrap();
        assert!(module.method(peek).unwrap().body.is_none());

        let written = ModuleWriter::new(&module).write().unwrap();
        let again = ModuleWriter::new(&module).write().unwrap();
        assert_eq!(written, again);
        // the body-less method stores the sentinel offset
        assert!(written
            .image
            .windows(4)
            .any(|window| window == NO_BODY.to_le_bytes().as_slice()));
    }
}
