//! Debug symbol serialization.
//!
//! The symbol file maps IL offsets back to source spans. It is bound to exactly one module
//! image through the image's SHA-1 digest; a runtime that finds a symbol file whose digest
//! does not match the image next to it must not use it.
//!
//! ```text
//! "DPSY"  u16 version  u16 reserved
//! digest  20 bytes
//! MVID    16 bytes
//! u32 document count, then per document: u32 length, UTF-8 name
//! u32 method count, then per method:
//!     u32 token, u32 point count, then per point:
//!     u32 IL offset, u32 document, u32 start line, u16 start column,
//!     u32 end line, u16 end column, u8 hidden
//! ```
//!
//! IL offsets come from the encoded bodies, so they reflect every instruction inserted
//! after the sequence points were recorded.

use uguid::Guid;

use crate::{
    metadata::{
        method::EncodedBody, module::Module, sequencepoints::SequencePoint, token::Token,
    },
    utils::{read_bytes_at, read_le_at},
    writer::image::ImageDigest,
    Result,
};

/// Magic bytes at the start of every symbol file
pub const SYMBOLS_MAGIC: [u8; 4] = *b"DPSY";
/// Current symbol format version
pub const SYMBOLS_VERSION: u16 = 1;

/// Sequence points of one method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSymbols {
    /// The method
    pub method: Token,
    /// IL offset and source span, in instruction order
    pub points: Vec<(u32, SequencePoint)>,
}

/// A parsed symbol file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolFile {
    /// Digest of the image the symbols belong to
    pub digest: ImageDigest,
    /// MVID of the module
    pub mvid: Guid,
    /// Source document names
    pub documents: Vec<String>,
    /// Methods with at least one sequence point
    pub methods: Vec<MethodSymbols>,
}

fn put_u16(buffer: &mut Vec<u8>, value: u16) {
    buffer.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(buffer: &mut Vec<u8>, value: u32) {
    buffer.extend_from_slice(&value.to_le_bytes());
}

fn to_u32(value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| malformed_error!("Symbol count exceeds u32 range"))
}

/// Serializes the sequence points of `module`.
///
/// `bodies` are the encoded bodies that went into the image, `digest` the image's digest.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if a sequence point refers to an unknown document or
/// an instruction offset cannot be resolved.
pub fn write_symbols(
    module: &Module,
    bodies: &[(Token, EncodedBody)],
    digest: &ImageDigest,
) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    buffer.extend_from_slice(&SYMBOLS_MAGIC);
    put_u16(&mut buffer, SYMBOLS_VERSION);
    put_u16(&mut buffer, 0);
    buffer.extend_from_slice(digest);
    buffer.extend_from_slice(&module.mvid.to_bytes());

    let documents = module.documents();
    put_u32(&mut buffer, to_u32(documents.len())?);
    for document in documents {
        put_u32(&mut buffer, to_u32(document.name.len())?);
        buffer.extend_from_slice(document.name.as_bytes());
    }

    let mut methods = Vec::new();
    for (token, encoded) in bodies {
        let Some(body) = module.method(*token).and_then(|method| method.body.as_ref()) else {
            continue;
        };

        let mut points = Vec::new();
        for (index, instruction) in body.instructions.iter().enumerate() {
            let Some(point) = instruction.sequence_point else {
                continue;
            };
            if point.document as usize >= documents.len() {
                return Err(malformed_error!(
                    "Sequence point of {} refers to unknown document {}",
                    token,
                    point.document
                ));
            }
            let offset = encoded.code.offset_of(index).ok_or_else(|| {
                malformed_error!("No IL offset for instruction {} of {}", index, token)
            })?;
            points.push((offset, point));
        }
        if !points.is_empty() {
            methods.push((*token, points));
        }
    }

    put_u32(&mut buffer, to_u32(methods.len())?);
    for (token, points) in methods {
        put_u32(&mut buffer, token.value());
        put_u32(&mut buffer, to_u32(points.len())?);
        for (offset, point) in points {
            put_u32(&mut buffer, offset);
            put_u32(&mut buffer, point.document);
            put_u32(&mut buffer, point.start_line);
            put_u16(&mut buffer, point.start_col);
            put_u32(&mut buffer, point.end_line);
            put_u16(&mut buffer, point.end_col);
            buffer.push(u8::from(point.is_hidden));
        }
    }

    Ok(buffer)
}

impl SymbolFile {
    /// Parses a symbol file
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a bad magic or invalid UTF-8 and
    /// [`crate::Error::OutOfBounds`] if the data is truncated.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut offset = 0;
        if read_bytes_at(data, &mut offset, 4)? != SYMBOLS_MAGIC.as_slice() {
            return Err(malformed_error!("Not a symbol file - bad magic"));
        }
        let _version = read_le_at::<u16>(data, &mut offset)?;
        let _reserved = read_le_at::<u16>(data, &mut offset)?;

        let mut digest = [0u8; 20];
        digest.copy_from_slice(read_bytes_at(data, &mut offset, 20)?);
        let mut mvid = [0u8; 16];
        mvid.copy_from_slice(read_bytes_at(data, &mut offset, 16)?);

        let document_count = read_le_at::<u32>(data, &mut offset)?;
        let mut documents = Vec::new();
        for _ in 0..document_count {
            let len = read_le_at::<u32>(data, &mut offset)? as usize;
            let name = std::str::from_utf8(read_bytes_at(data, &mut offset, len)?)
                .map_err(|_| malformed_error!("Document name is not valid UTF-8"))?;
            documents.push(name.to_string());
        }

        let method_count = read_le_at::<u32>(data, &mut offset)?;
        let mut methods = Vec::new();
        for _ in 0..method_count {
            let method = Token::new(read_le_at::<u32>(data, &mut offset)?);
            let point_count = read_le_at::<u32>(data, &mut offset)?;
            let mut points = Vec::new();
            for _ in 0..point_count {
                let il_offset = read_le_at::<u32>(data, &mut offset)?;
                let point = SequencePoint {
                    document: read_le_at::<u32>(data, &mut offset)?,
                    start_line: read_le_at::<u32>(data, &mut offset)?,
                    start_col: read_le_at::<u16>(data, &mut offset)?,
                    end_line: read_le_at::<u32>(data, &mut offset)?,
                    end_col: read_le_at::<u16>(data, &mut offset)?,
                    is_hidden: read_le_at::<u8>(data, &mut offset)? != 0,
                };
                points.push((il_offset, point));
            }
            methods.push(MethodSymbols { method, points });
        }

        if offset != data.len() {
            return Err(malformed_error!(
                "{} trailing bytes after symbol data",
                data.len() - offset
            ));
        }

        Ok(SymbolFile {
            digest,
            mvid: Guid::from_bytes(mvid),
            documents,
            methods,
        })
    }

    /// Sequence points of `method`, if it has any
    #[must_use]
    pub fn method(&self, method: Token) -> Option<&MethodSymbols> {
        self.methods.iter().find(|symbols| symbols.method == method)
    }
}
