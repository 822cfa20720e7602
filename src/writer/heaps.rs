//! Heap builders for the module image.
//!
//! All heaps start with a single null entry at offset 0 and deduplicate their contents, so
//! the same input always yields the same offsets. Heaps are padded to a 4-byte boundary
//! with `0xFF`, matching ECMA-335 stream padding.
//!
//! - `#Strings`: null-terminated UTF-8
//! - `#Blob`: compressed length prefix followed by the bytes
//! - `#US`: compressed length prefix, UTF-16LE code units and a trailing flag byte that is
//!   set when any character is outside the ASCII range

use std::collections::HashMap;

use crate::{utils::write_compressed_uint, Result};

/// Common behaviour of the heap builders
pub trait HeapBuilder {
    /// Size of the heap content before padding
    fn len(&self) -> usize;

    /// True if only the null entry exists
    fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    /// Returns the padded heap bytes
    fn finish(self) -> Vec<u8>;
}

fn pad(mut bytes: Vec<u8>) -> Vec<u8> {
    while bytes.len() % 4 != 0 {
        bytes.push(0xFF);
    }
    bytes
}

fn offset(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| malformed_error!("Heap exceeds u32 range - {}", len))
}

/// `#Strings` heap builder
#[derive(Debug)]
pub struct StringHeapBuilder {
    data: Vec<u8>,
    offsets: HashMap<String, u32>,
}

impl Default for StringHeapBuilder {
    fn default() -> Self {
        StringHeapBuilder {
            data: vec![0],
            offsets: HashMap::new(),
        }
    }
}

impl StringHeapBuilder {
    /// Adds `value`, returning its offset; the empty string maps to 0
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap outgrows 32-bit offsets.
    pub fn add(&mut self, value: &str) -> Result<u32> {
        if value.is_empty() {
            return Ok(0);
        }
        if let Some(existing) = self.offsets.get(value) {
            return Ok(*existing);
        }

        let position = offset(self.data.len())?;
        self.data.extend_from_slice(value.as_bytes());
        self.data.push(0);
        self.offsets.insert(value.to_string(), position);
        Ok(position)
    }
}

impl HeapBuilder for StringHeapBuilder {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn finish(self) -> Vec<u8> {
        pad(self.data)
    }
}

/// `#Blob` heap builder
#[derive(Debug)]
pub struct BlobHeapBuilder {
    data: Vec<u8>,
    offsets: HashMap<Vec<u8>, u32>,
}

impl Default for BlobHeapBuilder {
    fn default() -> Self {
        BlobHeapBuilder {
            data: vec![0],
            offsets: HashMap::new(),
        }
    }
}

impl BlobHeapBuilder {
    /// Adds `blob`, returning its offset; the empty blob maps to 0
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap outgrows 32-bit offsets.
    pub fn add(&mut self, blob: &[u8]) -> Result<u32> {
        if blob.is_empty() {
            return Ok(0);
        }
        if let Some(existing) = self.offsets.get(blob) {
            return Ok(*existing);
        }

        let position = offset(self.data.len())?;
        write_compressed_uint(offset(blob.len())?, &mut self.data);
        self.data.extend_from_slice(blob);
        self.offsets.insert(blob.to_vec(), position);
        Ok(position)
    }
}

impl HeapBuilder for BlobHeapBuilder {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn finish(self) -> Vec<u8> {
        pad(self.data)
    }
}

/// `#US` heap builder.
///
/// User strings are stored in token order without deduplication: the module already
/// deduplicates them and `ldstr` operands refer to them by row.
#[derive(Debug)]
pub struct UserStringHeapBuilder {
    data: Vec<u8>,
}

impl Default for UserStringHeapBuilder {
    fn default() -> Self {
        UserStringHeapBuilder { data: vec![0] }
    }
}

impl UserStringHeapBuilder {
    /// Appends `value`, returning its offset
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap outgrows 32-bit offsets.
    pub fn add(&mut self, value: &str) -> Result<u32> {
        let position = offset(self.data.len())?;
        let utf16: Vec<u8> = value.encode_utf16().flat_map(u16::to_le_bytes).collect();

        write_compressed_uint(offset(utf16.len() + 1)?, &mut self.data);
        self.data.extend_from_slice(&utf16);
        self.data
            .push(u8::from(value.chars().any(|c| c as u32 >= 0x80)));
        Ok(position)
    }
}

impl HeapBuilder for UserStringHeapBuilder {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn finish(self) -> Vec<u8> {
        pad(self.data)
    }
}
