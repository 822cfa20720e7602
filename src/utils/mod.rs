//! Small encoding helpers shared by the signature, attribute and image writers.

/// Writes a compressed unsigned integer according to ECMA-335 II.23.2.
///
/// Values up to `0x7F` take one byte, up to `0x3FFF` two bytes and up to `0x1FFF_FFFF`
/// four bytes. Larger values cannot be represented; callers validate counts before encoding
/// so the value is clamped to the 4-byte range here.
pub fn write_compressed_uint(value: u32, buffer: &mut Vec<u8>) {
    if value <= 0x7F {
        #[allow(clippy::cast_possible_truncation)]
        buffer.push(value as u8);
    } else if value <= 0x3FFF {
        #[allow(clippy::cast_possible_truncation)]
        {
            buffer.push(0x80 | ((value >> 8) as u8));
            buffer.push(value as u8);
        }
    } else {
        let value = value.min(0x1FFF_FFFF);
        #[allow(clippy::cast_possible_truncation)]
        {
            buffer.push(0xC0 | ((value >> 24) as u8));
            buffer.push((value >> 16) as u8);
            buffer.push((value >> 8) as u8);
            buffer.push(value as u8);
        }
    }
}

/// Writes a length-prefixed UTF-8 string (`SerString`, ECMA-335 II.23.3).
///
/// `None` is encoded as the single byte `0xFF`.
pub fn write_ser_string(value: Option<&str>, buffer: &mut Vec<u8>) {
    match value {
        Some(text) => {
            let len = u32::try_from(text.len()).unwrap_or(u32::MAX);
            write_compressed_uint(len, buffer);
            buffer.extend_from_slice(text.as_bytes());
        }
        None => buffer.push(0xFF),
    }
}

/// Aligns a position to a 4-byte boundary.
#[inline]
#[must_use]
pub fn align_to_4(pos: usize) -> usize {
    (pos + 3) & !3
}

/// Fixed-size integers readable from little-endian bytes
pub trait LeIO: Sized {
    /// Byte array of the type's width
    type Bytes: Sized + for<'a> TryFrom<&'a [u8]>;

    /// Reads `Self` from little-endian bytes
    fn from_le_bytes(bytes: Self::Bytes) -> Self;
}

macro_rules! impl_le_io {
    ($($ty:ty),*) => {
        $(
            impl LeIO for $ty {
                type Bytes = [u8; std::mem::size_of::<$ty>()];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }
            }
        )*
    };
}

impl_le_io!(u8, u16, u32, u64);

/// Reads a little-endian `T` at `offset` and advances it
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if `data` is too short.
pub fn read_le_at<T: LeIO>(data: &[u8], offset: &mut usize) -> crate::Result<T> {
    let type_len = std::mem::size_of::<T>();
    let end = offset
        .checked_add(type_len)
        .ok_or(crate::Error::OutOfBounds)?;
    let Some(slice) = data.get(*offset..end) else {
        return Err(crate::Error::OutOfBounds);
    };
    let Ok(read) = slice.try_into() else {
        return Err(crate::Error::OutOfBounds);
    };

    *offset = end;
    Ok(T::from_le_bytes(read))
}

/// Reads `len` raw bytes at `offset` and advances it
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if `data` is too short.
pub fn read_bytes_at<'a>(data: &'a [u8], offset: &mut usize, len: usize) -> crate::Result<&'a [u8]> {
    let end = offset.checked_add(len).ok_or(crate::Error::OutOfBounds)?;
    let slice = data.get(*offset..end).ok_or(crate::Error::OutOfBounds)?;
    *offset = end;
    Ok(slice)
}
