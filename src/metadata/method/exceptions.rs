//! Exception handler representation for CIL method bodies.
//!
//! Protected regions and handlers are expressed as instruction index ranges, so they follow
//! their instructions when the body is edited. Byte offsets are produced when the body is
//! encoded into a fat exception-handling section (ECMA-335 II.25.4.6).

use bitflags::bitflags;

use crate::{assembly::EncodedCode, metadata::token::Token, Result};

bitflags! {
    /// Exception handler flags defining the type of exception handling clause.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExceptionHandlerFlags: u16 {
        /// A typed exception clause.
        const EXCEPTION = 0x0000;
        /// An exception filter and handler clause.
        const FILTER = 0x0001;
        /// A finally clause.
        const FINALLY = 0x0002;
        /// A fault clause (finally that executes only on exception).
        const FAULT = 0x0004;
    }
}

/// Exception handler defining a try block and its handler within a method.
///
/// All ranges are half-open instruction index ranges `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Flags describing the type of exception handler (catch, filter, finally, fault).
    pub flags: ExceptionHandlerFlags,
    /// First instruction of the protected region
    pub try_start: usize,
    /// One past the last instruction of the protected region
    pub try_end: usize,
    /// First instruction of the handler
    pub handler_start: usize,
    /// One past the last instruction of the handler
    pub handler_end: usize,
    /// Caught exception type for typed clauses
    pub class_token: Option<Token>,
    /// First instruction of the filter block for filter clauses
    pub filter_start: Option<usize>,
}

impl ExceptionHandler {
    /// Evaluation stack depth on entry to the handler block
    #[must_use]
    pub fn handler_entry_depth(&self) -> u16 {
        if self.flags.contains(ExceptionHandlerFlags::FINALLY)
            || self.flags.contains(ExceptionHandlerFlags::FAULT)
        {
            0
        } else {
            1
        }
    }

    /// Adjusts every index for an instruction inserted at `index`.
    pub(crate) fn shift_for_insert(&mut self, index: usize) {
        let start = |value: &mut usize| {
            if *value >= index {
                *value += 1;
            }
        };
        let end = |value: &mut usize| {
            if *value > index {
                *value += 1;
            }
        };

        start(&mut self.try_start);
        end(&mut self.try_end);
        start(&mut self.handler_start);
        end(&mut self.handler_end);
        if let Some(filter) = self.filter_start.as_mut() {
            start(filter);
        }
    }
}

/// Encodes exception handlers as a fat `EHTable` section.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if a range does not map to an instruction offset.
pub fn encode_exception_handlers(
    handlers: &[ExceptionHandler],
    code: &EncodedCode,
) -> Result<Vec<u8>> {
    let data_size = 4 + handlers.len() * 24;
    if data_size > 0x00FF_FFFF {
        return Err(malformed_error!("Too many exception handlers - {}", handlers.len()));
    }

    let offset = |index: usize| {
        code.offset_of(index)
            .ok_or_else(|| malformed_error!("Exception handler index {} out of range", index))
    };

    let mut buffer = Vec::with_capacity(data_size);
    // EHTable | FatFormat
    buffer.push(0x41);
    #[allow(clippy::cast_possible_truncation)]
    {
        buffer.push(data_size as u8);
        buffer.push((data_size >> 8) as u8);
        buffer.push((data_size >> 16) as u8);
    }

    for handler in handlers {
        let try_offset = offset(handler.try_start)?;
        let try_end = offset(handler.try_end)?;
        let handler_offset = offset(handler.handler_start)?;
        let handler_end = offset(handler.handler_end)?;

        let class_or_filter = if handler.flags.contains(ExceptionHandlerFlags::FILTER) {
            let filter = handler
                .filter_start
                .ok_or_else(|| malformed_error!("Filter clause without filter block"))?;
            offset(filter)?
        } else {
            handler.class_token.map_or(0, |token| token.value())
        };

        buffer.extend_from_slice(&u32::from(handler.flags.bits()).to_le_bytes());
        buffer.extend_from_slice(&try_offset.to_le_bytes());
        buffer.extend_from_slice(&try_end.saturating_sub(try_offset).to_le_bytes());
        buffer.extend_from_slice(&handler_offset.to_le_bytes());
        buffer.extend_from_slice(&handler_end.saturating_sub(handler_offset).to_le_bytes());
        buffer.extend_from_slice(&class_or_filter.to_le_bytes());
    }

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finally_handler() -> ExceptionHandler {
        ExceptionHandler {
            flags: ExceptionHandlerFlags::FINALLY,
            try_start: 0,
            try_end: 2,
            handler_start: 2,
            handler_end: 4,
            class_token: None,
            filter_start: None,
        }
    }

    #[test]
    fn test_shift_for_prepend() {
        let mut handler = finally_handler();
        handler.shift_for_insert(0);
        assert_eq!(
            (handler.try_start, handler.try_end, handler.handler_start, handler.handler_end),
            (1, 3, 3, 5)
        );
    }

    #[test]
    fn test_shift_at_region_end() {
        let mut handler = finally_handler();
        handler.shift_for_insert(2);
        assert_eq!(handler.try_end, 2);
        assert_eq!(handler.handler_start, 3);
        assert_eq!(handler.handler_end, 5);
    }

    #[test]
    fn test_entry_depth() {
        assert_eq!(finally_handler().handler_entry_depth(), 0);
        let mut catch = finally_handler();
        catch.flags = ExceptionHandlerFlags::EXCEPTION;
        catch.class_token = Some(Token::new(0x01000004));
        assert_eq!(catch.handler_entry_depth(), 1);
    }

    #[test]
    fn test_encode_section() {
        let code = EncodedCode {
            bytes: vec![0x00; 10],
            offsets: vec![0, 1, 6, 8],
        };
        let section = encode_exception_handlers(&[finally_handler()], &code).unwrap();
        assert_eq!(section.len(), 28);
        assert_eq!(&section[..4], &[0x41, 28, 0, 0]);
        assert_eq!(&section[4..8], &2u32.to_le_bytes());
        assert_eq!(&section[8..12], &0u32.to_le_bytes());
        assert_eq!(&section[12..16], &6u32.to_le_bytes());
        assert_eq!(&section[16..20], &6u32.to_le_bytes());
        assert_eq!(&section[20..24], &4u32.to_le_bytes());
    }
}
