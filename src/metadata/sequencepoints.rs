//! Sequence points and source documents for debug symbols.
//!
//! A sequence point maps an instruction to a source span. Here it is attached to the
//! [`crate::assembly::Instruction`] it describes; the IL offset is only computed when the
//! symbol file is written, so instructions can be inserted before it without losing the
//! mapping.

/// Line number that marks a hidden sequence point
pub const HIDDEN_LINE: u32 = 0x00FE_EFEE;

/// A source document referenced by sequence points
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Path of the document as recorded by the compiler
    pub name: String,
}

/// A source span an instruction belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencePoint {
    /// Index into the module's document list
    pub document: u32,
    /// Starting line (1-based)
    pub start_line: u32,
    /// Starting column (1-based)
    pub start_col: u16,
    /// Ending line (1-based)
    pub end_line: u32,
    /// Ending column (1-based)
    pub end_col: u16,
    /// True if this is a hidden sequence point
    pub is_hidden: bool,
}

impl SequencePoint {
    /// A visible sequence point covering one span
    #[must_use]
    pub fn new(document: u32, start_line: u32, start_col: u16, end_line: u32, end_col: u16) -> Self {
        SequencePoint {
            document,
            start_line,
            start_col,
            end_line,
            end_col,
            is_hidden: false,
        }
    }

    /// A hidden sequence point in `document`
    #[must_use]
    pub fn hidden(document: u32) -> Self {
        SequencePoint {
            document,
            start_line: HIDDEN_LINE,
            start_col: 0,
            end_line: HIDDEN_LINE,
            end_col: 0,
            is_hidden: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden() {
        let sp = SequencePoint::hidden(2);
        assert!(sp.is_hidden);
        assert_eq!(sp.start_line, HIDDEN_LINE);
        assert_eq!(sp.document, 2);
        assert!(!SequencePoint::new(0, 3, 5, 3, 20).is_hidden);
    }
}
