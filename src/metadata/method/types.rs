//! Method attribute and body flags.
//!
//! Values follow ECMA-335 II.23.1.10 (`MethodAttributes`), II.23.1.11
//! (`MethodImplAttributes`) and II.25.4 (method header flags).

use bitflags::bitflags;

/// Mask of the member access bits in [`MethodAttributes`]
pub const METHOD_ACCESS_MASK: u16 = 0x0007;

bitflags! {
    /// Method attributes
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MethodAttributes: u16 {
        /// Accessible only by the parent type
        const PRIVATE = 0x0001;
        /// Accessible by anyone in the assembly
        const ASSEM = 0x0003;
        /// Accessible by anyone
        const PUBLIC = 0x0006;
        /// Defined on type, else per instance
        const STATIC = 0x0010;
        /// Method cannot be overridden
        const FINAL = 0x0020;
        /// Method is virtual
        const VIRTUAL = 0x0040;
        /// Method hides by name+sig, else just by name
        const HIDE_BY_SIG = 0x0080;
        /// Method does not provide an implementation
        const ABSTRACT = 0x0400;
        /// Method is special
        const SPECIAL_NAME = 0x0800;
        /// Runtime should check name encoding
        const RTSPECIAL_NAME = 0x1000;
    }
}

impl MethodAttributes {
    /// Attributes of a static type initializer
    #[must_use]
    pub fn type_initializer() -> Self {
        MethodAttributes::PRIVATE
            | MethodAttributes::STATIC
            | MethodAttributes::HIDE_BY_SIG
            | MethodAttributes::SPECIAL_NAME
            | MethodAttributes::RTSPECIAL_NAME
    }
}

bitflags! {
    /// Method implementation attributes
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MethodImplAttributes: u16 {
        /// Method implementation is provided by the runtime
        const RUNTIME = 0x0003;
        /// Method cannot be inlined
        const NO_INLINING = 0x0008;
        /// Method is single threaded through the body
        const SYNCHRONIZED = 0x0020;
        /// Method is implemented inside the runtime
        const INTERNAL_CALL = 0x1000;
    }
}

bitflags! {
    /// Method header flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MethodBodyFlags: u16 {
        /// Tiny header format
        const TINY_FORMAT = 0x2;
        /// Fat header format
        const FAT_FORMAT = 0x3;
        /// More data sections follow the code
        const MORE_SECTS = 0x8;
        /// Zero-initialize local variables
        const INIT_LOCALS = 0x10;
    }
}
