//! Generic method instantiation records and ordinal allocation.

use crate::metadata::{signatures::TypeSignature, token::Token};

/// One concrete instantiation of a patched generic method observed in the base module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstantiationRecord {
    /// Generic arguments of the declaring type, in patch-module token space
    pub type_args: Vec<TypeSignature>,
    /// Generic arguments of the method, in patch-module token space
    pub method_args: Vec<TypeSignature>,
    /// The instantiated method in the base module (`MethodSpec` or `MemberRef`)
    pub base_method: Token,
    /// The generated wrapper, filled in by the wrapper phase
    pub wrapper: Option<Token>,
}

impl InstantiationRecord {
    /// A record without a wrapper yet
    #[must_use]
    pub fn new(
        type_args: Vec<TypeSignature>,
        method_args: Vec<TypeSignature>,
        base_method: Token,
    ) -> Self {
        InstantiationRecord {
            type_args,
            method_args,
            base_method,
            wrapper: None,
        }
    }

    /// Type arguments followed by method arguments
    #[must_use]
    pub fn all_args(&self) -> Vec<TypeSignature> {
        self.type_args
            .iter()
            .chain(self.method_args.iter())
            .cloned()
            .collect()
    }
}

/// A patched generic method and its observed instantiations in discovery order.
///
/// The position of an instantiation in `instantiations` is its instantiation ordinal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericMethodRecord {
    /// The generic method definition in the patch module
    pub method: Token,
    /// Ordinal index shared with all wrappers, assigned by the wrapper phase
    pub ordinal: Option<u32>,
    /// Observed instantiations
    pub instantiations: Vec<InstantiationRecord>,
}

impl GenericMethodRecord {
    /// A record with no ordinal assigned yet
    #[must_use]
    pub fn new(method: Token, instantiations: Vec<InstantiationRecord>) -> Self {
        GenericMethodRecord {
            method,
            ordinal: None,
            instantiations,
        }
    }
}

/// Hands out ordinal indices, one per patched generic method.
///
/// Every pipeline owns its own allocator, so ordinals of a patch module start at 0 and only
/// depend on the scan order of that module.
#[derive(Debug, Default)]
pub struct OrdinalAllocator {
    next: u32,
}

impl OrdinalAllocator {
    /// An allocator starting at zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a fresh ordinal
    pub fn allocate(&mut self) -> u32 {
        let ordinal = self.next;
        self.next += 1;
        ordinal
    }

    /// The ordinal the next call to [`OrdinalAllocator::allocate`] returns
    #[must_use]
    pub fn peek(&self) -> u32 {
        self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinals_are_sequential() {
        let mut ordinals = OrdinalAllocator::new();
        assert_eq!(ordinals.peek(), 0);
        assert_eq!(ordinals.allocate(), 0);
        assert_eq!(ordinals.allocate(), 1);
        assert_eq!(ordinals.peek(), 2);
    }

    #[test]
    fn test_all_args_order() {
        let record = InstantiationRecord::new(
            vec![TypeSignature::String],
            vec![TypeSignature::I4, TypeSignature::Boolean],
            Token::new(0x2B000001),
        );
        assert_eq!(
            record.all_args(),
            vec![TypeSignature::String, TypeSignature::I4, TypeSignature::Boolean]
        );
        assert!(record.wrapper.is_none());
    }
}
