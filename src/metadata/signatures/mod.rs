//! Method, field and type signatures.
//!
//! Signatures describe the types that make up a method's calling convention, a field's type
//! or a constructed type (`TypeSpec`). The module model keeps them decoded as
//! [`TypeSignature`] / [`MethodSignature`]; the [`encoders`] turn them into ECMA-335 blobs when
//! an image is written.
//!
//! # Generic substitution
//!
//! Wrapper generation needs the signature of a generic method with its parameters pinned to
//! concrete arguments. [`TypeSignature::substitute`] and [`MethodSignature::substitute`] replace
//! `!n` (type parameters) and `!!n` (method parameters) recursively.
//!
//! # Reference
//! * [ECMA-335 Partition II, Section 23.2](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf) - Blobs and signatures

mod encoders;
mod types;

pub use encoders::*;
pub use types::*;
