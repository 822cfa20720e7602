//! The metadata model of a .NET module and its binary encodings.
//!
//! # Key Components
//!
//! - [`module`] - The append-only, in-memory [`module::Module`] and its builders
//! - [`tables`] - Row types of the modelled metadata tables
//! - [`token`] - Metadata tokens used to address rows
//! - [`method`] - Method bodies, headers and exception handlers
//! - [`signatures`] - Type and method signatures and their blob encoders
//! - [`customattributes`] - Custom attribute values and their blob encoder
//! - [`importer`] - Importing references from one module into another
//! - [`sequencepoints`] - Source documents and sequence points for debug symbols
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotpatch::metadata::{
//!     method::MethodAttributes,
//!     module::{MethodDefBuilder, Module, TypeDefBuilder},
//!     signatures::{MethodSignature, TypeSignature},
//! };
//!
//! # fn example(module: &mut Module) -> dotpatch::Result<()> {
//! let cache = TypeDefBuilder::new("Game", "Cache").build(module)?;
//! let get = MethodDefBuilder::new("Get")
//!     .flags(MethodAttributes::PUBLIC | MethodAttributes::STATIC)
//!     .generic_param("T")
//!     .signature(MethodSignature::new_static(
//!         TypeSignature::GenericParamMethod(0),
//!         vec![TypeSignature::I4],
//!     ))
//!     .build(module, cache)?;
//! println!("{}", module.type_full_name(cache)?);
//! # let _ = get;
//! # Ok(())
//! # }
//! ```

/// Custom attribute values and blob encoding
pub mod customattributes;
/// Importing base-module references into the patch module
pub mod importer;
/// Method bodies and exception handlers
pub mod method;
/// The in-memory module model
pub mod module;
/// Source documents and sequence points
pub mod sequencepoints;
/// Type and method signatures
pub mod signatures;
/// Metadata table identifiers and rows
pub mod tables;
/// Metadata tokens
pub mod token;
/// Type system constants and attribute flags
pub mod typesystem;
