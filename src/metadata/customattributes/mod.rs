//! Custom attribute values and blob encoding.
//!
//! Custom attributes are the annotations the runtime dispatcher uses to find patched generic
//! methods and their wrappers. A value is kept decoded in the module model and only turned
//! into a blob when an image is written.
//!
//! # Custom Attribute Format
//!
//! - **Prolog** - Standard 0x0001 marker indicating a valid custom attribute blob
//! - **Fixed Arguments** - Constructor parameter values in declaration order
//! - **Named Arguments** - Field and property values with name/value pairs
//!
//! # References
//!
//! - ECMA-335 6th Edition, Partition II, Section 23.3 - Custom Attributes

mod encoder;
mod types;

pub use encoder::encode_custom_attribute_value;
pub use types::*;
