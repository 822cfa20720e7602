//! Method attributes, bodies and exception handlers.
//!
//! # Key Types
//! - [`MethodBody`]: instructions, handlers, declared stack depth and local signature
//! - [`ExceptionHandler`]: try/catch/finally/fault regions as instruction index ranges
//! - [`MethodAttributes`], [`MethodImplAttributes`], [`MethodBodyFlags`]: flag sets

mod body;
mod exceptions;
mod types;

pub use body::{EncodedBody, MethodBody};
pub use exceptions::{encode_exception_handlers, ExceptionHandler, ExceptionHandlerFlags};
pub use types::*;
