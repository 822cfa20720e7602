// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]

//! # dotpatch
//!
//! A hot-reload patching engine for .NET modules. `dotpatch` takes a freshly compiled patch
//! module and rewrites it into an artifact that can replace methods of an already running
//! base module, without restarting the host process.
//!
//! ## What a patch run does
//!
//! - **Classification** - every method of the patch module is classified as unchanged,
//!   redirected (hook) or rewritten in place (IL fix) by an external classifier
//! - **Static initializer neutralization** - touched types get a `ret` prepended to their
//!   `.cctor`, so already-initialized state is not initialized a second time
//! - **Generic wrappers** - every instantiation of a patched generic method observed in the
//!   base module gets a non-generic forwarding stub
//! - **Annotations** - patched generic methods and wrappers are tagged with custom
//!   attributes the runtime dispatcher reads
//! - **Lookup table** - a well-known method is given a body that builds the
//!   base-instantiation to wrapper dictionary at load time
//! - **Publishing** - the module image and its debug symbols are written and swapped into
//!   place as a pair
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dotpatch::prelude::*;
//!
//! # fn collaborators() -> Collaborators { unimplemented!() }
//! # fn support_module() -> Module { unimplemented!() }
//! let context = Arc::new(PatchContext::new(PatchConfig::default(), &support_module())?);
//! let mut pipeline = PatchPipeline::new("Assembly-CSharp", context, collaborators());
//! if pipeline.run()? {
//!     let cache = ImageCache::new();
//!     pipeline.publish("Library/ScriptHotReload/Assembly-CSharp_patch.dll".as_ref(), &cache)?;
//! }
//! # Ok::<(), dotpatch::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`metadata`] - the append-only module model, signatures, custom attributes, bodies
//! - [`assembly`] - CIL instructions, encoding, stack tracking and analysis
//! - [`patch`] - the patch pipeline and its phases
//! - [`writer`] - module image and symbol serialization, publishing
//! - [`file`] - memory-mapped images and the image cache
//! - [`Error`] and [`Result`] - error handling

#[macro_use]
pub(crate) mod error;
pub(crate) mod utils;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
pub mod prelude;

/// CIL instructions, their encoding and stack analysis
pub mod assembly;

/// Memory-mapped module images
pub mod file;

/// The module model and ECMA-335 encodings
pub mod metadata;

/// The patch pipeline
///
/// # Examples
///
/// ```rust,no_run
/// use dotpatch::patch::{MethodClassification, ClassificationMap};
/// use dotpatch::metadata::token::Token;
///
/// let mut map = ClassificationMap::default();
/// map.record(Token::new(0x06000001), MethodClassification::IlFix);
/// map.record(Token::new(0x06000001), MethodClassification::Hook);
/// assert_eq!(map.get(Token::new(0x06000001)), MethodClassification::Hook);
/// ```
pub mod patch;

/// Module image and debug symbol writers, and the publisher
pub mod writer;

/// `dotpatch` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `dotpatch` Error type
///
/// Every fallible operation of the crate reports one of its variants.
pub use error::Error;
