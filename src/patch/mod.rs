//! Rewriting a patch module into a hot-loadable artifact.
//!
//! [`PatchPipeline`] drives the phases in order; each phase lives in its own module and can
//! be used on its own:
//!
//! - [`neutralizer`] - disables static initializers of touched types
//! - [`wrappers`] - forwarding stubs for observed generic instantiations
//! - [`annotations`] - discovery annotations on generic methods and wrappers
//! - [`lookup`] - the base-instantiation to wrapper table
//!
//! Diffing, classification and instantiation scanning are supplied by the caller through
//! [`Collaborators`]. [`PatchSession`] runs pipelines for several modules, guarding each
//! module with a [`PatchLocks`] entry.

pub mod annotations;
pub mod classification;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod generics;
pub mod lookup;
pub mod neutralizer;
pub mod pipeline;
pub mod report;
pub mod session;
pub mod wrappers;

pub use annotations::{
    annotate_records, find_index_annotation, find_wrapper_annotation, AnnotationWriter,
    IndexAnnotation, SupportType, SupportTypes, WrapperAnnotation,
};
pub use classification::{ClassificationMap, MethodClassification};
pub use collaborators::{
    ClassifyContext, Collaborators, DiffOutcome, InstantiationScanner, MethodClassifier,
    ModuleDiffer, ModulePair, WrapperBodyGenerator, WrapperRequest,
};
pub use config::PatchConfig;
pub use context::PatchContext;
pub use generics::{GenericMethodRecord, InstantiationRecord, OrdinalAllocator};
pub use lookup::{emit_lookup_table, find_lookup_method, read_lookup_table, LookupEntry};
pub use neutralizer::{neutralize_static_initializers, Exemption};
pub use pipeline::{PatchPipeline, PipelineState};
pub use report::PatchReport;
pub use session::{PatchGuard, PatchLocks, PatchOutcome, PatchSession};
pub use wrappers::{generate_wrappers, wrapper_name, ForwardingWrapperGenerator, WRAPPER_PREFIX};
