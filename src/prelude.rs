//! # dotpatch Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the dotpatch library. Import this module to get quick access to everything needed
//! to set up and run a patch pipeline.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dotpatch operations
pub use crate::Error;

/// The result type used throughout dotpatch
pub use crate::Result;

/// Configuration of a patch run
pub use crate::patch::PatchConfig;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// Shared configuration, support types and ordinal allocator
pub use crate::patch::PatchContext;

/// The pipeline and its states
pub use crate::patch::{PatchPipeline, PipelineState};

/// Parallel patching of several modules
pub use crate::patch::{PatchLocks, PatchOutcome, PatchSession};

/// Summary of a pipeline run
pub use crate::patch::PatchReport;

// ================================================================================================
// Collaborators
// ================================================================================================

/// Contracts of the injected components
pub use crate::patch::{
    ClassifyContext, Collaborators, DiffOutcome, InstantiationScanner, MethodClassifier,
    ModuleDiffer, ModulePair, WrapperBodyGenerator, WrapperRequest,
};

/// The built-in wrapper generator
pub use crate::patch::ForwardingWrapperGenerator;

/// Classification results
pub use crate::patch::{ClassificationMap, MethodClassification};

/// Generic instantiation records
pub use crate::patch::{GenericMethodRecord, InstantiationRecord};

// ================================================================================================
// Module Model
// ================================================================================================

/// Metadata token type for referencing table entries
pub use crate::metadata::token::Token;

/// The mutable module and its builders
pub use crate::metadata::module::{MethodDefBuilder, Module, TypeDefBuilder};

/// Signatures
pub use crate::metadata::signatures::{MethodSignature, TypeSignature};

/// Method bodies and flags
pub use crate::metadata::method::{MethodAttributes, MethodBody};

/// Table identifiers
pub use crate::metadata::tables::TableId;

// ================================================================================================
// Instructions
// ================================================================================================

/// Instructions and the stack-tracking assembler
pub use crate::assembly::{Instruction, InstructionAssembler, OpCode, Operand};

// ================================================================================================
// Output
// ================================================================================================

/// Module image access
pub use crate::file::{Backend, ImageCache};

/// Writing and publishing
pub use crate::writer::{
    verify_published, ModuleWriter, PublishStatus, PublishedPaths, Publisher, WrittenModule,
};
