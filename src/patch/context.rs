//! Read-only state shared by every pipeline of a process.

use crate::{
    metadata::module::Module,
    patch::{annotations::SupportTypes, PatchConfig},
    Result,
};

/// Configuration and resolved support types.
///
/// Built once, then shared between pipelines behind an `Arc`. Nothing in it changes after
/// construction, so runs sharing a context cannot influence each other's output.
#[derive(Debug)]
pub struct PatchContext {
    /// Names and switches of the run
    pub config: PatchConfig,
    /// Annotation types of the support module
    pub support: SupportTypes,
}

impl PatchContext {
    /// Resolves the support types from `support_module`.
    ///
    /// # Errors
    /// Returns [`crate::Error::SupportTypeMissing`] if an annotation type cannot be found.
    pub fn new(config: PatchConfig, support_module: &Module) -> Result<Self> {
        let support = SupportTypes::resolve(support_module, &config)?;
        log::debug!(
            "Resolved support types {} and {} from {}",
            support.index_attribute.full_name(),
            support.wrapper_attribute.full_name(),
            support_module.name
        );

        Ok(PatchContext {
            config,
            support,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        test::{empty_module, support_module},
        Error,
    };

    #[test]
    fn test_context_resolves_support_types() {
        let context = PatchContext::new(PatchConfig::default(), &support_module()).unwrap();
        assert_eq!(
            context.support.wrapper_attribute.full_name(),
            "ScriptHotReload.GenericMethodWrapperAttribute"
        );
    }

    #[test]
    fn test_context_without_support_types() {
        let result = PatchContext::new(PatchConfig::default(), &empty_module("ShareCode"));
        assert!(matches!(
            result,
            Err(Error::SupportTypeMissing(name)) if name == "ScriptHotReload.GenericMethodIndexAttribute"
        ));
    }
}
