//! Summary of a finished pipeline run.

use std::fmt;

use crate::{
    metadata::{module::Module, token::Token},
    patch::{
        classification::{ClassificationMap, MethodClassification},
        lookup::LookupEntry,
    },
};

/// What a pipeline run changed in the patch module
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchReport {
    /// Name of the patched module
    pub module: String,
    /// Full names of methods classified as `Hook`, in token order
    pub hooked: Vec<String>,
    /// Full names of methods classified as `IlFix`, in token order
    pub fixed: Vec<String>,
    /// Static initializers that now return immediately
    pub neutralized: Vec<Token>,
    /// Number of generated wrappers
    pub wrappers: usize,
    /// Number of annotations written
    pub annotations: usize,
    /// Contents of the runtime lookup table
    pub lookup_entries: Vec<LookupEntry>,
}

impl PatchReport {
    pub(crate) fn new(module_name: &str, module: &Module, classifications: &ClassificationMap) -> Self {
        let names = |wanted: MethodClassification| {
            classifications
                .iter()
                .filter(|(_, kind)| *kind == wanted)
                .map(|(token, _)| {
                    module
                        .method_full_name(token)
                        .unwrap_or_else(|_| token.to_string())
                })
                .collect()
        };

        PatchReport {
            module: module_name.to_string(),
            hooked: names(MethodClassification::Hook),
            fixed: names(MethodClassification::IlFix),
            ..PatchReport::default()
        }
    }

    /// True if the run changed nothing the runtime has to act on
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooked.is_empty() && self.fixed.is_empty() && self.wrappers == 0
    }
}

impl fmt::Display for PatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} hooked, {} fixed, {} initializers neutralized, {} wrappers, {} table entries",
            self.module,
            self.hooked.len(),
            self.fixed.len(),
            self.neutralized.len(),
            self.wrappers,
            self.lookup_entries.len()
        )
    }
}
