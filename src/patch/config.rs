//! Patch pipeline configuration.
//!
//! [`PatchConfig`] carries the well-known names the pipeline looks for in the patch and
//! support modules, plus the classification bound and file extensions. The defaults match
//! the names the hot-reload runtime is compiled against.

/// Configuration of a patch run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchConfig {
    /// Full name of the container type that receives generated wrappers
    pub wrapper_type: String,
    /// Name of the lookup-table method declared on the wrapper container
    pub lookup_method: String,
    /// Name fragment identifying compiler-generated closure containers
    pub closure_marker: String,
    /// Assembly name of the support module that defines the annotation types
    pub support_module: String,
    /// Full name of the annotation type attached to patched generic methods
    pub index_attribute: String,
    /// Full name of the annotation type attached to wrapper methods
    pub wrapper_attribute: String,
    /// Maximum depth of recursive classification through callees
    pub max_classification_depth: usize,
    /// File extension of module images, without the dot
    pub module_extension: String,
    /// File extension of debug symbol files, without the dot
    pub symbol_extension: String,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            wrapper_type: "ScriptHotReload.__Patch_GenericInst_Wrapper__Gen__".to_string(),
            lookup_method: "GetGenericInstMethodForPatch".to_string(),
            closure_marker: "<>c".to_string(),
            support_module: "ShareCode".to_string(),
            index_attribute: "ScriptHotReload.GenericMethodIndexAttribute".to_string(),
            wrapper_attribute: "ScriptHotReload.GenericMethodWrapperAttribute".to_string(),
            max_classification_depth: 10,
            module_extension: "dll".to_string(),
            symbol_extension: "pdb".to_string(),
        }
    }
}

impl PatchConfig {
    /// Configuration used by production hot-reload runs
    #[must_use]
    pub fn production() -> Self {
        Self::default()
    }

    /// Classifies the changed methods and their direct callees only
    #[must_use]
    pub fn shallow() -> Self {
        Self {
            max_classification_depth: 1,
            ..Self::default()
        }
    }

    /// Overrides the classification recursion bound
    #[must_use]
    pub fn with_max_classification_depth(mut self, depth: usize) -> Self {
        self.max_classification_depth = depth;
        self
    }

    /// Overrides the module and symbol file extensions
    #[must_use]
    pub fn with_extensions(mut self, module: &str, symbols: &str) -> Self {
        self.module_extension = module.to_string();
        self.symbol_extension = symbols.to_string();
        self
    }
}
