//! Contracts of the components the pipeline drives but does not implement.
//!
//! Diffing, per-method classification and instantiation scanning depend on the compiler
//! front end and on runtime knowledge the patcher does not have. They are injected as trait
//! objects through [`Collaborators`]. Plain closures implement the single-method contracts,
//! which keeps fakes in tests short.

use std::{collections::HashSet, sync::Arc};

use crate::{
    metadata::{module::Module, signatures::TypeSignature, token::Token},
    patch::{
        classification::{ClassificationMap, MethodClassification},
        generics::GenericMethodRecord,
        wrappers::ForwardingWrapperGenerator,
    },
    Result,
};

/// The diffed base and patch modules of one run
#[derive(Debug, Clone)]
pub struct ModulePair {
    /// The module currently loaded in the host
    pub base: Module,
    /// The freshly compiled module being rewritten
    pub patch: Module,
    /// Full names of types that exist only in the patch module
    pub added_types: HashSet<String>,
    /// Patch-module methods whose body differs from the base, the classifier's seed set
    pub changed_methods: HashSet<Token>,
}

impl ModulePair {
    /// A pair with no added types and no changed methods
    #[must_use]
    pub fn new(base: Module, patch: Module) -> Self {
        ModulePair {
            base,
            patch,
            added_types: HashSet::new(),
            changed_methods: HashSet::new(),
        }
    }
}

/// Result of loading and diffing a module
#[derive(Debug, Clone)]
pub enum DiffOutcome {
    /// Base and patch are compatible
    Valid(ModulePair),
    /// Base and patch are incompatible, with the reason
    Invalid(String),
}

/// Loads base and patch module for a module name and compares them
pub trait ModuleDiffer: Send + Sync {
    /// Diffs the module called `module_name`
    ///
    /// # Errors
    /// Returns an error only for infrastructure failures; incompatible modules are reported
    /// as [`DiffOutcome::Invalid`].
    fn diff(&self, module_name: &str) -> Result<DiffOutcome>;
}

impl<F> ModuleDiffer for F
where
    F: Fn(&str) -> Result<DiffOutcome> + Send + Sync,
{
    fn diff(&self, module_name: &str) -> Result<DiffOutcome> {
        self(module_name)
    }
}

/// State handed to a [`MethodClassifier`] for one method
pub struct ClassifyContext<'a> {
    pair: &'a mut ModulePair,
    classifications: &'a mut ClassificationMap,
    depth: usize,
    max_depth: usize,
}

impl<'a> ClassifyContext<'a> {
    /// A context at recursion depth zero
    pub fn new(
        pair: &'a mut ModulePair,
        classifications: &'a mut ClassificationMap,
        max_depth: usize,
    ) -> Self {
        ClassifyContext {
            pair,
            classifications,
            depth: 0,
            max_depth,
        }
    }

    /// The modules being patched
    #[must_use]
    pub fn pair(&self) -> &ModulePair {
        &*self.pair
    }

    /// The modules being patched, for classifiers that rewrite bodies in place
    pub fn pair_mut(&mut self) -> &mut ModulePair {
        &mut *self.pair
    }

    /// Current recursion depth
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Records the classification of `method`
    pub fn record(&mut self, method: Token, classification: MethodClassification) {
        self.classifications.record(method, classification);
    }

    /// True if `method` was already classified during this run
    #[must_use]
    pub fn is_classified(&self, method: Token) -> bool {
        self.classifications.contains(method)
    }

    /// The classification recorded so far for `method`
    #[must_use]
    pub fn classification(&self, method: Token) -> MethodClassification {
        self.classifications.get(method)
    }

    /// Classifies `method` one level deeper.
    ///
    /// Methods already classified and methods beyond the depth bound are skipped.
    ///
    /// # Errors
    /// Propagates errors of the classifier.
    pub fn deeper(&mut self, classifier: &dyn MethodClassifier, method: Token) -> Result<()> {
        if self.classifications.contains(method) {
            return Ok(());
        }
        if self.depth + 1 > self.max_depth {
            log::debug!(
                "Classification depth {} reached at {}",
                self.max_depth,
                method
            );
            return Ok(());
        }

        let mut nested = ClassifyContext {
            pair: &mut *self.pair,
            classifications: &mut *self.classifications,
            depth: self.depth + 1,
            max_depth: self.max_depth,
        };
        classifier.classify(method, &mut nested)
    }
}

/// Decides whether a patch-module method needs a hook, an IL fix or nothing
pub trait MethodClassifier: Send + Sync {
    /// Classifies `method` and records the result in `ctx`.
    ///
    /// Anything not recorded as `Hook` or `IlFix` is treated as unchanged.
    ///
    /// # Errors
    /// Returns an error if the method cannot be analyzed.
    fn classify(&self, method: Token, ctx: &mut ClassifyContext<'_>) -> Result<()>;
}

impl<F> MethodClassifier for F
where
    F: Fn(Token, &mut ClassifyContext<'_>) -> Result<()> + Send + Sync,
{
    fn classify(&self, method: Token, ctx: &mut ClassifyContext<'_>) -> Result<()> {
        self(method, ctx)
    }
}

/// Finds the instantiations of patched generic methods the base module uses
pub trait InstantiationScanner: Send + Sync {
    /// Returns one record per patched generic method, instantiations in discovery order.
    ///
    /// Generic arguments are expressed in the patch module's token space, base handles in
    /// the base module's.
    ///
    /// # Errors
    /// Returns an error if the base module cannot be scanned.
    fn scan(&self, pair: &ModulePair) -> Result<Vec<GenericMethodRecord>>;
}

impl<F> InstantiationScanner for F
where
    F: Fn(&ModulePair) -> Result<Vec<GenericMethodRecord>> + Send + Sync,
{
    fn scan(&self, pair: &ModulePair) -> Result<Vec<GenericMethodRecord>> {
        self(pair)
    }
}

/// Everything a wrapper generator needs to produce one forwarding stub
#[derive(Debug, Clone, Copy)]
pub struct WrapperRequest<'a> {
    /// Type that receives the wrapper
    pub container: Token,
    /// The patched generic method definition
    pub method: Token,
    /// Ordinal index of the method
    pub ordinal: u32,
    /// Position of the instantiation within its record
    pub instantiation: usize,
    /// Generic arguments of the declaring type
    pub type_args: &'a [TypeSignature],
    /// Generic arguments of the method
    pub method_args: &'a [TypeSignature],
}

/// Produces a non-generic forwarding method for one instantiation
pub trait WrapperBodyGenerator: Send + Sync {
    /// Inserts the wrapper into `patch` and returns its `MethodDef` token.
    ///
    /// # Errors
    /// Returns an error if the wrapper cannot be built for this instantiation.
    fn generate(&self, patch: &mut Module, request: &WrapperRequest<'_>) -> Result<Token>;
}

/// The external components of a pipeline.
///
/// Cheap to clone; the components are shared between pipelines of one session.
#[derive(Clone)]
pub struct Collaborators {
    /// Module loader and differ
    pub differ: Arc<dyn ModuleDiffer>,
    /// Per-method classifier
    pub classifier: Arc<dyn MethodClassifier>,
    /// Instantiation scanner
    pub scanner: Arc<dyn InstantiationScanner>,
    /// Wrapper generator, [`ForwardingWrapperGenerator`] unless replaced
    pub wrappers: Arc<dyn WrapperBodyGenerator>,
}

impl Collaborators {
    /// Bundles the external components with the built-in wrapper generator
    pub fn new(
        differ: impl ModuleDiffer + 'static,
        classifier: impl MethodClassifier + 'static,
        scanner: impl InstantiationScanner + 'static,
    ) -> Self {
        Collaborators {
            differ: Arc::new(differ),
            classifier: Arc::new(classifier),
            scanner: Arc::new(scanner),
            wrappers: Arc::new(ForwardingWrapperGenerator),
        }
    }

    /// Replaces the wrapper generator
    #[must_use]
    pub fn with_wrapper_generator(mut self, wrappers: impl WrapperBodyGenerator + 'static) -> Self {
        self.wrappers = Arc::new(wrappers);
        self
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::empty_module;

    fn mark_and_recurse(method: Token, ctx: &mut ClassifyContext<'_>) -> Result<()> {
        ctx.record(method, MethodClassification::IlFix);
        // every method "calls" the next row
        let next = Token::new(method.value() + 1);
        ctx.deeper(&mark_and_recurse, next)
    }

    #[test]
    fn test_deeper_is_bounded() {
        let mut pair = ModulePair::new(empty_module("Base"), empty_module("Patch"));
        let mut map = ClassificationMap::default();
        let mut ctx = ClassifyContext::new(&mut pair, &mut map, 3);

        mark_and_recurse(Token::new(0x06000001), &mut ctx).unwrap();
        // depth 0 plus three nested levels
        assert_eq!(map.len(), 4);
        assert!(!map.contains(Token::new(0x06000005)));
    }

    #[test]
    fn test_deeper_skips_classified() {
        let mut pair = ModulePair::new(empty_module("Base"), empty_module("Patch"));
        let mut map = ClassificationMap::default();
        map.record(Token::new(0x06000002), MethodClassification::Hook);
        let mut ctx = ClassifyContext::new(&mut pair, &mut map, 10);

        mark_and_recurse(Token::new(0x06000001), &mut ctx).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(Token::new(0x06000002)), MethodClassification::Hook);
    }

    #[test]
    fn test_closures_are_collaborators() {
        let differ = |name: &str| -> Result<DiffOutcome> { Ok(DiffOutcome::Invalid(name.into())) };
        match differ.diff("Assembly-CSharp").unwrap() {
            DiffOutcome::Invalid(reason) => assert_eq!(reason, "Assembly-CSharp"),
            DiffOutcome::Valid(_) => panic!("expected invalid outcome"),
        }

        let scanner = |_: &ModulePair| -> Result<Vec<GenericMethodRecord>> { Ok(Vec::new()) };
        let pair = ModulePair::new(empty_module("Base"), empty_module("Patch"));
        assert!(scanner.scan(&pair).unwrap().is_empty());
    }
}
