//! The patch pipeline.
//!
//! One [`PatchPipeline`] rewrites the patch module of one base module, exactly once. The
//! phases run in a fixed order and the pipeline never goes back to an earlier state:
//!
//! ```text
//! Created -> Initialized -> Classified -> Neutralized -> WrappersGenerated -> TableEmitted -> Valid
//! ```
//!
//! An incompatible diff stops the run at `Initialized` with `Ok(false)` and leaves the
//! modules untouched. Every later phase reports failures as errors.
//!
//! Wrapper ordinals come from an allocator owned by the pipeline, so the output of a run
//! depends on its inputs only, not on other runs sharing the same [`PatchContext`].

use std::{path::Path, sync::Arc};

use strum::IntoStaticStr;

use crate::{
    file::ImageCache,
    metadata::{module::Module, token::Token},
    patch::{
        annotations::annotate_records,
        classification::ClassificationMap,
        collaborators::{ClassifyContext, Collaborators, DiffOutcome, ModulePair},
        context::PatchContext,
        generics::{GenericMethodRecord, OrdinalAllocator},
        lookup::{emit_lookup_table, find_lookup_method, LookupEntry},
        neutralizer::neutralize_static_initializers,
        report::PatchReport,
        wrappers::generate_wrappers,
    },
    writer::{ModuleWriter, PublishedPaths, Publisher, WrittenModule},
    Error, Result,
};

/// Progress of a [`PatchPipeline`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, IntoStaticStr)]
pub enum PipelineState {
    /// Nothing has run yet
    Created,
    /// Modules are loaded and diffed
    Initialized,
    /// Every patch-module method is classified
    Classified,
    /// Static initializers of touched types are disabled
    Neutralized,
    /// Wrappers exist and are annotated
    WrappersGenerated,
    /// The lookup-table body is emitted
    TableEmitted,
    /// The patch module is ready for publishing
    Valid,
}

/// Rewrites one patch module into a hot-loadable artifact
pub struct PatchPipeline {
    module_name: String,
    context: Arc<PatchContext>,
    collaborators: Collaborators,
    state: PipelineState,
    pair: Option<ModulePair>,
    classifications: ClassificationMap,
    records: Vec<GenericMethodRecord>,
    ordinals: OrdinalAllocator,
    report: PatchReport,
}

impl PatchPipeline {
    /// A pipeline for the module called `module_name`
    pub fn new(
        module_name: impl Into<String>,
        context: Arc<PatchContext>,
        collaborators: Collaborators,
    ) -> Self {
        let module_name = module_name.into();
        PatchPipeline {
            report: PatchReport {
                module: module_name.clone(),
                ..PatchReport::default()
            },
            module_name,
            context,
            collaborators,
            state: PipelineState::Created,
            pair: None,
            classifications: ClassificationMap::default(),
            records: Vec::new(),
            ordinals: OrdinalAllocator::new(),
        }
    }

    /// Name of the module this pipeline patches
    #[must_use]
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// The patch module, once loaded
    #[must_use]
    pub fn module(&self) -> Option<&Module> {
        self.pair.as_ref().map(|pair| &pair.patch)
    }

    /// The base module, once loaded
    #[must_use]
    pub fn base_module(&self) -> Option<&Module> {
        self.pair.as_ref().map(|pair| &pair.base)
    }

    /// Classifications collected so far
    #[must_use]
    pub fn classifications(&self) -> &ClassificationMap {
        &self.classifications
    }

    /// Generic method records with their ordinals and wrappers
    #[must_use]
    pub fn records(&self) -> &[GenericMethodRecord] {
        &self.records
    }

    /// Summary of the run
    #[must_use]
    pub fn report(&self) -> &PatchReport {
        &self.report
    }

    fn expect_state(&self, expected: PipelineState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::PipelineState {
                module: self.module_name.clone(),
                state: self.state.into(),
                expected: expected.into(),
            })
        }
    }

    /// Runs every phase.
    ///
    /// Returns `Ok(false)` if the diff found base and patch incompatible, `Ok(true)` once the
    /// patch module is ready for [`PatchPipeline::write`].
    ///
    /// # Errors
    /// Returns [`crate::Error::PipelineState`] if the pipeline already ran, and the first
    /// error of any phase after the diff.
    pub fn run(&mut self) -> Result<bool> {
        self.expect_state(PipelineState::Created)?;
        log::info!("Patching {}", self.module_name);

        let outcome = self.collaborators.differ.diff(&self.module_name)?;
        self.state = PipelineState::Initialized;
        let mut pair = match outcome {
            DiffOutcome::Valid(pair) => pair,
            DiffOutcome::Invalid(reason) => {
                log::warn!("Skipping {}: {reason}", self.module_name);
                return Ok(false);
            }
        };

        self.records = self.collaborators.scanner.scan(&pair)?;

        self.classify(&mut pair)?;
        self.state = PipelineState::Classified;

        self.neutralize(&mut pair)?;
        self.state = PipelineState::Neutralized;

        self.generate_wrappers(&mut pair)?;
        self.state = PipelineState::WrappersGenerated;

        self.emit_table(&mut pair)?;
        self.state = PipelineState::TableEmitted;

        self.pair = Some(pair);
        self.state = PipelineState::Valid;
        log::info!("{}", self.report);
        Ok(true)
    }

    fn classify(&mut self, pair: &mut ModulePair) -> Result<()> {
        let methods: Vec<Token> = pair.patch.methods().iter().map(|method| method.token).collect();
        let max_depth = self.context.config.max_classification_depth;

        for method in methods {
            if self.classifications.contains(method) {
                continue;
            }
            let mut ctx = ClassifyContext::new(pair, &mut self.classifications, max_depth);
            self.collaborators.classifier.classify(method, &mut ctx)?;
        }

        if log::log_enabled!(log::Level::Debug) {
            log::debug!(
                "Classification of {}:\n{}",
                self.module_name,
                self.classifications.dump(&pair.patch, &pair.changed_methods)
            );
        }
        self.report = PatchReport::new(&self.module_name, &pair.patch, &self.classifications);
        Ok(())
    }

    fn neutralize(&mut self, pair: &mut ModulePair) -> Result<()> {
        let touched = self.classifications.touched_types(&pair.patch);
        self.report.neutralized = neutralize_static_initializers(
            &mut pair.patch,
            &touched,
            &pair.added_types,
            &self.context.config,
        )?;
        Ok(())
    }

    fn generate_wrappers(&mut self, pair: &mut ModulePair) -> Result<()> {
        self.report.wrappers = generate_wrappers(
            &mut pair.patch,
            &mut self.records,
            &self.context.config,
            &mut self.ordinals,
            self.collaborators.wrappers.as_ref(),
        )?;
        self.report.annotations =
            annotate_records(&mut pair.patch, &self.records, &self.context.support)?;
        Ok(())
    }

    fn emit_table(&mut self, pair: &mut ModulePair) -> Result<()> {
        let config = &self.context.config;
        if self.report.wrappers == 0 && find_lookup_method(&pair.patch, config).is_err() {
            log::debug!(
                "{} has no generic instantiations and no lookup table",
                self.module_name
            );
            return Ok(());
        }

        let entries: Vec<LookupEntry> =
            emit_lookup_table(&mut pair.patch, &pair.base, &self.records, config)?;
        self.report.lookup_entries = entries;
        Ok(())
    }

    /// Serializes the rewritten patch module and its symbols.
    ///
    /// # Errors
    /// Returns [`crate::Error::PipelineState`] unless the pipeline is `Valid`, and writer
    /// errors such as [`crate::Error::StackDepth`].
    pub fn write(&self) -> Result<WrittenModule> {
        self.expect_state(PipelineState::Valid)?;
        let module = self.module().ok_or_else(|| Error::PipelineState {
            module: self.module_name.clone(),
            state: self.state.into(),
            expected: PipelineState::Valid.into(),
        })?;

        ModuleWriter::new(module).write()
    }

    /// Writes the rewritten module and publishes it at `destination`.
    ///
    /// # Errors
    /// Everything [`PatchPipeline::write`] and [`Publisher::publish`] report.
    pub fn publish(&self, destination: &Path, cache: &ImageCache) -> Result<PublishedPaths> {
        let written = self.write()?;
        Publisher::new(&self.context.config).publish(destination, &written, cache)
    }
}

impl std::fmt::Debug for PatchPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchPipeline")
            .field("module_name", &self.module_name)
            .field("state", &self.state)
            .field("records", &self.records.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::{
        assembly::OpCode,
        metadata::tables::TableId,
        patch::{
            annotations::{find_index_annotation, find_wrapper_annotation},
            lookup::read_lookup_table,
            PatchConfig,
        },
        test::{invalid_collaborators, scenario_collaborators, support_module},
        writer::{ImageHeader, SymbolFile},
    };

    fn context() -> Arc<PatchContext> {
        Arc::new(PatchContext::new(PatchConfig::default(), &support_module()).unwrap())
    }

    #[test]
    fn test_invalid_diff_stops_at_initialized() {
        let mut pipeline =
            PatchPipeline::new("Assembly-CSharp", context(), invalid_collaborators());
        assert!(!pipeline.run().unwrap());
        assert_eq!(pipeline.state(), PipelineState::Initialized);
        assert!(pipeline.module().is_none());
        assert!(matches!(
            pipeline.write(),
            Err(Error::PipelineState { state: "Initialized", expected: "Valid", .. })
        ));
    }

    #[test]
    fn test_run_is_one_shot() {
        let mut pipeline =
            PatchPipeline::new("Assembly-CSharp", context(), scenario_collaborators());
        assert!(pipeline.run().unwrap());
        assert_eq!(pipeline.state(), PipelineState::Valid);
        assert!(matches!(
            pipeline.run(),
            Err(Error::PipelineState { state: "Valid", expected: "Created", .. })
        ));
    }

    #[test]
    fn test_scenario_end_to_end() {
        let context = context();
        let mut pipeline =
            PatchPipeline::new("Assembly-CSharp", Arc::clone(&context), scenario_collaborators());
        assert!(pipeline.run().unwrap());

        let report = pipeline.report().clone();
        assert_eq!(
            report.hooked,
            vec!["Game.Cache::Get".to_string(), "Game.Spawner::Spawn".to_string()]
        );
        assert_eq!(report.neutralized.len(), 2);
        assert_eq!(report.wrappers, 2);
        assert_eq!(report.annotations, 3);
        assert_eq!(report.lookup_entries.len(), 2);

        let module = pipeline.module().unwrap();
        let record = &pipeline.records()[0];
        assert_eq!(record.ordinal, Some(0));
        assert_eq!(
            find_index_annotation(module, record.method, &context.support)
                .unwrap()
                .index,
            0
        );

        let wrappers: Vec<Token> = record
            .instantiations
            .iter()
            .map(|inst| inst.wrapper.unwrap())
            .collect();
        let expected = [["System.Int32"], ["System.String"]];
        for (position, wrapper) in wrappers.iter().enumerate() {
            let annotation = find_wrapper_annotation(module, *wrapper, &context.support).unwrap();
            assert_eq!(annotation.index, 0);
            assert_eq!(annotation.instantiation_ordinal, position as i32);
            assert_eq!(annotation.type_arguments, expected[position]);
        }

        let entries = read_lookup_table(module, &context.config).unwrap();
        assert_eq!(entries, report.lookup_entries);
        let values: HashSet<Token> = entries.iter().map(|entry| entry.wrapper).collect();
        assert_eq!(values, wrappers.iter().copied().collect());
        for entry in &entries {
            assert!(entry.base.is_table(TableId::MethodSpec));
        }

        for initializer in &report.neutralized {
            let body = module.method(*initializer).unwrap().body.as_ref().unwrap();
            assert_eq!(body.instructions[0].opcode, OpCode::Ret);
        }
    }

    #[test]
    fn test_write_after_run() {
        let mut pipeline =
            PatchPipeline::new("Assembly-CSharp", context(), scenario_collaborators());
        assert!(pipeline.run().unwrap());

        let written = pipeline.write().unwrap();
        let header = ImageHeader::parse(&written.image).unwrap();
        assert_eq!(
            header.module_name(&written.image).unwrap(),
            "Assembly-CSharp_patch"
        );
        let symbols = SymbolFile::parse(&written.symbols).unwrap();
        assert_eq!(symbols.digest, written.digest);
    }

    #[test]
    fn test_runs_sharing_a_context_write_identical_images() {
        let context = context();
        let mut images = Vec::new();
        for _ in 0..2 {
            let mut pipeline = PatchPipeline::new(
                "Assembly-CSharp",
                Arc::clone(&context),
                scenario_collaborators(),
            );
            assert!(pipeline.run().unwrap());
            assert_eq!(pipeline.records()[0].ordinal, Some(0));
            images.push(pipeline.write().unwrap());
        }
        assert_eq!(images[0], images[1]);
    }
}
