//! Compile Use Case
//!
//! One run over one bundle: types, model, patterns, actions, ordering and
//! emission, strictly in that order. A stage never sees the output of a
//! failed predecessor, and a failed run emits nothing.

use std::sync::Arc;

use super::result::{CompileFailure, CompileOutput};
use crate::config::CompileConfig;
use crate::domain::actions::ActionCompiler;
use crate::domain::entities::{Artifact, PatternDecl, RenderedArtifact, SpecBundle};
use crate::domain::patterns::PatternResolver;
use crate::domain::ports::{CompileEvent, CompileEventSink, NoopEventSink, Stage, TargetEmitter};
use crate::domain::services::{build_artifacts, order, EntityModel};
use crate::domain::types::TypeRegistry;
use crate::domain::value_objects::{ContentHash, Diagnostic, ModelSettings, Severity, Target};
use crate::error::StrataResult;
use crate::infrastructure::emitters::get_emitter;

/// Compile pipeline for one configuration.
///
/// The pipeline holds no per-run state; every `run` builds its own type
/// registry and entity model, so one pipeline can serve many runs at once.
pub struct CompilePipeline {
    settings: ModelSettings,
    emitters: Vec<Box<dyn TargetEmitter>>,
    event_sink: Arc<dyn CompileEventSink>,
}

impl CompilePipeline {
    /// Pipeline emitting every target, without events.
    pub fn new(settings: ModelSettings) -> Self {
        let emitters = Target::ALL
            .iter()
            .map(|target| get_emitter(*target, &settings))
            .collect();
        Self {
            settings,
            emitters,
            event_sink: Arc::new(NoopEventSink),
        }
    }

    pub fn from_config(config: &CompileConfig) -> Self {
        Self::new(config.model_settings()).with_targets(config.enabled_targets())
    }

    /// Restrict emission to `targets`.
    pub fn with_targets(mut self, targets: Vec<Target>) -> Self {
        let mut targets = targets;
        targets.sort();
        targets.dedup();
        self.emitters = targets
            .into_iter()
            .map(|target| get_emitter(target, &self.settings))
            .collect();
        self
    }

    /// Use `emitter` for its target, replacing the built-in one.
    pub fn with_emitter(mut self, emitter: Box<dyn TargetEmitter>) -> Self {
        match self.emitters.iter().position(|e| e.target() == emitter.target()) {
            Some(index) => self.emitters[index] = emitter,
            None => self.emitters.push(emitter),
        }
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn CompileEventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    pub fn targets(&self) -> Vec<Target> {
        self.emitters.iter().map(|e| e.target()).collect()
    }

    /// Compile one bundle.
    pub fn run(&self, bundle: &SpecBundle) -> Result<CompileOutput, CompileFailure> {
        let unit = bundle.unit.clone();
        self.event_sink.on_event(CompileEvent::RunStarted {
            unit: unit.clone(),
            entity_count: bundle.entities.len() + bundle.imports.len(),
        });

        let mut diagnostics = Vec::new();
        match self.execute(bundle, &mut diagnostics) {
            Ok(output) => {
                self.event_sink.on_event(CompileEvent::RunFinished {
                    unit,
                    artifact_count: output.artifacts.len(),
                    warning_count: output.warning_count(),
                });
                Ok(output)
            }
            Err(error) => {
                self.event_sink.on_event(CompileEvent::RunFailed {
                    unit: unit.clone(),
                    code: error.code().to_string(),
                    message: error.to_string(),
                });
                Err(CompileFailure {
                    unit,
                    error,
                    diagnostics,
                })
            }
        }
    }

    fn execute(
        &self,
        bundle: &SpecBundle,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> StrataResult<CompileOutput> {
        let mut registry = TypeRegistry::builtin()?;
        registry.register_all(bundle.types.clone())?;
        self.stage(Stage::Types, registry.len());

        let mut model = EntityModel::from_bundle(bundle, &registry, self.settings.clone())?;
        self.stage(Stage::Model, model.len());

        let applied = self.expand_patterns(bundle, &registry, &mut model, diagnostics)?;
        self.stage(Stage::Patterns, applied);

        let compiled = self.compile_actions(&registry, &mut model)?;
        self.stage(Stage::Actions, compiled);

        let artifacts = order(build_artifacts(&model))?;
        self.stage(Stage::Order, artifacts.len());

        let (headers, rendered) = self.emit(&bundle.unit, &artifacts)?;
        self.stage(Stage::Emit, rendered.len());

        let fingerprint = ContentHash::from_parts(
            rendered
                .iter()
                .flat_map(|r| [r.target.key(), r.id.as_str(), r.text.as_str()]),
        );

        Ok(CompileOutput {
            unit: bundle.unit.clone(),
            artifacts,
            rendered,
            headers,
            diagnostics: diagnostics.clone(),
            fingerprint,
        })
    }

    /// Entity-level instances in declaration order, then bundle-level ones.
    fn expand_patterns(
        &self,
        bundle: &SpecBundle,
        registry: &TypeRegistry,
        model: &mut EntityModel,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> StrataResult<usize> {
        let resolver = PatternResolver::new(registry, &self.settings);
        let mut instances: Vec<(String, PatternDecl)> = Vec::new();
        for name in model.declaration_order() {
            if let Some(entity) = model.entity(name) {
                instances.extend(entity.patterns().iter().map(|p| (name.clone(), p.clone())));
            }
        }
        for pattern in &bundle.patterns {
            for entity in &pattern.entities {
                let decl = PatternDecl {
                    name: pattern.name.clone(),
                    config: pattern.config.clone(),
                    location: pattern.location.clone(),
                };
                instances.push((entity.clone(), decl));
            }
        }

        for (entity, decl) in &instances {
            let found = resolver.apply(model, entity, decl)?;
            for diagnostic in found {
                self.diagnostic(&diagnostic);
                diagnostics.push(diagnostic);
            }
            if self.event_sink.wants_detailed_events() {
                self.event_sink.on_event(CompileEvent::PatternApplied {
                    entity: entity.clone(),
                    pattern: decl.name.clone(),
                });
            }
        }
        Ok(instances.len())
    }

    /// Lowers every action and attaches the routine to its entity.
    fn compile_actions(&self, registry: &TypeRegistry, model: &mut EntityModel) -> StrataResult<usize> {
        let routines = ActionCompiler::new(model, registry).compile_all()?;
        let count = routines.len();
        for routine in routines {
            if self.event_sink.wants_detailed_events() {
                self.event_sink.on_event(CompileEvent::ActionCompiled {
                    entity: routine.entity.clone(),
                    action: routine.action.clone().unwrap_or_else(|| routine.name.clone()),
                    ops: routine.ops().len(),
                });
            }
            if let Some(entity) = model.entity_mut(&routine.entity) {
                entity.push_routine(routine);
            }
        }
        Ok(count)
    }

    #[allow(clippy::type_complexity)]
    fn emit(
        &self,
        unit: &str,
        artifacts: &[Artifact],
    ) -> StrataResult<(Vec<(Target, String)>, Vec<RenderedArtifact>)> {
        let mut headers = Vec::with_capacity(self.emitters.len());
        let mut rendered = Vec::new();
        for emitter in &self.emitters {
            let target = emitter.target();
            headers.push((target, emitter.header(unit)));
            for artifact in artifacts {
                let Some(text) = emitter.render(artifact)? else {
                    continue;
                };
                if self.event_sink.wants_detailed_events() {
                    self.event_sink.on_event(CompileEvent::ArtifactEmitted {
                        index: rendered.len(),
                        id: artifact.id().clone(),
                        target,
                    });
                }
                rendered.push(RenderedArtifact {
                    id: artifact.id().clone(),
                    kind: artifact.kind(),
                    target,
                    entity: artifact.entity().map(str::to_string),
                    action: artifact.action().map(str::to_string),
                    depends_on: artifact.dependencies().iter().cloned().collect(),
                    hash: ContentHash::from_content(&text),
                    text,
                });
            }
        }
        Ok((headers, rendered))
    }

    fn stage(&self, stage: Stage, count: usize) {
        tracing::debug!(stage = stage.as_str(), count, "stage completed");
        self.event_sink
            .on_event(CompileEvent::StageCompleted { stage, count });
    }

    fn diagnostic(&self, diagnostic: &Diagnostic) {
        if diagnostic.severity == Severity::Info && !self.event_sink.wants_detailed_events() {
            return;
        }
        self.event_sink.on_event(CompileEvent::Diagnostic {
            diagnostic: diagnostic.clone(),
        });
    }
}

impl Default for CompilePipeline {
    fn default() -> Self {
        Self::new(ModelSettings::default())
    }
}
