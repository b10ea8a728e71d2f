//! The composition facade: load, resolve, compute, execute, render.

use chrono::{DateTime, Utc};
use promptloom_config::AppConfig;
use promptloom_core::{
    CallerId, CallerProfile, CallerStore, CompositionError, CompositionRecord, CompositionStore,
    Error, NewComposition, Result,
};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::context::{AssembledContext, RunConfig};
use crate::defaults::default_sections;
use crate::loader::{LoadedDataset, LoaderKind, LoaderRegistry};
use crate::orchestrator::{Orchestrator, SkippedSection};
use crate::plan::SectionPlan;
use crate::render::render_summary;
use crate::resolver::{ResolvedSpecs, SpecResolver};
use crate::section::{ConditionRegistry, SectionDefinition};
use crate::shared_state::{SharedState, StateCalculator};
use crate::transform::TransformRegistry;

// ── Result types ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct CompositionMetadata {
    pub caller_id: CallerId,
    pub composed_at: DateTime<Utc>,
    pub activated: Vec<String>,
    pub skipped: Vec<SkippedSection>,
    /// Loaders that faulted and were defaulted
    pub failed_loaders: Vec<String>,
    pub execution_order: Vec<String>,
    pub load_ms: u64,
    pub transform_ms: u64,
    pub merged_target_count: usize,
}

/// Everything one run produced.
#[derive(Debug, Clone, Serialize)]
pub struct CompositionResult {
    /// Output key → section output
    pub document: Value,
    pub summary: String,
    /// Section id → output, including fallback nulls
    pub sections: BTreeMap<String, Value>,
    pub loaded: LoadedDataset,
    pub specs: ResolvedSpecs,
    pub state: SharedState,
    pub metadata: CompositionMetadata,
}

// ── Composer ──────────────────────────────────────────────────────────────

/// Owns the registries and compiled plan; one instance serves every run.
pub struct Composer {
    config: Arc<AppConfig>,
    loaders: LoaderRegistry,
    transforms: TransformRegistry,
    conditions: ConditionRegistry,
    resolver: SpecResolver,
    calculator: StateCalculator,
    plan: SectionPlan,
}

/// Section definitions from config, or the built-in plan when none are declared.
pub fn plan_definitions(config: &AppConfig) -> std::result::Result<Vec<SectionDefinition>, CompositionError> {
    if config.sections.is_empty() {
        return Ok(default_sections());
    }
    config
        .sections
        .iter()
        .cloned()
        .map(SectionDefinition::try_from)
        .collect()
}

fn config_error(what: &str, e: impl std::fmt::Display) -> Error {
    Error::Config {
        message: format!("{what}: {e}"),
    }
}

impl Composer {
    /// A composer reading from `store` with the built-in transforms and conditions.
    pub fn new(config: AppConfig, store: Arc<dyn CallerStore>) -> Result<Self> {
        let sections = plan_definitions(&config)?;
        Self::with_registries(
            config,
            LoaderRegistry::with_store(store),
            TransformRegistry::builtin(),
            ConditionRegistry::with_defaults(),
            sections,
        )
    }

    /// Compile `sections` against the given registries. Fails on any
    /// unknown reference or dependency cycle.
    pub fn with_registries(
        config: AppConfig,
        loaders: LoaderRegistry,
        transforms: TransformRegistry,
        conditions: ConditionRegistry,
        sections: Vec<SectionDefinition>,
    ) -> Result<Self> {
        let plan = SectionPlan::compile(sections, &transforms, &conditions)?;
        let resolver = SpecResolver::new(&config.resolver)
            .map_err(|e| config_error("resolver.voice_slug_pattern", e))?;
        let calculator = StateCalculator::new(&config)
            .map_err(|e| config_error("curriculum.mastery_key_pattern", e))?;

        Ok(Self {
            config: Arc::new(config),
            loaders,
            transforms,
            conditions,
            resolver,
            calculator,
            plan,
        })
    }

    pub fn plan(&self) -> &SectionPlan {
        &self.plan
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Per-loader configuration for one run: config file entries, fetch
    /// limits from the tuning sections, then run overrides.
    fn loader_configs(&self, run: &RunConfig) -> BTreeMap<String, Value> {
        let mut configs = self.config.loaders.clone();
        let limits = [
            (LoaderKind::Memories, self.config.memory.fetch_limit),
            (LoaderKind::RecentSessions, self.config.sessions.history_limit),
        ];
        for (kind, limit) in limits {
            let entry = configs
                .entry(kind.as_str().to_string())
                .or_insert_with(|| json!({}));
            if let Some(map) = entry.as_object_mut() {
                map.entry("limit").or_insert_with(|| json!(limit));
            }
        }
        configs.extend(run.loaders.clone());
        configs
    }

    /// Compose the document for one caller.
    ///
    /// Fails only when the caller does not exist. Every other problem
    /// (a loader fault, a missing specification, a failing transform)
    /// degrades the affected part of the document instead.
    pub async fn compose(&self, caller: &CallerId, run: &RunConfig) -> Result<CompositionResult> {
        let load_started = Instant::now();
        let mut dataset = self
            .loaders
            .load_all(caller, &self.loader_configs(run))
            .await;
        let load_ms = load_started.elapsed().as_millis() as u64;

        if dataset.profile.is_none() {
            if !dataset.failed(LoaderKind::Profile) {
                return Err(CompositionError::CallerNotFound(caller.to_string()).into());
            }
            warn!(caller_id = %caller, "Profile unavailable; composing with a minimal profile");
            dataset.profile = Some(CallerProfile {
                id: caller.clone(),
                name: None,
                domain_id: None,
                domain_name: None,
                subject_id: None,
                timezone: None,
                created_at: None,
            });
        }

        let transform_started = Instant::now();
        let specs = self.resolver.resolve(
            &dataset.playbooks,
            &dataset.system_specs,
            &dataset.spec_library,
        );
        let state = self
            .calculator
            .compute(&dataset, specs.content.as_ref(), run.now);
        let mut ctx =
            AssembledContext::new(dataset, specs, state, self.config.clone(), run.clone());

        let execution =
            Orchestrator::new(&self.plan, &self.transforms, &self.conditions).execute(&mut ctx);

        let summary = render_summary(self.plan.ordered().filter_map(|section| {
            execution
                .document
                .get(&section.output_key)
                .map(|value| (section.name.as_str(), value))
        }));
        let transform_ms = transform_started.elapsed().as_millis() as u64;

        let (loaded, specs, state, sections) = ctx.into_parts();
        let failed_loaders: Vec<String> =
            loaded.failures.iter().map(|f| f.loader.clone()).collect();

        info!(
            caller_id = %caller,
            activated = execution.activated.len(),
            skipped = execution.skipped.len(),
            failed_loaders = failed_loaders.len(),
            load_ms,
            transform_ms,
            "Composition complete"
        );

        Ok(CompositionResult {
            document: Value::Object(execution.document),
            summary,
            sections,
            loaded,
            specs,
            state,
            metadata: CompositionMetadata {
                caller_id: caller.clone(),
                composed_at: run.now,
                activated: execution.activated,
                skipped: execution.skipped,
                failed_loaders,
                execution_order: execution.execution_order,
                load_ms,
                transform_ms,
                merged_target_count: execution.merged_target_count,
            },
        })
    }

    /// Compose, then persist the result as the caller's active composition.
    pub async fn compose_and_store(
        &self,
        caller: &CallerId,
        run: &RunConfig,
        trigger: &str,
        store: &dyn CompositionStore,
    ) -> Result<(CompositionResult, CompositionRecord)> {
        let result = self.compose(caller, run).await?;
        let record = store
            .save(NewComposition {
                caller_id: caller.clone(),
                document: result.document.clone(),
                summary: result.summary.clone(),
                trigger: trigger.to_string(),
                metadata: serde_json::to_value(&result.metadata)?,
            })
            .await?;
        Ok((result, record))
    }
}
