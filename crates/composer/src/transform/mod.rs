//! Transform registry: named functions that shape a section's raw data.
//!
//! A transform receives the section's input, the assembled context and
//! the section definition, and returns the section's output. It only reads
//! the context; the orchestrator decides where the output lands.
//!
//! A section names one transform, an ordered chain (each step's output is
//! the next step's input), or none (the raw data passes through).

pub mod caller;
pub mod composite;
pub mod curriculum;
pub mod memories;
pub mod specs;
pub mod targets;

use promptloom_core::TransformError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::context::AssembledContext;
use crate::section::{SectionDefinition, TransformRef};

/// A named section transform.
pub trait Transform: Send + Sync {
    fn name(&self) -> &str;

    fn apply(
        &self,
        input: Value,
        ctx: &AssembledContext,
        section: &SectionDefinition,
    ) -> Result<Value, TransformError>;
}

/// Adapts a plain function into a [`Transform`].
pub struct FnTransform<F> {
    name: String,
    f: F,
}

impl<F> FnTransform<F>
where
    F: Fn(Value, &AssembledContext, &SectionDefinition) -> Result<Value, TransformError>
        + Send
        + Sync,
{
    pub fn new(name: &str, f: F) -> Self {
        Self {
            name: name.to_string(),
            f,
        }
    }
}

impl<F> Transform for FnTransform<F>
where
    F: Fn(Value, &AssembledContext, &SectionDefinition) -> Result<Value, TransformError>
        + Send
        + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(
        &self,
        input: Value,
        ctx: &AssembledContext,
        section: &SectionDefinition,
    ) -> Result<Value, TransformError> {
        (self.f)(input, ctx, section)
    }
}

/// Which step of a chain failed, and how.
#[derive(Debug, Clone)]
pub struct ChainFailure {
    pub transform: String,
    pub error: TransformError,
}

/// Transform name → transform. Built once at startup and shared by every run.
pub struct TransformRegistry {
    transforms: HashMap<String, Arc<dyn Transform>>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self {
            transforms: HashMap::new(),
        }
    }

    /// Register a transform. Replaces any existing one with the same name.
    pub fn register(&mut self, transform: Arc<dyn Transform>) {
        self.transforms
            .insert(transform.name().to_string(), transform);
    }

    pub fn register_fn<F>(&mut self, name: &str, f: F)
    where
        F: Fn(Value, &AssembledContext, &SectionDefinition) -> Result<Value, TransformError>
            + Send
            + Sync
            + 'static,
    {
        self.register(Arc::new(FnTransform::new(name, f)));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Transform> {
        self.transforms.get(name).map(|t| t.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.transforms.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.transforms.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Run a section's transform reference over `input`.
    pub fn run(
        &self,
        transform: &TransformRef,
        input: Value,
        ctx: &AssembledContext,
        section: &SectionDefinition,
    ) -> Result<Value, ChainFailure> {
        self.run_observed(transform, input, ctx, section, |_, _| {})
    }

    /// Like [`run`](Self::run), calling `on_step` with each step's name and
    /// output as the chain advances.
    pub fn run_observed(
        &self,
        transform: &TransformRef,
        input: Value,
        ctx: &AssembledContext,
        section: &SectionDefinition,
        mut on_step: impl FnMut(&str, &Value),
    ) -> Result<Value, ChainFailure> {
        let mut value = input;
        for name in transform.names() {
            let step = self.get(name).ok_or_else(|| ChainFailure {
                transform: name.to_string(),
                error: TransformError::failed(name, "not registered"),
            })?;
            value = step.apply(value, ctx, section).map_err(|error| ChainFailure {
                transform: name.to_string(),
                error,
            })?;
            on_step(name, &value);
        }
        Ok(value)
    }

    /// A registry holding every built-in transform.
    pub fn builtin() -> Self {
        let mut registry = Self::new();

        registry.register_fn("dedupe_memories", memories::dedupe);
        registry.register_fn("score_memory_relevance", memories::score_relevance);
        registry.register_fn("group_memories", memories::group);

        registry.register_fn("merge_targets", targets::merge);

        registry.register_fn("extract_identity", specs::extract_identity);
        registry.register_fn("extract_content", specs::extract_content);
        registry.register_fn("extract_voice", specs::extract_voice);
        registry.register_fn("voice_rules", specs::voice_rules);
        registry.register_fn("critical_rules", specs::critical_rules);

        registry.register_fn("caller_info", caller::caller_info);
        registry.register_fn("map_personality", caller::map_personality);
        registry.register_fn("map_learner_profile", caller::map_learner_profile);
        registry.register_fn("filter_goals", caller::filter_goals);
        registry.register_fn("onboarding_status", caller::onboarding_status);
        registry.register_fn("pending_actions", caller::pending_actions);

        registry.register_fn("compute_curriculum", curriculum::compute_curriculum);
        registry.register_fn("plan_session", curriculum::plan_session);
        registry.register_fn("recommend_activities", curriculum::recommend_activities);
        registry.register_fn("teaching_points", curriculum::teaching_points);
        registry.register_fn("source_authority", curriculum::source_authority);

        registry.register_fn("quick_start", composite::quick_start);
        registry.register_fn("compose_instructions", composite::compose_instructions);

        registry
    }
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ── Helpers shared by the built-ins ───────────────────────────────────────

/// Deserialize a transform's input, naming the transform on failure.
pub(crate) fn parse_input<T: DeserializeOwned>(
    transform: &str,
    input: Value,
) -> Result<T, TransformError> {
    serde_json::from_value(input).map_err(|e| TransformError::invalid_input(transform, e))
}

pub(crate) fn to_output<T: Serialize>(transform: &str, value: &T) -> Result<Value, TransformError> {
    serde_json::to_value(value).map_err(|e| TransformError::failed(transform, e))
}

/// Pull one named source out of a multi-source input object.
pub(crate) fn field(input: &Value, name: &str) -> Value {
    input.get(name).cloned().unwrap_or(Value::Null)
}

/// "high" / "moderate" / "low" against the run's classification thresholds.
pub(crate) fn level(value: f64, ctx: &AssembledContext) -> &'static str {
    if value >= ctx.state.thresholds.high {
        "high"
    } else if value <= ctx.state.thresholds.low {
        "low"
    } else {
        "moderate"
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! A minimal assembled context for transform unit tests.

    use chrono::{TimeZone, Utc};
    use promptloom_config::AppConfig;
    use std::sync::Arc;

    use crate::context::{AssembledContext, RunConfig};
    use crate::loader::LoadedDataset;
    use crate::resolver::ResolvedSpecs;
    use crate::shared_state::StateCalculator;

    pub fn context_with(dataset: LoadedDataset, specs: ResolvedSpecs) -> AssembledContext {
        let config = AppConfig::default();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let state = StateCalculator::new(&config)
            .unwrap()
            .compute(&dataset, specs.content.as_ref(), now);
        AssembledContext::new(dataset, specs, state, Arc::new(config), RunConfig::at(now))
    }

    pub fn empty_context() -> AssembledContext {
        context_with(LoadedDataset::default(), ResolvedSpecs::default())
    }
}
