//! Section definitions: one named slice of the final document.

use promptloom_config::{SectionConfig, TransformConfig};
use promptloom_core::CompositionError;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::context::AssembledContext;
use crate::loader::LoaderKind;

/// Source name that reads the document assembled so far.
pub const ASSEMBLED_SOURCE: &str = "_assembled";

// ── Definition parts ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSourceRef {
    Loader(LoaderKind),
    Assembled,
}

impl DataSourceRef {
    pub fn parse(name: &str) -> Option<Self> {
        if name == ASSEMBLED_SOURCE {
            return Some(Self::Assembled);
        }
        LoaderKind::parse(name).map(Self::Loader)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Loader(kind) => kind.as_str(),
            Self::Assembled => ASSEMBLED_SOURCE,
        }
    }
}

/// When a section is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Always,
    /// At least one declared loader source returned data
    DataExists,
    /// A content specification is resolved
    ContentSpec,
    /// The caller has an assigned domain
    HasDomain,
    /// No prior sessions exist
    FirstCall,
    /// A predicate registered in the [`ConditionRegistry`]
    Custom(String),
}

impl Condition {
    pub fn parse(name: &str) -> Self {
        match name {
            "always" => Self::Always,
            "data_exists" => Self::DataExists,
            "content_spec" => Self::ContentSpec,
            "has_domain" => Self::HasDomain,
            "first_call" => Self::FirstCall,
            other => Self::Custom(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Always => "always",
            Self::DataExists => "data_exists",
            Self::ContentSpec => "content_spec",
            Self::HasDomain => "has_domain",
            Self::FirstCall => "first_call",
            Self::Custom(name) => name,
        }
    }
}

/// What an inactive (or failed) section leaves behind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Key absent from the document
    #[default]
    Omit,
    /// Key present with `null`
    Null,
    /// Key present with `{}`
    EmptyObject,
    /// Nothing registered at all, not even in the section map
    Skip,
}

impl FallbackPolicy {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "omit" => Some(Self::Omit),
            "null" => Some(Self::Null),
            "empty_object" => Some(Self::EmptyObject),
            "skip" => Some(Self::Skip),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformRef {
    /// Pass the raw source data through
    None,
    One(String),
    Chain(Vec<String>),
}

impl TransformRef {
    pub fn names(&self) -> Vec<&str> {
        match self {
            Self::None => vec![],
            Self::One(name) => vec![name.as_str()],
            Self::Chain(names) => names.iter().map(|n| n.as_str()).collect(),
        }
    }
}

// ── Section definition ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SectionDefinition {
    pub id: String,
    pub name: String,
    pub priority: i32,
    pub sources: Vec<DataSourceRef>,
    pub condition: Condition,
    pub fallback: FallbackPolicy,
    pub transform: TransformRef,
    pub config: Value,
    pub output_key: String,
    pub depends_on: Vec<String>,
    pub enabled: bool,
}

impl SectionDefinition {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            priority: 0,
            sources: vec![],
            condition: Condition::Always,
            fallback: FallbackPolicy::Omit,
            transform: TransformRef::None,
            config: Value::Null,
            output_key: id.to_string(),
            depends_on: vec![],
            enabled: true,
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn source(mut self, kind: LoaderKind) -> Self {
        self.sources.push(DataSourceRef::Loader(kind));
        self
    }

    pub fn assembled(mut self) -> Self {
        self.sources.push(DataSourceRef::Assembled);
        self
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.condition = condition;
        self
    }

    pub fn fallback(mut self, fallback: FallbackPolicy) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn transform(mut self, name: &str) -> Self {
        self.transform = TransformRef::One(name.to_string());
        self
    }

    pub fn chain(mut self, names: &[&str]) -> Self {
        self.transform = TransformRef::Chain(names.iter().map(|n| n.to_string()).collect());
        self
    }

    pub fn config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    pub fn output_key(mut self, key: &str) -> Self {
        self.output_key = key.to_string();
        self
    }

    pub fn depends_on(mut self, ids: &[&str]) -> Self {
        self.depends_on = ids.iter().map(|n| n.to_string()).collect();
        self
    }

    /// A typed value from section-local config.
    pub fn setting<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.config
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

impl TryFrom<SectionConfig> for SectionDefinition {
    type Error = CompositionError;

    fn try_from(config: SectionConfig) -> Result<Self, Self::Error> {
        let sources = config
            .sources
            .iter()
            .map(|name| {
                DataSourceRef::parse(name).ok_or_else(|| CompositionError::UnknownDataSource {
                    section: config.id.clone(),
                    source_name: name.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let fallback = FallbackPolicy::parse(&config.fallback).ok_or_else(|| {
            CompositionError::InvalidSection {
                section: config.id.clone(),
                reason: format!("unknown fallback policy '{}'", config.fallback),
            }
        })?;

        let transform = match config.transform {
            None => TransformRef::None,
            Some(TransformConfig::One(name)) => TransformRef::One(name),
            Some(TransformConfig::Chain(names)) if names.is_empty() => {
                return Err(CompositionError::EmptyTransformChain(config.id));
            }
            Some(TransformConfig::Chain(names)) => TransformRef::Chain(names),
        };

        Ok(Self {
            name: config.name.unwrap_or_else(|| title_case(&config.id)),
            output_key: config.output_key.unwrap_or_else(|| config.id.clone()),
            id: config.id,
            priority: config.priority,
            sources,
            condition: Condition::parse(&config.condition),
            fallback,
            transform,
            config: config.config.unwrap_or(Value::Null),
            depends_on: config.depends_on,
            enabled: config.enabled,
        })
    }
}

/// "learner_profile" → "Learner Profile"
fn title_case(id: &str) -> String {
    id.split(['_', '-'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Condition registry ────────────────────────────────────────────────────

pub type ConditionFn = Arc<dyn Fn(&AssembledContext) -> bool + Send + Sync>;

/// Named predicates for custom section conditions.
pub struct ConditionRegistry {
    conditions: HashMap<String, ConditionFn>,
}

impl ConditionRegistry {
    pub fn new() -> Self {
        Self {
            conditions: HashMap::new(),
        }
    }

    /// The predicates the built-in plan uses.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("identity_spec", |ctx| ctx.specs.identity.is_some());
        registry.register("voice_spec", |ctx| ctx.specs.voice.is_some());
        registry.register("has_modules", |ctx| !ctx.state.modules.is_empty());
        registry.register("returning_caller", |ctx| !ctx.state.is_first_call);
        registry.register("onboarding_incomplete", |ctx| {
            ctx.dataset.onboarding.spec.is_some()
                && !ctx
                    .dataset
                    .onboarding
                    .progress
                    .as_ref()
                    .is_some_and(|p| p.is_complete)
        });
        registry
    }

    /// Register a predicate. Replaces any existing one with the same name.
    pub fn register(
        &mut self,
        name: &str,
        predicate: impl Fn(&AssembledContext) -> bool + Send + Sync + 'static,
    ) {
        self.conditions.insert(name.to_string(), Arc::new(predicate));
    }

    pub fn get(&self, name: &str) -> Option<&ConditionFn> {
        self.conditions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.conditions.contains_key(name)
    }

    /// Evaluate a section's condition against the context as it stands.
    ///
    /// An unregistered custom name evaluates false; plan compilation
    /// rejects those before any run.
    pub fn evaluate(&self, section: &SectionDefinition, ctx: &AssembledContext) -> bool {
        match &section.condition {
            Condition::Always => true,
            Condition::DataExists => section.sources.iter().any(|source| match source {
                DataSourceRef::Loader(kind) => ctx.dataset.has_data(*kind),
                DataSourceRef::Assembled => !ctx.sections().is_empty(),
            }),
            Condition::ContentSpec => ctx.specs.content.is_some(),
            Condition::HasDomain => ctx
                .dataset
                .profile
                .as_ref()
                .is_some_and(|p| p.domain_id.is_some()),
            Condition::FirstCall => ctx.state.is_first_call,
            Condition::Custom(name) => self.get(name).is_some_and(|predicate| predicate(ctx)),
        }
    }
}

impl Default for ConditionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
