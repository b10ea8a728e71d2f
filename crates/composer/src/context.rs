//! Run configuration and the assembled context sections read from.

use chrono::{DateTime, Utc};
use promptloom_config::AppConfig;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::loader::LoadedDataset;
use crate::resolver::ResolvedSpecs;
use crate::shared_state::SharedState;

/// Per-invocation settings.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Reference time for elapsed-day and due-date calculations
    pub now: DateTime<Utc>,

    /// Per-loader configuration keyed by loader name; overrides the config file
    pub loaders: BTreeMap<String, Value>,
}

impl RunConfig {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now,
            loaders: BTreeMap::new(),
        }
    }

    pub fn with_loader(mut self, loader: &str, config: Value) -> Self {
        self.loaders.insert(loader.to_string(), config);
        self
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::at(Utc::now())
    }
}

/// Everything a section can see while the plan executes.
///
/// Loaded data, resolved specifications and shared state are fixed before
/// the first section runs. Section outputs are appended by the orchestrator
/// one at a time; nothing already recorded is ever rewritten.
pub struct AssembledContext {
    pub dataset: LoadedDataset,
    pub specs: ResolvedSpecs,
    pub state: SharedState,
    pub config: Arc<AppConfig>,
    pub run: RunConfig,
    sections: BTreeMap<String, Value>,
}

impl AssembledContext {
    pub fn new(
        dataset: LoadedDataset,
        specs: ResolvedSpecs,
        state: SharedState,
        config: Arc<AppConfig>,
        run: RunConfig,
    ) -> Self {
        Self {
            dataset,
            specs,
            state,
            config,
            run,
            sections: BTreeMap::new(),
        }
    }

    /// Output of an already-executed section.
    pub fn section(&self, id: &str) -> Option<&Value> {
        self.sections.get(id)
    }

    pub fn sections(&self) -> &BTreeMap<String, Value> {
        &self.sections
    }

    /// The section outputs so far, as one JSON object keyed by section id.
    pub fn assembled_value(&self) -> Value {
        Value::Object(
            self.sections
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<Map<String, Value>>(),
        )
    }

    pub(crate) fn record(&mut self, section_id: &str, output: Value) {
        self.sections.entry(section_id.to_string()).or_insert(output);
    }

    pub(crate) fn into_parts(
        self,
    ) -> (LoadedDataset, ResolvedSpecs, SharedState, BTreeMap<String, Value>) {
        (self.dataset, self.specs, self.state, self.sections)
    }
}
