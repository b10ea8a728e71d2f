//! Loader registry: named, single-purpose fetches that together produce
//! the [`LoadedDataset`] for one run.
//!
//! Every loader of a run is issued at once and joined before any section
//! reads data. A loader fault is logged and replaced by that loader's
//! "no data" value, so one failing source never aborts the run.

use async_trait::async_trait;
use futures::future::join_all;
use promptloom_core::{
    Assertion, BehaviorTarget, CallerAttribute, CallerId, CallerProfile, CallerStore, Goal,
    LearnerProfile, LoadError, MemoryFact, OnboardingState, PendingAction, PersonalityProfile,
    Playbook, SessionRecord, Specification, SubjectSources, TeachingQuestion, VocabularyEntry,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

// ── Loader names ──────────────────────────────────────────────────────────

/// Every dataset a section can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoaderKind {
    Profile,
    Memories,
    Personality,
    LearnerProfile,
    RecentSessions,
    SessionCount,
    BehaviorTargets,
    CallerTargets,
    CallerAttributes,
    Goals,
    Playbooks,
    SystemSpecs,
    SpecLibrary,
    Onboarding,
    SubjectSources,
    Assertions,
    Questions,
    Vocabulary,
    OpenActions,
}

impl LoaderKind {
    pub const ALL: [LoaderKind; 19] = [
        Self::Profile,
        Self::Memories,
        Self::Personality,
        Self::LearnerProfile,
        Self::RecentSessions,
        Self::SessionCount,
        Self::BehaviorTargets,
        Self::CallerTargets,
        Self::CallerAttributes,
        Self::Goals,
        Self::Playbooks,
        Self::SystemSpecs,
        Self::SpecLibrary,
        Self::Onboarding,
        Self::SubjectSources,
        Self::Assertions,
        Self::Questions,
        Self::Vocabulary,
        Self::OpenActions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Profile => "profile",
            Self::Memories => "memories",
            Self::Personality => "personality",
            Self::LearnerProfile => "learner_profile",
            Self::RecentSessions => "recent_sessions",
            Self::SessionCount => "session_count",
            Self::BehaviorTargets => "behavior_targets",
            Self::CallerTargets => "caller_targets",
            Self::CallerAttributes => "caller_attributes",
            Self::Goals => "goals",
            Self::Playbooks => "playbooks",
            Self::SystemSpecs => "system_specs",
            Self::SpecLibrary => "spec_library",
            Self::Onboarding => "onboarding",
            Self::SubjectSources => "subject_sources",
            Self::Assertions => "assertions",
            Self::Questions => "questions",
            Self::Vocabulary => "vocabulary",
            Self::OpenActions => "open_actions",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }

    /// The value a loader of this kind stands for when it has nothing.
    pub fn default_output(&self) -> LoaderOutput {
        match self {
            Self::Profile => LoaderOutput::Profile(None),
            Self::Memories => LoaderOutput::Memories(vec![]),
            Self::Personality => LoaderOutput::Personality(None),
            Self::LearnerProfile => LoaderOutput::LearnerProfile(None),
            Self::RecentSessions => LoaderOutput::RecentSessions(vec![]),
            Self::SessionCount => LoaderOutput::SessionCount(0),
            Self::BehaviorTargets => LoaderOutput::BehaviorTargets(vec![]),
            Self::CallerTargets => LoaderOutput::CallerTargets(vec![]),
            Self::CallerAttributes => LoaderOutput::CallerAttributes(vec![]),
            Self::Goals => LoaderOutput::Goals(vec![]),
            Self::Playbooks => LoaderOutput::Playbooks(vec![]),
            Self::SystemSpecs => LoaderOutput::SystemSpecs(vec![]),
            Self::SpecLibrary => LoaderOutput::SpecLibrary(vec![]),
            Self::Onboarding => LoaderOutput::Onboarding(OnboardingState::default()),
            Self::SubjectSources => LoaderOutput::SubjectSources(SubjectSources::default()),
            Self::Assertions => LoaderOutput::Assertions(vec![]),
            Self::Questions => LoaderOutput::Questions(vec![]),
            Self::Vocabulary => LoaderOutput::Vocabulary(vec![]),
            Self::OpenActions => LoaderOutput::OpenActions(vec![]),
        }
    }
}

impl std::fmt::Display for LoaderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One loader's typed result.
#[derive(Debug, Clone)]
pub enum LoaderOutput {
    Profile(Option<CallerProfile>),
    Memories(Vec<MemoryFact>),
    Personality(Option<PersonalityProfile>),
    LearnerProfile(Option<LearnerProfile>),
    RecentSessions(Vec<SessionRecord>),
    SessionCount(usize),
    BehaviorTargets(Vec<BehaviorTarget>),
    CallerTargets(Vec<BehaviorTarget>),
    CallerAttributes(Vec<CallerAttribute>),
    Goals(Vec<Goal>),
    Playbooks(Vec<Playbook>),
    SystemSpecs(Vec<Specification>),
    SpecLibrary(Vec<Specification>),
    Onboarding(OnboardingState),
    SubjectSources(SubjectSources),
    Assertions(Vec<Assertion>),
    Questions(Vec<TeachingQuestion>),
    Vocabulary(Vec<VocabularyEntry>),
    OpenActions(Vec<PendingAction>),
}

impl LoaderOutput {
    pub fn kind(&self) -> LoaderKind {
        match self {
            Self::Profile(_) => LoaderKind::Profile,
            Self::Memories(_) => LoaderKind::Memories,
            Self::Personality(_) => LoaderKind::Personality,
            Self::LearnerProfile(_) => LoaderKind::LearnerProfile,
            Self::RecentSessions(_) => LoaderKind::RecentSessions,
            Self::SessionCount(_) => LoaderKind::SessionCount,
            Self::BehaviorTargets(_) => LoaderKind::BehaviorTargets,
            Self::CallerTargets(_) => LoaderKind::CallerTargets,
            Self::CallerAttributes(_) => LoaderKind::CallerAttributes,
            Self::Goals(_) => LoaderKind::Goals,
            Self::Playbooks(_) => LoaderKind::Playbooks,
            Self::SystemSpecs(_) => LoaderKind::SystemSpecs,
            Self::SpecLibrary(_) => LoaderKind::SpecLibrary,
            Self::Onboarding(_) => LoaderKind::Onboarding,
            Self::SubjectSources(_) => LoaderKind::SubjectSources,
            Self::Assertions(_) => LoaderKind::Assertions,
            Self::Questions(_) => LoaderKind::Questions,
            Self::Vocabulary(_) => LoaderKind::Vocabulary,
            Self::OpenActions(_) => LoaderKind::OpenActions,
        }
    }
}

// ── Loaded dataset ────────────────────────────────────────────────────────

/// The union of all loader outputs for one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadedDataset {
    pub profile: Option<CallerProfile>,
    pub memories: Vec<MemoryFact>,
    pub personality: Option<PersonalityProfile>,
    pub learner_profile: Option<LearnerProfile>,
    pub recent_sessions: Vec<SessionRecord>,
    pub session_count: usize,
    pub behavior_targets: Vec<BehaviorTarget>,
    pub caller_targets: Vec<BehaviorTarget>,
    pub caller_attributes: Vec<CallerAttribute>,
    pub goals: Vec<Goal>,
    pub playbooks: Vec<Playbook>,
    pub system_specs: Vec<Specification>,
    pub spec_library: Vec<Specification>,
    pub onboarding: OnboardingState,
    pub subject_sources: SubjectSources,
    pub assertions: Vec<Assertion>,
    pub questions: Vec<TeachingQuestion>,
    pub vocabulary: Vec<VocabularyEntry>,
    pub open_actions: Vec<PendingAction>,

    /// Loaders that faulted and were defaulted, in loader order
    #[serde(skip)]
    pub failures: Vec<LoadError>,
}

impl LoadedDataset {
    pub fn insert(&mut self, output: LoaderOutput) {
        match output {
            LoaderOutput::Profile(v) => self.profile = v,
            LoaderOutput::Memories(v) => self.memories = v,
            LoaderOutput::Personality(v) => self.personality = v,
            LoaderOutput::LearnerProfile(v) => self.learner_profile = v,
            LoaderOutput::RecentSessions(v) => self.recent_sessions = v,
            LoaderOutput::SessionCount(v) => self.session_count = v,
            LoaderOutput::BehaviorTargets(v) => self.behavior_targets = v,
            LoaderOutput::CallerTargets(v) => self.caller_targets = v,
            LoaderOutput::CallerAttributes(v) => self.caller_attributes = v,
            LoaderOutput::Goals(v) => self.goals = v,
            LoaderOutput::Playbooks(v) => self.playbooks = v,
            LoaderOutput::SystemSpecs(v) => self.system_specs = v,
            LoaderOutput::SpecLibrary(v) => self.spec_library = v,
            LoaderOutput::Onboarding(v) => self.onboarding = v,
            LoaderOutput::SubjectSources(v) => self.subject_sources = v,
            LoaderOutput::Assertions(v) => self.assertions = v,
            LoaderOutput::Questions(v) => self.questions = v,
            LoaderOutput::Vocabulary(v) => self.vocabulary = v,
            LoaderOutput::OpenActions(v) => self.open_actions = v,
        }
    }

    /// Whether a loader returned anything beyond its "no data" value.
    pub fn has_data(&self, kind: LoaderKind) -> bool {
        match kind {
            LoaderKind::Profile => self.profile.is_some(),
            LoaderKind::Memories => !self.memories.is_empty(),
            LoaderKind::Personality => self
                .personality
                .as_ref()
                .is_some_and(|p| !p.traits.is_empty()),
            LoaderKind::LearnerProfile => self
                .learner_profile
                .as_ref()
                .is_some_and(|p| !p.is_empty()),
            LoaderKind::RecentSessions => !self.recent_sessions.is_empty(),
            LoaderKind::SessionCount => self.session_count > 0,
            LoaderKind::BehaviorTargets => !self.behavior_targets.is_empty(),
            LoaderKind::CallerTargets => !self.caller_targets.is_empty(),
            LoaderKind::CallerAttributes => !self.caller_attributes.is_empty(),
            LoaderKind::Goals => !self.goals.is_empty(),
            LoaderKind::Playbooks => !self.playbooks.is_empty(),
            LoaderKind::SystemSpecs => !self.system_specs.is_empty(),
            LoaderKind::SpecLibrary => !self.spec_library.is_empty(),
            LoaderKind::Onboarding => self.onboarding.spec.is_some(),
            LoaderKind::SubjectSources => {
                !self.subject_sources.sources.is_empty()
                    || self.subject_sources.curriculum.is_some()
            }
            LoaderKind::Assertions => !self.assertions.is_empty(),
            LoaderKind::Questions => !self.questions.is_empty(),
            LoaderKind::Vocabulary => !self.vocabulary.is_empty(),
            LoaderKind::OpenActions => !self.open_actions.is_empty(),
        }
    }

    /// A loader's dataset as the raw JSON a section transform receives.
    pub fn source_value(&self, kind: LoaderKind) -> serde_json::Value {
        let value = match kind {
            LoaderKind::Profile => serde_json::to_value(&self.profile),
            LoaderKind::Memories => serde_json::to_value(&self.memories),
            LoaderKind::Personality => serde_json::to_value(&self.personality),
            LoaderKind::LearnerProfile => serde_json::to_value(&self.learner_profile),
            LoaderKind::RecentSessions => serde_json::to_value(&self.recent_sessions),
            LoaderKind::SessionCount => serde_json::to_value(self.session_count),
            LoaderKind::BehaviorTargets => serde_json::to_value(&self.behavior_targets),
            LoaderKind::CallerTargets => serde_json::to_value(&self.caller_targets),
            LoaderKind::CallerAttributes => serde_json::to_value(&self.caller_attributes),
            LoaderKind::Goals => serde_json::to_value(&self.goals),
            LoaderKind::Playbooks => serde_json::to_value(&self.playbooks),
            LoaderKind::SystemSpecs => serde_json::to_value(&self.system_specs),
            LoaderKind::SpecLibrary => serde_json::to_value(&self.spec_library),
            LoaderKind::Onboarding => serde_json::to_value(&self.onboarding),
            LoaderKind::SubjectSources => serde_json::to_value(&self.subject_sources),
            LoaderKind::Assertions => serde_json::to_value(&self.assertions),
            LoaderKind::Questions => serde_json::to_value(&self.questions),
            LoaderKind::Vocabulary => serde_json::to_value(&self.vocabulary),
            LoaderKind::OpenActions => serde_json::to_value(&self.open_actions),
        };
        value.unwrap_or(serde_json::Value::Null)
    }

    pub fn failed(&self, kind: LoaderKind) -> bool {
        self.failures.iter().any(|f| f.loader == kind.as_str())
    }
}

// ── Loader trait ──────────────────────────────────────────────────────────

/// A single named fetch.
///
/// "No data" is returned as the kind's default output, never as an error.
#[async_trait]
pub trait Loader: Send + Sync {
    fn kind(&self) -> LoaderKind;

    async fn load(
        &self,
        caller: &CallerId,
        config: &serde_json::Value,
    ) -> Result<LoaderOutput, LoadError>;
}

/// Read a `limit` from loader config, falling back to `default`.
fn limit_from(config: &serde_json::Value, default: usize) -> usize {
    config
        .get("limit")
        .and_then(|v| v.as_u64())
        .map(|v| v as usize)
        .unwrap_or(default)
}

const DEFAULT_MEMORY_LIMIT: usize = 100;
const DEFAULT_SESSION_LIMIT: usize = 10;

/// The standard loader: one [`CallerStore`] method per kind.
pub struct StoreLoader {
    kind: LoaderKind,
    store: Arc<dyn CallerStore>,
}

impl StoreLoader {
    pub fn new(kind: LoaderKind, store: Arc<dyn CallerStore>) -> Self {
        Self { kind, store }
    }
}

#[async_trait]
impl Loader for StoreLoader {
    fn kind(&self) -> LoaderKind {
        self.kind
    }

    async fn load(
        &self,
        caller: &CallerId,
        config: &serde_json::Value,
    ) -> Result<LoaderOutput, LoadError> {
        let store = self.store.as_ref();
        let output = match self.kind {
            LoaderKind::Profile => store.profile(caller).await.map(LoaderOutput::Profile),
            LoaderKind::Memories => store
                .memories(caller, limit_from(config, DEFAULT_MEMORY_LIMIT))
                .await
                .map(LoaderOutput::Memories),
            LoaderKind::Personality => store
                .personality(caller)
                .await
                .map(LoaderOutput::Personality),
            LoaderKind::LearnerProfile => store
                .learner_profile(caller)
                .await
                .map(LoaderOutput::LearnerProfile),
            LoaderKind::RecentSessions => store
                .recent_sessions(caller, limit_from(config, DEFAULT_SESSION_LIMIT))
                .await
                .map(LoaderOutput::RecentSessions),
            LoaderKind::SessionCount => store
                .session_count(caller)
                .await
                .map(LoaderOutput::SessionCount),
            LoaderKind::BehaviorTargets => store
                .behavior_targets(caller)
                .await
                .map(LoaderOutput::BehaviorTargets),
            LoaderKind::CallerTargets => store
                .caller_targets(caller)
                .await
                .map(LoaderOutput::CallerTargets),
            LoaderKind::CallerAttributes => store
                .caller_attributes(caller)
                .await
                .map(LoaderOutput::CallerAttributes),
            LoaderKind::Goals => store.goals(caller).await.map(LoaderOutput::Goals),
            LoaderKind::Playbooks => store.playbooks(caller).await.map(LoaderOutput::Playbooks),
            LoaderKind::SystemSpecs => store.system_specs().await.map(LoaderOutput::SystemSpecs),
            LoaderKind::SpecLibrary => store.spec_library().await.map(LoaderOutput::SpecLibrary),
            LoaderKind::Onboarding => store.onboarding(caller).await.map(LoaderOutput::Onboarding),
            LoaderKind::SubjectSources => store
                .subject_sources(caller)
                .await
                .map(LoaderOutput::SubjectSources),
            LoaderKind::Assertions => store
                .assertions(caller)
                .await
                .map(LoaderOutput::Assertions),
            LoaderKind::Questions => store.questions(caller).await.map(LoaderOutput::Questions),
            LoaderKind::Vocabulary => store
                .vocabulary(caller)
                .await
                .map(LoaderOutput::Vocabulary),
            LoaderKind::OpenActions => store
                .open_actions(caller)
                .await
                .map(LoaderOutput::OpenActions),
        };
        output.map_err(|e| LoadError::new(self.kind.as_str(), e.to_string()))
    }
}

// ── Registry ──────────────────────────────────────────────────────────────

/// Loader name → loader. Built once at startup and shared by every run.
pub struct LoaderRegistry {
    loaders: HashMap<LoaderKind, Arc<dyn Loader>>,
}

impl LoaderRegistry {
    pub fn new() -> Self {
        Self {
            loaders: HashMap::new(),
        }
    }

    /// A registry with a [`StoreLoader`] for every kind.
    pub fn with_store(store: Arc<dyn CallerStore>) -> Self {
        let mut registry = Self::new();
        for kind in LoaderKind::ALL {
            registry.register(Arc::new(StoreLoader::new(kind, store.clone())));
        }
        registry
    }

    /// Register a loader. Replaces any existing loader of the same kind.
    pub fn register(&mut self, loader: Arc<dyn Loader>) {
        self.loaders.insert(loader.kind(), loader);
    }

    pub fn get(&self, kind: LoaderKind) -> Option<&dyn Loader> {
        self.loaders.get(&kind).map(|l| l.as_ref())
    }

    /// Registered kinds, in canonical order.
    pub fn kinds(&self) -> Vec<LoaderKind> {
        LoaderKind::ALL
            .into_iter()
            .filter(|k| self.loaders.contains_key(k))
            .collect()
    }

    /// Run every registered loader concurrently and join the results.
    ///
    /// `configs` holds per-loader configuration keyed by loader name.
    /// Results are applied in canonical loader order, so the dataset does
    /// not depend on completion order.
    pub async fn load_all(
        &self,
        caller: &CallerId,
        configs: &BTreeMap<String, serde_json::Value>,
    ) -> LoadedDataset {
        let null = serde_json::Value::Null;
        let kinds = self.kinds();

        let fetches = kinds.iter().map(|kind| {
            let loader = self.loaders[kind].clone();
            let config = configs.get(kind.as_str()).unwrap_or(&null);
            async move {
                let started = Instant::now();
                let result = loader.load(caller, config).await;
                (*kind, result, started.elapsed())
            }
        });
        let results = join_all(fetches).await;

        let mut dataset = LoadedDataset::default();
        for (kind, result, elapsed) in results {
            match result {
                Ok(output) if output.kind() == kind => {
                    debug!(
                        caller_id = %caller,
                        loader = kind.as_str(),
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Loader settled"
                    );
                    dataset.insert(output);
                }
                Ok(output) => {
                    let err = LoadError::new(
                        kind.as_str(),
                        format!("returned a '{}' dataset", output.kind()),
                    );
                    warn!(caller_id = %caller, loader = kind.as_str(), "{err}; using default");
                    dataset.insert(kind.default_output());
                    dataset.failures.push(err);
                }
                Err(err) => {
                    warn!(caller_id = %caller, loader = kind.as_str(), "{err}; using default");
                    dataset.insert(kind.default_output());
                    dataset.failures.push(err);
                }
            }
        }
        dataset
    }
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
