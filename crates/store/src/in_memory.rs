//! In-memory backend: useful for testing, fixtures and ephemeral runs.
//!
//! Implements both collaborator traits. Compositions are written under a
//! single mutex, which is what serializes concurrent `save` calls and keeps
//! one active document per caller.

use async_trait::async_trait;
use chrono::Utc;
use promptloom_core::{
    Assertion, BehaviorTarget, CallerAttribute, CallerId, CallerProfile, CallerStore,
    CompositionRecord, CompositionStatus, CompositionStore, Goal, LearnerProfile, MemoryFact,
    NewComposition, OnboardingState, PendingAction, PersonalityProfile, Playbook, SessionRecord,
    Specification, StoreError, SubjectSources, TeachingQuestion, VocabularyEntry,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::fixture::{CallerFixture, Fixture};

/// An in-memory store seeded from a [`Fixture`].
pub struct InMemoryStore {
    callers: Arc<RwLock<BTreeMap<CallerId, CallerFixture>>>,
    system_specs: Vec<Specification>,
    spec_library: Vec<Specification>,
    onboarding_spec: Option<Specification>,
    compositions: Arc<Mutex<Vec<CompositionRecord>>>,
    /// Dataset names whose fetches fail (fault injection for tests)
    failing: Arc<RwLock<HashSet<String>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::from_fixture(Fixture::default())
    }

    pub fn from_fixture(fixture: Fixture) -> Self {
        let callers = fixture
            .callers
            .into_iter()
            .map(|c| (c.profile.id.clone(), c))
            .collect();
        Self {
            callers: Arc::new(RwLock::new(callers)),
            system_specs: fixture.system_specs,
            spec_library: fixture.spec_library,
            onboarding_spec: fixture.onboarding_spec,
            compositions: Arc::new(Mutex::new(Vec::new())),
            failing: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// Add or replace a caller.
    pub async fn insert_caller(&self, caller: CallerFixture) {
        self.callers
            .write()
            .await
            .insert(caller.profile.id.clone(), caller);
    }

    /// Make every fetch of `dataset` fail with a storage error.
    pub async fn fail_on(&self, dataset: &str) {
        self.failing.write().await.insert(dataset.to_string());
    }

    async fn check(&self, dataset: &str) -> Result<(), StoreError> {
        if self.failing.read().await.contains(dataset) {
            return Err(StoreError::Storage(format!("injected failure for {dataset}")));
        }
        Ok(())
    }

    /// Read one caller's fixture through `f`; unknown callers yield `T::default()`.
    async fn with_caller<T: Default>(
        &self,
        dataset: &str,
        caller: &CallerId,
        f: impl FnOnce(&CallerFixture) -> T,
    ) -> Result<T, StoreError> {
        self.check(dataset).await?;
        let callers = self.callers.read().await;
        Ok(callers.get(caller).map(f).unwrap_or_default())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CallerStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn profile(&self, caller: &CallerId) -> Result<Option<CallerProfile>, StoreError> {
        self.with_caller("profile", caller, |c| Some(c.profile.clone()))
            .await
    }

    async fn memories(
        &self,
        caller: &CallerId,
        limit: usize,
    ) -> Result<Vec<MemoryFact>, StoreError> {
        self.with_caller("memories", caller, |c| {
            c.memories.iter().take(limit).cloned().collect()
        })
        .await
    }

    async fn personality(
        &self,
        caller: &CallerId,
    ) -> Result<Option<PersonalityProfile>, StoreError> {
        self.with_caller("personality", caller, |c| c.personality.clone())
            .await
    }

    async fn learner_profile(
        &self,
        caller: &CallerId,
    ) -> Result<Option<LearnerProfile>, StoreError> {
        self.with_caller("learner_profile", caller, |c| c.learner_profile.clone())
            .await
    }

    async fn recent_sessions(
        &self,
        caller: &CallerId,
        limit: usize,
    ) -> Result<Vec<SessionRecord>, StoreError> {
        self.with_caller("recent_sessions", caller, |c| {
            let mut sessions = c.sessions.clone();
            sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
            sessions.truncate(limit);
            sessions
        })
        .await
    }

    async fn session_count(&self, caller: &CallerId) -> Result<usize, StoreError> {
        self.with_caller("session_count", caller, |c| {
            c.session_count.unwrap_or(c.sessions.len())
        })
        .await
    }

    async fn behavior_targets(
        &self,
        caller: &CallerId,
    ) -> Result<Vec<BehaviorTarget>, StoreError> {
        self.with_caller("behavior_targets", caller, |c| c.behavior_targets.clone())
            .await
    }

    async fn caller_targets(&self, caller: &CallerId) -> Result<Vec<BehaviorTarget>, StoreError> {
        self.with_caller("caller_targets", caller, |c| c.caller_targets.clone())
            .await
    }

    async fn caller_attributes(
        &self,
        caller: &CallerId,
    ) -> Result<Vec<CallerAttribute>, StoreError> {
        self.with_caller("caller_attributes", caller, |c| c.attributes.clone())
            .await
    }

    async fn goals(&self, caller: &CallerId) -> Result<Vec<Goal>, StoreError> {
        self.with_caller("goals", caller, |c| c.goals.clone()).await
    }

    async fn playbooks(&self, caller: &CallerId) -> Result<Vec<Playbook>, StoreError> {
        self.with_caller("playbooks", caller, |c| c.playbooks.clone())
            .await
    }

    async fn system_specs(&self) -> Result<Vec<Specification>, StoreError> {
        self.check("system_specs").await?;
        Ok(self
            .system_specs
            .iter()
            .filter(|s| s.is_active)
            .cloned()
            .collect())
    }

    async fn spec_library(&self) -> Result<Vec<Specification>, StoreError> {
        self.check("spec_library").await?;
        let mut library = self.spec_library.clone();
        for spec in &self.system_specs {
            if !library.iter().any(|s| s.id == spec.id) {
                library.push(spec.clone());
            }
        }
        Ok(library)
    }

    async fn onboarding(&self, caller: &CallerId) -> Result<OnboardingState, StoreError> {
        let spec = self.onboarding_spec.clone();
        self.with_caller("onboarding", caller, |c| OnboardingState {
            spec,
            progress: c.onboarding_progress.clone(),
        })
        .await
    }

    async fn subject_sources(&self, caller: &CallerId) -> Result<SubjectSources, StoreError> {
        self.with_caller("subject_sources", caller, |c| c.subject_sources.clone())
            .await
    }

    async fn assertions(&self, caller: &CallerId) -> Result<Vec<Assertion>, StoreError> {
        self.with_caller("assertions", caller, |c| c.assertions.clone())
            .await
    }

    async fn questions(&self, caller: &CallerId) -> Result<Vec<TeachingQuestion>, StoreError> {
        self.with_caller("questions", caller, |c| c.questions.clone())
            .await
    }

    async fn vocabulary(&self, caller: &CallerId) -> Result<Vec<VocabularyEntry>, StoreError> {
        self.with_caller("vocabulary", caller, |c| c.vocabulary.clone())
            .await
    }

    async fn open_actions(&self, caller: &CallerId) -> Result<Vec<PendingAction>, StoreError> {
        self.with_caller("open_actions", caller, |c| c.open_actions.clone())
            .await
    }
}

#[async_trait]
impl CompositionStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn save(&self, composition: NewComposition) -> Result<CompositionRecord, StoreError> {
        self.check("compositions").await?;
        let mut records = self.compositions.lock().await;

        let mut superseded = 0;
        for record in records
            .iter_mut()
            .filter(|r| r.caller_id == composition.caller_id)
        {
            if record.status == CompositionStatus::Active {
                record.status = CompositionStatus::Superseded;
                superseded += 1;
            }
        }

        let record = CompositionRecord {
            id: Uuid::new_v4().to_string(),
            caller_id: composition.caller_id,
            document: composition.document,
            summary: composition.summary,
            trigger: composition.trigger,
            metadata: composition.metadata,
            status: CompositionStatus::Active,
            created_at: Utc::now(),
        };
        debug!(
            caller_id = %record.caller_id,
            superseded,
            "Stored composition {}", record.id
        );
        records.push(record.clone());
        Ok(record)
    }

    async fn active_for(&self, caller: &CallerId) -> Result<Option<CompositionRecord>, StoreError> {
        let records = self.compositions.lock().await;
        Ok(records
            .iter()
            .find(|r| &r.caller_id == caller && r.status == CompositionStatus::Active)
            .cloned())
    }

    async fn history(&self, caller: &CallerId) -> Result<Vec<CompositionRecord>, StoreError> {
        let records = self.compositions.lock().await;
        Ok(records
            .iter()
            .filter(|r| &r.caller_id == caller)
            .cloned()
            .collect())
    }
}
