//! Collaborator traits: the data store the loaders read from and the
//! persistence layer composed documents are handed to.
//!
//! Implementations: in-memory fixtures and SQLite (see `promptloom-store`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::caller::{
    CallerAttribute, CallerId, CallerProfile, Goal, LearnerProfile, OnboardingState,
    PendingAction, PersonalityProfile, SessionRecord,
};
use crate::content::{Assertion, SubjectSources, TeachingQuestion, VocabularyEntry};
use crate::error::StoreError;
use crate::memory::MemoryFact;
use crate::spec::{Playbook, Specification};
use crate::target::BehaviorTarget;

/// Read side: one single-purpose fetch per dataset, keyed by caller.
///
/// "No data" is never an error: return `None` or an empty collection.
/// `Err` is reserved for actual faults.
#[async_trait]
pub trait CallerStore: Send + Sync {
    /// The backend name (e.g., "in_memory", "sqlite").
    fn name(&self) -> &str;

    async fn profile(&self, caller: &CallerId) -> Result<Option<CallerProfile>, StoreError>;

    async fn memories(&self, caller: &CallerId, limit: usize)
    -> Result<Vec<MemoryFact>, StoreError>;

    async fn personality(&self, caller: &CallerId)
    -> Result<Option<PersonalityProfile>, StoreError>;

    async fn learner_profile(&self, caller: &CallerId)
    -> Result<Option<LearnerProfile>, StoreError>;

    /// Most recent first.
    async fn recent_sessions(
        &self,
        caller: &CallerId,
        limit: usize,
    ) -> Result<Vec<SessionRecord>, StoreError>;

    async fn session_count(&self, caller: &CallerId) -> Result<usize, StoreError>;

    /// Globally effective targets (system, domain and playbook scopes).
    async fn behavior_targets(&self, caller: &CallerId) -> Result<Vec<BehaviorTarget>, StoreError>;

    /// Caller-scoped overrides.
    async fn caller_targets(&self, caller: &CallerId) -> Result<Vec<BehaviorTarget>, StoreError>;

    async fn caller_attributes(&self, caller: &CallerId)
    -> Result<Vec<CallerAttribute>, StoreError>;

    async fn goals(&self, caller: &CallerId) -> Result<Vec<Goal>, StoreError>;

    /// Stacked playbooks for the caller's domain, in any order.
    async fn playbooks(&self, caller: &CallerId) -> Result<Vec<Playbook>, StoreError>;

    /// Globally active specifications, in catalog order.
    async fn system_specs(&self) -> Result<Vec<Specification>, StoreError>;

    /// Every specification addressable by slug, active or not.
    async fn spec_library(&self) -> Result<Vec<Specification>, StoreError>;

    async fn onboarding(&self, caller: &CallerId) -> Result<OnboardingState, StoreError>;

    async fn subject_sources(&self, caller: &CallerId) -> Result<SubjectSources, StoreError>;

    async fn assertions(&self, caller: &CallerId) -> Result<Vec<Assertion>, StoreError>;

    async fn questions(&self, caller: &CallerId) -> Result<Vec<TeachingQuestion>, StoreError>;

    async fn vocabulary(&self, caller: &CallerId) -> Result<Vec<VocabularyEntry>, StoreError>;

    async fn open_actions(&self, caller: &CallerId) -> Result<Vec<PendingAction>, StoreError>;
}

/// Lifecycle status of a stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositionStatus {
    Active,
    Superseded,
}

impl CompositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Superseded => "superseded",
        }
    }
}

/// A composed document ready to be persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewComposition {
    pub caller_id: CallerId,
    pub document: serde_json::Value,
    pub summary: String,

    /// What caused the recomposition (e.g. "session_end", "manual")
    pub trigger: String,

    /// Run metadata (activated/skipped sections, timings)
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// A persisted composition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositionRecord {
    pub id: String,
    pub caller_id: CallerId,
    pub document: serde_json::Value,
    pub summary: String,
    pub trigger: String,
    pub metadata: serde_json::Value,
    pub status: CompositionStatus,
    pub created_at: DateTime<Utc>,
}

/// Write side: create-and-supersede.
///
/// After any number of `save` calls for one caller complete, including
/// concurrent ones, exactly one record for that caller is `Active`, and it
/// is the most recently created.
#[async_trait]
pub trait CompositionStore: Send + Sync {
    fn name(&self) -> &str;

    /// Store a new active record and supersede the caller's previous one(s).
    async fn save(&self, composition: NewComposition) -> Result<CompositionRecord, StoreError>;

    async fn active_for(&self, caller: &CallerId) -> Result<Option<CompositionRecord>, StoreError>;

    /// All records for the caller, oldest first.
    async fn history(&self, caller: &CallerId) -> Result<Vec<CompositionRecord>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_wire_format() {
        assert_eq!(
            serde_json::to_string(&CompositionStatus::Superseded).unwrap(),
            "\"superseded\""
        );
        assert_eq!(CompositionStatus::Active.as_str(), "active");
    }
}
