//! JSON fixture format for seeding the in-memory store.
//!
//! ```json
//! {
//!   "callers": [{ "profile": { "id": "c1", "domain_id": "maths" }, "memories": [] }],
//!   "system_specs": [],
//!   "spec_library": []
//! }
//! ```

use promptloom_core::{
    Assertion, BehaviorTarget, CallerAttribute, CallerProfile, Goal, LearnerProfile, MemoryFact,
    OnboardingProgress, PendingAction, PersonalityProfile, Playbook, SessionRecord, Specification,
    SubjectSources, TeachingQuestion, VocabularyEntry,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A full data snapshot: callers plus the global catalogs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub callers: Vec<CallerFixture>,

    /// Globally active specifications, in catalog order
    #[serde(default)]
    pub system_specs: Vec<Specification>,

    /// Additional slug-addressable specifications (archetypes, inactive specs)
    #[serde(default)]
    pub spec_library: Vec<Specification>,

    /// The designated onboarding specification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onboarding_spec: Option<Specification>,
}

/// Everything stored about one caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallerFixture {
    pub profile: CallerProfile,

    #[serde(default)]
    pub memories: Vec<MemoryFact>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personality: Option<PersonalityProfile>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learner_profile: Option<LearnerProfile>,

    /// Any order; the store sorts most-recent-first on read
    #[serde(default)]
    pub sessions: Vec<SessionRecord>,

    /// Total session count when it exceeds the recorded history
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_count: Option<usize>,

    #[serde(default)]
    pub behavior_targets: Vec<BehaviorTarget>,

    #[serde(default)]
    pub caller_targets: Vec<BehaviorTarget>,

    #[serde(default)]
    pub attributes: Vec<CallerAttribute>,

    #[serde(default)]
    pub goals: Vec<Goal>,

    #[serde(default)]
    pub playbooks: Vec<Playbook>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onboarding_progress: Option<OnboardingProgress>,

    #[serde(default)]
    pub subject_sources: SubjectSources,

    #[serde(default)]
    pub assertions: Vec<Assertion>,

    #[serde(default)]
    pub questions: Vec<TeachingQuestion>,

    #[serde(default)]
    pub vocabulary: Vec<VocabularyEntry>,

    #[serde(default)]
    pub open_actions: Vec<PendingAction>,
}

impl CallerFixture {
    /// A caller with a profile and nothing else.
    pub fn new(profile: CallerProfile) -> Self {
        Self {
            profile,
            memories: vec![],
            personality: None,
            learner_profile: None,
            sessions: vec![],
            session_count: None,
            behavior_targets: vec![],
            caller_targets: vec![],
            attributes: vec![],
            goals: vec![],
            playbooks: vec![],
            onboarding_progress: None,
            subject_sources: SubjectSources::default(),
            assertions: vec![],
            questions: vec![],
            vocabulary: vec![],
            open_actions: vec![],
        }
    }
}

impl Fixture {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}
