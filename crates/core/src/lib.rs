//! # promptloom core
//!
//! Domain types, collaborator traits, and error definitions for the
//! promptloom composition pipeline. This crate holds **no pipeline logic**.
//! It defines the data model every other crate builds against.
//!
//! ## Design Philosophy
//!
//! Everything outside the pipeline (the data store that answers per-caller
//! queries, the store that persists composed documents) is a trait here.
//! Implementations live in `promptloom-store`. This enables:
//! - Swapping backends without touching the composer
//! - Testing the whole pipeline over in-memory fixtures
//! - A clean dependency graph (all crates depend inward on core)

pub mod caller;
pub mod content;
pub mod error;
pub mod memory;
pub mod spec;
pub mod store;
pub mod target;

// Re-export key types at crate root for ergonomics
pub use caller::{
    AttributeValue, CallerAttribute, CallerId, CallerProfile, Goal, GoalStatus, LearnerProfile,
    OnboardingProgress, OnboardingState, PendingAction, PersonalityProfile, SessionRecord,
};
pub use content::{
    Assertion, ContentSource, Curriculum, CurriculumModule, SubjectSources, TeachingQuestion,
    TrustLevel, VocabularyEntry,
};
pub use error::{CompositionError, Error, LoadError, Result, StoreError, TransformError};
pub use memory::{MemoryCategory, MemoryFact};
pub use spec::{Playbook, PlaybookItem, SpecRole, Specification};
pub use store::{
    CallerStore, CompositionRecord, CompositionStatus, CompositionStore, NewComposition,
};
pub use target::{BehaviorTarget, TargetScope};
