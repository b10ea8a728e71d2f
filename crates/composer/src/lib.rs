//! The promptloom composition pipeline.
//!
//! One run turns a caller id into a personalized document:
//!
//! 1. **Load** every dataset for the caller concurrently (loader registry)
//! 2. **Resolve** the identity, content and voice specifications, applying
//!    archetype inheritance to identity
//! 3. **Compute** shared state once: modules, progress, review urgency
//! 4. **Execute** the compiled section plan in dependency order, each
//!    section running its condition, sources and transform chain
//! 5. **Render** a plain-text summary of the document
//!
//! Only an unknown caller fails a run. Everything else degrades the part
//! of the document it touches.

pub mod composer;
pub mod context;
pub mod defaults;
pub mod loader;
pub mod orchestrator;
pub mod plan;
pub mod render;
pub mod resolver;
pub mod section;
pub mod shared_state;
pub mod transform;

pub use composer::{CompositionMetadata, CompositionResult, Composer, plan_definitions};
pub use context::{AssembledContext, RunConfig};
pub use defaults::default_sections;
pub use loader::{LoadedDataset, Loader, LoaderKind, LoaderOutput, LoaderRegistry, StoreLoader};
pub use orchestrator::{Execution, Orchestrator, SkippedSection};
pub use plan::SectionPlan;
pub use render::render_summary;
pub use resolver::{ResolvedSpecs, SpecResolver, archetype_slug};
pub use section::{
    ASSEMBLED_SOURCE, Condition, ConditionRegistry, DataSourceRef, FallbackPolicy,
    SectionDefinition, TransformRef,
};
pub use shared_state::{ReviewSchedule, ReviewType, SharedState, StateCalculator, classify_review};
pub use transform::{ChainFailure, FnTransform, Transform, TransformRegistry};
