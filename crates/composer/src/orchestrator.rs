//! Section orchestrator: runs a compiled plan over an assembled context.
//!
//! Sections execute one at a time in plan order. Each is either activated
//! (its transform output lands under its output key) or skipped (its
//! fallback policy decides what, if anything, lands). A transform failure
//! is handled exactly like an inactive condition: only that section falls
//! back, every other section still runs.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::context::AssembledContext;
use crate::plan::SectionPlan;
use crate::section::{ConditionRegistry, DataSourceRef, FallbackPolicy, SectionDefinition};
use crate::transform::TransformRegistry;

/// Transform whose output carries the merged behavior-target count.
const MERGE_TARGETS: &str = "merge_targets";

/// A section that did not activate, and why.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedSection {
    pub id: String,
    pub reason: String,
    pub fallback: FallbackPolicy,
}

/// What one pass over the plan produced.
#[derive(Debug, Clone, Default)]
pub struct Execution {
    /// Output key → value
    pub document: Map<String, Value>,
    pub activated: Vec<String>,
    pub skipped: Vec<SkippedSection>,
    pub execution_order: Vec<String>,
    pub merged_target_count: usize,
}

pub struct Orchestrator<'a> {
    plan: &'a SectionPlan,
    transforms: &'a TransformRegistry,
    conditions: &'a ConditionRegistry,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        plan: &'a SectionPlan,
        transforms: &'a TransformRegistry,
        conditions: &'a ConditionRegistry,
    ) -> Self {
        Self {
            plan,
            transforms,
            conditions,
        }
    }

    pub fn execute(&self, ctx: &mut AssembledContext) -> Execution {
        let mut run = Execution::default();

        for section in self.plan.ordered() {
            run.execution_order.push(section.id.clone());

            if !self.conditions.evaluate(section, ctx) {
                debug!(section = %section.id, condition = section.condition.name(), "Section inactive");
                let reason = format!("skipped: {} evaluated false", section.condition.name());
                fall_back(section, reason, ctx, &mut run);
                continue;
            }

            let input = resolve_input(section, ctx);
            let mut merged = 0;
            let result =
                self.transforms
                    .run_observed(&section.transform, input, ctx, section, |step, output| {
                        if step == MERGE_TARGETS {
                            merged = output
                                .get("merged_count")
                                .and_then(|c| c.as_u64())
                                .unwrap_or(0) as usize;
                        }
                    });
            match result {
                Ok(output) => {
                    debug!(section = %section.id, "Section activated");
                    run.merged_target_count += merged;
                    run.document
                        .insert(section.output_key.clone(), output.clone());
                    ctx.record(&section.id, output);
                    run.activated.push(section.id.clone());
                }
                Err(failure) => {
                    warn!(
                        section = %section.id,
                        transform = %failure.transform,
                        error = %failure.error,
                        "Transform failed; applying fallback"
                    );
                    let reason = format!(
                        "transform '{}' failed: {}",
                        failure.transform,
                        failure.error.reason()
                    );
                    fall_back(section, reason, ctx, &mut run);
                }
            }
        }

        run
    }
}

/// The raw input a section's transform chain receives.
///
/// One source passes its value through; several arrive as an object keyed
/// by source name; none gives `null`.
fn resolve_input(section: &SectionDefinition, ctx: &AssembledContext) -> Value {
    let value_of = |source: &DataSourceRef| match source {
        DataSourceRef::Loader(kind) => ctx.dataset.source_value(*kind),
        DataSourceRef::Assembled => ctx.assembled_value(),
    };
    match section.sources.as_slice() {
        [] => Value::Null,
        [only] => value_of(only),
        many => Value::Object(
            many.iter()
                .map(|s| (s.name().to_string(), value_of(s)))
                .collect(),
        ),
    }
}

fn fall_back(
    section: &SectionDefinition,
    reason: String,
    ctx: &mut AssembledContext,
    run: &mut Execution,
) {
    match section.fallback {
        FallbackPolicy::Omit => ctx.record(&section.id, Value::Null),
        FallbackPolicy::Null => {
            run.document.insert(section.output_key.clone(), Value::Null);
            ctx.record(&section.id, Value::Null);
        }
        FallbackPolicy::EmptyObject => {
            let empty = Value::Object(Map::new());
            run.document.insert(section.output_key.clone(), empty.clone());
            ctx.record(&section.id, empty);
        }
        FallbackPolicy::Skip => {}
    }
    run.skipped.push(SkippedSection {
        id: section.id.clone(),
        reason,
        fallback: section.fallback,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::LoaderKind;
    use crate::section::Condition;
    use crate::transform::test_support::empty_context;
    use promptloom_core::{MemoryCategory, MemoryFact, TransformError};
    use serde_json::json;

    fn registries() -> (TransformRegistry, ConditionRegistry) {
        let mut transforms = TransformRegistry::builtin();
        transforms.register_fn("explode", |_input, _ctx, _s| {
            Err(TransformError::failed("explode", "boom"))
        });
        transforms.register_fn("count_sections", |input, _ctx, _s| {
            Ok(json!(input.as_object().map(|m| m.len()).unwrap_or(0)))
        });
        (transforms, ConditionRegistry::with_defaults())
    }

    fn run(sections: Vec<SectionDefinition>, ctx: &mut AssembledContext) -> Execution {
        let (transforms, conditions) = registries();
        let plan = SectionPlan::compile(sections, &transforms, &conditions).unwrap();
        Orchestrator::new(&plan, &transforms, &conditions).execute(ctx)
    }

    #[test]
    fn fallback_policies_shape_the_document() {
        let mut ctx = empty_context();
        let exec = run(
            vec![
                SectionDefinition::new("omitted", "Omitted")
                    .source(LoaderKind::Goals)
                    .condition(Condition::DataExists),
                SectionDefinition::new("nulled", "Nulled")
                    .condition(Condition::ContentSpec)
                    .fallback(FallbackPolicy::Null),
                SectionDefinition::new("emptied", "Emptied")
                    .condition(Condition::HasDomain)
                    .fallback(FallbackPolicy::EmptyObject),
                SectionDefinition::new("skipped", "Skipped")
                    .condition(Condition::Custom("returning_caller".into()))
                    .fallback(FallbackPolicy::Skip),
            ],
            &mut ctx,
        );

        assert!(!exec.document.contains_key("omitted"));
        assert_eq!(exec.document["nulled"], Value::Null);
        assert_eq!(exec.document["emptied"], json!({}));
        assert!(!exec.document.contains_key("skipped"));
        assert_eq!(exec.skipped.len(), 4);
        assert_eq!(exec.skipped[0].reason, "skipped: data_exists evaluated false");

        assert!(ctx.section("omitted").is_some());
        assert!(ctx.section("skipped").is_none());
    }

    #[test]
    fn transform_failure_only_affects_its_section() {
        let mut ctx = empty_context();
        let exec = run(
            vec![
                SectionDefinition::new("broken", "Broken")
                    .transform("explode")
                    .fallback(FallbackPolicy::EmptyObject),
                SectionDefinition::new("fine", "Fine").config(json!({"x": 1})),
            ],
            &mut ctx,
        );
        assert_eq!(exec.activated, vec!["fine"]);
        assert_eq!(exec.document["broken"], json!({}));
        assert_eq!(exec.skipped[0].reason, "transform 'explode' failed: boom");
    }

    #[test]
    fn assembled_source_sees_earlier_sections() {
        let mut ctx = empty_context();
        ctx.dataset.memories = vec![MemoryFact {
            id: "m".into(),
            category: MemoryCategory::Fact,
            key: "pet".into(),
            value: "cat".into(),
            confidence: 0.9,
            source_session: None,
            created_at: None,
        }];
        let exec = run(
            vec![
                SectionDefinition::new("summary", "Summary")
                    .priority(0)
                    .assembled()
                    .transform("count_sections")
                    .depends_on(&["memories", "goals"]),
                SectionDefinition::new("memories", "Memories")
                    .priority(10)
                    .source(LoaderKind::Memories)
                    .condition(Condition::DataExists)
                    .chain(&["dedupe_memories", "score_memory_relevance", "group_memories"]),
                SectionDefinition::new("goals", "Goals")
                    .priority(20)
                    .source(LoaderKind::Goals)
                    .condition(Condition::DataExists),
            ],
            &mut ctx,
        );
        assert_eq!(exec.execution_order, vec!["memories", "goals", "summary"]);
        // goals was omitted but still recorded as settled
        assert_eq!(exec.document["summary"], json!(2));
        assert_eq!(exec.document["memories"]["total"], 1);
    }

    #[test]
    fn multiple_sources_arrive_keyed_by_name() {
        let mut ctx = empty_context();
        let exec = run(
            vec![
                SectionDefinition::new("raw", "Raw")
                    .source(LoaderKind::Goals)
                    .source(LoaderKind::SessionCount),
            ],
            &mut ctx,
        );
        assert_eq!(exec.document["raw"], json!({"goals": [], "session_count": 0}));
    }

    #[test]
    fn merged_target_count_is_reported() {
        let mut ctx = empty_context();
        ctx.dataset.behavior_targets = serde_json::from_value(json!([
            {"parameter_id": "warmth", "scope": "system", "target_value": 0.7},
            {"parameter_id": "pace", "scope": "domain", "target_value": 0.4}
        ]))
        .unwrap();
        let exec = run(
            vec![
                SectionDefinition::new("behavior_targets", "Behavior Targets")
                    .source(LoaderKind::BehaviorTargets)
                    .source(LoaderKind::CallerTargets)
                    .transform("merge_targets"),
            ],
            &mut ctx,
        );
        assert_eq!(exec.merged_target_count, 2);
    }

    #[test]
    fn merged_target_count_survives_later_chain_steps() {
        let mut ctx = empty_context();
        ctx.dataset.behavior_targets = serde_json::from_value(json!([
            {"parameter_id": "warmth", "scope": "system", "target_value": 0.7},
            {"parameter_id": "pace", "scope": "domain", "target_value": 0.4},
            {"parameter_id": "depth", "scope": "system", "target_value": 0.5}
        ]))
        .unwrap();
        let exec = run(
            vec![
                SectionDefinition::new("behavior_targets", "Behavior Targets")
                    .source(LoaderKind::BehaviorTargets)
                    .source(LoaderKind::CallerTargets)
                    .chain(&["merge_targets", "count_sections"]),
            ],
            &mut ctx,
        );
        assert_eq!(exec.activated, vec!["behavior_targets"]);
        assert!(exec.document["behavior_targets"].is_number());
        assert_eq!(exec.merged_target_count, 3);
    }

    #[test]
    fn failed_chain_after_merge_reports_no_merged_targets() {
        let mut ctx = empty_context();
        ctx.dataset.behavior_targets = serde_json::from_value(json!([
            {"parameter_id": "warmth", "scope": "system", "target_value": 0.7}
        ]))
        .unwrap();
        let exec = run(
            vec![
                SectionDefinition::new("behavior_targets", "Behavior Targets")
                    .source(LoaderKind::BehaviorTargets)
                    .chain(&["merge_targets", "explode"]),
            ],
            &mut ctx,
        );
        assert!(exec.activated.is_empty());
        assert_eq!(exec.merged_target_count, 0);
    }
}
