//! Behavior-target priority merge.
//!
//! Per parameter: a caller override always wins. Otherwise the highest
//! ranked scope wins (playbook > domain > system), with ties going to the
//! first seen. Playbook-scoped targets only count when they belong to the
//! currently active playbook, which is the highest-priority one loaded.

use promptloom_core::{BehaviorTarget, Playbook, TargetScope, TransformError};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use super::{field, level, parse_input, to_output};
use crate::context::AssembledContext;
use crate::section::SectionDefinition;

const DEFAULT_GROUP: &str = "general";

#[derive(Debug, Clone, Serialize)]
pub struct MergedTarget {
    pub parameter_id: String,
    pub parameter_name: String,
    pub target_value: f64,
    pub level: String,
    pub scope: TargetScope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub group: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergedTargets {
    pub targets: Vec<MergedTarget>,
    pub by_group: BTreeMap<String, Vec<MergedTarget>>,
    pub merged_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_playbook: Option<String>,
}

/// The active playbook: lowest priority number, first seen on ties.
pub fn active_playbook(playbooks: &[Playbook]) -> Option<&Playbook> {
    playbooks.iter().reduce(|best, p| {
        if p.priority < best.priority { p } else { best }
    })
}

/// Pick one target per parameter, in first-seen parameter order.
pub fn merge_targets<'a>(
    targets: &'a [BehaviorTarget],
    overrides: &'a [BehaviorTarget],
    active_playbook: Option<&str>,
) -> Vec<&'a BehaviorTarget> {
    let mut order: Vec<&str> = Vec::new();
    for t in targets.iter().chain(overrides) {
        if !order.contains(&t.parameter_id.as_str()) {
            order.push(&t.parameter_id);
        }
    }

    order
        .into_iter()
        .filter_map(|parameter| {
            let caller_override = overrides
                .iter()
                .chain(targets.iter().filter(|t| t.scope == TargetScope::Caller))
                .find(|t| t.parameter_id == parameter);
            if caller_override.is_some() {
                return caller_override;
            }

            targets
                .iter()
                .filter(|t| t.parameter_id == parameter)
                .filter(|t| match t.scope {
                    TargetScope::Playbook => {
                        active_playbook.is_some() && t.playbook_id.as_deref() == active_playbook
                    }
                    TargetScope::Caller => false,
                    _ => true,
                })
                .fold(None, |best: Option<&BehaviorTarget>, t| match best {
                    Some(b) if b.scope.rank() >= t.scope.rank() => Some(b),
                    _ => Some(t),
                })
        })
        .collect()
}

pub fn merge(
    input: Value,
    ctx: &AssembledContext,
    _section: &SectionDefinition,
) -> Result<Value, TransformError> {
    // Either {behavior_targets, caller_targets} or a bare target list
    let (targets, overrides): (Vec<BehaviorTarget>, Vec<BehaviorTarget>) = if input.is_array() {
        (parse_input("merge_targets", input)?, vec![])
    } else {
        let targets = match field(&input, "behavior_targets") {
            Value::Null => vec![],
            v => parse_input("merge_targets", v)?,
        };
        let overrides = match field(&input, "caller_targets") {
            Value::Null => vec![],
            v => parse_input("merge_targets", v)?,
        };
        (targets, overrides)
    };

    let active = active_playbook(&ctx.dataset.playbooks).map(|p| p.id.clone());
    let merged: Vec<MergedTarget> = merge_targets(&targets, &overrides, active.as_deref())
        .into_iter()
        .map(|t| MergedTarget {
            parameter_id: t.parameter_id.clone(),
            parameter_name: t
                .parameter_name
                .clone()
                .unwrap_or_else(|| t.parameter_id.clone()),
            target_value: t.target_value,
            level: level(t.target_value, ctx).to_string(),
            scope: t.scope,
            confidence: t.confidence,
            group: t
                .domain_group
                .clone()
                .unwrap_or_else(|| DEFAULT_GROUP.to_string()),
        })
        .collect();

    let mut by_group: BTreeMap<String, Vec<MergedTarget>> = BTreeMap::new();
    for target in &merged {
        by_group
            .entry(target.group.clone())
            .or_default()
            .push(target.clone());
    }

    to_output(
        "merge_targets",
        &MergedTargets {
            merged_count: merged.len(),
            targets: merged,
            by_group,
            active_playbook: active,
        },
    )
}
