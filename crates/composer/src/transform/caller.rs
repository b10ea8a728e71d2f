//! Transforms over the caller's own records.

use promptloom_core::{
    CallerProfile, Goal, GoalStatus, LearnerProfile, OnboardingState, PendingAction,
    PersonalityProfile, TransformError,
};
use serde_json::{Map, Value, json};

use super::{field, level, parse_input};
use crate::context::AssembledContext;
use crate::section::SectionDefinition;

/// Identity and history facts about the caller.
///
/// Input: `{profile, session_count}` or a bare profile.
pub fn caller_info(
    input: Value,
    ctx: &AssembledContext,
    _section: &SectionDefinition,
) -> Result<Value, TransformError> {
    let profile_value = if input.get("profile").is_some() {
        field(&input, "profile")
    } else {
        input.clone()
    };
    let profile: Option<CallerProfile> = parse_input("caller_info", profile_value)?;
    let profile = profile
        .ok_or_else(|| TransformError::invalid_input("caller_info", "no caller profile"))?;

    let session_count = input
        .get("session_count")
        .and_then(|v| v.as_u64())
        .unwrap_or(ctx.dataset.session_count as u64);
    let last_session = ctx
        .dataset
        .recent_sessions
        .iter()
        .max_by_key(|s| s.started_at);

    Ok(json!({
        "id": profile.id,
        "name": profile.name,
        "domain": profile.domain_id,
        "domain_name": profile.domain_name,
        "timezone": profile.timezone,
        "session_count": session_count,
        "is_first_call": ctx.state.is_first_call,
        "is_first_call_in_domain": ctx.state.is_first_call_in_domain,
        "days_since_last_call": ctx.state.days_since_last_call,
        "last_session_summary": last_session.and_then(|s| s.summary.clone()),
    }))
}

/// Trait values classified against the high/low thresholds.
pub fn map_personality(
    input: Value,
    ctx: &AssembledContext,
    _section: &SectionDefinition,
) -> Result<Value, TransformError> {
    let profile: Option<PersonalityProfile> = parse_input("map_personality", input)?;
    let profile = profile.unwrap_or_default();

    let mut traits = Map::new();
    let mut high = Vec::new();
    let mut low = Vec::new();
    for (name, value) in &profile.traits {
        let lvl = level(*value, ctx);
        match lvl {
            "high" => high.push(name.clone()),
            "low" => low.push(name.clone()),
            _ => {}
        }
        traits.insert(name.clone(), json!({ "value": value, "level": lvl }));
    }

    let mut summary: Vec<String> = high.iter().map(|t| format!("High {t}")).collect();
    summary.extend(low.iter().map(|t| format!("Low {t}")));

    Ok(json!({
        "traits": traits,
        "high": high,
        "low": low,
        "summary": summary,
    }))
}

pub fn map_learner_profile(
    input: Value,
    _ctx: &AssembledContext,
    _section: &SectionDefinition,
) -> Result<Value, TransformError> {
    let profile: Option<LearnerProfile> = parse_input("map_learner_profile", input)?;
    let profile = profile.unwrap_or_default();

    let mut guidance = Vec::new();
    if let Some(style) = &profile.learning_style {
        guidance.push(format!("Adapt explanations to a {style} learning style"));
    }
    if let Some(pace) = &profile.pace {
        guidance.push(format!("Keep a {pace} pace"));
    }
    if let Some(style) = &profile.interaction_style {
        guidance.push(format!("Favour a {style} interaction style"));
    }
    if let Some(modality) = &profile.preferred_modality {
        guidance.push(format!("Prefer {modality} material"));
    }

    Ok(json!({
        "learning_style": profile.learning_style,
        "pace": profile.pace,
        "interaction_style": profile.interaction_style,
        "preferred_modality": profile.preferred_modality,
        "preferences": profile.preferences,
        "guidance": guidance,
    }))
}

/// Active goals, most important first, capped by `limit` (default 5).
pub fn filter_goals(
    input: Value,
    _ctx: &AssembledContext,
    section: &SectionDefinition,
) -> Result<Value, TransformError> {
    let goals: Vec<Goal> = parse_input("filter_goals", input)?;
    let limit = section.setting::<usize>("limit").unwrap_or(5);

    let mut active: Vec<Goal> = goals
        .into_iter()
        .filter(|g| g.status == GoalStatus::Active)
        .collect();
    active.sort_by(|a, b| b.priority.cmp(&a.priority));
    let count = active.len();

    let goals: Vec<Value> = active
        .iter()
        .take(limit)
        .map(|g| {
            json!({
                "id": g.id,
                "name": g.name,
                "description": g.description,
                "progress": g.progress,
            })
        })
        .collect();
    Ok(json!({ "goals": goals, "count": count }))
}

/// Phase names from the onboarding specification's `phases` list.
fn phases(state: &OnboardingState) -> Vec<String> {
    state
        .spec
        .as_ref()
        .and_then(|s| s.config.get("phases"))
        .and_then(|p| p.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|p| match p {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(o) => o
                        .get("id")
                        .or_else(|| o.get("name"))
                        .and_then(|v| v.as_str())
                        .map(String::from),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

pub fn onboarding_status(
    input: Value,
    _ctx: &AssembledContext,
    _section: &SectionDefinition,
) -> Result<Value, TransformError> {
    let state: OnboardingState = parse_input("onboarding_status", input)?;
    let spec = state
        .spec
        .as_ref()
        .ok_or_else(|| TransformError::invalid_input("onboarding_status", "no onboarding specification"))?;
    let progress = state.progress.clone().unwrap_or_default();
    let phases = phases(&state);

    let next_phase = progress.current_phase.clone().or_else(|| {
        phases
            .iter()
            .find(|p| !progress.completed_phases.contains(p))
            .cloned()
    });

    Ok(json!({
        "spec": spec.name,
        "slug": spec.slug,
        "phases": phases,
        "completed_phases": progress.completed_phases,
        "current_phase": progress.current_phase,
        "next_phase": if progress.is_complete { None } else { next_phase },
        "is_complete": progress.is_complete,
    }))
}

/// Open actions by due date (undated last), capped by `limit` (default 5).
pub fn pending_actions(
    input: Value,
    ctx: &AssembledContext,
    section: &SectionDefinition,
) -> Result<Value, TransformError> {
    let mut actions: Vec<PendingAction> = parse_input("pending_actions", input)?;
    let limit = section.setting::<usize>("limit").unwrap_or(5);
    let now = ctx.run.now;

    actions.sort_by_key(|a| (a.due_at.is_none(), a.due_at));
    let overdue = actions
        .iter()
        .filter(|a| a.due_at.is_some_and(|due| due < now))
        .count();

    let listed: Vec<Value> = actions
        .iter()
        .take(limit)
        .map(|a| {
            json!({
                "id": a.id,
                "kind": a.kind,
                "description": a.description,
                "due_at": a.due_at,
                "overdue": a.due_at.is_some_and(|due| due < now),
            })
        })
        .collect();

    Ok(json!({
        "actions": listed,
        "count": actions.len(),
        "overdue_count": overdue,
    }))
}
