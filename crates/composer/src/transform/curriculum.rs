//! Curriculum progress, session planning and teaching material.

use promptloom_core::{
    Assertion, CurriculumModule, SubjectSources, TeachingQuestion, TransformError,
    VocabularyEntry,
};
use serde_json::{Value, json};

use super::{field, parse_input};
use crate::context::AssembledContext;
use crate::section::SectionDefinition;
use crate::shared_state::{ReviewType, SharedState};

fn module_ref(module: &CurriculumModule) -> Value {
    json!({ "id": module.id, "name": module.name })
}

fn session_type(state: &SharedState) -> &'static str {
    if state.is_first_call {
        "first_call"
    } else if state.is_first_call_in_domain {
        "first_call_in_domain"
    } else {
        "returning"
    }
}

/// Modules counted as done. Mastery records win; without any, the
/// session-count estimate stands in for returning callers.
fn completed_count(state: &SharedState) -> usize {
    if !state.completed_modules.is_empty() {
        state
            .modules
            .iter()
            .filter(|m| state.is_completed(&m.id))
            .count()
    } else if state.is_first_call {
        0
    } else {
        state.estimated_progress.min(state.modules.len())
    }
}

/// Per-module status and overall progress.
pub fn compute_curriculum(
    _input: Value,
    ctx: &AssembledContext,
    _section: &SectionDefinition,
) -> Result<Value, TransformError> {
    let state = &ctx.state;
    if state.modules.is_empty() {
        return Err(TransformError::invalid_input(
            "compute_curriculum",
            "no curriculum modules available",
        ));
    }

    let next = state.next_module.as_ref().map(|m| m.id.as_str());
    let review = state.module_to_review.as_ref().map(|m| m.id.as_str());
    let estimated = state.completed_modules.is_empty() && !state.is_first_call;

    let modules: Vec<Value> = state
        .modules
        .iter()
        .enumerate()
        .map(|(index, module)| {
            let status = if Some(module.id.as_str()) == next {
                "next"
            } else if Some(module.id.as_str()) == review {
                "review"
            } else if state.is_completed(&module.id)
                || (estimated && index < state.estimated_progress)
            {
                "completed"
            } else {
                "upcoming"
            };
            json!({
                "id": module.id,
                "name": module.name,
                "status": status,
                "learning_outcomes": module.learning_outcomes,
            })
        })
        .collect();

    let total = state.modules.len();
    let completed = completed_count(state);
    let name = ctx
        .dataset
        .subject_sources
        .curriculum
        .as_ref()
        .map(|c| c.name.clone())
        .or_else(|| ctx.specs.content.as_ref().map(|s| s.name.clone()));

    Ok(json!({
        "name": name,
        "module_source": state.module_source,
        "modules": modules,
        "total": total,
        "completed": completed,
        "progress": completed as f64 / total as f64,
        "progress_estimated": estimated,
        "next_module": state.next_module.as_ref().map(module_ref),
        "module_to_review": state.module_to_review.as_ref().map(module_ref),
        "upcoming": state.upcoming_modules.iter().map(module_ref).collect::<Vec<_>>(),
    }))
}

/// What this session should cover, in order.
pub fn plan_session(
    _input: Value,
    ctx: &AssembledContext,
    _section: &SectionDefinition,
) -> Result<Value, TransformError> {
    let state = &ctx.state;
    let kind = session_type(state);

    let review = match (&state.review, &state.module_to_review) {
        (Some(schedule), Some(module)) if !state.is_first_call => Some(json!({
            "module": module_ref(module),
            "type": schedule.kind,
            "reason": schedule.reason,
        })),
        _ => None,
    };

    let mut steps = Vec::new();
    match kind {
        "first_call" => steps.push("Welcome the caller and set expectations for the sessions".to_string()),
        "first_call_in_domain" => {
            let domain = ctx
                .dataset
                .profile
                .as_ref()
                .and_then(|p| p.domain_name.clone().or_else(|| p.domain_id.clone()))
                .unwrap_or_else(|| "the new subject".to_string());
            steps.push(format!("Orient the caller to {domain}"));
        }
        _ => steps.push("Reconnect with the caller and recap the last session".to_string()),
    }
    if let (Some(schedule), Some(module)) = (&state.review, &state.module_to_review)
        && !state.is_first_call
    {
        steps.push(format!(
            "Review {} ({})",
            module.name,
            schedule.kind.as_str().replace('_', " ")
        ));
    }
    match &state.next_module {
        Some(module) => steps.push(format!("Introduce {}", module.name)),
        None if !state.modules.is_empty() => {
            steps.push("Consolidate the completed material".to_string())
        }
        None => {}
    }
    steps.push("Check understanding before closing".to_string());

    Ok(json!({
        "session_type": kind,
        "review": review,
        "new_material": state.next_module.as_ref().map(|m| json!({
            "id": m.id,
            "name": m.name,
            "learning_outcomes": m.learning_outcomes,
        })),
        "days_since_last_call": state.days_since_last_call,
        "steps": steps,
    }))
}

fn review_activity(kind: ReviewType, module: &str) -> String {
    match kind {
        ReviewType::QuickRecall => format!("Ask two or three quick recall questions on {module}"),
        ReviewType::Application => format!("Have the caller apply {module} to a practical problem"),
        ReviewType::DeepReview => format!("Walk back through {module} in depth"),
        ReviewType::Reintroduce => format!("Reintroduce {module} from the start"),
    }
}

/// Suggested activities, capped by `limit` (default 4).
pub fn recommend_activities(
    input: Value,
    ctx: &AssembledContext,
    section: &SectionDefinition,
) -> Result<Value, TransformError> {
    let questions: Vec<TeachingQuestion> = match input {
        Value::Null => vec![],
        v => parse_input("recommend_activities", v)?,
    };
    let limit = section.setting::<usize>("limit").unwrap_or(4);
    let state = &ctx.state;

    let mut activities: Vec<Value> = Vec::new();
    if let (Some(schedule), Some(module)) = (&state.review, &state.module_to_review)
        && !state.is_first_call
    {
        activities.push(json!({
            "kind": "review",
            "module": module.id,
            "description": review_activity(schedule.kind, &module.name),
        }));
    }
    if let Some(module) = &state.next_module {
        activities.push(json!({
            "kind": "explain",
            "module": module.id,
            "description": format!("Explain {} with a worked example", module.name),
        }));
        for question in questions
            .iter()
            .filter(|q| q.module_id.as_deref() == Some(module.id.as_str()))
        {
            activities.push(json!({
                "kind": "practice",
                "module": module.id,
                "description": question.text,
            }));
        }
    }

    activities.truncate(limit);
    Ok(json!({ "activities": activities, "count": activities.len() }))
}

/// Approved assertions plus questions and vocabulary, with material for
/// the modules in focus this session listed first.
///
/// Input: `{assertions, questions, vocabulary}`.
pub fn teaching_points(
    input: Value,
    ctx: &AssembledContext,
    section: &SectionDefinition,
) -> Result<Value, TransformError> {
    let list = |name: &str| match field(&input, name) {
        Value::Null => json!([]),
        v => v,
    };
    let assertions: Vec<Assertion> = parse_input("teaching_points", list("assertions"))?;
    let questions: Vec<TeachingQuestion> = parse_input("teaching_points", list("questions"))?;
    let vocabulary: Vec<VocabularyEntry> = parse_input("teaching_points", list("vocabulary"))?;

    let focus: Vec<&str> = [&ctx.state.next_module, &ctx.state.module_to_review]
        .into_iter()
        .flatten()
        .map(|m| m.id.as_str())
        .collect();
    let in_focus = |module: Option<&str>| module.is_some_and(|m| focus.contains(&m));

    let mut approved: Vec<&Assertion> = assertions.iter().filter(|a| a.approved).collect();
    approved.sort_by_key(|a| !in_focus(a.module_id.as_deref()));
    let mut questions: Vec<&TeachingQuestion> = questions.iter().collect();
    questions.sort_by_key(|q| !in_focus(q.module_id.as_deref()));
    let mut vocabulary: Vec<&VocabularyEntry> = vocabulary.iter().collect();
    vocabulary.sort_by_key(|v| !in_focus(v.module_id.as_deref()));

    let max_assertions = section.setting::<usize>("max_assertions").unwrap_or(5);
    let max_questions = section.setting::<usize>("max_questions").unwrap_or(3);
    let max_vocabulary = section.setting::<usize>("max_vocabulary").unwrap_or(5);

    Ok(json!({
        "focus_modules": focus,
        "assertions": approved.iter().take(max_assertions).map(|a| json!({
            "text": a.text,
            "module": a.module_id,
            "category": a.category,
        })).collect::<Vec<_>>(),
        "questions": questions.iter().take(max_questions).map(|q| json!({
            "text": q.text,
            "answer": q.answer,
            "difficulty": q.difficulty,
        })).collect::<Vec<_>>(),
        "vocabulary": vocabulary.iter().take(max_vocabulary).map(|v| json!({
            "term": v.term,
            "definition": v.definition,
        })).collect::<Vec<_>>(),
    }))
}

/// Content sources ranked by trust, most authoritative first.
pub fn source_authority(
    input: Value,
    _ctx: &AssembledContext,
    _section: &SectionDefinition,
) -> Result<Value, TransformError> {
    let subject: SubjectSources = match input {
        Value::Null => SubjectSources::default(),
        v => parse_input("source_authority", v)?,
    };

    let mut sources = subject.sources;
    sources.sort_by(|a, b| b.trust_level.cmp(&a.trust_level));
    let primary = sources.first().map(|s| s.name.clone());

    let guidance = primary
        .as_ref()
        .map(|name| format!("When sources disagree, defer to {name}"));

    Ok(json!({
        "sources": sources.iter().map(|s| json!({
            "name": s.name,
            "trust_level": s.trust_level.as_str(),
            "authority": s.authority,
            "url": s.url,
        })).collect::<Vec<_>>(),
        "primary": primary,
        "curriculum": subject.curriculum.map(|c| c.name),
        "guidance": guidance,
    }))
}
