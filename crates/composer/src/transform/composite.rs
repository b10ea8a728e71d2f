//! Cross-section transforms. Both read the document assembled so far,
//! keyed by section id, so their sections must depend on the sections
//! they summarise.

use promptloom_core::TransformError;
use serde_json::{Value, json};

use super::field;
use crate::context::AssembledContext;
use crate::section::SectionDefinition;

fn text<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(|v| v.as_str())
}

fn strings(value: &Value, pointer: &str) -> Vec<String> {
    value
        .pointer(pointer)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

/// `key: value` lines for the highest-scoring memories.
fn key_facts(assembled: &Value, limit: usize) -> Vec<String> {
    assembled
        .pointer("/memories/all")
        .and_then(|v| v.as_array())
        .map(|facts| {
            facts
                .iter()
                .take(limit)
                .filter_map(|f| Some(format!("{}: {}", f["key"].as_str()?, f["value"].as_str()?)))
                .collect()
        })
        .unwrap_or_default()
}

/// Orientation for the first seconds of a session.
pub fn quick_start(
    input: Value,
    ctx: &AssembledContext,
    section: &SectionDefinition,
) -> Result<Value, TransformError> {
    if !input.is_object() {
        return Err(TransformError::invalid_input(
            "quick_start",
            "expected the assembled document",
        ));
    }
    let max_facts = section.setting::<usize>("max_facts").unwrap_or(3);
    let max_targets = section.setting::<usize>("max_targets").unwrap_or(3);

    let targets: Vec<String> = input
        .pointer("/behavior_targets/targets")
        .and_then(|v| v.as_array())
        .map(|targets| {
            targets
                .iter()
                .take(max_targets)
                .filter_map(|t| {
                    Some(format!(
                        "{}: {}",
                        t["parameter_name"].as_str()?,
                        t["level"].as_str()?
                    ))
                })
                .collect()
        })
        .unwrap_or_default();

    let session_type = text(&input, "/session_plan/session_type")
        .map(String::from)
        .unwrap_or_else(|| {
            let kind = if ctx.state.is_first_call { "first_call" } else { "returning" };
            kind.to_string()
        });

    Ok(json!({
        "caller": text(&input, "/caller_info/name"),
        "agent": text(&input, "/identity/name"),
        "session_type": session_type,
        "focus": text(&input, "/session_plan/review/module/name"),
        "next_module": text(&input, "/session_plan/new_material/name"),
        "key_facts": key_facts(&input, max_facts),
        "targets": targets,
    }))
}

/// Flat instruction list drawn from whichever sections produced output.
pub fn compose_instructions(
    input: Value,
    _ctx: &AssembledContext,
    section: &SectionDefinition,
) -> Result<Value, TransformError> {
    if !input.is_object() {
        return Err(TransformError::invalid_input(
            "compose_instructions",
            "expected the assembled document",
        ));
    }
    let max_memories = section.setting::<usize>("max_memories").unwrap_or(3);

    let mut instructions: Vec<String> = Vec::new();
    let mut used: Vec<&str> = Vec::new();
    let mut add = |id: &'static str, lines: Vec<String>| {
        if !lines.is_empty() {
            instructions.extend(lines);
            used.push(id);
        }
    };

    let identity = field(&input, "identity");
    let mut who = Vec::new();
    if let Some(name) = text(&identity, "/name") {
        who.push(format!("You are {name}."));
    }
    if let Some(description) = text(&identity, "/description") {
        who.push(description.to_string());
    }
    add("identity", who);

    let steps = strings(&input, "/session_plan/steps");
    add(
        "session_plan",
        if steps.is_empty() {
            vec![]
        } else {
            vec![format!("Session plan: {}.", steps.join("; "))]
        },
    );

    add("voice_rules", strings(&input, "/voice_rules/rules"));
    add(
        "personality",
        strings(&input, "/personality/summary")
            .into_iter()
            .map(|trait_line| format!("Caller trait: {trait_line}"))
            .collect(),
    );
    add("learner_profile", strings(&input, "/learner_profile/guidance"));
    add(
        "memories",
        key_facts(&input, max_memories)
            .into_iter()
            .map(|fact| format!("Remember: {fact}"))
            .collect(),
    );

    let goals: Vec<String> = input
        .pointer("/goals/goals")
        .and_then(|v| v.as_array())
        .map(|goals| {
            goals
                .iter()
                .filter_map(|g| g["name"].as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();
    add(
        "goals",
        if goals.is_empty() {
            vec![]
        } else {
            vec![format!("Work towards: {}.", goals.join(", "))]
        },
    );

    add("critical_rules", strings(&input, "/critical_rules/rules"));

    Ok(json!({ "instructions": instructions, "sections_used": used }))
}
