//! Transforms over the resolved specifications.

use promptloom_core::{Specification, TransformError};
use serde_json::{Map, Value, json};

use super::level;
use crate::context::AssembledContext;
use crate::section::SectionDefinition;

/// Config keys that are structure rather than settings.
const STRUCTURAL_KEYS: &[&str] = &["parameters", "constraints", "curriculum", "modules", "rules"];

fn settings(spec: &Specification) -> Map<String, Value> {
    match &spec.config {
        Value::Object(map) => map
            .iter()
            .filter(|(k, _)| !STRUCTURAL_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        _ => Map::new(),
    }
}

fn summary(spec: &Specification) -> Map<String, Value> {
    let mut out = Map::new();
    out.insert("name".into(), json!(spec.name));
    out.insert("slug".into(), json!(spec.slug));
    if let Some(description) = &spec.description {
        out.insert("description".into(), json!(description));
    }
    out.insert("parameters".into(), Value::Array(spec.parameters().to_vec()));
    out.insert("settings".into(), Value::Object(settings(spec)));
    out
}

fn missing(transform: &str, role: &str) -> TransformError {
    TransformError::invalid_input(transform, format!("no {role} specification resolved"))
}

/// Text of a rule or constraint written as a string or `{text|rule|description}`.
fn rule_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => ["text", "rule", "description"]
            .iter()
            .find_map(|k| map.get(*k).and_then(|v| v.as_str()))
            .map(String::from),
        _ => None,
    }
}

fn list(spec: &Specification, key: &str) -> Vec<String> {
    spec.config
        .get(key)
        .and_then(|v| v.as_array())
        .map(|items| items.iter().filter_map(rule_text).collect())
        .unwrap_or_default()
}

pub fn extract_identity(
    _input: Value,
    ctx: &AssembledContext,
    _section: &SectionDefinition,
) -> Result<Value, TransformError> {
    let spec = ctx
        .specs
        .identity
        .as_ref()
        .ok_or_else(|| missing("extract_identity", "identity"))?;
    let mut out = summary(spec);
    if let Some(base) = &ctx.specs.identity_base {
        out.insert("archetype".into(), json!(base));
    }
    Ok(Value::Object(out))
}

pub fn extract_content(
    _input: Value,
    ctx: &AssembledContext,
    _section: &SectionDefinition,
) -> Result<Value, TransformError> {
    let spec = ctx
        .specs
        .content
        .as_ref()
        .ok_or_else(|| missing("extract_content", "content"))?;
    let mut out = summary(spec);
    out.insert("module_count".into(), json!(ctx.state.modules.len()));
    out.insert("module_source".into(), json!(ctx.state.module_source));
    Ok(Value::Object(out))
}

pub fn extract_voice(
    _input: Value,
    ctx: &AssembledContext,
    _section: &SectionDefinition,
) -> Result<Value, TransformError> {
    let spec = ctx
        .specs
        .voice
        .as_ref()
        .ok_or_else(|| missing("extract_voice", "voice"))?;
    Ok(Value::Object(summary(spec)))
}

/// Delivery rules: the voice specification's own rules, then one rule per
/// voice-group behavior target, then the learner's pace.
pub fn voice_rules(
    input: Value,
    ctx: &AssembledContext,
    _section: &SectionDefinition,
) -> Result<Value, TransformError> {
    let mut rules: Vec<String> = Vec::new();
    let voice = ctx.specs.voice.as_ref();
    if let Some(spec) = voice {
        rules.extend(list(spec, "rules"));
    }

    if let Some(targets) = input
        .pointer("/behavior_targets/by_group/voice")
        .and_then(|v| v.as_array())
    {
        for target in targets {
            let name = target["parameter_name"].as_str().unwrap_or_default();
            if let Some(value) = target["target_value"].as_f64() {
                rules.push(format!("Keep {} {}", name.to_lowercase(), level(value, ctx)));
            }
        }
    }

    if let Some(pace) = ctx
        .dataset
        .learner_profile
        .as_ref()
        .and_then(|p| p.pace.as_deref())
    {
        rules.push(format!("Match the caller's {pace} pace"));
    }

    Ok(json!({
        "voice": voice.map(|s| s.name.clone()),
        "rules": rules,
        "settings": voice.map(settings).unwrap_or_default(),
    }))
}

/// Constraints from every resolved specification, identity first.
/// Identical rule text is listed once.
pub fn critical_rules(
    _input: Value,
    ctx: &AssembledContext,
    _section: &SectionDefinition,
) -> Result<Value, TransformError> {
    let mut rules: Vec<String> = Vec::new();
    let specs = [&ctx.specs.identity, &ctx.specs.content, &ctx.specs.voice];
    for spec in specs.into_iter().flatten() {
        for rule in list(spec, "constraints") {
            if !rules.contains(&rule) {
                rules.push(rule);
            }
        }
    }
    Ok(json!({ "count": rules.len(), "rules": rules }))
}
