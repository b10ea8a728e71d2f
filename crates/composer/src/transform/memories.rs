//! Memory sub-pipeline: deduplicate → score relevance → group.
//!
//! Each stage is a standalone transform so a section can chain any prefix
//! of the three.

use promptloom_core::{GoalStatus, MemoryCategory, MemoryFact, TransformError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};

use super::{parse_input, to_output};
use crate::context::AssembledContext;
use crate::section::SectionDefinition;

/// A fact with its relevance and combined score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredMemory {
    #[serde(flatten)]
    pub fact: MemoryFact,

    #[serde(default)]
    pub relevance: f64,

    #[serde(default)]
    pub score: f64,
}

// ── Stage 1: dedupe ───────────────────────────────────────────────────────

/// One fact per (category, normalized key). Strictly higher confidence
/// replaces; ties keep the first seen. Output keeps first-seen key order.
pub fn dedupe_facts(facts: Vec<MemoryFact>) -> Vec<MemoryFact> {
    let mut kept: Vec<MemoryFact> = Vec::with_capacity(facts.len());
    let mut index: HashMap<(MemoryCategory, String), usize> = HashMap::new();

    for fact in facts {
        let key = (fact.category, fact.normalized_key());
        match index.get(&key) {
            Some(&i) => {
                if fact.confidence > kept[i].confidence {
                    kept[i] = fact;
                }
            }
            None => {
                index.insert(key, kept.len());
                kept.push(fact);
            }
        }
    }
    kept
}

pub fn dedupe(
    input: Value,
    _ctx: &AssembledContext,
    _section: &SectionDefinition,
) -> Result<Value, TransformError> {
    let facts: Vec<MemoryFact> = parse_input("dedupe_memories", input)?;
    to_output("dedupe_memories", &dedupe_facts(facts))
}

// ── Stage 2: relevance ────────────────────────────────────────────────────

fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .filter(|t| t.chars().count() > 2)
        .map(String::from)
        .collect()
}

/// Tokens describing what this session is about: the review module, the
/// next module, the upcoming window, and active goals.
pub fn session_context_tokens(ctx: &AssembledContext) -> HashSet<String> {
    let state = &ctx.state;
    let module_names = state
        .module_to_review
        .iter()
        .chain(state.next_module.iter())
        .chain(state.upcoming_modules.iter())
        .map(|m| m.name.as_str());
    let goal_names = ctx
        .dataset
        .goals
        .iter()
        .filter(|g| g.status == GoalStatus::Active)
        .map(|g| g.name.as_str());

    module_names.chain(goal_names).flat_map(tokens).collect()
}

/// Relevance in `[0, 1]`: matched tokens over `min(fact tokens, 3)`, plus
/// the category boost, capped at 1. With no context, the boost alone.
pub fn relevance(fact: &MemoryFact, context: &HashSet<String>, boost: f64) -> f64 {
    if context.is_empty() {
        return boost.min(1.0);
    }
    let fact_tokens = tokens(&fact.text());
    if fact_tokens.is_empty() {
        return boost.min(1.0);
    }
    let matched = fact_tokens.iter().filter(|t| context.contains(*t)).count();
    let denominator = fact_tokens.len().min(3) as f64;
    let base = (matched as f64 / denominator).min(1.0);
    (base + boost).min(1.0)
}

pub fn score_facts(
    facts: Vec<MemoryFact>,
    context: &HashSet<String>,
    alpha: f64,
    boosts: &BTreeMap<String, f64>,
) -> Vec<ScoredMemory> {
    let mut scored: Vec<ScoredMemory> = facts
        .into_iter()
        .map(|fact| {
            let boost = boosts.get(fact.category.as_str()).copied().unwrap_or(0.0);
            let relevance = relevance(&fact, context, boost);
            let score = alpha * fact.confidence + (1.0 - alpha) * relevance;
            ScoredMemory {
                fact,
                relevance,
                score,
            }
        })
        .collect();
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored
}

pub fn score_relevance(
    input: Value,
    ctx: &AssembledContext,
    section: &SectionDefinition,
) -> Result<Value, TransformError> {
    let facts: Vec<MemoryFact> = parse_input("score_memory_relevance", input)?;
    let alpha = section
        .setting::<f64>("alpha")
        .unwrap_or(ctx.config.memory.alpha);
    if !(0.0..=1.0).contains(&alpha) {
        return Err(TransformError::invalid_input(
            "score_memory_relevance",
            format!("alpha {alpha} is outside [0, 1]"),
        ));
    }
    let boosts = section
        .setting::<BTreeMap<String, f64>>("category_boosts")
        .unwrap_or_else(|| ctx.config.memory.category_boosts.clone());

    let context = session_context_tokens(ctx);
    to_output(
        "score_memory_relevance",
        &score_facts(facts, &context, alpha, &boosts),
    )
}

// ── Stage 3: group ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct GroupedMemories {
    pub by_category: BTreeMap<String, Vec<ScoredMemory>>,
    pub top: Vec<ScoredMemory>,
    pub all: Vec<ScoredMemory>,
    pub total: usize,
}

pub fn group_facts(
    facts: Vec<ScoredMemory>,
    max_per_category: usize,
    max_total: usize,
) -> GroupedMemories {
    let mut by_category: BTreeMap<String, Vec<ScoredMemory>> = BTreeMap::new();
    for fact in &facts {
        let bucket = by_category
            .entry(fact.fact.category.as_str().to_string())
            .or_default();
        if bucket.len() < max_per_category {
            bucket.push(fact.clone());
        }
    }
    GroupedMemories {
        by_category,
        top: facts.iter().take(max_total).cloned().collect(),
        total: facts.len(),
        all: facts,
    }
}

pub fn group(
    input: Value,
    ctx: &AssembledContext,
    section: &SectionDefinition,
) -> Result<Value, TransformError> {
    let facts: Vec<ScoredMemory> = parse_input("group_memories", input)?;
    let max_per_category = section
        .setting("max_per_category")
        .unwrap_or(ctx.config.memory.max_per_category);
    let max_total = section
        .setting("max_total")
        .unwrap_or(ctx.config.memory.max_total);
    to_output(
        "group_memories",
        &group_facts(facts, max_per_category, max_total),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::test_support::context_with;
    use crate::loader::LoadedDataset;
    use crate::resolver::ResolvedSpecs;
    use promptloom_core::{Curriculum, CurriculumModule, Goal};
    use serde_json::json;

    fn fact(category: MemoryCategory, key: &str, value: &str, confidence: f64) -> MemoryFact {
        MemoryFact {
            id: format!("{key}-{confidence}"),
            category,
            key: key.into(),
            value: value.into(),
            confidence,
            source_session: None,
            created_at: None,
        }
    }

    #[test]
    fn dedupe_keeps_higher_confidence() {
        let facts = vec![
            fact(MemoryCategory::Fact, "Location", "Leeds", 0.6),
            fact(MemoryCategory::Fact, "location", "York", 0.9),
        ];
        let kept = dedupe_facts(facts);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].value, "York");
        assert_eq!(kept[0].confidence, 0.9);
    }

    #[test]
    fn dedupe_ties_keep_first_seen() {
        let facts = vec![
            fact(MemoryCategory::Fact, "Home Town", "Leeds", 0.7),
            fact(MemoryCategory::Fact, "home   town", "York", 0.7),
            fact(MemoryCategory::Preference, "home town", "Hull", 0.1),
        ];
        let kept = dedupe_facts(facts);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].value, "Leeds");
        assert_eq!(kept[1].category, MemoryCategory::Preference);
    }

    #[test]
    fn relevance_without_context_is_boost_only() {
        let f = fact(MemoryCategory::Topic, "likes", "fractions", 0.5);
        assert_eq!(relevance(&f, &HashSet::new(), 0.0), 0.0);
        assert_eq!(relevance(&f, &HashSet::new(), 0.3), 0.3);
    }

    #[test]
    fn relevance_counts_matched_tokens() {
        let context: HashSet<String> = ["fractions", "decimals"].iter().map(|s| s.to_string()).collect();
        let f = fact(MemoryCategory::Topic, "struggles with", "fractions", 0.5);
        // tokens: struggles, with, fractions -> 1 of min(3, 3)
        assert!((relevance(&f, &context, 0.0) - 1.0 / 3.0).abs() < 1e-9);
        assert!((relevance(&f, &context, 0.9) - 1.0).abs() < 1e-9);

        let short = fact(MemoryCategory::Topic, "fractions", "decimals", 0.5);
        assert_eq!(relevance(&short, &context, 0.0), 1.0);
    }

    #[test]
    fn alpha_one_orders_by_confidence() {
        let context: HashSet<String> = ["fractions"].iter().map(|s| s.to_string()).collect();
        let facts = vec![
            fact(MemoryCategory::Topic, "enjoys", "fractions", 0.2),
            fact(MemoryCategory::Fact, "pet", "dog", 0.8),
        ];
        let scored = score_facts(facts.clone(), &context, 1.0, &BTreeMap::new());
        assert_eq!(scored[0].fact.key, "pet");

        let scored = score_facts(facts, &context, 0.0, &BTreeMap::new());
        assert_eq!(scored[0].fact.key, "enjoys");
        assert_eq!(scored[1].score, 0.0);
    }

    #[test]
    fn grouping_caps_buckets_and_total() {
        let facts: Vec<ScoredMemory> = (0..6)
            .map(|i| ScoredMemory {
                fact: fact(
                    if i % 2 == 0 { MemoryCategory::Fact } else { MemoryCategory::Event },
                    &format!("k{i}"),
                    "v",
                    1.0 - i as f64 / 10.0,
                ),
                relevance: 0.0,
                score: 1.0 - i as f64 / 10.0,
            })
            .collect();
        let grouped = group_facts(facts, 2, 4);
        assert_eq!(grouped.by_category["FACT"].len(), 2);
        assert_eq!(grouped.by_category["EVENT"].len(), 2);
        assert_eq!(grouped.top.len(), 4);
        assert_eq!(grouped.all.len(), 6);
        assert_eq!(grouped.total, 6);
    }

    #[test]
    fn chain_through_transforms_uses_session_context() {
        let mut dataset = LoadedDataset::default();
        dataset.subject_sources.curriculum = Some(Curriculum {
            id: "c".into(),
            name: "Maths".into(),
            modules: vec![CurriculumModule {
                id: "m1".into(),
                name: "Fractions basics".into(),
                description: None,
                sequence: None,
                learning_outcomes: vec![],
            }],
        });
        dataset.goals = vec![Goal {
            id: "g".into(),
            name: "Pass algebra exam".into(),
            description: None,
            status: GoalStatus::Active,
            progress: 0.0,
            priority: 1,
        }];
        let ctx = context_with(dataset, ResolvedSpecs::default());
        let section = SectionDefinition::new("memories", "Memories").config(json!({"alpha": 0.0}));

        let raw = json!([
            {"category": "FACT", "key": "pet", "value": "dog", "confidence": 0.9},
            {"category": "TOPIC", "key": "finds", "value": "algebra hard", "confidence": 0.3},
            {"category": "TOPIC", "key": "Finds", "value": "algebra easy", "confidence": 0.2}
        ]);
        let deduped = dedupe(raw, &ctx, &section).unwrap();
        assert_eq!(deduped.as_array().unwrap().len(), 2);

        let scored = score_relevance(deduped, &ctx, &section).unwrap();
        assert_eq!(scored[0]["key"], "finds");
        assert!(scored[0]["relevance"].as_f64().unwrap() > 0.0);

        let grouped = group(scored, &ctx, &section).unwrap();
        assert_eq!(grouped["total"], 2);
        assert_eq!(grouped["by_category"]["TOPIC"][0]["value"], "algebra hard");
    }

    #[test]
    fn bad_input_is_reported() {
        let ctx = crate::transform::test_support::empty_context();
        let section = SectionDefinition::new("memories", "Memories");
        let err = dedupe(json!({"not": "a list"}), &ctx, &section).unwrap_err();
        assert!(matches!(err, TransformError::InvalidInput { .. }));
    }
}
