//! Shared computed state: module list, progress, and review scheduling.
//!
//! Computed once per run, after loading and resolution and before any
//! section runs. Sections only ever see it through a shared reference.

use chrono::{DateTime, Utc};
use promptloom_config::{AppConfig, ReviewConfig};
use promptloom_core::{AttributeValue, CurriculumModule, Specification};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

use crate::loader::LoadedDataset;

// ── Types ─────────────────────────────────────────────────────────────────

/// Review urgency, in ascending severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewType {
    QuickRecall,
    Application,
    DeepReview,
    Reintroduce,
}

impl ReviewType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QuickRecall => "quick_recall",
            Self::Application => "application",
            Self::DeepReview => "deep_review",
            Self::Reintroduce => "reintroduce",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewSchedule {
    pub kind: ReviewType,
    pub reason: String,
    pub days_since_last_call: i64,
}

/// Classify elapsed days against the configured thresholds, most severe first.
pub fn classify_review(days: i64, thresholds: &ReviewConfig) -> ReviewSchedule {
    let (kind, reason) = if days >= i64::from(thresholds.reintroduce_days) {
        (
            ReviewType::Reintroduce,
            format!("{days} days since the last session; reintroduce the material from the start"),
        )
    } else if days >= i64::from(thresholds.deep_review_days) {
        (
            ReviewType::DeepReview,
            format!("{days} days since the last session; review the previous module in depth"),
        )
    } else if days >= i64::from(thresholds.application_days) {
        (
            ReviewType::Application,
            format!("{days} days since the last session; consolidate through applied practice"),
        )
    } else {
        (
            ReviewType::QuickRecall,
            format!("{days} days since the last session; a quick recall is enough"),
        )
    };
    ReviewSchedule {
        kind,
        reason,
        days_since_last_call: days,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleOrder {
    BySequence,
    ById,
    #[default]
    AsGiven,
}

/// Where the module list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleSource {
    Selector,
    Specification,
    SubjectCurriculum,
    None,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleSelector {
    pub key: String,
    pub value: Value,
}

/// Curriculum metadata declared on the content specification (`config.curriculum`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CurriculumMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<ModuleSelector>,

    #[serde(default)]
    pub order: ModuleOrder,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_key_prefix: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mastery_threshold: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    pub high: f64,
    pub low: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SharedState {
    pub modules: Vec<CurriculumModule>,
    pub module_source: ModuleSource,
    pub is_first_call: bool,
    pub is_first_call_in_domain: bool,
    pub days_since_last_call: Option<i64>,
    pub completed_modules: BTreeSet<String>,
    pub estimated_progress: usize,
    pub last_completed_index: usize,
    pub module_to_review: Option<CurriculumModule>,
    pub next_module: Option<CurriculumModule>,
    /// Modules after `next_module`, within the configured window
    pub upcoming_modules: Vec<CurriculumModule>,
    pub review: Option<ReviewSchedule>,
    pub thresholds: Thresholds,
    pub curriculum: Option<CurriculumMeta>,
}

impl SharedState {
    pub fn is_completed(&self, module_id: &str) -> bool {
        self.completed_modules.contains(module_id)
    }
}

// ── Calculator ────────────────────────────────────────────────────────────

pub struct StateCalculator {
    review: ReviewConfig,
    thresholds: Thresholds,
    mastery_threshold: f64,
    mastery_key: Regex,
    upcoming_window: usize,
}

impl StateCalculator {
    pub fn new(config: &AppConfig) -> Result<Self, regex_lite::Error> {
        Ok(Self {
            review: config.review.clone(),
            thresholds: Thresholds {
                high: config.classification.high,
                low: config.classification.low,
            },
            mastery_threshold: config.curriculum.mastery_threshold,
            mastery_key: Regex::new(&config.curriculum.mastery_key_pattern)?,
            upcoming_window: config.memory.upcoming_window,
        })
    }

    pub fn compute(
        &self,
        dataset: &LoadedDataset,
        content: Option<&Specification>,
        now: DateTime<Utc>,
    ) -> SharedState {
        let curriculum = content.and_then(curriculum_meta);
        let (modules, module_source) = extract_modules(content, curriculum.as_ref(), dataset);

        let prior_sessions = dataset.session_count.max(dataset.recent_sessions.len());
        let is_first_call = prior_sessions == 0;

        let days_since_last_call = dataset
            .recent_sessions
            .iter()
            .map(|s| s.started_at)
            .max()
            .map(|last| (now - last).num_days().max(0));

        let domain = dataset.profile.as_ref().and_then(|p| p.domain_id.as_deref());
        let is_first_call_in_domain = is_first_call
            || domain.is_some_and(|domain| {
                !dataset
                    .recent_sessions
                    .iter()
                    .any(|s| s.domain_id.as_deref().is_none_or(|d| d == domain))
            });

        let threshold = curriculum
            .as_ref()
            .and_then(|c| c.mastery_threshold)
            .unwrap_or(self.mastery_threshold);
        let prefix = curriculum
            .as_ref()
            .and_then(|c| c.progress_key_prefix.as_deref());
        let completed_modules = self.completed_modules(dataset, prefix, threshold);

        let estimated_progress = if completed_modules.is_empty() {
            (prior_sessions / 2).min(modules.len().saturating_sub(1))
        } else {
            completed_modules.len()
        };

        let last_completed_index = modules
            .iter()
            .rposition(|m| completed_modules.contains(&m.id))
            .unwrap_or_else(|| estimated_progress.saturating_sub(1));

        let (module_to_review, next_module, next_index) = if is_first_call {
            (None, modules.first().cloned(), 0)
        } else {
            (
                modules.get(last_completed_index).cloned(),
                modules.get(last_completed_index + 1).cloned(),
                last_completed_index + 1,
            )
        };

        let upcoming_modules = if next_module.is_some() {
            modules
                .iter()
                .skip(next_index + 1)
                .take(self.upcoming_window)
                .cloned()
                .collect()
        } else {
            vec![]
        };

        let review = match (is_first_call, days_since_last_call) {
            (false, Some(days)) => Some(classify_review(days, &self.review)),
            _ => None,
        };

        SharedState {
            modules,
            module_source,
            is_first_call,
            is_first_call_in_domain,
            days_since_last_call,
            completed_modules,
            estimated_progress,
            last_completed_index,
            module_to_review,
            next_module,
            upcoming_modules,
            review,
            thresholds: self.thresholds,
            curriculum,
        }
    }

    fn completed_modules(
        &self,
        dataset: &LoadedDataset,
        prefix: Option<&str>,
        threshold: f64,
    ) -> BTreeSet<String> {
        dataset
            .caller_attributes
            .iter()
            .filter(|attr| match &attr.value {
                AttributeValue::Boolean(done) => *done,
                AttributeValue::Number(score) => *score >= threshold,
                _ => false,
            })
            .filter_map(|attr| {
                if let Some(prefix) = prefix
                    && let Some(rest) = attr.key.strip_prefix(prefix)
                    && !rest.is_empty()
                {
                    return Some(rest.to_string());
                }
                self.mastery_key
                    .captures(&attr.key)
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str().to_string())
            })
            .collect()
    }
}

fn curriculum_meta(spec: &Specification) -> Option<CurriculumMeta> {
    spec.config
        .get("curriculum")
        .and_then(|c| serde_json::from_value(c.clone()).ok())
}

/// First non-empty of: selector over parameters, `config.modules`, subject curriculum.
fn extract_modules(
    content: Option<&Specification>,
    meta: Option<&CurriculumMeta>,
    dataset: &LoadedDataset,
) -> (Vec<CurriculumModule>, ModuleSource) {
    if let (Some(spec), Some(meta)) = (content, meta)
        && let Some(selector) = &meta.selector
    {
        let mut modules: Vec<CurriculumModule> = spec
            .parameters()
            .iter()
            .filter(|p| p.get(&selector.key) == Some(&selector.value))
            .filter_map(module_from_parameter)
            .collect();
        match meta.order {
            ModuleOrder::BySequence => {
                modules.sort_by_key(|m| (m.sequence.is_none(), m.sequence));
            }
            ModuleOrder::ById => modules.sort_by(|a, b| a.id.cmp(&b.id)),
            ModuleOrder::AsGiven => {}
        }
        if !modules.is_empty() {
            return (modules, ModuleSource::Selector);
        }
    }

    if let Some(spec) = content {
        let modules: Vec<CurriculumModule> = spec
            .config
            .get("modules")
            .and_then(|m| m.as_array())
            .map(|items| items.iter().filter_map(module_from_parameter).collect())
            .unwrap_or_default();
        if !modules.is_empty() {
            return (modules, ModuleSource::Specification);
        }
    }

    match &dataset.subject_sources.curriculum {
        Some(curriculum) if !curriculum.modules.is_empty() => {
            (curriculum.modules.clone(), ModuleSource::SubjectCurriculum)
        }
        _ => (vec![], ModuleSource::None),
    }
}

fn module_from_parameter(param: &Value) -> Option<CurriculumModule> {
    let id = param.get("id")?.as_str()?.to_string();
    let text = |key: &str| param.get(key).and_then(|v| v.as_str()).map(String::from);
    Some(CurriculumModule {
        name: text("name").or_else(|| text("title")).unwrap_or_else(|| id.clone()),
        description: text("description"),
        sequence: param
            .get("sequence")
            .or_else(|| param.get("order"))
            .and_then(|v| v.as_i64()),
        learning_outcomes: param
            .get("learning_outcomes")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default(),
        id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use promptloom_core::{
        CallerAttribute, CallerId, CallerProfile, Curriculum, SessionRecord, SpecRole,
    };
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn calculator() -> StateCalculator {
        StateCalculator::new(&AppConfig::default()).unwrap()
    }

    fn module(id: &str, seq: Option<i64>) -> CurriculumModule {
        CurriculumModule {
            id: id.into(),
            name: format!("Module {id}"),
            description: None,
            sequence: seq,
            learning_outcomes: vec![],
        }
    }

    fn dataset_with_modules(ids: &[&str]) -> LoadedDataset {
        let mut dataset = LoadedDataset::default();
        dataset.profile = Some(CallerProfile {
            id: CallerId::from("c1"),
            name: None,
            domain_id: Some("maths".into()),
            domain_name: None,
            subject_id: None,
            timezone: None,
            created_at: None,
        });
        dataset.subject_sources.curriculum = Some(Curriculum {
            id: "cur".into(),
            name: "GCSE".into(),
            modules: ids.iter().map(|id| module(id, None)).collect(),
        });
        dataset
    }

    fn session(days_ago: i64, domain: Option<&str>) -> SessionRecord {
        SessionRecord {
            id: format!("s{days_ago}"),
            started_at: now() - Duration::days(days_ago),
            domain_id: domain.map(String::from),
            summary: None,
            scores: Default::default(),
        }
    }

    fn content_spec(config: Value) -> Specification {
        Specification {
            id: "content".into(),
            slug: "spec-content".into(),
            name: "Content".into(),
            description: None,
            role: SpecRole::Content,
            spec_domain: None,
            is_active: true,
            extends: None,
            config,
        }
    }

    #[test]
    fn first_call_has_no_review_and_starts_at_first_module() {
        let dataset = dataset_with_modules(&["m1", "m2", "m3"]);
        let state = calculator().compute(&dataset, None, now());

        assert!(state.is_first_call);
        assert!(state.is_first_call_in_domain);
        assert!(state.module_to_review.is_none());
        assert_eq!(state.next_module.unwrap().id, "m1");
        assert!(state.review.is_none());
        assert_eq!(state.upcoming_modules.len(), 2);
        assert_eq!(state.module_source, ModuleSource::SubjectCurriculum);
    }

    #[test]
    fn twenty_days_means_reintroduce() {
        let mut dataset = dataset_with_modules(&["m1", "m2"]);
        dataset.recent_sessions = vec![session(20, Some("maths"))];
        dataset.session_count = 1;

        let state = calculator().compute(&dataset, None, now());
        let review = state.review.unwrap();
        assert_eq!(review.kind, ReviewType::Reintroduce);
        assert!(review.reason.contains("20 days"));
        assert_eq!(state.days_since_last_call, Some(20));
    }

    #[test]
    fn classification_only_escalates() {
        let thresholds = ReviewConfig::default();
        let mut previous = ReviewType::QuickRecall;
        for days in 0..40 {
            let kind = classify_review(days, &thresholds).kind;
            assert!(kind >= previous, "day {days} went from {previous:?} to {kind:?}");
            previous = kind;
        }
        assert_eq!(classify_review(2, &thresholds).kind, ReviewType::QuickRecall);
        assert_eq!(classify_review(3, &thresholds).kind, ReviewType::Application);
        assert_eq!(classify_review(7, &thresholds).kind, ReviewType::DeepReview);
        assert_eq!(classify_review(14, &thresholds).kind, ReviewType::Reintroduce);
    }

    #[test]
    fn estimated_progress_from_session_count() {
        let mut dataset = dataset_with_modules(&["m1", "m2", "m3", "m4"]);
        dataset.recent_sessions = vec![session(1, None)];
        dataset.session_count = 5;

        let state = calculator().compute(&dataset, None, now());
        assert_eq!(state.estimated_progress, 2);
        assert_eq!(state.last_completed_index, 1);
        assert_eq!(state.module_to_review.unwrap().id, "m2");
        assert_eq!(state.next_module.unwrap().id, "m3");
    }

    #[test]
    fn estimated_progress_capped_at_module_count() {
        let mut dataset = dataset_with_modules(&["m1", "m2", "m3"]);
        dataset.recent_sessions = vec![session(1, None)];
        dataset.session_count = 40;

        let state = calculator().compute(&dataset, None, now());
        assert_eq!(state.estimated_progress, 2);
        assert_eq!(state.module_to_review.unwrap().id, "m2");
        assert_eq!(state.next_module.unwrap().id, "m3");
    }

    #[test]
    fn completed_modules_from_mastery_attributes() {
        let mut dataset = dataset_with_modules(&["m1", "m2", "m3"]);
        dataset.recent_sessions = vec![session(4, Some("maths"))];
        dataset.session_count = 1;
        dataset.caller_attributes = vec![
            CallerAttribute {
                key: "mastery:m1".into(),
                value: AttributeValue::Number(0.9),
                scope: None,
                updated_at: None,
            },
            CallerAttribute {
                key: "completed_m2".into(),
                value: AttributeValue::Boolean(true),
                scope: None,
                updated_at: None,
            },
            CallerAttribute {
                key: "mastery:m3".into(),
                value: AttributeValue::Number(0.4),
                scope: None,
                updated_at: None,
            },
        ];

        let state = calculator().compute(&dataset, None, now());
        assert_eq!(
            state.completed_modules.iter().cloned().collect::<Vec<_>>(),
            vec!["m1".to_string(), "m2".to_string()]
        );
        assert_eq!(state.estimated_progress, 2);
        assert_eq!(state.last_completed_index, 1);
        assert_eq!(state.module_to_review.unwrap().id, "m2");
        assert_eq!(state.next_module.unwrap().id, "m3");
        assert_eq!(state.review.unwrap().kind, ReviewType::Application);
    }

    #[test]
    fn last_module_completed_has_no_next() {
        let mut dataset = dataset_with_modules(&["m1", "m2"]);
        dataset.recent_sessions = vec![session(1, None)];
        dataset.session_count = 1;
        dataset.caller_attributes = vec![CallerAttribute {
            key: "mastery_m2".into(),
            value: AttributeValue::Boolean(true),
            scope: None,
            updated_at: None,
        }];

        let state = calculator().compute(&dataset, None, now());
        assert_eq!(state.module_to_review.unwrap().id, "m2");
        assert!(state.next_module.is_none());
        assert!(state.upcoming_modules.is_empty());
    }

    #[test]
    fn selector_modules_win_and_are_ordered() {
        let spec = content_spec(json!({
            "curriculum": {
                "selector": {"key": "kind", "value": "module"},
                "order": "by_sequence",
                "progress_key_prefix": "progress:",
                "mastery_threshold": 0.5
            },
            "parameters": [
                {"id": "b", "kind": "module", "name": "Second", "sequence": 2},
                {"id": "x", "kind": "rubric"},
                {"id": "a", "kind": "module", "title": "First", "sequence": 1}
            ],
            "modules": [{"id": "ignored", "name": "Ignored"}]
        }));
        let mut dataset = dataset_with_modules(&["cur-1"]);
        dataset.recent_sessions = vec![session(1, None)];
        dataset.session_count = 2;
        dataset.caller_attributes = vec![CallerAttribute {
            key: "progress:a".into(),
            value: AttributeValue::Number(0.6),
            scope: None,
            updated_at: None,
        }];

        let state = calculator().compute(&dataset, Some(&spec), now());
        assert_eq!(state.module_source, ModuleSource::Selector);
        let ids: Vec<_> = state.modules.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(state.modules[0].name, "First");
        assert!(state.is_completed("a"));
        assert_eq!(state.next_module.unwrap().id, "b");
        assert_eq!(state.curriculum.unwrap().order, ModuleOrder::BySequence);
    }

    #[test]
    fn spec_module_list_is_second_choice() {
        let spec = content_spec(json!({
            "modules": [{"id": "s1", "name": "Spec One"}, {"id": "s2"}]
        }));
        let dataset = dataset_with_modules(&["cur-1"]);
        let state = calculator().compute(&dataset, Some(&spec), now());
        assert_eq!(state.module_source, ModuleSource::Specification);
        assert_eq!(state.modules[1].name, "s2");
    }

    #[test]
    fn no_modules_anywhere() {
        let mut dataset = LoadedDataset::default();
        dataset.recent_sessions = vec![session(2, None)];
        dataset.session_count = 3;
        let state = calculator().compute(&dataset, None, now());
        assert_eq!(state.module_source, ModuleSource::None);
        assert!(state.module_to_review.is_none());
        assert!(state.next_module.is_none());
        assert_eq!(state.estimated_progress, 0);
    }

    #[test]
    fn first_call_in_new_domain() {
        let mut dataset = dataset_with_modules(&["m1"]);
        dataset.recent_sessions = vec![session(3, Some("history"))];
        dataset.session_count = 1;
        let state = calculator().compute(&dataset, None, now());
        assert!(!state.is_first_call);
        assert!(state.is_first_call_in_domain);

        dataset.recent_sessions.push(session(5, Some("maths")));
        let state = calculator().compute(&dataset, None, now());
        assert!(!state.is_first_call_in_domain);
    }
}
