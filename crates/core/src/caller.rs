//! Caller-side data: everything the store knows about the subject of a
//! composition run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::spec::Specification;

/// Identifies the caller whose document is being composed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallerId(pub String);

impl CallerId {
    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CallerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller profile plus the domain they are assigned to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallerProfile {
    pub id: CallerId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Assigned domain (e.g. a subject area or service line)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_name: Option<String>,

    /// Linked subject used for content sources and curriculum fallback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Measured personality trait values, each in `[0, 1]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonalityProfile {
    #[serde(default)]
    pub traits: BTreeMap<String, f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Learning preferences inferred for the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LearnerProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learning_style: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction_style: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_modality: Option<String>,

    /// Free-form preferences not covered above
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub preferences: BTreeMap<String, serde_json::Value>,
}

impl LearnerProfile {
    pub fn is_empty(&self) -> bool {
        self.learning_style.is_none()
            && self.pace.is_none()
            && self.interaction_style.is_none()
            && self.preferred_modality.is_none()
            && self.preferences.is_empty()
    }
}

/// One prior session with the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,

    pub started_at: DateTime<Utc>,

    /// Domain the caller was assigned to during this session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Per-session measurements (e.g. engagement, comprehension)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scores: BTreeMap<String, f64>,
}

/// A typed attribute value.
///
/// Deserialized untagged, so fixtures can write plain JSON values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Boolean(bool),
    Number(f64),
    String(String),
    Json(serde_json::Value),
}

impl AttributeValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// A caller-scoped key/value record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallerAttribute {
    pub key: String,
    pub value: AttributeValue,

    /// Optional grouping scope (e.g. "curriculum", "preference")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    #[default]
    Active,
    Paused,
    Completed,
    Abandoned,
}

/// A goal the caller is working towards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub status: GoalStatus,

    /// Progress in `[0, 1]`
    #[serde(default)]
    pub progress: f64,

    /// Higher = more important
    #[serde(default)]
    pub priority: i32,
}

/// Where the caller is in the onboarding flow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OnboardingProgress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_phase: Option<String>,

    #[serde(default)]
    pub completed_phases: Vec<String>,

    #[serde(default)]
    pub is_complete: bool,
}

/// Designated onboarding specification plus the caller's progress through it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OnboardingState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<Specification>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<OnboardingProgress>,
}

/// An open follow-up owed to or by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAction {
    pub id: String,

    /// e.g. "callback", "send_material", "homework"
    pub kind: String,

    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_value_untagged_parsing() {
        let attrs: Vec<CallerAttribute> = serde_json::from_str(
            r#"[
                {"key": "mastery:m1", "value": true},
                {"key": "mastery:m2", "value": 0.8},
                {"key": "nickname", "value": "Sam"},
                {"key": "prefs", "value": {"music": "jazz"}}
            ]"#,
        )
        .unwrap();
        assert_eq!(attrs[0].value, AttributeValue::Boolean(true));
        assert_eq!(attrs[1].value.as_f64(), Some(0.8));
        assert_eq!(attrs[2].value, AttributeValue::String("Sam".into()));
        assert!(matches!(attrs[3].value, AttributeValue::Json(_)));
    }

    #[test]
    fn learner_profile_emptiness() {
        let mut profile = LearnerProfile::default();
        assert!(profile.is_empty());
        profile.pace = Some("slow".into());
        assert!(!profile.is_empty());
    }

    #[test]
    fn caller_id_is_transparent() {
        let id = CallerId::from("caller-7");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"caller-7\"");
        assert_eq!(id.to_string(), "caller-7");
    }
}
