//! Behavior targets: desired values for behavioral parameters.

use serde::{Deserialize, Serialize};

/// Whose preference a target encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetScope {
    System,
    Domain,
    Playbook,
    Caller,
}

impl TargetScope {
    /// Rank among non-caller scopes: playbook > domain > system.
    /// Caller overrides are not ranked; they always win.
    pub fn rank(&self) -> u8 {
        match self {
            Self::System => 1,
            Self::Domain => 2,
            Self::Playbook => 3,
            Self::Caller => u8::MAX,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Domain => "domain",
            Self::Playbook => "playbook",
            Self::Caller => "caller",
        }
    }
}

/// A desired value for one behavioral parameter (e.g. warmth = 0.8).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorTarget {
    pub parameter_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_name: Option<String>,

    pub scope: TargetScope,

    /// Desired value in `[0, 1]`
    pub target_value: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    /// Owning playbook for playbook-scoped targets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playbook_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_id: Option<String>,

    /// Presentation grouping label (e.g. "tone", "pacing")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_group: Option<String>,
}
