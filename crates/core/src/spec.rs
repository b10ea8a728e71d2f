//! Specifications and rule-set bundles ("playbooks").
//!
//! A [`Specification`] is a named, versioned rule-set payload. Its `config`
//! is free-form JSON; by convention it carries a `parameters` array
//! (objects with an `id` and a nested `config`), a `constraints` array and
//! any number of other top-level keys. Playbooks stack specifications for a
//! domain in priority order.

use serde::{Deserialize, Serialize};

/// The slot a specification fills in a composed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecRole {
    Identity,
    Content,
    Voice,
    /// Anything else (guardrails, measurement, ...); not resolved into a slot
    #[serde(other)]
    Other,
}

/// A named rule-set payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Specification {
    pub id: String,
    pub slug: String,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub role: SpecRole,

    /// Domain tag (e.g. "voice"); an identity spec tagged "voice" fills the voice slot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_domain: Option<String>,

    #[serde(default = "default_true")]
    pub is_active: bool,

    /// Reference to a base archetype this spec overlays
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,

    #[serde(default = "empty_object")]
    pub config: serde_json::Value,
}

fn default_true() -> bool {
    true
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl Specification {
    /// The role this spec plays once domain tags are taken into account.
    pub fn effective_role(&self) -> SpecRole {
        effective_role(self.role, self.spec_domain.as_deref())
    }

    /// The `parameters` array of the config, or an empty slice.
    pub fn parameters(&self) -> &[serde_json::Value] {
        self.config
            .get("parameters")
            .and_then(|p| p.as_array())
            .map(|a| a.as_slice())
            .unwrap_or(&[])
    }
}

/// An identity specification tagged for the "voice" domain counts as voice.
pub fn effective_role(role: SpecRole, spec_domain: Option<&str>) -> SpecRole {
    match (role, spec_domain) {
        (SpecRole::Identity, Some(domain)) if domain.eq_ignore_ascii_case("voice") => {
            SpecRole::Voice
        }
        (role, _) => role,
    }
}

/// One entry in a playbook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybookItem {
    pub spec: Specification,

    /// Declared role; falls back to the spec's own role when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<SpecRole>,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl PlaybookItem {
    pub fn effective_role(&self) -> SpecRole {
        effective_role(
            self.role.unwrap_or(self.spec.role),
            self.spec.spec_domain.as_deref(),
        )
    }
}

/// An ordered, prioritized bundle of specification references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playbook {
    pub id: String,
    pub name: String,

    /// Lower value = higher priority
    #[serde(default)]
    pub priority: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_id: Option<String>,

    #[serde(default)]
    pub items: Vec<PlaybookItem>,
}
