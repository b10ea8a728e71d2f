//! Memory facts: what the system has learned about a caller across sessions.
//!
//! Facts are extracted from earlier sessions by an external process. The
//! composition pipeline only reads them: it deduplicates, scores and groups
//! them (see `promptloom-composer::transform::memories`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Memory fact category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemoryCategory {
    Fact,
    Preference,
    Event,
    Topic,
    Relationship,
    Context,
    #[serde(other)]
    Other,
}

impl MemoryCategory {
    /// The wire name, also used as the key in category-keyed config maps.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fact => "FACT",
            Self::Preference => "PREFERENCE",
            Self::Event => "EVENT",
            Self::Topic => "TOPIC",
            Self::Relationship => "RELATIONSHIP",
            Self::Context => "CONTEXT",
            Self::Other => "OTHER",
        }
    }
}

impl std::fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single remembered fact about the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryFact {
    #[serde(default)]
    pub id: String,

    pub category: MemoryCategory,

    /// What the fact is about (e.g. "location", "favourite team")
    pub key: String,

    /// The remembered value
    pub value: String,

    /// Extraction confidence in `[0, 1]`
    #[serde(default)]
    pub confidence: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_session: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl MemoryFact {
    /// Dedup key: category plus the key lower-cased with whitespace runs
    /// collapsed to underscores.
    pub fn normalized_key(&self) -> String {
        self.key
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("_")
    }

    /// The searchable text of the fact.
    pub fn text(&self) -> String {
        format!("{} {}", self.key, self.value)
    }
}
