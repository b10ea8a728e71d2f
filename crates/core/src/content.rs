//! Teaching content linked to a caller's subject: sources, curriculum,
//! and the assertions/questions/vocabulary extracted from them.

use serde::{Deserialize, Serialize};

/// How much authority a content source carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    #[default]
    Unverified,
    Community,
    Verified,
    Authoritative,
}

impl TrustLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unverified => "unverified",
            Self::Community => "community",
            Self::Verified => "verified",
            Self::Authoritative => "authoritative",
        }
    }
}

/// A document or reference linked to the caller's subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentSource {
    pub id: String,
    pub name: String,

    #[serde(default)]
    pub trust_level: TrustLevel,

    /// Issuing body (exam board, publisher, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// One module of a curriculum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurriculumModule {
    pub id: String,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Explicit ordering position
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<i64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub learning_outcomes: Vec<String>,
}

/// A subject's curriculum.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Curriculum {
    pub id: String,
    pub name: String,

    #[serde(default)]
    pub modules: Vec<CurriculumModule>,
}

/// Everything linked to the caller's subject.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubjectSources {
    #[serde(default)]
    pub sources: Vec<ContentSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curriculum: Option<Curriculum>,
}

/// A source-attributed fact usable as teaching content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assertion {
    pub id: String,
    pub text: String,
    pub source_id: String,

    /// Only approved assertions are surfaced as teaching points
    #[serde(default)]
    pub approved: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// An extracted practice question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeachingQuestion {
    pub id: String,
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_id: Option<String>,

    /// 1 (easy) to 5 (hard)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<u8>,
}

/// An extracted vocabulary term.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabularyEntry {
    pub term: String,
    pub definition: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trust_levels_are_ordered() {
        assert!(TrustLevel::Authoritative > TrustLevel::Verified);
        assert!(TrustLevel::Verified > TrustLevel::Community);
        assert!(TrustLevel::Community > TrustLevel::Unverified);
    }

    #[test]
    fn source_defaults_to_unverified() {
        let s: ContentSource = serde_json::from_str(r#"{"id": "s", "name": "Notes"}"#).unwrap();
        assert_eq!(s.trust_level, TrustLevel::Unverified);
    }
}
