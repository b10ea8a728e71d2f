//! Configuration loading, validation, and management for promptloom.
//!
//! Loads configuration from `~/.promptloom/config.toml` (or the file named
//! by `PROMPTLOOM_CONFIG`) with environment variable overrides. Validates
//! all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.promptloom/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Review-urgency day thresholds
    #[serde(default)]
    pub review: ReviewConfig,

    /// High/low classification thresholds for trait and target values
    #[serde(default)]
    pub classification: ClassificationConfig,

    /// Memory dedup/relevance/grouping configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Progress and mastery detection
    #[serde(default)]
    pub curriculum: CurriculumConfig,

    /// Specification resolution
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Session history loading
    #[serde(default)]
    pub sessions: SessionsConfig,

    /// Free-form per-loader configuration, keyed by loader name
    #[serde(default)]
    pub loaders: BTreeMap<String, serde_json::Value>,

    /// Section definitions; empty = use the built-in default plan
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<SectionConfig>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    #[serde(default = "default_reintroduce_days")]
    pub reintroduce_days: u32,

    #[serde(default = "default_deep_review_days")]
    pub deep_review_days: u32,

    #[serde(default = "default_application_days")]
    pub application_days: u32,
}

fn default_reintroduce_days() -> u32 {
    14
}
fn default_deep_review_days() -> u32 {
    7
}
fn default_application_days() -> u32 {
    3
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            reintroduce_days: default_reintroduce_days(),
            deep_review_days: default_deep_review_days(),
            application_days: default_application_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationConfig {
    #[serde(default = "default_high")]
    pub high: f64,

    #[serde(default = "default_low")]
    pub low: f64,
}

fn default_high() -> f64 {
    0.65
}
fn default_low() -> f64 {
    0.35
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            high: default_high(),
            low: default_low(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Weight of confidence vs. relevance; 1.0 = confidence only
    #[serde(default = "default_alpha")]
    pub alpha: f64,

    #[serde(default = "default_max_per_category")]
    pub max_per_category: usize,

    #[serde(default = "default_max_total")]
    pub max_total: usize,

    /// Upcoming modules (after the next one) that feed the relevance context
    #[serde(default = "default_upcoming_window")]
    pub upcoming_window: usize,

    /// How many facts the memory loader fetches
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: usize,

    /// Relevance boost per category (category name → weight in [0, 1])
    #[serde(default)]
    pub category_boosts: BTreeMap<String, f64>,
}

fn default_alpha() -> f64 {
    1.0
}
fn default_max_per_category() -> usize {
    5
}
fn default_max_total() -> usize {
    20
}
fn default_upcoming_window() -> usize {
    2
}
fn default_fetch_limit() -> usize {
    100
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            max_per_category: default_max_per_category(),
            max_total: default_max_total(),
            upcoming_window: default_upcoming_window(),
            fetch_limit: default_fetch_limit(),
            category_boosts: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurriculumConfig {
    /// Numeric attribute values at or above this count as mastered
    #[serde(default = "default_mastery_threshold")]
    pub mastery_threshold: f64,

    /// Regex over attribute keys; capture group 1 is the module id
    #[serde(default = "default_mastery_key_pattern")]
    pub mastery_key_pattern: String,
}

fn default_mastery_threshold() -> f64 {
    0.7
}
fn default_mastery_key_pattern() -> String {
    r"^(?:mastery|completed|module_complete)[:_]([^:]+?)(?:[:_](?:mastery|completed))?$".into()
}

impl Default for CurriculumConfig {
    fn default() -> Self {
        Self {
            mastery_threshold: default_mastery_threshold(),
            mastery_key_pattern: default_mastery_key_pattern(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Regex over spec slugs used for the last-resort voice lookup
    #[serde(default = "default_voice_slug_pattern")]
    pub voice_slug_pattern: String,

    /// Prefix of slugs derived from archetype references
    #[serde(default = "default_archetype_slug_prefix")]
    pub archetype_slug_prefix: String,
}

fn default_voice_slug_pattern() -> String {
    "^spec-voice".into()
}
fn default_archetype_slug_prefix() -> String {
    "spec-".into()
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            voice_slug_pattern: default_voice_slug_pattern(),
            archetype_slug_prefix: default_archetype_slug_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_history_limit() -> usize {
    10
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
        }
    }
}

/// A section definition as written in TOML.
///
/// Names stay strings here; the composer resolves them against its loader
/// enum and transform/condition registries when it compiles the plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionConfig {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Tie-break among ready sections (lower runs first)
    #[serde(default)]
    pub priority: i32,

    /// Loader names, or `"_assembled"` to read the document built so far
    #[serde(default)]
    pub sources: Vec<String>,

    /// "always", "data_exists", "content_spec", "has_domain", "first_call", or a custom name
    #[serde(default = "default_condition")]
    pub condition: String,

    /// "omit", "null", "empty_object" or "skip"
    #[serde(default = "default_fallback")]
    pub fallback: String,

    /// A single transform name or an ordered chain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<TransformConfig>,

    /// Section-local configuration handed to every transform
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,

    /// Document key; defaults to the section id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,

    #[serde(default)]
    pub depends_on: Vec<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_condition() -> String {
    "always".into()
}
fn default_fallback() -> String {
    "omit".into()
}

/// `transform = "name"` or `transform = ["a", "b"]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransformConfig {
    One(String),
    Chain(Vec<String>),
}

impl AppConfig {
    /// Load configuration from the default path.
    ///
    /// `PROMPTLOOM_CONFIG` selects another file. Environment overrides:
    /// - `PROMPTLOOM_MEMORY_ALPHA`
    /// - `PROMPTLOOM_VOICE_SLUG_PATTERN`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_overrides(None)
    }

    /// Load `path` (or the default file when `None`), then apply the
    /// environment overrides and validate the result.
    pub fn load_with_overrides(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => std::env::var("PROMPTLOOM_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| Self::config_dir().join("config.toml")),
        };
        let mut config = Self::load_from(&config_path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `PROMPTLOOM_*` overrides read through `lookup`, then validate.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(alpha) = lookup("PROMPTLOOM_MEMORY_ALPHA") {
            self.memory.alpha = alpha.parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "PROMPTLOOM_MEMORY_ALPHA is not a number: {alpha}"
                ))
            })?;
        }

        if let Some(pattern) = lookup("PROMPTLOOM_VOICE_SLUG_PATTERN") {
            self.resolver.voice_slug_pattern = pattern;
        }

        self.validate()
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config = Self::from_toml(&content).map_err(|e| match e {
            ConfigError::ParseError { reason, .. } => ConfigError::ParseError {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })?;
        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<inline>"),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".promptloom")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.review;
        if !(r.reintroduce_days > r.deep_review_days && r.deep_review_days > r.application_days) {
            return Err(ConfigError::ValidationError(format!(
                "review thresholds must be strictly descending (reintroduce {} > deep_review {} > application {})",
                r.reintroduce_days, r.deep_review_days, r.application_days
            )));
        }

        let c = &self.classification;
        if !(0.0..=1.0).contains(&c.low) || !(0.0..=1.0).contains(&c.high) || c.low >= c.high {
            return Err(ConfigError::ValidationError(
                "classification thresholds must satisfy 0 <= low < high <= 1".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.memory.alpha) {
            return Err(ConfigError::ValidationError(
                "memory.alpha must be between 0.0 and 1.0".into(),
            ));
        }

        for (category, boost) in &self.memory.category_boosts {
            if !(0.0..=1.0).contains(boost) {
                return Err(ConfigError::ValidationError(format!(
                    "memory.category_boosts.{category} must be between 0.0 and 1.0"
                )));
            }
        }

        let mastery = regex_lite::Regex::new(&self.curriculum.mastery_key_pattern).map_err(|e| {
            ConfigError::ValidationError(format!("curriculum.mastery_key_pattern: {e}"))
        })?;
        if mastery.captures_len() < 2 {
            return Err(ConfigError::ValidationError(
                "curriculum.mastery_key_pattern needs a capture group for the module id".into(),
            ));
        }

        regex_lite::Regex::new(&self.resolver.voice_slug_pattern).map_err(|e| {
            ConfigError::ValidationError(format!("resolver.voice_slug_pattern: {e}"))
        })?;

        Ok(())
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.review.reintroduce_days, 14);
        assert_eq!(config.review.deep_review_days, 7);
        assert_eq!(config.review.application_days, 3);
        assert_eq!(config.memory.alpha, 1.0);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = AppConfig::from_toml(&toml_str).unwrap();
        assert_eq!(parsed.review.reintroduce_days, config.review.reintroduce_days);
        assert_eq!(parsed.memory.max_total, config.memory.max_total);
    }

    #[test]
    fn non_descending_thresholds_rejected() {
        let config = AppConfig {
            review: ReviewConfig {
                reintroduce_days: 7,
                deep_review_days: 7,
                application_days: 3,
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn alpha_out_of_range_rejected() {
        let mut config = AppConfig::default();
        config.memory.alpha = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn mastery_pattern_needs_capture_group() {
        let mut config = AppConfig::default();
        config.curriculum.mastery_key_pattern = "^mastery_.*$".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("capture group"));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().memory.max_per_category, 5);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[review]
reintroduce_days = 21
deep_review_days = 10
application_days = 4

[memory]
alpha = 0.6
[memory.category_boosts]
PREFERENCE = 0.2
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.review.reintroduce_days, 21);
        assert_eq!(config.memory.alpha, 0.6);
        assert_eq!(config.memory.category_boosts.get("PREFERENCE"), Some(&0.2));
        assert_eq!(config.memory.max_total, 20);
    }

    #[test]
    fn unparseable_file_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[review\nbroken").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { ref path, .. } if path == file.path()));
    }

    #[test]
    fn section_config_parsing() {
        let toml_str = r#"
[[sections]]
id = "memories"
sources = ["memories"]
condition = "data_exists"
fallback = "empty_object"
transform = ["dedupe_memories", "score_memory_relevance", "group_memories"]

[[sections]]
id = "instructions"
sources = ["_assembled"]
transform = "compose_instructions"
depends_on = ["memories"]
priority = 99
[sections.config]
style = "terse"
"#;
        let config = AppConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.sections.len(), 2);
        assert_eq!(
            config.sections[0].transform,
            Some(TransformConfig::Chain(vec![
                "dedupe_memories".into(),
                "score_memory_relevance".into(),
                "group_memories".into(),
            ]))
        );
        assert_eq!(config.sections[0].fallback, "empty_object");
        assert_eq!(
            config.sections[1].transform,
            Some(TransformConfig::One("compose_instructions".into()))
        );
        assert_eq!(config.sections[1].condition, "always");
        assert_eq!(config.sections[1].depends_on, vec!["memories".to_string()]);
        assert!(config.sections[1].enabled);
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let pairs: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        }
    }

    #[test]
    fn env_overrides_apply_to_an_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[memory]\nalpha = 0.6\nmax_total = 12").unwrap();

        let mut config = AppConfig::load_from(file.path()).unwrap();
        config
            .apply_overrides(env(&[
                ("PROMPTLOOM_MEMORY_ALPHA", "0.25"),
                ("PROMPTLOOM_VOICE_SLUG_PATTERN", "^voice-.*$"),
            ]))
            .unwrap();
        assert_eq!(config.memory.alpha, 0.25);
        assert_eq!(config.memory.max_total, 12);
        assert_eq!(config.resolver.voice_slug_pattern, "^voice-.*$");
    }

    #[test]
    fn out_of_range_env_alpha_is_rejected() {
        let mut config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        let err = config
            .apply_overrides(env(&[("PROMPTLOOM_MEMORY_ALPHA", "7")]))
            .unwrap_err();
        assert!(err.to_string().contains("memory.alpha"));

        let err = config
            .apply_overrides(env(&[("PROMPTLOOM_MEMORY_ALPHA", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("not a number"));
    }

    #[test]
    fn invalid_env_voice_pattern_is_rejected() {
        let mut config = AppConfig::default();
        let err = config
            .apply_overrides(env(&[("PROMPTLOOM_VOICE_SLUG_PATTERN", "(")]))
            .unwrap_err();
        assert!(err.to_string().contains("voice_slug_pattern"));
    }

    #[test]
    fn no_overrides_leaves_file_values() {
        let mut config = AppConfig::default();
        config.apply_overrides(env(&[])).unwrap();
        assert_eq!(config.memory.alpha, 1.0);
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("reintroduce_days = 14"));
        assert!(toml_str.contains("spec-voice"));
    }
}
