//! Error types for the promptloom domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all promptloom operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Collaborator errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Pipeline errors ---
    #[error("Composition error: {0}")]
    Composition(#[from] CompositionError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures reported by a data-store or persistence collaborator.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Write conflict: {0}")]
    Conflict(String),
}

/// A single named loader faulted. Never propagated past the loader phase.
#[derive(Debug, Clone, Error)]
#[error("Loader '{loader}' failed: {reason}")]
pub struct LoadError {
    pub loader: String,
    pub reason: String,
}

impl LoadError {
    pub fn new(loader: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            loader: loader.into(),
            reason: reason.into(),
        }
    }
}

/// A named transform could not produce output for its section.
#[derive(Debug, Clone, Error)]
pub enum TransformError {
    #[error("Invalid input for transform '{transform}': {reason}")]
    InvalidInput { transform: String, reason: String },

    #[error("Transform '{transform}' failed: {reason}")]
    Failed { transform: String, reason: String },
}

impl TransformError {
    pub fn invalid_input(transform: &str, reason: impl std::fmt::Display) -> Self {
        Self::InvalidInput {
            transform: transform.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn failed(transform: &str, reason: impl std::fmt::Display) -> Self {
        Self::Failed {
            transform: transform.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            Self::InvalidInput { reason, .. } | Self::Failed { reason, .. } => reason,
        }
    }
}

/// Plan-compilation errors (raised at startup) and the one run-time fatal.
#[derive(Debug, Clone, Error)]
pub enum CompositionError {
    #[error("Caller not found: {0}")]
    CallerNotFound(String),

    #[error("Section '{section}' references unknown transform '{transform}'")]
    UnknownTransform { section: String, transform: String },

    #[error("Section '{section}' depends on unknown section '{dependency}'")]
    UnknownDependency { section: String, dependency: String },

    #[error("Section '{section}' reads unknown data source '{source_name}'")]
    UnknownDataSource { section: String, source_name: String },

    #[error("Section '{section}' is invalid: {reason}")]
    InvalidSection { section: String, reason: String },

    #[error("Section '{section}' uses unregistered condition '{condition}'")]
    UnknownCondition { section: String, condition: String },

    #[error("Output key '{key}' is produced by more than one section")]
    DuplicateOutputKey { key: String },

    #[error("Section id '{0}' is defined more than once")]
    DuplicateSectionId(String),

    #[error("Dependency cycle among sections: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),

    #[error("Section '{0}' declares an empty transform chain")]
    EmptyTransformChain(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_displays_correctly() {
        let err = Error::Store(StoreError::QueryFailed("timeout on callers".into()));
        assert!(err.to_string().contains("timeout on callers"));
    }

    #[test]
    fn cycle_error_lists_members() {
        let err = CompositionError::DependencyCycle(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "Dependency cycle among sections: a, b");
    }

    #[test]
    fn transform_error_names_transform() {
        let err = TransformError::failed("merge_targets", "bad scope");
        assert!(err.to_string().contains("merge_targets"));
        assert!(err.to_string().contains("bad scope"));
    }

    #[test]
    fn load_error_displays_loader() {
        let err = LoadError::new("memories", "connection reset");
        assert_eq!(err.to_string(), "Loader 'memories' failed: connection reset");
    }
}
