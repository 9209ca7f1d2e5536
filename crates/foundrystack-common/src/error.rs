//! Unified error types for the Foundrystack workspace.
//!
//! The composer returns these directly. The binary wraps them in
//! `anyhow` at the edge.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum FoundryStackError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// Two inputs were supplied that cannot be honored together.
    #[error("conflicting configuration: {first} cannot be combined with {second}")]
    ConflictingInputs {
        /// First input of the contradictory pair.
        first: String,
        /// Second input of the contradictory pair.
        second: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// The stack dependency graph contains a cycle.
    #[error("cyclic dependency detected between stacks: {stacks}")]
    CyclicDependency {
        /// Stack at which the cycle was detected.
        stacks: String,
    },

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },

    /// YAML serialization failed.
    #[error("YAML serialization error: {source}")]
    Yaml {
        /// Underlying serialization error.
        #[from]
        source: serde_yaml::Error,
    },
}

impl FoundryStackError {
    /// Shorthand for a [`FoundryStackError::ConflictingInputs`] error.
    pub fn conflict(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self::ConflictingInputs {
            first: first.into(),
            second: second.into(),
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, FoundryStackError>;
