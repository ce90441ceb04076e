//! Error types for building and scanning.

use std::path::PathBuf;

use thiserror::Error;

use crate::hooks::HookError;

/// Result alias for build operations.
pub type BuildResult<T> = Result<T, BuildError>;

/// Errors that can occur while maintaining and generating outputs.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Two records resolve to the same logical path.
    #[error("File node conflicts: {path}")]
    Conflict { path: String },

    /// The parse hook failed for an input.
    #[error("Failed to parse {input}: {source}")]
    Parse {
        input: String,
        #[source]
        source: HookError,
    },

    /// An output could not be written.
    #[error("Failed to write {target}: {source}")]
    Rebuild {
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Several errors collected during one build cycle.
    #[error("{} build errors:\n{}", .errors.len(), list_errors(.errors))]
    Aggregate { errors: Vec<BuildError> },
}

fn list_errors(errors: &[BuildError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

impl BuildError {
    /// Create a parse error for an input.
    pub fn parse(input: impl Into<String>, source: impl Into<HookError>) -> Self {
        Self::Parse {
            input: input.into(),
            source: source.into(),
        }
    }

    /// Fold collected errors into one.
    ///
    /// Returns `None` for an empty list and a lone error unchanged.
    pub fn aggregate(mut errors: Vec<BuildError>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Self::Aggregate { errors }),
        }
    }

    /// Individual errors, flattening an aggregate.
    pub fn errors(&self) -> Vec<&BuildError> {
        match self {
            Self::Aggregate { errors } => errors.iter().collect(),
            other => vec![other],
        }
    }

    /// Check if this is a path conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Errors that can occur while reading the watched directory.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Root path is not a directory.
    #[error("Root path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// An ignore pattern failed to compile.
    #[error("Invalid ignore pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },
}

impl ScanError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }
}
