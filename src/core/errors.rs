//! KIB-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, KibError>;

/// Top-level error type for the Kibbler dashboard core.
#[derive(Debug, Error)]
pub enum KibError {
    #[error("[KIB-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[KIB-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[KIB-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[KIB-2001] invalid store path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("[KIB-2002] invalid write batch: {details}")]
    InvalidBatch { details: String },

    #[error("[KIB-2003] store rejected write to {path}: {reason}")]
    WriteRejected { path: String, reason: String },

    #[error("[KIB-2004] invalid input for {field}: {details}")]
    InvalidInput {
        field: &'static str,
        details: String,
    },

    #[error("[KIB-2005] nothing to act on: {details}")]
    NotFound { details: String },

    #[error("[KIB-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[KIB-2102] SQL failure in {context}: {details}")]
    Sql {
        context: &'static str,
        details: String,
    },

    #[error("[KIB-3001] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[KIB-3002] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[KIB-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl KibError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "KIB-1001",
            Self::MissingConfig { .. } => "KIB-1002",
            Self::ConfigParse { .. } => "KIB-1003",
            Self::InvalidPath { .. } => "KIB-2001",
            Self::InvalidBatch { .. } => "KIB-2002",
            Self::WriteRejected { .. } => "KIB-2003",
            Self::InvalidInput { .. } => "KIB-2004",
            Self::NotFound { .. } => "KIB-2005",
            Self::Serialization { .. } => "KIB-2101",
            Self::Sql { .. } => "KIB-2102",
            Self::Io { .. } => "KIB-3001",
            Self::ChannelClosed { .. } => "KIB-3002",
            Self::Runtime { .. } => "KIB-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::ChannelClosed { .. }
                | Self::WriteRejected { .. }
                | Self::Sql { .. }
                | Self::Runtime { .. }
        )
    }

    /// Whether the failure was caused by caller input rather than the environment.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. }
                | Self::MissingConfig { .. }
                | Self::ConfigParse { .. }
                | Self::InvalidPath { .. }
                | Self::InvalidInput { .. }
                | Self::NotFound { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for rejected input values.
    #[must_use]
    pub fn invalid_input(field: &'static str, details: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            details: details.into(),
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for KibError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql {
            context: "rusqlite",
            details: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for KibError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for KibError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
