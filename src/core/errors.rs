//! CFE-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::feed::model::{AnnouncementId, SectionId};

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, FeedError>;

/// Top-level error type for the feed engine.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("[CFE-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[CFE-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[CFE-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[CFE-2001] fetch failed for section {section}: {details}")]
    FetchFailed { section: SectionId, details: String },

    #[error("[CFE-2002] acknowledge failed for announcement {id}: {details}")]
    AcknowledgeFailed { id: AnnouncementId, details: String },

    #[error("[CFE-2003] invalid association selection index {index} (len {len})")]
    InvalidSelection { index: usize, len: usize },

    #[error("[CFE-2004] stale result discarded: {details}")]
    StaleResultDiscarded { details: String },

    #[error("[CFE-2005] an acknowledgment is already in flight for announcement {id}")]
    AdvanceInFlight { id: AnnouncementId },

    #[error("[CFE-2006] no active traversal session")]
    NoActiveTraversal,

    #[error("[CFE-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[CFE-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[CFE-3003] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[CFE-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl FeedError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "CFE-1001",
            Self::MissingConfig { .. } => "CFE-1002",
            Self::ConfigParse { .. } => "CFE-1003",
            Self::FetchFailed { .. } => "CFE-2001",
            Self::AcknowledgeFailed { .. } => "CFE-2002",
            Self::InvalidSelection { .. } => "CFE-2003",
            Self::StaleResultDiscarded { .. } => "CFE-2004",
            Self::AdvanceInFlight { .. } => "CFE-2005",
            Self::NoActiveTraversal => "CFE-2006",
            Self::Serialization { .. } => "CFE-2101",
            Self::Io { .. } => "CFE-3002",
            Self::ChannelClosed { .. } => "CFE-3003",
            Self::Runtime { .. } => "CFE-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::FetchFailed { .. }
                | Self::AcknowledgeFailed { .. }
                | Self::AdvanceInFlight { .. }
                | Self::Io { .. }
                | Self::ChannelClosed { .. }
                | Self::Runtime { .. }
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
}

impl From<serde_json::Error> for FeedError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for FeedError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

impl From<toml::ser::Error> for FeedError {
    fn from(value: toml::ser::Error) -> Self {
        Self::Serialization {
            context: "toml",
            details: value.to_string(),
        }
    }
}
