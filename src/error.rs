//! Error types.
//!
//! Only configuration can fail. Sensor misses, inconsistent state and latched
//! input are handled in-place by the core and never surface as errors.

use thiserror::Error;

/// Errors raised while building a character or loading its settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A collaborator the core cannot run without was not provided.
    #[error("missing required collaborator: {0}")]
    MissingCollaborator(&'static str),

    /// A setting is outside its valid range.
    #[error("invalid setting `{field}`: {reason}")]
    InvalidSetting { field: &'static str, reason: String },

    /// Settings text could not be parsed.
    #[error("failed to parse settings: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Settings file could not be read.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            field,
            reason: reason.into(),
        }
    }
}
