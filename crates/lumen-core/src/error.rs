//! Error types for lumen-core.

/// Configuration rejected by [`crate::config::Config::validate`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("missing secret: set {0}")]
    MissingSecret(&'static str),
}
