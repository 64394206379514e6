//! Error types for treesync-content.

use thiserror::Error;

/// All errors that can arise while rendering or parsing post documents.
#[derive(Debug, Error)]
pub enum ContentError {
    /// Tera template engine error (path templates).
    #[error("template engine error: {0}")]
    Tera(#[from] tera::Error),

    /// Front matter could not be serialized or parsed as YAML.
    #[error("front matter YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Front matter parsed, but is a scalar or list instead of a mapping.
    #[error("front matter must be a mapping of keys to values")]
    FrontMatterNotMapping,

    /// A path template rendered to an empty string.
    #[error("path template '{template}' rendered an empty path")]
    EmptyPath { template: String },
}
