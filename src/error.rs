//! Error Handling
//!
//! Error type definitions used in org-labeler

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error types for org-labeler
#[derive(Error, Debug)]
pub enum Error {
    #[error("Missing data: repository {repository} has a label without a name")]
    MissingLabelName { repository: String },

    #[error("Remote operation failed ({step}): {source}")]
    RemoteOperationFailed {
        step: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Unimplemented action: {0}")]
    UnimplementedActionKind(String),

    #[error("Malformed action: {0}")]
    MalformedAction(String),

    #[error("GitHub API error: {0}")]
    GitHubApi(#[from] octocrab::Error),

    #[error("GraphQL error: {0}")]
    GraphQl(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration validation error: {0}")]
    ConfigValidation(String),

    #[error("Label validation error: {0}")]
    LabelValidation(String),

    #[error("Repository not found: {0}")]
    RepositoryNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid label color: {0} (expected 6-digit hex, optional # prefix)")]
    InvalidLabelColor(String),

    #[error("Invalid search pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

impl Error {
    /// Create a new configuration validation error
    pub fn config_validation<S: Into<String>>(message: S) -> Self {
        Error::ConfigValidation(message.into())
    }

    /// Create a new label validation error
    pub fn label_validation<S: Into<String>>(message: S) -> Self {
        Error::LabelValidation(message.into())
    }

    /// Wrap a failure of a single remote mutation
    pub fn remote<S: Into<String>>(step: S, source: Error) -> Self {
        Error::RemoteOperationFailed {
            step: step.into(),
            source: Box::new(source),
        }
    }

    /// Whether reconciliation of the whole repository has to stop,
    /// as opposed to only the action that produced the error
    pub fn is_repository_fatal(&self) -> bool {
        matches!(self, Error::MissingLabelName { .. })
    }
}
