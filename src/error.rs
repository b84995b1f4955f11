//! Error types for the lesson generation pipeline.

use serde::Serialize;
use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to open store at {path}: {message}")]
    OpenFailed { path: String, message: String },

    #[error("Failed to encode record: {0}")]
    Encode(String),

    #[error("Failed to decode record: {0}")]
    Decode(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::IoError(std::io::Error::new(
            std::io::ErrorKind::Other,
            err.to_string(),
        ))
    }
}

/// Errors surfaced by the pipeline's exposed operations
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Company not logged in")]
    NotLoggedIn,

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Index build failed: {0}")]
    IndexBuild(String),

    #[error("Outline generation failed: {0}")]
    OutlineGeneration(String),

    #[error("Workflow state not found: {0}")]
    StateNotFound(String),

    #[error("Outline not generated yet for workflow {0}")]
    OutlineNotGenerated(String),

    #[error("Content generation failed: {0}")]
    ContentGeneration(String),

    #[error("Document assembly failed: {0}")]
    Assembly(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Provider error: {0}")]
    Provider(String),
}

impl From<config::ConfigError> for PipelineError {
    fn from(err: config::ConfigError) -> Self {
        PipelineError::Config(err.to_string())
    }
}

/// What the caller should tell the user about a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NotLoggedIn,
    BadInput,
    SessionExpired,
    TryAgain,
}

/// User-visible rendering of a [`PipelineError`]
#[derive(Debug, Clone, Serialize)]
pub struct FailureOutcome {
    pub kind: FailureKind,
    pub status: u16,
    pub message: String,
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::NotLoggedIn => FailureKind::NotLoggedIn,
            PipelineError::Validation(_) | PipelineError::OutlineNotGenerated(_) => {
                FailureKind::BadInput
            }
            PipelineError::StateNotFound(_) => FailureKind::SessionExpired,
            PipelineError::IndexBuild(_)
            | PipelineError::OutlineGeneration(_)
            | PipelineError::ContentGeneration(_)
            | PipelineError::Provider(_)
            | PipelineError::Assembly(_)
            | PipelineError::Storage(_)
            | PipelineError::Config(_) => FailureKind::TryAgain,
        }
    }

    pub fn outcome(&self) -> FailureOutcome {
        let status = match self {
            PipelineError::NotLoggedIn => 401,
            PipelineError::Validation(_) | PipelineError::OutlineNotGenerated(_) => 400,
            PipelineError::StateNotFound(_) => 410,
            PipelineError::IndexBuild(_)
            | PipelineError::OutlineGeneration(_)
            | PipelineError::ContentGeneration(_)
            | PipelineError::Provider(_) => 502,
            PipelineError::Assembly(_) | PipelineError::Storage(_) | PipelineError::Config(_) => {
                500
            }
        };
        let message = match self {
            PipelineError::NotLoggedIn => "company not logged in".to_string(),
            PipelineError::StateNotFound(_) => {
                "generation session expired; start the lesson again".to_string()
            }
            other => other.to_string(),
        };
        FailureOutcome {
            kind: self.kind(),
            status,
            message,
        }
    }
}
