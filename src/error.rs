use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum DatamakerError {
    #[error("invalid workspace URL: {0}")]
    InvalidWorkspace(String),

    #[error("invalid commit identifier: {0}")]
    InvalidCommit(String),

    #[error("invalid dataset description version: {0}")]
    InvalidVersion(String),

    #[error("dataset description version {0} is not available")]
    #[diagnostic(help("known versions: 1.2.3, 2.0.0, 2.1.0; omit VERSION to use the latest"))]
    UnknownVersion(String),

    #[error("file not found in workspace: {url}")]
    NotFound { url: String },

    #[error("workspace request failed: {0}")]
    Transport(String),

    #[error("workspace returned status {status}: {message}")]
    TransportStatus { status: u16, message: String },

    #[error("malformed flatmap manifest: {0}")]
    MalformedManifest(String),

    #[error("malformed flatmap description {file}: {message}")]
    MalformedDescription { file: String, message: String },

    #[error("failed to write dataset archive {path}: {message}")]
    Write { path: String, message: String },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl DatamakerError {
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            DatamakerError::Transport(_) | DatamakerError::TransportStatus { .. }
        )
    }
}
