use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Core error type for Verifact.
#[derive(Debug, Error)]
pub enum VerifactError {
    #[error("configuration error: {0}")]
    InvalidConfiguration(String),
    #[error("I/O error while reading {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("missing environment variable: {0}")]
    MissingSecret(String),
    #[error("build error: {0}")]
    Build(#[from] BuildError),
    #[error("crew assembly error: {0}")]
    Assemble(String),
    #[error("execution error: {0}")]
    Execution(String),
    #[error("document error: {0}")]
    Document(String),
}

impl VerifactError {
    pub fn config_io(path: PathBuf, source: std::io::Error) -> Self {
        Self::ConfigIo { path, source }
    }

    pub fn execution(reason: impl Into<String>) -> Self {
        Self::Execution(reason.into())
    }

    /// Failure category reported to callers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfiguration(_) | Self::ConfigIo { .. } | Self::MissingSecret(_) => {
                ErrorKind::Config
            }
            Self::Build(_) => ErrorKind::Build,
            Self::Assemble(_) => ErrorKind::Assemble,
            Self::Execution(_) => ErrorKind::Execution,
            Self::Document(_) => ErrorKind::Document,
        }
    }
}

/// Failure raised while turning roster entries into agents and tasks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("agent `{agent}` is missing required field `{field}`")]
    MissingAgentField { agent: String, field: &'static str },
    #[error("task `{task}` is missing required field `{field}`")]
    MissingTaskField { task: String, field: &'static str },
    #[error("task `{task}` requires agent `{agent}`, which is not configured")]
    MissingAgent { task: String, agent: String },
    #[error("default agent `{0}` is not configured")]
    UnknownDefaultAgent(String),
    #[error("no agents configured")]
    NoAgents,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    Build,
    Assemble,
    Execution,
    Document,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Config => "config",
            ErrorKind::Build => "build",
            ErrorKind::Assemble => "assemble",
            ErrorKind::Execution => "execution",
            ErrorKind::Document => "document",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type Result<T, E = VerifactError> = std::result::Result<T, E>;
