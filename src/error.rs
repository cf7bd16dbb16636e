use std::path::PathBuf;

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Errors from a single call to the text generation service.
///
/// None of these are retried. `Blocked` is a domain outcome (the service
/// refused to produce text); the rest are transport level failures.
#[derive(Clone, Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("generation blocked: {reason}")]
    Blocked { reason: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("service returned {status}: {body}")]
    Http { status: u16, body: String },
    #[error("undecodable service response: {0}")]
    Decode(String),
}

impl GenerationError {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Blocked { .. } => "blocked",
            Self::Transport(_) => "transport",
            Self::Http { .. } => "http",
            Self::Decode(_) => "decode",
        }
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Errors from path-addressed tree mutations. The input tree is never
/// modified when one of these is returned.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum MutationError {
    #[error("effect '{0}' not found")]
    NodeNotFound(String),
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid effect path '{0}'")]
pub struct InvalidPath(pub String);

impl From<InvalidPath> for MutationError {
    fn from(err: InvalidPath) -> Self {
        Self::NodeNotFound(err.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("futurecast file not found: {0}")]
    NotFound(PathBuf),
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed futurecast file {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Failures surfaced by a chat session operation.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no futurecast is loaded")]
    NothingLoaded,
    #[error(transparent)]
    Mutation(#[from] MutationError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
}
