//! Error types for server set operations

use serverset_api::ApiError;

/// Errors reported by the coordination service capability.
///
/// `NodeExists` and `NoNode` are distinguished so callers can special-case
/// them; everything else is a failure of the request or the session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinationError {
    #[error("node already exists")]
    NodeExists,

    #[error("node does not exist")]
    NoNode,

    #[error("node has children")]
    NotEmpty,

    #[error("ephemeral nodes may not have children")]
    NoChildrenForEphemerals,

    #[error("invalid path: {0}")]
    BadPath(String),

    #[error("connection lost: {0}")]
    ConnectionLoss(String),

    #[error("session expired")]
    SessionExpired,

    #[error("operation timed out")]
    Timeout,

    #[error("{0}")]
    Other(String),
}

/// Error type for server set operations
#[derive(Debug, thiserror::Error)]
pub enum ServerSetError {
    #[error("service name ({0}) must not contain slashes")]
    InvalidServiceName(String),

    #[error("failed to connect to coordination service: {0}")]
    Connection(#[source] CoordinationError),

    #[error("coordination error at {path}: {source}")]
    Coordination {
        path: String,
        #[source]
        source: CoordinationError,
    },

    #[error("node {0} does not exist")]
    NotFound(String),

    #[error("member record codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("configuration source error: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("watch closed")]
    WatchClosed,
}

impl ServerSetError {
    pub(crate) fn at(path: &str, source: CoordinationError) -> Self {
        ServerSetError::Coordination {
            path: path.to_string(),
            source,
        }
    }
}

impl From<ApiError> for ServerSetError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::InvalidServiceName(service) => ServerSetError::InvalidServiceName(service),
            ApiError::Codec(e) => ServerSetError::Codec(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServerSetError>;
