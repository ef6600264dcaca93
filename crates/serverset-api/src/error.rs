//! Error types for the server set wire model

/// Errors raised while building namespace paths or coding member records
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("service name ({0}) must not contain slashes")]
    InvalidServiceName(String),

    #[error("member record codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ApiError>;
