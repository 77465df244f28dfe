use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("key not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    BackendUnavailable(String),
    #[error("invalid value: {0}")]
    InvalidValue(String),
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("Unrecognized storage type '{0}', known types are 'local', 'cluster' and 'ha'")]
    InvalidScope(String),
    #[error("Unrecognized storage server '{0}', known servers are 'app-server' and 'zss'")]
    InvalidServer(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    pub fn unavailable(msg: impl Into<String>) -> Self { Self::BackendUnavailable(msg.into()) }

    /// Validation failures are the caller's fault and must not count as a broken replica.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidValue(_) | Self::InvalidKey(_) | Self::InvalidScope(_) | Self::InvalidServer(_)
        )
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BackendUnavailable(_) => "backend_unavailable",
            Self::InvalidValue(_) => "invalid_value",
            Self::InvalidKey(_) => "invalid_key",
            Self::InvalidScope(_) => "invalid_scope",
            Self::InvalidServer(_) => "invalid_server",
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self { Self::BackendUnavailable(e.to_string()) }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self { Self::BackendUnavailable(e.to_string()) }
}
