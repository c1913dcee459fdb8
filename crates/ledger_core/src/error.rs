use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("storage_unavailable - {0}")]
    StorageUnavailable(String),
    #[error("not_found - {0}")]
    NotFound(String),
    #[error("validation_rejected - {0}")]
    ValidationRejected(String),
}

impl LedgerError {
    pub fn storage_unavailable<M: Into<String>>(message: M) -> Self {
        Self::StorageUnavailable(message.into())
    }

    pub fn not_found<M: Into<String>>(message: M) -> Self {
        Self::NotFound(message.into())
    }

    pub fn validation_rejected<M: Into<String>>(message: M) -> Self {
        Self::ValidationRejected(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::StorageUnavailable(_) => "storage_unavailable",
            Self::NotFound(_) => "not_found",
            Self::ValidationRejected(_) => "validation_rejected",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::StorageUnavailable(message) => message,
            Self::NotFound(message) => message,
            Self::ValidationRejected(message) => message,
        }
    }
}
