use thiserror::Error;

#[derive(Error, Debug)]
pub enum SweepError {
    #[error("Record store error: {0}")]
    StoreError(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Quota authority error: {0}")]
    AuthorityError(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type Result<T> = std::result::Result<T, SweepError>;

impl<T> From<std::sync::PoisonError<T>> for SweepError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<std::io::Error> for SweepError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}
