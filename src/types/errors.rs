use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("SQL error ({code}): {message}")]
    Sql { code: String, message: String },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Load failed: {0}")]
    LoadFailed(String),
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        let code = match &error {
            sqlx::Error::Database(db) => db
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "unknown".into()),
            _ => "driver".into(),
        };
        StoreError::Sql {
            code,
            message: error.to_string(),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(error: std::io::Error) -> Self {
        StoreError::Io(error.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
