use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Mapping error: {0}")]
    Mapping(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Reconciliation error: {0}")]
    Reconciliation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<sqlx::Error> for IngestError {
    fn from(err: sqlx::Error) -> Self {
        IngestError::Database(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
