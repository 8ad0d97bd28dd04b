use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store transaction failed: {0}")]
    Transaction(String),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Index config '{0}' already exists")]
    AlreadyExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub(crate) fn txn_err<E: Into<redb::Error>>(e: E) -> StoreError {
    StoreError::Transaction(e.into().to_string())
}
