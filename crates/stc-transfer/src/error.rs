use thiserror::Error;

/// Failure of one resource. Siblings in the same session keep downloading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("{url}: {status} {status_text}")]
    Status { url: String, status: u16, status_text: String },

    #[error("{url}: network error: {message}")]
    Network { url: String, message: String },

    #[error("{url}: download aborted")]
    Aborted { url: String },
}

impl TransferError {
    pub fn network(url: &str, err: impl std::fmt::Display) -> Self {
        TransferError::Network { url: url.to_string(), message: err.to_string() }
    }

    pub fn url(&self) -> &str {
        match self {
            TransferError::Status { url, .. }
            | TransferError::Network { url, .. }
            | TransferError::Aborted { url } => url,
        }
    }

    /// HTTP status, or 0 when the failure happened below HTTP.
    pub fn status(&self) -> u16 {
        match self {
            TransferError::Status { status, .. } => *status,
            _ => 0,
        }
    }

    pub fn status_text(&self) -> &str {
        match self {
            TransferError::Status { status_text, .. } => status_text,
            TransferError::Network { message, .. } => message,
            TransferError::Aborted { .. } => "aborted",
        }
    }
}
