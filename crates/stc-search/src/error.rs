use std::sync::Arc;

use stc_store::StoreError;
use stc_transfer::TransferError;
use thiserror::Error;

use crate::provider::ProviderStatus;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Transfer failed: {0}")]
    Transfer(#[from] TransferError),

    #[error("Segment manifest error: {0}")]
    Manifest(String),

    #[error("Provider '{provider}' setup failed: {source}")]
    ProviderSetup { provider: String, source: Arc<SearchError> },

    #[error("All search providers failed: {reason}")]
    AllProvidersFailed { reason: String },

    #[error("No active search provider")]
    NoActiveProvider,

    #[error("Provider '{provider}' is not ready (status: {status})")]
    ProviderNotReady { provider: String, status: ProviderStatus },

    #[error("Unknown provider index {0}")]
    UnknownProvider(usize),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Remote search failed: {status} {message}")]
    Remote { status: u16, message: String },

    #[error(transparent)]
    Core(#[from] stc_core::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
