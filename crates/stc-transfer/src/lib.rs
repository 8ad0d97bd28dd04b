//! stc-transfer
//!
//! Concurrent downloads of a resource set with one aggregate progress signal.
//! See `tracker` for sessions and `fetcher` for the HTTP implementation.
pub mod error;
pub mod fetcher;
pub mod tracker;

pub use error::TransferError;
pub use fetcher::{Fetcher, HttpFetcher, Payload};
pub use tracker::{
    aggregate_percent, ProgressSink, ResourceHandle, TransferEvent, TransferMonitor, TransferSession,
    TransferTracker,
};
