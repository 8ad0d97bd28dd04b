//! stc-search
//!
//! Search providers (remote API, locally bootstrapped index) and the registry
//! that probes them in priority order and routes every search to the active one.
pub mod error;
pub mod manifest;
pub mod provider;
pub mod service;
pub mod startup;

pub use error::SearchError;
pub use manifest::SegmentManifest;
pub use provider::local::{LocalDistributedProvider, LocalSetup};
pub use provider::remote::{HttpSearchTransport, RemoteProvider, SearchTransport};
pub use provider::{Provider, ProviderStatus, SearchProvider};
pub use service::SearchService;
pub use startup::build_service;
