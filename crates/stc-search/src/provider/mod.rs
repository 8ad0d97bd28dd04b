//! Search providers: a common contract over a remote search API and a
//! locally bootstrapped collection.

pub mod local;
pub mod remote;
mod status;

use async_trait::async_trait;
use stc_core::query::{Collector, CollectorOutput, SearchRequest, StructuredQuery};
use stc_core::types::SearchOptions;
use tokio::sync::watch;

use crate::error::SearchError;
use local::LocalDistributedProvider;
use remote::RemoteProvider;

pub(crate) use status::Health;
pub use status::ProviderStatus;

/// A backend able to answer searches once it has been set up and checked.
///
/// `search` must only be called while the status is
/// [`ProviderStatus::Succeeded`]; implementations reject other states with
/// [`SearchError::ProviderNotReady`].
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;

    fn status(&self) -> ProviderStatus;

    fn watch_status(&self) -> watch::Receiver<ProviderStatus>;

    /// Why the last setup or healthcheck failed.
    fn failure_reason(&self) -> Option<String>;

    /// Whether a setup run has completed successfully.
    fn is_set_up(&self) -> bool;

    /// One-time preparation, ending with a healthcheck. Idempotent.
    async fn setup(&self) -> Result<(), SearchError>;

    /// Leaves the provider in `Succeeded` or `Failed`; never errors.
    async fn healthcheck(&self);

    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<CollectorOutput>, SearchError>;
}

/// Cheapest request a backend can answer: count everything.
pub(crate) fn probe_request(index_alias: &str) -> SearchRequest {
    SearchRequest {
        index_alias: index_alias.to_string(),
        query: StructuredQuery::all(),
        collectors: vec![Collector::count()],
        is_fieldnorms_scoring_enabled: false,
        store_cache: false,
        load_cache: false,
    }
}

pub(crate) fn ensure_ready(name: &str, status: ProviderStatus) -> Result<(), SearchError> {
    if status == ProviderStatus::Succeeded {
        Ok(())
    } else {
        Err(SearchError::ProviderNotReady { provider: name.to_string(), status })
    }
}

/// The provider kinds a [`crate::SearchService`] is assembled from.
pub enum Provider {
    Remote(RemoteProvider),
    LocalDistributed(LocalDistributedProvider),
}

impl Provider {
    pub fn kind(&self) -> &'static str {
        match self {
            Provider::Remote(_) => "remote",
            Provider::LocalDistributed(_) => "local",
        }
    }

    /// Download progress of the local bootstrap, `None` while idle.
    pub fn bootstrap_progress(&self) -> Option<watch::Receiver<Option<f64>>> {
        match self {
            Provider::Remote(_) => None,
            Provider::LocalDistributed(p) => Some(p.progress()),
        }
    }
}

#[async_trait]
impl SearchProvider for Provider {
    fn name(&self) -> &str {
        match self {
            Provider::Remote(p) => p.name(),
            Provider::LocalDistributed(p) => p.name(),
        }
    }

    fn status(&self) -> ProviderStatus {
        match self {
            Provider::Remote(p) => p.status(),
            Provider::LocalDistributed(p) => p.status(),
        }
    }

    fn watch_status(&self) -> watch::Receiver<ProviderStatus> {
        match self {
            Provider::Remote(p) => p.watch_status(),
            Provider::LocalDistributed(p) => p.watch_status(),
        }
    }

    fn failure_reason(&self) -> Option<String> {
        match self {
            Provider::Remote(p) => p.failure_reason(),
            Provider::LocalDistributed(p) => p.failure_reason(),
        }
    }

    fn is_set_up(&self) -> bool {
        match self {
            Provider::Remote(p) => p.is_set_up(),
            Provider::LocalDistributed(p) => p.is_set_up(),
        }
    }

    async fn setup(&self) -> Result<(), SearchError> {
        match self {
            Provider::Remote(p) => p.setup().await,
            Provider::LocalDistributed(p) => p.setup().await,
        }
    }

    async fn healthcheck(&self) {
        match self {
            Provider::Remote(p) => p.healthcheck().await,
            Provider::LocalDistributed(p) => p.healthcheck().await,
        }
    }

    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<CollectorOutput>, SearchError> {
        match self {
            Provider::Remote(p) => p.search(query, options).await,
            Provider::LocalDistributed(p) => p.search(query, options).await,
        }
    }
}
