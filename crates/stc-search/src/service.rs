//! Provider registry: probes providers in priority order, keeps the first
//! healthy one active and routes searches to it.

use std::sync::Arc;
use std::time::Instant;

use stc_core::query::CollectorOutput;
use stc_core::types::{SearchMetric, SearchOptions};
use stc_store::MetaStore;
use tokio::sync::{watch, OnceCell};
use tracing::{debug, error, info, warn};

use crate::error::SearchError;
use crate::provider::{Provider, ProviderStatus, SearchProvider};

pub struct SearchService<P = Provider> {
    providers: Vec<P>,
    active: watch::Sender<Option<usize>>,
    failure_reason: watch::Sender<Option<String>>,
    init: OnceCell<()>,
    store: Option<Arc<MetaStore>>,
}

impl<P: SearchProvider> SearchService<P> {
    /// `providers` in priority order, highest first.
    pub fn new(providers: Vec<P>) -> Self {
        let (active, _) = watch::channel(None);
        let (failure_reason, _) = watch::channel(None);
        Self { providers, active, failure_reason, init: OnceCell::new(), store: None }
    }

    /// Records the wall time of every successful search.
    pub fn with_store(mut self, store: Arc<MetaStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn providers(&self) -> &[P] {
        &self.providers
    }

    pub fn active_index(&self) -> Option<usize> {
        *self.active.borrow()
    }

    pub fn active_provider(&self) -> Option<&P> {
        self.active_index().and_then(|ix| self.providers.get(ix))
    }

    pub fn watch_active(&self) -> watch::Receiver<Option<usize>> {
        self.active.subscribe()
    }

    pub fn failure_reason(&self) -> Option<String> {
        self.failure_reason.borrow().clone()
    }

    pub fn watch_failure_reason(&self) -> watch::Receiver<Option<String>> {
        self.failure_reason.subscribe()
    }

    /// Runs provider selection once; later and concurrent callers wait on the
    /// same run.
    pub async fn setup(&self) {
        self.init.get_or_init(|| self.select_provider()).await;
    }

    async fn select_provider(&self) {
        let mut last_error = None;
        for (index, provider) in self.providers.iter().enumerate() {
            info!(provider = %provider.name(), "setting up search provider");
            if let Err(e) = provider.setup().await {
                warn!(provider = %provider.name(), error = %e, "provider setup failed, trying next");
                last_error = Some(e.to_string());
                continue;
            }
            let status = provider.status();
            if status == ProviderStatus::Succeeded {
                info!(provider = %provider.name(), "search provider active");
                self.failure_reason.send_replace(None);
                self.active.send_replace(Some(index));
                return;
            }
            let reason = provider
                .failure_reason()
                .unwrap_or_else(|| format!("provider '{}' is {status}", provider.name()));
            warn!(provider = %provider.name(), %reason, "provider unhealthy, trying next");
            last_error = Some(reason);
        }
        let reason = last_error.unwrap_or_else(|| "no search providers configured".to_string());
        error!(%reason, "no search provider available");
        self.failure_reason.send_replace(Some(reason));
    }

    pub async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<CollectorOutput>, SearchError> {
        self.setup().await;
        let provider = self.active_provider().ok_or_else(|| match self.failure_reason() {
            Some(reason) => SearchError::AllProvidersFailed { reason },
            None => SearchError::NoActiveProvider,
        })?;

        let started = Instant::now();
        let outputs = provider.search(query, options).await?;
        let spent = started.elapsed().as_secs_f64();
        debug!(provider = %provider.name(), spent, "search finished");
        if let Some(store) = &self.store {
            if let Err(e) = store.add_search_metric(&SearchMetric::new(spent)) {
                warn!(error = %e, "failed to record search metric");
            }
        }
        Ok(outputs)
    }

    /// Switches to the provider at `index` if it proves healthy; otherwise the
    /// current provider stays active. Returns whether the switch happened.
    pub async fn change_provider(&self, index: usize) -> Result<bool, SearchError> {
        self.setup().await;
        let provider = self.providers.get(index).ok_or(SearchError::UnknownProvider(index))?;
        if provider.is_set_up() {
            provider.healthcheck().await;
        } else {
            provider.setup().await?;
        }
        if provider.status() != ProviderStatus::Succeeded {
            warn!(provider = %provider.name(), status = %provider.status(), "provider not promoted");
            return Ok(false);
        }
        info!(provider = %provider.name(), "search provider switched");
        self.failure_reason.send_replace(None);
        self.active.send_replace(Some(index));
        Ok(true)
    }
}
