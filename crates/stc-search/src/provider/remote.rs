use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use stc_core::compiler::build_request;
use stc_core::profile::BackendProfile;
use stc_core::query::{CollectorOutput, SearchRequest};
use stc_core::types::SearchOptions;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::Url;

use super::{ensure_ready, probe_request, Health, ProviderStatus, SearchProvider};
use crate::error::SearchError;

/// Carries a structured request to a search backend.
#[async_trait]
pub trait SearchTransport: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<CollectorOutput>, SearchError>;
}

#[derive(Deserialize)]
struct SearchResponse {
    collector_outputs: Vec<CollectorOutput>,
}

/// JSON over HTTP: `POST <base_url>/search`.
pub struct HttpSearchTransport {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpSearchTransport {
    pub fn new(base_url: &str) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("stc-search/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| SearchError::InvalidEndpoint(e.to_string()))?;
        Self::with_client(client, base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self, SearchError> {
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let endpoint = Url::parse(&base)
            .and_then(|base| base.join("search"))
            .map_err(|e| SearchError::InvalidEndpoint(format!("{base_url}: {e}")))?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl SearchTransport for HttpSearchTransport {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<CollectorOutput>, SearchError> {
        let remote_err = |e: reqwest::Error| SearchError::Remote {
            status: e.status().map_or(0, |s| s.as_u16()),
            message: e.to_string(),
        };
        let response = self.client.post(self.endpoint.clone()).json(request).send().await.map_err(remote_err)?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SearchError::Remote { status: status.as_u16(), message });
        }
        let body: SearchResponse = response.json().await.map_err(remote_err)?;
        Ok(body.collector_outputs)
    }
}

/// A search API reachable over the network. Setup is just a healthcheck.
pub struct RemoteProvider {
    name: String,
    profile: BackendProfile,
    transport: Arc<dyn SearchTransport>,
    healthcheck_timeout: Duration,
    health: Health,
    set_up: AtomicBool,
}

impl RemoteProvider {
    pub fn new(
        name: impl Into<String>,
        profile: BackendProfile,
        transport: Arc<dyn SearchTransport>,
        healthcheck_timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            profile,
            transport,
            healthcheck_timeout,
            health: Health::new(),
            set_up: AtomicBool::new(false),
        }
    }

    pub fn profile(&self) -> &BackendProfile {
        &self.profile
    }
}

#[async_trait]
impl SearchProvider for RemoteProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> ProviderStatus {
        self.health.status()
    }

    fn watch_status(&self) -> watch::Receiver<ProviderStatus> {
        self.health.subscribe()
    }

    fn failure_reason(&self) -> Option<String> {
        self.health.failure_reason()
    }

    fn is_set_up(&self) -> bool {
        self.set_up.load(Ordering::Acquire)
    }

    async fn setup(&self) -> Result<(), SearchError> {
        self.healthcheck().await;
        self.set_up.store(true, Ordering::Release);
        Ok(())
    }

    async fn healthcheck(&self) {
        self.health.set(ProviderStatus::Checking);
        let probe = probe_request(&self.profile.index_alias);
        match tokio::time::timeout(self.healthcheck_timeout, self.transport.search(&probe)).await {
            Ok(Ok(_)) => {
                info!(provider = %self.name, "remote provider healthy");
                self.health.succeed();
            }
            Ok(Err(e)) => {
                warn!(provider = %self.name, error = %e, "remote healthcheck failed");
                self.health.fail(e.to_string());
            }
            Err(_) => {
                warn!(provider = %self.name, timeout = ?self.healthcheck_timeout, "remote healthcheck timed out");
                self.health.fail(format!("healthcheck timed out after {:?}", self.healthcheck_timeout));
            }
        }
    }

    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<CollectorOutput>, SearchError> {
        ensure_ready(&self.name, self.status())?;
        let request = build_request(query, options, &self.profile);
        debug!(provider = %self.name, index = %request.index_alias, "remote search");
        self.transport.search(&request).await
    }
}
