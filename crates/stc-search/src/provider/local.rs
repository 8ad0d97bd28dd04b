//! A collection bootstrapped from segment files served over HTTP and opened
//! by a local index engine.
//!
//! Bootstrap: read the segment manifest, download the segment components,
//! deletion logs and hot cache it implies, write them under
//! `<segments_dir>/<index_name>`, register the collection with the engine,
//! persist its config, then healthcheck. Any failure removes the replica and
//! the stored config so the next attempt starts from nothing.
//!
//! `segments_dir` only ever holds replicas written here, so a failed bootstrap
//! never touches collections ingested elsewhere under the cache directory.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use stc_core::compiler::build_request;
use stc_core::profile::BackendProfile;
use stc_core::query::CollectorOutput;
use stc_core::types::{IndexConfig, SearchOptions};
use stc_core::IndexEngine;
use stc_store::{MetaStore, StoreError};
use stc_transfer::{Payload, TransferTracker};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{ensure_ready, probe_request, Health, ProviderStatus, SearchProvider};
use crate::error::SearchError;
use crate::manifest::{SegmentManifest, MANIFEST_FILE};

type SetupFuture = Shared<BoxFuture<'static, Result<(), Arc<SearchError>>>>;

pub struct LocalSetup {
    pub name: String,
    pub index_config: IndexConfig,
    pub profile: BackendProfile,
    /// Parent of the per-collection replica directories; also the engine's root.
    pub segments_dir: PathBuf,
    pub healthcheck_timeout: Duration,
    pub store: Option<Arc<MetaStore>>,
}

struct LocalInner {
    setup: LocalSetup,
    tracker: TransferTracker,
    engine: Arc<dyn IndexEngine>,
    health: Health,
    progress: watch::Sender<Option<f64>>,
    bootstrapped: AtomicBool,
}

pub struct LocalDistributedProvider {
    inner: Arc<LocalInner>,
    setup_guard: Mutex<Option<SetupFuture>>,
}

impl LocalDistributedProvider {
    pub fn new(setup: LocalSetup, tracker: TransferTracker, engine: Arc<dyn IndexEngine>) -> Self {
        let (progress, _) = watch::channel(None);
        let inner = LocalInner {
            setup,
            tracker,
            engine,
            health: Health::new(),
            progress,
            bootstrapped: AtomicBool::new(false),
        };
        Self { inner: Arc::new(inner), setup_guard: Mutex::new(None) }
    }

    /// Aggregate download percentage while a bootstrap is fetching files.
    pub fn progress(&self) -> watch::Receiver<Option<f64>> {
        self.inner.progress.subscribe()
    }

    pub fn collection_dir(&self) -> PathBuf {
        self.inner.collection_dir()
    }
}

impl LocalInner {
    fn name(&self) -> &str {
        &self.setup.name
    }

    fn collection_dir(&self) -> PathBuf {
        self.setup.segments_dir.join(&self.setup.index_config.index_name)
    }

    async fn bootstrap(&self) -> Result<(), SearchError> {
        info!(
            provider = %self.name(),
            index = %self.setup.index_config.index_name,
            "bootstrapping local collection"
        );
        self.health.set(ProviderStatus::Checking);
        match self.try_bootstrap().await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(provider = %self.name(), error = %e, "bootstrap failed, dropping stored data");
                self.discard().await;
                self.progress.send_replace(None);
                self.health.fail(e.to_string());
                Err(e)
            }
        }
    }

    async fn try_bootstrap(&self) -> Result<(), SearchError> {
        let remote = &self.setup.index_config.remote_engine_config;
        let manifest_url = remote.file_url(MANIFEST_FILE);
        let manifest_bytes = self
            .tracker
            .start([manifest_url.clone()])
            .try_join_all()
            .await
            .map_err(|e| SearchError::Manifest(format!("cannot fetch {manifest_url}: {e}")))?
            .into_iter()
            .next()
            .map(|(_, payload)| payload)
            .ok_or_else(|| SearchError::Manifest("manifest was not downloaded".to_string()))?;
        let manifest = SegmentManifest::from_slice(&manifest_bytes)?;

        let files = manifest.replica_files();
        debug!(provider = %self.name(), files = files.len(), opstamp = manifest.opstamp, "segment manifest loaded");
        let payloads = self.download(files.iter().map(|f| remote.file_url(f)).collect()).await?;

        let dir = self.collection_dir();
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(MANIFEST_FILE), &*manifest_bytes).await?;
        for (file, payload) in files.iter().zip(&payloads) {
            tokio::fs::write(dir.join(file), &**payload).await?;
        }

        self.engine.register(&self.setup.index_config).await?;
        if let Some(store) = &self.setup.store {
            match store.save_index_config(&self.setup.index_config) {
                Ok(()) | Err(StoreError::AlreadyExists(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        self.bootstrapped.store(true, Ordering::Release);
        self.progress.send_replace(None);
        self.health.set(ProviderStatus::NotChecked);
        info!(provider = %self.name(), dir = %dir.display(), "local collection ready");
        self.healthcheck().await;
        Ok(())
    }

    /// Fetches every URL concurrently, relaying the aggregate percentage.
    async fn download(&self, urls: Vec<String>) -> Result<Vec<Payload>, SearchError> {
        self.progress.send_replace(Some(0.0));
        let (handles, monitor) = self.tracker.start(urls).into_parts();
        let mut percent = monitor.subscribe();
        drop(monitor);

        // Ends once every download task has dropped the session.
        let relay = async {
            loop {
                let current = *percent.borrow_and_update();
                self.progress.send_replace(Some(current));
                if percent.changed().await.is_err() {
                    break;
                }
            }
        };
        let joins = async {
            let mut outcomes = Vec::with_capacity(handles.len());
            for handle in handles {
                outcomes.push(handle.join().await);
            }
            outcomes
        };
        let ((), outcomes) = tokio::join!(relay, joins);
        Ok(outcomes.into_iter().collect::<Result<Vec<_>, _>>()?)
    }

    async fn discard(&self) {
        self.bootstrapped.store(false, Ordering::Release);
        let dir = self.collection_dir();
        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(dir = %dir.display(), error = %e, "failed to remove cached segments");
            }
        }
        if let Some(store) = &self.setup.store {
            if let Err(e) = store.delete_index_config(&self.setup.index_config.index_name) {
                warn!(index = %self.setup.index_config.index_name, error = %e, "failed to drop stored index config");
            }
        }
    }

    async fn healthcheck(&self) {
        self.health.set(ProviderStatus::Checking);
        if !self.bootstrapped.load(Ordering::Acquire) {
            self.health.fail("collection has not been bootstrapped");
            return;
        }
        let probe = probe_request(&self.setup.profile.index_alias);
        match tokio::time::timeout(self.setup.healthcheck_timeout, self.engine.search(&probe)).await {
            Ok(Ok(_)) => self.health.succeed(),
            Ok(Err(e)) => {
                warn!(provider = %self.name(), error = %e, "local healthcheck failed");
                self.health.fail(e.to_string());
            }
            Err(_) => {
                warn!(provider = %self.name(), "local healthcheck timed out");
                self.health.fail(format!("healthcheck timed out after {:?}", self.setup.healthcheck_timeout));
            }
        }
    }
}

#[async_trait]
impl SearchProvider for LocalDistributedProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn status(&self) -> ProviderStatus {
        self.inner.health.status()
    }

    fn watch_status(&self) -> watch::Receiver<ProviderStatus> {
        self.inner.health.subscribe()
    }

    fn failure_reason(&self) -> Option<String> {
        self.inner.health.failure_reason()
    }

    fn is_set_up(&self) -> bool {
        self.inner.bootstrapped.load(Ordering::Acquire)
    }

    /// Concurrent callers share one bootstrap; a failed one is forgotten so the
    /// next call starts over.
    async fn setup(&self) -> Result<(), SearchError> {
        let future = {
            let mut guard = self.setup_guard.lock().unwrap_or_else(PoisonError::into_inner);
            match guard.as_ref() {
                Some(running) => running.clone(),
                None => {
                    let inner = Arc::clone(&self.inner);
                    let fresh = async move { inner.bootstrap().await.map_err(Arc::new) }.boxed().shared();
                    *guard = Some(fresh.clone());
                    fresh
                }
            }
        };
        let outcome = future.clone().await;
        if outcome.is_err() {
            let mut guard = self.setup_guard.lock().unwrap_or_else(PoisonError::into_inner);
            if guard.as_ref().is_some_and(|current| current.ptr_eq(&future)) {
                *guard = None;
            }
        }
        outcome.map_err(|source| SearchError::ProviderSetup { provider: self.inner.name().to_string(), source })
    }

    async fn healthcheck(&self) {
        self.inner.healthcheck().await;
    }

    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<CollectorOutput>, SearchError> {
        ensure_ready(self.name(), self.status())?;
        let request = build_request(query, options, &self.inner.setup.profile);
        Ok(self.inner.engine.search(&request).await?)
    }
}

