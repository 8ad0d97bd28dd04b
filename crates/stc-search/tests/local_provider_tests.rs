use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use stc_core::profile::{default_index_configs, BackendProfile};
use stc_core::query::{CollectorOutput, CountOutput, SearchRequest};
use stc_core::types::{IndexConfig, SearchOptions};
use stc_core::IndexEngine;
use stc_search::manifest::SEGMENT_COMPONENTS;
use stc_search::{LocalDistributedProvider, LocalSetup, ProviderStatus, SearchError, SearchProvider, SegmentManifest};
use stc_store::MetaStore;
use stc_text::{CatalogIndexer, TantivyEngine};
use stc_transfer::{Fetcher, ProgressSink, TransferError, TransferTracker};
use tempfile::TempDir;

const DATA: &str = "http://data.test";
const SEGMENT: &str = "0a1b2c3d-4e5f-6071-8293-a4b5c6d7e8f9";
const OTHER_SEGMENT: &str = "ffffffff-0000-0000-0000-000000000000";
const DEL_FILE: &str = "0a1b2c3d4e5f60718293a4b5c6d7e8f9.3.del";

const DOCS: &[&str] = &[
    r#"{"id":"1","title":"Black holes and time warps","abstract":"Gravity bends light","languages":["en"],"type":"book","issued_at":1000}"#,
    r#"{"id":"4","title":"Cooking with cast iron","languages":["en"],"type":"book","issued_at":4000}"#,
];

#[derive(Default)]
struct FakeFetcher {
    files: Mutex<HashMap<String, Vec<u8>>>,
    requested: Mutex<Vec<String>>,
}

impl FakeFetcher {
    fn serve(&self, file: &str, body: &[u8]) {
        self.files.lock().unwrap().insert(format!("{DATA}/nexus_science/{file}"), body.to_vec());
    }

    /// Serves every regular file of a collection directory under its own name.
    fn serve_dir(&self, dir: &std::path::Path) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_file() {
                self.serve(path.file_name().unwrap().to_str().unwrap(), &std::fs::read(&path).unwrap());
            }
        }
    }

    fn requests_for(&self, file: &str) -> usize {
        self.requested.lock().unwrap().iter().filter(|u| u.ends_with(file)).count()
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, url: &str, progress: &ProgressSink) -> Result<Vec<u8>, TransferError> {
        self.requested.lock().unwrap().push(url.to_string());
        tokio::time::sleep(Duration::from_millis(10)).await;
        let body = self.files.lock().unwrap().get(url).cloned();
        match body {
            Some(body) => {
                progress.update(body.len() as u64, Some(body.len() as u64));
                Ok(body)
            }
            None => Err(TransferError::Status { url: url.to_string(), status: 404, status_text: "Not Found".into() }),
        }
    }
}

/// Registers a collection only if its manifest landed on disk.
struct FakeEngine {
    root: PathBuf,
    registered: Mutex<Vec<String>>,
}

#[async_trait]
impl IndexEngine for FakeEngine {
    async fn register(&self, config: &IndexConfig) -> stc_core::Result<()> {
        let manifest = self.root.join(&config.index_name).join("meta.json");
        if !manifest.is_file() {
            return Err(stc_core::Error::Engine(format!("{} missing", manifest.display())));
        }
        self.registered.lock().unwrap().push(config.index_name.clone());
        Ok(())
    }

    async fn search(&self, request: &SearchRequest) -> stc_core::Result<Vec<CollectorOutput>> {
        if self.registered.lock().unwrap().contains(&request.index_alias) {
            Ok(vec![CollectorOutput::Count(CountOutput { count: 42 })])
        } else {
            Err(stc_core::Error::NotFound(request.index_alias.clone()))
        }
    }
}

struct Fixture {
    tmp: TempDir,
    fetcher: Arc<FakeFetcher>,
    store: Arc<MetaStore>,
    provider: LocalDistributedProvider,
}

impl Fixture {
    fn segments_dir(&self) -> PathBuf {
        self.tmp.path().join("segments")
    }
}

fn manifest() -> String {
    format!(
        r#"{{"opstamp": 7, "segments": [
            {{"segment_id": "{SEGMENT}", "max_doc": 4, "deletes": {{"num_deleted_docs": 1, "opstamp": 3}}}},
            {{"segment_id": "{OTHER_SEGMENT}", "max_doc": 2, "deletes": null}}
        ]}}"#
    )
}

fn serve_collection(fetcher: &FakeFetcher) {
    fetcher.serve("meta.json", manifest().as_bytes());
    for segment in [SEGMENT, OTHER_SEGMENT] {
        for ext in SEGMENT_COMPONENTS {
            fetcher.serve(&format!("{}.{ext}", segment.replace('-', "")), ext.as_bytes());
        }
    }
    fetcher.serve(DEL_FILE, b"deletes");
    fetcher.serve("hotcache.7.bin", b"hot");
}

/// Provider over `<tmp>/segments`, the way startup wires it under the cache dir.
fn provider_in(tmp: TempDir, fetcher: Arc<FakeFetcher>, engine: impl FnOnce(PathBuf) -> Arc<dyn IndexEngine>) -> Fixture {
    let store = Arc::new(MetaStore::in_memory().unwrap());
    let configs = default_index_configs(DATA);
    store.install_default_index_configs(&configs).unwrap();
    let index_config = configs.into_iter().find(|c| c.index_name == "nexus_science").unwrap();

    let segments_dir = tmp.path().join("segments");
    let setup = LocalSetup {
        name: "IPFS".into(),
        profile: BackendProfile::for_index(&index_config).with_page_size(5),
        index_config,
        segments_dir: segments_dir.clone(),
        healthcheck_timeout: Duration::from_secs(5),
        store: Some(Arc::clone(&store)),
    };
    let tracker = TransferTracker::new(Arc::clone(&fetcher) as Arc<dyn Fetcher>);
    let provider = LocalDistributedProvider::new(setup, tracker, engine(segments_dir));
    Fixture { tmp, fetcher, store, provider }
}

fn fake_engine(root: PathBuf) -> Arc<dyn IndexEngine> {
    Arc::new(FakeEngine { root, registered: Mutex::new(Vec::new()) })
}

fn fixture() -> Fixture {
    let fetcher = Arc::new(FakeFetcher::default());
    serve_collection(&fetcher);
    provider_in(TempDir::new().unwrap(), fetcher, fake_engine)
}

#[tokio::test]
async fn bootstrap_downloads_manifest_files_and_becomes_healthy() -> anyhow::Result<()> {
    let f = fixture();
    assert_eq!(f.provider.status(), ProviderStatus::NotSetup);
    f.provider.setup().await?;

    assert_eq!(f.provider.status(), ProviderStatus::Succeeded);
    assert!(f.provider.is_set_up());
    let dir = f.segments_dir().join("nexus_science");
    assert_eq!(f.provider.collection_dir(), dir);
    for file in ["meta.json", DEL_FILE, "hotcache.7.bin", "ffffffff000000000000000000000000.term"] {
        assert!(dir.join(file).is_file(), "{file} written");
    }
    assert_eq!(std::fs::read(dir.join("hotcache.7.bin"))?, b"hot");
    assert!(f.store.get_index_config("nexus_science")?.is_some());
    assert_eq!(*f.provider.progress().borrow(), None);

    let outputs = f.provider.search("black holes", &SearchOptions::page(1)).await?;
    assert_eq!(outputs[0].count(), Some(42));

    f.provider.setup().await?;
    assert_eq!(f.fetcher.requests_for("meta.json"), 1, "setup is idempotent");
    Ok(())
}

#[tokio::test]
async fn bootstrap_replicates_a_real_collection() -> anyhow::Result<()> {
    let source = TempDir::new()?;
    let collection = source.path().join("nexus_science");
    let indexer = CatalogIndexer::create_in_dir(collection.clone())?;
    indexer.add_json_documents(DOCS.iter().copied())?;
    drop(indexer);

    let manifest = SegmentManifest::from_slice(&std::fs::read(collection.join("meta.json"))?)?;
    std::fs::write(collection.join(manifest.hotcache_file()), b"hot")?;
    let fetcher = Arc::new(FakeFetcher::default());
    fetcher.serve_dir(&collection);

    let f = provider_in(TempDir::new()?, fetcher, |root| Arc::new(TantivyEngine::new(root)) as Arc<dyn IndexEngine>);
    f.provider.setup().await?;
    assert_eq!(f.provider.status(), ProviderStatus::Succeeded);
    for file in manifest.replica_files() {
        assert_eq!(f.fetcher.requests_for(&file), 1, "{file} fetched once");
    }

    let outputs = f.provider.search("cooking", &SearchOptions::page(1)).await?;
    assert_eq!(outputs[1].count(), Some(1));
    Ok(())
}

#[tokio::test]
async fn concurrent_setup_runs_one_bootstrap() -> anyhow::Result<()> {
    let f = fixture();
    let (a, b) = tokio::join!(f.provider.setup(), f.provider.setup());
    a?;
    b?;
    assert_eq!(f.fetcher.requests_for("meta.json"), 1);
    assert_eq!(f.fetcher.requests_for("hotcache.7.bin"), 1);
    Ok(())
}

#[tokio::test]
async fn failed_bootstrap_discards_state_and_retries_cleanly() -> anyhow::Result<()> {
    let f = fixture();
    f.fetcher.files.lock().unwrap().retain(|url, _| !url.ends_with("hotcache.7.bin"));
    let dir = f.segments_dir().join("nexus_science");
    std::fs::create_dir_all(&dir)?;
    std::fs::write(dir.join("stale.bin"), b"old")?;

    let err = f.provider.setup().await.unwrap_err();
    match &err {
        SearchError::ProviderSetup { provider, source } => {
            assert_eq!(provider, "IPFS");
            assert!(matches!(&**source, SearchError::Transfer(t) if t.status() == 404));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(f.provider.status(), ProviderStatus::Failed);
    assert!(f.provider.failure_reason().is_some());
    assert!(!f.provider.is_set_up());
    assert!(!dir.exists(), "cached segments removed");
    assert!(f.store.get_index_config("nexus_science")?.is_none(), "stored config dropped");

    f.fetcher.serve("hotcache.7.bin", b"hot");
    f.provider.setup().await?;
    assert_eq!(f.provider.status(), ProviderStatus::Succeeded);
    assert_eq!(f.fetcher.requests_for("meta.json"), 2);
    assert!(f.store.get_index_config("nexus_science")?.is_some());
    Ok(())
}

#[tokio::test]
async fn unreachable_manifest_is_a_manifest_error() {
    let f = provider_in(TempDir::new().unwrap(), Arc::new(FakeFetcher::default()), fake_engine);
    let err = f.provider.setup().await.unwrap_err();
    match &err {
        SearchError::ProviderSetup { source, .. } => {
            assert!(matches!(&**source, SearchError::Manifest(m) if m.contains("meta.json")), "{source:?}");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(f.provider.status(), ProviderStatus::Failed);
    assert_eq!(f.fetcher.requests_for("hotcache.7.bin"), 0);
}

#[tokio::test]
async fn failed_bootstrap_leaves_ingested_collection_alone() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let ingested = tmp.path().join("nexus_science");
    let indexer = CatalogIndexer::create_in_dir(ingested.clone())?;
    indexer.add_json_documents(DOCS.iter().copied())?;
    drop(indexer);
    let meta_before = std::fs::read(ingested.join("meta.json"))?;

    let f = provider_in(tmp, Arc::new(FakeFetcher::default()), fake_engine);
    assert!(f.provider.setup().await.is_err());
    assert_ne!(f.provider.collection_dir(), ingested);
    assert_eq!(std::fs::read(ingested.join("meta.json"))?, meta_before);

    let offline = TantivyEngine::new(f.tmp.path().to_path_buf());
    let config = f.store.get_index_config("nexus_free")?.expect("default config");
    let config = IndexConfig { index_name: "nexus_science".into(), ..config };
    offline.register(&config).await?;
    let request = stc_core::compiler::build_request("cooking", &SearchOptions::page(1), &BackendProfile::nexus_science());
    assert_eq!(offline.search(&request).await?[1].count(), Some(1));
    Ok(())
}

#[tokio::test]
async fn search_before_setup_is_rejected() {
    let f = fixture();
    let err = f.provider.search("q", &SearchOptions::page(1)).await.unwrap_err();
    assert!(matches!(err, SearchError::ProviderNotReady { status: ProviderStatus::NotSetup, .. }));

    f.provider.healthcheck().await;
    assert_eq!(f.provider.status(), ProviderStatus::Failed);
}
