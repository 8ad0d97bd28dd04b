use std::sync::Arc;

use stc_core::config::Settings;
use stc_search::{build_service, Provider};
use stc_store::MetaStore;
use stc_text::TantivyEngine;
use tempfile::TempDir;

#[tokio::test]
async fn local_replica_lives_under_segments_dir() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let mut settings = Settings::default();
    settings.local.cache_dir = "cache".into();
    let engine = Arc::new(TantivyEngine::new(settings.segments_dir(tmp.path())));

    let service = build_service(&settings, tmp.path(), Arc::new(MetaStore::in_memory()?), engine)?;
    let local = service
        .providers()
        .iter()
        .find_map(|p| match p {
            Provider::LocalDistributed(local) => Some(local),
            _ => None,
        })
        .expect("local provider enabled by default");

    assert_eq!(local.collection_dir(), tmp.path().join("cache/segments/nexus_science"));
    assert_ne!(local.collection_dir(), settings.cache_dir(tmp.path()).join("nexus_science"));
    Ok(())
}
