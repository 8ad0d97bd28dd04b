//! Assembles the provider registry from settings.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use stc_core::config::Settings;
use stc_core::profile::{default_index_configs, BackendProfile};
use stc_core::types::{IndexConfig, IndexProperties, Seed};
use stc_core::IndexEngine;
use stc_store::MetaStore;
use stc_transfer::TransferTracker;
use tracing::info;

use crate::error::SearchError;
use crate::provider::local::{LocalDistributedProvider, LocalSetup};
use crate::provider::remote::{HttpSearchTransport, RemoteProvider};
use crate::provider::Provider;
use crate::service::SearchService;

/// Remote providers first, in configured order, then the local collection.
///
/// Installs the default collection configs into `store` if they are missing.
/// `engine` must be rooted at [`Settings::segments_dir`], where the local
/// provider keeps its replicas apart from ingested collections.
pub fn build_service(
    settings: &Settings,
    base_dir: &Path,
    store: Arc<MetaStore>,
    engine: Arc<dyn IndexEngine>,
) -> Result<SearchService, SearchError> {
    let installed = store.install_default_index_configs(&default_index_configs(&settings.local.data_url))?;
    if installed > 0 {
        info!(installed, "default collection configs installed");
    }

    let mut providers = Vec::new();
    for remote in &settings.remote {
        let profile = BackendProfile::for_alias(&remote.index_name)
            .ok_or_else(|| stc_core::Error::InvalidConfig(format!("unknown remote collection '{}'", remote.index_name)))?
            .with_page_size(remote.page_size);
        let transport = HttpSearchTransport::new(&remote.base_url)?;
        providers.push(Provider::Remote(RemoteProvider::new(
            remote.name.clone(),
            profile,
            Arc::new(transport),
            Duration::from_secs(remote.healthcheck_timeout_secs),
        )));
    }

    let local = &settings.local;
    if local.enabled {
        let index_config = match store.get_index_config(&local.index_name)? {
            Some(config) => config,
            None => seeded_config(&local.index_name, &local.data_url, local.cache_size),
        };
        if index_config.index_properties.is_enabled {
            let profile = BackendProfile::for_index(&index_config).with_page_size(local.page_size);
            let setup = LocalSetup {
                name: local.name.clone(),
                index_config,
                profile,
                segments_dir: settings.segments_dir(base_dir),
                healthcheck_timeout: Duration::from_secs(local.healthcheck_timeout_secs),
                store: Some(Arc::clone(&store)),
            };
            providers.push(Provider::LocalDistributed(LocalDistributedProvider::new(setup, TransferTracker::http()?, engine)));
        } else {
            info!(index = %local.index_name, "local collection disabled");
        }
    }

    Ok(SearchService::new(providers).with_store(store))
}

fn seeded_config(index_name: &str, data_url: &str, cache_size: u64) -> IndexConfig {
    let seed = Seed::new(format!("{}/{index_name}", data_url.trim_end_matches('/')), cache_size);
    IndexConfig {
        index_name: index_name.to_string(),
        remote_engine_config: seed.remote_engine_config(),
        query_parser_config: Default::default(),
        index_properties: IndexProperties {
            is_enabled: true,
            is_fieldnorms_scoring_enabled: false,
            is_temporal_scoring_enabled: false,
            is_exact_matches_promoted: false,
        },
        created_at: Utc::now(),
    }
}
