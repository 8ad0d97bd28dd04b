//! Redb-backed metadata store.
//!
//! # Tables
//!
//! - `index_configs`: index_name -> IndexConfig (JSON)
//! - `bookmarks`: (index_name, query) -> Bookmark (JSON)
//! - `search_metrics`: insertion sequence (u64) -> SearchMetric (JSON)
//! - `schema_versions`: collection name -> version
//!
//! Index configs form the "meta" collection; bookmarks and metrics form the
//! "user" collection. Each has its own schema version and a mismatch on open
//! resets only that collection.

use std::path::Path;

use redb::backends::InMemoryBackend;
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition, WriteTransaction};
use stc_core::types::{Bookmark, IndexConfig, SearchMetric};
use tracing::{debug, info, warn};

use crate::error::{txn_err, StoreError};

const INDEX_CONFIGS: TableDefinition<&str, &[u8]> = TableDefinition::new("index_configs");
const BOOKMARKS: TableDefinition<(&str, &str), &[u8]> = TableDefinition::new("bookmarks");
const SEARCH_METRICS: TableDefinition<u64, &[u8]> = TableDefinition::new("search_metrics");
const SCHEMA_VERSIONS: TableDefinition<&str, u64> = TableDefinition::new("schema_versions");

pub const META_SCHEMA_VERSION: u64 = 8;
pub const USER_SCHEMA_VERSION: u64 = 8;
/// Number of latency samples kept after every insert.
pub const METRICS_RETENTION: usize = 100;

type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, Copy)]
enum Collection {
    Meta,
    User,
}

impl Collection {
    fn key(self) -> &'static str {
        match self {
            Collection::Meta => "meta",
            Collection::User => "user",
        }
    }

    fn version(self) -> u64 {
        match self {
            Collection::Meta => META_SCHEMA_VERSION,
            Collection::User => USER_SCHEMA_VERSION,
        }
    }

    fn reset(self, txn: &WriteTransaction) -> Result<()> {
        match self {
            Collection::Meta => {
                txn.delete_table(INDEX_CONFIGS).map_err(txn_err)?;
            }
            Collection::User => {
                txn.delete_table(BOOKMARKS).map_err(txn_err)?;
                txn.delete_table(SEARCH_METRICS).map_err(txn_err)?;
            }
        }
        Ok(())
    }

    fn create_tables(self, txn: &WriteTransaction) -> Result<()> {
        match self {
            Collection::Meta => {
                txn.open_table(INDEX_CONFIGS).map_err(txn_err)?;
            }
            Collection::User => {
                txn.open_table(BOOKMARKS).map_err(txn_err)?;
                txn.open_table(SEARCH_METRICS).map_err(txn_err)?;
            }
        }
        Ok(())
    }
}

pub struct MetaStore {
    db: Database,
}

impl MetaStore {
    /// Opens or creates the store file, creating parent directories.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(txn_err)?;
        info!(path = %path.display(), "metadata store opened");
        Self::init(db)
    }

    pub fn in_memory() -> Result<Self> {
        let db = Database::builder()
            .create_with_backend(InMemoryBackend::new())
            .map_err(txn_err)?;
        Self::init(db)
    }

    fn init(db: Database) -> Result<Self> {
        let store = Self { db };
        store.migrate(Collection::Meta)?;
        store.migrate(Collection::User)?;
        Ok(store)
    }

    fn migrate(&self, collection: Collection) -> Result<()> {
        let txn = self.db.begin_write().map_err(txn_err)?;
        {
            let mut versions = txn.open_table(SCHEMA_VERSIONS).map_err(txn_err)?;
            let stored = versions.get(collection.key()).map_err(txn_err)?.map(|v| v.value());
            if let Some(stored) = stored.filter(|v| *v != collection.version()) {
                warn!(
                    collection = collection.key(),
                    stored,
                    current = collection.version(),
                    "schema version changed, resetting collection"
                );
                collection.reset(&txn)?;
            }
            versions.insert(collection.key(), collection.version()).map_err(txn_err)?;
            collection.create_tables(&txn)?;
        }
        txn.commit().map_err(txn_err)
    }

    /// Stored schema version of a collection (`"meta"` or `"user"`).
    pub fn schema_version(&self, collection: &str) -> Result<Option<u64>> {
        let txn = self.db.begin_read().map_err(txn_err)?;
        let table = txn.open_table(SCHEMA_VERSIONS).map_err(txn_err)?;
        let version = table.get(collection).map_err(txn_err)?.map(|v| v.value());
        Ok(version)
    }

    // Index configs

    /// Fails with [`StoreError::AlreadyExists`] when the name is taken.
    pub fn save_index_config(&self, config: &IndexConfig) -> Result<()> {
        let bytes = serde_json::to_vec(config)?;
        let txn = self.db.begin_write().map_err(txn_err)?;
        {
            let mut table = txn.open_table(INDEX_CONFIGS).map_err(txn_err)?;
            if table.get(config.index_name.as_str()).map_err(txn_err)?.is_some() {
                return Err(StoreError::AlreadyExists(config.index_name.clone()));
            }
            table.insert(config.index_name.as_str(), bytes.as_slice()).map_err(txn_err)?;
        }
        txn.commit().map_err(txn_err)
    }

    pub fn get_index_config(&self, index_name: &str) -> Result<Option<IndexConfig>> {
        let txn = self.db.begin_read().map_err(txn_err)?;
        let table = txn.open_table(INDEX_CONFIGS).map_err(txn_err)?;
        match table.get(index_name).map_err(txn_err)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// All configs ordered by index name.
    pub fn list_index_configs(&self) -> Result<Vec<IndexConfig>> {
        let txn = self.db.begin_read().map_err(txn_err)?;
        let table = txn.open_table(INDEX_CONFIGS).map_err(txn_err)?;
        let mut configs = Vec::new();
        for entry in table.iter().map_err(txn_err)? {
            let (_, value) = entry.map_err(txn_err)?;
            configs.push(serde_json::from_slice(value.value())?);
        }
        Ok(configs)
    }

    /// Returns whether a config was removed.
    pub fn delete_index_config(&self, index_name: &str) -> Result<bool> {
        let txn = self.db.begin_write().map_err(txn_err)?;
        let removed = {
            let mut table = txn.open_table(INDEX_CONFIGS).map_err(txn_err)?;
            let removed = table.remove(index_name).map_err(txn_err)?.is_some();
            removed
        };
        txn.commit().map_err(txn_err)?;
        Ok(removed)
    }

    pub fn set_index_enabled(&self, index_name: &str, enabled: bool) -> Result<()> {
        let txn = self.db.begin_write().map_err(txn_err)?;
        {
            let mut table = txn.open_table(INDEX_CONFIGS).map_err(txn_err)?;
            let current: IndexConfig = match table.get(index_name).map_err(txn_err)? {
                Some(guard) => serde_json::from_slice(guard.value())?,
                None => return Err(StoreError::NotFound(index_name.to_string())),
            };
            let mut updated = current;
            updated.index_properties.is_enabled = enabled;
            let bytes = serde_json::to_vec(&updated)?;
            table.insert(index_name, bytes.as_slice()).map_err(txn_err)?;
        }
        txn.commit().map_err(txn_err)
    }

    /// Inserts every config whose name is not stored yet, in one transaction.
    /// Returns how many were installed.
    pub fn install_default_index_configs(&self, defaults: &[IndexConfig]) -> Result<usize> {
        let txn = self.db.begin_write().map_err(txn_err)?;
        let mut installed = 0;
        {
            let mut table = txn.open_table(INDEX_CONFIGS).map_err(txn_err)?;
            for config in defaults {
                let name = config.index_name.as_str();
                if table.get(name).map_err(txn_err)?.is_some() {
                    continue;
                }
                let bytes = serde_json::to_vec(config)?;
                table.insert(name, bytes.as_slice()).map_err(txn_err)?;
                installed += 1;
            }
        }
        txn.commit().map_err(txn_err)?;
        if installed > 0 {
            info!(installed, "default index configs installed");
        }
        Ok(installed)
    }

    // Bookmarks

    /// Upserts by `(index_name, query)`.
    pub fn add_bookmark(&self, bookmark: &Bookmark) -> Result<()> {
        let bytes = serde_json::to_vec(bookmark)?;
        let txn = self.db.begin_write().map_err(txn_err)?;
        {
            let mut table = txn.open_table(BOOKMARKS).map_err(txn_err)?;
            table
                .insert((bookmark.index_name.as_str(), bookmark.query.as_str()), bytes.as_slice())
                .map_err(txn_err)?;
        }
        txn.commit().map_err(txn_err)
    }

    pub fn has_bookmark(&self, index_name: &str, query: &str) -> Result<bool> {
        let txn = self.db.begin_read().map_err(txn_err)?;
        let table = txn.open_table(BOOKMARKS).map_err(txn_err)?;
        let found = table.get((index_name, query)).map_err(txn_err)?.is_some();
        Ok(found)
    }

    pub fn delete_bookmark(&self, index_name: &str, query: &str) -> Result<bool> {
        let txn = self.db.begin_write().map_err(txn_err)?;
        let removed = {
            let mut table = txn.open_table(BOOKMARKS).map_err(txn_err)?;
            let removed = table.remove((index_name, query)).map_err(txn_err)?.is_some();
            removed
        };
        txn.commit().map_err(txn_err)?;
        Ok(removed)
    }

    /// Newest first.
    pub fn list_bookmarks(&self) -> Result<Vec<Bookmark>> {
        let txn = self.db.begin_read().map_err(txn_err)?;
        let table = txn.open_table(BOOKMARKS).map_err(txn_err)?;
        let mut bookmarks: Vec<Bookmark> = Vec::new();
        for entry in table.iter().map_err(txn_err)? {
            let (_, value) = entry.map_err(txn_err)?;
            bookmarks.push(serde_json::from_slice(value.value())?);
        }
        bookmarks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookmarks)
    }

    // Search metrics

    /// Appends a sample and evicts everything beyond the newest
    /// [`METRICS_RETENTION`] entries in the same transaction.
    pub fn add_search_metric(&self, metric: &SearchMetric) -> Result<()> {
        let bytes = serde_json::to_vec(metric)?;
        let txn = self.db.begin_write().map_err(txn_err)?;
        {
            let mut table = txn.open_table(SEARCH_METRICS).map_err(txn_err)?;
            let next = match table.last().map_err(txn_err)? {
                Some((key, _)) => key.value() + 1,
                None => 0,
            };
            table.insert(next, bytes.as_slice()).map_err(txn_err)?;

            let len = usize::try_from(table.len().map_err(txn_err)?).unwrap_or(usize::MAX);
            let excess = len.saturating_sub(METRICS_RETENTION);
            if excess > 0 {
                let mut evicted = Vec::with_capacity(excess);
                for entry in table.iter().map_err(txn_err)?.take(excess) {
                    let (key, _) = entry.map_err(txn_err)?;
                    evicted.push(key.value());
                }
                for key in evicted {
                    table.remove(key).map_err(txn_err)?;
                }
                debug!(excess, "search metrics trimmed");
            }
        }
        txn.commit().map_err(txn_err)
    }

    pub fn search_metric_count(&self) -> Result<usize> {
        let txn = self.db.begin_read().map_err(txn_err)?;
        let table = txn.open_table(SEARCH_METRICS).map_err(txn_err)?;
        let len = table.len().map_err(txn_err)?;
        Ok(usize::try_from(len).unwrap_or(usize::MAX))
    }

    /// Up to `n` most recent samples, newest first.
    pub fn recent_search_metrics(&self, n: usize) -> Result<Vec<SearchMetric>> {
        let txn = self.db.begin_read().map_err(txn_err)?;
        let table = txn.open_table(SEARCH_METRICS).map_err(txn_err)?;
        let mut metrics = Vec::with_capacity(n.min(METRICS_RETENTION));
        for entry in table.iter().map_err(txn_err)?.rev().take(n) {
            let (_, value) = entry.map_err(txn_err)?;
            metrics.push(serde_json::from_slice(value.value())?);
        }
        Ok(metrics)
    }

    /// Mean `spent` over the `n` most recent samples; `None` when fewer than
    /// `n` samples exist (or `n` is 0).
    pub fn average_spent(&self, n: usize) -> Result<Option<f64>> {
        if n == 0 {
            return Ok(None);
        }
        let recent = self.recent_search_metrics(n)?;
        if recent.len() < n {
            return Ok(None);
        }
        let total: f64 = recent.iter().map(|m| m.spent).sum();
        Ok(Some(total / n as f64))
    }
}
