use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::profile::Category;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub cache_size: u64,
}

/// Connection descriptor the index engine uses to reach segment files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEngineConfig {
    pub method: String,
    /// Contains a `{file_name}` placeholder.
    pub url_template: String,
    #[serde(default)]
    pub headers_template: BTreeMap<String, String>,
    pub cache_config: CacheConfig,
}

impl RemoteEngineConfig {
    pub fn file_url(&self, file_name: &str) -> String {
        self.url_template.replace("{file_name}", file_name)
    }
}

/// Base location of a collection's data, resolved into a [`RemoteEngineConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seed {
    pub base_url: String,
    pub cache_config: CacheConfig,
}

impl Seed {
    pub fn new(base_url: impl Into<String>, cache_size: u64) -> Self {
        Self { base_url: base_url.into(), cache_config: CacheConfig { cache_size } }
    }

    pub fn remote_engine_config(&self) -> RemoteEngineConfig {
        let base = self.base_url.trim_end_matches('/');
        let mut headers_template = BTreeMap::new();
        headers_template.insert("range".to_string(), "bytes={start}-{end}".to_string());
        RemoteEngineConfig {
            method: "GET".to_string(),
            url_template: format!("{base}/{{file_name}}"),
            headers_template,
            cache_config: self.cache_config,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermFieldMapperConfig {
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExactMatchesPromoter {
    pub slop: u32,
    pub boost: f32,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryParserConfig {
    pub field_aliases: BTreeMap<String, String>,
    pub field_boosts: BTreeMap<String, f32>,
    pub term_field_mapper_configs: BTreeMap<String, TermFieldMapperConfig>,
    pub term_limit: u32,
    pub default_fields: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exact_matches_promoter: Option<ExactMatchesPromoter>,
    pub removed_fields: Vec<String>,
}

impl QueryParserConfig {
    /// Resolves a user-facing field name through the alias table.
    pub fn resolve_field<'a>(&'a self, name: &'a str) -> &'a str {
        self.field_aliases.get(name).map_or(name, String::as_str)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexProperties {
    pub is_enabled: bool,
    pub is_fieldnorms_scoring_enabled: bool,
    pub is_temporal_scoring_enabled: bool,
    #[serde(default)]
    pub is_exact_matches_promoted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    pub index_name: String,
    pub remote_engine_config: RemoteEngineConfig,
    pub query_parser_config: QueryParserConfig,
    pub index_properties: IndexProperties,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub index_name: String,
    pub query: String,
    pub created_at: DateTime<Utc>,
}

impl Bookmark {
    pub fn new(index_name: impl Into<String>, query: impl Into<String>) -> Self {
        Self { index_name: index_name.into(), query: query.into(), created_at: Utc::now() }
    }
}

/// One search latency sample; `spent` is in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchMetric {
    pub spent: f64,
    pub created_at: DateTime<Utc>,
}

impl SearchMetric {
    pub fn new(spent: f64) -> Self {
        Self { spent, created_at: Utc::now() }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortMode {
    #[default]
    Relevance,
    Date,
}

/// Half-open `[from, to)` interval of unix timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub from: i64,
    pub to: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOptions {
    /// 1-indexed; 0 is read as 1.
    pub page: u32,
    pub page_size: Option<usize>,
    /// `None` means every stored field is eligible.
    pub fields: Option<Vec<String>>,
    pub language: Option<String>,
    pub category: Option<Category>,
    pub timerange: Option<TimeRange>,
    pub sort: SortMode,
    pub random: bool,
}

impl SearchOptions {
    pub fn page(page: u32) -> Self {
        Self { page, ..Self::default() }
    }

    pub fn has_filters(&self) -> bool {
        self.language.is_some() || self.category.is_some() || self.timerange.is_some()
    }
}
