//! Structured query trees, collectors and their outputs.
//!
//! Serialized with serde as externally tagged snake_case objects, e.g.
//! `{"match": {"value": "..."}}` or `{"top_docs": {"limit": 10, ...}}`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::QueryParserConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructuredQuery {
    All {},
    Match(MatchQuery),
    Term(TermQuery),
    Range(RangeQuery),
    Boolean(BooleanQuery),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchQuery {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_parser_config: Option<QueryParserConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermQuery {
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeQuery {
    pub field: String,
    pub value: RangeBounds,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeBounds {
    pub left: String,
    pub including_left: bool,
    pub right: String,
    pub including_right: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Occur {
    Should,
    Must,
    MustNot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BooleanSubquery {
    pub occur: Occur,
    pub query: StructuredQuery,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BooleanQuery {
    pub subqueries: Vec<BooleanSubquery>,
}

impl StructuredQuery {
    pub fn all() -> Self {
        StructuredQuery::All {}
    }

    pub fn matching(value: impl Into<String>, query_parser_config: Option<QueryParserConfig>) -> Self {
        StructuredQuery::Match(MatchQuery { value: value.into(), query_parser_config })
    }

    pub fn term(field: impl Into<String>, value: impl Into<String>) -> Self {
        StructuredQuery::Term(TermQuery { field: field.into(), value: value.into() })
    }

    /// `[left, right)`: lower bound included, upper bound excluded.
    pub fn half_open_range(field: impl Into<String>, left: impl ToString, right: impl ToString) -> Self {
        StructuredQuery::Range(RangeQuery {
            field: field.into(),
            value: RangeBounds {
                left: left.to_string(),
                including_left: true,
                right: right.to_string(),
                including_right: false,
            },
        })
    }

    pub fn boolean(subqueries: Vec<BooleanSubquery>) -> Self {
        StructuredQuery::Boolean(BooleanQuery { subqueries })
    }

    pub fn should(self) -> BooleanSubquery {
        BooleanSubquery { occur: Occur::Should, query: self }
    }

    pub fn must(self) -> BooleanSubquery {
        BooleanSubquery { occur: Occur::Must, query: self }
    }

    pub fn must_not(self) -> BooleanSubquery {
        BooleanSubquery { occur: Occur::MustNot, query: self }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scorer {
    OrderBy(String),
    EvalExpr(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopDocsCollector {
    pub offset: usize,
    pub limit: usize,
    #[serde(default)]
    pub snippet_configs: BTreeMap<String, usize>,
    /// Empty means no field restriction.
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scorer: Option<Scorer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservoirSamplingCollector {
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collector {
    TopDocs(TopDocsCollector),
    Count {},
    ReservoirSampling(ReservoirSamplingCollector),
}

impl Collector {
    pub fn count() -> Self {
        Collector::Count {}
    }

    pub fn reservoir_sampling(limit: usize) -> Self {
        Collector::ReservoirSampling(ReservoirSamplingCollector { limit })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub index_alias: String,
    pub query: StructuredQuery,
    pub collectors: Vec<Collector>,
    pub is_fieldnorms_scoring_enabled: bool,
    #[serde(default)]
    pub store_cache: bool,
    #[serde(default)]
    pub load_cache: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub index_alias: String,
    pub document: serde_json::Value,
    pub score: f64,
    pub position: usize,
    #[serde(default)]
    pub snippets: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomDocument {
    pub index_alias: String,
    pub document: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentsOutput {
    pub scored_documents: Vec<ScoredDocument>,
    pub has_next: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountOutput {
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservoirSamplingOutput {
    pub documents: Vec<RandomDocument>,
}

/// One result per request collector, in the same order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectorOutput {
    Documents(DocumentsOutput),
    Count(CountOutput),
    ReservoirSampling(ReservoirSamplingOutput),
}

impl CollectorOutput {
    pub fn count(&self) -> Option<u64> {
        match self {
            CollectorOutput::Count(c) => Some(c.count),
            _ => None,
        }
    }
}
