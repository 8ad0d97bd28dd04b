//! Turns free text and user-facing search options into a structured query
//! and the collector list a backend should run. Pure; no I/O.

use crate::profile::BackendProfile;
use crate::query::{Collector, Scorer, SearchRequest, StructuredQuery, TopDocsCollector};
use crate::types::{SearchOptions, SortMode};

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub query: StructuredQuery,
    pub collectors: Vec<Collector>,
}

pub fn compile(free_text: &str, options: &SearchOptions, profile: &BackendProfile) -> CompiledQuery {
    CompiledQuery {
        query: compile_query(free_text, options, profile),
        collectors: compile_collectors(options, profile),
    }
}

/// Filters are OR-ed with the text match at the outer level; a category
/// contributes one nested group regardless of how many types it expands to.
pub fn compile_query(free_text: &str, options: &SearchOptions, profile: &BackendProfile) -> StructuredQuery {
    let text = free_text.trim();
    let text_query = (!text.is_empty())
        .then(|| StructuredQuery::matching(text, profile.query_parser_config.clone()));

    if !options.has_filters() {
        return text_query.unwrap_or_else(StructuredQuery::all);
    }

    let mut subqueries = Vec::new();
    if let Some(q) = text_query {
        subqueries.push(q.should());
    }
    if let Some(language) = &options.language {
        subqueries.push(StructuredQuery::term(&profile.language_field, language).should());
    }
    if let Some(category) = options.category {
        let group = category
            .type_values()
            .iter()
            .map(|value| StructuredQuery::term(&profile.type_field, *value).should())
            .collect();
        subqueries.push(StructuredQuery::boolean(group).should());
    }
    if let Some(range) = options.timerange {
        subqueries.push(StructuredQuery::half_open_range(&profile.temporal_field, range.from, range.to).should());
    }
    StructuredQuery::boolean(subqueries)
}

pub fn compile_collectors(options: &SearchOptions, profile: &BackendProfile) -> Vec<Collector> {
    let page_size = options.page_size.unwrap_or(profile.default_page_size);
    if options.random {
        return vec![Collector::reservoir_sampling(page_size), Collector::count()];
    }

    let page = options.page.max(1) as usize;
    let scorer = match options.sort {
        SortMode::Date => Some(Scorer::OrderBy(profile.temporal_field.clone())),
        SortMode::Relevance => profile
            .ranking_formula
            .map(|formula| Scorer::EvalExpr(formula.expression(&profile.temporal_field))),
    };
    let top_docs = TopDocsCollector {
        offset: (page - 1) * page_size,
        limit: page_size,
        snippet_configs: profile.snippet_configs.clone(),
        fields: options.fields.clone().unwrap_or_default(),
        scorer,
    };
    vec![Collector::TopDocs(top_docs), Collector::count()]
}

pub fn build_request(free_text: &str, options: &SearchOptions, profile: &BackendProfile) -> SearchRequest {
    let CompiledQuery { query, collectors } = compile(free_text, options, profile);
    SearchRequest {
        index_alias: profile.index_alias.clone(),
        query,
        collectors,
        is_fieldnorms_scoring_enabled: profile.is_fieldnorms_scoring_enabled,
        store_cache: true,
        load_cache: true,
    }
}
