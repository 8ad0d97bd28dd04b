//! Structured query trees mapped onto tantivy queries.

use std::fmt::Display;
use std::ops::Bound;
use std::str::FromStr;

use stc_core::query::{MatchQuery, Occur as QueryOccur, StructuredQuery};
use stc_core::types::QueryParserConfig;
use stc_core::{Error, Result};
use tantivy::query::{AllQuery, BooleanQuery, BoostQuery, Occur, PhraseQuery, Query, QueryParser, RangeQuery, TermQuery};
use tantivy::schema::{Field, FieldType, IndexRecordOption, Schema};
use tantivy::{DateTime, Index, Term};
use tracing::debug;

pub fn to_tantivy(index: &Index, query: &StructuredQuery) -> Result<Box<dyn Query>> {
	let schema = index.schema();
	match query {
		StructuredQuery::All {} => Ok(Box::new(AllQuery)),
		StructuredQuery::Match(m) => match_query(index, &schema, m),
		StructuredQuery::Term(t) => {
			let field = field(&schema, &t.field)?;
			let term = typed_term(&schema, field, &t.value)?;
			Ok(Box::new(TermQuery::new(term, IndexRecordOption::Basic)))
		}
		StructuredQuery::Range(r) => {
			let field = field(&schema, &r.field)?;
			let lower = bound(&schema, field, &r.value.left, r.value.including_left)?;
			let upper = bound(&schema, field, &r.value.right, r.value.including_right)?;
			Ok(Box::new(RangeQuery::new(lower, upper)))
		}
		StructuredQuery::Boolean(b) => {
			let clauses = b
				.subqueries
				.iter()
				.map(|sub| Ok((occur(sub.occur), to_tantivy(index, &sub.query)?)))
				.collect::<Result<Vec<_>>>()?;
			Ok(Box::new(BooleanQuery::new(clauses)))
		}
	}
}

fn occur(occur: QueryOccur) -> Occur {
	match occur {
		QueryOccur::Should => Occur::Should,
		QueryOccur::Must => Occur::Must,
		QueryOccur::MustNot => Occur::MustNot,
	}
}

fn field(schema: &Schema, name: &str) -> Result<Field> {
	schema.get_field(name).map_err(|_| Error::InvalidQuery(format!("unknown field '{name}'")))
}

fn parse<T: FromStr>(name: &str, value: &str) -> Result<T>
where
	T::Err: Display,
{
	value.trim().parse::<T>().map_err(|e| Error::InvalidQuery(format!("{name}: '{value}': {e}")))
}

fn typed_term(schema: &Schema, field: Field, value: &str) -> Result<Term> {
	let entry = schema.get_field_entry(field);
	let name = entry.name();
	match entry.field_type() {
		FieldType::Str(_) => Ok(Term::from_field_text(field, value)),
		FieldType::I64(_) => Ok(Term::from_field_i64(field, parse(name, value)?)),
		FieldType::U64(_) => Ok(Term::from_field_u64(field, parse(name, value)?)),
		FieldType::F64(_) => Ok(Term::from_field_f64(field, parse(name, value)?)),
		FieldType::Bool(_) => Ok(Term::from_field_bool(field, parse(name, value)?)),
		FieldType::Date(_) => Ok(Term::from_field_date(field, DateTime::from_timestamp_secs(parse(name, value)?))),
		other => Err(Error::InvalidQuery(format!("field '{name}' of type {:?} cannot be matched by value", other.value_type()))),
	}
}

fn bound(schema: &Schema, field: Field, value: &str, inclusive: bool) -> Result<Bound<Term>> {
	if value.is_empty() {
		return Ok(Bound::Unbounded);
	}
	let term = typed_term(schema, field, value)?;
	Ok(if inclusive { Bound::Included(term) } else { Bound::Excluded(term) })
}

/// Tokenized string fields only; `raw` fields hold identifiers and facets.
fn is_text_indexed(schema: &Schema, field: Field) -> bool {
	matches!(
		schema.get_field_entry(field).field_type(),
		FieldType::Str(opts) if opts.get_indexing_options().is_some_and(|i| i.tokenizer() != "raw")
	)
}

fn has_positions(schema: &Schema, field: Field) -> bool {
	match schema.get_field_entry(field).field_type() {
		FieldType::Str(opts) => opts.get_indexing_options().is_some_and(|i| i.index_option().has_positions()),
		_ => false,
	}
}

/// Configured default fields present in the schema, else every indexed text field.
fn default_fields(schema: &Schema, config: &QueryParserConfig) -> Vec<Field> {
	let removed = |name: &str| config.removed_fields.iter().any(|f| f == name);
	let configured: Vec<Field> = config
		.default_fields
		.iter()
		.filter(|name| !removed(name.as_str()))
		.filter_map(|name| schema.get_field(name).ok())
		.filter(|f| is_text_indexed(schema, *f))
		.collect();
	if !configured.is_empty() {
		return configured;
	}
	schema
		.fields()
		.filter(|(f, entry)| is_text_indexed(schema, *f) && !removed(entry.name()))
		.map(|(f, _)| f)
		.collect()
}

/// Rewrites `alias:value` tokens to their schema field and strips prefixes of removed fields.
fn rewrite_aliases(text: &str, config: &QueryParserConfig, schema: &Schema) -> String {
	text.split_whitespace()
		.map(|token| match token.split_once(':') {
			Some((prefix, rest)) if config.removed_fields.iter().any(|f| f == prefix) => rest.to_string(),
			Some((prefix, rest)) => {
				let target = config.resolve_field(prefix);
				if target != prefix && schema.get_field(target).is_ok() { format!("{target}:{rest}") } else { token.to_string() }
			}
			None => token.to_string(),
		})
		.collect::<Vec<_>>()
		.join(" ")
}

fn match_query(index: &Index, schema: &Schema, m: &MatchQuery) -> Result<Box<dyn Query>> {
	let config = m.query_parser_config.clone().unwrap_or_default();
	let fields = default_fields(schema, &config);
	if fields.is_empty() {
		return Err(Error::InvalidQuery("collection has no searchable text fields".to_string()));
	}
	let mut parser = QueryParser::for_index(index, fields);
	for (name, boost) in &config.field_boosts {
		if let Ok(field) = schema.get_field(name).or_else(|_| schema.get_field(config.resolve_field(name))) {
			parser.set_field_boost(field, *boost);
		}
	}
	let text = rewrite_aliases(&m.value, &config, schema);
	let (parsed, errors) = parser.parse_query_lenient(&text);
	if !errors.is_empty() {
		debug!(?errors, query = %text, "lenient parse dropped clauses");
	}
	match exact_match_promotion(index, schema, &config, &m.value) {
		Some(promoted) => Ok(Box::new(BooleanQuery::new(vec![(Occur::Must, parsed), (Occur::Should, promoted)]))),
		None => Ok(parsed),
	}
}

/// Boosts documents whose promoter fields contain the query words as a phrase.
fn exact_match_promotion(index: &Index, schema: &Schema, config: &QueryParserConfig, text: &str) -> Option<Box<dyn Query>> {
	let promoter = config.exact_matches_promoter.as_ref()?;
	let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
	for name in &promoter.fields {
		let Ok(field) = schema.get_field(name) else { continue };
		if !has_positions(schema, field) { continue; }
		let Ok(mut analyzer) = index.tokenizer_for_field(field) else { continue };
		let mut terms = Vec::new();
		analyzer.token_stream(text).process(&mut |token| terms.push(Term::from_field_text(field, &token.text)));
		if terms.len() < 2 { continue; }
		let mut phrase = PhraseQuery::new(terms);
		phrase.set_slop(promoter.slop);
		clauses.push((Occur::Should, Box::new(BoostQuery::new(Box::new(phrase), promoter.boost))));
	}
	if clauses.is_empty() { None } else { Some(Box::new(BooleanQuery::new(clauses))) }
}
