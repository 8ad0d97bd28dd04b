use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use rand::seq::IteratorRandom;
use serde_json::Value as JsonValue;
use stc_core::profile::RankingFormula;
use stc_core::query::{
	Collector, CollectorOutput, CountOutput, DocumentsOutput, RandomDocument, ReservoirSamplingOutput, ScoredDocument, Scorer,
	SearchRequest, TopDocsCollector,
};
use stc_core::types::IndexConfig;
use stc_core::{Error, IndexEngine, Result};
use tantivy::collector::{Count, DocSetCollector, TopDocs};
use tantivy::query::Query;
use tantivy::schema::Schema;
use tantivy::snippet::SnippetGenerator;
use tantivy::{DocAddress, DocId, Document as _, Index, IndexReader, Score, Searcher, SegmentReader, TantivyDocument};
use tracing::{debug, info};

use crate::query::to_tantivy;
use crate::tantivy_utils::register_tokenizer;

const DECAY_SCALE_SECS: f64 = 86400.0 * 3.0;
const PAGE_RANK_FIELD: &str = "quantized_page_rank";

fn engine_err(e: impl std::fmt::Display) -> Error {
	Error::Engine(e.to_string())
}

/// Sigmoid falloff over document age: close to 1 when fresh, 0.5 at fifteen days.
pub fn temporal_decay(age_secs: f64) -> f64 {
	1.0 / (1.0 + (age_secs / DECAY_SCALE_SECS - 5.0).exp())
}

/// Saturating weight over a quantized (0..=255) page rank.
pub fn authority(quantized_page_rank: Option<i64>) -> f64 {
	match quantized_page_rank {
		Some(rank) => {
			let x = (rank as f64 / 255.0).clamp(0.0, 1.0);
			1.96 * x / (0.15 + x)
		}
		None => 1.0,
	}
}

struct Collection {
	index: Index,
	reader: IndexReader,
}

/// Collections registered by name; each one is an on-disk or in-RAM tantivy index.
pub struct TantivyEngine {
	root: PathBuf,
	collections: RwLock<HashMap<String, Arc<Collection>>>,
}

impl TantivyEngine {
	/// `root` holds one directory per collection.
	pub fn new(root: PathBuf) -> Self {
		Self { root, collections: RwLock::new(HashMap::new()) }
	}

	pub fn attach(&self, name: &str, index: Index) -> Result<()> {
		register_tokenizer(&index);
		let reader = index.reader().map_err(engine_err)?;
		self.collections
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.insert(name.to_string(), Arc::new(Collection { index, reader }));
		Ok(())
	}

	pub fn is_registered(&self, name: &str) -> bool {
		self.collections.read().unwrap_or_else(PoisonError::into_inner).contains_key(name)
	}

	fn collection(&self, name: &str) -> Result<Arc<Collection>> {
		self.collections
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.get(name)
			.cloned()
			.ok_or_else(|| Error::NotFound(format!("collection '{name}' is not registered")))
	}

	/// Runs a request on the calling thread.
	pub fn search_blocking(&self, request: &SearchRequest) -> Result<Vec<CollectorOutput>> {
		let collection = self.collection(&request.index_alias)?;
		execute(&collection, request)
	}
}

#[async_trait]
impl IndexEngine for TantivyEngine {
	async fn register(&self, config: &IndexConfig) -> Result<()> {
		let dir = self.root.join(&config.index_name);
		let index = Index::open_in_dir(&dir).map_err(engine_err)?;
		self.attach(&config.index_name, index)?;
		info!(index = %config.index_name, dir = %dir.display(), "collection registered");
		Ok(())
	}

	async fn search(&self, request: &SearchRequest) -> Result<Vec<CollectorOutput>> {
		let collection = self.collection(&request.index_alias)?;
		let request = request.clone();
		tokio::task::spawn_blocking(move || execute(&collection, &request)).await.map_err(engine_err)?
	}
}

fn execute(collection: &Collection, request: &SearchRequest) -> Result<Vec<CollectorOutput>> {
	collection.reader.reload().map_err(engine_err)?;
	let searcher = collection.reader.searcher();
	let query = to_tantivy(&collection.index, &request.query)?;
	request
		.collectors
		.iter()
		.map(|collector| match collector {
			Collector::Count {} => {
				let count = searcher.search(&*query, &Count).map_err(engine_err)?;
				Ok(CollectorOutput::Count(CountOutput { count: count as u64 }))
			}
			Collector::TopDocs(top) => top_docs(&searcher, &*query, top, &request.index_alias),
			Collector::ReservoirSampling(sampling) => reservoir_sampling(&searcher, &*query, sampling.limit, &request.index_alias),
		})
		.collect()
}

fn ranked_hits(searcher: &Searcher, query: &dyn Query, top: &TopDocsCollector) -> Result<Vec<(f64, DocAddress)>> {
	if top.limit == 0 {
		return Ok(Vec::new());
	}
	let collector = TopDocs::with_limit(top.limit).and_offset(top.offset);
	match &top.scorer {
		None => {
			let hits = searcher.search(query, &collector).map_err(engine_err)?;
			Ok(hits.into_iter().map(|(score, addr)| (f64::from(score), addr)).collect())
		}
		Some(Scorer::OrderBy(field)) => {
			// Descending by the fast field; documents without a value sort last.
			let field = field.clone();
			let by_value = move |segment_reader: &SegmentReader| {
				let values = segment_reader.fast_fields().i64(&field).ok();
				move |doc: DocId, _score: Score| values.as_ref().and_then(|column| column.first(doc)).map_or(f64::MIN, |v| v as f64)
			};
			searcher.search(query, &collector.tweak_score(by_value)).map_err(engine_err)
		}
		Some(Scorer::EvalExpr(expr)) => {
			let (formula, field) = RankingFormula::recognize(expr)
				.ok_or_else(|| Error::InvalidQuery(format!("unsupported scorer expression '{expr}'")))?;
			let now = chrono::Utc::now().timestamp();
			let tweaker = move |segment_reader: &SegmentReader| {
				let fast_fields = segment_reader.fast_fields();
				let timestamps = fast_fields.i64(&field).ok();
				let ranks = fast_fields.i64(PAGE_RANK_FIELD).ok();
				move |doc: DocId, score: Score| {
					let decay = timestamps
						.as_ref()
						.and_then(|column| column.first(doc))
						.map_or(1.0, |t| temporal_decay((now - t).abs() as f64));
					let mut tweaked = f64::from(score) * decay;
					if formula == RankingFormula::AuthorityTemporalDecay {
						tweaked *= authority(ranks.as_ref().and_then(|column| column.first(doc)));
					}
					tweaked
				}
			};
			searcher.search(query, &collector.tweak_score(tweaker)).map_err(engine_err)
		}
	}
}

fn snippet_generators(searcher: &Searcher, query: &dyn Query, configs: &BTreeMap<String, usize>) -> Vec<(String, SnippetGenerator)> {
	let schema = searcher.schema();
	configs
		.iter()
		.filter_map(|(name, max_chars)| {
			let field = schema.get_field(name).ok()?;
			let mut generator = match SnippetGenerator::create(searcher, query, field) {
				Ok(generator) => generator,
				Err(e) => {
					debug!(field = %name, error = %e, "no snippets for field");
					return None;
				}
			};
			generator.set_max_num_chars(*max_chars);
			Some((name.clone(), generator))
		})
		.collect()
}

fn flatten_single(value: JsonValue) -> JsonValue {
	match value {
		JsonValue::Array(mut items) if items.len() == 1 => items.remove(0),
		other => other,
	}
}

/// Stored fields as a JSON object, restricted to `fields` unless it is empty.
fn document_json(doc: &TantivyDocument, schema: &Schema, fields: &[String]) -> Result<JsonValue> {
	let JsonValue::Object(map) = serde_json::from_str::<JsonValue>(&doc.to_json(schema)).map_err(engine_err)? else {
		return Err(Error::Engine("stored document is not a JSON object".to_string()));
	};
	let map = map
		.into_iter()
		.filter(|(name, _)| fields.is_empty() || fields.iter().any(|f| f == name))
		.map(|(name, value)| (name, flatten_single(value)))
		.collect();
	Ok(JsonValue::Object(map))
}

fn top_docs(searcher: &Searcher, query: &dyn Query, top: &TopDocsCollector, index_alias: &str) -> Result<CollectorOutput> {
	let total = searcher.search(query, &Count).map_err(engine_err)?;
	let hits = ranked_hits(searcher, query, top)?;
	let has_next = top.offset + hits.len() < total;
	let generators = snippet_generators(searcher, query, &top.snippet_configs);
	let schema = searcher.schema();

	let mut scored_documents = Vec::with_capacity(hits.len());
	for (i, (score, address)) in hits.into_iter().enumerate() {
		let doc: TantivyDocument = searcher.doc(address).map_err(engine_err)?;
		let snippets = generators
			.iter()
			.filter_map(|(name, generator)| {
				let snippet = generator.snippet_from_doc(&doc);
				(!snippet.fragment().is_empty()).then(|| (name.clone(), snippet.to_html()))
			})
			.collect();
		scored_documents.push(ScoredDocument {
			index_alias: index_alias.to_string(),
			document: document_json(&doc, schema, &top.fields)?,
			score,
			position: top.offset + i,
			snippets,
		});
	}
	Ok(CollectorOutput::Documents(DocumentsOutput { scored_documents, has_next }))
}

fn reservoir_sampling(searcher: &Searcher, query: &dyn Query, limit: usize, index_alias: &str) -> Result<CollectorOutput> {
	let matched = searcher.search(query, &DocSetCollector).map_err(engine_err)?;
	let sample = matched.into_iter().choose_multiple(&mut rand::thread_rng(), limit);
	let schema = searcher.schema();
	let mut documents = Vec::with_capacity(sample.len());
	for address in sample {
		let doc: TantivyDocument = searcher.doc(address).map_err(engine_err)?;
		documents.push(RandomDocument { index_alias: index_alias.to_string(), document: document_json(&doc, schema, &[])? });
	}
	Ok(CollectorOutput::ReservoirSampling(ReservoirSamplingOutput { documents }))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn decay_halves_at_fifteen_days() {
		assert!(temporal_decay(0.0) > 0.99);
		assert!((temporal_decay(15.0 * 86400.0) - 0.5).abs() < 1e-9);
		assert!(temporal_decay(365.0 * 86400.0) < 1e-6);
	}

	#[test]
	fn authority_is_neutral_without_rank() {
		assert_eq!(authority(None), 1.0);
		assert_eq!(authority(Some(0)), 0.0);
		assert!(authority(Some(255)) > 1.7);
	}
}
