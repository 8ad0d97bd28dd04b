use tantivy::schema::{IndexRecordOption, Schema, TextFieldIndexing, TextOptions, FAST, INDEXED, STORED, STRING};
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer};
use tantivy::Index;

pub const CATALOG_TOKENIZER: &str = "catalog_text";

/// Schema of a locally built catalog collection.
pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	let text_indexing = TextFieldIndexing::default().set_tokenizer(CATALOG_TOKENIZER).set_index_option(IndexRecordOption::WithFreqsAndPositions);
	let text_options = TextOptions::default().set_indexing_options(text_indexing).set_stored();
	schema_builder.add_text_field("id", STRING | STORED);
	schema_builder.add_text_field("title", text_options.clone());
	schema_builder.add_text_field("abstract", text_options.clone());
	schema_builder.add_text_field("content", text_options.clone());
	schema_builder.add_text_field("authors", text_options);
	schema_builder.add_text_field("languages", STRING | STORED);
	schema_builder.add_text_field("type", STRING | STORED);
	schema_builder.add_text_field("doi", STRING | STORED);
	schema_builder.add_i64_field("issued_at", INDEXED | FAST | STORED);
	schema_builder.add_i64_field("quantized_page_rank", FAST | STORED);
	schema_builder.build()
}

pub fn register_tokenizer(index: &Index) {
	let stop_words = vec![
		"a","an","and","are","as","at","be","by","for","from","has","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","their","there","so","if","when","where","which","who",
	];
	let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(LowerCaser)
		.filter(StopWordFilter::remove(stop_words.into_iter().map(|s| s.to_string())))
		.build();
	index.tokenizers().register(CATALOG_TOKENIZER, tokenizer);
}
