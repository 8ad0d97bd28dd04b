use anyhow::{Context, Result};
use std::io::BufRead;
use std::path::PathBuf;
use tantivy::schema::Schema;
use tantivy::{Index, IndexWriter, TantivyDocument};
use tracing::info;

use crate::tantivy_utils::{build_schema, register_tokenizer};

/// Builds a catalog collection from JSON documents, one object per line.
pub struct CatalogIndexer {
	index: Index,
	schema: Schema,
}

impl CatalogIndexer {
	/// Recreates `index_dir` from scratch.
	pub fn create_in_dir(index_dir: PathBuf) -> Result<Self> {
		let schema = build_schema();
		if index_dir.exists() { std::fs::remove_dir_all(&index_dir)?; }
		std::fs::create_dir_all(&index_dir)?;
		let index = Index::create_in_dir(&index_dir, schema.clone())?;
		register_tokenizer(&index);
		Ok(Self { index, schema })
	}

	pub fn create_in_ram() -> Self {
		let schema = build_schema();
		let index = Index::create_in_ram(schema.clone());
		register_tokenizer(&index);
		Self { index, schema }
	}

	pub fn add_json_lines<R: BufRead>(&self, reader: R) -> Result<usize> {
		let mut writer: IndexWriter = self.index.writer(50_000_000)?;
		let mut count = 0;
		for (line_no, line) in reader.lines().enumerate() {
			let line = line?;
			if line.trim().is_empty() { continue; }
			let doc = TantivyDocument::parse_json(&self.schema, &line).with_context(|| format!("line {}", line_no + 1))?;
			writer.add_document(doc)?;
			count += 1;
		}
		writer.commit()?;
		info!(documents = count, "catalog documents indexed");
		Ok(count)
	}

	pub fn add_json_documents<'a, I: IntoIterator<Item = &'a str>>(&self, docs: I) -> Result<usize> {
		let joined = docs.into_iter().collect::<Vec<_>>().join("\n");
		self.add_json_lines(joined.as_bytes())
	}

	pub fn index(&self) -> &Index {
		&self.index
	}

	pub fn into_index(self) -> Index {
		self.index
	}
}
