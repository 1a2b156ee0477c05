use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Mutex;

use tantivy::collector::DocSetCollector;
use tantivy::directory::MmapDirectory;
use tantivy::query::AllQuery;
use tantivy::schema::Value;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tracing::debug;

use newsdb_core::traits::TextIndexer;
use newsdb_core::types::{ChunkBatch, SearchHit};
use newsdb_core::{Error, Result};

use crate::search::Matching;
use crate::tantivy_utils::{build_schema, fields, register_tokenizer, Fields};

const WRITER_BUDGET: usize = 50_000_000;

/// Tantivy-backed keyword index over chunks.
pub struct KeywordIndex {
	pub(crate) index: Index,
	pub(crate) reader: IndexReader,
	pub(crate) fields: Fields,
	writer: Mutex<IndexWriter>,
}

impl KeywordIndex {
	/// Opens the index in `index_dir`, creating it on first use.
	pub fn open(index_dir: &Path) -> Result<Self> {
		std::fs::create_dir_all(index_dir)?;
		let dir = MmapDirectory::open(index_dir).map_err(Error::storage)?;
		let index = Index::open_or_create(dir, build_schema()).map_err(|e| Error::IndexCorruption(format!("keyword index at {}: {e}", index_dir.display())))?;
		Self::from_index(index)
	}

	pub fn in_memory() -> Result<Self> {
		Self::from_index(Index::create_in_ram(build_schema()))
	}

	fn from_index(index: Index) -> Result<Self> {
		register_tokenizer(&index);
		let fields = fields(&index.schema())?;
		let writer: IndexWriter = index.writer_with_num_threads(1, WRITER_BUDGET).map_err(Error::storage)?;
		let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into().map_err(Error::storage)?;
		Ok(Self { index, reader, fields, writer: Mutex::new(writer) })
	}

	/// Runs `f` against the writer, commits, and makes the result visible.
	fn write<F>(&self, f: F) -> Result<()>
	where
		F: FnOnce(&mut IndexWriter, &Fields) -> Result<()>,
	{
		let mut writer = self.writer.lock().map_err(|e| Error::Storage(format!("keyword writer poisoned: {e}")))?;
		if let Err(e) = f(&mut writer, &self.fields) {
			writer.rollback().map_err(Error::storage)?;
			return Err(e);
		}
		writer.commit().map_err(Error::storage)?;
		self.reader.reload().map_err(Error::storage)?;
		Ok(())
	}
}

impl TextIndexer for KeywordIndex {
	fn upsert(&self, batch: &ChunkBatch) -> Result<usize> {
		self.write(|writer, f| {
			writer.delete_term(Term::from_field_text(f.artifact_key, &batch.artifact_key));
			for c in &batch.chunks {
				writer.add_document(doc!(
					f.chunk_id => c.id.clone(),
					f.doc_id => c.doc_id.clone(),
					f.artifact_key => batch.artifact_key.clone(),
					f.position => c.position as u64,
					f.span_start => c.span_start as u64,
					f.span_end => c.span_end as u64,
					f.text => c.text.clone(),
					f.title => batch.title.clone(),
				)).map_err(Error::storage)?;
			}
			Ok(())
		})?;
		debug!(artifact_key = %batch.artifact_key, chunks = batch.chunks.len(), "keyword upsert");
		Ok(batch.chunks.len())
	}

	fn remove_key(&self, artifact_key: &str) -> Result<()> {
		self.write(|writer, f| {
			writer.delete_term(Term::from_field_text(f.artifact_key, artifact_key));
			Ok(())
		})
	}

	fn remove_document(&self, doc_id: &str) -> Result<()> {
		self.write(|writer, f| {
			writer.delete_term(Term::from_field_text(f.doc_id, doc_id));
			Ok(())
		})
	}

	fn clear(&self) -> Result<()> {
		self.write(|writer, _| {
			writer.delete_all_documents().map_err(Error::storage)?;
			Ok(())
		})
	}

	fn keys(&self) -> Result<BTreeMap<String, usize>> {
		let searcher = self.reader.searcher();
		let addresses = searcher.search(&AllQuery, &DocSetCollector).map_err(Error::storage)?;
		let mut counts = BTreeMap::new();
		for addr in addresses {
			let doc: TantivyDocument = searcher.doc(addr).map_err(Error::storage)?;
			if let Some(key) = doc.get_first(self.fields.artifact_key).and_then(|v| v.as_str()) {
				*counts.entry(key.to_string()).or_insert(0) += 1;
			}
		}
		Ok(counts)
	}

	fn search(&self, query: &str, visible: &BTreeSet<String>, k: usize) -> Result<Vec<SearchHit>> {
		crate::search::search(self, query, Matching::AllTerms, visible, k)
	}

	fn search_any(&self, query: &str, visible: &BTreeSet<String>, k: usize) -> Result<Vec<SearchHit>> {
		crate::search::search(self, query, Matching::AnyTerm, visible, k)
	}
}
