//! newsdb-vector
//!
//! LanceDB store of chunk embeddings. Every row carries the embedding model
//! version and the document artifact key, so queries can be restricted to the
//! current model and to artifacts readers are allowed to see.
pub mod index_build;
pub mod schema;
pub mod search;
pub mod table;
pub mod writer;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use async_trait::async_trait;
use lancedb::query::ExecutableQuery;
use lancedb::{Connection, Table};
use tracing::{debug, info};

use newsdb_core::traits::{Embedding, VectorIndexer};
use newsdb_core::types::{ChunkBatch, SearchHit};
use newsdb_core::{Error, Result};

use crate::table::quote;

pub struct VectorIndex {
	db: Connection,
	table_name: String,
	dim: usize,
	ann_threshold: usize,
}

impl VectorIndex {
	/// Opens (or creates) the table for `dim`-sized vectors under `db_path`.
	pub async fn open(db_path: &Path, dim: usize, ann_threshold: usize) -> Result<Self> {
		std::fs::create_dir_all(db_path)?;
		let db = table::open_db(db_path.to_string_lossy().as_ref()).await?;
		let dim_i32 = i32::try_from(dim).map_err(|_| Error::InvalidConfig(format!("embedding dim {dim} too large")))?;
		let table_name = schema::table_name(dim);
		table::ensure_table(&db, &table_name, schema::build_chunk_schema(dim_i32)).await?;
		debug!(table = %table_name, path = %db_path.display(), "vector index open");
		Ok(Self { db, table_name, dim, ann_threshold })
	}

	pub fn dim(&self) -> usize {
		self.dim
	}

	async fn table(&self) -> Result<Table> {
		self.db.open_table(&self.table_name).execute().await.map_err(Error::storage)
	}

	pub async fn count_rows(&self) -> Result<usize> {
		self.table().await?.count_rows(None).await.map_err(Error::storage)
	}
}

#[async_trait]
impl VectorIndexer for VectorIndex {
	async fn upsert(&self, batch: &ChunkBatch, embeddings: &[Vec<f32>], model_version: &str) -> Result<usize> {
		let table = self.table().await?;
		writer::replace_artifact(&table, batch, embeddings, model_version, self.dim).await
	}

	async fn remove_key(&self, artifact_key: &str) -> Result<()> {
		writer::delete_where(&self.table().await?, &format!("artifact_key = {}", quote(artifact_key))).await
	}

	async fn remove_document(&self, doc_id: &str) -> Result<()> {
		writer::delete_where(&self.table().await?, &format!("doc_id = {}", quote(doc_id))).await
	}

	async fn purge_foreign(&self, model_version: &str) -> Result<usize> {
		let table = self.table().await?;
		let predicate = format!("model_version != {}", quote(model_version));
		let stale = table.count_rows(Some(predicate.clone())).await.map_err(Error::storage)?;
		if stale > 0 {
			writer::delete_where(&table, &predicate).await?;
			info!(rows = stale, keep = model_version, "purged vectors from other embedding models");
		}
		Ok(stale)
	}

	async fn clear(&self) -> Result<()> {
		writer::delete_where(&self.table().await?, "chunk_id IS NOT NULL").await
	}

	async fn keys(&self) -> Result<BTreeMap<String, usize>> {
		table::count_by(&self.table().await?, "artifact_key").await
	}

	async fn search_vec(&self, query: &Embedding, visible: &BTreeSet<String>, k: usize) -> Result<Vec<SearchHit>> {
		search::search_vec(&self.table().await?, self.dim, query, visible, k).await
	}

	async fn optimize(&self, changed: bool) -> Result<()> {
		index_build::build_ivfpq_if_needed(&self.table().await?, self.dim, self.ann_threshold, changed).await?;
		Ok(())
	}
}
