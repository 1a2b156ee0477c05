use std::sync::Arc;

use arrow_array::{FixedSizeListArray, Int64Array, RecordBatch, RecordBatchIterator, StringArray};
use lancedb::Table;
use tracing::debug;

use newsdb_core::types::ChunkBatch;
use newsdb_core::{Error, Result};

use crate::schema::build_chunk_schema;
use crate::table::quote;

pub(crate) fn chunks_to_record_batch(batch: &ChunkBatch, embeddings: &[Vec<f32>], model_version: &str, dim: usize) -> Result<RecordBatch> {
	if batch.chunks.len() != embeddings.len() {
		return Err(Error::Operation(format!("{} chunks but {} embeddings", batch.chunks.len(), embeddings.len())));
	}
	if let Some(bad) = embeddings.iter().find(|e| e.len() != dim) {
		return Err(Error::ModelVersionMismatch { expected: format!("d{dim}"), found: format!("{model_version} (d{})", bad.len()) });
	}
	let dim_i32 = i32::try_from(dim).map_err(|_| Error::InvalidConfig(format!("embedding dim {dim} too large")))?;
	let n = batch.chunks.len();
	let mut chunk_ids = Vec::with_capacity(n);
	let mut doc_ids = Vec::with_capacity(n);
	let mut positions = Vec::with_capacity(n);
	let mut span_starts = Vec::with_capacity(n);
	let mut span_ends = Vec::with_capacity(n);
	let mut texts = Vec::with_capacity(n);
	for c in &batch.chunks {
		chunk_ids.push(c.id.clone());
		doc_ids.push(c.doc_id.clone());
		positions.push(c.position as i64);
		span_starts.push(c.span_start as i64);
		span_ends.push(c.span_end as i64);
		texts.push(c.text.clone());
	}
	let vectors = embeddings.iter().map(|v| Some(v.iter().copied().map(Some).collect::<Vec<_>>()));
	RecordBatch::try_new(build_chunk_schema(dim_i32), vec![
		Arc::new(StringArray::from(chunk_ids)),
		Arc::new(StringArray::from(doc_ids)),
		Arc::new(StringArray::from(vec![batch.artifact_key.clone(); n])),
		Arc::new(Int64Array::from(positions)),
		Arc::new(Int64Array::from(span_starts)),
		Arc::new(Int64Array::from(span_ends)),
		Arc::new(StringArray::from(texts)),
		Arc::new(StringArray::from(vec![model_version.to_string(); n])),
		Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors, dim_i32)),
	]).map_err(Error::storage)
}

/// Replaces the rows stored under the batch's artifact key.
pub(crate) async fn replace_artifact(table: &Table, batch: &ChunkBatch, embeddings: &[Vec<f32>], model_version: &str, dim: usize) -> Result<usize> {
	let record_batch = chunks_to_record_batch(batch, embeddings, model_version, dim)?;
	delete_where(table, &format!("artifact_key = {}", quote(&batch.artifact_key))).await?;
	if record_batch.num_rows() > 0 {
		let schema = record_batch.schema();
		let reader = Box::new(RecordBatchIterator::new(vec![Ok(record_batch)].into_iter(), schema));
		table.add(reader).execute().await.map_err(Error::storage)?;
	}
	debug!(artifact_key = %batch.artifact_key, rows = batch.chunks.len(), "vector upsert");
	Ok(batch.chunks.len())
}

pub(crate) async fn delete_where(table: &Table, predicate: &str) -> Result<()> {
	table.delete(predicate).await.map_err(Error::storage)?;
	Ok(())
}
