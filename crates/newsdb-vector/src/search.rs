use std::collections::BTreeSet;

use arrow_array::{Array, Float32Array, Int64Array, RecordBatch, StringArray};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};

use newsdb_core::traits::Embedding;
use newsdb_core::types::{SearchHit, SourceKind};
use newsdb_core::{Error, Result};

use crate::table::{in_list, quote};

fn strings<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
	batch.column_by_name(name).and_then(|c| c.as_any().downcast_ref::<StringArray>()).ok_or_else(|| Error::IndexCorruption(format!("vector result missing {name}")))
}

fn ints<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int64Array> {
	batch.column_by_name(name).and_then(|c| c.as_any().downcast_ref::<Int64Array>()).ok_or_else(|| Error::IndexCorruption(format!("vector result missing {name}")))
}

/// Cosine nearest neighbours. Only rows embedded with the query's model
/// version and carrying a visible artifact key are considered, and the
/// filter is applied before the top-k cut.
pub(crate) async fn search_vec(table: &Table, dim: usize, query: &Embedding, visible: &BTreeSet<String>, k: usize) -> Result<Vec<SearchHit>> {
	if query.vector.len() != dim {
		return Err(Error::ModelVersionMismatch { expected: format!("d{dim}"), found: format!("{} (d{})", query.model_version, query.vector.len()) });
	}
	if k == 0 || visible.is_empty() {
		return Ok(Vec::new());
	}
	let predicate = format!("model_version = {} AND {}", quote(&query.model_version), in_list("artifact_key", visible));
	let mut stream = table
		.vector_search(query.vector.clone())
		.map_err(Error::storage)?
		.distance_type(DistanceType::Cosine)
		.only_if(predicate)
		.limit(k)
		.execute()
		.await
		.map_err(Error::storage)?;

	let mut hits = Vec::new();
	while let Some(batch) = stream.try_next().await.map_err(Error::storage)? {
		let chunk_ids = strings(&batch, "chunk_id")?;
		let doc_ids = strings(&batch, "doc_id")?;
		let keys = strings(&batch, "artifact_key")?;
		let texts = strings(&batch, "text")?;
		let positions = ints(&batch, "position")?;
		let starts = ints(&batch, "span_start")?;
		let ends = ints(&batch, "span_end")?;
		let distances = batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<Float32Array>());
		for i in 0..batch.num_rows() {
			let distance = distances.filter(|d| d.is_valid(i)).map_or(1.0, |d| d.value(i));
			hits.push(SearchHit {
				id: chunk_ids.value(i).to_string(),
				doc_id: doc_ids.value(i).to_string(),
				artifact_key: keys.value(i).to_string(),
				position: usize::try_from(positions.value(i)).unwrap_or_default(),
				span_start: usize::try_from(starts.value(i)).unwrap_or_default(),
				span_end: usize::try_from(ends.value(i)).unwrap_or_default(),
				text: texts.value(i).to_string(),
				score: 1.0 - distance,
				source: SourceKind::Vector,
				snippet: None,
			});
		}
	}
	hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
	hits.truncate(k);
	Ok(hits)
}
