use lancedb::index::{vector::IvfPqIndexBuilder, Index};
use lancedb::{DistanceType, Table};
use tracing::info;

use newsdb_core::{Error, Result};

/// Below this many rows an approximate index is not worth training.
const MIN_TRAINING_ROWS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IvfPqParams {
	pub nlist: usize,
	pub m: usize,
}

pub fn compute_ivfpq_params(total_rows: usize, dim: usize) -> IvfPqParams {
	let sqrt_n = (total_rows as f64).sqrt() as usize;
	let mut nlist = (2 * sqrt_n).clamp(1, 65_536);
	// Clamp nlist to be less than total_rows for tiny datasets
	if total_rows > 1 {
		nlist = nlist.min(total_rows - 1);
	} else {
		nlist = 1;
	}
	let target = if dim >= 1024 { 32 } else { 16 };
	// Sub-vectors must divide the dimension.
	let m = (1..=target).rev().find(|m| dim % m == 0).unwrap_or(1);
	IvfPqParams { nlist, m }
}

/// Whether the approximate index should be (re)trained: the table must be
/// large enough, and either the rows changed or no index exists yet.
pub fn needs_training(rows: usize, threshold: usize, changed: bool, has_index: bool) -> bool {
	rows > threshold && rows >= MIN_TRAINING_ROWS && (changed || !has_index)
}

/// Trains an IVF_PQ index over `vector` when [`needs_training`] says so.
/// Returns whether an index was built.
pub async fn build_ivfpq_if_needed(table: &Table, dim: usize, threshold: usize, changed: bool) -> Result<bool> {
	let rows = table.count_rows(None).await.map_err(Error::storage)?;
	if !needs_training(rows, threshold, true, false) {
		return Ok(false);
	}
	let has_index = table
		.list_indices()
		.await
		.map_err(Error::storage)?
		.iter()
		.any(|index| index.columns.iter().any(|c| c == "vector"));
	if !needs_training(rows, threshold, changed, has_index) {
		return Ok(false);
	}
	let params = compute_ivfpq_params(rows, dim);
	info!(rows, nlist = params.nlist, m = params.m, "building IVF_PQ vector index");
	table
		.create_index(
			&["vector"],
			Index::IvfPq(
				IvfPqIndexBuilder::default()
					.distance_type(DistanceType::Cosine)
					.num_partitions(params.nlist as u32)
					.num_sub_vectors(params.m as u32),
			),
		)
		.execute()
		.await
		.map_err(Error::storage)?;
	Ok(true)
}
