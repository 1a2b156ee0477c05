use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

/// One table per embedding dimension, so a model swap never has to coerce
/// vectors into an incompatible column.
pub fn table_name(dim: usize) -> String {
	format!("chunks_d{dim}")
}

pub fn build_chunk_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("chunk_id", DataType::Utf8, false),
		Field::new("doc_id", DataType::Utf8, false),
		Field::new("artifact_key", DataType::Utf8, false),
		Field::new("position", DataType::Int64, false),
		Field::new("span_start", DataType::Int64, false),
		Field::new("span_end", DataType::Int64, false),
		Field::new("text", DataType::Utf8, false),
		Field::new("model_version", DataType::Utf8, false),
		Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
	]))
}
