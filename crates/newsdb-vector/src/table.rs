use std::sync::Arc;

use arrow_array::{RecordBatch, RecordBatchIterator, StringArray};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{connect, Connection, Table};
use std::collections::BTreeMap;

use newsdb_core::{Error, Result};

pub async fn open_db(uri: &str) -> Result<Connection> {
	connect(uri).execute().await.map_err(Error::storage)
}

pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<arrow_schema::Schema>) -> Result<()> {
	let names = conn.table_names().execute().await.map_err(Error::storage)?;
	if names.iter().any(|n| n == name) {
		return Ok(());
	}
	// create empty table with 0 rows
	let iter = RecordBatchIterator::new(Vec::<std::result::Result<RecordBatch, arrow_schema::ArrowError>>::new(), schema);
	conn.create_table(name, Box::new(iter)).execute().await.map_err(Error::storage)?;
	Ok(())
}

/// SQL string literal with single quotes escaped.
pub fn quote(value: &str) -> String {
	format!("'{}'", value.replace('\'', "''"))
}

pub fn in_list(column: &str, values: impl IntoIterator<Item = impl AsRef<str>>) -> String {
	let items: Vec<String> = values.into_iter().map(|v| quote(v.as_ref())).collect();
	format!("{column} IN ({})", items.join(", "))
}

/// Row count per distinct value of a string column.
pub async fn count_by(table: &Table, column: &str) -> Result<BTreeMap<String, usize>> {
	let mut stream = table.query().select(Select::columns(&[column])).execute().await.map_err(Error::storage)?;
	let mut counts = BTreeMap::new();
	while let Some(batch) = stream.try_next().await.map_err(Error::storage)? {
		let col = batch
			.column_by_name(column)
			.and_then(|c| c.as_any().downcast_ref::<StringArray>())
			.ok_or_else(|| Error::IndexCorruption(format!("vector table is missing column {column}")))?;
		for i in 0..batch.num_rows() {
			*counts.entry(col.value(i).to_string()).or_insert(0) += 1;
		}
	}
	Ok(counts)
}
