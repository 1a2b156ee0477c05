use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING};
use tantivy::tokenizer::{Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, StopWordFilter, TextAnalyzer};
use tantivy::Index;

use newsdb_core::{Error, Result};

pub const TOKENIZER: &str = "newsletter_en";

#[derive(Debug, Clone, Copy)]
pub struct Fields {
	pub chunk_id: Field,
	pub doc_id: Field,
	pub artifact_key: Field,
	pub position: Field,
	pub span_start: Field,
	pub span_end: Field,
	pub text: Field,
	pub title: Field,
}

pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	schema_builder.add_text_field("chunk_id", STRING | STORED);
	schema_builder.add_text_field("doc_id", STRING | STORED);
	schema_builder.add_text_field("artifact_key", STRING | STORED);
	schema_builder.add_u64_field("position", STORED);
	schema_builder.add_u64_field("span_start", STORED);
	schema_builder.add_u64_field("span_end", STORED);
	let text_field_indexing = TextFieldIndexing::default().set_tokenizer(TOKENIZER).set_index_option(IndexRecordOption::WithFreqsAndPositions);
	let text_options = TextOptions::default().set_indexing_options(text_field_indexing.clone()).set_stored();
	schema_builder.add_text_field("text", text_options);
	schema_builder.add_text_field("title", TextOptions::default().set_indexing_options(text_field_indexing));
	schema_builder.build()
}

pub fn fields(schema: &Schema) -> Result<Fields> {
	let get = |name: &str| schema.get_field(name).map_err(|e| Error::IndexCorruption(format!("keyword index schema: {e}")));
	Ok(Fields {
		chunk_id: get("chunk_id")?,
		doc_id: get("doc_id")?,
		artifact_key: get("artifact_key")?,
		position: get("position")?,
		span_start: get("span_start")?,
		span_end: get("span_end")?,
		text: get("text")?,
		title: get("title")?,
	})
}

/// English analyzer: words, lowercased, stop words dropped, Porter-stemmed.
pub fn register_tokenizer(index: &Index) {
	let stop_words = [
		"a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having",
	];
	let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(RemoveLongFilter::limit(40))
		.filter(LowerCaser)
		.filter(StopWordFilter::remove(stop_words.into_iter().map(ToString::to_string)))
		.filter(Stemmer::new(Language::English))
		.build();
	index.tokenizers().register(TOKENIZER, tokenizer);
}
