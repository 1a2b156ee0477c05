use std::collections::BTreeSet;

use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, BoostQuery, Occur, Query, QueryParser, TermSetQuery};
use tantivy::schema::Value;
use tantivy::snippet::{Snippet, SnippetGenerator};
use tantivy::{TantivyDocument, Term};

use tracing::debug;

use newsdb_core::types::{SearchHit, SourceKind};
use newsdb_core::{Error, Result};

use crate::index::KeywordIndex;

const TITLE_BOOST: f32 = 1.5;
const SNIPPET_CHARS: usize = 200;

/// How user input is turned into a tantivy query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matching {
	/// Every term is required and syntax errors are reported.
	AllTerms,
	/// Any term may match and unparsable fragments are skipped.
	AnyTerm,
}

/// Rewrites `NOT term` (outside quotes) to the parser's `-term` form;
/// a preceding `AND` is dropped since terms are conjunctive by default.
pub fn translate_operators(query: &str) -> Result<String> {
	let mut out: Vec<String> = Vec::new();
	let mut negate_next = false;
	let mut in_quotes = false;
	for token in query.split_whitespace() {
		let quotes = token.matches('"').count();
		if !in_quotes && token == "NOT" {
			if out.last().is_some_and(|t| t == "AND") {
				out.pop();
			}
			negate_next = true;
			continue;
		}
		if negate_next && !in_quotes {
			out.push(format!("-{}", token.trim_start_matches(['+', '-'])));
			negate_next = false;
		} else {
			out.push(token.to_string());
		}
		if quotes % 2 == 1 {
			in_quotes = !in_quotes;
		}
	}
	if negate_next {
		return Err(Error::InvalidQuery(format!("{query:?}: NOT must be followed by a term")));
	}
	Ok(out.join(" "))
}

pub(crate) fn search(
	idx: &KeywordIndex,
	query_text: &str,
	matching: Matching,
	visible: &BTreeSet<String>,
	k: usize,
) -> Result<Vec<SearchHit>> {
	if k == 0 || visible.is_empty() || query_text.trim().is_empty() {
		return Ok(Vec::new());
	}
	let f = idx.fields;
	let mut parser = QueryParser::for_index(&idx.index, vec![f.text, f.title]);
	parser.set_field_boost(f.title, TITLE_BOOST);
	let user_query = match matching {
		Matching::AllTerms => {
			parser.set_conjunction_by_default();
			parser
				.parse_query(&translate_operators(query_text)?)
				.map_err(|e| Error::InvalidQuery(format!("{query_text:?}: {e}")))?
		}
		Matching::AnyTerm => {
			let text = translate_operators(query_text).unwrap_or_else(|_| query_text.to_string());
			let (query, skipped) = parser.parse_query_lenient(&text);
			if !skipped.is_empty() {
				debug!(query = %query_text, skipped = skipped.len(), "ignored unparsable query fragments");
			}
			query
		}
	};

	// Restrict to visible artifacts before ranking; the restriction adds no score.
	let keys = visible.iter().map(|k| Term::from_field_text(f.artifact_key, k));
	let restriction: Box<dyn Query> = Box::new(BoostQuery::new(Box::new(TermSetQuery::new(keys)), 0.0));
	let query = BooleanQuery::new(vec![(Occur::Must, user_query.box_clone()), (Occur::Must, restriction)]);

	let searcher = idx.reader.searcher();
	let top_docs = searcher.search(&query, &TopDocs::with_limit(k)).map_err(Error::storage)?;
	let mut snippets = SnippetGenerator::create(&searcher, &*user_query, f.text).map_err(Error::storage)?;
	snippets.set_max_num_chars(SNIPPET_CHARS);

	let mut hits = Vec::with_capacity(top_docs.len());
	for (score, addr) in top_docs {
		let doc: TantivyDocument = searcher.doc(addr).map_err(Error::storage)?;
		let text_of = |field| doc.get_first(field).and_then(|v| v.as_str()).unwrap_or("").to_string();
		let num_of = |field| doc.get_first(field).and_then(|v| v.as_u64()).unwrap_or(0) as usize;
		let snippet = mark(&snippets.snippet_from_doc(&doc));
		hits.push(SearchHit {
			id: text_of(f.chunk_id),
			doc_id: text_of(f.doc_id),
			artifact_key: text_of(f.artifact_key),
			position: num_of(f.position),
			span_start: num_of(f.span_start),
			span_end: num_of(f.span_end),
			text: text_of(f.text),
			score,
			source: SourceKind::Text,
			snippet: (!snippet.is_empty()).then_some(snippet),
		});
	}
	Ok(hits)
}

/// Renders a snippet with `>>>`/`<<<` around each highlighted range.
fn mark(snippet: &Snippet) -> String {
	let fragment = snippet.fragment();
	let mut out = String::with_capacity(fragment.len() + 16);
	let mut last = 0;
	for range in snippet.highlighted() {
		out.push_str(&fragment[last..range.start]);
		out.push_str(">>>");
		out.push_str(&fragment[range.start..range.end]);
		out.push_str("<<<");
		last = range.end;
	}
	out.push_str(&fragment[last..]);
	out.trim().to_string()
}

#[cfg(test)]
mod tests {
	use newsdb_core::Error;

	use super::translate_operators;

	#[test]
	fn not_becomes_prohibition() {
		assert_eq!(translate_operators("rates NOT mortgage").unwrap(), "rates -mortgage");
		assert_eq!(translate_operators("rates AND NOT mortgage").unwrap(), "rates -mortgage");
	}

	#[test]
	fn quoted_not_is_left_alone() {
		assert_eq!(translate_operators("\"do NOT panic\" rates").unwrap(), "\"do NOT panic\" rates");
	}

	#[test]
	fn dangling_not_is_rejected() {
		assert!(matches!(translate_operators("rates NOT"), Err(Error::InvalidQuery(_))));
		assert!(matches!(translate_operators("NOT"), Err(Error::InvalidQuery(_))));
	}
}
