//! Grounded answers: hybrid retrieval, numbered excerpts, a generator call,
//! and citation extraction. Without a generator response the caller still
//! gets the retrieved excerpts and their sources.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use newsdb_core::traits::TextGenerator;
use newsdb_core::types::{DocumentId, RetrievalMode, SearchFilters};
use newsdb_core::Result;

use crate::retrieve::{Retrieved, Retriever};

pub const SYSTEM_PROMPT: &str = "You are a research assistant that answers questions using a newsletter archive. \
Use ONLY the numbered newsletter excerpts provided to answer. \
Cite sources with their bracketed numbers, for example [1] or [2][3]. \
If the excerpts do not contain enough information, say so.";

pub const NO_RESULTS: &str = "No relevant content was found in the newsletter archive for this question.";

static MARKER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[(\d+(?:\s*,\s*\d+)*)\]").expect("static regex"));

/// A numbered source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Citation {
	pub marker: usize,
	pub doc_id: DocumentId,
	pub title: String,
	pub publication: String,
	pub sender: String,
	pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
	/// Generated text; `None` when only retrieval results are available.
	pub text: Option<String>,
	pub warning: Option<String>,
	pub citations: Vec<Citation>,
	pub chunks: Vec<Retrieved>,
}

pub struct AnswerAssembler {
	retriever: Arc<Retriever>,
	generator: Arc<dyn TextGenerator>,
	timeout: Duration,
}

impl AnswerAssembler {
	pub fn new(retriever: Arc<Retriever>, generator: Arc<dyn TextGenerator>, timeout: Duration) -> Self {
		Self { retriever, generator, timeout }
	}

	pub async fn answer(
		&self,
		question: &str,
		filters: &SearchFilters,
		limit: usize,
		model_override: Option<&str>,
	) -> Result<Answer> {
		let chunks = self.retriever.retrieve(question, RetrievalMode::Hybrid, filters, limit).await?;
		if chunks.is_empty() {
			info!("no excerpts retrieved; not calling the generator");
			return Ok(Answer { text: Some(NO_RESULTS.to_string()), warning: None, citations: Vec::new(), chunks });
		}

		let sources = number_sources(&chunks);
		let prompt = render_prompt(question, &chunks, &sources);
		debug!(excerpts = chunks.len(), sources = sources.len(), prompt_chars = prompt.len(), "calling generator");

		let outcome = tokio::time::timeout(self.timeout, self.generator.generate(SYSTEM_PROMPT, &prompt, model_override)).await;
		let warning = match outcome {
			Ok(Ok(text)) => {
				let citations = cited(&text, &sources);
				return Ok(Answer { text: Some(text), warning: None, citations, chunks });
			}
			Ok(Err(e)) => format!("answer generation failed ({e}); showing retrieved excerpts only"),
			Err(_) => format!("answer generation timed out after {}s; showing retrieved excerpts only", self.timeout.as_secs()),
		};
		warn!(%warning, "degraded to retrieval-only answer");
		Ok(Answer { text: None, warning: Some(warning), citations: sources, chunks })
	}
}

/// Assigns `[n]` markers per distinct document in order of first appearance.
pub fn number_sources(chunks: &[Retrieved]) -> Vec<Citation> {
	let mut seen = BTreeSet::new();
	chunks
		.iter()
		.filter(|c| seen.insert(c.hit.doc_id.as_str()))
		.enumerate()
		.map(|(i, c)| Citation {
			marker: i + 1,
			doc_id: c.hit.doc_id.clone(),
			title: c.meta.title.clone(),
			publication: c.meta.publication.clone(),
			sender: c.meta.sender.clone(),
			date: c.meta.date.date_naive(),
		})
		.collect()
}

pub fn render_prompt(question: &str, chunks: &[Retrieved], sources: &[Citation]) -> String {
	let by_doc: BTreeMap<&str, &Citation> = sources.iter().map(|c| (c.doc_id.as_str(), c)).collect();
	let mut out = String::from("Newsletter excerpts:\n\n");
	for chunk in chunks {
		let Some(source) = by_doc.get(chunk.hit.doc_id.as_str()) else { continue };
		let _ = writeln!(
			out,
			"[{}] \"{}\" - {} <{}> ({})\n{}\n",
			source.marker,
			source.title,
			source.publication,
			source.sender,
			source.date.format("%Y-%m-%d"),
			chunk.hit.text.trim()
		);
	}
	let _ = write!(out, "Question: {question}");
	out
}

/// Sources whose markers appear in `text`; all of them when none do.
pub fn cited(text: &str, sources: &[Citation]) -> Vec<Citation> {
	let used: BTreeSet<usize> = MARKER
		.captures_iter(text)
		.flat_map(|cap| {
			cap[1].split(',').filter_map(|n| n.trim().parse::<usize>().ok()).collect::<Vec<_>>()
		})
		.collect();
	let picked: Vec<Citation> = sources.iter().filter(|s| used.contains(&s.marker)).cloned().collect();
	if picked.is_empty() {
		sources.to_vec()
	} else {
		picked
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::{TimeZone, Utc};
	use newsdb_core::types::{DocumentMeta, SearchHit, SourceKind};

	fn chunk(doc: &str, pos: usize, title: &str) -> Retrieved {
		Retrieved {
			hit: SearchHit {
				id: format!("{doc}#{pos}"),
				doc_id: doc.into(),
				artifact_key: format!("{doc}@r"),
				position: pos,
				span_start: 0,
				span_end: 4,
				text: format!("text of {doc} {pos}"),
				score: 1.0,
				source: SourceKind::Hybrid,
				snippet: None,
			},
			meta: DocumentMeta {
				sender: "ed@letter.com".into(),
				publication: "The Letter".into(),
				date: Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap(),
				title: title.into(),
				word_count: 10,
			},
		}
	}

	#[test]
	fn markers_follow_first_appearance() {
		let chunks = vec![chunk("b", 0, "B"), chunk("a", 1, "A"), chunk("b", 2, "B")];
		let sources = number_sources(&chunks);
		assert_eq!(sources.iter().map(|s| (s.marker, s.doc_id.as_str())).collect::<Vec<_>>(), vec![(1, "b"), (2, "a")]);

		let prompt = render_prompt("what?", &chunks, &sources);
		assert!(prompt.contains("[1] \"B\" - The Letter <ed@letter.com> (2025-03-01)\ntext of b 0"));
		assert!(prompt.contains("[2] \"A\""));
		assert!(prompt.ends_with("Question: what?"));
	}

	#[test]
	fn citations_are_the_markers_used() {
		let chunks = vec![chunk("a", 0, "A"), chunk("b", 0, "B"), chunk("c", 0, "C")];
		let sources = number_sources(&chunks);
		let used = cited("Rates rose [3] and fell [1, 3].", &sources);
		assert_eq!(used.iter().map(|c| c.marker).collect::<Vec<_>>(), vec![1, 3]);
		assert_eq!(cited("No markers here.", &sources).len(), 3);
		assert_eq!(cited("Out of range [9].", &sources).len(), 3);
	}
}
