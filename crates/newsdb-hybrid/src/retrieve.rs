use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use newsdb_core::config::RetrievalConfig;
use newsdb_core::types::{DocumentId, DocumentMeta, RetrievalMode, SearchFilters, SearchHit, SourceKind};
use newsdb_core::{Error, Result};
use newsdb_text::Matching;

use crate::manager::IndexManager;

/// A ranked chunk together with the metadata of its document.
#[derive(Debug, Clone, Serialize)]
pub struct Retrieved {
	pub hit: SearchHit,
	pub meta: DocumentMeta,
}

/// Weights for combining normalised keyword and vector scores.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
	pub keyword: f32,
	pub vector: f32,
}

impl Default for FusionWeights {
	fn default() -> Self {
		Self { keyword: 0.5, vector: 0.5 }
	}
}

pub struct Retriever {
	manager: Arc<IndexManager>,
	config: RetrievalConfig,
}

impl Retriever {
	pub fn new(manager: Arc<IndexManager>, config: RetrievalConfig) -> Self {
		Self { manager, config }
	}

	pub fn manager(&self) -> &Arc<IndexManager> {
		&self.manager
	}

	pub fn default_limit(&self) -> usize {
		self.config.default_limit
	}

	fn weights(&self) -> FusionWeights {
		FusionWeights { keyword: self.config.keyword_weight, vector: self.config.vector_weight }
	}

	pub async fn retrieve(&self, query: &str, mode: RetrievalMode, filters: &SearchFilters, limit: usize) -> Result<Vec<Retrieved>> {
		if query.trim().is_empty() {
			return Err(Error::InvalidQuery("query is empty".into()));
		}
		if limit == 0 {
			return Ok(Vec::new());
		}
		if self.config.reconcile_on_query {
			if let Err(e) = self.manager.reconcile().await {
				warn!(error = %e, "could not reconcile with content store; using last known state");
			}
		}
		let snapshot = self.manager.snapshot(filters).await;
		debug!(
			?mode,
			keyword_artifacts = snapshot.keyword_keys.len(),
			vector_artifacts = snapshot.vector_keys.len(),
			"retrieving"
		);

		let results = match mode {
			RetrievalMode::Keyword => {
				let hits = self.keyword_hits(query, Matching::AllTerms, &snapshot.keyword_keys, limit).await?;
				attach(hits, &snapshot.meta, limit)
			}
			RetrievalMode::Semantic => {
				let hits = self.vector_hits(query, &snapshot.vector_keys, limit).await?;
				attach(hits, &snapshot.meta, limit)
			}
			// Hybrid input is usually a question, so keyword candidates match any term.
			RetrievalMode::Hybrid => {
				let k = limit.saturating_mul(self.config.candidate_multiplier.max(1));
				let (keyword, vector) = tokio::join!(
					self.keyword_hits(query, Matching::AnyTerm, &snapshot.keyword_keys, k),
					self.vector_hits(query, &snapshot.vector_keys, k)
				);
				let (keyword, vector) = match (keyword, vector) {
					(Err(e), Err(semantic)) => {
						warn!(error = %semantic, "semantic side unavailable");
						return Err(e);
					}
					(keyword, vector) => (or_empty("keyword", keyword), or_empty("semantic", vector)),
				};
				fuse(keyword, vector, self.weights(), &snapshot.meta, limit)
			}
		};
		Ok(results)
	}

	async fn keyword_hits(
		&self,
		query: &str,
		matching: Matching,
		visible: &BTreeSet<String>,
		k: usize,
	) -> Result<Vec<SearchHit>> {
		if visible.is_empty() {
			return Ok(Vec::new());
		}
		let index = Arc::clone(self.manager.keyword());
		let query = query.to_string();
		let visible = visible.clone();
		tokio::task::spawn_blocking(move || match matching {
			Matching::AllTerms => index.search(&query, &visible, k),
			Matching::AnyTerm => index.search_any(&query, &visible, k),
		})
		.await
		.map_err(|e| Error::Operation(format!("keyword search task: {e}")))?
	}

	async fn vector_hits(&self, query: &str, visible: &BTreeSet<String>, k: usize) -> Result<Vec<SearchHit>> {
		if visible.is_empty() {
			return Ok(Vec::new());
		}
		let embedding = self.manager.embed_query(query).await?;
		match self.manager.vector().search_vec(&embedding, visible, k).await {
			Err(Error::ModelVersionMismatch { expected, found }) => {
				warn!(%expected, %found, "vector index built with another embedding model; skipping semantic results");
				Ok(Vec::new())
			}
			other => other,
		}
	}
}

/// One side of a hybrid query failing leaves the other side's hits.
fn or_empty(side: &str, hits: Result<Vec<SearchHit>>) -> Vec<SearchHit> {
	hits.unwrap_or_else(|e| {
		warn!(error = %e, side, "hybrid retrieval continuing without this side");
		Vec::new()
	})
}

/// Pairs hits with document metadata, dropping duplicates and hits whose
/// document is not in the snapshot.
fn attach(hits: Vec<SearchHit>, meta: &BTreeMap<DocumentId, DocumentMeta>, limit: usize) -> Vec<Retrieved> {
	let mut seen = BTreeSet::new();
	hits.into_iter()
		.filter(|h| seen.insert(h.id.clone()))
		.filter_map(|hit| meta.get(&hit.doc_id).map(|m| Retrieved { meta: m.clone(), hit }))
		.take(limit)
		.collect()
}

/// Min-max normalises scores to `[0, 1]`; a list whose scores are all
/// equal maps to 1.0.
pub fn normalize_scores(scores: &[f32]) -> Vec<f32> {
	let lo = scores.iter().copied().fold(f32::INFINITY, f32::min);
	let hi = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
	let range = hi - lo;
	scores
		.iter()
		.map(|s| if range > f32::EPSILON { (s - lo) / range } else { 1.0 })
		.collect()
}

/// Weighted sum of normalised keyword and vector scores. Ties go to the more
/// recent document, then to the smaller chunk id.
pub fn fuse(
	keyword: Vec<SearchHit>,
	vector: Vec<SearchHit>,
	weights: FusionWeights,
	meta: &BTreeMap<DocumentId, DocumentMeta>,
	limit: usize,
) -> Vec<Retrieved> {
	struct Entry {
		hit: SearchHit,
		keyword: Option<f32>,
		vector: Option<f32>,
	}

	let mut merged: HashMap<String, Entry> = HashMap::new();
	let keyword_norm = normalize_scores(&keyword.iter().map(|h| h.score).collect::<Vec<_>>());
	for (hit, norm) in keyword.into_iter().zip(keyword_norm) {
		merged.entry(hit.id.clone()).or_insert(Entry { hit, keyword: Some(norm), vector: None });
	}
	let vector_norm = normalize_scores(&vector.iter().map(|h| h.score).collect::<Vec<_>>());
	for (hit, norm) in vector.into_iter().zip(vector_norm) {
		merged
			.entry(hit.id.clone())
			.and_modify(|e| {
				if e.vector.is_none() {
					e.vector = Some(norm);
				}
			})
			.or_insert(Entry { hit, keyword: None, vector: Some(norm) });
	}

	let mut out: Vec<Retrieved> = merged
		.into_values()
		.filter_map(|e| {
			let m = meta.get(&e.hit.doc_id)?;
			let score = weights.keyword * e.keyword.unwrap_or(0.0) + weights.vector * e.vector.unwrap_or(0.0);
			let source = match (e.keyword, e.vector) {
				(Some(_), Some(_)) => SourceKind::Hybrid,
				(Some(_), None) => SourceKind::Text,
				_ => SourceKind::Vector,
			};
			Some(Retrieved { hit: SearchHit { score, source, ..e.hit }, meta: m.clone() })
		})
		.collect();
	out.sort_by(|a, b| {
		b.hit
			.score
			.partial_cmp(&a.hit.score)
			.unwrap_or(Ordering::Equal)
			.then_with(|| b.meta.date.cmp(&a.meta.date))
			.then_with(|| a.hit.id.cmp(&b.hit.id))
	});
	out.truncate(limit);
	out
}

/// Keeps the best-ranked chunk of each document, preserving order.
pub fn best_per_document(results: Vec<Retrieved>) -> Vec<Retrieved> {
	let mut seen = BTreeSet::new();
	results.into_iter().filter(|r| seen.insert(r.hit.doc_id.clone())).collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::{TimeZone, Utc};

	fn hit(id: &str, score: f32, source: SourceKind) -> SearchHit {
		let doc_id = id.split('#').next().unwrap_or(id).to_string();
		SearchHit {
			id: id.to_string(),
			artifact_key: format!("{doc_id}@r"),
			doc_id,
			position: 0,
			span_start: 0,
			span_end: 1,
			text: String::new(),
			score,
			source,
			snippet: None,
		}
	}

	fn meta(day: u32) -> DocumentMeta {
		DocumentMeta {
			sender: "a@x.com".into(),
			publication: "A".into(),
			date: Utc.with_ymd_and_hms(2025, 1, day, 0, 0, 0).unwrap(),
			title: "t".into(),
			word_count: 1,
		}
	}

	#[test]
	fn normalization_handles_flat_and_empty_lists() {
		assert_eq!(normalize_scores(&[3.0, 1.0, 2.0]), vec![1.0, 0.0, 0.5]);
		assert_eq!(normalize_scores(&[0.7, 0.7]), vec![1.0, 1.0]);
		assert!(normalize_scores(&[]).is_empty());
	}

	#[test]
	fn fusion_rewards_agreement_and_breaks_ties_by_date() {
		let metas: BTreeMap<_, _> = [("a".to_string(), meta(1)), ("b".to_string(), meta(2)), ("c".to_string(), meta(3))].into();
		let keyword = vec![hit("a#0", 9.0, SourceKind::Text), hit("b#0", 3.0, SourceKind::Text)];
		let vector = vec![hit("b#0", 0.9, SourceKind::Vector), hit("c#0", 0.5, SourceKind::Vector)];
		let fused = fuse(keyword, vector, FusionWeights::default(), &metas, 10);
		let ids: Vec<&str> = fused.iter().map(|r| r.hit.id.as_str()).collect();
		// a: 0.5, b: 0.0 + 0.5, c: 0.0; a and b tie, b is newer.
		assert_eq!(ids, vec!["b#0", "a#0", "c#0"]);
		assert_eq!(fused[0].hit.source, SourceKind::Hybrid);
		assert_eq!(fused[1].hit.source, SourceKind::Text);
		assert_eq!(fused[2].hit.source, SourceKind::Vector);
	}

	#[test]
	fn fusion_dedups_and_truncates() {
		let metas: BTreeMap<_, _> = [("a".to_string(), meta(1))].into();
		let keyword = vec![hit("a#0", 2.0, SourceKind::Text), hit("a#0", 1.0, SourceKind::Text), hit("a#1", 1.0, SourceKind::Text)];
		let fused = fuse(keyword, Vec::new(), FusionWeights::default(), &metas, 1);
		assert_eq!(fused.len(), 1);
		assert_eq!(fused[0].hit.id, "a#0");
	}

	#[test]
	fn best_chunk_per_document() {
		let m = meta(1);
		let results = ["a#2", "a#0", "b#1"]
			.iter()
			.map(|id| Retrieved { hit: hit(id, 1.0, SourceKind::Text), meta: m.clone() })
			.collect();
		let ids: Vec<String> = best_per_document(results).into_iter().map(|r| r.hit.id).collect();
		assert_eq!(ids, vec!["a#2", "b#1"]);
	}
}
