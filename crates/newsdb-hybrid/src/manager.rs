//! Incremental index builds over a content store.
//!
//! A document's new artifacts are written to both indexes first, then its
//! state record is flipped to the new revision, and only then are the old
//! artifacts removed. Readers resolve visibility through the state, so they
//! see either the old revision or the new one, never a mix. A live
//! [`Snapshot`] pins the artifacts it names: superseded artifacts are only
//! deleted once every snapshot taken before the flip has been dropped.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedRwLockReadGuard, RwLock};
use tracing::{debug, info, warn};

use newsdb_core::chunker::{chunk_document, clean_for_indexing};
use newsdb_core::config::Settings;
use newsdb_core::fingerprint::{self, ChangeKind};
use newsdb_core::state::{Artifact, DocRecord, DocState, IndexState, StateStore};
use newsdb_core::traits::{ContentStore, Embedder, Embedding, TextIndexer, VectorIndexer};
use newsdb_core::types::{
	BuildMode, ChunkBatch, ChunkParams, DocumentEntry, DocumentId, DocumentMeta, IndexTarget, SearchFilters,
};
use newsdb_core::{Error, Result};

#[derive(Debug, Clone, Copy)]
pub struct ManagerOptions {
	pub chunk_params: ChunkParams,
	pub embed_batch_size: usize,
	pub embed_timeout: Duration,
	pub show_progress: bool,
}

impl ManagerOptions {
	pub fn from_settings(settings: &Settings) -> Self {
		Self {
			chunk_params: settings.chunking.params(),
			embed_batch_size: settings.embedding.batch_size.max(1),
			embed_timeout: Duration::from_secs(settings.embedding.timeout_secs),
			show_progress: false,
		}
	}
}

impl Default for ManagerOptions {
	fn default() -> Self {
		Self::from_settings(&Settings::default())
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildFailure {
	pub doc_id: DocumentId,
	pub kind: String,
	pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
	pub new: usize,
	pub changed: usize,
	pub unchanged: usize,
	pub deleted: usize,
	pub succeeded: usize,
	pub failed: usize,
	pub failures: Vec<BuildFailure>,
	/// Artifact insertions plus deletions across both indexes.
	pub artifact_writes: usize,
	pub elapsed_ms: u64,
}

impl BuildReport {
	fn fail(&mut self, doc_id: &str, e: &Error) {
		self.failures.push(BuildFailure { doc_id: doc_id.to_string(), kind: e.kind().to_string(), message: e.to_string() });
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
	pub total: usize,
	pub indexed: usize,
	pub stale: usize,
	pub unindexed: usize,
	pub failed: Vec<DocumentId>,
	pub keyword_chunks: usize,
	pub vector_chunks: usize,
	pub last_build: Option<DateTime<Utc>>,
	pub model_version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VerifySummary {
	pub keyword_artifacts: usize,
	pub vector_artifacts: usize,
}

/// What a reader may see, taken under a single state read lock. The
/// artifacts it names stay in the indexes while it is alive.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
	pub keyword_keys: BTreeSet<String>,
	pub vector_keys: BTreeSet<String>,
	pub meta: BTreeMap<DocumentId, DocumentMeta>,
	_pin: Option<Arc<OwnedRwLockReadGuard<()>>>,
}

/// Per-document plan for one build.
struct Work<'a> {
	entry: &'a DocumentEntry,
	keyword: bool,
	vector: bool,
}

/// Outcome of writing one document's artifacts, before the state flip.
#[derive(Default)]
struct Written {
	keyword: Option<Artifact>,
	vector: Option<Artifact>,
	error: Option<Error>,
}

pub struct IndexManager {
	store: Arc<dyn ContentStore>,
	keyword: Arc<dyn TextIndexer>,
	vector: Arc<dyn VectorIndexer>,
	embedder: Arc<dyn Embedder>,
	state_store: StateStore,
	state: RwLock<IndexState>,
	/// Held shared by live snapshots, exclusively before superseded artifacts are deleted.
	readers: Arc<RwLock<()>>,
	write_lock: Mutex<()>,
	options: ManagerOptions,
}

impl IndexManager {
	/// Loads the persisted state; an unreadable state file is `IndexCorruption`.
	pub fn new(
		store: Arc<dyn ContentStore>,
		keyword: Arc<dyn TextIndexer>,
		vector: Arc<dyn VectorIndexer>,
		embedder: Arc<dyn Embedder>,
		state_store: StateStore,
		options: ManagerOptions,
	) -> Result<Self> {
		let state = state_store.load()?;
		debug!(documents = state.documents.len(), "index state loaded");
		Ok(Self {
			store,
			keyword,
			vector,
			embedder,
			state_store,
			state: RwLock::new(state),
			readers: Arc::new(RwLock::new(())),
			write_lock: Mutex::new(()),
			options,
		})
	}

	pub fn keyword(&self) -> &Arc<dyn TextIndexer> {
		&self.keyword
	}

	pub fn vector(&self) -> &Arc<dyn VectorIndexer> {
		&self.vector
	}

	pub fn embedder(&self) -> &Arc<dyn Embedder> {
		&self.embedder
	}

	pub fn options(&self) -> &ManagerOptions {
		&self.options
	}

	/// Clone of the current state, for inspection and tests.
	pub async fn state(&self) -> IndexState {
		self.state.read().await.clone()
	}

	pub async fn snapshot(&self, filters: &SearchFilters) -> Snapshot {
		let pin = Arc::clone(&self.readers).read_owned().await;
		let state = self.state.read().await;
		let model_version = self.embedder.model_version();
		Snapshot {
			keyword_keys: state.visible_keyword_keys(filters),
			vector_keys: state.visible_vector_keys(filters, model_version),
			meta: state
				.documents
				.iter()
				.filter(|(_, r)| filters.matches(&r.meta))
				.map(|(id, r)| (id.clone(), r.meta.clone()))
				.collect(),
			_pin: Some(Arc::new(pin)),
		}
	}

	/// Waits until every snapshot taken so far has been dropped.
	async fn wait_for_readers(&self) {
		drop(self.readers.write().await);
	}

	/// Marks documents whose stored fingerprint no longer matches the content
	/// store (or that the store stopped listing) as stale. Returns how many
	/// were newly marked.
	pub async fn reconcile(&self) -> Result<usize> {
		let listed: BTreeMap<DocumentId, String> =
			self.store.list_documents()?.into_iter().map(|e| (e.id, e.fingerprint)).collect();
		let mut state = self.state.write().await;
		let mut marked = 0;
		for (id, record) in &mut state.documents {
			let current = listed.get(id).map(String::as_str);
			if !record.stale && current != Some(record.fingerprint.as_str()) {
				record.stale = true;
				marked += 1;
				debug!(doc_id = %id, "document changed since last build");
			}
		}
		if marked > 0 {
			self.state_store.save(&state)?;
			info!(stale = marked, "reconciled index state with content store");
		}
		Ok(marked)
	}

	pub async fn build(&self, mode: BuildMode, target: IndexTarget) -> Result<BuildReport> {
		let _guard = self.write_lock.lock().await;
		let started = Instant::now();
		let params = self.options.chunk_params;
		let model_version = self.embedder.model_version().to_string();
		let mut report = BuildReport::default();

		let entries = self.store.list_documents()?;
		if mode == BuildMode::Full {
			report.artifact_writes += self.clear_targets(target).await?;
		}
		if target.vector() {
			self.forget_foreign_vectors(&model_version).await?;
		}

		let plan = {
			let state = self.state.read().await;
			let mut plan = Vec::new();
			for entry in &entries {
				let record = state.documents.get(&entry.id);
				let kind = match (mode, record) {
					(BuildMode::Full, Some(_)) => ChangeKind::Changed,
					(BuildMode::Full, None) => ChangeKind::New,
					(BuildMode::Incremental, _) => state.classify(entry, params),
				};
				match kind {
					ChangeKind::New => report.new += 1,
					ChangeKind::Changed => report.changed += 1,
					_ => report.unchanged += 1,
				}
				let redo = kind != ChangeKind::Unchanged;
				let work = Work {
					entry,
					keyword: target.keyword() && (redo || record.and_then(DocRecord::current_keyword).is_none()),
					vector: target.vector() && (redo || record.and_then(|r| r.current_vector(&model_version)).is_none()),
				};
				if work.keyword || work.vector {
					plan.push(work);
				}
			}
			plan
		};

		let progress = self.progress_bar(plan.len());
		for work in &plan {
			progress.set_message(work.entry.id.clone());
			self.index_document(work, &model_version, &mut report).await?;
			progress.inc(1);
		}
		progress.finish_and_clear();

		report.artifact_writes += self.remove_deleted(&mut report).await?;
		report.artifact_writes += self.sweep(target, &model_version, report.artifact_writes > 0).await?;

		{
			let mut state = self.state.write().await;
			state.last_build = Some(Utc::now());
			self.state_store.save(&state)?;
		}
		report.failed = report.failures.len();
		report.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
		info!(
			new = report.new,
			changed = report.changed,
			unchanged = report.unchanged,
			deleted = report.deleted,
			succeeded = report.succeeded,
			failed = report.failed,
			writes = report.artifact_writes,
			ms = report.elapsed_ms,
			"index build finished"
		);
		Ok(report)
	}

	async fn index_document(&self, work: &Work<'_>, model_version: &str, report: &mut BuildReport) -> Result<()> {
		let entry = work.entry;
		let params = self.options.chunk_params;
		let body = match self.store.get_body(&entry.id) {
			Ok(body) => body,
			Err(e) if e.is_per_document() => {
				warn!(doc_id = %entry.id, kind = e.kind(), error = %e, "document skipped");
				self.record_unreadable(entry, &e).await?;
				report.fail(&entry.id, &e);
				return Ok(());
			}
			Err(e) => return Err(e),
		};
		let cleaned = clean_for_indexing(&body);
		let revision = fingerprint::revision(&entry.fingerprint, params);
		let batch = Arc::new(ChunkBatch {
			artifact_key: fingerprint::artifact_key(&entry.id, &revision),
			title: entry.meta.title.clone(),
			chunks: chunk_document(&entry.id, &cleaned, params)?,
		});
		debug!(doc_id = %entry.id, chunks = batch.chunks.len(), revision = %revision, "indexing document");

		let keyword_write = async {
			if work.keyword {
				self.write_keyword(&batch, &revision).await.map(Some)
			} else {
				Ok(None)
			}
		};
		let vector_write = async {
			if work.vector {
				self.write_vector(&batch, &revision, model_version).await.map(Some)
			} else {
				Ok(None)
			}
		};
		let (keyword_res, vector_res) = tokio::join!(keyword_write, vector_write);

		let mut written = Written::default();
		for (res, slot) in [(keyword_res, &mut written.keyword), (vector_res, &mut written.vector)] {
			match res {
				Ok(artifact) => *slot = artifact,
				Err(e) if e.is_per_document() => {
					warn!(doc_id = %entry.id, kind = e.kind(), error = %e, "document partially indexed");
					written.error = Some(e);
				}
				Err(e) => return Err(e),
			}
		}

		if let Some(e) = &written.error {
			report.fail(&entry.id, e);
		} else {
			report.succeeded += 1;
		}
		report.artifact_writes += usize::from(written.keyword.is_some()) + usize::from(written.vector.is_some());
		report.artifact_writes += self.flip(entry, params, written).await?;
		Ok(())
	}

	async fn write_keyword(&self, batch: &Arc<ChunkBatch>, revision: &str) -> Result<Artifact> {
		let chunk_count = if batch.chunks.is_empty() {
			0
		} else {
			let index = Arc::clone(&self.keyword);
			let batch = Arc::clone(batch);
			tokio::task::spawn_blocking(move || index.upsert(&batch))
				.await
				.map_err(|e| Error::Operation(format!("keyword upsert task: {e}")))??
		};
		Ok(Artifact { revision: revision.to_string(), chunk_count, indexed_at: Utc::now(), model_version: None })
	}

	async fn write_vector(&self, batch: &ChunkBatch, revision: &str, model_version: &str) -> Result<Artifact> {
		let chunk_count = if batch.chunks.is_empty() {
			0
		} else {
			let texts: Vec<String> = batch.chunks.iter().map(|c| c.text.clone()).collect();
			let vectors = self.embed_texts(texts).await?;
			self.vector.upsert(batch, &vectors, model_version).await?
		};
		Ok(Artifact {
			revision: revision.to_string(),
			chunk_count,
			indexed_at: Utc::now(),
			model_version: Some(model_version.to_string()),
		})
	}

	/// Embeds `texts` in configured batches under the embedding timeout.
	async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
		let embedder = Arc::clone(&self.embedder);
		let batch_size = self.options.embed_batch_size;
		let expected = texts.len();
		let task = tokio::task::spawn_blocking(move || {
			let mut out = Vec::with_capacity(texts.len());
			for batch in texts.chunks(batch_size) {
				out.extend(embedder.embed_batch(batch)?);
			}
			Ok::<_, Error>(out)
		});
		let vectors = match tokio::time::timeout(self.options.embed_timeout, task).await {
			Ok(joined) => joined.map_err(|e| Error::EmbeddingUnavailable(format!("embedding task: {e}")))??,
			Err(_) => {
				return Err(Error::EmbeddingUnavailable(format!(
					"embedding timed out after {}s",
					self.options.embed_timeout.as_secs()
				)))
			}
		};
		let dim = self.embedder.dim();
		if vectors.len() != expected || vectors.iter().any(|v| v.len() != dim) {
			return Err(Error::EmbeddingUnavailable(format!("embedder returned {} vectors for {expected} chunks", vectors.len())));
		}
		Ok(vectors)
	}

	/// Embeds a single query string under the embedding timeout.
	pub async fn embed_query(&self, text: &str) -> Result<Embedding> {
		let vector = self.embed_texts(vec![text.to_string()]).await?.pop().ok_or_else(|| {
			Error::EmbeddingUnavailable("embedder returned no vector".into())
		})?;
		Ok(Embedding { vector, model_version: self.embedder.model_version().to_string() })
	}

	/// Points the document's record at the newly written artifacts, persists
	/// the state, then deletes the superseded artifacts. Returns deletions.
	async fn flip(&self, entry: &DocumentEntry, params: ChunkParams, written: Written) -> Result<usize> {
		let (old_keyword, old_vector) = {
			let mut state = self.state.write().await;
			let record = state.documents.entry(entry.id.clone()).or_insert_with(|| empty_record(entry, params));
			record.meta = entry.meta.clone();
			record.fingerprint = entry.fingerprint.clone();
			record.chunk_params = params;
			record.stale = false;
			record.last_error = written.error.as_ref().map(ToString::to_string);
			let old_keyword = written.keyword.and_then(|a| record.keyword.replace(a));
			let old_vector = written.vector.and_then(|a| record.vector.replace(a));
			let new_keyword = record.keyword.as_ref().map(|a| a.revision.clone());
			let new_vector = record.vector.as_ref().map(|a| a.revision.clone());
			self.state_store.save(&state)?;
			(
				old_keyword.filter(|a| Some(&a.revision) != new_keyword.as_ref()),
				old_vector.filter(|a| Some(&a.revision) != new_vector.as_ref()),
			)
		};

		if old_keyword.is_some() || old_vector.is_some() {
			self.wait_for_readers().await;
		}
		let mut deletions = 0;
		if let Some(old) = old_keyword {
			let key = fingerprint::artifact_key(&entry.id, &old.revision);
			self.remove_keyword_key(key).await?;
			deletions += 1;
		}
		if let Some(old) = old_vector {
			self.vector.remove_key(&fingerprint::artifact_key(&entry.id, &old.revision)).await?;
			deletions += 1;
		}
		Ok(deletions)
	}

	/// Records a document whose body could not be read. A known document whose
	/// fingerprint moved is hidden until it can be rebuilt.
	async fn record_unreadable(&self, entry: &DocumentEntry, e: &Error) -> Result<()> {
		let mut state = self.state.write().await;
		let params = self.options.chunk_params;
		let record = state.documents.entry(entry.id.clone()).or_insert_with(|| DocRecord {
			fingerprint: String::new(),
			..empty_record(entry, params)
		});
		if record.fingerprint != entry.fingerprint || record.chunk_params != params {
			record.stale = true;
		}
		record.last_error = Some(e.to_string());
		self.state_store.save(&state)
	}

	/// Drops documents the store no longer lists: state first, then both indexes.
	async fn remove_deleted(&self, report: &mut BuildReport) -> Result<usize> {
		let checkpoint = self.state.read().await.checkpoint();
		let gone = self.store.deleted_ids_since(&checkpoint)?;
		let removed: Vec<(DocumentId, DocRecord)> = {
			let mut state = self.state.write().await;
			if gone.is_empty() {
				return Ok(0);
			}
			let removed = gone.into_iter().filter_map(|id| state.documents.remove(&id).map(|r| (id, r))).collect();
			self.state_store.save(&state)?;
			removed
		};
		self.wait_for_readers().await;

		let mut writes = 0;
		for (id, record) in removed {
			let keyword = Arc::clone(&self.keyword);
			let doc = id.clone();
			tokio::task::spawn_blocking(move || keyword.remove_document(&doc))
				.await
				.map_err(|e| Error::Operation(format!("keyword delete task: {e}")))??;
			self.vector.remove_document(&id).await?;
			writes += usize::from(record.keyword.is_some()) + usize::from(record.vector.is_some());
			report.deleted += 1;
			debug!(doc_id = %id, "document removed from indexes");
		}
		Ok(writes)
	}

	/// Removes artifacts no state record references, then vectors from other
	/// embedding models. The approximate vector index is retrained only if
	/// this build changed something.
	async fn sweep(&self, target: IndexTarget, model_version: &str, changed: bool) -> Result<usize> {
		let (keyword_refs, vector_refs) = {
			let state = self.state.read().await;
			(state.referenced_keyword_keys(), state.referenced_vector_keys())
		};
		self.wait_for_readers().await;
		let mut writes = 0;
		let keyword_keys = self.keyword_keys().await?;
		for key in keyword_keys.into_keys().filter(|k| !keyword_refs.contains(k)) {
			debug!(artifact = %key, "sweeping orphaned keyword artifact");
			self.remove_keyword_key(key).await?;
			writes += 1;
		}
		for key in self.vector.keys().await?.into_keys().filter(|k| !vector_refs.contains(k)) {
			debug!(artifact = %key, "sweeping orphaned vector artifact");
			self.vector.remove_key(&key).await?;
			writes += 1;
		}
		if target.vector() {
			writes += self.vector.purge_foreign(model_version).await?;
			self.vector.optimize(changed || writes > 0).await?;
		}
		Ok(writes)
	}

	/// Clears the targeted indexes and their state artifacts for a full rebuild.
	async fn clear_targets(&self, target: IndexTarget) -> Result<usize> {
		let mut removed = 0;
		if target.keyword() {
			removed += self.keyword_keys().await?.len();
			let keyword = Arc::clone(&self.keyword);
			tokio::task::spawn_blocking(move || keyword.clear())
				.await
				.map_err(|e| Error::Operation(format!("keyword clear task: {e}")))??;
		}
		if target.vector() {
			removed += self.vector.keys().await?.len();
			self.vector.clear().await?;
		}
		let mut state = self.state.write().await;
		for record in state.documents.values_mut() {
			if target.keyword() {
				record.keyword = None;
			}
			if target.vector() {
				record.vector = None;
			}
		}
		self.state_store.save(&state)?;
		info!(artifacts = removed, ?target, "cleared indexes for full rebuild");
		Ok(removed)
	}

	/// Forgets vector artifacts recorded under another embedding model so the
	/// affected documents are re-embedded in this build.
	async fn forget_foreign_vectors(&self, model_version: &str) -> Result<()> {
		let mut state = self.state.write().await;
		let mut forgotten = 0;
		for record in state.documents.values_mut() {
			if record.vector.as_ref().is_some_and(|a| a.model_version.as_deref() != Some(model_version)) {
				record.vector = None;
				forgotten += 1;
			}
		}
		if forgotten > 0 {
			info!(documents = forgotten, model_version, "embedding model changed; vectors will be rebuilt");
			self.state_store.save(&state)?;
		}
		Ok(())
	}

	async fn keyword_keys(&self) -> Result<BTreeMap<String, usize>> {
		let keyword = Arc::clone(&self.keyword);
		tokio::task::spawn_blocking(move || keyword.keys())
			.await
			.map_err(|e| Error::Operation(format!("keyword keys task: {e}")))?
	}

	async fn remove_keyword_key(&self, key: String) -> Result<()> {
		let keyword = Arc::clone(&self.keyword);
		tokio::task::spawn_blocking(move || keyword.remove_key(&key))
			.await
			.map_err(|e| Error::Operation(format!("keyword delete task: {e}")))?
	}

	pub async fn status(&self) -> Result<IndexStatus> {
		let entries = self.store.list_documents()?;
		let model_version = self.embedder.model_version().to_string();
		let keyword_chunks = self.keyword_keys().await?.values().sum();
		let vector_chunks = self.vector.keys().await?.values().sum();
		let state = self.state.read().await;
		let params = self.options.chunk_params;

		let mut status = IndexStatus {
			total: entries.len(),
			indexed: 0,
			stale: 0,
			unindexed: 0,
			failed: Vec::new(),
			keyword_chunks,
			vector_chunks,
			last_build: state.last_build,
			model_version: model_version.clone(),
		};
		for entry in &entries {
			let doc_state = match state.documents.get(&entry.id) {
				None => DocState::Unindexed,
				Some(r) if state.classify(entry, params) != ChangeKind::Unchanged => {
					if r.keyword.is_some() || r.vector.is_some() {
						DocState::Stale
					} else {
						DocState::Unindexed
					}
				}
				Some(r) => r.state(&model_version),
			};
			match doc_state {
				DocState::Indexed => status.indexed += 1,
				DocState::Stale => status.stale += 1,
				DocState::Unindexed => status.unindexed += 1,
			}
		}
		status.failed = state.documents.iter().filter(|(_, r)| r.last_error.is_some()).map(|(id, _)| id.clone()).collect();
		Ok(status)
	}

	/// Checks that both indexes hold exactly the artifacts the state records,
	/// with matching chunk counts.
	pub async fn verify(&self) -> Result<VerifySummary> {
		let keyword_actual = self.keyword_keys().await?;
		let vector_actual = self.vector.keys().await?;
		let state = self.state.read().await;

		let keyword_expected = expected_artifacts(&state, keyword_artifact);
		let vector_expected = expected_artifacts(&state, vector_artifact);

		let mut problems = Vec::new();
		describe_mismatch("keyword", &keyword_expected, &keyword_actual, &mut problems);
		describe_mismatch("vector", &vector_expected, &vector_actual, &mut problems);
		if !problems.is_empty() {
			warn!(problems = problems.len(), "index verification failed");
			return Err(Error::IndexCorruption(problems.join("; ")));
		}
		Ok(VerifySummary { keyword_artifacts: keyword_actual.len(), vector_artifacts: vector_actual.len() })
	}

	fn progress_bar(&self, len: usize) -> ProgressBar {
		let pb = ProgressBar::new(len as u64);
		if !self.options.show_progress {
			pb.set_draw_target(ProgressDrawTarget::hidden());
			return pb;
		}
		if let Ok(style) = ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents {msg}") {
			pb.set_style(style.progress_chars("#>-"));
		}
		pb
	}
}

fn empty_record(entry: &DocumentEntry, params: ChunkParams) -> DocRecord {
	DocRecord {
		meta: entry.meta.clone(),
		fingerprint: entry.fingerprint.clone(),
		chunk_params: params,
		keyword: None,
		vector: None,
		last_error: None,
		stale: false,
	}
}

fn keyword_artifact(record: &DocRecord) -> Option<&Artifact> {
	record.keyword.as_ref()
}

fn vector_artifact(record: &DocRecord) -> Option<&Artifact> {
	record.vector.as_ref()
}

/// Artifact keys and chunk counts the state expects an index to hold.
fn expected_artifacts(state: &IndexState, pick: fn(&DocRecord) -> Option<&Artifact>) -> BTreeMap<String, usize> {
	state
		.documents
		.iter()
		.filter_map(|(id, r)| pick(r).map(|a| (fingerprint::artifact_key(id, &a.revision), a.chunk_count)))
		.filter(|(_, count)| *count > 0)
		.collect()
}

fn describe_mismatch(
	index: &str,
	expected: &BTreeMap<String, usize>,
	actual: &BTreeMap<String, usize>,
	problems: &mut Vec<String>,
) {
	let missing: Vec<&str> = expected.keys().filter(|k| !actual.contains_key(*k)).map(String::as_str).collect();
	let extra: Vec<&str> = actual.keys().filter(|k| !expected.contains_key(*k)).map(String::as_str).collect();
	let miscounted: Vec<&str> = expected
		.iter()
		.filter(|(k, n)| actual.get(*k).is_some_and(|a| a != *n))
		.map(|(k, _)| k.as_str())
		.collect();
	if !missing.is_empty() {
		problems.push(format!("{index} index is missing {}", missing.join(", ")));
	}
	if !extra.is_empty() {
		problems.push(format!("{index} index has unreferenced {}", extra.join(", ")));
	}
	if !miscounted.is_empty() {
		problems.push(format!("{index} chunk counts differ for {}", miscounted.join(", ")));
	}
}
