#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use newsdb_core::config::RetrievalConfig;
use newsdb_core::memory::MemoryStore;
use newsdb_core::state::StateStore;
use newsdb_core::traits::{Embedder, TextGenerator};
use newsdb_core::types::{ChunkParams, DocumentMeta};
use newsdb_core::{Error, Result};
use newsdb_embed::HashingEmbedder;
use newsdb_hybrid::{IndexManager, ManagerOptions, Retriever};
use newsdb_text::KeywordIndex;
use newsdb_vector::VectorIndex;

pub const DIM: usize = 256;

pub fn meta(sender: &str, month: u32, title: &str) -> DocumentMeta {
	DocumentMeta {
		sender: sender.to_string(),
		publication: sender.split('@').next().unwrap_or(sender).to_uppercase(),
		date: Utc.with_ymd_and_hms(2025, month, 1, 9, 0, 0).unwrap(),
		title: title.to_string(),
		word_count: 0,
	}
}

/// Two letters from a@news.com and one from b@news.com, a month apart.
pub fn seed(store: &MemoryStore) {
	store.insert("a1", meta("a@news.com", 1, "Battery metals"), "Lithium supply chains tightened across the battery sector.");
	store.insert("a2", meta("a@news.com", 2, "Rates"), "Central banks kept interest rates unchanged this month.");
	store.insert("b1", meta("b@news.com", 3, "Mining"), "Lithium prices fell as new mines opened.");
}

/// Hashing embedder that can be told to fail on texts containing a word.
pub struct FlakyEmbedder {
	inner: HashingEmbedder,
	version: String,
	fail_on: String,
	pub failing: AtomicBool,
}

impl FlakyEmbedder {
	pub fn new(version: &str, fail_on: &str) -> Self {
		Self {
			inner: HashingEmbedder::new(DIM).unwrap(),
			version: version.to_string(),
			fail_on: fail_on.to_string(),
			failing: AtomicBool::new(!fail_on.is_empty()),
		}
	}

	pub fn plain(version: &str) -> Self {
		Self::new(version, "")
	}
}

impl Embedder for FlakyEmbedder {
	fn model_version(&self) -> &str {
		&self.version
	}

	fn dim(&self) -> usize {
		DIM
	}

	fn max_len(&self) -> usize {
		512
	}

	fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
		if self.failing.load(Ordering::SeqCst) && texts.iter().any(|t| t.contains(&self.fail_on)) {
			return Err(Error::EmbeddingUnavailable("model crashed".into()));
		}
		self.inner.embed_batch(texts)
	}
}

pub enum Reply {
	Text(&'static str),
	Fail,
	Hang,
}

pub struct FakeGenerator {
	reply: Reply,
	pub calls: AtomicUsize,
}

impl FakeGenerator {
	pub fn new(reply: Reply) -> Self {
		Self { reply, calls: AtomicUsize::new(0) }
	}
}

#[async_trait]
impl TextGenerator for FakeGenerator {
	async fn generate(&self, _system: &str, _prompt: &str, _model: Option<&str>) -> Result<String> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		match self.reply {
			Reply::Text(t) => Ok(t.to_string()),
			Reply::Fail => Err(Error::GenerationUnavailable("API error (529): overloaded".into())),
			Reply::Hang => {
				tokio::time::sleep(Duration::from_secs(30)).await;
				Ok("too late".into())
			}
		}
	}
}

pub struct Harness {
	pub tmp: TempDir,
	pub store: Arc<MemoryStore>,
	pub keyword: Arc<KeywordIndex>,
	pub vector: Arc<VectorIndex>,
	pub manager: Arc<IndexManager>,
}

pub fn options() -> ManagerOptions {
	ManagerOptions {
		chunk_params: ChunkParams { max_chars: 200, overlap_chars: 40 },
		embed_batch_size: 4,
		embed_timeout: Duration::from_secs(30),
		show_progress: false,
	}
}

impl Harness {
	pub async fn new(embedder: Arc<dyn Embedder>) -> Self {
		let tmp = TempDir::new().unwrap();
		let store = Arc::new(MemoryStore::new());
		seed(&store);
		let keyword = Arc::new(KeywordIndex::in_memory().unwrap());
		let vector = Arc::new(VectorIndex::open(&tmp.path().join("vector"), DIM, 10_000).await.unwrap());
		let manager = Arc::new(
			IndexManager::new(
				store.clone(),
				keyword.clone(),
				vector.clone(),
				embedder,
				StateStore::at(tmp.path().join("state.json")),
				options(),
			)
			.unwrap(),
		);
		Self { tmp, store, keyword, vector, manager }
	}

	/// A second manager over the same store, indexes and state file.
	pub fn reopen(&self, embedder: Arc<dyn Embedder>) -> Arc<IndexManager> {
		Arc::new(
			IndexManager::new(
				self.store.clone(),
				self.keyword.clone(),
				self.vector.clone(),
				embedder,
				StateStore::at(self.tmp.path().join("state.json")),
				options(),
			)
			.unwrap(),
		)
	}

	pub fn retriever(&self) -> Arc<Retriever> {
		Arc::new(Retriever::new(self.manager.clone(), RetrievalConfig::default()))
	}
}
