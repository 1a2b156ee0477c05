//! Index management and retrieval over the keyword and vector indexes.

pub mod answer;
pub mod generate;
pub mod manager;
pub mod retrieve;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use newsdb_core::archive::ArchiveStore;
use newsdb_core::config::Settings;
use newsdb_core::state::StateStore;
use newsdb_core::traits::TextGenerator;
use newsdb_core::Result;
use newsdb_embed::embedder_from_config;
use newsdb_text::KeywordIndex;
use newsdb_vector::VectorIndex;

pub use answer::{Answer, AnswerAssembler, Citation};
pub use generate::AnthropicGenerator;
pub use manager::{BuildFailure, BuildReport, IndexManager, IndexStatus, ManagerOptions, Snapshot, VerifySummary};
pub use retrieve::{best_per_document, fuse, FusionWeights, Retrieved, Retriever};

/// Opens the archive, both indexes and the state under the configured
/// paths, and wires them into a manager and retriever.
pub async fn open(settings: &Settings, show_progress: bool) -> Result<Arc<Retriever>> {
	let store = Arc::new(ArchiveStore::new(&settings.paths.archive_dir));
	let keyword = Arc::new(KeywordIndex::open(&settings.paths.keyword_dir())?);
	let embedder = embedder_from_config(&settings.embedding)?;
	let vector = Arc::new(VectorIndex::open(&settings.paths.vector_dir(), embedder.dim(), settings.vector.ann_threshold).await?);
	let state_store = StateStore::at(settings.paths.state_file());
	info!(
		archive = %settings.paths.archive_dir.display(),
		index = %settings.paths.index_dir.display(),
		model_version = embedder.model_version(),
		"opened newsletter index"
	);

	let options = ManagerOptions { show_progress, ..ManagerOptions::from_settings(settings) };
	let manager = IndexManager::new(store, keyword, vector, embedder, state_store, options)?;
	Ok(Arc::new(Retriever::new(Arc::new(manager), settings.retrieval.clone())))
}

/// Builds an answer assembler backed by the Anthropic API.
pub fn assembler(settings: &Settings, retriever: Arc<Retriever>) -> Result<AnswerAssembler> {
	let generator: Arc<dyn TextGenerator> = Arc::new(AnthropicGenerator::from_config(&settings.generation)?);
	Ok(AnswerAssembler::new(retriever, generator, Duration::from_secs(settings.generation.timeout_secs)))
}
