//! Embedding backends: local BGE-M3 through candle, and a deterministic
//! hashing embedder used for tests and model-free setups.

pub mod hashing;
pub mod model;

use std::sync::Arc;

use tracing::info;

use newsdb_core::config::{EmbeddingConfig, EmbeddingProvider};
use newsdb_core::traits::Embedder;
use newsdb_core::Result;

pub use hashing::HashingEmbedder;
pub use model::{masked_mean_l2, resolve_model_dir, BgeM3Embedder};

/// Builds the configured embedder. `APP_USE_FAKE_EMBEDDINGS=1` forces the
/// hashing backend.
pub fn embedder_from_config(cfg: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    let provider = if newsdb_core::config::use_fake_embeddings() { EmbeddingProvider::Hash } else { cfg.provider };
    match provider {
        EmbeddingProvider::Hash => {
            info!(dim = cfg.dim, "using hashing embedder");
            Ok(Arc::new(HashingEmbedder::new(cfg.dim)?))
        }
        EmbeddingProvider::Local => {
            let dir = resolve_model_dir(cfg.model_dir.as_deref())?;
            Ok(Arc::new(BgeM3Embedder::load(&dir, cfg.max_tokens)?))
        }
    }
}
