use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::Result;
use crate::types::{ChunkBatch, DocumentEntry, DocumentId, SearchHit};

/// Read-only source of newsletter documents.
pub trait ContentStore: Send + Sync {
    fn list_documents(&self) -> Result<Vec<DocumentEntry>>;
    fn get_body(&self, id: &str) -> Result<String>;

    /// Ids from `checkpoint` that the store no longer lists.
    fn deleted_ids_since(&self, checkpoint: &BTreeSet<DocumentId>) -> Result<BTreeSet<DocumentId>> {
        let listed: BTreeSet<DocumentId> = self.list_documents()?.into_iter().map(|d| d.id).collect();
        Ok(checkpoint.difference(&listed).cloned().collect())
    }
}

/// An embedding plus the tag of the model that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub model_version: String,
}

pub trait Embedder: Send + Sync {
    /// Stable tag, e.g. `local:bge-m3:d1024`; vectors from different tags never mix.
    fn model_version(&self) -> &str;
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> Result<Embedding> {
        let vector = self
            .embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| crate::Error::EmbeddingUnavailable("embedder returned no vector".into()))?;
        Ok(Embedding { vector, model_version: self.model_version().to_string() })
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// `model` overrides the configured default when set.
    async fn generate(&self, system: &str, prompt: &str, model: Option<&str>) -> Result<String>;
}

/// Keyword (inverted) index over chunks. Writes are synchronous and commit
/// before returning.
pub trait TextIndexer: Send + Sync {
    /// Replaces everything stored under `batch.artifact_key`; returns chunks written.
    fn upsert(&self, batch: &ChunkBatch) -> Result<usize>;
    fn remove_key(&self, artifact_key: &str) -> Result<()>;
    fn remove_document(&self, doc_id: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;
    /// Chunk count per artifact key.
    fn keys(&self) -> Result<BTreeMap<String, usize>>;
    /// Ranked hits restricted to chunks whose artifact key is in `visible`.
    fn search(&self, query: &str, visible: &BTreeSet<String>, k: usize) -> Result<Vec<SearchHit>>;
    /// Like `search`, but any term may match and malformed syntax is skipped
    /// rather than rejected. Meant for natural-language questions.
    fn search_any(&self, query: &str, visible: &BTreeSet<String>, k: usize) -> Result<Vec<SearchHit>>;
}

#[async_trait]
pub trait VectorIndexer: Send + Sync {
    async fn upsert(&self, batch: &ChunkBatch, embeddings: &[Vec<f32>], model_version: &str) -> Result<usize>;
    async fn remove_key(&self, artifact_key: &str) -> Result<()>;
    async fn remove_document(&self, doc_id: &str) -> Result<()>;
    /// Deletes every record not embedded with `model_version`; returns rows removed.
    async fn purge_foreign(&self, model_version: &str) -> Result<usize>;
    async fn clear(&self) -> Result<()>;
    async fn keys(&self) -> Result<BTreeMap<String, usize>>;
    /// Nearest neighbours among records with the query's model version and a visible key.
    async fn search_vec(
        &self,
        query: &crate::traits::Embedding,
        visible: &BTreeSet<String>,
        k: usize,
    ) -> Result<Vec<SearchHit>>;

    /// Post-build maintenance such as approximate index training. `changed`
    /// is false when the build wrote nothing.
    async fn optimize(&self, _changed: bool) -> Result<()> {
        Ok(())
    }
}
