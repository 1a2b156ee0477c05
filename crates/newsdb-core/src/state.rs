//! Per-document index state and its JSON persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::fingerprint::{self, ChangeKind, Recorded};
use crate::types::{ChunkParams, DocumentEntry, DocumentId, DocumentMeta, SearchFilters};

pub const STATE_FORMAT_VERSION: u32 = 1;

/// One index's artifacts for a document at a given revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub revision: String,
    pub chunk_count: usize,
    pub indexed_at: DateTime<Utc>,
    /// Embedding model version; only set for vector artifacts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocRecord {
    pub meta: DocumentMeta,
    /// Fingerprint and chunking of the artifacts last written.
    pub fingerprint: String,
    pub chunk_params: ChunkParams,
    pub keyword: Option<Artifact>,
    pub vector: Option<Artifact>,
    pub last_error: Option<String>,
    /// Set by reconciliation when the content store reports a different fingerprint.
    #[serde(default)]
    pub stale: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocState {
    Unindexed,
    Indexed,
    Stale,
}

impl DocRecord {
    pub fn revision(&self) -> String {
        fingerprint::revision(&self.fingerprint, self.chunk_params)
    }

    pub fn recorded(&self) -> Recorded<'_> {
        Recorded { fingerprint: &self.fingerprint, params: self.chunk_params }
    }

    /// Current revision of the keyword artifacts, if they match the record.
    pub fn current_keyword(&self) -> Option<&Artifact> {
        let rev = self.revision();
        self.keyword.as_ref().filter(|a| a.revision == rev)
    }

    /// Current vector artifacts for `model_version`, if they match the record.
    pub fn current_vector(&self, model_version: &str) -> Option<&Artifact> {
        let rev = self.revision();
        self.vector
            .as_ref()
            .filter(|a| a.revision == rev && a.model_version.as_deref() == Some(model_version))
    }

    pub fn state(&self, model_version: &str) -> DocState {
        if self.stale {
            return DocState::Stale;
        }
        let keyword = self.current_keyword().is_some();
        let vector = self.current_vector(model_version).is_some();
        if keyword && vector {
            DocState::Indexed
        } else if self.keyword.is_some() || self.vector.is_some() {
            DocState::Stale
        } else {
            DocState::Unindexed
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexState {
    pub format_version: u32,
    pub last_build: Option<DateTime<Utc>>,
    pub documents: BTreeMap<DocumentId, DocRecord>,
}

impl IndexState {
    pub fn new() -> Self {
        Self { format_version: STATE_FORMAT_VERSION, ..Self::default() }
    }

    pub fn classify(&self, entry: &DocumentEntry, params: ChunkParams) -> ChangeKind {
        let recorded = self.documents.get(&entry.id).map(DocRecord::recorded);
        fingerprint::classify(Some(&entry.fingerprint), params, recorded).unwrap_or(ChangeKind::New)
    }

    /// Ids of every recorded document; the checkpoint for deletion detection.
    pub fn checkpoint(&self) -> BTreeSet<DocumentId> {
        self.documents.keys().cloned().collect()
    }

    /// Artifact keys of keyword postings readers may see under `filters`.
    pub fn visible_keyword_keys(&self, filters: &SearchFilters) -> BTreeSet<String> {
        self.documents
            .iter()
            .filter(|(_, r)| !r.stale && filters.matches(&r.meta))
            .filter_map(|(id, r)| r.current_keyword().map(|a| fingerprint::artifact_key(id, &a.revision)))
            .collect()
    }

    /// Artifact keys of vector records readers may see under `filters`.
    pub fn visible_vector_keys(&self, filters: &SearchFilters, model_version: &str) -> BTreeSet<String> {
        self.documents
            .iter()
            .filter(|(_, r)| !r.stale && filters.matches(&r.meta))
            .filter_map(|(id, r)| r.current_vector(model_version).map(|a| fingerprint::artifact_key(id, &a.revision)))
            .collect()
    }

    /// Every keyword artifact key the state still references, stale or not.
    pub fn referenced_keyword_keys(&self) -> BTreeSet<String> {
        self.documents
            .iter()
            .filter_map(|(id, r)| r.keyword.as_ref().map(|a| fingerprint::artifact_key(id, &a.revision)))
            .collect()
    }

    pub fn referenced_vector_keys(&self) -> BTreeSet<String> {
        self.documents
            .iter()
            .filter_map(|(id, r)| r.vector.as_ref().map(|a| fingerprint::artifact_key(id, &a.revision)))
            .collect()
    }
}

/// Loads and saves [`IndexState`]; `None` path keeps state in memory only.
#[derive(Debug, Clone, Default)]
pub struct StateStore {
    path: Option<PathBuf>,
}

impl StateStore {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: Some(path.into()) }
    }

    pub fn in_memory() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn load(&self) -> Result<IndexState> {
        let Some(path) = &self.path else { return Ok(IndexState::new()) };
        if !path.exists() {
            return Ok(IndexState::new());
        }
        let raw = fs::read_to_string(path)?;
        let state: IndexState = serde_json::from_str(&raw)
            .map_err(|e| Error::IndexCorruption(format!("unreadable index state {}: {e}", path.display())))?;
        if state.format_version != STATE_FORMAT_VERSION {
            return Err(Error::IndexCorruption(format!(
                "index state format {} is not supported (expected {STATE_FORMAT_VERSION})",
                state.format_version
            )));
        }
        Ok(state)
    }

    /// Writes to a temp file in the same directory, then renames over the old one.
    pub fn save(&self, state: &IndexState) -> Result<()> {
        let Some(path) = &self.path else { return Ok(()) };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(state)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}
