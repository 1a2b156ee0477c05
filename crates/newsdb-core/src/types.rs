//! Domain types shared by the keyword index, vector index and orchestrators.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub type DocumentId = String;
pub type ChunkId = String;

/// Metadata the content store supplies for each newsletter issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMeta {
    /// Sender address, stored lowercased.
    pub sender: String,
    /// Publication (sender display) name.
    pub publication: String,
    pub date: DateTime<Utc>,
    pub title: String,
    pub word_count: usize,
}

/// A listing row from the content store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentEntry {
    pub id: DocumentId,
    pub meta: DocumentMeta,
    pub fingerprint: String,
}

/// Chunking parameters; part of a chunk's identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkParams {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

/// A bounded, possibly overlapping span of a document's indexed body.
///
/// `span_start..span_end` are byte offsets into the cleaned body the chunk
/// was cut from; `id` is `"{doc_id}#{position}"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub doc_id: DocumentId,
    pub position: usize,
    pub span_start: usize,
    pub span_end: usize,
    pub text: String,
}

pub fn chunk_id(doc_id: &str, position: usize) -> ChunkId {
    format!("{doc_id}#{position}")
}

/// Chunks of one document at one revision, ready to be written to an index.
#[derive(Debug, Clone)]
pub struct ChunkBatch {
    pub artifact_key: String,
    pub title: String,
    pub chunks: Vec<Chunk>,
}

/// Indicates which engine produced a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SourceKind {
    Vector,
    Text,
    Hybrid,
}

/// The minimal surface returned by both index engines. Higher is better.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: ChunkId,
    pub doc_id: DocumentId,
    pub artifact_key: String,
    pub position: usize,
    pub span_start: usize,
    pub span_end: usize,
    pub text: String,
    pub score: f32,
    pub source: SourceKind,
    pub snippet: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    pub sender: Option<String>,
    pub since: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
}

impl SearchFilters {
    /// The sender filter is a case-insensitive substring of either the
    /// sender address or the publication name.
    pub fn matches(&self, meta: &DocumentMeta) -> bool {
        if let Some(sender) = &self.sender {
            let needle = sender.trim().to_lowercase();
            let hit = meta.sender.to_lowercase().contains(&needle) || meta.publication.to_lowercase().contains(&needle);
            if !hit {
                return false;
            }
        }
        let day = meta.date.date_naive();
        if self.since.is_some_and(|since| day < since) {
            return false;
        }
        if self.until.is_some_and(|until| day > until) {
            return false;
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self.sender.is_none() && self.since.is_none() && self.until.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildMode {
    #[default]
    Incremental,
    Full,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexTarget {
    FtsOnly,
    VectorOnly,
    #[default]
    Both,
}

impl IndexTarget {
    pub fn keyword(self) -> bool {
        matches!(self, Self::FtsOnly | Self::Both)
    }

    pub fn vector(self) -> bool {
        matches!(self, Self::VectorOnly | Self::Both)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetrievalMode {
    Keyword,
    Semantic,
    Hybrid,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn meta(sender: &str, y: i32, m: u32, d: u32) -> DocumentMeta {
        DocumentMeta {
            sender: sender.to_string(),
            publication: "Pub".into(),
            date: Utc.with_ymd_and_hms(y, m, d, 9, 30, 0).unwrap(),
            title: "t".into(),
            word_count: 1,
        }
    }

    #[test]
    fn sender_filter_matches_address_or_publication_name() {
        let f = SearchFilters { sender: Some("A@Example.com".into()), ..Default::default() };
        assert!(f.matches(&meta("a@example.com", 2025, 1, 1)));
        assert!(!f.matches(&meta("b@example.com", 2025, 1, 1)));

        let mut money = meta("noreply@bloomberg.net", 2025, 1, 1);
        money.publication = "Money Stuff".into();
        let by_name = SearchFilters { sender: Some("money stuff".into()), ..Default::default() };
        assert!(by_name.matches(&money));
        let by_domain = SearchFilters { sender: Some("Bloomberg".into()), ..Default::default() };
        assert!(by_domain.matches(&money));
        assert!(!by_name.matches(&meta("a@example.com", 2025, 1, 1)));
    }

    #[test]
    fn date_range_is_inclusive() {
        let f = SearchFilters {
            since: NaiveDate::from_ymd_opt(2025, 1, 1),
            until: NaiveDate::from_ymd_opt(2025, 2, 1),
            ..Default::default()
        };
        assert!(f.matches(&meta("x", 2025, 1, 1)));
        assert!(f.matches(&meta("x", 2025, 2, 1)));
        assert!(!f.matches(&meta("x", 2025, 3, 1)));
    }
}
