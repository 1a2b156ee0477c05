//! Content fingerprints and change classification.
//!
//! A fingerprint is the blake3 hash of the body after removing formatting
//! noise that mail providers inject (zero-width padding, soft hyphens, NBSP,
//! line-ending and whitespace variations), so a re-fetched issue that only
//! differs by that noise keeps its fingerprint.

use serde::{Deserialize, Serialize};

use crate::types::ChunkParams;

const INVISIBLE: &[char] = &[
    '\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}', '\u{00AD}', '\u{034F}', '\u{180E}',
];

pub fn normalize(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut pending_space = false;
    for ch in body.chars() {
        if INVISIBLE.contains(&ch) {
            continue;
        }
        if ch.is_whitespace() || ch == '\u{00A0}' {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(ch);
    }
    out
}

pub fn fingerprint(body: &str) -> String {
    blake3::hash(normalize(body).as_bytes()).to_hex().to_string()
}

/// Short revision tag for a document's artifacts: changes whenever either
/// the content or the chunking parameters change.
pub fn revision(fingerprint: &str, params: ChunkParams) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(fingerprint.as_bytes());
    hasher.update(&(params.max_chars as u64).to_le_bytes());
    hasher.update(&(params.overlap_chars as u64).to_le_bytes());
    let hex = hasher.finalize().to_hex();
    hex[..16].to_string()
}

pub fn artifact_key(doc_id: &str, revision: &str) -> String {
    format!("{doc_id}@{revision}")
}

/// Splits an artifact key back into `(doc_id, revision)`.
pub fn parse_artifact_key(key: &str) -> Option<(&str, &str)> {
    key.rsplit_once('@')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    New,
    Changed,
    Unchanged,
    Deleted,
}

/// What the tracker last recorded for a document.
#[derive(Debug, Clone, Copy)]
pub struct Recorded<'a> {
    pub fingerprint: &'a str,
    pub params: ChunkParams,
}

/// Classifies a document given its current fingerprint (`None` when the
/// content store no longer lists it) and the last recorded one.
pub fn classify(
    current: Option<&str>,
    params: ChunkParams,
    recorded: Option<Recorded<'_>>,
) -> Option<ChangeKind> {
    match (current, recorded) {
        (None, None) => None,
        (None, Some(_)) => Some(ChangeKind::Deleted),
        (Some(_), None) => Some(ChangeKind::New),
        (Some(fp), Some(r)) if fp == r.fingerprint && params == r.params => Some(ChangeKind::Unchanged),
        (Some(_), Some(_)) => Some(ChangeKind::Changed),
    }
}
