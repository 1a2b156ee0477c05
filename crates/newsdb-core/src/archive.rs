//! Content store over the markdown archive
//! (`YYYY/MM/<sender>/YYYY-MM-DD_<slug>.md`, each with a small frontmatter block).

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::chunker::clean_for_indexing;
use crate::error::{Error, Result};
use crate::fingerprint::fingerprint;
use crate::traits::ContentStore;
use crate::types::{DocumentEntry, DocumentId, DocumentMeta};

pub struct ArchiveStore {
    root: PathBuf,
}

impl ArchiveStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        if id.split('/').any(|part| part == ".." || part.is_empty()) {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(self.root.join(id))
    }

    fn list_md_files(&self) -> Result<Vec<PathBuf>> {
        if !self.root.is_dir() {
            return Err(Error::StoreUnavailable(format!("archive directory {} is not readable", self.root.display())));
        }
        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(&self.root).follow_links(true) {
            let entry = entry.map_err(|e| Error::StoreUnavailable(e.to_string()))?;
            if entry.file_type().is_file() && entry.path().extension().and_then(|s| s.to_str()) == Some("md") {
                files.push(entry.into_path());
            }
        }
        files.sort();
        Ok(files)
    }

    fn doc_id(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl ContentStore for ArchiveStore {
    fn list_documents(&self) -> Result<Vec<DocumentEntry>> {
        let files = self.list_md_files()?;
        let mut entries = Vec::with_capacity(files.len());
        for path in files {
            let id = self.doc_id(&path);
            match fs::read_to_string(&path) {
                Ok(raw) => {
                    let meta = parse_meta(&id, &raw);
                    entries.push(DocumentEntry { id, meta, fingerprint: fingerprint(&raw) });
                }
                Err(e) => {
                    // Listed with an empty fingerprint so the build retries and records the failure.
                    warn!(doc_id = %id, error = %e, "archive file unreadable");
                    let meta = parse_meta(&id, "");
                    entries.push(DocumentEntry { id, meta, fingerprint: String::new() });
                }
            }
        }
        debug!(count = entries.len(), root = %self.root.display(), "listed archive");
        Ok(entries)
    }

    /// Checks file existence directly instead of re-reading the archive.
    fn deleted_ids_since(&self, checkpoint: &BTreeSet<DocumentId>) -> Result<BTreeSet<DocumentId>> {
        if !self.root.is_dir() {
            return Err(Error::StoreUnavailable(format!("archive directory {} is not readable", self.root.display())));
        }
        Ok(checkpoint
            .iter()
            .filter(|id| self.path_for(id).map_or(true, |p| !p.is_file()))
            .cloned()
            .collect())
    }

    fn get_body(&self, id: &str) -> Result<String> {
        let path = self.path_for(id)?;
        fs::read_to_string(&path).map_err(|e| Error::ContentUnavailable { id: id.to_string(), reason: e.to_string() })
    }
}

/// Frontmatter fields, with the path as fallback for date and sender.
fn parse_meta(id: &str, raw: &str) -> DocumentMeta {
    let mut title = None;
    let mut from = None;
    let mut date = None;
    if let Some(rest) = raw.strip_prefix("---\n").or_else(|| raw.strip_prefix("---\r\n")) {
        for line in rest.lines() {
            let line = line.trim_end();
            if line == "---" {
                break;
            }
            if let Some((key, value)) = line.split_once(':') {
                let value = unquote(value.trim());
                match key.trim() {
                    "title" | "subject" => title = Some(value.to_string()),
                    "from" | "sender" => from = Some(value.to_string()),
                    "date" => date = parse_date(value),
                    _ => {}
                }
            }
        }
    }

    let parts: Vec<&str> = id.split('/').collect();
    let file_stem = parts.last().map_or("", |f| f.trim_end_matches(".md"));
    let sender_dir = if parts.len() >= 2 { parts[parts.len() - 2] } else { "" };
    let (publication, sender) = split_sender(from.as_deref().unwrap_or(sender_dir));
    let date = date
        .or_else(|| file_stem.get(..10).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()).and_then(midnight))
        .unwrap_or_default();
    let title = title.unwrap_or_else(|| file_stem.split_once('_').map_or(file_stem, |(_, slug)| slug).replace('-', " "));

    DocumentMeta {
        sender,
        publication,
        date,
        title,
        word_count: clean_for_indexing(raw).split_whitespace().count(),
    }
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"').and_then(|s| s.strip_suffix('"')).unwrap_or(s)
}

/// `"Name <addr>"` into (publication, lowercased address).
fn split_sender(from: &str) -> (String, String) {
    match (from.find('<'), from.rfind('>')) {
        (Some(lt), Some(gt)) if lt < gt => {
            let name = from[..lt].trim().trim_matches('"').to_string();
            let addr = from[lt + 1..gt].trim().to_lowercase();
            let name = if name.is_empty() { addr.clone() } else { name };
            (name, addr)
        }
        _ => (from.trim().to_string(), from.trim().to_lowercase()),
    }
}

fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&dt));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().and_then(midnight)
}

fn midnight(d: NaiveDate) -> Option<DateTime<Utc>> {
    d.and_hms_opt(0, 0, 0).map(|dt| Utc.from_utc_datetime(&dt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_frontmatter_sender_and_date() {
        let raw = "---\ntitle: \"Rates Weekly\"\nfrom: \"Money Stuff <Money@Example.com>\"\ndate: 2025-02-01 08:15:00+00:00\n---\n\nBody text here.";
        let meta = parse_meta("2025/02/money-stuff/2025-02-01_rates-weekly.md", raw);
        assert_eq!(meta.title, "Rates Weekly");
        assert_eq!(meta.publication, "Money Stuff");
        assert_eq!(meta.sender, "money@example.com");
        assert_eq!(meta.date.date_naive(), NaiveDate::from_ymd_opt(2025, 2, 1).unwrap());
        assert_eq!(meta.word_count, 3);
    }

    #[test]
    fn falls_back_to_path_when_frontmatter_missing() {
        let meta = parse_meta("2024/11/some-sender/2024-11-05_hello-world.md", "just text");
        assert_eq!(meta.title, "hello world");
        assert_eq!(meta.sender, "some-sender");
        assert_eq!(meta.date.date_naive(), NaiveDate::from_ymd_opt(2024, 11, 5).unwrap());
    }

    #[test]
    fn lists_markdown_files_with_relative_ids() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("2025/01/a");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("2025-01-01_first.md"), "---\ntitle: First\n---\nhello").unwrap();
        fs::write(dir.join("2025-01-01_first.html"), "<p>hello</p>").unwrap();
        let store = ArchiveStore::new(tmp.path());
        let docs = store.list_documents().unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "2025/01/a/2025-01-01_first.md");
        assert!(store.get_body(&docs[0].id).unwrap().contains("hello"));
        assert!(matches!(store.get_body("2025/01/a/missing.md"), Err(Error::ContentUnavailable { .. })));

        let checkpoint: BTreeSet<DocumentId> = [docs[0].id.clone(), "2024/12/a/gone.md".to_string()].into();
        let gone = store.deleted_ids_since(&checkpoint).unwrap();
        assert_eq!(gone.into_iter().collect::<Vec<_>>(), vec!["2024/12/a/gone.md".to_string()]);
    }

    #[test]
    fn missing_root_is_store_unavailable() {
        let store = ArchiveStore::new("/definitely/not/here");
        assert!(matches!(store.list_documents(), Err(Error::StoreUnavailable(_))));
    }
}
