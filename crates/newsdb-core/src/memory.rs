use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use crate::error::{Error, Result};
use crate::fingerprint::fingerprint;
use crate::traits::ContentStore;
use crate::types::{DocumentEntry, DocumentMeta};

/// In-memory content store. Bodies can be swapped, removed or made
/// unreadable between builds.
#[derive(Default)]
pub struct MemoryStore {
    docs: RwLock<BTreeMap<String, (DocumentMeta, String)>>,
    unreadable: RwLock<BTreeSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: impl Into<String>, meta: DocumentMeta, body: impl Into<String>) {
        if let Ok(mut docs) = self.docs.write() {
            docs.insert(id.into(), (meta, body.into()));
        }
    }

    pub fn remove(&self, id: &str) {
        if let Ok(mut docs) = self.docs.write() {
            docs.remove(id);
        }
    }

    pub fn set_unreadable(&self, id: &str, unreadable: bool) {
        if let Ok(mut set) = self.unreadable.write() {
            if unreadable {
                set.insert(id.to_string());
            } else {
                set.remove(id);
            }
        }
    }
}

impl ContentStore for MemoryStore {
    fn list_documents(&self) -> Result<Vec<DocumentEntry>> {
        let docs = self.docs.read().map_err(|e| Error::StoreUnavailable(e.to_string()))?;
        Ok(docs
            .iter()
            .map(|(id, (meta, body))| DocumentEntry { id: id.clone(), meta: meta.clone(), fingerprint: fingerprint(body) })
            .collect())
    }

    fn get_body(&self, id: &str) -> Result<String> {
        let unreadable = self.unreadable.read().map_err(|e| Error::StoreUnavailable(e.to_string()))?;
        if unreadable.contains(id) {
            return Err(Error::ContentUnavailable { id: id.to_string(), reason: "marked unreadable".into() });
        }
        let docs = self.docs.read().map_err(|e| Error::StoreUnavailable(e.to_string()))?;
        docs.get(id)
            .map(|(_, body)| body.clone())
            .ok_or_else(|| Error::ContentUnavailable { id: id.to_string(), reason: "not in store".into() })
    }
}
