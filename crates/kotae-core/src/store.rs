//! # Entry Store
//!
//! The contract between the matcher and the system of record. The matcher
//! only ever calls [`EntryStore::list_active`] when it rebuilds; the
//! mutation methods are what the knowledge-base workflow routes admin
//! edits through before asking for a rebuild.

use std::collections::BTreeMap;
use std::io::Read;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{KotaeError, Result};
use crate::types::{EntryId, EntryRecord, KnowledgeEntry};

/// Source of knowledge-base entries.
pub trait EntryStore: Send + Sync {
    /// All entries with `active = true`.
    fn list_active(&self) -> Result<Vec<KnowledgeEntry>>;

    /// All entries, active or not.
    fn list_all(&self) -> Result<Vec<KnowledgeEntry>>;

    /// Fetches one entry by id.
    fn get(&self, id: &EntryId) -> Result<Option<KnowledgeEntry>>;

    /// Inserts a new entry.
    ///
    /// Implementations should reject an id that already exists.
    fn insert(&self, entry: KnowledgeEntry) -> Result<()>;

    /// Replaces an existing entry.
    fn update(&self, entry: KnowledgeEntry) -> Result<()>;

    /// Deletes an entry. Returns `false` if it did not exist.
    fn delete(&self, id: &EntryId) -> Result<bool>;
}

/// In-memory [`EntryStore`] for tests, tools and embedding hosts without a
/// database.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<EntryId, KnowledgeEntry>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `entries`; later duplicates of an id replace
    /// earlier ones.
    #[must_use]
    pub fn with_entries(entries: impl IntoIterator<Item = KnowledgeEntry>) -> Self {
        let map = entries.into_iter().map(|e| (e.id.clone(), e)).collect();
        Self {
            entries: RwLock::new(map),
        }
    }

    /// Loads a knowledge-base JSON array (see [`EntryRecord`]).
    ///
    /// # Errors
    ///
    /// Returns `KotaeError::Decode` on malformed JSON and
    /// `KotaeError::InvalidEntry` if a record violates the data model or
    /// reuses an id.
    pub fn from_json_reader(reader: impl Read) -> Result<Self> {
        let records: Vec<EntryRecord> = serde_json::from_reader(reader)?;
        let mut map = BTreeMap::new();
        for (position, record) in records.into_iter().enumerate() {
            let entry = record.into_entry(position)?;
            if map.contains_key(&entry.id) {
                return Err(KotaeError::InvalidEntry(format!(
                    "duplicate entry id {} in knowledge base file",
                    entry.id
                )));
            }
            map.insert(entry.id.clone(), entry);
        }
        debug!(entries = map.len(), "loaded knowledge base file");
        Ok(Self {
            entries: RwLock::new(map),
        })
    }

    /// Loads a knowledge-base JSON array from a string.
    ///
    /// # Errors
    ///
    /// See [`MemoryStore::from_json_reader`].
    pub fn from_json_str(json: &str) -> Result<Self> {
        Self::from_json_reader(json.as_bytes())
    }

    /// Number of stored entries, active or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl EntryStore for MemoryStore {
    fn list_active(&self) -> Result<Vec<KnowledgeEntry>> {
        Ok(self
            .entries
            .read()
            .values()
            .filter(|e| e.active)
            .cloned()
            .collect())
    }

    fn list_all(&self) -> Result<Vec<KnowledgeEntry>> {
        Ok(self.entries.read().values().cloned().collect())
    }

    fn get(&self, id: &EntryId) -> Result<Option<KnowledgeEntry>> {
        Ok(self.entries.read().get(id).cloned())
    }

    fn insert(&self, entry: KnowledgeEntry) -> Result<()> {
        let mut entries = self.entries.write();
        if entries.contains_key(&entry.id) {
            return Err(KotaeError::Store(format!("entry {} already exists", entry.id)));
        }
        entries.insert(entry.id.clone(), entry);
        Ok(())
    }

    fn update(&self, entry: KnowledgeEntry) -> Result<()> {
        let mut entries = self.entries.write();
        match entries.get_mut(&entry.id) {
            Some(slot) => {
                *slot = entry;
                Ok(())
            }
            None => Err(KotaeError::EntryNotFound(entry.id)),
        }
    }

    fn delete(&self, id: &EntryId) -> Result<bool> {
        Ok(self.entries.write().remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str) -> KnowledgeEntry {
        KnowledgeEntry::with_id(EntryId::from(id), "Question", "Answer").unwrap()
    }

    #[test]
    fn insert_get_delete() {
        let store = MemoryStore::new();
        store.insert(entry("a")).unwrap();
        assert!(store.get(&EntryId::from("a")).unwrap().is_some());
        assert!(store.delete(&EntryId::from("a")).unwrap());
        assert!(!store.delete(&EntryId::from("a")).unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn insert_rejects_existing_id() {
        let store = MemoryStore::with_entries([entry("a")]);
        assert!(matches!(store.insert(entry("a")), Err(KotaeError::Store(_))));
    }

    #[test]
    fn update_missing_entry() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.update(entry("ghost")),
            Err(KotaeError::EntryNotFound(_))
        ));
    }

    #[test]
    fn list_active_filters() {
        let mut inactive = entry("b");
        inactive.active = false;
        let store = MemoryStore::with_entries([entry("a"), inactive]);
        assert_eq!(store.list_active().unwrap().len(), 1);
        assert_eq!(store.list_all().unwrap().len(), 2);
    }

    #[test]
    fn load_json() {
        let json = r#"[
            {"question": "What is Solana?", "answer": "An L1.", "tags": ["basics"]},
            {"id": "fees", "question": "Fees?", "answer": "Low.", "category": "Economics"},
            {"question": "Old?", "answer": "Retired.", "active": false}
        ]"#;
        let store = MemoryStore::from_json_str(json).unwrap();
        assert_eq!(store.len(), 3);
        assert!(store.get(&EntryId::from("kb_0")).unwrap().is_some());
        let fees = store.get(&EntryId::from("fees")).unwrap().unwrap();
        assert_eq!(fees.category.as_deref(), Some("Economics"));
        assert_eq!(store.list_active().unwrap().len(), 2);
    }

    #[test]
    fn load_json_rejects_duplicate_ids() {
        let json = r#"[
            {"id": "x", "question": "A?", "answer": "a"},
            {"id": "x", "question": "B?", "answer": "b"}
        ]"#;
        assert!(MemoryStore::from_json_str(json).is_err());
    }

    #[test]
    fn load_json_rejects_blank_answer() {
        let json = r#"[{"question": "A?", "answer": ""}]"#;
        assert!(matches!(
            MemoryStore::from_json_str(json),
            Err(KotaeError::InvalidEntry(_))
        ));
    }

    #[test]
    fn load_malformed_json() {
        assert!(matches!(
            MemoryStore::from_json_str("{not json"),
            Err(KotaeError::Decode(_))
        ));
    }
}
