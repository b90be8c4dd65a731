use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::normalize::normalize;
use crate::types::{EntryId, KnowledgeEntry, MatchCandidate, Tier};

#[derive(Debug, Clone)]
struct Slot {
    id: EntryId,
    updated_at: DateTime<Utc>,
}

/// Maps `normalize(question)` to the entry that owns it.
#[derive(Debug, Clone, Default)]
pub struct ExactIndex {
    keys: HashMap<String, Slot>,
    collisions: usize,
}

impl ExactIndex {
    /// Builds the lookup from the active entries.
    ///
    /// When two active entries normalize to the same question the most
    /// recently updated one wins (larger id on equal timestamps) and the
    /// collision is logged.
    #[must_use]
    pub fn build(entries: &[KnowledgeEntry]) -> Self {
        let mut keys: HashMap<String, Slot> = HashMap::new();
        let mut collisions = 0;

        for entry in entries.iter().filter(|e| e.active) {
            let key = normalize(&entry.question);
            if key.is_empty() {
                continue;
            }
            let slot = Slot {
                id: entry.id.clone(),
                updated_at: entry.updated_at,
            };
            match keys.get_mut(&key) {
                Some(existing) => {
                    collisions += 1;
                    let newer = (slot.updated_at, &slot.id) > (existing.updated_at, &existing.id);
                    let (kept, dropped) = if newer {
                        (slot.id.clone(), existing.id.clone())
                    } else {
                        (existing.id.clone(), slot.id.clone())
                    };
                    warn!(
                        question = %key,
                        kept = %kept,
                        dropped = %dropped,
                        "duplicate normalized question in knowledge base"
                    );
                    if newer {
                        *existing = slot;
                    }
                }
                None => {
                    keys.insert(key, slot);
                }
            }
        }

        Self { keys, collisions }
    }

    /// Looks up raw question text.
    #[must_use]
    pub fn lookup(&self, text: &str) -> Option<MatchCandidate> {
        self.lookup_normalized(&normalize(text))
    }

    pub(crate) fn lookup_normalized(&self, normalized: &str) -> Option<MatchCandidate> {
        if normalized.is_empty() {
            return None;
        }
        self.keys
            .get(normalized)
            .map(|slot| MatchCandidate::new(slot.id.clone(), 1.0, Tier::Exact))
    }

    /// Number of distinct normalized questions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if no questions are indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Number of collisions resolved during the build.
    #[must_use]
    pub fn collisions(&self) -> usize {
        self.collisions
    }

    /// Ids reachable through the lookup.
    pub fn ids(&self) -> impl Iterator<Item = &EntryId> {
        self.keys.values().map(|slot| &slot.id)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn entry(id: &str, question: &str) -> KnowledgeEntry {
        KnowledgeEntry::with_id(EntryId::from(id), question, "answer").unwrap()
    }

    #[test]
    fn test_lookup_hit() {
        let index = ExactIndex::build(&[entry("a", "What is Solana?")]);
        let hit = index.lookup("  WHAT is solana ").unwrap();
        assert_eq!(hit.entry_id.as_str(), "a");
        assert_eq!(hit.confidence, 1.0);
        assert_eq!(hit.tier, Tier::Exact);
    }

    #[test]
    fn test_lookup_miss() {
        let index = ExactIndex::build(&[entry("a", "What is Solana?")]);
        assert!(index.lookup("What is Ethereum?").is_none());
        assert!(index.lookup("").is_none());
    }

    #[test]
    fn test_collision_newest_wins() {
        let old = entry("old", "What is Solana?");
        let mut new = entry("new", "what is solana");
        new.updated_at = old.updated_at + Duration::seconds(10);

        let index = ExactIndex::build(&[new.clone(), old.clone()]);
        assert_eq!(index.lookup("What is Solana?").unwrap().entry_id.as_str(), "new");
        assert_eq!(index.collisions(), 1);

        let index = ExactIndex::build(&[old, new]);
        assert_eq!(index.lookup("What is Solana?").unwrap().entry_id.as_str(), "new");
    }

    #[test]
    fn test_collision_equal_timestamps_deterministic() {
        let a = entry("a", "Same question");
        let mut b = entry("b", "Same question");
        b.updated_at = a.updated_at;

        let forward = ExactIndex::build(&[a.clone(), b.clone()]);
        let backward = ExactIndex::build(&[b, a]);
        assert_eq!(
            forward.lookup("same question").unwrap().entry_id,
            backward.lookup("same question").unwrap().entry_id
        );
    }

    #[test]
    fn test_inactive_skipped() {
        let mut e = entry("a", "What is Solana?");
        e.active = false;
        let index = ExactIndex::build(&[e]);
        assert!(index.is_empty());
    }
}
