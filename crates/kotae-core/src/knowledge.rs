//! # Knowledge Base Workflow
//!
//! Admin and question-answering workflows on top of an [`EntryStore`] and
//! its [`Matcher`]. Every mutation goes to the store first and then
//! rebuilds the index synchronously, so no query issued after a mutation
//! returns can see the pre-mutation index. Mutations are serialized: the
//! duplicate check, the store write and the rebuild run under one lock.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{KotaeError, Result};
use crate::matcher::{search_index, Matcher, MatcherConfig};
use crate::normalize::normalize;
use crate::store::EntryStore;
use crate::types::{EntryId, EntryUpdate, KnowledgeEntry, MatchCandidate, NewEntry, Tier};

/// Number of tags reported by [`KnowledgeBase::stats`].
const TOP_TAGS: usize = 10;

/// How an answer was sourced from the knowledge base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnswerSource {
    /// The question was a verbatim repeat of a stored question.
    KbMatch,
    /// The question was similar to a stored one.
    KbSimilar,
}

impl AnswerSource {
    fn from_tier(tier: Tier) -> Self {
        match tier {
            Tier::Exact => Self::KbMatch,
            Tier::Embedding | Tier::Lexical => Self::KbSimilar,
        }
    }
}

impl fmt::Display for AnswerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KbMatch => write!(f, "KB Match"),
            Self::KbSimilar => write!(f, "KB Similar"),
        }
    }
}

/// Outcome of answering one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Answer {
    /// A stored answer cleared the threshold.
    Found {
        entry: KnowledgeEntry,
        candidate: MatchCandidate,
        source: AnswerSource,
    },
    /// Nothing in the knowledge base is close enough.
    NotFound,
}

impl Answer {
    /// The answer text, if one was found.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Found { entry, .. } => Some(&entry.answer),
            Self::NotFound => None,
        }
    }
}

/// Result of a bulk import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    /// Entries inserted.
    pub imported: usize,
    /// Records skipped because they duplicate an existing or earlier record.
    pub duplicates: Vec<String>,
    /// Records skipped because they violate the data model.
    pub invalid: usize,
}

/// Aggregate view of the active knowledge base.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeStats {
    pub total_entries: usize,
    pub categories: BTreeMap<String, usize>,
    /// Most used tags, most frequent first.
    pub top_tags: Vec<(String, usize)>,
}

/// The knowledge base: an entry store plus the matcher that mirrors it.
#[derive(Debug)]
pub struct KnowledgeBase<S: EntryStore> {
    matcher: Matcher<S>,
    mutations: Mutex<()>,
}

impl<S: EntryStore> KnowledgeBase<S> {
    /// Creates a knowledge base over `store`.
    pub fn new(store: Arc<S>, config: MatcherConfig) -> Self {
        Self {
            matcher: Matcher::new(store, config),
            mutations: Mutex::new(()),
        }
    }

    /// The underlying matcher, for read-only queries.
    pub fn matcher(&self) -> &Matcher<S> {
        &self.matcher
    }

    fn store(&self) -> &S {
        self.matcher.store()
    }

    fn require(&self, id: &EntryId) -> Result<KnowledgeEntry> {
        self.store()
            .get(id)?
            .ok_or_else(|| KotaeError::EntryNotFound(id.clone()))
    }

    /// Adds a new entry after checking it does not duplicate an existing one.
    ///
    /// # Errors
    ///
    /// Returns `KotaeError::InvalidEntry` for blank text,
    /// `KotaeError::DuplicateQuestion` for near-duplicates, or a store error.
    pub fn add_entry(&self, draft: NewEntry, created_by: &str) -> Result<KnowledgeEntry> {
        let entry = draft.into_entry(created_by)?;
        let _guard = self.mutations.lock();
        self.matcher
            .ensure_unique(&entry.question, entry.embedding.as_deref())?;

        self.store().insert(entry.clone())?;
        self.matcher.rebuild()?;
        info!(entry = %entry.id, by = created_by, "added knowledge base entry");
        Ok(entry)
    }

    /// Applies a partial update to an existing entry.
    ///
    /// A changed question is checked against every other entry with the
    /// duplicate guard.
    ///
    /// # Errors
    ///
    /// Returns `KotaeError::EntryNotFound`, `KotaeError::InvalidEntry`,
    /// `KotaeError::DuplicateQuestion`, or a store error.
    pub fn update_entry(
        &self,
        id: &EntryId,
        update: EntryUpdate,
        modified_by: &str,
    ) -> Result<KnowledgeEntry> {
        let _guard = self.mutations.lock();
        let mut entry = self.require(id)?;
        let question_changed = update
            .question
            .as_ref()
            .is_some_and(|q| normalize(q) != normalize(&entry.question));

        entry.apply(update, modified_by)?;

        if question_changed && entry.active {
            // The entry's own pre-update text is still indexed; look past it.
            let hit = self
                .matcher
                .search_with_embedding(
                    &entry.question,
                    entry.embedding.as_deref(),
                    self.matcher.config().duplicate_threshold,
                    2,
                )?
                .into_iter()
                .find(|c| c.entry_id != entry.id);
            if let Some(candidate) = hit {
                return Err(KotaeError::DuplicateQuestion {
                    existing: candidate.entry_id,
                    confidence: candidate.confidence,
                });
            }
        }

        self.store().update(entry.clone())?;
        self.matcher.rebuild()?;
        info!(entry = %entry.id, by = modified_by, "updated knowledge base entry");
        Ok(entry)
    }

    /// Deletes an entry. Returns `false` if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn delete_entry(&self, id: &EntryId) -> Result<bool> {
        let _guard = self.mutations.lock();
        if !self.store().delete(id)? {
            return Ok(false);
        }
        self.matcher.rebuild()?;
        info!(entry = %id, "deleted knowledge base entry");
        Ok(true)
    }

    /// Marks an entry active so it is indexed again.
    ///
    /// The entry must not duplicate any entry that is active now.
    ///
    /// # Errors
    ///
    /// Returns `KotaeError::EntryNotFound`, `KotaeError::InvalidEntry` if the
    /// entry cannot be active, `KotaeError::DuplicateQuestion`, or a store
    /// error.
    pub fn activate(&self, id: &EntryId) -> Result<KnowledgeEntry> {
        self.set_active(id, true)
    }

    /// Marks an entry inactive: it is kept for audit but never matched.
    ///
    /// # Errors
    ///
    /// Returns `KotaeError::EntryNotFound` or a store error.
    pub fn deactivate(&self, id: &EntryId) -> Result<KnowledgeEntry> {
        self.set_active(id, false)
    }

    fn set_active(&self, id: &EntryId, active: bool) -> Result<KnowledgeEntry> {
        let _guard = self.mutations.lock();
        let mut entry = self.require(id)?;
        if entry.active == active {
            return Ok(entry);
        }
        entry.active = active;
        entry.validate()?;
        if active {
            // Inactive entries are not indexed, so this never matches itself.
            self.matcher
                .ensure_unique(&entry.question, entry.embedding.as_deref())?;
        }
        entry.updated_at = Utc::now().max(entry.updated_at);

        self.store().update(entry.clone())?;
        self.matcher.rebuild()?;
        info!(entry = %id, active, "changed knowledge base entry status");
        Ok(entry)
    }

    /// Stores a freshly computed embedding for an entry.
    ///
    /// # Errors
    ///
    /// Returns `KotaeError::EntryNotFound`, `KotaeError::InvalidEntry` for an
    /// empty vector, or a store error.
    pub fn set_embedding(&self, id: &EntryId, embedding: Vec<f32>) -> Result<()> {
        let _guard = self.mutations.lock();
        let mut entry = self.require(id)?;
        entry.embedding = Some(embedding);
        entry.validate()?;

        self.store().update(entry)?;
        self.matcher.rebuild()?;
        Ok(())
    }

    /// Active entries that still need an embedding.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn missing_embeddings(&self) -> Result<Vec<KnowledgeEntry>> {
        Ok(self
            .store()
            .list_active()?
            .into_iter()
            .filter(|e| e.embedding.is_none())
            .collect())
    }

    /// Bulk-inserts drafts, skipping duplicates and invalid records.
    ///
    /// Each draft is checked against the index as it stood before the
    /// import and against the normalized questions already accepted in this
    /// batch. The index is rebuilt once at the end.
    ///
    /// # Errors
    ///
    /// Returns a store error; entries inserted before the failure remain.
    pub fn import<I>(&self, drafts: I, created_by: &str) -> Result<ImportReport>
    where
        I: IntoIterator<Item = NewEntry>,
    {
        let _guard = self.mutations.lock();
        let mut report = ImportReport::default();
        let mut accepted: HashSet<String> = HashSet::new();

        for draft in drafts {
            let entry = match draft.into_entry(created_by) {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(error = %err, "skipping invalid import record");
                    report.invalid += 1;
                    continue;
                }
            };

            let key = normalize(&entry.question);
            let duplicate = accepted.contains(&key)
                || self
                    .matcher
                    .would_duplicate_with_embedding(&entry.question, entry.embedding.as_deref())?
                    .is_some();
            if duplicate {
                report.duplicates.push(entry.question);
                continue;
            }

            self.store().insert(entry)?;
            accepted.insert(key);
            report.imported += 1;
        }

        if report.imported > 0 {
            self.matcher.rebuild()?;
        }
        info!(
            imported = report.imported,
            duplicates = report.duplicates.len(),
            invalid = report.invalid,
            "knowledge base import finished"
        );
        Ok(report)
    }

    /// Active entries, newest first, optionally filtered by category and by
    /// any-of tags.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn list_entries(&self, category: Option<&str>, tags: &[&str]) -> Result<Vec<KnowledgeEntry>> {
        let mut entries: Vec<KnowledgeEntry> = self
            .store()
            .list_active()?
            .into_iter()
            .filter(|e| category.is_none_or(|c| e.category.as_deref() == Some(c)))
            .filter(|e| tags.is_empty() || tags.iter().any(|t| e.tags.contains(*t)))
            .collect();
        entries.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(entries)
    }

    /// Entry counts per category and the most used tags.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn stats(&self) -> Result<KnowledgeStats> {
        let entries = self.store().list_active()?;
        let mut categories = BTreeMap::new();
        let mut tags: HashMap<String, usize> = HashMap::new();

        for entry in &entries {
            if let Some(category) = &entry.category {
                *categories.entry(category.clone()).or_insert(0) += 1;
            }
            for tag in &entry.tags {
                *tags.entry(tag.clone()).or_insert(0) += 1;
            }
        }

        let mut top_tags: Vec<(String, usize)> = tags.into_iter().collect();
        top_tags.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_tags.truncate(TOP_TAGS);

        Ok(KnowledgeStats {
            total_entries: entries.len(),
            categories,
            top_tags,
        })
    }

    /// Answers a question from the knowledge base.
    ///
    /// Tries `min_confidence` first and, if nothing clears it, retries once
    /// at `fallback_confidence` (when lower). Both attempts and the entry
    /// lookup read the same index snapshot.
    ///
    /// # Errors
    ///
    /// Only fails if the lazy first build cannot read the store.
    pub fn answer(
        &self,
        question: &str,
        embedding: Option<&[f32]>,
        min_confidence: f32,
        fallback_confidence: f32,
    ) -> Result<Answer> {
        let index = self.matcher.snapshot()?;
        let top_k = self.matcher.config().embedding_top_k;
        let best_at = |threshold: f32| {
            search_index(&index, question, embedding, threshold, 1, top_k)
                .into_iter()
                .next()
        };

        let mut best = best_at(min_confidence);
        if best.is_none() && fallback_confidence < min_confidence {
            best = best_at(fallback_confidence);
        }

        let Some(candidate) = best else {
            return Ok(Answer::NotFound);
        };
        match index.entry(&candidate.entry_id) {
            Some(entry) => Ok(Answer::Found {
                source: AnswerSource::from_tier(candidate.tier),
                entry: entry.clone(),
                candidate,
            }),
            None => Err(KotaeError::InconsistentIndexState(format!(
                "candidate {} has no indexed entry",
                candidate.entry_id
            ))),
        }
    }
}
