use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{KotaeError, Result};

/// Default author recorded on entries created without an explicit user.
pub const DEFAULT_AUTHOR: &str = "admin";

/// Opaque, immutable identifier of a knowledge-base entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    /// Generates a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntryId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EntryId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The unit of retrievable knowledge: a curated question/answer pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    /// Immutable identifier assigned at creation.
    pub id: EntryId,

    /// Canonical question text. Never empty for an active entry.
    pub question: String,

    /// Curated answer text. Never empty for an active entry.
    pub answer: String,

    /// Auxiliary matching signal; order is irrelevant.
    pub tags: BTreeSet<String>,

    /// Optional classification (e.g. "Performance", "Security").
    pub category: Option<String>,

    /// Dense vector for the embedding tier, produced by an external provider.
    pub embedding: Option<Vec<f32>>,

    /// Inactive entries are retained for audit but never indexed.
    pub active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub created_by: String,
    pub last_modified_by: String,
}

impl KnowledgeEntry {
    /// Creates a new active entry with a generated id.
    ///
    /// # Errors
    ///
    /// Returns `KotaeError::InvalidEntry` if the question or answer is blank.
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Result<Self> {
        Self::with_id(EntryId::generate(), question, answer)
    }

    /// Creates a new active entry with a caller-chosen id.
    ///
    /// # Errors
    ///
    /// Returns `KotaeError::InvalidEntry` if the question or answer is blank.
    pub fn with_id(
        id: EntryId,
        question: impl Into<String>,
        answer: impl Into<String>,
    ) -> Result<Self> {
        let now = Utc::now();
        let entry = Self {
            id,
            question: question.into(),
            answer: answer.into(),
            tags: BTreeSet::new(),
            category: None,
            embedding: None,
            active: true,
            created_at: now,
            updated_at: now,
            created_by: DEFAULT_AUTHOR.to_string(),
            last_modified_by: DEFAULT_AUTHOR.to_string(),
        };
        entry.validate()?;
        Ok(entry)
    }

    /// Builder: replace the tag set.
    #[must_use]
    pub fn tagged<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Builder: set the category.
    #[must_use]
    pub fn in_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Builder: attach an embedding.
    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Builder: set the author on both audit fields.
    #[must_use]
    pub fn authored_by(mut self, author: impl Into<String>) -> Self {
        let author = author.into();
        self.created_by = author.clone();
        self.last_modified_by = author;
        self
    }

    /// Checks the data-model invariants.
    ///
    /// # Errors
    ///
    /// Returns `KotaeError::InvalidEntry` if an active entry has a blank
    /// question or answer, or if the embedding is empty.
    pub fn validate(&self) -> Result<()> {
        if self.active && self.question.trim().is_empty() {
            return Err(KotaeError::InvalidEntry(format!(
                "entry {} has an empty question",
                self.id
            )));
        }
        if self.active && self.answer.trim().is_empty() {
            return Err(KotaeError::InvalidEntry(format!(
                "entry {} has an empty answer",
                self.id
            )));
        }
        if self.embedding.as_ref().is_some_and(Vec::is_empty) {
            return Err(KotaeError::InvalidEntry(format!(
                "entry {} has a zero-length embedding",
                self.id
            )));
        }
        Ok(())
    }

    /// The text fed to the lexical index: question, answer, then tags.
    #[must_use]
    pub fn document_text(&self) -> String {
        let mut text = String::with_capacity(self.question.len() + self.answer.len() + 32);
        text.push_str(&self.question);
        text.push(' ');
        text.push_str(&self.answer);
        text.push(' ');
        text.push_str(&self.tags.iter().map(String::as_str).collect::<Vec<_>>().join(" "));
        text
    }

    /// Applies a partial update, bumping `updated_at`.
    ///
    /// A change to the question or answer invalidates the stored embedding
    /// unless the update carries a fresh one.
    ///
    /// # Errors
    ///
    /// Returns `KotaeError::InvalidEntry` if the result violates the
    /// data-model invariants; the entry is left untouched in that case.
    pub fn apply(&mut self, update: EntryUpdate, modified_by: &str) -> Result<()> {
        let mut next = self.clone();
        let text_changed = update.question.as_ref().is_some_and(|q| *q != self.question)
            || update.answer.as_ref().is_some_and(|a| *a != self.answer);

        if let Some(question) = update.question {
            next.question = question;
        }
        if let Some(answer) = update.answer {
            next.answer = answer;
        }
        if let Some(tags) = update.tags {
            next.tags = tags;
        }
        if let Some(category) = update.category {
            next.category = Some(category);
        }
        match update.embedding {
            Some(embedding) => next.embedding = Some(embedding),
            None if text_changed => next.embedding = None,
            None => {}
        }

        next.last_modified_by = modified_by.to_string();
        next.updated_at = Utc::now().max(self.updated_at);
        next.validate()?;

        *self = next;
        Ok(())
    }
}

/// Draft of an entry submitted through the admin workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewEntry {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

impl NewEntry {
    /// Creates a draft with the given question and answer.
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            ..Self::default()
        }
    }

    /// Turns the draft into an active entry authored by `created_by`.
    ///
    /// # Errors
    ///
    /// Returns `KotaeError::InvalidEntry` if the draft violates the
    /// data-model invariants.
    pub fn into_entry(self, created_by: &str) -> Result<KnowledgeEntry> {
        let mut entry = KnowledgeEntry::new(self.question, self.answer)?.authored_by(created_by);
        entry.tags = self.tags;
        entry.category = self.category;
        entry.embedding = self.embedding;
        entry.validate()?;
        Ok(entry)
    }
}

/// Partial update of an existing entry. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryUpdate {
    pub question: Option<String>,
    pub answer: Option<String>,
    pub tags: Option<BTreeSet<String>>,
    pub category: Option<String>,
    pub embedding: Option<Vec<f32>>,
}

/// One record of the knowledge-base JSON file.
///
/// Only `question` and `answer` are required; a missing id becomes
/// `kb_<position>` when the file is loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl EntryRecord {
    /// Converts the record into an entry, using `position` for a missing id.
    ///
    /// # Errors
    ///
    /// Returns `KotaeError::InvalidEntry` if the record violates the
    /// data-model invariants.
    pub fn into_entry(self, position: usize) -> Result<KnowledgeEntry> {
        let id = self
            .id
            .map_or_else(|| EntryId::from(format!("kb_{position}")), EntryId::from);
        let now = Utc::now();
        let entry = KnowledgeEntry {
            id,
            question: self.question,
            answer: self.answer,
            tags: self.tags.into_iter().collect(),
            category: self.category,
            embedding: self.embedding,
            active: self.active,
            created_at: now,
            updated_at: now,
            created_by: DEFAULT_AUTHOR.to_string(),
            last_modified_by: DEFAULT_AUTHOR.to_string(),
        };
        // Blank text is only invalid once the entry is active.
        entry.validate()?;
        Ok(entry)
    }
}

impl From<EntryRecord> for NewEntry {
    fn from(record: EntryRecord) -> Self {
        Self {
            question: record.question,
            answer: record.answer,
            tags: record.tags.into_iter().collect(),
            category: record.category,
            embedding: record.embedding,
        }
    }
}
