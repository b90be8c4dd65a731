//! # Lexical Index
//!
//! TF-IDF over unigrams and bigrams with smoothed IDF and L2-normalized
//! document vectors. Queries are projected into the same vocabulary and
//! scored by cosine similarity against every document.

use std::collections::HashMap;

use crate::normalize::{normalize, word_tokens};
use crate::types::{EntryId, KnowledgeEntry, MatchCandidate, Tier};

/// Sparse term-weight vector, sorted by term index.
#[derive(Debug, Clone, Default, PartialEq)]
struct SparseVector {
    terms: Vec<(u32, f32)>,
}

impl SparseVector {
    /// Builds an L2-normalized vector from raw term counts.
    fn from_counts(counts: HashMap<u32, u32>, idf: &[f32]) -> Self {
        let mut terms: Vec<(u32, f32)> = counts
            .into_iter()
            .map(|(term, count)| (term, count as f32 * idf[term as usize]))
            .collect();
        terms.sort_unstable_by_key(|&(term, _)| term);

        let norm = terms.iter().map(|&(_, w)| w * w).sum::<f32>().sqrt();
        if norm > 0.0 {
            for (_, weight) in &mut terms {
                *weight /= norm;
            }
        }
        Self { terms }
    }

    fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Dot product of two sorted sparse vectors.
    fn dot(&self, other: &Self) -> f32 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0;
        while i < self.terms.len() && j < other.terms.len() {
            let (a, wa) = self.terms[i];
            let (b, wb) = other.terms[j];
            match a.cmp(&b) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += wa * wb;
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }
}

/// Extracts unigram and bigram terms from normalized text.
fn terms(normalized: &str) -> Vec<String> {
    let tokens: Vec<&str> = word_tokens(normalized).collect();
    let mut out: Vec<String> = tokens.iter().map(|t| (*t).to_string()).collect();
    out.extend(tokens.windows(2).map(|pair| format!("{} {}", pair[0], pair[1])));
    out
}

/// TF-IDF index over the active entry set.
#[derive(Debug, Clone, Default)]
pub struct LexicalIndex {
    vocabulary: HashMap<String, u32>,
    idf: Vec<f32>,
    ids: Vec<EntryId>,
    documents: Vec<SparseVector>,
}

impl LexicalIndex {
    /// Builds the index from scratch. Inactive entries are skipped.
    #[must_use]
    pub fn build(entries: &[KnowledgeEntry]) -> Self {
        let mut vocabulary: HashMap<String, u32> = HashMap::new();
        let mut doc_freq: Vec<u32> = Vec::new();
        let mut ids = Vec::new();
        let mut counts_per_doc = Vec::new();

        for entry in entries.iter().filter(|e| e.active) {
            let mut counts: HashMap<u32, u32> = HashMap::new();
            for term in terms(&normalize(&entry.document_text())) {
                let next = vocabulary.len() as u32;
                let index = *vocabulary.entry(term).or_insert_with(|| {
                    doc_freq.push(0);
                    next
                });
                *counts.entry(index).or_insert(0) += 1;
            }
            for &term in counts.keys() {
                doc_freq[term as usize] += 1;
            }
            ids.push(entry.id.clone());
            counts_per_doc.push(counts);
        }

        let n = ids.len() as f32;
        let idf: Vec<f32> = doc_freq
            .iter()
            .map(|&df| ((1.0 + n) / (1.0 + df as f32)).ln() + 1.0)
            .collect();

        let documents = counts_per_doc
            .into_iter()
            .map(|counts| SparseVector::from_counts(counts, &idf))
            .collect();

        Self {
            vocabulary,
            idf,
            ids,
            documents,
        }
    }

    /// Number of indexed documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns `true` if no documents are indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Number of distinct unigram and bigram terms.
    #[must_use]
    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    /// Ids of the indexed entries, in build order.
    pub fn ids(&self) -> impl Iterator<Item = &EntryId> {
        self.ids.iter()
    }

    /// Scores `text` against every document.
    ///
    /// Returns one candidate per indexed entry, or nothing if the corpus is
    /// empty or the query normalizes to the empty string.
    #[must_use]
    pub fn query(&self, text: &str) -> Vec<MatchCandidate> {
        self.query_normalized(&normalize(text))
    }

    pub(crate) fn query_normalized(&self, normalized: &str) -> Vec<MatchCandidate> {
        if self.is_empty() || normalized.is_empty() {
            return Vec::new();
        }

        let query = self.vectorize(normalized);
        self.ids
            .iter()
            .zip(&self.documents)
            .map(|(id, doc)| {
                let score = if query.is_empty() { 0.0 } else { query.dot(doc) };
                MatchCandidate::new(id.clone(), score, Tier::Lexical)
            })
            .collect()
    }

    /// Projects normalized text into the index vocabulary. Unknown terms are ignored.
    fn vectorize(&self, normalized: &str) -> SparseVector {
        let mut counts: HashMap<u32, u32> = HashMap::new();
        for term in terms(normalized) {
            if let Some(&index) = self.vocabulary.get(&term) {
                *counts.entry(index).or_insert(0) += 1;
            }
        }
        SparseVector::from_counts(counts, &self.idf)
    }
}
