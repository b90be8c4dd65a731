//! # Tiered Matcher
//!
//! Runs the exact → embedding → lexical cascade over an owned
//! [`SearchIndex`] and keeps that index in step with the entry store.
//!
//! The index lives behind an `Arc` that is swapped wholesale: a rebuild
//! constructs the next index without holding the read path, verifies it,
//! and only then replaces the current one. Readers clone the `Arc` and
//! never observe a half-built index; a failed rebuild leaves the previous
//! index in place.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::{KotaeError, Result};
use crate::index::{SearchIndex, SimilarityScale};
use crate::normalize::normalize;
use crate::store::EntryStore;
use crate::types::{EntryId, KnowledgeEntry, MatchCandidate};

/// Lowest threshold the duplicate guard accepts.
pub const MIN_DUPLICATE_THRESHOLD: f32 = 0.8;

/// Configuration for the matcher.
#[derive(Debug, Clone, PartialEq)]
pub struct MatcherConfig {
    /// How many embedding neighbours to pull per query (raised to `limit`
    /// when a search asks for more).
    pub embedding_top_k: usize,
    /// Confidence at or above which a new question counts as a duplicate.
    pub duplicate_threshold: f32,
    /// Mapping from raw cosine to confidence for the embedding tier.
    pub similarity_scale: SimilarityScale,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            embedding_top_k: 10,
            duplicate_threshold: MIN_DUPLICATE_THRESHOLD,
            similarity_scale: SimilarityScale::Clamped,
        }
    }
}

impl MatcherConfig {
    /// Create a new matcher configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of embedding neighbours per query (at least 1).
    pub fn with_embedding_top_k(mut self, top_k: usize) -> Self {
        self.embedding_top_k = top_k.max(1);
        self
    }

    /// Set the duplicate threshold, clamped to `[0.8, 1.0]`.
    pub fn with_duplicate_threshold(mut self, threshold: f32) -> Self {
        self.duplicate_threshold = threshold.clamp(MIN_DUPLICATE_THRESHOLD, 1.0);
        self
    }

    /// Set the embedding similarity scale.
    pub fn with_similarity_scale(mut self, scale: SimilarityScale) -> Self {
        self.similarity_scale = scale;
        self
    }
}

/// Runs the matching cascade against one index snapshot.
///
/// 1. Empty normalized question → no result.
/// 2. Exact hit → that hit alone at confidence 1.0.
/// 3. Otherwise embedding (if `embedding` is given) and lexical candidates
///    are merged, deduplicated per entry, filtered by `min_confidence`,
///    ranked and truncated to `limit`.
#[must_use]
pub fn search_index(
    index: &SearchIndex,
    question: &str,
    embedding: Option<&[f32]>,
    min_confidence: f32,
    limit: usize,
    embedding_top_k: usize,
) -> Vec<MatchCandidate> {
    let normalized = normalize(question);
    if normalized.is_empty() || limit == 0 {
        return Vec::new();
    }

    if let Some(hit) = index.exact.lookup_normalized(&normalized) {
        return if hit.confidence >= min_confidence {
            vec![hit]
        } else {
            Vec::new()
        };
    }

    let mut merged: HashMap<EntryId, MatchCandidate> = HashMap::new();
    let mut offer = |candidate: MatchCandidate| {
        let replaces = merged
            .get(&candidate.entry_id)
            .is_none_or(|existing| candidate.supersedes(existing));
        if replaces {
            merged.insert(candidate.entry_id.clone(), candidate);
        }
    };

    if let Some(vector) = embedding {
        match index.embedding.query(vector, embedding_top_k.max(limit)) {
            Ok(candidates) => candidates.into_iter().for_each(&mut offer),
            Err(err) => warn!(error = %err, "embedding tier skipped"),
        }
    }
    index
        .lexical
        .query_normalized(&normalized)
        .into_iter()
        .for_each(&mut offer);

    let mut results: Vec<MatchCandidate> = merged
        .into_values()
        .filter(|c| c.confidence >= min_confidence)
        .collect();
    results.sort_by(MatchCandidate::rank);
    results.truncate(limit);
    results
}

/// The tiered matcher: owns the current index and the store it mirrors.
pub struct Matcher<S: EntryStore> {
    store: Arc<S>,
    config: MatcherConfig,
    index: RwLock<Option<Arc<SearchIndex>>>,
    writer: Mutex<u64>,
}

impl<S: EntryStore> Matcher<S> {
    /// Creates a matcher over `store`. The index is built on first use.
    pub fn new(store: Arc<S>, config: MatcherConfig) -> Self {
        Self {
            store,
            config,
            index: RwLock::new(None),
            writer: Mutex::new(0),
        }
    }

    /// Creates a matcher with default configuration.
    pub fn with_store(store: Arc<S>) -> Self {
        Self::new(store, MatcherConfig::default())
    }

    /// Get the matcher configuration.
    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Get the backing store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Returns the current index, building it first if none exists yet.
    ///
    /// # Errors
    ///
    /// Propagates store failures from the initial build.
    pub fn snapshot(&self) -> Result<Arc<SearchIndex>> {
        if let Some(index) = self.index.read().as_ref() {
            return Ok(Arc::clone(index));
        }
        self.build_if_missing()
    }

    fn build_if_missing(&self) -> Result<Arc<SearchIndex>> {
        let mut generation = self.writer.lock();
        if let Some(index) = self.index.read().as_ref() {
            return Ok(Arc::clone(index));
        }
        debug!("building index lazily on first query");
        self.rebuild_locked(&mut generation)
    }

    /// Rebuilds every tier from the store and swaps the result in.
    ///
    /// # Errors
    ///
    /// Returns the store error or `KotaeError::InconsistentIndexState`; in
    /// both cases the previous index stays authoritative.
    pub fn rebuild(&self) -> Result<Arc<SearchIndex>> {
        let mut generation = self.writer.lock();
        self.rebuild_locked(&mut generation)
    }

    /// Rebuilds from an explicit entry set instead of the store.
    ///
    /// # Errors
    ///
    /// Returns `KotaeError::InconsistentIndexState` if the built index fails
    /// verification; the previous index stays authoritative.
    pub fn rebuild_from(&self, entries: &[KnowledgeEntry]) -> Result<Arc<SearchIndex>> {
        let mut generation = self.writer.lock();
        self.install(entries, &mut generation)
    }

    fn rebuild_locked(&self, generation: &mut u64) -> Result<Arc<SearchIndex>> {
        let entries = self.store.list_active().inspect_err(|err| {
            warn!(error = %err, "index rebuild aborted: entry store unavailable");
        })?;
        self.install(&entries, generation)
    }

    fn install(&self, entries: &[KnowledgeEntry], generation: &mut u64) -> Result<Arc<SearchIndex>> {
        let started = Instant::now();
        let next = SearchIndex::build(entries, self.config.similarity_scale, *generation + 1);
        if let Err(err) = next.verify() {
            warn!(error = %err, "index rebuild rejected; keeping previous index");
            return Err(err);
        }

        *generation += 1;
        let next = Arc::new(next);
        *self.index.write() = Some(Arc::clone(&next));

        debug!(
            generation = *generation,
            entries = next.len(),
            embeddings = next.embedding().len(),
            vocabulary = next.lexical().vocabulary_size(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "index rebuilt"
        );
        Ok(next)
    }

    /// Searches the knowledge base without a query embedding.
    ///
    /// # Errors
    ///
    /// Only fails if the lazy first build cannot read the store.
    pub fn search(
        &self,
        question: &str,
        min_confidence: f32,
        limit: usize,
    ) -> Result<Vec<MatchCandidate>> {
        self.search_with_embedding(question, None, min_confidence, limit)
    }

    /// Searches the knowledge base, using `embedding` for the embedding tier
    /// when the caller obtained one.
    ///
    /// # Errors
    ///
    /// Only fails if the lazy first build cannot read the store.
    pub fn search_with_embedding(
        &self,
        question: &str,
        embedding: Option<&[f32]>,
        min_confidence: f32,
        limit: usize,
    ) -> Result<Vec<MatchCandidate>> {
        let index = self.snapshot()?;
        Ok(search_index(
            &index,
            question,
            embedding,
            min_confidence,
            limit,
            self.config.embedding_top_k,
        ))
    }

    /// The single best candidate at or above `min_confidence`.
    ///
    /// # Errors
    ///
    /// Only fails if the lazy first build cannot read the store.
    pub fn best_answer(&self, question: &str, min_confidence: f32) -> Result<Option<MatchCandidate>> {
        self.best_answer_with_embedding(question, None, min_confidence)
    }

    /// [`Matcher::best_answer`] with an optional query embedding.
    ///
    /// # Errors
    ///
    /// Only fails if the lazy first build cannot read the store.
    pub fn best_answer_with_embedding(
        &self,
        question: &str,
        embedding: Option<&[f32]>,
        min_confidence: f32,
    ) -> Result<Option<MatchCandidate>> {
        Ok(self
            .search_with_embedding(question, embedding, min_confidence, 1)?
            .into_iter()
            .next())
    }

    /// Resolves a candidate to the entry it points at in the current index.
    ///
    /// # Errors
    ///
    /// Only fails if the lazy first build cannot read the store.
    pub fn entry(&self, id: &EntryId) -> Result<Option<KnowledgeEntry>> {
        Ok(self.snapshot()?.entry(id).cloned())
    }
}

impl<S: EntryStore> std::fmt::Debug for Matcher<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Matcher")
            .field("config", &self.config)
            .field("generation", &*self.writer.lock())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::Tier;

    fn entry(id: &str, question: &str, answer: &str) -> KnowledgeEntry {
        KnowledgeEntry::with_id(EntryId::from(id), question, answer).unwrap()
    }

    fn matcher(entries: Vec<KnowledgeEntry>) -> Matcher<MemoryStore> {
        Matcher::with_store(Arc::new(MemoryStore::with_entries(entries)))
    }

    fn sample() -> Vec<KnowledgeEntry> {
        vec![
            entry("solana", "What is Solana?", "A high-performance layer-1 blockchain."),
            entry("tps", "What is the average TPS?", "~4000 TPS sustained."),
            entry("fees", "How much are transaction fees?", "About 0.00025 SOL per transaction."),
        ]
    }

    #[test]
    fn test_config_builder() {
        let config = MatcherConfig::new()
            .with_embedding_top_k(0)
            .with_duplicate_threshold(0.5)
            .with_similarity_scale(SimilarityScale::Shifted);
        assert_eq!(config.embedding_top_k, 1);
        assert_eq!(config.duplicate_threshold, MIN_DUPLICATE_THRESHOLD);
        assert_eq!(config.similarity_scale, SimilarityScale::Shifted);

        let config = MatcherConfig::new().with_duplicate_threshold(1.5);
        assert_eq!(config.duplicate_threshold, 1.0);
    }

    #[test]
    fn test_exact_match_short_circuits() {
        let m = matcher(sample());
        let results = m.search("what is solana", 0.0, 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].entry_id.as_str(), "solana");
        assert_eq!(results[0].tier, Tier::Exact);
        assert_eq!(results[0].confidence, 1.0);
    }

    #[test]
    fn test_exact_match_ignores_embedding() {
        let m = matcher(vec![
            entry("a", "What is Solana?", "An L1.").with_embedding(vec![1.0, 0.0]),
            entry("b", "Something else", "Other.").with_embedding(vec![0.0, 1.0]),
        ]);
        let best = m
            .best_answer_with_embedding("What is Solana?", Some(&[0.0, 1.0][..]), 0.1)
            .unwrap()
            .unwrap();
        assert_eq!(best.entry_id.as_str(), "a");
        assert_eq!(best.tier, Tier::Exact);
    }

    #[test]
    fn test_lexical_fallback() {
        let m = matcher(sample());
        let best = m
            .best_answer("average transactions per second", 0.1)
            .unwrap()
            .unwrap();
        assert_eq!(best.entry_id.as_str(), "tps");
        assert_eq!(best.tier, Tier::Lexical);
        assert!(best.confidence >= 0.1);
    }

    #[test]
    fn test_empty_query_returns_nothing() {
        let m = matcher(sample());
        assert!(m.search("", 0.0, 10).unwrap().is_empty());
        assert!(m.search("  ?? ", 0.0, 10).unwrap().is_empty());
        assert!(m.best_answer("", 0.0).unwrap().is_none());
    }

    #[test]
    fn test_empty_corpus() {
        let m = matcher(Vec::new());
        assert!(m.search("anything", 0.1, 10).unwrap().is_empty());
    }

    #[test]
    fn test_limit_and_threshold() {
        let m = matcher(sample());
        let all = m.search("what is the transaction fee", 0.0, 10).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].confidence >= w[1].confidence));

        let limited = m.search("what is the transaction fee", 0.0, 1).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0], all[0]);

        assert!(m.search("what is the transaction fee", 0.0, 0).unwrap().is_empty());
        assert!(m.search("what is the transaction fee", 1.0, 10).unwrap().is_empty());
    }

    #[test]
    fn test_embedding_merged_and_deduplicated() {
        let m = matcher(vec![
            entry("a", "Describe validator hardware", "12 cores, 256GB RAM.")
                .with_embedding(vec![1.0, 0.0]),
            entry("b", "Describe staking rewards", "Inflation-based.")
                .with_embedding(vec![0.0, 1.0]),
        ]);
        let results = m
            .search_with_embedding("node machine requirements", Some(&[1.0, 0.0][..]), 0.5, 10)
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].entry_id.as_str(), "a");
        assert_eq!(results[0].tier, Tier::Embedding);
        assert!((results[0].confidence - 1.0).abs() < 1e-6);

        let all = m
            .search_with_embedding("describe", Some(&[1.0, 0.0][..]), 0.0, 10)
            .unwrap();
        let ids: Vec<_> = all.iter().map(|c| c.entry_id.as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"a") && ids.contains(&"b"));
    }

    #[test]
    fn test_embedding_wrong_dimension_degrades() {
        let m = matcher(vec![
            entry("a", "What is the average TPS?", "~4000.").with_embedding(vec![1.0, 0.0]),
        ]);
        let with = m
            .search_with_embedding("average throughput", Some(&[1.0, 0.0, 0.0][..]), 0.0, 10)
            .unwrap();
        let without = m.search("average throughput", 0.0, 10).unwrap();
        assert_eq!(with, without);
    }

    #[test]
    fn test_lazy_build_and_rebuild_generation() {
        let m = matcher(sample());
        let first = m.snapshot().unwrap();
        assert_eq!(first.generation(), 1);
        assert_eq!(m.snapshot().unwrap().generation(), 1);

        m.store()
            .insert(entry("new", "Does Solana support NFTs?", "Yes, via Metaplex."))
            .unwrap();
        // Not visible until the owner rebuilds.
        assert!(m.snapshot().unwrap().entry(&EntryId::from("new")).is_none());

        let second = m.rebuild().unwrap();
        assert_eq!(second.generation(), 2);
        assert!(second.entry(&EntryId::from("new")).is_some());
        // Readers holding the old snapshot keep a consistent view.
        assert!(first.entry(&EntryId::from("new")).is_none());
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let m = matcher(sample());
        let queries = ["average tps", "fees per transaction", "what is solana", "blockchain"];
        let before: Vec<_> = queries.iter().map(|q| m.search(q, 0.0, 10).unwrap()).collect();
        m.rebuild().unwrap();
        m.rebuild().unwrap();
        let after: Vec<_> = queries.iter().map(|q| m.search(q, 0.0, 10).unwrap()).collect();
        assert_eq!(before, after);
    }

    struct FailingStore;

    impl EntryStore for FailingStore {
        fn list_active(&self) -> Result<Vec<KnowledgeEntry>> {
            Err(KotaeError::Store("connection refused".into()))
        }
        fn list_all(&self) -> Result<Vec<KnowledgeEntry>> {
            self.list_active()
        }
        fn get(&self, _id: &EntryId) -> Result<Option<KnowledgeEntry>> {
            Ok(None)
        }
        fn insert(&self, _entry: KnowledgeEntry) -> Result<()> {
            Ok(())
        }
        fn update(&self, _entry: KnowledgeEntry) -> Result<()> {
            Ok(())
        }
        fn delete(&self, _id: &EntryId) -> Result<bool> {
            Ok(false)
        }
    }

    #[test]
    fn test_failed_rebuild_keeps_previous_index() {
        let m = Matcher::with_store(Arc::new(FailingStore));
        assert!(matches!(m.search("anything", 0.0, 1), Err(KotaeError::Store(_))));

        let installed = m.rebuild_from(&sample()).unwrap();
        assert!(matches!(m.rebuild(), Err(KotaeError::Store(_))));

        let current = m.snapshot().unwrap();
        assert_eq!(current.generation(), installed.generation());
        assert_eq!(m.search("What is Solana?", 0.0, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_concurrent_readers_during_rebuilds() {
        let m = Arc::new(matcher(sample()));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let m = Arc::clone(&m);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        if i == 0 {
                            m.rebuild().unwrap();
                        } else {
                            let results = m.search("What is Solana?", 0.0, 5).unwrap();
                            assert_eq!(results.len(), 1);
                            assert_eq!(results[0].tier, Tier::Exact);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
