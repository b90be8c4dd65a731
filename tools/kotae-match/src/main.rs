//! Knowledge-base matcher CLI
//!
//! Reads questions from stdin and answers each one from a knowledge-base
//! JSON file, printing one JSON object per question.

use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use kotae_core::matcher::search_index;
use kotae_core::{
    policy, KnowledgeBase, MatchCandidate, MatcherConfig, MemoryStore, QuestionExtractor, Tier,
};
use kotae_embed::{embed_or_skip, EmbeddingConfig, OpenAiEmbeddings, DEFAULT_MODEL};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// CLI arguments
#[derive(Parser)]
#[command(name = "kotae-match")]
#[command(about = "Answer questions from a knowledge-base JSON file")]
#[command(version)]
struct Cli {
    /// Knowledge-base JSON file
    #[arg(short, long, env = "KOTAE_KB")]
    kb: PathBuf,

    /// Minimum confidence for a match
    #[arg(short, long, default_value_t = policy::MIN_USEFUL)]
    min_confidence: f32,

    /// Retry threshold when nothing clears --min-confidence
    #[arg(short, long, default_value_t = policy::FALLBACK)]
    fallback_confidence: f32,

    /// Maximum matches per question
    #[arg(short, long, default_value_t = 1)]
    limit: usize,

    /// Extract questions from free text instead of reading one per line
    #[arg(short, long)]
    extract: bool,

    /// Embed questions through an OpenAI-compatible endpoint
    #[arg(long)]
    embed: bool,

    /// Embeddings API base URL
    #[arg(long, env = "KOTAE_EMBEDDING_URL")]
    embedding_url: Option<String>,

    /// Embedding model
    #[arg(long, env = "KOTAE_EMBEDDING_MODEL", default_value = DEFAULT_MODEL)]
    embedding_model: String,

    /// Embeddings API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Print knowledge-base statistics and exit
    #[arg(long)]
    stats: bool,
}

#[derive(Debug, Serialize)]
struct MatchOutput {
    id: String,
    question: String,
    answer: String,
    confidence: f32,
    tier: Tier,
}

#[derive(Debug, Serialize)]
struct QuestionOutput {
    question: String,
    matches: Vec<MatchOutput>,
}

fn load_kb(path: &Path) -> Result<KnowledgeBase<MemoryStore>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open knowledge base {}", path.display()))?;
    let store = MemoryStore::from_json_reader(BufReader::new(file))
        .with_context(|| format!("failed to load knowledge base {}", path.display()))?;
    info!(entries = store.len(), "loaded knowledge base");
    Ok(KnowledgeBase::new(Arc::new(store), MatcherConfig::default()))
}

fn embedder(cli: &Cli) -> Result<Option<OpenAiEmbeddings>> {
    if !cli.embed {
        return Ok(None);
    }
    let mut config = EmbeddingConfig::new().with_model(cli.embedding_model.as_str());
    if let Some(url) = &cli.embedding_url {
        config = config.with_base_url(url.as_str());
    }
    if let Some(key) = &cli.api_key {
        config = config.with_api_key(key.as_str());
    }
    let provider = OpenAiEmbeddings::new(config).context("failed to set up embedding provider")?;
    Ok(Some(provider))
}

fn read_questions(extract: bool) -> Result<Vec<String>> {
    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .context("failed to read stdin")?;

    if extract {
        let extractor = QuestionExtractor::new()?;
        return Ok(extractor.extract(&input));
    }
    Ok(input
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let kb = load_kb(&cli.kb)?;
    let mut out = io::stdout().lock();

    if cli.stats {
        let stats = kb.stats()?;
        serde_json::to_writer_pretty(&mut out, &stats)?;
        writeln!(out)?;
        return Ok(());
    }

    let provider = embedder(&cli)?;
    let questions = read_questions(cli.extract)?;
    debug!(questions = questions.len(), "answering questions");

    let min_confidence = cli.min_confidence.clamp(0.0, 1.0);
    let fallback = cli.fallback_confidence.clamp(0.0, 1.0);
    let matcher = kb.matcher();

    let top_k = matcher.config().embedding_top_k;

    for question in questions {
        let vector = embed_or_skip(provider.as_ref(), &question);
        // Candidates and their entries come from the same snapshot.
        let index = matcher.snapshot()?;
        let search = |threshold: f32| {
            search_index(&index, &question, vector.as_deref(), threshold, cli.limit, top_k)
        };
        let mut candidates = search(min_confidence);
        if candidates.is_empty() && fallback < min_confidence {
            candidates = search(fallback);
        }

        let matches = candidates
            .into_iter()
            .map(|candidate: MatchCandidate| -> Result<MatchOutput> {
                let entry = index
                    .entry(&candidate.entry_id)
                    .with_context(|| format!("entry {} missing from the index", candidate.entry_id))?;
                Ok(MatchOutput {
                    id: entry.id.to_string(),
                    question: entry.question.clone(),
                    answer: entry.answer.clone(),
                    confidence: candidate.confidence,
                    tier: candidate.tier,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        serde_json::to_writer(&mut out, &QuestionOutput { question, matches })?;
        writeln!(out)?;
    }

    Ok(())
}
