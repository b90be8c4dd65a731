//! # Question Extraction
//!
//! Pulls candidate questions out of a plain-text document such as an RFP
//! e-mail body or text extracted from a PDF, so each can be answered
//! against the knowledge base.

use std::collections::HashSet;

use regex::Regex;
use tracing::debug;

use crate::error::Result;
use crate::normalize::normalize;

/// Header and boilerplate lines that never carry a question.
const STOP_PREFIXES: &[&str] = &[
    "from:",
    "sent:",
    "subject:",
    "to:",
    "cc:",
    "bcc:",
    "attachments:",
    "unsubscribe",
    "confidential",
    "disclaimer",
];

/// Phrases that mark a request even without a question mark.
const TRIGGERS: &[&str] = &[
    "please provide",
    "please share",
    "kindly provide",
    "kindly share",
    "provide a",
    "provide the",
    "provide your",
    "please tell us",
    "let us know",
    "could you",
    "can you",
    "we would appreciate",
    "we’d appreciate",
    "we would like to request",
    "we'd like to request",
    "we request",
    "request if you can share",
    "we’d like to ask",
    "we would like to ask",
    "how does",
    "how do",
    "how is",
    "how are",
    "how will",
    "what is",
    "what are",
    "what’s",
    "which",
    "when",
    "why",
    "justify",
    "outline",
    "explain",
    "describe",
    "bsp:",
];

/// Normalized questions shorter than this are dropped.
const MIN_QUESTION_CHARS: usize = 15;

/// Trigger-bearing lines longer than this are also kept whole.
const MIN_WHOLE_LINE_CHARS: usize = 25;

fn has_trigger(lower: &str) -> bool {
    TRIGGERS.iter().any(|t| lower.contains(t))
}

/// Extracts candidate questions from free text.
pub struct QuestionExtractor {
    re_reply_tail: Regex,
    re_bullet: Regex,
    re_url_only: Regex,
    re_terminal: Regex,
    re_imperative: Regex,
    re_addressee: Regex,
}

impl QuestionExtractor {
    /// Constructs an extractor with pre-compiled patterns.
    ///
    /// # Errors
    ///
    /// Returns `KotaeError::RegexError` if a pattern fails to compile.
    pub fn new() -> Result<Self> {
        Ok(Self {
            re_reply_tail: Regex::new(r"(?i)\nOn .+ wrote:\n")?,
            re_bullet: Regex::new(r"^\s*(?:[\-\*\u{2022}]|\d+\)|\d+\.)\s+")?,
            re_url_only: Regex::new(r"(?i)^https?://\S+$")?,
            re_terminal: Regex::new(r"[\.!?]\s*$")?,
            re_imperative: Regex::new(r"^\s*(?:provide|outline|explain|describe|justify)\b")?,
            re_addressee: Regex::new(r"^\s*(?:bsp|regulator)\s*:\s*")?,
        })
    }

    /// Returns the questions found in `text` without repeats.
    ///
    /// Question-like pieces come first, in document order, followed by the
    /// long logical lines that carry a trigger phrase, kept whole so the
    /// surrounding context of a multi-sentence request survives.
    #[must_use]
    pub fn extract(&self, text: &str) -> Vec<String> {
        let lines = self.logical_lines(text);

        let pieces = lines.iter().flat_map(|line| {
            split_on_question_marks(line)
                .into_iter()
                .filter(move |piece| self.looks_like_question(piece))
        });
        let whole_lines = lines
            .iter()
            .map(String::as_str)
            .filter(|line| {
                let lower = line.to_lowercase();
                lower.chars().count() > MIN_WHOLE_LINE_CHARS && has_trigger(&lower)
            });
        let candidates = pieces.chain(whole_lines);

        let mut seen = HashSet::new();
        let questions: Vec<String> = candidates
            .filter(|q| {
                let key = normalize(q);
                key.chars().count() >= MIN_QUESTION_CHARS && seen.insert(key)
            })
            .map(|q| q.trim().to_string())
            .collect();

        debug!(lines = lines.len(), questions = questions.len(), "extracted questions");
        questions
    }

    /// Cleans the document and joins wrapped lines into logical lines.
    fn logical_lines(&self, text: &str) -> Vec<String> {
        let body = self.re_reply_tail.split(text).next().unwrap_or_default();

        let lines = body
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .filter(|l| {
                let lower = l.to_lowercase();
                !STOP_PREFIXES.iter().any(|p| lower.starts_with(p))
            })
            .filter(|l| !self.re_url_only.is_match(l));

        let mut merged = Vec::new();
        let mut buf = String::new();
        for line in lines {
            if self.re_bullet.is_match(line) {
                if !buf.is_empty() {
                    merged.push(std::mem::take(&mut buf));
                }
                merged.push(line.to_string());
            } else if buf.is_empty() {
                buf.push_str(line);
            } else if self.re_terminal.is_match(&buf) {
                merged.push(std::mem::replace(&mut buf, line.to_string()));
            } else {
                buf.push(' ');
                buf.push_str(line);
            }
        }
        if !buf.is_empty() {
            merged.push(buf);
        }
        merged
    }

    fn looks_like_question(&self, piece: &str) -> bool {
        let lower = piece.trim().to_lowercase();
        lower.ends_with('?')
            || has_trigger(&lower)
            || self.re_imperative.is_match(&lower)
            || self.re_addressee.is_match(&lower)
    }
}

/// Splits after every `?`, keeping the mark with its sentence.
fn split_on_question_marks(line: &str) -> Vec<&str> {
    line.split_inclusive('?')
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .collect()
}
