//! # Text Normalizer
//!
//! Canonicalizes question and answer text before it is compared. Every
//! index and the matcher go through [`normalize`], so two strings that
//! differ only in case, punctuation or spacing land on the same key.

/// Characters kept verbatim besides word characters and whitespace.
const KEPT_PUNCTUATION: &[char] = &['-', '.'];

/// Normalize text for comparison.
///
/// - Lower-cases the input
/// - Replaces anything outside word characters, whitespace, `-` and `.`
///   with a space
/// - Collapses whitespace runs to one space and trims both ends
///
/// Empty output means the input carries no signal.
///
/// # Examples
/// ```
/// use kotae_core::normalize::normalize;
///
/// assert_eq!(normalize("  What is Solana?! "), "what is solana");
/// assert_eq!(normalize("TPS (avg.) — 4,000"), "tps avg. 4 000");
/// ```
pub fn normalize(text: &str) -> String {
    let replaced: String = text
        .to_lowercase()
        .chars()
        .map(|c| if is_kept(c) { c } else { ' ' })
        .collect();

    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Returns `true` for characters matched by `\w`.
pub(crate) fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_kept(c: char) -> bool {
    is_word_char(c) || c.is_whitespace() || KEPT_PUNCTUATION.contains(&c)
}

/// Split normalized text into word tokens of at least two word characters.
///
/// Hyphens, periods and spaces all separate tokens, so `"real-time"` yields
/// `["real", "time"]` and single characters are dropped.
pub fn word_tokens(normalized: &str) -> impl Iterator<Item = &str> {
    normalized
        .split(|c: char| !is_word_char(c))
        .filter(|token| token.chars().count() >= 2)
}
