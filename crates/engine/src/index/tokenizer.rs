//! Text tokenizer for fulltext indexes
//!
//! Pipeline: UAX#29 word boundaries → remove non-alphanumeric characters
//!           → lowercase → drop empty tokens → deduplicate

use std::collections::HashSet;

use unicode_segmentation::UnicodeSegmentation;

/// Tokenize text into the terms a fulltext index stores, first occurrence
/// order, no duplicates
///
/// # Example
///
/// ```
/// use docstore_engine::index::tokenizer::tokenize;
///
/// let tokens = tokenize("Hello, hello WORLD! It's 2024.");
/// assert_eq!(tokens, vec!["hello", "world", "its", "2024"]);
/// ```
pub fn tokenize(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.unicode_words()
        .map(|w| {
            w.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
        })
        .map(|w| w.to_lowercase())
        .filter(|s| !s.is_empty())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}
