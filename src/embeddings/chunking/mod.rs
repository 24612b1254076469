
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Separators tried in order, from coarsest to finest. The empty separator
/// splits between characters and always applies.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Represents a chunk of text ready for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentChunk {
    /// The content text
    pub content: String,
    /// The index of this chunk within its source text
    pub chunk_index: usize,
    /// Estimated token count
    pub token_count: usize,
}

/// Configuration for text chunking. Sizes are measured in characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum characters per chunk
    pub chunk_size: usize,
    /// Characters carried over between adjacent chunks
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 100,
        }
    }
}

/// Split text into overlapping chunks, preferring paragraph, then line, then
/// word boundaries before falling back to raw characters
#[inline]
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<ContentChunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let chunks: Vec<ContentChunk> = split_recursive(text, &SEPARATORS, config)
        .into_iter()
        .map(|piece| piece.trim().to_string())
        .filter(|piece| !piece.is_empty())
        .enumerate()
        .map(|(chunk_index, content)| ContentChunk {
            token_count: estimate_token_count(&content),
            content,
            chunk_index,
        })
        .collect();

    debug!(
        "Split {} chars into {} chunks (size {}, overlap {})",
        char_len(text),
        chunks.len(),
        config.chunk_size,
        config.chunk_overlap
    );

    chunks
}

fn split_recursive(text: &str, separators: &[&str], config: &ChunkingConfig) -> Vec<String> {
    let position = separators
        .iter()
        .position(|sep| sep.is_empty() || text.contains(sep))
        .unwrap_or(separators.len().saturating_sub(1));
    let separator = separators.get(position).copied().unwrap_or("");
    let finer = separators.get(position + 1..).unwrap_or(&[]);

    let splits: Vec<String> = if separator.is_empty() {
        text.chars().map(String::from).collect()
    } else {
        text.split(separator)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    };

    let mut output = Vec::new();
    let mut pending = Vec::new();

    for split in splits {
        if char_len(&split) < config.chunk_size {
            pending.push(split);
            continue;
        }

        if !pending.is_empty() {
            output.extend(merge_splits(&pending, separator, config));
            pending.clear();
        }

        if finer.is_empty() {
            output.push(split);
        } else {
            output.extend(split_recursive(&split, finer, config));
        }
    }

    if !pending.is_empty() {
        output.extend(merge_splits(&pending, separator, config));
    }

    output
}

/// Greedily pack splits into chunks, keeping a tail of up to `chunk_overlap`
/// characters from the previous chunk at the start of the next
fn merge_splits(splits: &[String], separator: &str, config: &ChunkingConfig) -> Vec<String> {
    let separator_len = char_len(separator);
    let mut chunks = Vec::new();
    let mut window: Vec<&str> = Vec::new();
    let mut total = 0;

    for split in splits {
        let len = char_len(split);
        let joined_len = if window.is_empty() { 0 } else { separator_len };

        if total + len + joined_len > config.chunk_size && !window.is_empty() {
            chunks.push(window.join(separator));

            while total > config.chunk_overlap
                || (total + len + separator_len > config.chunk_size && total > 0)
            {
                let removed = window.remove(0);
                total -= char_len(removed) + if window.is_empty() { 0 } else { separator_len };
            }
        }

        total += len + if window.is_empty() { 0 } else { separator_len };
        window.push(split);
    }

    if !window.is_empty() {
        chunks.push(window.join(separator));
    }

    chunks
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Estimate token count for text content
#[inline]
pub fn estimate_token_count(text: &str) -> usize {
    // Rough heuristic: 1 token ≈ 0.75 words for English text
    // Add extra tokens for punctuation and special characters
    let word_count = text.split_whitespace().count();
    let punct_count = text.chars().filter(|c| c.is_ascii_punctuation()).count();

    (punct_count as f64).mul_add(0.1, word_count as f64 / 0.75) as usize
}
