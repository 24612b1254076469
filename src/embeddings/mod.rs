// Embeddings module
// Text chunking plus the embedding providers the document store depends on

pub mod chunking;
pub mod hashing;
pub mod ollama;

pub use chunking::{ChunkingConfig, ContentChunk, chunk_text, estimate_token_count};
pub use hashing::HashingEmbedder;
pub use ollama::{ChatMessage, OllamaClient};

/// Maps text to a fixed-length vector
///
/// Implementations must be deterministic for identical text under a fixed
/// model, since stored vectors are reused across rebuilds.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;

    #[inline]
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}
