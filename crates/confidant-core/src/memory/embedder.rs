//! Embedder trait for text-to-vector conversion.
//!
//! Implementations (e.g., an OpenAI-compatible `/embeddings` client) live in
//! confidant-infra.

use confidant_types::error::EmbeddingError;

/// Trait for converting text into an embedding vector.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait Embedder: Send + Sync {
    /// Embed a single text.
    fn embed(
        &self,
        text: &str,
    ) -> impl std::future::Future<Output = Result<Vec<f32>, EmbeddingError>> + Send;

    /// The model name used for embeddings (e.g., "text-embedding-3-small").
    fn model_name(&self) -> &str;
}
