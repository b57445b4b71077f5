//! Token estimation.
//!
//! Every token count in the core goes through [`TokenEstimator`]. A tokenizer
//! that fails falls back to `len / 4` so estimation itself never fails.

use std::sync::Arc;

/// Error from a tokenizer backend.
#[derive(Debug, thiserror::Error)]
#[error("tokenizer failed: {0}")]
pub struct TokenizerError(pub String);

/// Counts tokens in a string.
pub trait Tokenizer: Send + Sync {
    fn count(&self, text: &str) -> Result<usize, TokenizerError>;
}

/// Chars-per-token heuristic tokenizer.
///
/// Counts chars rather than bytes so CJK and emoji are not overcounted.
#[derive(Debug, Clone)]
pub struct CharRatioTokenizer {
    chars_per_token: f32,
}

impl CharRatioTokenizer {
    pub fn new(chars_per_token: f32) -> Self {
        Self { chars_per_token }
    }
}

impl Default for CharRatioTokenizer {
    fn default() -> Self {
        Self::new(3.5)
    }
}

impl Tokenizer for CharRatioTokenizer {
    fn count(&self, text: &str) -> Result<usize, TokenizerError> {
        if text.is_empty() {
            return Ok(0);
        }
        if self.chars_per_token <= 0.0 {
            return Err(TokenizerError(format!(
                "invalid chars-per-token ratio {}",
                self.chars_per_token
            )));
        }
        let char_count = text.chars().count();
        let estimated = (char_count as f32 / self.chars_per_token).ceil() as usize;
        Ok(estimated.max(1))
    }
}

/// Shared token estimator with a `len / 4` fallback.
#[derive(Clone)]
pub struct TokenEstimator {
    tokenizer: Arc<dyn Tokenizer>,
}

impl TokenEstimator {
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self { tokenizer }
    }

    pub fn heuristic() -> Self {
        Self::new(Arc::new(CharRatioTokenizer::default()))
    }

    /// Estimate the tokens in `text`.
    pub fn estimate(&self, text: &str) -> u32 {
        match self.tokenizer.count(text) {
            Ok(count) => count as u32,
            Err(e) => {
                tracing::debug!(error = %e, "Tokenizer failed, falling back to length/4");
                (text.len() / 4) as u32
            }
        }
    }

    /// Sum of estimates over several texts.
    pub fn estimate_all<'a>(&self, texts: impl IntoIterator<Item = &'a str>) -> u32 {
        texts.into_iter().map(|t| self.estimate(t)).sum()
    }
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::heuristic()
    }
}

impl std::fmt::Debug for TokenEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenEstimator").finish_non_exhaustive()
    }
}
