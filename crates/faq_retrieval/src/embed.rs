use std::sync::Arc;

use anyhow::Result;

/// Maps text to a dense vector. Implementations are shared read-only across
/// queries, possibly from several threads at once.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

impl EmbeddingProvider for Arc<dyn EmbeddingProvider> {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        (**self).embed(text)
    }
}

/// Hashed bag-of-words embedding. Deterministic and model-free; catches
/// shared words regardless of order but no paraphrase.
#[derive(Debug, Clone)]
pub struct HashEmbeddingProvider {
    dim: usize,
}

impl HashEmbeddingProvider {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(8) }
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self { dim: 768 }
    }
}

impl EmbeddingProvider for HashEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; self.dim];

        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut h: u64 = 1469598103934665603;
            for b in token.as_bytes() {
                h ^= *b as u64;
                h = h.wrapping_mul(1099511628211);
            }
            let idx = (h as usize) % self.dim;
            v[idx] += 1.0;
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }

        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::cosine_similarity;

    #[test]
    fn hash_embedding_is_deterministic_and_unit_length() {
        let provider = HashEmbeddingProvider::default();
        let a = provider.embed("How do I track my order?").unwrap();
        let b = provider.embed("How do I track my order?").unwrap();

        assert_eq!(a, b);
        assert_eq!(a.len(), 768);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn hash_embedding_ignores_case_and_punctuation() {
        let provider = HashEmbeddingProvider::new(256);
        let a = provider.embed("Track my ORDER!").unwrap();
        let b = provider.embed("track my order").unwrap();
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn empty_text_embeds_to_zero_vector() {
        let provider = HashEmbeddingProvider::new(4);
        let embedding = provider.embed("?!").unwrap();
        assert_eq!(embedding.len(), 8);
        assert!(embedding.iter().all(|x| *x == 0.0));
    }
}
