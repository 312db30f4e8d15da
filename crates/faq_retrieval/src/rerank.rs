use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::embed::EmbeddingProvider;
use crate::error::Result;
use crate::lexical::LexicalIndex;
use crate::model::Candidate;
use crate::similarity::{cosine_similarity, rank_top_k, TieBreak};

/// Reorders a lexical shortlist by embedding similarity to the query.
///
/// Candidate questions are embedded on demand, or looked up by corpus
/// position when [`HybridPipeline::build`] warmed the corpus cache.
///
/// [`HybridPipeline::build`]: crate::HybridPipeline::build
#[derive(Clone)]
pub struct SemanticReranker {
    embedder: Arc<dyn EmbeddingProvider>,
    corpus_embeddings: Option<Arc<Vec<Vec<f32>>>>,
}

impl SemanticReranker {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            corpus_embeddings: None,
        }
    }

    /// Embeds every corpus question up front, in parallel. Lookups go by
    /// candidate position, so `index` must be the one the candidates come from.
    pub(crate) fn with_corpus_cache(mut self, index: &LexicalIndex) -> Result<Self> {
        let embeddings = index
            .entries()
            .par_iter()
            .map(|entry| self.embedder.embed(&entry.question))
            .collect::<anyhow::Result<Vec<_>>>()?;

        info!(entries = embeddings.len(), "cached corpus embeddings");
        self.corpus_embeddings = Some(Arc::new(embeddings));
        Ok(self)
    }

    pub fn is_cached(&self) -> bool {
        self.corpus_embeddings.is_some()
    }

    pub(crate) fn cached_len(&self) -> Option<usize> {
        self.corpus_embeddings.as_ref().map(|cache| cache.len())
    }

    /// The `top_k` candidates closest to `query`, each paired with its cosine
    /// similarity; ties keep candidate input order.
    pub fn rerank<'a>(
        &self,
        query: &str,
        candidates: &[Candidate<'a>],
        top_k: usize,
    ) -> Result<Vec<(Candidate<'a>, f32)>> {
        if candidates.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(query)?;

        let mut scores = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let cached = self
                .corpus_embeddings
                .as_ref()
                .and_then(|cache| cache.get(candidate.position));
            let score = match cached {
                Some(embedding) => cosine_similarity(&query_embedding, embedding),
                None => {
                    let embedding = self.embedder.embed(&candidate.entry.question)?;
                    cosine_similarity(&query_embedding, &embedding)
                }
            };
            scores.push(score);
        }

        let ranked: Vec<(Candidate<'a>, f32)> = rank_top_k(&scores, top_k, TieBreak::InputOrder)
            .into_iter()
            .map(|i| (candidates[i], scores[i]))
            .collect();

        debug!(
            candidates = candidates.len(),
            kept = ranked.len(),
            cached = self.is_cached(),
            "semantic rerank done"
        );

        Ok(ranked)
    }
}
