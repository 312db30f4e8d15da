use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::config::RetrievalConfig;
use crate::embed::EmbeddingProvider;
use crate::error::Result;
use crate::lexical::LexicalIndex;
use crate::model::{FaqEntry, HybridResponse, RetrievalResult};
use crate::rerank::SemanticReranker;

/// Lexical shortlist followed by semantic rerank. Cheap to clone; clones share
/// the same index and model.
#[derive(Clone)]
pub struct HybridPipeline {
    index: Arc<LexicalIndex>,
    reranker: SemanticReranker,
}

impl HybridPipeline {
    /// Builds the index from `entries` and, when `cache_embeddings` is set,
    /// embeds every corpus question once. The cache is keyed by corpus
    /// position, so it is only ever built here, from this pipeline's index.
    pub fn build(
        entries: Vec<FaqEntry>,
        embedder: Arc<dyn EmbeddingProvider>,
        cache_embeddings: bool,
    ) -> Result<Self> {
        let index = LexicalIndex::build(entries)?;
        let mut reranker = SemanticReranker::new(embedder);
        if cache_embeddings {
            reranker = reranker.with_corpus_cache(&index)?;
        }
        Ok(Self {
            index: Arc::new(index),
            reranker,
        })
    }

    pub fn index(&self) -> &LexicalIndex {
        &self.index
    }

    /// Answers one query. `query` is expected to be non-empty; boundary layers
    /// reject blank input before it gets here.
    pub fn retrieve(&self, query: &str, config: &RetrievalConfig) -> Result<HybridResponse> {
        config.validate()?;

        let start = Instant::now();
        let candidates = self.index.score(query, config.shortlist_size);
        let lexical_miss = candidates.iter().all(|c| c.lexical_score <= 0.0);
        let ranked = self.reranker.rerank(query, &candidates, config.top_k)?;
        let response_time = start.elapsed().as_secs_f64();

        let scores: Vec<f32> = ranked.iter().map(|(_, score)| *score).collect();
        let results = ranked
            .into_iter()
            .map(|(candidate, semantic_score)| RetrievalResult {
                question: candidate.entry.question.clone(),
                answer: candidate.entry.answer.clone(),
                semantic_score,
            })
            .collect();

        debug!(
            query,
            lexical_miss,
            elapsed_ms = response_time * 1000.0,
            "hybrid retrieval done"
        );

        Ok(HybridResponse {
            results,
            scores,
            response_time,
            lexical_miss,
        })
    }
}
