use serde::{Deserialize, Serialize};

use crate::error::{FaqError, Result};

pub const DEFAULT_SHORTLIST_SIZE: usize = 20;
pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_EMBEDDING_DIM: usize = 768;
pub const DEFAULT_CORPUS_PATH: &str = "data/faq_dataset.csv";
pub const DEFAULT_QUERIES_PATH: &str = "data/test_queries.csv";

/// Per-query sizing of the two retrieval stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Lexical candidates handed to the reranker.
    pub shortlist_size: usize,
    /// Results returned after reranking.
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            shortlist_size: DEFAULT_SHORTLIST_SIZE,
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl RetrievalConfig {
    pub fn new(shortlist_size: usize, top_k: usize) -> Self {
        Self {
            shortlist_size,
            top_k,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(FaqError::InvalidConfig("top_k must be at least 1".into()));
        }
        if self.shortlist_size < self.top_k {
            return Err(FaqError::InvalidConfig(format!(
                "shortlist_size ({}) must be >= top_k ({})",
                self.shortlist_size, self.top_k
            )));
        }
        Ok(())
    }
}
