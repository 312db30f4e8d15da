//! Hybrid FAQ retrieval: a TF-IDF shortlist over the whole corpus, reranked
//! by sentence-embedding similarity, plus an evaluation harness.

pub mod config;
pub mod embed;
pub mod error;
pub mod eval;
pub mod lexical;
pub mod minilm_embed;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod rerank;
pub mod run;
pub mod similarity;
pub mod storage;

pub use config::{
    RetrievalConfig, DEFAULT_CORPUS_PATH, DEFAULT_EMBEDDING_DIM, DEFAULT_QUERIES_PATH,
    DEFAULT_SHORTLIST_SIZE, DEFAULT_TOP_K,
};
pub use embed::{EmbeddingProvider, HashEmbeddingProvider};
pub use error::{FaqError, Result};
pub use eval::{evaluate, evaluate_detailed, validate_labels, EvalSummary, QueryOutcome};
pub use lexical::LexicalIndex;
pub use minilm_embed::MiniLmEmbeddingProvider;
pub use model::{Candidate, FaqEntry, HybridResponse, LabeledQuery, MetricReport, RetrievalResult};
pub use normalize::normalize;
pub use pipeline::HybridPipeline;
pub use rerank::SemanticReranker;
pub use run::{EvaluationRun, QualityGate, RunStatus};
pub use similarity::{cosine_similarity, rank_top_k, TieBreak};
pub use storage::{load_corpus, load_labeled_queries};
