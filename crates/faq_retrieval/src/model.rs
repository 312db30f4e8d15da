use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaqEntry {
    pub question: String,
    pub answer: String,
}

impl FaqEntry {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// A lexical shortlist member. `position` is the entry's index in corpus
/// order and doubles as its tie-break key.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub position: usize,
    pub entry: &'a FaqEntry,
    pub lexical_score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub question: String,
    pub answer: String,
    pub semantic_score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridResponse {
    pub results: Vec<RetrievalResult>,
    pub scores: Vec<f32>,
    /// Wall-clock seconds spent inside the pipeline.
    pub response_time: f64,
    /// Set when no shortlisted entry shared a single term with the query, so
    /// the shortlist was filled by corpus order alone.
    pub lexical_miss: bool,
}

impl HybridResponse {
    pub fn questions(&self) -> impl Iterator<Item = &str> {
        self.results.iter().map(|r| r.question.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledQuery {
    pub query: String,
    pub relevant_question: String,
}

impl LabeledQuery {
    pub fn new(query: impl Into<String>, relevant_question: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            relevant_question: relevant_question.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricReport {
    pub precision_at_1: f64,
    pub recall_at_k: f64,
    pub mrr: f64,
}
