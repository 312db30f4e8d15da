use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::RetrievalConfig;
use crate::error::{FaqError, Result};
use crate::model::{LabeledQuery, MetricReport};
use crate::pipeline::HybridPipeline;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub query: String,
    pub relevant_question: String,
    pub retrieved: Vec<String>,
    /// 1-based position of the relevant question, if it was retrieved.
    pub rank: Option<usize>,
    pub latency_ms: f64,
}

impl QueryOutcome {
    pub fn reciprocal_rank(&self) -> f64 {
        self.rank.map(|r| 1.0 / r as f64).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalSummary {
    pub total: usize,
    pub report: MetricReport,
    pub outcomes: Vec<QueryOutcome>,
}

impl EvalSummary {
    pub fn total_latency_ms(&self) -> f64 {
        self.outcomes.iter().map(|o| o.latency_ms).sum()
    }

    pub fn avg_latency_ms(&self) -> f64 {
        self.total_latency_ms() / self.outcomes.len().max(1) as f64
    }
}

/// Checks that every label names a corpus question exactly. A label that
/// never matches would otherwise count as a silent miss.
pub fn validate_labels(pipeline: &HybridPipeline, labeled: &[LabeledQuery]) -> Result<()> {
    if labeled.is_empty() {
        return Err(FaqError::EmptyLabeledSet);
    }
    match labeled
        .iter()
        .find(|l| !pipeline.index().contains_question(&l.relevant_question))
    {
        Some(bad) => Err(FaqError::UnknownLabel {
            query: bad.query.clone(),
            relevant_question: bad.relevant_question.clone(),
        }),
        None => Ok(()),
    }
}

pub fn evaluate(
    pipeline: &HybridPipeline,
    labeled: &[LabeledQuery],
    config: &RetrievalConfig,
) -> Result<MetricReport> {
    evaluate_detailed(pipeline, labeled, config).map(|summary| summary.report)
}

/// Runs every labeled query through the pipeline and computes Precision@1,
/// Recall@K (K = `config.top_k`) and MRR as plain means over the set.
pub fn evaluate_detailed(
    pipeline: &HybridPipeline,
    labeled: &[LabeledQuery],
    config: &RetrievalConfig,
) -> Result<EvalSummary> {
    config.validate()?;
    validate_labels(pipeline, labeled)?;

    let mut outcomes = Vec::with_capacity(labeled.len());
    for case in labeled {
        let response = pipeline.retrieve(&case.query, config)?;
        let retrieved: Vec<String> = response.questions().map(str::to_string).collect();
        let rank = retrieved
            .iter()
            .position(|q| *q == case.relevant_question)
            .map(|i| i + 1);

        debug!(query = %case.query, ?rank, "evaluated query");

        outcomes.push(QueryOutcome {
            query: case.query.clone(),
            relevant_question: case.relevant_question.clone(),
            retrieved,
            rank,
            latency_ms: response.response_time * 1000.0,
        });
    }

    let total = outcomes.len();
    let n = total as f64;
    let report = MetricReport {
        precision_at_1: outcomes.iter().filter(|o| o.rank == Some(1)).count() as f64 / n,
        recall_at_k: outcomes.iter().filter(|o| o.rank.is_some()).count() as f64 / n,
        mrr: outcomes.iter().map(QueryOutcome::reciprocal_rank).sum::<f64>() / n,
    };

    info!(
        total,
        precision_at_1 = report.precision_at_1,
        recall_at_k = report.recall_at_k,
        mrr = report.mrr,
        "evaluation finished"
    );

    Ok(EvalSummary {
        total,
        report,
        outcomes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashEmbeddingProvider;
    use crate::model::FaqEntry;
    use std::sync::Arc;

    fn pipeline() -> HybridPipeline {
        let entries = vec![
            FaqEntry::new("How do I track my order?", "a1"),
            FaqEntry::new("Where’s my package?", "a2"),
            FaqEntry::new("How do I reset my password?", "a3"),
            FaqEntry::new("What’s the process for sending something back?", "a4"),
            FaqEntry::new("How long does shipping take?", "a5"),
            FaqEntry::new("Can I use a gift card?", "a6"),
        ];
        HybridPipeline::build(entries, Arc::new(HashEmbeddingProvider::default()), true).unwrap()
    }

    #[test]
    fn verbatim_queries_score_perfectly() {
        let labeled = vec![
            LabeledQuery::new("How do I track my order?", "How do I track my order?"),
            LabeledQuery::new("How long does shipping take?", "How long does shipping take?"),
        ];
        let report = evaluate(&pipeline(), &labeled, &RetrievalConfig::default()).unwrap();

        assert_eq!(report.precision_at_1, 1.0);
        assert_eq!(report.recall_at_k, 1.0);
        assert_eq!(report.mrr, 1.0);
    }

    #[test]
    fn paraphrase_contributes_to_recall() {
        let labeled = vec![LabeledQuery::new(
            "How to reset password?",
            "How do I reset my password?",
        )];
        let summary = evaluate_detailed(&pipeline(), &labeled, &RetrievalConfig::default()).unwrap();

        assert_eq!(summary.total, 1);
        assert_eq!(summary.report.recall_at_k, 1.0);
        assert!(summary.outcomes[0].rank.is_some());
    }

    #[test]
    fn absent_relevant_question_adds_zero_to_mrr() {
        // top_k = 1 leaves room for exactly one result; the gift card query
        // can't surface the shipping question.
        let labeled = vec![
            LabeledQuery::new("Can I use a gift card?", "How long does shipping take?"),
            LabeledQuery::new("How do I track my order?", "How do I track my order?"),
        ];
        let summary =
            evaluate_detailed(&pipeline(), &labeled, &RetrievalConfig::new(1, 1)).unwrap();

        assert_eq!(summary.outcomes[0].rank, None);
        assert_eq!(summary.outcomes[0].reciprocal_rank(), 0.0);
        assert_eq!(summary.report.precision_at_1, 0.5);
        assert_eq!(summary.report.recall_at_k, 0.5);
        assert_eq!(summary.report.mrr, 0.5);
    }

    #[test]
    fn empty_labeled_set_is_an_error() {
        let err = evaluate(&pipeline(), &[], &RetrievalConfig::default()).unwrap_err();
        assert!(matches!(err, FaqError::EmptyLabeledSet));
    }

    #[test]
    fn unknown_label_is_an_error() {
        let labeled = vec![LabeledQuery::new(
            "How do I track my order?",
            "How do I track my order",
        )];
        let err = evaluate(&pipeline(), &labeled, &RetrievalConfig::default()).unwrap_err();
        match err {
            FaqError::UnknownLabel {
                relevant_question, ..
            } => assert_eq!(relevant_question, "How do I track my order"),
            other => panic!("expected unknown label, got {other:?}"),
        }
    }

    #[test]
    fn repeated_runs_are_identical() {
        let pipeline = pipeline();
        let labeled = vec![
            LabeledQuery::new("Where’s my package?", "Where’s my package?"),
            LabeledQuery::new("How to reset password?", "How do I reset my password?"),
            LabeledQuery::new(
                "What’s the return process?",
                "What’s the process for sending something back?",
            ),
        ];
        let config = RetrievalConfig::default();

        let first = evaluate(&pipeline, &labeled, &config).unwrap();
        let second = evaluate(&pipeline, &labeled, &config).unwrap();
        assert_eq!(first, second);
    }
}
