use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::RetrievalConfig;
use crate::eval::EvalSummary;
use crate::model::MetricReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    WaitingRuntime,
    Evaluating,
    Completed,
    Failed,
}

/// Minimum metric values a run must reach to count as completed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityGate {
    pub min_precision_at_1: Option<f64>,
    pub min_recall_at_k: Option<f64>,
    pub min_mrr: Option<f64>,
}

impl QualityGate {
    /// Names of the metrics below their minimum.
    pub fn violations(&self, report: &MetricReport) -> Vec<&'static str> {
        [
            ("precision_at_1", self.min_precision_at_1, report.precision_at_1),
            ("recall_at_k", self.min_recall_at_k, report.recall_at_k),
            ("mrr", self.min_mrr, report.mrr),
        ]
        .into_iter()
        .filter_map(|(name, min, actual)| match min {
            Some(min) if actual < min => Some(name),
            _ => None,
        })
        .collect()
    }
}

/// Lifecycle record of one evaluation run, from model boot to metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRun {
    pub run_id: String,
    pub dataset: String,
    pub config: RetrievalConfig,
    pub gate: QualityGate,
    pub status: RunStatus,
    pub requested_at: DateTime<Utc>,
    pub runtime_ready_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_queries: Option<usize>,
    pub report: Option<MetricReport>,
    pub error: Option<String>,
}

impl EvaluationRun {
    pub fn start(run_id: String, dataset: String, config: RetrievalConfig) -> Self {
        Self {
            run_id,
            dataset,
            config,
            gate: QualityGate::default(),
            status: RunStatus::WaitingRuntime,
            requested_at: Utc::now(),
            runtime_ready_at: None,
            completed_at: None,
            total_queries: None,
            report: None,
            error: None,
        }
    }

    pub fn with_gate(mut self, gate: QualityGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn on_runtime_ready(&mut self) {
        if self.status != RunStatus::WaitingRuntime {
            return;
        }
        self.status = RunStatus::Evaluating;
        self.runtime_ready_at = Some(Utc::now());
    }

    pub fn on_runtime_boot_failed(&mut self, reason: impl Into<String>) {
        if self.status != RunStatus::WaitingRuntime {
            return;
        }
        self.fail(reason.into());
    }

    pub fn on_eval_failed(&mut self, reason: impl Into<String>) {
        if self.status != RunStatus::Evaluating {
            return;
        }
        self.fail(reason.into());
    }

    pub fn on_eval_completed(&mut self, summary: &EvalSummary) {
        if self.status != RunStatus::Evaluating {
            return;
        }
        self.total_queries = Some(summary.total);
        self.report = Some(summary.report);
        self.completed_at = Some(Utc::now());

        let violations = self.gate.violations(&summary.report);
        if violations.is_empty() {
            self.status = RunStatus::Completed;
            self.error = None;
        } else {
            self.status = RunStatus::Failed;
            self.error = Some(format!("below_gate:{}", violations.join(",")));
        }
    }

    pub fn meets_gate(&self) -> bool {
        self.report
            .as_ref()
            .is_some_and(|r| self.gate.violations(r).is_empty())
    }

    fn fail(&mut self, reason: String) {
        self.status = RunStatus::Failed;
        self.error = Some(reason);
        self.completed_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(p1: f64, recall: f64, mrr: f64) -> EvalSummary {
        EvalSummary {
            total: 4,
            report: MetricReport {
                precision_at_1: p1,
                recall_at_k: recall,
                mrr,
            },
            outcomes: Vec::new(),
        }
    }

    fn run() -> EvaluationRun {
        EvaluationRun::start(
            "eval-1".into(),
            "test_queries.csv".into(),
            RetrievalConfig::default(),
        )
    }

    #[test]
    fn completes_without_gate() {
        let mut run = run();
        run.on_runtime_ready();
        assert_eq!(run.status, RunStatus::Evaluating);

        run.on_eval_completed(&summary(0.2, 0.4, 0.3));
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.total_queries, Some(4));
        assert!(run.meets_gate());
    }

    #[test]
    fn gate_violation_fails_the_run() {
        let gate = QualityGate {
            min_precision_at_1: Some(0.5),
            min_recall_at_k: None,
            min_mrr: Some(0.5),
        };
        let mut run = run().with_gate(gate);
        run.on_runtime_ready();
        run.on_eval_completed(&summary(0.75, 1.0, 0.25));

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.error.as_deref(), Some("below_gate:mrr"));
        assert!(!run.meets_gate());
    }

    #[test]
    fn boot_failure_is_terminal() {
        let mut run = run();
        run.on_runtime_boot_failed("model_file_not_found");
        assert_eq!(run.status, RunStatus::Failed);

        run.on_runtime_ready();
        run.on_eval_completed(&summary(1.0, 1.0, 1.0));
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.report.is_none());
    }

    #[test]
    fn eval_failure_records_reason() {
        let mut run = run();
        run.on_runtime_ready();
        run.on_eval_failed("labeled query set is empty");
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.completed_at.is_some());
        assert!(!run.meets_gate());
    }
}
