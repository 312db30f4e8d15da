mod server;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use faq_retrieval::{
    evaluate_detailed, load_corpus, load_labeled_queries, EmbeddingProvider, EvalSummary,
    EvaluationRun, HashEmbeddingProvider, HybridPipeline, MiniLmEmbeddingProvider, QualityGate,
    RetrievalConfig, RunStatus, DEFAULT_CORPUS_PATH, DEFAULT_EMBEDDING_DIM, DEFAULT_QUERIES_PATH,
    DEFAULT_SHORTLIST_SIZE, DEFAULT_TOP_K,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "faq")]
#[command(about = "Hybrid lexical + semantic FAQ retrieval")]
struct Cli {
    /// FAQ corpus with `question,answer` columns (.csv or .jsonl).
    #[arg(long, global = true, env = "FAQ_CORPUS", default_value = DEFAULT_CORPUS_PATH)]
    corpus: PathBuf,

    /// Encoder weights (.safetensors). Without it, hashed bag-of-words embeddings are used.
    #[arg(long, global = true, env = "FAQ_MODEL_PATH")]
    model_path: Option<PathBuf>,

    /// tokenizer.json matching --model-path.
    #[arg(long, global = true, env = "FAQ_TOKENIZER_PATH")]
    tokenizer_path: Option<PathBuf>,

    #[arg(long, global = true, env = "FAQ_SHORTLIST_SIZE", default_value_t = DEFAULT_SHORTLIST_SIZE)]
    shortlist_size: usize,

    #[arg(long, global = true, env = "FAQ_TOP_K", default_value_t = DEFAULT_TOP_K)]
    top_k: usize,

    /// Embed candidate questions per query instead of once at startup.
    #[arg(long, global = true)]
    no_embedding_cache: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Answer one question.
    Query {
        #[arg(long)]
        question: String,
        /// Print the full response as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Score the pipeline against labeled queries.
    Eval {
        #[arg(long, default_value = DEFAULT_QUERIES_PATH)]
        queries: PathBuf,
        #[arg(long)]
        min_precision_at_1: Option<f64>,
        #[arg(long)]
        min_recall: Option<f64>,
        #[arg(long)]
        min_mrr: Option<f64>,
    },
    /// Serve the HTTP front-end.
    Serve {
        #[arg(long, env = "FAQ_ADDR", default_value = "0.0.0.0:5000")]
        addr: SocketAddr,
        /// Labeled queries to evaluate before serving; skipped if the file is absent.
        #[arg(long, default_value = DEFAULT_QUERIES_PATH)]
        eval_queries: PathBuf,
    },
}

impl Cli {
    fn retrieval_config(&self) -> RetrievalConfig {
        RetrievalConfig::new(self.shortlist_size, self.top_k)
    }
}

fn make_embedder(cli: &Cli) -> Result<Arc<dyn EmbeddingProvider>> {
    match (&cli.model_path, &cli.tokenizer_path) {
        (Some(model), Some(tokenizer)) => {
            let ext = model.extension().and_then(|e| e.to_str()).unwrap_or("");
            if ext != "safetensors" {
                bail!("unsupported model format '.{ext}' (expected .safetensors)");
            }
            info!(model = %model.display(), "loading sentence encoder");
            Ok(Arc::new(MiniLmEmbeddingProvider::load(model, tokenizer)?))
        }
        (None, None) => {
            warn!("no model configured, falling back to hashed embeddings");
            Ok(Arc::new(HashEmbeddingProvider::new(DEFAULT_EMBEDDING_DIM)))
        }
        _ => bail!("--model-path and --tokenizer-path must both be provided"),
    }
}

fn build_pipeline(cli: &Cli) -> Result<HybridPipeline> {
    let embedder = make_embedder(cli)?;
    let entries = load_corpus(&cli.corpus)?;
    HybridPipeline::build(entries, embedder, !cli.no_embedding_cache)
        .with_context(|| format!("build pipeline from {}", cli.corpus.display()))
}

fn model_name(cli: &Cli) -> String {
    cli.model_path
        .as_ref()
        .map(|p| {
            p.file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_else(|| p.display().to_string())
        })
        .unwrap_or_else(|| "hash".to_string())
}

/// Opens a run record for `queries`, or `None` (with a warning) when the
/// labeled query file does not exist.
fn start_run(cli: &Cli, queries: &Path, gate: QualityGate) -> Option<EvaluationRun> {
    if !queries.exists() {
        warn!(path = %queries.display(), "labeled queries not found, skipping evaluation");
        return None;
    }
    let run_id = format!("eval-{}", chrono::Utc::now().timestamp_millis());
    Some(
        EvaluationRun::start(run_id, queries.display().to_string(), cli.retrieval_config())
            .with_gate(gate),
    )
}

/// Evaluates against the labeled queries and prints the run record. `run`
/// must already be past runtime boot.
fn run_evaluation(
    cli: &Cli,
    pipeline: &HybridPipeline,
    queries: &Path,
    mut run: EvaluationRun,
) -> Result<EvaluationRun> {
    let config = run.config;
    let labeled = match load_labeled_queries(queries) {
        Ok(labeled) => labeled,
        Err(err) => {
            run.on_eval_failed(format!("{err:#}"));
            print_run_status(&run);
            return Err(err);
        }
    };
    match evaluate_detailed(pipeline, &labeled, &config) {
        Ok(summary) => {
            run.on_eval_completed(&summary);
            print_summary(cli, &run, &summary);
            Ok(run)
        }
        Err(err) => {
            run.on_eval_failed(err.to_string());
            print_run_status(&run);
            Err(err.into())
        }
    }
}

fn print_run_status(run: &EvaluationRun) {
    println!(
        "run_id={} status={:?} error={}",
        run.run_id,
        run.status,
        run.error.as_deref().unwrap_or("unknown")
    );
}

fn print_summary(cli: &Cli, run: &EvaluationRun, summary: &EvalSummary) {
    let report = &summary.report;
    println!(
        "run_id={} model={} status={:?} total={} shortlist_size={} top_k={} meets_gate={}",
        run.run_id,
        model_name(cli),
        run.status,
        summary.total,
        run.config.shortlist_size,
        run.config.top_k,
        run.meets_gate()
    );
    println!("Precision@1: {:.3}", report.precision_at_1);
    println!("Recall@K: {:.3}", report.recall_at_k);
    println!("MRR: {:.3}", report.mrr);

    for o in &summary.outcomes {
        println!(
            "query={:?} rank={} top1={:?} latency={:.1}ms",
            o.query,
            o.rank.map(|r| r.to_string()).unwrap_or_else(|| "none".into()),
            o.retrieved.first().map(String::as_str).unwrap_or(""),
            o.latency_ms
        );
    }

    println!(
        "total_latency={:.1}ms avg_latency={:.1}ms",
        summary.total_latency_ms(),
        summary.avg_latency_ms()
    );
    if let Some(err) = &run.error {
        println!("error={err}");
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    cli.retrieval_config().validate()?;

    match &cli.command {
        Commands::Query { question, json } => {
            if question.trim().is_empty() {
                bail!("query is required");
            }
            let pipeline = build_pipeline(&cli)?;
            let response = pipeline.retrieve(question, &cli.retrieval_config())?;

            if *json {
                println!("{}", serde_json::to_string_pretty(&response)?);
                return Ok(());
            }

            println!(
                "model={} results={} response_time={:.4}s lexical_miss={}",
                model_name(&cli),
                response.results.len(),
                response.response_time,
                response.lexical_miss
            );
            for (rank, result) in response.results.iter().enumerate() {
                println!(
                    "{}. score={:.4} question={:?}",
                    rank + 1,
                    result.semantic_score,
                    result.question
                );
                println!("   answer={}", result.answer);
            }
        }
        Commands::Eval {
            queries,
            min_precision_at_1,
            min_recall,
            min_mrr,
        } => {
            let gate = QualityGate {
                min_precision_at_1: *min_precision_at_1,
                min_recall_at_k: *min_recall,
                min_mrr: *min_mrr,
            };
            let Some(mut run) = start_run(&cli, queries, gate) else {
                return Ok(());
            };

            let pipeline = match build_pipeline(&cli) {
                Ok(pipeline) => pipeline,
                Err(err) => {
                    run.on_runtime_boot_failed(format!("runtime_boot_failed:{err:#}"));
                    print_run_status(&run);
                    return Err(err);
                }
            };
            run.on_runtime_ready();

            let run = run_evaluation(&cli, &pipeline, queries, run)?;
            if run.status == RunStatus::Failed {
                bail!(
                    "evaluation below quality gate: {}",
                    run.error.as_deref().unwrap_or("unknown")
                );
            }
        }
        Commands::Serve { addr, eval_queries } => {
            let pipeline = build_pipeline(&cli)?;
            if let Some(mut run) = start_run(&cli, eval_queries, QualityGate::default()) {
                run.on_runtime_ready();
                run_evaluation(&cli, &pipeline, eval_queries, run)?;
            }

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("start tokio runtime")?;
            runtime.block_on(server::serve(*addr, pipeline, cli.retrieval_config()))?;
        }
    }

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();

    if let Err(err) = run() {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}
