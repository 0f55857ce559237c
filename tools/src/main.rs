//! anomaly-runner: headless end-to-end run.
//!
//! Usage:
//!   anomaly-runner --seed 42 --transactions 10000 --out-dir ./data
//!   anomaly-runner --config data/pipeline.json --db run.db

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use txn_anomaly_core::{
    dataset,
    evaluator,
    pipeline::{Pipeline, PipelineReport},
    store::RunStore,
    PipelineConfig,
};

#[derive(Parser, Debug)]
#[command(name = "anomaly-runner")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Generate labelled transactions and score them for anomalies", long_about = None)]
struct Args {
    /// JSON pipeline config; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Total transactions to generate
    #[arg(long)]
    transactions: Option<usize>,

    /// Fraction of anomalous transactions, in [0, 1)
    #[arg(long)]
    anomaly_ratio: Option<f64>,

    /// Seed for both the generator and the forest
    #[arg(long)]
    seed: Option<u64>,

    /// Expected anomaly fraction used for the decision threshold
    #[arg(long)]
    contamination: Option<f64>,

    /// Number of trees in the ensemble
    #[arg(long)]
    trees: Option<usize>,

    /// Tree-building workers (defaults to one per core)
    #[arg(long)]
    workers: Option<usize>,

    /// Directory for transactions.csv and transactions_analyzed.csv
    #[arg(long, default_value = "./data")]
    out_dir: PathBuf,

    /// SQLite results database
    #[arg(long, default_value = ":memory:")]
    db: String,

    /// Rows listed in the top-anomalies table
    #[arg(long)]
    top_n: Option<usize>,
}

fn build_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let path = path.to_string_lossy();
            PipelineConfig::load(&path).with_context(|| format!("loading config {path}"))?
        }
        None => PipelineConfig::default(),
    };
    if let Some(n) = args.transactions {
        config.generator.n_transactions = n;
    }
    if let Some(r) = args.anomaly_ratio {
        config.generator.anomaly_ratio = r;
    }
    if let Some(seed) = args.seed {
        config.generator.seed = seed;
        config.forest.seed = seed;
    }
    if let Some(c) = args.contamination {
        config.forest.contamination = c;
    }
    if let Some(t) = args.trees {
        config.forest.num_trees = t;
    }
    if args.workers.is_some() {
        config.forest.worker_threads = args.workers;
    }
    if let Some(n) = args.top_n {
        config.top_n = n;
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = build_config(&args)?;

    println!("Transaction anomaly detection: anomaly-runner");
    println!("  transactions:  {}", config.generator.n_transactions);
    println!("  anomaly_ratio: {}", config.generator.anomaly_ratio);
    println!("  seed:          {}", config.generator.seed);
    println!("  contamination: {}", config.forest.contamination);
    println!("  trees:         {}", config.forest.num_trees);
    println!("  db:            {}", args.db);
    println!();

    let pipeline = Pipeline::new(config)?;
    let report = pipeline.run()?;

    dataset::write_csv(args.out_dir.join("transactions.csv"), &report.dataset.transactions)?;
    dataset::write_analyzed_csv(
        args.out_dir.join("transactions_analyzed.csv"),
        &report.transactions,
        &report.scores,
        &report.predictions,
    )?;
    log::info!("runner: csv outputs in {}", args.out_dir.display());

    let store = RunStore::open(&args.db)?;
    store.migrate()?;
    let run_id = format!(
        "run-{}-{}",
        pipeline.config().generator.seed,
        chrono::Utc::now().timestamp()
    );
    pipeline.persist(&report, &store, &run_id)?;

    print_summary(&report, &run_id, pipeline.config().top_n);
    Ok(())
}

fn print_summary(report: &PipelineReport, run_id: &str, top_n: usize) {
    println!("=== RUN SUMMARY ===");
    println!("  run_id:          {run_id}");
    println!("  rows:            {}", report.transactions.len());
    println!("  customers:       {}", report.dataset.profiles.len());
    println!("  labelled anom.:  {}", report.dataset.anomaly_count());
    println!("  predicted anom.: {}", report.predicted_positive_count());
    println!("  threshold:       {:.6}", report.threshold);
    println!();
    println!("=== EVALUATION ===");
    print!("{}", evaluator::render_report(&report.metrics));
    println!();
    println!("=== TOP {top_n} MOST ANOMALOUS TRANSACTIONS ===");
    println!(
        "  {:<12} {:<11} {:>10} {:<4} {:<19} {:>7} {}",
        "txn", "customer", "amount", "dst", "timestamp", "score", "label"
    );
    for (t, score) in report.top_anomalies(top_n) {
        println!(
            "  {:<12} {:<11} {:>10.2} {:<4} {:<19} {:>7.4} {}",
            t.transaction_id,
            t.customer_id,
            t.amount,
            t.destination_country,
            t.timestamp.format("%Y-%m-%dT%H:%M:%S"),
            score,
            t.is_anomaly
        );
    }
}
