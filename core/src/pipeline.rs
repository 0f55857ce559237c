//! End-to-end pipeline: generation through evaluation.
//!
//! EXECUTION ORDER (fixed):
//!   1. Generate       (TransactionGenerator)
//!   2. Preprocess     (dedupe by transaction_id)
//!   3. Project        (FeatureProjector: fit once, then transform)
//!   4. Fit + score    (AnomalyDetector over the projected matrix)
//!   5. Evaluate       (labels are used here and nowhere earlier)
//!
//! RULES:
//!   - Configuration is validated before phase 1.
//!   - The detector never sees labels or profiles.

use crate::{
    config::PipelineConfig,
    detector::AnomalyDetector,
    error::DetectResult,
    evaluator::{self, EvaluationMetrics},
    features::{self, FeatureProjector},
    generator::{Dataset, Transaction, TransactionGenerator},
    matrix::FeatureMatrix,
    store::RunStore,
    types::Label,
};

pub struct PipelineReport {
    pub dataset: Dataset,
    /// Deduplicated rows, aligned with `matrix`, `scores` and `predictions`.
    pub transactions: Vec<Transaction>,
    pub matrix: FeatureMatrix,
    pub scores: Vec<f64>,
    pub predictions: Vec<Label>,
    pub threshold: f64,
    pub metrics: EvaluationMetrics,
}

impl PipelineReport {
    pub fn labels(&self) -> Vec<Label> {
        self.transactions.iter().map(|t| t.is_anomaly).collect()
    }

    pub fn predicted_positive_count(&self) -> usize {
        self.predictions.iter().filter(|&&p| p == 1).count()
    }

    pub fn top_anomalies(&self, n: usize) -> Vec<(&Transaction, f64)> {
        evaluator::top_anomalies(&self.transactions, &self.scores, n)
    }
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> DetectResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(&self) -> DetectResult<PipelineReport> {
        log::info!("[phase 1] generating synthetic transactions");
        let dataset = TransactionGenerator::new(self.config.generator.clone())?.generate();
        self.run_on(dataset)
    }

    /// Phases 2-5 over an already generated dataset.
    pub fn run_on(&self, dataset: Dataset) -> DetectResult<PipelineReport> {
        log::info!("[phase 2] preprocessing {} rows", dataset.len());
        let transactions = features::preprocess(&dataset.transactions);

        log::info!("[phase 3] projecting features");
        let (_projector, matrix) = FeatureProjector::fit_transform(&transactions)?;
        log::debug!("features: {:?}", matrix.column_names());

        log::info!("[phase 4] fitting anomaly detector");
        let mut detector = AnomalyDetector::new(self.config.forest.clone())?;
        detector.train(&matrix)?;
        let scores = detector.score_samples(&matrix)?;
        let predictions = detector.predict(&matrix)?;
        let threshold = detector.forest().map(|f| f.threshold()).unwrap_or(f64::INFINITY);

        log::info!("[phase 5] evaluating");
        let labels: Vec<Label> = transactions.iter().map(|t| t.is_anomaly).collect();
        let metrics = evaluator::evaluate(&labels, &predictions, Some(&scores))?;

        Ok(PipelineReport {
            dataset,
            transactions,
            matrix,
            scores,
            predictions,
            threshold,
            metrics,
        })
    }

    /// Write the run, its rows, scores and metrics to the results store.
    pub fn persist(&self, report: &PipelineReport, store: &RunStore, run_id: &str) -> DetectResult<()> {
        store.insert_run(run_id, self.config.generator.seed, env!("CARGO_PKG_VERSION"))?;
        store.insert_transactions(run_id, &report.transactions)?;
        let ids: Vec<String> = report
            .transactions
            .iter()
            .map(|t| t.transaction_id.clone())
            .collect();
        store.insert_scores(run_id, &ids, &report.scores, &report.predictions)?;
        store.insert_metrics(run_id, &report.metrics)?;
        log::info!("store: persisted run {run_id}");
        Ok(())
    }
}
