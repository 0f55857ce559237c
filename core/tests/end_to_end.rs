//! Regression floor for the whole pipeline.

use txn_anomaly_core::{evaluator, pipeline::Pipeline, DetectError, PipelineConfig};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn thousand_rows_seed_seven() {
    init_logging();
    let config = PipelineConfig::default_test();
    assert_eq!(config.generator.n_transactions, 1000);
    assert_eq!(config.forest.contamination, 0.05);

    let report = Pipeline::new(config).unwrap().run().unwrap();

    let labelled = report.dataset.anomaly_count() as i64;
    assert!((labelled - 50).abs() <= 1, "{labelled} labelled anomalies");

    let predicted = report.predicted_positive_count();
    assert!((45..=55).contains(&predicted), "{predicted} predicted anomalies");

    let auc = report.metrics.auc.expect("both classes present");
    assert!(auc > 0.7, "AUC {auc:.4} below regression floor");
}

#[test]
fn report_rows_are_aligned() {
    let report = Pipeline::new(PipelineConfig::default_test()).unwrap().run().unwrap();
    let n = report.transactions.len();
    assert_eq!(report.matrix.n_rows(), n);
    assert_eq!(report.scores.len(), n);
    assert_eq!(report.predictions.len(), n);
    assert_eq!(report.metrics.confusion.total(), n);

    let labels = report.labels();
    assert_eq!(labels.len(), n);
    let recomputed = evaluator::evaluate(&labels, &report.predictions, Some(&report.scores)).unwrap();
    assert_eq!(recomputed.confusion, report.metrics.confusion);

    let top = report.top_anomalies(5);
    assert_eq!(top.len(), 5);
    assert!(top.windows(2).all(|w| w[0].1 >= w[1].1));
}

#[test]
fn bad_config_fails_before_any_work() {
    let mut config = PipelineConfig::default_test();
    config.forest.contamination = 0.0;
    assert!(matches!(Pipeline::new(config), Err(DetectError::Configuration { .. })));
}

#[test]
fn empty_dataset_cannot_be_fitted() {
    let mut config = PipelineConfig::default_test();
    config.generator.n_transactions = 0;
    let err = Pipeline::new(config).unwrap().run().err().expect("fit must fail");
    assert!(matches!(err, DetectError::DegenerateInput { rows: 0, .. }));
}
