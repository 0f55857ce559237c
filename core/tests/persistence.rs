//! CSV and SQLite persistence of generated and scored runs.

use std::fs;
use txn_anomaly_core::{
    dataset,
    pipeline::Pipeline,
    store::RunStore,
    GeneratorConfig, PipelineConfig, TransactionGenerator,
};

#[test]
fn csv_has_documented_header_and_reads_back() {
    let ds = TransactionGenerator::new(GeneratorConfig::new(200, 0.1, 9))
        .unwrap()
        .generate();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out").join("transactions.csv");

    dataset::write_csv(&path, &ds.transactions).unwrap();
    let text = fs::read_to_string(&path).unwrap();
    let header = text.lines().next().unwrap();
    assert_eq!(
        header,
        "transaction_id,customer_id,timestamp,amount,currency,origin_country,\
         destination_country,channel,device_type,is_anomaly"
    );
    let first = text.lines().nth(1).unwrap();
    assert!(first.starts_with("TXN00000000,CUST"));

    let back = dataset::read_csv(&path).unwrap();
    assert_eq!(back.len(), 200);
    for (a, b) in ds.transactions.iter().zip(&back) {
        assert_eq!(a.transaction_id, b.transaction_id);
        assert_eq!(a.timestamp, b.timestamp);
        assert_eq!(a.amount, b.amount);
        assert_eq!(a.channel, b.channel);
        assert_eq!(a.is_anomaly, b.is_anomaly);
    }
}

#[test]
fn analyzed_csv_carries_scores() {
    let report = Pipeline::new(PipelineConfig::default_test()).unwrap().run().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("transactions_analyzed.csv");

    dataset::write_analyzed_csv(&path, &report.transactions, &report.scores, &report.predictions)
        .unwrap();
    let text = fs::read_to_string(&path).unwrap();
    assert!(text.lines().next().unwrap().ends_with("is_anomaly,anomaly_score,predicted_anomaly"));
    assert_eq!(text.lines().count(), report.transactions.len() + 1);
}

#[test]
fn run_is_persisted_to_store() {
    let pipeline = Pipeline::new(PipelineConfig::default_test()).unwrap();
    let report = pipeline.run().unwrap();

    let store = RunStore::in_memory().unwrap();
    store.migrate().unwrap();
    pipeline.persist(&report, &store, "persist-test").unwrap();

    assert_eq!(store.transaction_count("persist-test").unwrap(), 1000);
    assert_eq!(
        store.anomaly_label_count("persist-test").unwrap() as usize,
        report.dataset.anomaly_count()
    );
    assert_eq!(
        store.predicted_positive_count("persist-test").unwrap() as usize,
        report.predicted_positive_count()
    );

    let top = store.top_scored("persist-test", 10).unwrap();
    assert_eq!(top.len(), 10);
    assert!(top.windows(2).all(|w| w[0].anomaly_score >= w[1].anomaly_score));

    let metrics = store.load_metrics("persist-test").unwrap().expect("metrics row");
    assert_eq!(metrics.confusion, report.metrics.confusion);
    assert!(store.load_metrics("missing").unwrap().is_none());
}

#[test]
fn empty_batch_still_writes_header() {
    let ds = TransactionGenerator::new(GeneratorConfig::new(0, 0.05, 1))
        .unwrap()
        .generate();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.csv");

    dataset::write_csv(&path, &ds.transactions).unwrap();
    let text = fs::read_to_string(&path).unwrap();
    assert_eq!(text.trim_end(), dataset::TRANSACTION_HEADER.join(","));
    assert!(dataset::read_csv(&path).unwrap().is_empty());
}
