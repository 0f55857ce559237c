//! Delimited-text persistence for generated and scored batches.
//!
//! The transaction file is the generator's output schema with a
//! header row; it is read back unmodified by the feature projector.

use crate::{error::DetectResult, generator::Transaction, types::Label};
use std::fs;
use std::path::Path;

/// Column order of the transaction file.
pub const TRANSACTION_HEADER: [&str; 10] = [
    "transaction_id",
    "customer_id",
    "timestamp",
    "amount",
    "currency",
    "origin_country",
    "destination_country",
    "channel",
    "device_type",
    "is_anomaly",
];

pub const ANALYZED_HEADER: [&str; 12] = [
    "transaction_id",
    "customer_id",
    "timestamp",
    "amount",
    "currency",
    "origin_country",
    "destination_country",
    "channel",
    "device_type",
    "is_anomaly",
    "anomaly_score",
    "predicted_anomaly",
];

fn ensure_parent(path: &Path) -> DetectResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

pub fn write_csv(path: impl AsRef<Path>, transactions: &[Transaction]) -> DetectResult<()> {
    let path = path.as_ref();
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;
    // serde only emits the header alongside the first record.
    if transactions.is_empty() {
        writer.write_record(TRANSACTION_HEADER)?;
    }
    for txn in transactions {
        writer.serialize(txn)?;
    }
    writer.flush()?;
    log::info!("dataset: wrote {} rows to {}", transactions.len(), path.display());
    Ok(())
}

pub fn read_csv(path: impl AsRef<Path>) -> DetectResult<Vec<Transaction>> {
    let mut reader = csv::Reader::from_path(path.as_ref())?;
    let rows = reader
        .deserialize()
        .collect::<Result<Vec<Transaction>, csv::Error>>()?;
    log::debug!("dataset: read {} rows from {}", rows.len(), path.as_ref().display());
    Ok(rows)
}

/// Export rows with their score and predicted label.
pub fn write_analyzed_csv(
    path: impl AsRef<Path>,
    transactions: &[Transaction],
    scores: &[f64],
    predictions: &[Label],
) -> DetectResult<()> {
    let path = path.as_ref();
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(ANALYZED_HEADER)?;
    for ((transaction, &anomaly_score), &predicted_anomaly) in
        transactions.iter().zip(scores).zip(predictions)
    {
        writer.write_record(&[
            transaction.transaction_id.clone(),
            transaction.customer_id.clone(),
            transaction.timestamp.format("%Y-%m-%dT%H:%M:%S").to_string(),
            transaction.amount.to_string(),
            transaction.currency.clone(),
            transaction.origin_country.clone(),
            transaction.destination_country.clone(),
            transaction.channel.to_string(),
            transaction.device_type.to_string(),
            transaction.is_anomaly.to_string(),
            format!("{anomaly_score:.6}"),
            predicted_anomaly.to_string(),
        ])?;
    }
    writer.flush()?;
    log::info!("dataset: wrote analyzed rows to {}", path.display());
    Ok(())
}
