//! Feature projection: raw transactions → fixed-order numeric matrix.
//!
//! RULE: Encoders and the scaler are fitted once (`fit`) and frozen.
//! Every later `transform` reuses the same code tables; a value the
//! tables have never seen is an error, never a silent re-fit.

use crate::{
    error::{DetectError, DetectResult},
    generator::Transaction,
    matrix::FeatureMatrix,
};
use chrono::{Datelike, Timelike};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Added to the per-customer std so single-row customers do not divide by zero.
const DEVIATION_EPSILON: f64 = 1e-6;

/// Stable, documented column order of the projected matrix.
pub const FEATURE_COLUMNS: [&str; 16] = [
    "amount",
    "hour",
    "day_of_week",
    "day_of_month",
    "month",
    "customer_avg_amount",
    "customer_std_amount",
    "customer_transaction_count",
    "customer_unique_countries",
    "customer_unique_channels",
    "amount_deviation",
    "currency_encoded",
    "origin_country_encoded",
    "destination_country_encoded",
    "channel_encoded",
    "device_type_encoded",
];

// ── Encoder registry ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoricalColumn {
    Currency,
    OriginCountry,
    DestinationCountry,
    Channel,
    DeviceType,
}

impl CategoricalColumn {
    /// Declared encoding order; matches the tail of FEATURE_COLUMNS.
    pub const REGISTRY: [CategoricalColumn; 5] = [
        CategoricalColumn::Currency,
        CategoricalColumn::OriginCountry,
        CategoricalColumn::DestinationCountry,
        CategoricalColumn::Channel,
        CategoricalColumn::DeviceType,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Currency           => "currency",
            Self::OriginCountry      => "origin_country",
            Self::DestinationCountry => "destination_country",
            Self::Channel            => "channel",
            Self::DeviceType         => "device_type",
        }
    }

    fn value<'a>(&self, txn: &'a Transaction) -> &'a str {
        match self {
            Self::Currency           => &txn.currency,
            Self::OriginCountry      => &txn.origin_country,
            Self::DestinationCountry => &txn.destination_country,
            Self::Channel            => txn.channel.as_str(),
            Self::DeviceType         => txn.device_type.as_str(),
        }
    }
}

/// Sorted distinct values → dense codes.
#[derive(Debug, Clone)]
pub struct CodeTable {
    pub column: CategoricalColumn,
    codes: BTreeMap<String, usize>,
}

impl CodeTable {
    fn fit(column: CategoricalColumn, transactions: &[Transaction]) -> Self {
        let distinct: BTreeSet<&str> = transactions.iter().map(|t| column.value(t)).collect();
        let codes = distinct
            .into_iter()
            .enumerate()
            .map(|(code, value)| (value.to_string(), code))
            .collect();
        Self { column, codes }
    }

    pub fn encode(&self, value: &str) -> DetectResult<usize> {
        self.codes
            .get(value)
            .copied()
            .ok_or_else(|| DetectError::UnknownCategory {
                column: self.column.name(),
                value: value.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

// ── Preprocessing ────────────────────────────────────────────────────────────

/// Drop rows whose transaction_id was already seen (first wins).
pub fn preprocess(transactions: &[Transaction]) -> Vec<Transaction> {
    let mut seen = HashSet::with_capacity(transactions.len());
    let kept: Vec<Transaction> = transactions
        .iter()
        .filter(|t| seen.insert(t.transaction_id.as_str()))
        .cloned()
        .collect();
    log::info!("features: dropped {} duplicate rows", transactions.len() - kept.len());
    kept
}

#[derive(Debug, Clone, PartialEq)]
pub struct CustomerAggregate {
    pub avg_amount: f64,
    /// Sample std (n - 1); 0 for a single transaction.
    pub std_amount: f64,
    pub min_amount: f64,
    pub max_amount: f64,
    pub transaction_count: usize,
    pub unique_countries: usize,
    pub unique_channels: usize,
}

impl CustomerAggregate {
    pub fn deviation(&self, amount: f64) -> f64 {
        (amount - self.avg_amount) / (self.std_amount + DEVIATION_EPSILON)
    }
}

/// Per-customer statistics over the given batch.
pub fn customer_aggregates(transactions: &[Transaction]) -> HashMap<String, CustomerAggregate> {
    let mut groups: HashMap<&str, Vec<&Transaction>> = HashMap::new();
    for t in transactions {
        groups.entry(t.customer_id.as_str()).or_default().push(t);
    }

    groups
        .into_iter()
        .map(|(customer_id, rows)| {
            let n = rows.len();
            let sum: f64 = rows.iter().map(|t| t.amount).sum();
            let avg = sum / n as f64;
            let std = if n > 1 {
                let ss: f64 = rows.iter().map(|t| (t.amount - avg).powi(2)).sum();
                (ss / (n - 1) as f64).sqrt()
            } else {
                0.0
            };
            let min = rows.iter().map(|t| t.amount).fold(f64::INFINITY, f64::min);
            let max = rows.iter().map(|t| t.amount).fold(f64::NEG_INFINITY, f64::max);
            let countries: HashSet<&str> =
                rows.iter().map(|t| t.destination_country.as_str()).collect();
            let channels: HashSet<_> = rows.iter().map(|t| t.channel).collect();

            let agg = CustomerAggregate {
                avg_amount: avg,
                std_amount: std,
                min_amount: min,
                max_amount: max,
                transaction_count: n,
                unique_countries: countries.len(),
                unique_channels: channels.len(),
            };
            (customer_id.to_string(), agg)
        })
        .collect()
}

// ── Scaling ──────────────────────────────────────────────────────────────────

/// Zero-mean, unit-variance scaling with population std.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>], width: usize) -> Self {
        let n = rows.len().max(1) as f64;
        let mut means = vec![0.0; width];
        for row in rows {
            for (m, v) in means.iter_mut().zip(row) {
                *m += v;
            }
        }
        means.iter_mut().for_each(|m| *m /= n);

        let mut scales = vec![0.0; width];
        for row in rows {
            for ((s, v), m) in scales.iter_mut().zip(row).zip(&means) {
                *s += (v - m).powi(2);
            }
        }
        // A constant column keeps its centred values (all zero).
        scales.iter_mut().for_each(|s| {
            let std = (*s / n).sqrt();
            *s = if std > 0.0 { std } else { 1.0 };
        });
        Self { means, scales }
    }

    pub fn transform_row(&self, row: &mut [f64]) {
        for ((v, m), s) in row.iter_mut().zip(&self.means).zip(&self.scales) {
            *v = (*v - m) / s;
        }
    }
}

// ── Projector ────────────────────────────────────────────────────────────────

pub struct FeatureProjector {
    encoders: Vec<CodeTable>,
    scaler: StandardScaler,
}

impl FeatureProjector {
    /// Build the code tables and the scaler from one batch.
    pub fn fit(transactions: &[Transaction]) -> DetectResult<Self> {
        let encoders: Vec<CodeTable> = CategoricalColumn::REGISTRY
            .iter()
            .map(|&col| CodeTable::fit(col, transactions))
            .collect();
        let raw = project_raw(transactions, &encoders)?;
        let scaler = StandardScaler::fit(&raw, FEATURE_COLUMNS.len());
        log::info!(
            "features: fitted {} encoders over {} rows",
            encoders.len(),
            transactions.len()
        );
        Ok(Self { encoders, scaler })
    }

    pub fn fit_transform(transactions: &[Transaction]) -> DetectResult<(Self, FeatureMatrix)> {
        let projector = Self::fit(transactions)?;
        let matrix = projector.transform(transactions)?;
        Ok((projector, matrix))
    }

    /// Project and scale a batch with the frozen encoders and scaler.
    pub fn transform(&self, transactions: &[Transaction]) -> DetectResult<FeatureMatrix> {
        let mut rows = project_raw(transactions, &self.encoders)?;
        for row in &mut rows {
            self.scaler.transform_row(row);
        }
        let columns = FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect();
        FeatureMatrix::from_rows(columns, &rows)
    }

    pub fn encoder(&self, column: CategoricalColumn) -> Option<&CodeTable> {
        self.encoders.iter().find(|e| e.column == column)
    }
}

/// Unscaled feature rows in FEATURE_COLUMNS order.
fn project_raw(transactions: &[Transaction], encoders: &[CodeTable]) -> DetectResult<Vec<Vec<f64>>> {
    let aggregates = customer_aggregates(transactions);
    transactions
        .iter()
        .map(|t| {
            let agg = &aggregates[t.customer_id.as_str()];
            let ts = t.timestamp;
            let mut row = vec![
                t.amount,
                ts.hour() as f64,
                ts.weekday().num_days_from_monday() as f64,
                ts.day() as f64,
                ts.month() as f64,
                agg.avg_amount,
                agg.std_amount,
                agg.transaction_count as f64,
                agg.unique_countries as f64,
                agg.unique_channels as f64,
                agg.deviation(t.amount),
            ];
            for enc in encoders {
                row.push(enc.encode(enc.column.value(t))? as f64);
            }
            Ok(row)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Channel, DeviceType};
    use chrono::NaiveDate;

    fn txn(id: &str, customer: &str, amount: f64, dest: &str, channel: Channel) -> Transaction {
        Transaction {
            transaction_id: id.into(),
            customer_id: customer.into(),
            timestamp: NaiveDate::from_ymd_opt(2024, 3, 4)
                .unwrap()
                .and_hms_opt(14, 30, 0)
                .unwrap(),
            amount,
            currency: "EUR".into(),
            origin_country: "ES".into(),
            destination_country: dest.into(),
            channel,
            device_type: DeviceType::Mobile,
            is_anomaly: 0,
            anomaly_type: None,
        }
    }

    #[test]
    fn aggregates_use_sample_std() {
        let rows = vec![
            txn("1", "A", 10.0, "ES", Channel::Web),
            txn("2", "A", 20.0, "FR", Channel::Web),
            txn("3", "A", 30.0, "FR", Channel::App),
            txn("4", "B", 99.0, "ES", Channel::Atm),
        ];
        let aggs = customer_aggregates(&rows);
        let a = &aggs["A"];
        assert_eq!(a.avg_amount, 20.0);
        assert!((a.std_amount - 10.0).abs() < 1e-12);
        assert_eq!((a.min_amount, a.max_amount), (10.0, 30.0));
        assert_eq!(a.unique_countries, 2);
        assert_eq!(a.unique_channels, 2);
        assert_eq!(aggs["B"].std_amount, 0.0);
        assert_eq!(aggs["B"].deviation(99.0), 0.0);
    }

    #[test]
    fn temporal_fields() {
        let rows = vec![txn("1", "A", 10.0, "ES", Channel::Web)];
        let raw = project_raw(&rows, &[]).unwrap();
        // 2024-03-04 is a Monday.
        assert_eq!(&raw[0][1..5], &[14.0, 0.0, 4.0, 3.0]);
    }

    #[test]
    fn encoders_are_sorted_and_frozen() {
        let rows = vec![
            txn("1", "A", 10.0, "FR", Channel::Web),
            txn("2", "A", 20.0, "ES", Channel::Web),
        ];
        let projector = FeatureProjector::fit(&rows).unwrap();
        let dest = projector.encoder(CategoricalColumn::DestinationCountry).unwrap();
        assert_eq!(dest.encode("ES").unwrap(), 0);
        assert_eq!(dest.encode("FR").unwrap(), 1);

        let unseen = vec![txn("3", "A", 15.0, "RU", Channel::Web)];
        let err = projector.transform(&unseen).unwrap_err();
        assert!(matches!(
            err,
            DetectError::UnknownCategory { column: "destination_country", .. }
        ));
    }

    #[test]
    fn scaled_columns_are_centred() {
        let rows: Vec<_> = (0..10)
            .map(|i| txn(&i.to_string(), "A", 10.0 * i as f64, "ES", Channel::Web))
            .collect();
        let (_, m) = FeatureProjector::fit_transform(&rows).unwrap();
        assert_eq!(m.n_cols(), FEATURE_COLUMNS.len());
        let mean_amount: f64 = (0..m.n_rows()).map(|r| m.value(r, 0)).sum::<f64>() / 10.0;
        assert!(mean_amount.abs() < 1e-9);
        // Constant column stays at zero.
        assert!((0..m.n_rows()).all(|r| m.value(r, 11) == 0.0));
    }

    #[test]
    fn duplicates_dropped() {
        let rows = vec![
            txn("1", "A", 10.0, "ES", Channel::Web),
            txn("1", "A", 11.0, "ES", Channel::Web),
            txn("2", "A", 12.0, "ES", Channel::Web),
        ];
        let kept = preprocess(&rows);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].amount, 10.0);
    }
}
