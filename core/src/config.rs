//! Pipeline configuration.
//!
//! Loaded from a JSON file by the runner; tests build values directly
//! or start from `PipelineConfig::default()`.

use crate::error::{DetectError, DetectResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_NUM_TREES: usize = 100;
pub const DEFAULT_CONTAMINATION: f64 = 0.05;
pub const MAX_SUB_SAMPLE_SIZE: usize = 256;

/// Upper bound on contamination; above one half the "anomalies" are the majority.
pub const MAX_CONTAMINATION: f64 = 0.5;

fn default_as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 1).unwrap_or_default()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratorConfig {
    pub n_transactions: usize,
    pub anomaly_ratio: f64,
    pub seed: u64,
    /// End of the lookback window. Fixed rather than "today" so that
    /// a seed reproduces the same bytes on any day.
    #[serde(default = "default_as_of")]
    pub as_of: NaiveDate,
}

impl GeneratorConfig {
    pub fn new(n_transactions: usize, anomaly_ratio: f64, seed: u64) -> Self {
        Self {
            n_transactions,
            anomaly_ratio,
            seed,
            as_of: default_as_of(),
        }
    }

    pub fn validate(&self) -> DetectResult<()> {
        if !self.anomaly_ratio.is_finite() || !(0.0..1.0).contains(&self.anomaly_ratio) {
            return Err(DetectError::config(format!(
                "anomaly_ratio must be in [0, 1), got {}",
                self.anomaly_ratio
            )));
        }
        Ok(())
    }

    /// Number of anomalous rows: round(n * ratio).
    pub fn n_anomalies(&self) -> usize {
        ((self.n_transactions as f64) * self.anomaly_ratio).round() as usize
    }

    pub fn n_normal(&self) -> usize {
        self.n_transactions - self.n_anomalies().min(self.n_transactions)
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self::new(10_000, 0.05, 42)
    }
}

/// Anomaly engine variants understood by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EngineKind {
    IsolationForest,
}

impl FromStr for EngineKind {
    type Err = DetectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "isolation_forest" => Ok(Self::IsolationForest),
            other => Err(DetectError::config(format!("unsupported engine variant: {other}"))),
        }
    }
}

impl TryFrom<String> for EngineKind {
    type Error = DetectError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EngineKind> for String {
    fn from(kind: EngineKind) -> Self {
        kind.to_string()
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IsolationForest => f.write_str("isolation_forest"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForestConfig {
    #[serde(default = "default_engine")]
    pub engine: EngineKind,
    #[serde(default = "default_num_trees")]
    pub num_trees: usize,
    /// `None` means min(256, n).
    #[serde(default)]
    pub sub_sample_size: Option<usize>,
    #[serde(default = "default_contamination")]
    pub contamination: f64,
    pub seed: u64,
    /// `None` uses the global rayon pool (one worker per core).
    #[serde(default)]
    pub worker_threads: Option<usize>,
}

fn default_engine() -> EngineKind {
    EngineKind::IsolationForest
}

fn default_num_trees() -> usize {
    DEFAULT_NUM_TREES
}

fn default_contamination() -> f64 {
    DEFAULT_CONTAMINATION
}

impl ForestConfig {
    pub fn new(seed: u64) -> Self {
        Self {
            engine: default_engine(),
            num_trees: DEFAULT_NUM_TREES,
            sub_sample_size: None,
            contamination: DEFAULT_CONTAMINATION,
            seed,
            worker_threads: None,
        }
    }

    pub fn with_contamination(mut self, contamination: f64) -> Self {
        self.contamination = contamination;
        self
    }

    pub fn with_trees(mut self, num_trees: usize) -> Self {
        self.num_trees = num_trees;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.worker_threads = Some(workers);
        self
    }

    pub fn validate(&self) -> DetectResult<()> {
        if self.num_trees == 0 {
            return Err(DetectError::config("num_trees must be at least 1"));
        }
        validate_contamination(self.contamination)?;
        if let Some(psi) = self.sub_sample_size {
            if psi < 2 {
                return Err(DetectError::config(format!(
                    "sub_sample_size must be at least 2, got {psi}"
                )));
            }
        }
        if self.worker_threads == Some(0) {
            return Err(DetectError::config("worker_threads must be at least 1"));
        }
        Ok(())
    }
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self::new(42)
    }
}

pub fn validate_contamination(contamination: f64) -> DetectResult<()> {
    if !contamination.is_finite() || contamination <= 0.0 || contamination > MAX_CONTAMINATION {
        return Err(DetectError::config(format!(
            "contamination must be in (0, {MAX_CONTAMINATION}], got {contamination}"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    pub generator: GeneratorConfig,
    pub forest: ForestConfig,
    /// Rows listed in the "most anomalous" report.
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

fn default_top_n() -> usize {
    15
}

impl PipelineConfig {
    /// Load from a JSON file.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: PipelineConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> DetectResult<()> {
        self.generator.validate()?;
        self.forest.validate()
    }

    /// Small, fast config for tests.
    pub fn default_test() -> Self {
        Self {
            generator: GeneratorConfig::new(1000, 0.05, 7),
            forest: ForestConfig::new(7),
            top_n: 5,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            generator: GeneratorConfig::default(),
            forest: ForestConfig::default(),
            top_n: default_top_n(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anomaly_ratio_bounds() {
        assert!(GeneratorConfig::new(100, 0.0, 1).validate().is_ok());
        assert!(GeneratorConfig::new(100, 0.99, 1).validate().is_ok());
        assert!(GeneratorConfig::new(100, 1.0, 1).validate().is_err());
        assert!(GeneratorConfig::new(100, -0.1, 1).validate().is_err());
        assert!(GeneratorConfig::new(100, f64::NAN, 1).validate().is_err());
    }

    #[test]
    fn anomaly_count_rounds() {
        assert_eq!(GeneratorConfig::new(1000, 0.05, 1).n_anomalies(), 50);
        assert_eq!(GeneratorConfig::new(30, 0.05, 1).n_anomalies(), 2);
        assert_eq!(GeneratorConfig::new(0, 0.05, 1).n_anomalies(), 0);
    }

    #[test]
    fn unsupported_engine_is_rejected() {
        assert!("isolation_forest".parse::<EngineKind>().is_ok());
        let err = "lof".parse::<EngineKind>().unwrap_err();
        assert!(matches!(err, DetectError::Configuration { .. }));
    }

    #[test]
    fn forest_config_checks() {
        assert!(ForestConfig::new(1).validate().is_ok());
        assert!(ForestConfig::new(1).with_trees(0).validate().is_err());
        assert!(ForestConfig::new(1).with_contamination(0.0).validate().is_err());
        assert!(ForestConfig::new(1).with_contamination(0.6).validate().is_err());
        assert!(ForestConfig::new(1).with_workers(0).validate().is_err());
    }

    #[test]
    fn json_round_trip_uses_defaults() {
        let json = r#"{
            "generator": { "n_transactions": 500, "anomaly_ratio": 0.1, "seed": 3 },
            "forest": { "seed": 3 }
        }"#;
        let cfg: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.forest.num_trees, DEFAULT_NUM_TREES);
        assert_eq!(cfg.forest.engine, EngineKind::IsolationForest);
        assert_eq!(cfg.top_n, 15);
        assert_eq!(cfg.generator.as_of, default_as_of());
    }

    #[test]
    fn json_with_unknown_engine_fails() {
        let json = r#"{
            "generator": { "n_transactions": 500, "anomaly_ratio": 0.1, "seed": 3 },
            "forest": { "seed": 3, "engine": "lof" }
        }"#;
        assert!(serde_json::from_str::<PipelineConfig>(json).is_err());
    }
}
