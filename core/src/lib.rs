//! Synthetic transaction generation and unsupervised anomaly scoring.
//!
//! Control flow:
//!   CustomerProfileStore → TransactionGenerator → FeatureProjector
//!   → RandomPartitionForest → evaluator

pub mod config;
pub mod dataset;
pub mod detector;
pub mod error;
pub mod evaluator;
pub mod features;
pub mod forest;
pub mod generator;
pub mod matrix;
pub mod partition_tree;
pub mod pipeline;
pub mod profile;
pub mod rng;
pub mod store;
pub mod types;

pub use config::{EngineKind, ForestConfig, GeneratorConfig, PipelineConfig};
pub use error::{DetectError, DetectResult};
pub use forest::RandomPartitionForest;
pub use generator::{Dataset, Transaction, TransactionGenerator};
pub use matrix::FeatureMatrix;
