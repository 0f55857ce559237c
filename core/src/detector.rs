//! Detector facade: picks the engine variant and exposes the
//! outward contract (`predict` → 0/1, `score_samples` → float,
//! higher = more anomalous).

use crate::{
    config::{EngineKind, ForestConfig},
    error::{DetectError, DetectResult},
    forest::RandomPartitionForest,
    matrix::FeatureMatrix,
    types::Label,
};

pub struct AnomalyDetector {
    config: ForestConfig,
    model: Option<RandomPartitionForest>,
}

impl AnomalyDetector {
    /// Validates the configuration (including the engine variant)
    /// before any fitting work.
    pub fn new(config: ForestConfig) -> DetectResult<Self> {
        config.validate()?;
        Ok(Self { config, model: None })
    }

    pub fn train(&mut self, matrix: &FeatureMatrix) -> DetectResult<&mut Self> {
        log::info!("detector: training {} model", self.config.engine);
        let model = match self.config.engine {
            EngineKind::IsolationForest => RandomPartitionForest::fit(matrix, &self.config)?,
        };
        self.model = Some(model);
        Ok(self)
    }

    fn model(&self) -> DetectResult<&RandomPartitionForest> {
        self.model.as_ref().ok_or(DetectError::NotFitted)
    }

    pub fn predict(&self, matrix: &FeatureMatrix) -> DetectResult<Vec<Label>> {
        self.model()?.predict_matrix(matrix)
    }

    pub fn score_samples(&self, matrix: &FeatureMatrix) -> DetectResult<Vec<f64>> {
        self.model()?.score_matrix(matrix)
    }

    pub fn forest(&self) -> Option<&RandomPartitionForest> {
        self.model.as_ref()
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn use_before_train_fails() {
        let detector = AnomalyDetector::new(ForestConfig::new(1)).unwrap();
        let m = FeatureMatrix::from_unnamed_rows(&[vec![1.0], vec![2.0]]).unwrap();
        assert!(matches!(detector.predict(&m), Err(DetectError::NotFitted)));
        assert!(matches!(detector.score_samples(&m), Err(DetectError::NotFitted)));
    }

    #[test]
    fn invalid_contamination_fails_fast() {
        let cfg = ForestConfig::new(1).with_contamination(0.9);
        assert!(matches!(
            AnomalyDetector::new(cfg),
            Err(DetectError::Configuration { .. })
        ));
    }
}
