use std::path::PathBuf;

use anyhow::Result;
use clap::ValueEnum;

use crate::{
    classifier::DigitClassifier,
    error::ClassifierError,
    model_download::ModelKind,
    palm_box::DEFAULT_PALM_PADDING,
    stabilizer::DEFAULT_STABILITY_THRESHOLD,
    strategy::{ClassifierStrategy, CountStrategy, GeometricStrategy},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum StrategyKind {
    /// Count fingers from landmark geometry.
    #[default]
    Geometric,
    /// Classify the palm crop with an image model.
    Classifier,
}

#[derive(Clone, Debug)]
pub struct CounterConfig {
    pub strategy: StrategyKind,
    pub stability_threshold: usize,
    pub palm_padding: i32,
    pub handpose_model_path: PathBuf,
    pub palm_model_path: PathBuf,
    pub classifier_model_path: Option<PathBuf>,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            stability_threshold: DEFAULT_STABILITY_THRESHOLD,
            palm_padding: DEFAULT_PALM_PADDING,
            handpose_model_path: ModelKind::HandposeEstimator.default_path(),
            palm_model_path: ModelKind::PalmDetector.default_path(),
            classifier_model_path: None,
        }
    }
}

impl CounterConfig {
    pub fn build_strategy(&self) -> Result<Box<dyn CountStrategy>> {
        match self.strategy {
            StrategyKind::Geometric => Ok(Box::new(GeometricStrategy)),
            StrategyKind::Classifier => {
                let path = self
                    .classifier_model_path
                    .as_deref()
                    .ok_or(ClassifierError::MissingModel)?;
                Ok(Box::new(ClassifierStrategy::new(DigitClassifier::new(
                    path,
                )?)))
            }
        }
    }
}
