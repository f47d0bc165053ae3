//! ML model crate for house price prediction.
//!
//! Every servable model implements [`Predictor`]. Two implementations are
//! provided: [`GradientBoostedTrees`], which evaluates a fitted XGBoost
//! ensemble natively, and [`ImagePredictor`], a Burn convolutional regressor
//! over preprocessed house photos.

mod gbtree;
mod image_regressor;

pub use feature_extractor::ModelInput;
pub use gbtree::{GradientBoostedTrees, Objective};
pub use image_regressor::{ImagePredictor, ImageRegressor, ImageRegressorConfig};

/// Raw output of a prediction call: a row-major buffer and its shape.
///
/// An empty shape denotes a scalar.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutput {
    pub values: Vec<f32>,
    pub shape: Vec<usize>,
}

impl ModelOutput {
    #[must_use]
    pub fn scalar(value: f32) -> Self {
        Self {
            values: vec![value],
            shape: Vec::new(),
        }
    }
}

/// A fitted model that can be invoked concurrently from any thread.
pub trait Predictor: Send + Sync {
    /// Short label of the model family, used in logs.
    fn family(&self) -> &'static str;

    /// Runs inference on a single prepared input.
    ///
    /// # Errors
    ///
    /// Returns an error if the input does not fit the model or inference fails.
    fn predict(&self, input: &ModelInput) -> anyhow::Result<ModelOutput>;
}
