//! Feature extractor crate for the house price models.
//!
//! This crate turns raw request fields into ML-ready inputs: it validates
//! them against a model's schema, assembles tabular feature rows in schema
//! order, and decodes images into normalized tensors.

mod image_pipeline;
mod tabular;
mod validate;

pub use image_pipeline::{DEFAULT_IMAGE_SIZE, ImagePreprocessor};
pub use tabular::assemble_feature_row;
pub use validate::{validate, validate_positional};

/// Number of colour channels fed to image models.
pub const IMAGE_CHANNELS: usize = 3;

/// Dense `f32` tensor in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    /// Flattened values.
    pub data: Vec<f32>,
    /// Layout `[batch, channel, height, width]`.
    pub shape: [usize; 4],
}

/// Input handed to a model's prediction call.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelInput {
    /// A single feature row in schema order.
    Tabular(Vec<f32>),
    /// A single preprocessed image.
    Image(ImageTensor),
}
