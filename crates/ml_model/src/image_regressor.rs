//! Convolutional price regressor over house photos.

use core::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result, anyhow, bail, ensure};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::{Linear, LinearConfig, PaddingConfig2d, Relu};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkBytesRecorder, Recorder};
use burn::tensor::TensorData;
use feature_extractor::IMAGE_CHANNELS;
use tracing::debug;

use crate::{ModelInput, ModelOutput, Predictor};

/// Configuration for the image regressor.
#[derive(Config, Debug)]
pub struct ImageRegressorConfig {
    /// Channels of the first convolution; each further block doubles them.
    #[config(default = 16)]
    pub base_channels: usize,
    /// Number of stride-2 convolution blocks.
    #[config(default = 4)]
    pub num_blocks: usize,
    /// Hidden units of the regression head.
    #[config(default = 64)]
    pub hidden_size: usize,
}

impl ImageRegressorConfig {
    /// Creates a randomly initialized regressor.
    pub fn init<B: Backend>(&self, device: &B::Device) -> ImageRegressor<B> {
        let mut blocks = Vec::with_capacity(self.num_blocks);
        let mut in_channels = IMAGE_CHANNELS;
        let mut out_channels = self.base_channels.max(1);

        for _ in 0..self.num_blocks.max(1) {
            let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device);
            blocks.push(ConvBlock {
                conv,
                activation: Relu::new(),
            });
            in_channels = out_channels;
            out_channels *= 2;
        }

        ImageRegressor {
            blocks,
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            hidden: LinearConfig::new(in_channels, self.hidden_size).init(device),
            output: LinearConfig::new(self.hidden_size, 1).init(device),
            activation: Relu::new(),
        }
    }
}

/// Convolution followed by a ReLU.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    activation: Relu,
}

impl<B: Backend> ConvBlock<B> {
    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.activation.forward(self.conv.forward(input))
    }
}

/// Regresses a single price value from an image tensor.
#[derive(Module, Debug)]
pub struct ImageRegressor<B: Backend> {
    blocks: Vec<ConvBlock<B>>,
    pool: AdaptiveAvgPool2d,
    hidden: Linear<B>,
    output: Linear<B>,
    activation: Relu,
}

impl<B: Backend> ImageRegressor<B> {
    /// Forward pass through the network.
    ///
    /// # Arguments
    ///
    /// * `input` - Tensor of shape [`batch_size`, 3, `height`, `width`]
    ///
    /// # Returns
    ///
    /// Tensor of shape [`batch_size`, 1] containing predicted prices.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = input;
        for block in &self.blocks {
            x = block.forward(x);
        }

        let x: Tensor<B, 2> = self.pool.forward(x).flatten(1, 3);
        let x = self.activation.forward(self.hidden.forward(x));
        self.output.forward(x)
    }
}

/// Serves an [`ImageRegressor`] on a fixed device.
///
/// Burn modules are not `Sync`, so calls take turns on the model.
#[derive(Debug)]
pub struct ImagePredictor<B: Backend> {
    model: Mutex<ImageRegressor<B>>,
    device: B::Device,
}

impl<B: Backend> ImagePredictor<B> {
    #[must_use]
    pub const fn new(model: ImageRegressor<B>, device: B::Device) -> Self {
        Self {
            model: Mutex::new(model),
            device,
        }
    }

    /// Restores a regressor from its JSON configuration and its weights,
    /// as written by `NamedMpkBytesRecorder` at full precision.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration or the weights cannot be decoded,
    /// or the weights do not fit the configured architecture.
    pub fn from_bytes(config: &[u8], weights: &[u8], device: &B::Device) -> Result<Self> {
        let config = ImageRegressorConfig::load_binary(config)
            .map_err(|e| anyhow!("Invalid image model config: {e:?}"))?;

        let recorder = NamedMpkBytesRecorder::<FullPrecisionSettings>::default();
        let record: <ImageRegressor<B> as Module<B>>::Record =
            Recorder::<B>::load(&recorder, weights.to_vec(), device)
                .map_err(|e| anyhow!("Invalid image model weights: {e:?}"))?;

        debug!(
            base_channels = config.base_channels,
            num_blocks = config.num_blocks,
            hidden_size = config.hidden_size,
            "Restored image regressor"
        );

        // Burn asserts instead of returning an error when a record does not
        // fit the module. A pass over a blank image must also succeed.
        let model = panic::catch_unwind(AssertUnwindSafe(|| {
            let model = config.init::<B>(device).load_record(record);
            let side = 8;
            model.forward(Tensor::zeros([1, IMAGE_CHANNELS, side, side], device));
            model
        }))
        .map_err(|payload| {
            anyhow!(
                "Image model weights do not fit its configuration: {}",
                panic_message(payload.as_ref())
            )
        })?;

        Ok(Self::new(model, device.clone()))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

impl<B: Backend> Predictor for ImagePredictor<B> {
    fn family(&self) -> &'static str {
        "image_regressor"
    }

    fn predict(&self, input: &ModelInput) -> Result<ModelOutput> {
        let ModelInput::Image(tensor) = input else {
            bail!("Image regressors only accept image input");
        };

        let [batch, channels, height, width] = tensor.shape;
        ensure!(
            channels == IMAGE_CHANNELS,
            "Expected {IMAGE_CHANNELS} channels, got {channels}"
        );
        ensure!(
            tensor.data.len() == batch * channels * height * width,
            "Tensor data does not match its shape {:?}",
            tensor.shape
        );

        let input = Tensor::<B, 4>::from_data(
            TensorData::new(tensor.data.clone(), tensor.shape),
            &self.device,
        );
        // Inference never mutates the model, so a poisoned lock is still usable.
        let output = self
            .model
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .forward(input);
        let shape = output.dims().to_vec();

        let values = output
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| anyhow!("Failed to read model output: {e:?}"))
            .context("Image regressor produced an unreadable tensor")?;

        Ok(ModelOutput { values, shape })
    }
}
