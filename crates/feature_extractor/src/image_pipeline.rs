//! Image decoding into model-ready tensors.

use image::imageops::{self, FilterType};
use prediction_structs::{ChannelOrder, PredictionError};
use tracing::debug;

use crate::{IMAGE_CHANNELS, ImageTensor};

/// Default target width and height.
pub const DEFAULT_IMAGE_SIZE: u32 = 224;

/// Maximum value of an 8-bit channel, used for normalization.
const CHANNEL_MAX: f32 = 255.0;

/// Deterministic pipeline turning compressed image bytes into a
/// `[1, 3, size, size]` tensor with values in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImagePreprocessor {
    size: u32,
    channel_order: ChannelOrder,
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self {
            size: DEFAULT_IMAGE_SIZE,
            channel_order: ChannelOrder::default(),
        }
    }
}

impl ImagePreprocessor {
    /// Creates a preprocessor; a zero `size` falls back to the default.
    #[must_use]
    pub const fn new(size: u32, channel_order: ChannelOrder) -> Self {
        let size = if size == 0 { DEFAULT_IMAGE_SIZE } else { size };
        Self {
            size,
            channel_order,
        }
    }

    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    #[must_use]
    pub const fn channel_order(&self) -> ChannelOrder {
        self.channel_order
    }

    /// Shape of the tensors this preprocessor produces.
    #[must_use]
    pub const fn output_shape(&self) -> [usize; 4] {
        let side = self.size as usize;
        [1, IMAGE_CHANNELS, side, side]
    }

    /// Decodes, resizes, normalizes and lays out an image.
    ///
    /// # Errors
    ///
    /// Returns `DecodeFailure` if the bytes are not a supported image.
    pub fn preprocess(&self, bytes: &[u8]) -> Result<ImageTensor, PredictionError> {
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| PredictionError::DecodeFailure(e.to_string()))?;

        if decoded.width() == 0 || decoded.height() == 0 {
            return Err(PredictionError::DecodeFailure(
                "Image has no pixels".to_string(),
            ));
        }

        debug!(
            width = decoded.width(),
            height = decoded.height(),
            target = self.size,
            "Decoded image"
        );

        // Alpha is dropped, as a colour-only decode would.
        let rgb = decoded.to_rgb8();
        let resized = imageops::resize(&rgb, self.size, self.size, FilterType::Triangle);

        let shape = self.output_shape();
        let side = shape[3];
        let plane = side * side;
        let mut data = vec![0.0_f32; IMAGE_CHANNELS * plane];

        for (x, y, pixel) in resized.enumerate_pixels() {
            let [r, g, b] = pixel.0;
            let channels = match self.channel_order {
                ChannelOrder::Rgb => [r, g, b],
                ChannelOrder::Bgr => [b, g, r],
            };

            let offset = y as usize * side + x as usize;
            for (channel, value) in channels.into_iter().enumerate() {
                data[channel * plane + offset] = f32::from(value) / CHANNEL_MAX;
            }
        }

        Ok(ImageTensor { data, shape })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};

    use super::*;

    fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buffer = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buffer), format)
            .unwrap();
        buffer
    }

    fn solid_png(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        encode(
            DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color))),
            ImageFormat::Png,
        )
    }

    fn channel(tensor: &ImageTensor, index: usize) -> &[f32] {
        let plane = tensor.shape[2] * tensor.shape[3];
        &tensor.data[index * plane..(index + 1) * plane]
    }

    #[test]
    fn test_output_has_target_resolution() {
        let preprocessor = ImagePreprocessor::default();

        for (width, height) in [(31, 17), (224, 224), (640, 480), (1, 1)] {
            let tensor = preprocessor
                .preprocess(&solid_png(width, height, [10, 20, 30]))
                .unwrap();
            assert_eq!(tensor.shape, [1, 3, 224, 224]);
            assert_eq!(tensor.data.len(), 3 * 224 * 224);
        }
    }

    #[test]
    fn test_values_are_normalized() {
        let preprocessor = ImagePreprocessor::new(8, ChannelOrder::Rgb);
        let tensor = preprocessor
            .preprocess(&solid_png(20, 10, [255, 0, 51]))
            .unwrap();

        assert!(tensor.data.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!(channel(&tensor, 0).iter().all(|v| (v - 1.0).abs() < 1e-2));
        assert!(channel(&tensor, 1).iter().all(|v| v.abs() < 1e-2));
        assert!(channel(&tensor, 2).iter().all(|v| (v - 0.2).abs() < 1e-2));
    }

    #[test]
    fn test_bgr_order_swaps_planes() {
        let png = solid_png(5, 5, [255, 0, 0]);

        let rgb = ImagePreprocessor::new(4, ChannelOrder::Rgb)
            .preprocess(&png)
            .unwrap();
        let bgr = ImagePreprocessor::new(4, ChannelOrder::Bgr)
            .preprocess(&png)
            .unwrap();

        assert_eq!(channel(&rgb, 0), channel(&bgr, 2));
        assert_eq!(channel(&rgb, 2), channel(&bgr, 0));
        assert!(channel(&bgr, 2).iter().all(|v| (v - 1.0).abs() < 1e-2));
    }

    #[test]
    fn test_channel_first_layout() {
        // Left half white, right half black.
        let mut image = RgbImage::new(4, 2);
        for (x, _, pixel) in image.enumerate_pixels_mut() {
            *pixel = if x < 2 { Rgb([255, 255, 255]) } else { Rgb([0, 0, 0]) };
        }
        let png = encode(DynamicImage::ImageRgb8(image), ImageFormat::Png);

        let tensor = ImagePreprocessor::new(4, ChannelOrder::Rgb)
            .preprocess(&png)
            .unwrap();

        // First row of the red plane: bright on the left, dark on the right.
        let red = channel(&tensor, 0);
        assert!(red[0] > 0.9);
        assert!(red[3] < 0.1);
    }

    #[test]
    fn test_jpeg_and_alpha_inputs() {
        let preprocessor = ImagePreprocessor::new(16, ChannelOrder::Bgr);

        let jpeg = encode(
            DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 30, Rgb([90, 120, 200]))),
            ImageFormat::Jpeg,
        );
        assert_eq!(preprocessor.preprocess(&jpeg).unwrap().shape, [1, 3, 16, 16]);

        let rgba = encode(
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(9, 9, Rgba([1, 2, 3, 0]))),
            ImageFormat::Png,
        );
        assert_eq!(preprocessor.preprocess(&rgba).unwrap().shape, [1, 3, 16, 16]);
    }

    #[test]
    fn test_same_bytes_same_tensor() {
        let preprocessor = ImagePreprocessor::default();
        let mut image = RgbImage::new(50, 37);
        for (x, y, pixel) in image.enumerate_pixels_mut() {
            *pixel = Rgb([(x * 5) as u8, (y * 6) as u8, ((x + y) * 2) as u8]);
        }
        let png = encode(DynamicImage::ImageRgb8(image), ImageFormat::Png);

        assert_eq!(
            preprocessor.preprocess(&png).unwrap(),
            preprocessor.preprocess(&png).unwrap()
        );
    }

    #[test]
    fn test_undecodable_bytes() {
        let preprocessor = ImagePreprocessor::default();

        let err = preprocessor.preprocess(b"definitely not an image").unwrap_err();
        assert!(matches!(err, PredictionError::DecodeFailure(_)));

        let mut truncated = solid_png(10, 10, [1, 2, 3]);
        truncated.truncate(truncated.len() / 2);
        let err = preprocessor.preprocess(&truncated).unwrap_err();
        assert!(matches!(err, PredictionError::DecodeFailure(_)));
    }

    #[test]
    fn test_zero_size_falls_back_to_default() {
        let preprocessor = ImagePreprocessor::new(0, ChannelOrder::Rgb);
        assert_eq!(preprocessor.size(), DEFAULT_IMAGE_SIZE);
        assert_eq!(preprocessor.channel_order(), ChannelOrder::Rgb);
        assert_eq!(preprocessor.output_shape(), [1, 3, 224, 224]);
    }
}
