//! Segmentation model input and output conversion
//!
//! U²-Net takes the whole image squashed to a square (aspect ratio is not
//! preserved) and returns a saliency map at the same square resolution.

use crate::{
    error::{BgRemovalError, Result},
    models::PreprocessingConfig,
};
use image::imageops::FilterType;
use image::{GrayImage, RgbImage};
use ndarray::Array4;

/// Conversion between images and model tensors
#[derive(Debug)]
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Build the NCHW input tensor for an RGB image
    ///
    /// The image is resized to the target size, scaled to [0,1], divided by
    /// its brightest channel value, then normalized per channel.
    ///
    /// # Errors
    /// - Empty image or zero target size
    pub fn preprocess_for_inference(
        image: &RgbImage,
        config: &PreprocessingConfig,
    ) -> Result<Array4<f32>> {
        let [target_height, target_width] = config.target_size;
        if image.width() == 0 || image.height() == 0 {
            return Err(BgRemovalError::processing("Cannot preprocess an empty image"));
        }
        if target_height == 0 || target_width == 0 {
            return Err(BgRemovalError::invalid_config("Model target size must be non-zero"));
        }

        let resized =
            image::imageops::resize(image, target_width, target_height, FilterType::Triangle);

        let max_value = resized.as_raw().iter().copied().max().unwrap_or(0);
        let scale = if max_value == 0 {
            1.0 / 255.0
        } else {
            1.0 / f32::from(max_value)
        };

        let mut tensor =
            Array4::<f32>::zeros((1, 3, target_height as usize, target_width as usize));

        #[allow(clippy::indexing_slicing)]
        // Tensor dimensions match the resized image
        for (x, y, pixel) in resized.enumerate_pixels() {
            for channel in 0..3 {
                let value = f32::from(pixel[channel]) * scale;
                tensor[[0, channel, y as usize, x as usize]] = (value
                    - config.normalization_mean[channel])
                    / config.normalization_std[channel];
            }
        }

        Ok(tensor)
    }

    /// Turn the first channel of a model output into an 8-bit mask at `width`×`height`
    ///
    /// Values are min-max normalized; a constant output becomes all zeros.
    ///
    /// # Errors
    /// - Output tensor has no batch or channel entries
    pub fn mask_from_output(output: &Array4<f32>, width: u32, height: u32) -> Result<GrayImage> {
        let (batch, channels, out_height, out_width) = output.dim();
        if batch == 0 || channels == 0 || out_height == 0 || out_width == 0 {
            return Err(BgRemovalError::processing(format!(
                "Model output has unusable shape {:?}",
                output.dim()
            )));
        }

        let plane = output.slice(ndarray::s![0, 0, .., ..]);
        let (min, max) = plane
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let range = max - min;

        let mut mask = GrayImage::new(out_width as u32, out_height as u32);
        for ((y, x), &value) in plane.indexed_iter() {
            let normalized = if range > 0.0 {
                (value - min) / range
            } else {
                0.0
            };
            mask.put_pixel(
                x as u32,
                y as u32,
                image::Luma([(normalized * 255.0).clamp(0.0, 255.0) as u8]),
            );
        }

        if mask.dimensions() == (width, height) {
            return Ok(mask);
        }
        Ok(image::imageops::resize(
            &mask,
            width,
            height,
            FilterType::Lanczos3,
        ))
    }
}
