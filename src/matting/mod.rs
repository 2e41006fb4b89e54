//! Alpha matting of a segmentation mask
//!
//! The mask from the segmentation model is turned into a trimap, the unknown
//! band is resolved with closed-form matting, and foreground colors are
//! recovered so semi-transparent edges do not carry the old background.
//!
//! ```rust
//! use image::{GrayImage, Luma, Rgb, RgbImage};
//! use remove_bg::matting::{alpha_matting_cutout, MattingParams};
//!
//! let image = RgbImage::from_pixel(8, 8, Rgb([10, 20, 30]));
//! let mask = GrayImage::from_pixel(8, 8, Luma([255]));
//! let params = MattingParams::default();
//!
//! // A mask without background cannot be matted; the naive cutout is used
//! let cutout = alpha_matting_cutout(&image, &mask, &params).unwrap();
//! assert_eq!(cutout.dimensions(), (8, 8));
//! ```

pub mod closed_form;
pub mod cutout;
pub mod foreground;
pub mod trimap;

pub use closed_form::{estimate_alpha_cf, MattingLaplacian};
pub use cutout::{naive_cutout, stack_foreground_alpha};
pub use foreground::{box_blur, estimate_foreground};
pub use trimap::{binary_erosion, build_trimap, has_known_regions};

use crate::{config::RemovalParameters, error::Result};
use image::imageops::FilterType;
use image::{GrayImage, RgbImage, RgbaImage};
use ndarray::{Array2, Array3};
use tracing::{debug, instrument, warn};

/// Knobs of the matting step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MattingParams {
    pub foreground_threshold: u8,
    pub background_threshold: u8,
    pub erode_structure_size: u32,
    pub base_size: u32,
}

impl From<&RemovalParameters> for MattingParams {
    fn from(params: &RemovalParameters) -> Self {
        Self {
            foreground_threshold: params.foreground_threshold,
            background_threshold: params.background_threshold,
            erode_structure_size: params.erode_structure_size,
            base_size: params.base_size,
        }
    }
}

impl Default for MattingParams {
    fn default() -> Self {
        Self::from(&RemovalParameters::FIXED)
    }
}

/// Size that fits `width`×`height` inside `base_size`×`base_size` without enlarging
#[must_use]
pub fn thumbnail_size(width: u32, height: u32, base_size: u32) -> (u32, u32) {
    if width <= base_size && height <= base_size {
        return (width, height);
    }

    let scale = (f64::from(base_size) / f64::from(width)).min(f64::from(base_size) / f64::from(height));
    let fit = |side: u32| ((f64::from(side) * scale).round() as u32).max(1);
    (fit(width), fit(height))
}

/// Cut the foreground out of `image` using `mask` with alpha matting
///
/// Matting runs at thumbnail resolution and the result is scaled back to the
/// size of `image`. When the eroded trimap has no certain foreground or no
/// certain background, the naive cutout is returned instead.
///
/// # Errors
/// - Image and mask differ in size
/// - Matting inputs cannot be assembled
#[instrument(skip_all, fields(width = image.width(), height = image.height()))]
pub fn alpha_matting_cutout(
    image: &RgbImage,
    mask: &GrayImage,
    params: &MattingParams,
) -> Result<RgbaImage> {
    let (width, height) = image.dimensions();
    if mask.dimensions() != (width, height) {
        return naive_cutout(image, mask);
    }

    let (thumb_width, thumb_height) = thumbnail_size(width, height, params.base_size);
    let (small_image, small_mask) = if (thumb_width, thumb_height) == (width, height) {
        (image.clone(), mask.clone())
    } else {
        (
            image::imageops::resize(image, thumb_width, thumb_height, FilterType::Lanczos3),
            image::imageops::resize(mask, thumb_width, thumb_height, FilterType::Lanczos3),
        )
    };

    let trimap = build_trimap(
        &small_mask,
        params.foreground_threshold,
        params.background_threshold,
        params.erode_structure_size,
    );

    if !has_known_regions(&trimap) {
        warn!("Trimap has no certain foreground or background; using the mask as alpha");
        return naive_cutout(image, mask);
    }

    debug!(thumb_width, thumb_height, "Running closed-form matting");

    let image_values = image_to_array(&small_image)?;
    let trimap_values = gray_to_array(&trimap)?;
    let initial = gray_to_array(&small_mask)?;

    let alpha = estimate_alpha_cf(&image_values, &trimap_values, &initial)?;
    let foreground = estimate_foreground(&image_values, &alpha)?;
    let cutout = stack_foreground_alpha(&foreground, &alpha)?;

    if cutout.dimensions() == (width, height) {
        Ok(cutout)
    } else {
        Ok(image::imageops::resize(&cutout, width, height, FilterType::Lanczos3))
    }
}

fn image_to_array(image: &RgbImage) -> Result<Array3<f64>> {
    let (width, height) = image.dimensions();
    let values = image.as_raw().iter().map(|&v| f64::from(v) / 255.0).collect();
    Array3::from_shape_vec((height as usize, width as usize, 3), values).map_err(|e| {
        crate::error::BgRemovalError::internal(format!("Image buffer has wrong length: {e}"))
    })
}

fn gray_to_array(image: &GrayImage) -> Result<Array2<f64>> {
    let (width, height) = image.dimensions();
    let values = image.as_raw().iter().map(|&v| f64::from(v) / 255.0).collect();
    Array2::from_shape_vec((height as usize, width as usize), values).map_err(|e| {
        crate::error::BgRemovalError::internal(format!("Mask buffer has wrong length: {e}"))
    })
}
