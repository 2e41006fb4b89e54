//! Compositing an image and an alpha channel into RGBA

use crate::error::{BgRemovalError, Result};
use image::{GrayImage, Rgba, RgbImage, RgbaImage};
use ndarray::{Array2, Array3};

/// Multiply colors by the mask and use the mask as alpha
///
/// # Errors
/// - Image and mask differ in size
pub fn naive_cutout(image: &RgbImage, mask: &GrayImage) -> Result<RgbaImage> {
    if image.dimensions() != mask.dimensions() {
        return Err(BgRemovalError::processing(format!(
            "Mask is {:?} but the image is {:?}",
            mask.dimensions(),
            image.dimensions()
        )));
    }

    let mut cutout = RgbaImage::new(image.width(), image.height());
    for ((out, color), alpha) in cutout.pixels_mut().zip(image.pixels()).zip(mask.pixels()) {
        let m = u16::from(alpha[0]);
        let scale = |c: u8| ((u16::from(c) * m + 127) / 255) as u8;
        *out = Rgba([scale(color[0]), scale(color[1]), scale(color[2]), alpha[0]]);
    }

    Ok(cutout)
}

/// Stack `(h, w, 3)` foreground colors and an `(h, w)` alpha, both in [0,1], into RGBA
///
/// # Errors
/// - Foreground and alpha differ in size
#[allow(clippy::indexing_slicing)]
pub fn stack_foreground_alpha(foreground: &Array3<f64>, alpha: &Array2<f64>) -> Result<RgbaImage> {
    let (height, width, _) = foreground.dim();
    if alpha.dim() != (height, width) {
        return Err(BgRemovalError::processing(format!(
            "Alpha is {:?} but the foreground is {:?}",
            alpha.dim(),
            foreground.dim()
        )));
    }

    let to_byte = |v: f64| (v * 255.0).clamp(0.0, 255.0) as u8;
    Ok(RgbaImage::from_fn(width as u32, height as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        Rgba([
            to_byte(foreground[[y, x, 0]]),
            to_byte(foreground[[y, x, 1]]),
            to_byte(foreground[[y, x, 2]]),
            to_byte(alpha[[y, x]]),
        ])
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    #[test]
    fn test_naive_cutout_alpha_equals_mask() {
        let image = RgbImage::from_pixel(5, 3, Rgb([200, 100, 50]));
        let mask = GrayImage::from_fn(5, 3, |x, y| Luma([(x * 50 + y) as u8]));

        let cutout = naive_cutout(&image, &mask).unwrap();
        for (pixel, m) in cutout.pixels().zip(mask.pixels()) {
            assert_eq!(pixel[3], m[0]);
        }
    }

    #[test]
    fn test_naive_cutout_scales_colors() {
        let image = RgbImage::from_pixel(2, 1, Rgb([255, 200, 0]));
        let mut mask = GrayImage::new(2, 1);
        mask.put_pixel(0, 0, Luma([255]));
        mask.put_pixel(1, 0, Luma([0]));

        let cutout = naive_cutout(&image, &mask).unwrap();
        assert_eq!(cutout.get_pixel(0, 0), &Rgba([255, 200, 0, 255]));
        assert_eq!(cutout.get_pixel(1, 0), &Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn test_naive_cutout_rejects_size_mismatch() {
        let image = RgbImage::new(4, 4);
        let mask = GrayImage::new(4, 3);
        assert!(naive_cutout(&image, &mask).is_err());
    }

    #[test]
    fn test_stack_truncates_and_clips() {
        let foreground = Array3::from_shape_vec((1, 2, 3), vec![1.0, 0.5, 0.0, 1.2, -0.1, 0.999])
            .unwrap();
        let alpha = Array2::from_shape_vec((1, 2), vec![0.5, 1.0]).unwrap();

        let rgba = stack_foreground_alpha(&foreground, &alpha).unwrap();
        assert_eq!(rgba.get_pixel(0, 0), &Rgba([255, 127, 0, 127]));
        assert_eq!(rgba.get_pixel(1, 0), &Rgba([255, 0, 254, 255]));
    }
}
