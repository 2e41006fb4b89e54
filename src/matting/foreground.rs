//! Foreground color estimation with Blur-Fusion
//!
//! A coarse pass with a large box estimates smooth foreground and background
//! layers, then a fine pass refines the foreground against them.

use crate::error::{BgRemovalError, Result};
use ndarray::{Array2, Array3, Axis};

const COARSE_RADIUS: usize = 90;
const FINE_RADIUS: usize = 6;
const DIVISION_GUARD: f64 = 1e-5;

/// Estimate foreground colors for an `(h, w, 3)` image and `(h, w)` alpha in [0,1]
///
/// # Errors
/// - Image and alpha differ in size
pub fn estimate_foreground(image: &Array3<f64>, alpha: &Array2<f64>) -> Result<Array3<f64>> {
    let (height, width, channels) = image.dim();
    if channels != 3 || alpha.dim() != (height, width) {
        return Err(BgRemovalError::processing(format!(
            "Foreground estimation inputs disagree in size: image {:?}, alpha {:?}",
            image.dim(),
            alpha.dim()
        )));
    }

    let (foreground, background) = blur_fusion_pass(image, image, image, alpha, COARSE_RADIUS);
    let (foreground, _) = blur_fusion_pass(image, &foreground, &background, alpha, FINE_RADIUS);
    Ok(foreground)
}

/// One refinement step; returns the new foreground and the blurred background
#[allow(clippy::indexing_slicing)]
fn blur_fusion_pass(
    image: &Array3<f64>,
    foreground: &Array3<f64>,
    background: &Array3<f64>,
    alpha: &Array2<f64>,
    radius: usize,
) -> (Array3<f64>, Array3<f64>) {
    let blurred_alpha = box_blur(alpha, radius);
    let inverse_alpha = alpha.mapv(|a| 1.0 - a);

    let mut next_foreground = Array3::zeros(image.dim());
    let mut blurred_background = Array3::zeros(image.dim());

    for channel in 0..3 {
        let image_c = image.index_axis(Axis(2), channel);
        let fg_c = foreground.index_axis(Axis(2), channel);
        let bg_c = background.index_axis(Axis(2), channel);

        let fg_blur = box_blur(&(&fg_c * alpha), radius);
        let bg_blur = box_blur(&(&bg_c * &inverse_alpha), radius);

        let mut out_fg = next_foreground.index_axis_mut(Axis(2), channel);
        let mut out_bg = blurred_background.index_axis_mut(Axis(2), channel);

        ndarray::Zip::indexed(&mut out_fg)
            .and(&mut out_bg)
            .for_each(|(y, x), fg_out, bg_out| {
                let (a, ba) = (alpha[[y, x]], blurred_alpha[[y, x]]);
                let f = fg_blur[[y, x]] / (ba + DIVISION_GUARD);
                let b = bg_blur[[y, x]] / ((1.0 - ba) + DIVISION_GUARD);
                let residual = image_c[[y, x]] - a * f - (1.0 - a) * b;
                *fg_out = (f + a * residual).clamp(0.0, 1.0);
                *bg_out = b;
            });
    }

    (next_foreground, blurred_background)
}

/// Mean over a `size`×`size` box, offsets `-(size / 2)..=(size - 1 - size / 2)`
///
/// Only pixels inside the image contribute, so the mean never darkens toward
/// the border. Computed from an integral image.
#[must_use]
#[allow(clippy::indexing_slicing)]
pub fn box_blur(values: &Array2<f64>, size: usize) -> Array2<f64> {
    let (height, width) = values.dim();
    if size <= 1 || height == 0 || width == 0 {
        return values.clone();
    }

    let mut integral = Array2::<f64>::zeros((height + 1, width + 1));
    for y in 0..height {
        let mut row_sum = 0.0;
        for x in 0..width {
            row_sum += values[[y, x]];
            integral[[y + 1, x + 1]] = integral[[y, x + 1]] + row_sum;
        }
    }

    let before = size / 2;
    let after = size - 1 - before;

    Array2::from_shape_fn((height, width), |(y, x)| {
        let top = y.saturating_sub(before);
        let bottom = (y + after + 1).min(height);
        let left = x.saturating_sub(before);
        let right = (x + after + 1).min(width);

        let sum = integral[[bottom, right]] - integral[[top, right]] - integral[[bottom, left]]
            + integral[[top, left]];
        sum / ((bottom - top) * (right - left)) as f64
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_blur_preserves_constants() {
        let values = Array2::from_elem((7, 11), 0.25);
        for size in [2, 3, 6, 90] {
            let blurred = box_blur(&values, size);
            assert!(blurred.iter().all(|v| (v - 0.25).abs() < 1e-12));
        }
    }

    #[test]
    fn test_box_blur_averages_window() {
        let values = Array2::from_shape_fn((1, 5), |(_, x)| x as f64);
        let blurred = box_blur(&values, 3);
        // Interior: mean of x-1..=x+1; edges only count in-image pixels
        assert!((blurred[[0, 2]] - 2.0).abs() < 1e-12);
        assert!((blurred[[0, 0]] - 0.5).abs() < 1e-12);
        assert!((blurred[[0, 4]] - 3.5).abs() < 1e-12);
    }

    #[test]
    fn test_box_blur_even_window_leans_back() {
        // size 2 covers offsets -1..=0
        let values = Array2::from_shape_fn((1, 4), |(_, x)| x as f64);
        let blurred = box_blur(&values, 2);
        assert!((blurred[[0, 0]] - 0.0).abs() < 1e-12);
        assert!((blurred[[0, 3]] - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_opaque_foreground_keeps_image_colors() {
        let image = Array3::from_shape_fn((12, 12, 3), |(y, x, c)| {
            ((y * 12 + x) as f64 / 144.0 + c as f64 * 0.1).min(1.0)
        });
        let alpha = Array2::ones((12, 12));

        let foreground = estimate_foreground(&image, &alpha).unwrap();
        for (estimated, original) in foreground.iter().zip(image.iter()) {
            assert!((estimated - original).abs() < 1e-3);
        }
    }

    #[test]
    fn test_foreground_stays_in_unit_range() {
        let image = Array3::from_shape_fn((16, 16, 3), |(y, x, c)| {
            if x < 8 {
                [0.9, 0.1, 0.1][c]
            } else {
                [0.1, 0.1, 0.9][c] * (y as f64 / 16.0)
            }
        });
        let alpha = Array2::from_shape_fn((16, 16), |(_, x)| (1.0 - x as f64 / 15.0).max(0.0));

        let foreground = estimate_foreground(&image, &alpha).unwrap();
        assert_eq!(foreground.dim(), (16, 16, 3));
        assert!(foreground.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_semi_transparent_edge_loses_background_tint() {
        let red = [0.9, 0.1, 0.1];
        let blue = [0.1, 0.1, 0.9];
        let alpha = Array2::from_shape_fn((8, 40), |(_, x)| match x {
            0..=15 => 1.0,
            16..=23 => 1.0 - (x - 15) as f64 / 9.0,
            _ => 0.0,
        });
        let image = Array3::from_shape_fn((8, 40, 3), |(y, x, c)| {
            let a = alpha[[y, x]];
            a * red[c] + (1.0 - a) * blue[c]
        });

        let foreground = estimate_foreground(&image, &alpha).unwrap();

        // Composited red at alpha 0.44 is 0.46; the estimate pulls it back toward 0.9
        let (y, x) = (4, 20);
        assert!(foreground[[y, x, 0]] > image[[y, x, 0]] + 0.2);
        assert!(foreground[[y, x, 2]] < image[[y, x, 2]] - 0.2);
    }

    #[test]
    fn test_mismatched_alpha_is_rejected() {
        let image = Array3::zeros((4, 4, 3));
        let alpha = Array2::zeros((4, 5));
        assert!(estimate_foreground(&image, &alpha).is_err());
    }
}
