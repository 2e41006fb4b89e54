//! Trimap construction from a soft segmentation mask

use image::{GrayImage, Luma};

/// Trimap value of pixels whose alpha must be estimated
pub const TRIMAP_UNKNOWN: u8 = 128;
/// Trimap value of certain foreground
pub const TRIMAP_FOREGROUND: u8 = 255;
/// Trimap value of certain background
pub const TRIMAP_BACKGROUND: u8 = 0;

/// Build a trimap from an 8-bit mask
///
/// Pixels strictly above `foreground_threshold` seed the foreground and
/// pixels strictly below `background_threshold` seed the background. Both
/// seeds are eroded with a square of side `erode_structure_size` (a 3×3
/// cross when the size is 0, see [`binary_erosion`]). Outside the
/// image is not foreground but is background, so the foreground seed shrinks
/// away from the image border while the background seed does not.
#[must_use]
pub fn build_trimap(
    mask: &GrayImage,
    foreground_threshold: u8,
    background_threshold: u8,
    erode_structure_size: u32,
) -> GrayImage {
    let (width, height) = mask.dimensions();
    let (w, h) = (width as usize, height as usize);
    let size = erode_structure_size as usize;

    let foreground: Vec<bool> = mask
        .as_raw()
        .iter()
        .map(|&value| value > foreground_threshold)
        .collect();
    let background: Vec<bool> = mask
        .as_raw()
        .iter()
        .map(|&value| value < background_threshold)
        .collect();

    let foreground = binary_erosion(&foreground, w, h, size, false);
    let background = binary_erosion(&background, w, h, size, true);

    let mut trimap = GrayImage::from_pixel(width, height, Luma([TRIMAP_UNKNOWN]));
    for ((pixel, &is_fg), &is_bg) in trimap
        .pixels_mut()
        .zip(foreground.iter())
        .zip(background.iter())
    {
        if is_fg {
            pixel[0] = TRIMAP_FOREGROUND;
        }
        if is_bg {
            pixel[0] = TRIMAP_BACKGROUND;
        }
    }

    trimap
}

/// Whether a trimap has both certain foreground and certain background
#[must_use]
pub fn has_known_regions(trimap: &GrayImage) -> bool {
    let mut has_fg = false;
    let mut has_bg = false;
    for pixel in trimap.pixels() {
        match pixel[0] {
            TRIMAP_FOREGROUND => has_fg = true,
            TRIMAP_BACKGROUND => has_bg = true,
            _ => {},
        }
        if has_fg && has_bg {
            return true;
        }
    }
    false
}

/// Erode a row-major boolean image with a `size`×`size` square
///
/// The window spans offsets `-(size / 2)..=(size - 1 - size / 2)` around each
/// pixel. Positions outside the image take `border_value`. A size of 0 has
/// no square to erode with and falls back to the 3×3 cross (the pixel and
/// its four direct neighbours), the default structuring element of scipy's
/// `binary_erosion`.
#[must_use]
pub fn binary_erosion(
    input: &[bool],
    width: usize,
    height: usize,
    size: usize,
    border_value: bool,
) -> Vec<bool> {
    if width == 0 || height == 0 {
        return input.to_vec();
    }
    if size == 0 {
        return erode_cross(input, width, height, border_value);
    }

    let before = size / 2;
    let after = size - 1 - before;

    // A square is separable: erode along rows, then along columns
    let rows = erode_lines(input, height, width, 1, width, before, after, border_value);
    erode_lines(&rows, width, height, width, 1, before, after, border_value)
}

#[allow(clippy::indexing_slicing)]
fn erode_cross(input: &[bool], width: usize, height: usize, border_value: bool) -> Vec<bool> {
    let at = |x: usize, y: usize| input.get(y * width + x).copied().unwrap_or(false);

    let mut output = vec![false; input.len()];
    for y in 0..height {
        for x in 0..width {
            let left = if x > 0 { at(x - 1, y) } else { border_value };
            let right = if x + 1 < width { at(x + 1, y) } else { border_value };
            let up = if y > 0 { at(x, y - 1) } else { border_value };
            let down = if y + 1 < height { at(x, y + 1) } else { border_value };
            output[y * width + x] = at(x, y) && left && right && up && down;
        }
    }
    output
}

/// Erode `count` lines of `len` samples; sample `k` of line `l` sits at `l * line_step + k * step`
#[allow(clippy::too_many_arguments, clippy::indexing_slicing)]
fn erode_lines(
    input: &[bool],
    count: usize,
    len: usize,
    step: usize,
    line_step: usize,
    before: usize,
    after: usize,
    border_value: bool,
) -> Vec<bool> {
    let mut output = vec![false; input.len()];
    let mut false_prefix = vec![0usize; len + 1];

    for line in 0..count {
        let base = line * line_step;
        for k in 0..len {
            let is_false = !input.get(base + k * step).copied().unwrap_or(false);
            false_prefix[k + 1] = false_prefix[k] + usize::from(is_false);
        }

        for k in 0..len {
            let overflows = k < before || k + after >= len;
            if overflows && !border_value {
                continue;
            }

            let lo = k.saturating_sub(before);
            let hi = (k + after).min(len - 1);
            if false_prefix[hi + 1] == false_prefix[lo] {
                if let Some(slot) = output.get_mut(base + k * step) {
                    *slot = true;
                }
            }
        }
    }

    output
}
