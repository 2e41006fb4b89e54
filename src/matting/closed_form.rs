//! Closed-form alpha matting
//!
//! Minimizes `αᵀ L α` over the unknown trimap pixels, where `L` is the matting
//! Laplacian built from 3×3 windows. The Laplacian is never assembled: each
//! window stores its color mean and regularized inverse covariance, and
//! products `L v` are accumulated window by window. The linear system
//! `L_UU α_U = -L_UK α_K` is solved with Jacobi-preconditioned conjugate
//! gradients.

use crate::error::{BgRemovalError, Result};
use ndarray::{Array2, Array3};
use tracing::{debug, warn};

/// Regularization of the window covariance
pub const EPSILON: f64 = 1e-7;
/// Relative residual at which the solver stops
pub const CG_TOLERANCE: f64 = 1e-7;
/// Iteration cap on the coarsest pyramid level
pub const CG_MAX_ITERATIONS: usize = 2_000;
/// Iteration cap on every finer pyramid level
pub const REFINE_MAX_ITERATIONS: usize = 300;
/// Longest side solved without coarsening first
pub const COARSEST_SIDE: usize = 128;
/// Relative residual above which a capped full-resolution solve is reported
const CG_WARN_RESIDUAL: f64 = 1e-3;

const WINDOW_PIXELS: f64 = 9.0;
const KNOWN_FOREGROUND: f64 = 0.9;
const KNOWN_BACKGROUND: f64 = 0.1;

type Color = [f64; 3];

#[derive(Debug, Clone)]
struct Window {
    /// Flat indices of the nine pixels, row-major
    pixels: [usize; 9],
    mean: Color,
    inverse: [[f64; 3]; 3],
}

/// Matting Laplacian in matrix-free form
#[derive(Debug)]
pub struct MattingLaplacian {
    colors: Vec<Color>,
    windows: Vec<Window>,
}

impl MattingLaplacian {
    /// Precompute window statistics for an `(h, w, 3)` image in [0,1]
    ///
    /// Windows whose nine pixels are all known are skipped.
    #[must_use]
    pub fn new(image: &Array3<f64>, is_known: &[bool]) -> Self {
        let (height, width, _) = image.dim();
        let colors: Vec<Color> = (0..height * width)
            .map(|i| {
                let (y, x) = (i / width, i % width);
                [image[[y, x, 0]], image[[y, x, 1]], image[[y, x, 2]]]
            })
            .collect();

        let mut windows = Vec::new();
        if height >= 3 && width >= 3 {
            for cy in 1..height - 1 {
                for cx in 1..width - 1 {
                    let mut pixels = [0usize; 9];
                    for (k, slot) in pixels.iter_mut().enumerate() {
                        *slot = (cy + k / 3 - 1) * width + (cx + k % 3 - 1);
                    }

                    if pixels
                        .iter()
                        .all(|&i| is_known.get(i).copied().unwrap_or(true))
                    {
                        continue;
                    }

                    windows.push(Self::window(&colors, pixels));
                }
            }
        }

        Self { colors, windows }
    }

    #[allow(clippy::indexing_slicing)]
    fn window(colors: &[Color], pixels: [usize; 9]) -> Window {
        let mut mean = [0.0; 3];
        let mut second = [[0.0; 3]; 3];
        for &i in &pixels {
            let c = colors[i];
            for a in 0..3 {
                mean[a] += c[a];
                for b in 0..3 {
                    second[a][b] += c[a] * c[b];
                }
            }
        }

        for m in &mut mean {
            *m /= WINDOW_PIXELS;
        }

        let mut covariance = [[0.0; 3]; 3];
        for a in 0..3 {
            for b in 0..3 {
                covariance[a][b] = second[a][b] / WINDOW_PIXELS - mean[a] * mean[b];
            }
            covariance[a][a] += EPSILON / WINDOW_PIXELS;
        }

        Window {
            pixels,
            mean,
            inverse: invert_3x3(&covariance),
        }
    }

    /// Number of windows touching at least one unknown pixel
    #[must_use]
    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    /// Compute `out = L v`
    #[allow(clippy::indexing_slicing)]
    pub fn apply(&self, v: &[f64], out: &mut [f64]) {
        out.iter_mut().for_each(|o| *o = 0.0);

        for window in &self.windows {
            let mut sum = 0.0;
            let mut weighted = [0.0; 3];
            let mut deviations = [[0.0; 3]; 9];

            for (k, &i) in window.pixels.iter().enumerate() {
                let d = sub(&self.colors[i], &window.mean);
                deviations[k] = d;
                sum += v[i];
                for c in 0..3 {
                    weighted[c] += d[c] * v[i];
                }
            }

            let u = mat_vec(&window.inverse, &weighted);
            for (k, &i) in window.pixels.iter().enumerate() {
                out[i] += v[i] - (sum + dot(&deviations[k], &u)) / WINDOW_PIXELS;
            }
        }
    }

    /// Diagonal of `L`
    #[must_use]
    #[allow(clippy::indexing_slicing)]
    pub fn diagonal(&self) -> Vec<f64> {
        let mut diagonal = vec![0.0; self.colors.len()];
        for window in &self.windows {
            for &i in &window.pixels {
                let d = sub(&self.colors[i], &window.mean);
                let quadratic = dot(&d, &mat_vec(&window.inverse, &d));
                diagonal[i] += 1.0 - (1.0 + quadratic) / WINDOW_PIXELS;
            }
        }
        diagonal
    }
}

/// Estimate alpha for an `(h, w, 3)` image and an `(h, w)` trimap, both in [0,1]
///
/// Trimap values above 0.9 are foreground, below 0.1 background, everything
/// else unknown. `initial` seeds the solver for unknown pixels.
///
/// # Errors
/// - Image, trimap and initial guess differ in size
pub fn estimate_alpha_cf(
    image: &Array3<f64>,
    trimap: &Array2<f64>,
    initial: &Array2<f64>,
) -> Result<Array2<f64>> {
    let (height, width, channels) = image.dim();
    if channels != 3 || trimap.dim() != (height, width) || initial.dim() != (height, width) {
        return Err(BgRemovalError::processing(format!(
            "Matting inputs disagree in size: image {:?}, trimap {:?}, initial {:?}",
            image.dim(),
            trimap.dim(),
            initial.dim()
        )));
    }

    solve_pyramid(image, trimap, initial, 0)
}

/// Solve `level`, seeded by the upsampled solution of the level below it
///
/// Images larger than [`COARSEST_SIDE`] are halved until they fit. The
/// coarsest level runs up to [`CG_MAX_ITERATIONS`]; every finer level only
/// refines its seed for up to [`REFINE_MAX_ITERATIONS`].
fn solve_pyramid(
    image: &Array3<f64>,
    trimap: &Array2<f64>,
    initial: &Array2<f64>,
    level: usize,
) -> Result<Array2<f64>> {
    let (height, width) = trimap.dim();
    let coarsen = height.max(width) > COARSEST_SIDE && height.min(width) >= 6;

    if !coarsen {
        return solve_level(image, trimap, initial, level, CG_MAX_ITERATIONS);
    }

    let coarse = solve_pyramid(
        &downsample_image(image),
        &downsample(trimap),
        &downsample(initial),
        level + 1,
    )?;
    let seed = upsample(&coarse, height, width);
    solve_level(image, trimap, &seed, level, REFINE_MAX_ITERATIONS)
}

fn solve_level(
    image: &Array3<f64>,
    trimap: &Array2<f64>,
    initial: &Array2<f64>,
    level: usize,
    max_iterations: usize,
) -> Result<Array2<f64>> {
    let (height, width) = trimap.dim();
    let trimap_values: Vec<f64> = trimap.iter().copied().collect();
    let is_foreground: Vec<bool> = trimap_values.iter().map(|&t| t > KNOWN_FOREGROUND).collect();
    let is_known: Vec<bool> = trimap_values
        .iter()
        .map(|&t| t > KNOWN_FOREGROUND || t < KNOWN_BACKGROUND)
        .collect();

    let known_alpha: Vec<f64> = is_foreground
        .iter()
        .map(|&fg| if fg { 1.0 } else { 0.0 })
        .collect();

    if is_known.iter().all(|&known| known) {
        return to_image(known_alpha, height, width);
    }

    let laplacian = MattingLaplacian::new(image, &is_known);
    let initial_values: Vec<f64> = initial.iter().copied().collect();
    let unknown_alpha = if laplacian.window_count() == 0 {
        initial_values
    } else {
        let solution = solve_unknown(
            &laplacian,
            &is_known,
            &known_alpha,
            &initial_values,
            max_iterations,
        );

        if level == 0 && solution.iterations >= max_iterations && solution.residual > CG_WARN_RESIDUAL
        {
            warn!(
                iterations = solution.iterations,
                residual = solution.residual,
                size = ?(width, height),
                "closed-form alpha stopped at the iteration cap"
            );
        } else {
            debug!(
                level,
                iterations = solution.iterations,
                residual = solution.residual,
                windows = laplacian.window_count(),
                size = ?(width, height),
                "closed-form alpha solved"
            );
        }
        solution.values
    };

    let alpha: Vec<f64> = unknown_alpha
        .iter()
        .zip(known_alpha.iter())
        .zip(is_known.iter())
        .map(|((&estimated, &known), &is_known)| {
            if is_known {
                known
            } else {
                estimated.clamp(0.0, 1.0)
            }
        })
        .collect();

    to_image(alpha, height, width)
}

/// Outcome of one conjugate gradient run
#[derive(Debug)]
struct Solution {
    values: Vec<f64>,
    iterations: usize,
    /// `|r| / |b|` when the loop stopped
    residual: f64,
}

/// Preconditioned conjugate gradients on the unknown block
///
/// Vectors span the whole image; entries of known pixels are held at zero.
#[allow(clippy::indexing_slicing)]
fn solve_unknown(
    laplacian: &MattingLaplacian,
    is_known: &[bool],
    known_alpha: &[f64],
    initial: &[f64],
    max_iterations: usize,
) -> Solution {
    let n = is_known.len();
    let mut scratch = vec![0.0; n];

    // b = -L_UK α_K
    let mut b = vec![0.0; n];
    laplacian.apply(known_alpha, &mut b);
    b.iter_mut().for_each(|value| *value = -*value);
    restrict(&mut b, is_known);

    let norm_b = norm(&b);
    if norm_b == 0.0 {
        return Solution {
            values: vec![0.0; n],
            iterations: 0,
            residual: 0.0,
        };
    }

    let preconditioner: Vec<f64> = laplacian
        .diagonal()
        .iter()
        .zip(is_known)
        .map(|(&d, &known)| {
            if known {
                0.0
            } else if d > f64::EPSILON {
                1.0 / d
            } else {
                1.0
            }
        })
        .collect();

    let mut x = initial.to_vec();
    restrict(&mut x, is_known);

    let mut ax = vec![0.0; n];
    apply_unknown(laplacian, is_known, &x, &mut scratch, &mut ax);
    let mut r: Vec<f64> = b.iter().zip(&ax).map(|(bi, ai)| bi - ai).collect();
    let mut z: Vec<f64> = r.iter().zip(&preconditioner).map(|(ri, mi)| ri * mi).collect();
    let mut p = z.clone();
    let mut rz = dot_slices(&r, &z);
    let mut ap = vec![0.0; n];

    let threshold = CG_TOLERANCE * norm_b;
    let mut iterations = 0;
    while iterations < max_iterations && norm(&r) > threshold {
        apply_unknown(laplacian, is_known, &p, &mut scratch, &mut ap);
        let curvature = dot_slices(&p, &ap);
        if curvature <= 0.0 {
            break;
        }

        let step = rz / curvature;
        for i in 0..n {
            x[i] += step * p[i];
            r[i] -= step * ap[i];
            z[i] = r[i] * preconditioner[i];
        }

        let rz_next = dot_slices(&r, &z);
        let beta = rz_next / rz;
        for i in 0..n {
            p[i] = z[i] + beta * p[i];
        }
        rz = rz_next;
        iterations += 1;
    }

    Solution {
        values: x,
        iterations,
        residual: norm(&r) / norm_b,
    }
}

/// Halve an `(h, w)` map by averaging 2×2 blocks; odd edges average fewer samples
fn downsample(values: &Array2<f64>) -> Array2<f64> {
    let (height, width) = values.dim();
    Array2::from_shape_fn((height.div_ceil(2), width.div_ceil(2)), |(y, x)| {
        let mut sum = 0.0;
        let mut count = 0.0;
        for (dy, dx) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
            if let Some(&value) = values.get((2 * y + dy, 2 * x + dx)) {
                sum += value;
                count += 1.0;
            }
        }
        sum / count
    })
}

fn downsample_image(image: &Array3<f64>) -> Array3<f64> {
    let (height, width, channels) = image.dim();
    Array3::from_shape_fn(
        (height.div_ceil(2), width.div_ceil(2), channels),
        |(y, x, c)| {
            let mut sum = 0.0;
            let mut count = 0.0;
            for (dy, dx) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
                if let Some(&value) = image.get((2 * y + dy, 2 * x + dx, c)) {
                    sum += value;
                    count += 1.0;
                }
            }
            sum / count
        },
    )
}

/// Nearest-neighbour upsampling of a coarse level to `(height, width)`
fn upsample(coarse: &Array2<f64>, height: usize, width: usize) -> Array2<f64> {
    Array2::from_shape_fn((height, width), |(y, x)| {
        coarse.get((y / 2, x / 2)).copied().unwrap_or(0.0)
    })
}

/// `out = L_UU v` with known entries zeroed on both sides
fn apply_unknown(
    laplacian: &MattingLaplacian,
    is_known: &[bool],
    v: &[f64],
    scratch: &mut [f64],
    out: &mut [f64],
) {
    scratch.copy_from_slice(v);
    restrict(scratch, is_known);
    laplacian.apply(scratch, out);
    restrict(out, is_known);
}

fn restrict(v: &mut [f64], is_known: &[bool]) {
    for (value, &known) in v.iter_mut().zip(is_known) {
        if known {
            *value = 0.0;
        }
    }
}

fn to_image(values: Vec<f64>, height: usize, width: usize) -> Result<Array2<f64>> {
    Array2::from_shape_vec((height, width), values)
        .map_err(|e| BgRemovalError::internal(format!("Alpha has wrong length: {e}")))
}

fn sub(a: &Color, b: &Color) -> Color {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn dot(a: &Color, b: &Color) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn mat_vec(m: &[[f64; 3]; 3], v: &Color) -> Color {
    [dot(&m[0], v), dot(&m[1], v), dot(&m[2], v)]
}

fn dot_slices(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(v: &[f64]) -> f64 {
    dot_slices(v, v).sqrt()
}

/// Inverse of a symmetric positive definite 3×3 matrix via the adjugate
fn invert_3x3(m: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let [[a, b, c], [d, e, f], [g, h, i]] = *m;

    let co00 = e * i - f * h;
    let co01 = f * g - d * i;
    let co02 = d * h - e * g;
    let determinant = a * co00 + b * co01 + c * co02;
    let inv_det = 1.0 / determinant;

    [
        [co00 * inv_det, (c * h - b * i) * inv_det, (b * f - c * e) * inv_det],
        [co01 * inv_det, (a * i - c * g) * inv_det, (c * d - a * f) * inv_det],
        [co02 * inv_det, (b * g - a * h) * inv_det, (a * e - b * d) * inv_det],
    ]
}
