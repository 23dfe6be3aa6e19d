//! Denoising operators
//!
//! Four approaches address the `noise` class:
//!
//! - **Adaptive mean / median / Gaussian** - classic linear/rank filters
//!   whose kernel size (or blur sigma) is stepped from an estimated noise
//!   level.
//! - **Wavelet shrinkage** - per-channel multi-level wavelet decomposition
//!   with soft or hard thresholding of the detail coefficients.
//! - **Non-local means** - patch-similarity weighted averaging over a
//!   search window.
//!
//! Noise level can be estimated from the standard deviation of a
//! blur residual, from the Immerkær fast-noise-variance operator, or (for
//! the wavelet operator) from the median absolute deviation of the finest
//! diagonal detail coefficients.

use image::{Rgb, RgbImage};
use imageproc::filter::{gaussian_blur_f32, median_filter};

use super::colorspace::{luminance_plane, LuminanceSpace};
use super::types::{CorrectionOperator, OperatorError, ParamSet, Result};

// ============================================================
// Constants
// ============================================================

/// Noise level below which the smallest kernel is used
const NOISE_LEVEL_LOW: f64 = 10.0;

/// Noise level below which the middle kernel is used
const NOISE_LEVEL_MID: f64 = 30.0;

/// Kernel sizes stepped from the noise level (low, mid, high)
const KERNEL_STEPS: [u32; 3] = [3, 5, 7];

/// Gaussian sigmas stepped from the noise level (low, mid, high)
const SIGMA_STEPS: [f32; 3] = [1.0, 3.0, 5.0];

/// MAD-to-sigma factor for Gaussian noise
const MAD_SIGMA_FACTOR: f64 = 0.6745;

// ============================================================
// Noise Estimation
// ============================================================

/// Standard deviation of the residual between the luma plane and a
/// Gaussian-blurred copy of it
pub fn estimate_noise_blur_residual(image: &RgbImage, sigma: f32) -> f64 {
    let plane = luminance_plane(image, LuminanceSpace::Gray);
    let blurred = gaussian_blur_f32(&plane, sigma);

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let count = (plane.width() * plane.height()) as f64;
    if count == 0.0 {
        return 0.0;
    }

    for (a, b) in plane.pixels().zip(blurred.pixels()) {
        let diff = a.0[0] as f64 - b.0[0] as f64;
        sum += diff;
        sum_sq += diff * diff;
    }
    let mean = sum / count;
    ((sum_sq / count) - mean * mean).abs().sqrt()
}

/// Immerkær fast noise variance estimation
///
/// Convolves the luma plane with `[1,-2,1; -2,4,-2; 1,-2,1]` and scales the
/// absolute response sum; the kernel annihilates constant and linear image
/// structure so the response is dominated by noise.
pub fn estimate_noise_immerkaer(image: &RgbImage) -> f64 {
    let plane = luminance_plane(image, LuminanceSpace::Gray);
    let (width, height) = plane.dimensions();
    if width < 3 || height < 3 {
        return 0.0;
    }

    let px = |x: u32, y: u32| plane.get_pixel(x, y).0[0] as f64;
    let mut response_sum = 0.0f64;
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let response = px(x - 1, y - 1) - 2.0 * px(x, y - 1) + px(x + 1, y - 1)
                - 2.0 * px(x - 1, y)
                + 4.0 * px(x, y)
                - 2.0 * px(x + 1, y)
                + px(x - 1, y + 1)
                - 2.0 * px(x, y + 1)
                + px(x + 1, y + 1);
            response_sum += response.abs();
        }
    }

    let count = ((width - 2) * (height - 2)) as f64;
    (std::f64::consts::PI / 2.0).sqrt() * response_sum / (6.0 * count)
}

fn estimate_noise(image: &RgbImage, params: &ParamSet) -> Result<f64> {
    match params.choice("estimator")? {
        "blur_residual" => {
            let sigma = params.float("sigma")? as f32;
            Ok(estimate_noise_blur_residual(image, sigma))
        }
        "immerkaer" => Ok(estimate_noise_immerkaer(image)),
        other => Err(OperatorError::WrongParameterType {
            name: format!("estimator ({})", other),
            expected: "choice",
        }),
    }
}

/// Step a kernel size from the estimated noise level
fn kernel_for_noise(level: f64) -> u32 {
    if level < NOISE_LEVEL_LOW {
        KERNEL_STEPS[0]
    } else if level < NOISE_LEVEL_MID {
        KERNEL_STEPS[1]
    } else {
        KERNEL_STEPS[2]
    }
}

/// Step a blur sigma from the estimated noise level
fn sigma_for_noise(level: f64) -> f32 {
    if level < NOISE_LEVEL_LOW {
        SIGMA_STEPS[0]
    } else if level < NOISE_LEVEL_MID {
        SIGMA_STEPS[1]
    } else {
        SIGMA_STEPS[2]
    }
}

// ============================================================
// Adaptive Linear / Rank Filters
// ============================================================

/// Mean filter with a noise-adaptive kernel size
pub struct AdaptiveMean;

impl CorrectionOperator for AdaptiveMean {
    fn apply(&self, image: &RgbImage, params: &ParamSet) -> Result<RgbImage> {
        let level = estimate_noise(image, params)?;
        let kernel = kernel_for_noise(level);
        tracing::debug!(noise_level = level, kernel, "adaptive mean filter");
        Ok(mean_filter_rgb(image, kernel))
    }
}

/// Median filter with a noise-adaptive kernel size
pub struct AdaptiveMedian;

impl CorrectionOperator for AdaptiveMedian {
    fn apply(&self, image: &RgbImage, params: &ParamSet) -> Result<RgbImage> {
        let level = estimate_noise(image, params)?;
        let radius = kernel_for_noise(level) / 2;
        tracing::debug!(noise_level = level, radius, "adaptive median filter");
        Ok(median_filter(image, radius, radius))
    }
}

/// Gaussian blur with a noise-adaptive sigma
pub struct AdaptiveGaussian;

impl CorrectionOperator for AdaptiveGaussian {
    fn apply(&self, image: &RgbImage, params: &ParamSet) -> Result<RgbImage> {
        let level = estimate_noise(image, params)?;
        let sigma = sigma_for_noise(level);
        tracing::debug!(noise_level = level, sigma, "adaptive gaussian filter");
        Ok(gaussian_blur_f32(image, sigma))
    }
}

/// Separable box mean over all three channels
fn mean_filter_rgb(image: &RgbImage, kernel: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    let w = width as i64;
    let h = height as i64;
    let radius = (kernel / 2) as i64;
    let weight = 1.0 / kernel as f32;

    // Horizontal pass
    let mut temp = vec![[0.0f32; 3]; (width * height) as usize];
    for y in 0..h {
        for x in 0..w {
            let mut sum = [0.0f32; 3];
            for k in -radius..=radius {
                let sx = (x + k).clamp(0, w - 1) as u32;
                let pixel = image.get_pixel(sx, y as u32);
                for c in 0..3 {
                    sum[c] += pixel.0[c] as f32;
                }
            }
            for c in 0..3 {
                temp[(y * w + x) as usize][c] = sum[c] * weight;
            }
        }
    }

    // Vertical pass
    let mut out = RgbImage::new(width, height);
    for y in 0..h {
        for x in 0..w {
            let mut sum = [0.0f32; 3];
            for k in -radius..=radius {
                let sy = (y + k).clamp(0, h - 1);
                for c in 0..3 {
                    sum[c] += temp[(sy * w + x) as usize][c];
                }
            }
            let mut pixel = [0u8; 3];
            for c in 0..3 {
                pixel[c] = (sum[c] * weight).round().clamp(0.0, 255.0) as u8;
            }
            out.put_pixel(x as u32, y as u32, Rgb(pixel));
        }
    }
    out
}

// ============================================================
// Wavelet Shrinkage
// ============================================================

/// Per-channel wavelet-domain shrinkage denoising
pub struct WaveletDenoise;

impl CorrectionOperator for WaveletDenoise {
    fn apply(&self, image: &RgbImage, params: &ParamSet) -> Result<RgbImage> {
        let filters = WaveletFilters::parse(params.choice("wavelet")?)?;
        let soft = match params.choice("mode")? {
            "soft" => true,
            "hard" => false,
            other => {
                return Err(OperatorError::WrongParameterType {
                    name: format!("mode ({})", other),
                    expected: "choice",
                })
            }
        };
        let levels = params.int("levels")? as u32;
        let estimator = params.choice("estimator")?.to_string();

        let (width, height) = image.dimensions();
        if width < 2 || height < 2 {
            return Err(OperatorError::DegenerateImage(
                "image too small for wavelet decomposition".to_string(),
            ));
        }

        // Blur-residual estimation happens on the full image, before the
        // per-channel transforms
        let external_sigma = match estimator.as_str() {
            "blur_residual" => {
                let sigma = params.float("sigma")? as f32;
                Some(estimate_noise_blur_residual(image, sigma))
            }
            "immerkaer" => Some(estimate_noise_immerkaer(image)),
            _ => None, // detail_mad, estimated inside the transform
        };

        let mut channels: Vec<Vec<f32>> = (0..3)
            .map(|c| image.pixels().map(|p| p.0[c] as f32).collect())
            .collect();

        for channel in channels.iter_mut() {
            denoise_plane(
                channel,
                width as usize,
                height as usize,
                &filters,
                levels,
                soft,
                external_sigma,
            );
        }

        let mut out = RgbImage::new(width, height);
        for (i, pixel) in out.pixels_mut().enumerate() {
            for c in 0..3 {
                pixel.0[c] = channels[c][i].round().clamp(0.0, 255.0) as u8;
            }
        }
        Ok(out)
    }
}

/// Orthogonal analysis filter pair
struct WaveletFilters {
    low: Vec<f32>,
}

impl WaveletFilters {
    fn parse(name: &str) -> Result<WaveletFilters> {
        let low = match name {
            "haar" => {
                let s = 1.0 / 2.0f32.sqrt();
                vec![s, s]
            }
            "db2" => {
                // Daubechies D4 analysis low-pass
                let sqrt3 = 3.0f32.sqrt();
                let norm = 4.0 * 2.0f32.sqrt();
                vec![
                    (1.0 + sqrt3) / norm,
                    (3.0 + sqrt3) / norm,
                    (3.0 - sqrt3) / norm,
                    (1.0 - sqrt3) / norm,
                ]
            }
            other => {
                return Err(OperatorError::WrongParameterType {
                    name: format!("wavelet ({})", other),
                    expected: "choice",
                })
            }
        };
        Ok(WaveletFilters { low })
    }

    /// Quadrature mirror high-pass: `g[k] = (-1)^k * h[L-1-k]`
    fn high(&self) -> Vec<f32> {
        let len = self.low.len();
        (0..len)
            .map(|k| {
                let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
                sign * self.low[len - 1 - k]
            })
            .collect()
    }
}

/// Forward 1D periodic transform of `signal[..n]` into approx/detail halves
fn dwt_1d(signal: &[f32], n: usize, low: &[f32], high: &[f32], out: &mut [f32]) {
    let half = n / 2;
    for i in 0..half {
        let mut a = 0.0f32;
        let mut d = 0.0f32;
        for (k, (&l, &g)) in low.iter().zip(high.iter()).enumerate() {
            let v = signal[(2 * i + k) % n];
            a += l * v;
            d += g * v;
        }
        out[i] = a;
        out[half + i] = d;
    }
}

/// Inverse of `dwt_1d` (orthogonal filters, so synthesis is the transpose)
fn idwt_1d(coeffs: &[f32], n: usize, low: &[f32], high: &[f32], out: &mut [f32]) {
    let half = n / 2;
    out[..n].fill(0.0);
    for i in 0..half {
        for (k, (&l, &g)) in low.iter().zip(high.iter()).enumerate() {
            out[(2 * i + k) % n] += l * coeffs[i] + g * coeffs[half + i];
        }
    }
}

/// Multi-level forward/threshold/inverse on one channel plane
fn denoise_plane(
    data: &mut [f32],
    width: usize,
    height: usize,
    filters: &WaveletFilters,
    levels: u32,
    soft: bool,
    external_sigma: Option<f64>,
) {
    let low = &filters.low;
    let high = filters.high();

    // Deepest level that keeps both sides even and at least filter-length wide
    let mut usable_levels = 0;
    let (mut w, mut h) = (width, height);
    for _ in 0..levels {
        if w % 2 != 0 || h % 2 != 0 || w < low.len() || h < low.len() {
            break;
        }
        w /= 2;
        h /= 2;
        usable_levels += 1;
    }
    if usable_levels == 0 {
        return;
    }

    // Forward transform
    let mut row_buf = vec![0.0f32; width.max(height)];
    let mut col_buf = vec![0.0f32; height];
    let (mut w, mut h) = (width, height);
    for _ in 0..usable_levels {
        for y in 0..h {
            let row: Vec<f32> = (0..w).map(|x| data[y * width + x]).collect();
            dwt_1d(&row, w, low, &high, &mut row_buf);
            for x in 0..w {
                data[y * width + x] = row_buf[x];
            }
        }
        for x in 0..w {
            let col: Vec<f32> = (0..h).map(|y| data[y * width + x]).collect();
            dwt_1d(&col, h, low, &high, &mut col_buf);
            for y in 0..h {
                data[y * width + x] = col_buf[y];
            }
        }
        w /= 2;
        h /= 2;
    }

    // Noise sigma: external estimate, or MAD of the finest diagonal details
    let sigma = external_sigma.unwrap_or_else(|| {
        let mut details: Vec<f32> = Vec::new();
        for y in height / 2..height {
            for x in width / 2..width {
                details.push(data[y * width + x].abs());
            }
        }
        if details.is_empty() {
            return 0.0;
        }
        details.sort_by(|a, b| a.total_cmp(b));
        details[details.len() / 2] as f64 / MAD_SIGMA_FACTOR
    });

    // Universal threshold over every detail coefficient
    let n = (width * height) as f64;
    let threshold = (sigma * (2.0 * n.ln()).sqrt()) as f32;
    let ll_w = width >> usable_levels;
    let ll_h = height >> usable_levels;
    for y in 0..height {
        for x in 0..width {
            if x < ll_w && y < ll_h {
                continue; // approximation coefficients are kept
            }
            let v = data[y * width + x];
            data[y * width + x] = if soft {
                v.signum() * (v.abs() - threshold).max(0.0)
            } else if v.abs() > threshold {
                v
            } else {
                0.0
            };
        }
    }

    // Inverse transform
    let mut w = width >> usable_levels;
    let mut h = height >> usable_levels;
    for _ in 0..usable_levels {
        w *= 2;
        h *= 2;
        for x in 0..w {
            let col: Vec<f32> = (0..h).map(|y| data[y * width + x]).collect();
            idwt_1d(&col, h, low, &high, &mut col_buf);
            for y in 0..h {
                data[y * width + x] = col_buf[y];
            }
        }
        for y in 0..h {
            let row: Vec<f32> = (0..w).map(|x| data[y * width + x]).collect();
            idwt_1d(&row, w, low, &high, &mut row_buf);
            for x in 0..w {
                data[y * width + x] = row_buf[x];
            }
        }
    }
}

// ============================================================
// Non-Local Means
// ============================================================

/// Patch-similarity weighted averaging over a search window
pub struct NlMeans;

impl CorrectionOperator for NlMeans {
    fn apply(&self, image: &RgbImage, params: &ParamSet) -> Result<RgbImage> {
        let h = params.float("h")?;
        let template = params.int("template_window_size")? as i64;
        let search = params.int("search_window_size")? as i64;

        let (width, height) = image.dimensions();
        let w = width as i64;
        let ht = height as i64;
        let t_radius = template / 2;
        let s_radius = search / 2;
        let patch_len = ((2 * t_radius + 1) * (2 * t_radius + 1) * 3) as f64;
        let h_sq = h * h;

        let sample = |x: i64, y: i64| -> &Rgb<u8> {
            image.get_pixel(x.clamp(0, w - 1) as u32, y.clamp(0, ht - 1) as u32)
        };

        let mut out = RgbImage::new(width, height);
        for y in 0..ht {
            for x in 0..w {
                let mut weight_sum = 0.0f64;
                let mut value_sum = [0.0f64; 3];

                for sy in -s_radius..=s_radius {
                    for sx in -s_radius..=s_radius {
                        let cx = x + sx;
                        let cy = y + sy;

                        // Mean squared patch distance
                        let mut dist = 0.0f64;
                        for ty in -t_radius..=t_radius {
                            for tx in -t_radius..=t_radius {
                                let a = sample(x + tx, y + ty);
                                let b = sample(cx + tx, cy + ty);
                                for c in 0..3 {
                                    let d = a.0[c] as f64 - b.0[c] as f64;
                                    dist += d * d;
                                }
                            }
                        }
                        dist /= patch_len;

                        let weight = (-dist / h_sq).exp();
                        let pixel = sample(cx, cy);
                        for c in 0..3 {
                            value_sum[c] += weight * pixel.0[c] as f64;
                        }
                        weight_sum += weight;
                    }
                }

                let mut pixel = [0u8; 3];
                for c in 0..3 {
                    pixel[c] = (value_sum[c] / weight_sum).round().clamp(0.0, 255.0) as u8;
                }
                out.put_pixel(x as u32, y as u32, Rgb(pixel));
            }
        }
        Ok(out)
    }
}
