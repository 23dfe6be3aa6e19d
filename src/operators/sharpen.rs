//! Sharpening operators for blur correction
//!
//! Two operators address the `blur` class:
//!
//! - **Unsharp mask** - subtract a further-blurred copy from the input,
//!   re-weighted by a positive/negative coefficient pair that conceptually
//!   sums to one.
//! - **Laplacian sharpen** - subtract the scaled Laplacian edge response.

use image::{Rgb, RgbImage};
use imageproc::filter::gaussian_blur_f32;

use super::types::{CorrectionOperator, ParamSet, Result};

// ============================================================
// Unsharp Mask
// ============================================================

/// Sharpen by re-weighting the input against a blurred copy
///
/// `out = positive_coeff * input + negative_coeff * blurred`, clamped per
/// channel. With the defaults (2.5, -1.5) the coefficients sum to one, so
/// flat regions keep their brightness.
pub struct UnsharpMask;

impl CorrectionOperator for UnsharpMask {
    fn apply(&self, image: &RgbImage, params: &ParamSet) -> Result<RgbImage> {
        let sigma = params.float("sigma")? as f32;
        let positive = params.float("positive_coeff")? as f32;
        let negative = params.float("negative_coeff")? as f32;

        let blurred = gaussian_blur_f32(image, sigma);

        let (width, height) = image.dimensions();
        let mut out = RgbImage::new(width, height);
        for (x, y, pixel) in image.enumerate_pixels() {
            let soft = blurred.get_pixel(x, y);
            let mut sharpened = [0u8; 3];
            for c in 0..3 {
                let v = positive * pixel.0[c] as f32 + negative * soft.0[c] as f32;
                sharpened[c] = v.round().clamp(0.0, 255.0) as u8;
            }
            out.put_pixel(x, y, Rgb(sharpened));
        }
        Ok(out)
    }
}

// ============================================================
// Laplacian Sharpen
// ============================================================

/// Sharpen by subtracting the scaled Laplacian response per channel
pub struct LaplacianSharpen;

impl CorrectionOperator for LaplacianSharpen {
    fn apply(&self, image: &RgbImage, params: &ParamSet) -> Result<RgbImage> {
        let coeff = params.float("coeff")? as f32;

        let (width, height) = image.dimensions();
        let mut out = image.clone();
        if width < 3 || height < 3 {
            return Ok(out);
        }

        // 4-neighbor Laplacian kernel: [0, 1, 0; 1, -4, 1; 0, 1, 0]
        for y in 1..height - 1 {
            for x in 1..width - 1 {
                let mut sharpened = [0u8; 3];
                for c in 0..3 {
                    let center = image.get_pixel(x, y).0[c] as f32;
                    let top = image.get_pixel(x, y - 1).0[c] as f32;
                    let bottom = image.get_pixel(x, y + 1).0[c] as f32;
                    let left = image.get_pixel(x - 1, y).0[c] as f32;
                    let right = image.get_pixel(x + 1, y).0[c] as f32;

                    let laplacian = top + bottom + left + right - 4.0 * center;
                    sharpened[c] = (center - coeff * laplacian).round().clamp(0.0, 255.0) as u8;
                }
                out.put_pixel(x, y, Rgb(sharpened));
            }
        }
        Ok(out)
    }
}
