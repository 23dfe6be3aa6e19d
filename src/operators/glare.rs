//! Glare correction operators
//!
//! Glare (specular highlight) regions are located with a binary mask built
//! from a brightness threshold, a gradient-magnitude threshold, or their
//! union, then filled from surrounding texture:
//!
//! - **Glare inpaint** - global brightness threshold.
//! - **Adaptive glare inpaint** - per-block brightness threshold (mean or
//!   Gaussian-weighted mean of the block, minus an offset constant).
//!
//! Two fill strategies are provided: `diffusion` (iterative Laplacian
//! relaxation from the mask boundary) and `telea` (distance-ordered
//! weighted fill, processing pixels closest to known texture first).

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::filter::{gaussian_blur_f32, laplacian_filter};
use imageproc::gradients::{horizontal_scharr, horizontal_sobel, vertical_scharr, vertical_sobel};
use std::collections::VecDeque;

use super::colorspace::{luminance_plane, LuminanceSpace};
use super::types::{CorrectionOperator, OperatorError, ParamSet, Result};

// ============================================================
// Constants
// ============================================================

/// Mask value for pixels to be filled
const MASKED: u8 = 255;

/// Relaxation sweeps per unit of inpaint radius
const DIFFUSION_SWEEPS_PER_RADIUS: u32 = 25;

// ============================================================
// Operators
// ============================================================

/// Mask-guided glare inpainting with a global brightness threshold
pub struct GlareInpaint;

impl CorrectionOperator for GlareInpaint {
    fn apply(&self, image: &RgbImage, params: &ParamSet) -> Result<RgbImage> {
        let plane = mask_plane(image, params)?;
        let threshold = params.int("threshold")? as u8;

        let brightness = |p: &GrayImage| threshold_mask(p, threshold);
        let mask = build_mask(&plane, params, brightness)?;
        inpaint(image, &mask, params)
    }
}

/// Mask-guided glare inpainting with a per-block adaptive threshold
pub struct AdaptiveGlareInpaint;

impl CorrectionOperator for AdaptiveGlareInpaint {
    fn apply(&self, image: &RgbImage, params: &ParamSet) -> Result<RgbImage> {
        let plane = mask_plane(image, params)?;
        let method = params.choice("adaptive_method")?.to_string();
        let block_size = params.int("block_size")? as u32;
        let offset = params.float("offset")?;

        let brightness =
            move |p: &GrayImage| adaptive_threshold_mask(p, &method, block_size, offset);
        let mask = build_mask(&plane, params, brightness)?;
        inpaint(image, &mask, params)
    }
}

// ============================================================
// Mask Construction
// ============================================================

fn mask_plane(image: &RgbImage, params: &ParamSet) -> Result<GrayImage> {
    let space = LuminanceSpace::parse(params.choice("mask_space")?).ok_or_else(|| {
        OperatorError::WrongParameterType {
            name: "mask_space".to_string(),
            expected: "choice",
        }
    })?;
    Ok(luminance_plane(image, space))
}

/// Combine brightness and gradient masks per the configured mask mode
fn build_mask<F>(plane: &GrayImage, params: &ParamSet, brightness: F) -> Result<GrayImage>
where
    F: FnOnce(&GrayImage) -> GrayImage,
{
    let mode = params.choice("mask_mode")?;
    match mode {
        "brightness" => Ok(brightness(plane)),
        "gradient" => gradient_mask(plane, params),
        "combine" => {
            let a = brightness(plane);
            let b = gradient_mask(plane, params)?;
            Ok(union_mask(&a, &b))
        }
        other => Err(OperatorError::WrongParameterType {
            name: format!("mask_mode ({})", other),
            expected: "choice",
        }),
    }
}

/// Fixed binary threshold: pixels above `threshold` are masked
fn threshold_mask(plane: &GrayImage, threshold: u8) -> GrayImage {
    let (width, height) = plane.dimensions();
    let mut mask = GrayImage::new(width, height);
    for (x, y, pixel) in plane.enumerate_pixels() {
        if pixel.0[0] > threshold {
            mask.put_pixel(x, y, Luma([MASKED]));
        }
    }
    mask
}

/// Per-block threshold: the local mean (or Gaussian-weighted mean) minus the
/// offset constant decides per pixel
fn adaptive_threshold_mask(
    plane: &GrayImage,
    method: &str,
    block_size: u32,
    offset: f64,
) -> GrayImage {
    let local_mean = match method {
        "gaussian" => {
            // OpenCV's sigma-from-kernel-size rule
            let sigma = 0.3 * ((block_size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
            gaussian_blur_f32(plane, sigma.max(0.1))
        }
        _ => box_mean(plane, block_size),
    };

    let (width, height) = plane.dimensions();
    let mut mask = GrayImage::new(width, height);
    for (x, y, pixel) in plane.enumerate_pixels() {
        let threshold = local_mean.get_pixel(x, y).0[0] as f64 - offset;
        if pixel.0[0] as f64 > threshold {
            mask.put_pixel(x, y, Luma([MASKED]));
        }
    }
    mask
}

/// Box mean via an integral image
fn box_mean(plane: &GrayImage, block_size: u32) -> GrayImage {
    let (width, height) = plane.dimensions();
    let w = width as usize;
    let h = height as usize;
    let radius = (block_size / 2) as i64;

    // integral[y+1][x+1] = sum of plane[0..=y][0..=x]
    let mut integral = vec![0u64; (w + 1) * (h + 1)];
    for y in 0..h {
        let mut row_sum = 0u64;
        for x in 0..w {
            row_sum += plane.get_pixel(x as u32, y as u32).0[0] as u64;
            integral[(y + 1) * (w + 1) + (x + 1)] = integral[y * (w + 1) + (x + 1)] + row_sum;
        }
    }

    let mut out = GrayImage::new(width, height);
    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let x0 = (x - radius).max(0) as usize;
            let y0 = (y - radius).max(0) as usize;
            let x1 = ((x + radius + 1).min(w as i64)) as usize;
            let y1 = ((y + radius + 1).min(h as i64)) as usize;

            let sum = integral[y1 * (w + 1) + x1] + integral[y0 * (w + 1) + x0]
                - integral[y0 * (w + 1) + x1]
                - integral[y1 * (w + 1) + x0];
            let area = ((x1 - x0) * (y1 - y0)) as u64;
            let mean = (sum / area.max(1)) as u8;
            out.put_pixel(x as u32, y as u32, Luma([mean]));
        }
    }
    out
}

/// Normalized gradient-magnitude mask
fn gradient_mask(plane: &GrayImage, params: &ParamSet) -> Result<GrayImage> {
    let method = params.choice("gradient_method")?;
    let threshold = params.int("gradient_threshold")? as f32;

    let (width, height) = plane.dimensions();
    let mut magnitude = vec![0.0f32; (width * height) as usize];

    match method {
        "sobel" | "scharr" => {
            let (gx, gy) = if method == "sobel" {
                (horizontal_sobel(plane), vertical_sobel(plane))
            } else {
                (horizontal_scharr(plane), vertical_scharr(plane))
            };
            for y in 0..height {
                for x in 0..width {
                    let dx = gx.get_pixel(x, y).0[0] as f32;
                    let dy = gy.get_pixel(x, y).0[0] as f32;
                    magnitude[(y * width + x) as usize] = (dx * dx + dy * dy).sqrt();
                }
            }
        }
        "laplacian" => {
            let lap = laplacian_filter(plane);
            for y in 0..height {
                for x in 0..width {
                    magnitude[(y * width + x) as usize] = lap.get_pixel(x, y).0[0].abs() as f32;
                }
            }
        }
        other => {
            return Err(OperatorError::WrongParameterType {
                name: format!("gradient_method ({})", other),
                expected: "choice",
            })
        }
    }

    // Min-max normalize to 0..255 before thresholding
    let max = magnitude.iter().cloned().fold(0.0f32, f32::max);
    let min = magnitude.iter().cloned().fold(f32::INFINITY, f32::min);
    let span = (max - min).max(f32::EPSILON);

    let mut mask = GrayImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let normalized = (magnitude[(y * width + x) as usize] - min) / span * 255.0;
            if normalized > threshold {
                mask.put_pixel(x, y, Luma([MASKED]));
            }
        }
    }
    Ok(mask)
}

fn union_mask(a: &GrayImage, b: &GrayImage) -> GrayImage {
    let (width, height) = a.dimensions();
    let mut out = GrayImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            if a.get_pixel(x, y).0[0] == MASKED || b.get_pixel(x, y).0[0] == MASKED {
                out.put_pixel(x, y, Luma([MASKED]));
            }
        }
    }
    out
}

// ============================================================
// Inpainting
// ============================================================

fn inpaint(image: &RgbImage, mask: &GrayImage, params: &ParamSet) -> Result<RgbImage> {
    let radius = params.int("inpaint_radius")? as u32;
    let method = params.choice("inpaint_method")?;

    match method {
        "diffusion" => Ok(inpaint_diffusion(image, mask, radius)),
        "telea" => Ok(inpaint_telea(image, mask, radius)),
        other => Err(OperatorError::WrongParameterType {
            name: format!("inpaint_method ({})", other),
            expected: "choice",
        }),
    }
}

/// Multi-source BFS distance from each masked pixel to the nearest known one
///
/// Returns pixel indices in increasing-distance order. Fully masked images
/// yield an empty order (nothing can be propagated).
fn boundary_distance_order(mask: &GrayImage) -> Vec<(u32, u32)> {
    let (width, height) = mask.dimensions();
    let mut distance = vec![u32::MAX; (width * height) as usize];
    let mut queue = VecDeque::new();

    for y in 0..height {
        for x in 0..width {
            if mask.get_pixel(x, y).0[0] != MASKED {
                distance[(y * width + x) as usize] = 0;
                queue.push_back((x, y));
            }
        }
    }

    let mut order = Vec::new();
    while let Some((x, y)) = queue.pop_front() {
        let d = distance[(y * width + x) as usize];
        let neighbors = [
            (x.wrapping_sub(1), y),
            (x + 1, y),
            (x, y.wrapping_sub(1)),
            (x, y + 1),
        ];
        for (nx, ny) in neighbors {
            if nx < width && ny < height {
                let idx = (ny * width + nx) as usize;
                if distance[idx] == u32::MAX {
                    distance[idx] = d + 1;
                    order.push((nx, ny));
                    queue.push_back((nx, ny));
                }
            }
        }
    }
    order
}

/// Distance-ordered weighted fill: each masked pixel is filled from known
/// (or already filled) pixels within `radius`, weighted by inverse squared
/// distance, walking outward from the mask boundary
fn inpaint_telea(image: &RgbImage, mask: &GrayImage, radius: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    let mut out = image.clone();
    let mut known: Vec<bool> = mask.pixels().map(|p| p.0[0] != MASKED).collect();
    let r = radius.max(1) as i64;

    for (x, y) in boundary_distance_order(mask) {
        let mut weight_sum = 0.0f64;
        let mut value_sum = [0.0f64; 3];

        for dy in -r..=r {
            for dx in -r..=r {
                let nx = x as i64 + dx;
                let ny = y as i64 + dy;
                if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                    continue;
                }
                let idx = (ny as u32 * width + nx as u32) as usize;
                if !known[idx] {
                    continue;
                }
                let dist_sq = (dx * dx + dy * dy) as f64;
                if dist_sq == 0.0 || dist_sq > (r * r) as f64 {
                    continue;
                }
                let weight = 1.0 / (dist_sq + 1.0);
                let pixel = out.get_pixel(nx as u32, ny as u32);
                for c in 0..3 {
                    value_sum[c] += weight * pixel.0[c] as f64;
                }
                weight_sum += weight;
            }
        }

        if weight_sum > 0.0 {
            let mut filled = [0u8; 3];
            for c in 0..3 {
                filled[c] = (value_sum[c] / weight_sum).round().clamp(0.0, 255.0) as u8;
            }
            out.put_pixel(x, y, Rgb(filled));
        }
        known[(y * width + x) as usize] = true;
    }
    out
}

/// Iterative Laplacian relaxation: masked pixels are seeded from the nearest
/// known texture, then smoothed toward the average of their neighbors until
/// the fill settles
fn inpaint_diffusion(image: &RgbImage, mask: &GrayImage, radius: u32) -> RgbImage {
    let (width, height) = image.dimensions();

    // Seed masked pixels with a first outward pass
    let mut out = inpaint_telea(image, mask, 1.max(radius / 2));

    let masked: Vec<(u32, u32)> = mask
        .enumerate_pixels()
        .filter(|(_, _, p)| p.0[0] == MASKED)
        .map(|(x, y, _)| (x, y))
        .collect();
    if masked.is_empty() {
        return out;
    }

    let sweeps = DIFFUSION_SWEEPS_PER_RADIUS * radius.max(1);
    let mut next = out.clone();
    for _ in 0..sweeps {
        for &(x, y) in &masked {
            let mut sum = [0.0f32; 3];
            let mut count = 0.0f32;
            let neighbors = [
                (x.wrapping_sub(1), y),
                (x + 1, y),
                (x, y.wrapping_sub(1)),
                (x, y + 1),
            ];
            for (nx, ny) in neighbors {
                if nx < width && ny < height {
                    let pixel = out.get_pixel(nx, ny);
                    for c in 0..3 {
                        sum[c] += pixel.0[c] as f32;
                    }
                    count += 1.0;
                }
            }
            if count > 0.0 {
                let mut relaxed = [0u8; 3];
                for c in 0..3 {
                    relaxed[c] = (sum[c] / count).round().clamp(0.0, 255.0) as u8;
                }
                next.put_pixel(x, y, Rgb(relaxed));
            }
        }
        std::mem::swap(&mut out, &mut next);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::types::{spec_for, OperatorId, ParamValue};

    /// Dark scene with a small bright glare blob in the middle
    fn glare_image() -> RgbImage {
        let mut image = RgbImage::from_pixel(32, 32, Rgb([60, 60, 60]));
        for y in 14..18 {
            for x in 14..18 {
                image.put_pixel(x, y, Rgb([250, 250, 250]));
            }
        }
        image
    }

    #[test]
    fn test_threshold_mask_hits_glare_only() {
        let plane = luminance_plane(&glare_image(), LuminanceSpace::Gray);
        let mask = threshold_mask(&plane, 200);
        assert_eq!(mask.get_pixel(15, 15).0[0], MASKED);
        assert_eq!(mask.get_pixel(2, 2).0[0], 0);
    }

    #[test]
    fn test_glare_inpaint_darkens_glare() {
        let image = glare_image();
        let params = spec_for(OperatorId::GlareInpaint).default_params();

        let out = GlareInpaint.apply(&image, &params).unwrap();
        // Glare pixels should move toward the dark surround
        assert!(out.get_pixel(15, 15).0[0] < 150);
        // Non-glare pixels are untouched
        assert_eq!(out.get_pixel(2, 2).0, [60, 60, 60]);
    }

    #[test]
    fn test_glare_inpaint_telea_strategy() {
        let image = glare_image();
        let mut params = spec_for(OperatorId::GlareInpaint).default_params();
        params.set("inpaint_method", ParamValue::Choice("telea".to_string()));

        let out = GlareInpaint.apply(&image, &params).unwrap();
        assert!(out.get_pixel(15, 15).0[0] < 150);
    }

    #[test]
    fn test_gradient_mask_modes() {
        let image = glare_image();
        for method in ["sobel", "scharr", "laplacian"] {
            let mut params = spec_for(OperatorId::GlareInpaint).default_params();
            params.set("mask_mode", ParamValue::Choice("gradient".to_string()));
            params.set("gradient_method", ParamValue::Choice(method.to_string()));

            let out = GlareInpaint.apply(&image, &params).unwrap();
            assert_eq!(out.dimensions(), image.dimensions());
        }
    }

    #[test]
    fn test_combined_mask_is_union() {
        let mut a = GrayImage::new(4, 4);
        let mut b = GrayImage::new(4, 4);
        a.put_pixel(0, 0, Luma([MASKED]));
        b.put_pixel(3, 3, Luma([MASKED]));

        let merged = union_mask(&a, &b);
        assert_eq!(merged.get_pixel(0, 0).0[0], MASKED);
        assert_eq!(merged.get_pixel(3, 3).0[0], MASKED);
        assert_eq!(merged.get_pixel(1, 1).0[0], 0);
    }

    #[test]
    fn test_adaptive_inpaint_runs_both_methods() {
        let image = glare_image();
        for method in ["mean", "gaussian"] {
            let mut params = spec_for(OperatorId::AdaptiveGlareInpaint).default_params();
            params.set("adaptive_method", ParamValue::Choice(method.to_string()));

            let out = AdaptiveGlareInpaint.apply(&image, &params).unwrap();
            assert_eq!(out.dimensions(), image.dimensions());
        }
    }

    #[test]
    fn test_empty_mask_is_identity() {
        let image = RgbImage::from_pixel(16, 16, Rgb([50, 50, 50]));
        let params = spec_for(OperatorId::GlareInpaint).default_params();

        // No pixel above the 200 threshold, so nothing is inpainted
        let out = GlareInpaint.apply(&image, &params).unwrap();
        assert_eq!(out, image);
    }

    #[test]
    fn test_box_mean_uniform() {
        let plane = GrayImage::from_pixel(10, 10, Luma([80]));
        let mean = box_mean(&plane, 5);
        for pixel in mean.pixels() {
            assert_eq!(pixel.0[0], 80);
        }
    }

    #[test]
    fn test_boundary_distance_order_fully_masked() {
        let mask = GrayImage::from_pixel(4, 4, Luma([MASKED]));
        assert!(boundary_distance_order(&mask).is_empty());
    }
}
