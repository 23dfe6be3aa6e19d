//! Contrast correction operators
//!
//! Both operators equalize the brightness channel of a chosen color space
//! (HSV value or YUV luma) and leave chroma untouched:
//!
//! - **Histogram equalization** - global CDF remap of the brightness channel.
//! - **CLAHE** - tile-wise equalization with a clip limit bounding how much
//!   any single tile's histogram may be stretched, bilinearly interpolated
//!   between neighboring tiles to hide seams.

use image::{GrayImage, Luma};
use image::RgbImage;
use imageproc::contrast::equalize_histogram;

use super::colorspace::{map_luminance, LuminanceSpace};
use super::types::{CorrectionOperator, OperatorError, ParamSet, Result};

// ============================================================
// Histogram Equalization
// ============================================================

/// Global histogram equalization on the brightness channel
pub struct HistEqualization;

impl CorrectionOperator for HistEqualization {
    fn apply(&self, image: &RgbImage, params: &ParamSet) -> Result<RgbImage> {
        let space = parse_space(params.choice("color_space")?)?;
        Ok(map_luminance(image, space, |plane| equalize_histogram(plane)))
    }
}

// ============================================================
// CLAHE
// ============================================================

/// Contrast-limited adaptive histogram equalization on the brightness channel
pub struct Clahe;

impl CorrectionOperator for Clahe {
    fn apply(&self, image: &RgbImage, params: &ParamSet) -> Result<RgbImage> {
        let space = parse_space(params.choice("color_space")?)?;
        let clip_limit = params.float("clip_limit")?;
        let tiles = params.int("tile_grid_size")? as u32;

        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(OperatorError::DegenerateImage(
                "empty image".to_string(),
            ));
        }

        Ok(map_luminance(image, space, |plane| {
            clahe_plane(plane, clip_limit, tiles)
        }))
    }
}

fn parse_space(name: &str) -> Result<LuminanceSpace> {
    LuminanceSpace::parse(name).ok_or_else(|| OperatorError::WrongParameterType {
        name: "color_space".to_string(),
        expected: "choice",
    })
}

/// CLAHE on a single 8-bit plane
///
/// Each tile gets a clipped-histogram CDF mapping; pixel values are remapped
/// by bilinear interpolation between the mappings of the four nearest tile
/// centers.
fn clahe_plane(plane: &GrayImage, clip_limit: f64, tiles: u32) -> GrayImage {
    let (width, height) = plane.dimensions();
    let tiles = tiles.clamp(1, width.min(height).max(1));
    let tile_w = width.div_ceil(tiles);
    let tile_h = height.div_ceil(tiles);

    // Per-tile clipped CDF lookup tables
    let mut luts = vec![[0u8; 256]; (tiles * tiles) as usize];
    for ty in 0..tiles {
        for tx in 0..tiles {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(width);
            let y1 = (y0 + tile_h).min(height);

            let mut hist = [0u64; 256];
            let mut count = 0u64;
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[plane.get_pixel(x, y).0[0] as usize] += 1;
                    count += 1;
                }
            }
            if count == 0 {
                continue;
            }

            // Clip and redistribute the excess uniformly
            let limit = ((clip_limit * count as f64) / 256.0).max(1.0) as u64;
            let mut excess = 0u64;
            for bin in hist.iter_mut() {
                if *bin > limit {
                    excess += *bin - limit;
                    *bin = limit;
                }
            }
            let bonus = excess / 256;
            for bin in hist.iter_mut() {
                *bin += bonus;
            }

            let lut = &mut luts[(ty * tiles + tx) as usize];
            let mut cdf = 0u64;
            for (value, bin) in hist.iter().enumerate() {
                cdf += *bin;
                lut[value] = ((cdf * 255) / count).min(255) as u8;
            }
        }
    }

    let mut out = GrayImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let value = plane.get_pixel(x, y).0[0] as usize;

            // Position relative to tile centers
            let fx = (x as f64 / tile_w as f64 - 0.5).clamp(0.0, tiles as f64 - 1.0);
            let fy = (y as f64 / tile_h as f64 - 0.5).clamp(0.0, tiles as f64 - 1.0);
            let tx0 = fx.floor() as u32;
            let ty0 = fy.floor() as u32;
            let tx1 = (tx0 + 1).min(tiles - 1);
            let ty1 = (ty0 + 1).min(tiles - 1);
            let wx = fx - tx0 as f64;
            let wy = fy - ty0 as f64;

            let v00 = luts[(ty0 * tiles + tx0) as usize][value] as f64;
            let v01 = luts[(ty0 * tiles + tx1) as usize][value] as f64;
            let v10 = luts[(ty1 * tiles + tx0) as usize][value] as f64;
            let v11 = luts[(ty1 * tiles + tx1) as usize][value] as f64;

            let top = v00 * (1.0 - wx) + v01 * wx;
            let bottom = v10 * (1.0 - wx) + v11 * wx;
            let blended = top * (1.0 - wy) + bottom * wy;

            out.put_pixel(x, y, Luma([blended.round().clamp(0.0, 255.0) as u8]));
        }
    }
    out
}
