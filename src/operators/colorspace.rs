//! Color-space helpers for luminance-channel processing
//!
//! The contrast and glare operators work on the brightness channel of a
//! chosen color representation and leave chroma untouched. This module
//! extracts that channel as an 8-bit plane and reconstructs RGB after the
//! plane has been transformed.

use image::{GrayImage, Luma, Rgb, RgbImage};

/// Color representation whose brightness channel is processed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LuminanceSpace {
    /// Plain grayscale (BT.601 luma)
    Gray,
    /// V channel of HSV
    Hsv,
    /// Y channel of YUV (BT.601)
    Yuv,
}

impl LuminanceSpace {
    /// Parse a schema choice value; callers pass registry-validated strings
    pub fn parse(name: &str) -> Option<LuminanceSpace> {
        match name {
            "gray" => Some(LuminanceSpace::Gray),
            "hsv" => Some(LuminanceSpace::Hsv),
            "yuv" => Some(LuminanceSpace::Yuv),
            _ => None,
        }
    }
}

/// BT.601 luma of one pixel
fn luma(pixel: &Rgb<u8>) -> f32 {
    let [r, g, b] = pixel.0;
    0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
}

/// Extract the brightness plane of `image` in the given space
pub fn luminance_plane(image: &RgbImage, space: LuminanceSpace) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut plane = GrayImage::new(width, height);

    for (x, y, pixel) in image.enumerate_pixels() {
        let value = match space {
            LuminanceSpace::Gray | LuminanceSpace::Yuv => luma(pixel),
            LuminanceSpace::Hsv => {
                let [r, g, b] = pixel.0;
                r.max(g).max(b) as f32
            }
        };
        plane.put_pixel(x, y, Luma([value.round().clamp(0.0, 255.0) as u8]));
    }
    plane
}

/// Apply `f` to the brightness plane and rebuild an RGB image
///
/// Chroma is preserved: HSV scales each channel by the value ratio, YUV
/// shifts each channel by the luma delta. `Gray` treats the whole image as
/// its brightness plane.
pub fn map_luminance<F>(image: &RgbImage, space: LuminanceSpace, f: F) -> RgbImage
where
    F: FnOnce(&GrayImage) -> GrayImage,
{
    let plane = luminance_plane(image, space);
    let mapped = f(&plane);
    recombine(image, space, &plane, &mapped)
}

/// Rebuild RGB from the original image and a transformed brightness plane
pub fn recombine(
    image: &RgbImage,
    space: LuminanceSpace,
    before: &GrayImage,
    after: &GrayImage,
) -> RgbImage {
    let (width, height) = image.dimensions();
    let mut out = RgbImage::new(width, height);

    for (x, y, pixel) in image.enumerate_pixels() {
        let old = before.get_pixel(x, y).0[0] as f32;
        let new = after.get_pixel(x, y).0[0] as f32;

        let corrected = match space {
            LuminanceSpace::Gray => {
                // Entire pixel follows the plane
                let v = new.round().clamp(0.0, 255.0) as u8;
                Rgb([v, v, v])
            }
            LuminanceSpace::Hsv => {
                // Scaling all channels by the value ratio changes V and keeps H, S
                let scale = if old > 0.0 { new / old } else { 0.0 };
                let [r, g, b] = pixel.0;
                Rgb([
                    (r as f32 * scale).round().clamp(0.0, 255.0) as u8,
                    (g as f32 * scale).round().clamp(0.0, 255.0) as u8,
                    (b as f32 * scale).round().clamp(0.0, 255.0) as u8,
                ])
            }
            LuminanceSpace::Yuv => {
                // Shifting all channels by the luma delta changes Y and keeps U, V
                let delta = new - old;
                let [r, g, b] = pixel.0;
                Rgb([
                    (r as f32 + delta).round().clamp(0.0, 255.0) as u8,
                    (g as f32 + delta).round().clamp(0.0, 255.0) as u8,
                    (b as f32 + delta).round().clamp(0.0, 255.0) as u8,
                ])
            }
        };
        out.put_pixel(x, y, corrected);
    }
    out
}
