//! Pixel diff between two equally sized images.

use image::{Rgba, RgbaImage};

use crate::error::DriverError;

pub const DEFAULT_THRESHOLD: u8 = 20;
pub const DEFAULT_ALPHA: f32 = 0.6;

/// Colour differing pixels are blended toward.
pub const HIGHLIGHT: [u8; 3] = [255, 0, 0];

#[derive(Debug)]
pub struct DiffResult {
    pub diff_pixels: u64,
    pub diff_ratio: f64,
    pub image: RgbaImage,
}

/// Compare `a` against `b`.
///
/// A pixel differs when the luma of its per-channel absolute difference is
/// above `threshold`. The returned image is `b` with differing pixels blended
/// toward [`HIGHLIGHT`] by `alpha`; every other pixel is copied unchanged.
pub fn diff_images(
    a: &RgbaImage,
    b: &RgbaImage,
    threshold: u8,
    alpha: f32,
) -> Result<DiffResult, DriverError> {
    if !alpha.is_finite() || !(0.0..=1.0).contains(&alpha) {
        return Err(DriverError::InvalidArguments(format!(
            "alpha must be in 0..1, got {alpha}"
        )));
    }
    if a.dimensions() != b.dimensions() {
        return Err(DriverError::DimensionMismatch {
            a: a.dimensions(),
            b: b.dimensions(),
        });
    }

    let (width, height) = b.dimensions();
    let mut out = b.clone();
    let mut diff_pixels: u64 = 0;

    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let pa = a.get_pixel(x, y).0;
        let pb = pixel.0;
        if delta_luma(pa, pb) > threshold {
            diff_pixels += 1;
            *pixel = blend_highlight(pb, alpha);
        }
    }

    let total_pixels = width as u64 * height as u64;
    let diff_ratio = if total_pixels > 0 {
        diff_pixels as f64 / total_pixels as f64
    } else {
        0.0
    };

    Ok(DiffResult {
        diff_pixels,
        diff_ratio,
        image: out,
    })
}

/// ITU-R 601 luma of the absolute channel difference, rounded the same way
/// common 8-bit grayscale conversions do.
fn delta_luma(a: [u8; 4], b: [u8; 4]) -> u8 {
    let dr = a[0].abs_diff(b[0]) as u32;
    let dg = a[1].abs_diff(b[1]) as u32;
    let db = a[2].abs_diff(b[2]) as u32;
    ((dr * 19595 + dg * 38470 + db * 7471 + 0x8000) >> 16) as u8
}

fn blend_highlight(base: [u8; 4], alpha: f32) -> Rgba<u8> {
    let mix = |from: u8, to: u8| ((1.0 - alpha) * from as f32 + alpha * to as f32).round() as u8;
    Rgba([
        mix(base[0], HIGHLIGHT[0]),
        mix(base[1], HIGHLIGHT[1]),
        mix(base[2], HIGHLIGHT[2]),
        base[3],
    ])
}
