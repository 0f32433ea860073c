//! Separable gaussian blur over a single-channel coverage plane.
//!
//! Shadow plates are a uniform tint weighted by the field's coverage, so only
//! the coverage needs blurring; tinting happens after. Both passes share one
//! strided kernel loop, clamping at the edges.

use crate::{CardpressError, CardpressResult};

/// Blur a `width`x`height` coverage plane with a gaussian of the given
/// `radius` and `sigma`. Radius 0 is a copy.
pub fn blur_coverage(
    coverage: &[u8],
    width: u32,
    height: u32,
    radius: u32,
    sigma: f32,
) -> CardpressResult<Vec<u8>> {
    let expected = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| CardpressError::render("blur plane size overflow"))?;
    if coverage.len() != expected {
        return Err(CardpressError::render(
            "blur_coverage expects a width*height plane",
        ));
    }
    if radius == 0 {
        return Ok(coverage.to_vec());
    }

    let kernel = gaussian_kernel(radius, sigma)?;
    let (w, h) = (width as usize, height as usize);
    let mut tmp = vec![0u8; expected];
    let mut out = vec![0u8; expected];

    // Rows first (unit stride), then columns (row stride).
    blur_lanes(coverage, &mut tmp, h, w, w, 1, &kernel);
    blur_lanes(&tmp, &mut out, w, h, 1, w, &kernel);
    Ok(out)
}

/// Normalized gaussian weights for a window of `2 * radius + 1` taps.
fn gaussian_kernel(radius: u32, sigma: f32) -> CardpressResult<Vec<f32>> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(CardpressError::validation("blur sigma must be > 0"));
    }
    let r = radius as i32;
    let denom = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (-r..=r)
        .map(|i| (-(i * i) as f32 / denom).exp())
        .collect();
    let sum: f32 = kernel.iter().sum();
    for w in &mut kernel {
        *w /= sum;
    }
    Ok(kernel)
}

/// Convolve every lane of `src` with `kernel`, clamping samples at the lane
/// ends. A lane is a row when `elem_stride` is 1, a column when it is the row
/// width.
fn blur_lanes(
    src: &[u8],
    dst: &mut [u8],
    lanes: usize,
    lane_len: usize,
    lane_stride: usize,
    elem_stride: usize,
    kernel: &[f32],
) {
    let radius = (kernel.len() / 2) as isize;
    let last = lane_len as isize - 1;

    for lane in 0..lanes {
        let base = lane * lane_stride;
        for i in 0..lane_len {
            let mut acc = 0.0f32;
            for (tap, &weight) in kernel.iter().enumerate() {
                let j = (i as isize + tap as isize - radius).clamp(0, last) as usize;
                acc += weight * f32::from(src[base + j * elem_stride]);
            }
            dst[base + i * elem_stride] = (acc + 0.5).min(255.0) as u8;
        }
    }
}
