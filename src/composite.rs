//! Premultiplied-alpha compositing of field surfaces onto the canvas, and
//! the coverage/tint split behind shadow plates.

use crate::{CardpressError, CardpressResult};

/// Source-over blend of premultiplied `src` into `dst`, with a uniform extra
/// `opacity` applied to the source.
pub fn over_in_place(dst: &mut [u8], src: &[u8], opacity: f32) -> CardpressResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(CardpressError::render(
            "over_in_place expects equal-length rgba8 buffers",
        ));
    }
    let op = u32::from((opacity.clamp(0.0, 1.0) * 255.0).round() as u8);
    if op == 0 {
        return Ok(());
    }

    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let sa = scale255(u32::from(s[3]), op);
        if sa == 0 {
            continue;
        }
        let inv = 255 - sa;
        for c in 0..3 {
            let blended = scale255(u32::from(s[c]), op) + scale255(u32::from(d[c]), inv);
            d[c] = blended.min(255) as u8;
        }
        d[3] = (sa + scale255(u32::from(d[3]), inv)).min(255) as u8;
    }
    Ok(())
}

/// Alpha plane of a premultiplied RGBA8 buffer.
pub fn coverage_of(rgba8_premul: &[u8]) -> CardpressResult<Vec<u8>> {
    if !rgba8_premul.len().is_multiple_of(4) {
        return Err(CardpressError::render(
            "coverage_of expects an rgba8 buffer",
        ));
    }
    Ok(rgba8_premul.chunks_exact(4).map(|px| px[3]).collect())
}

/// Expand a coverage plane into a premultiplied plate of `tint_premul`
/// weighted per pixel by coverage. Drawn under a field surface, this is its
/// shadow.
pub fn tint_coverage(coverage: &[u8], tint_premul: [u8; 4]) -> Vec<u8> {
    let mut out = vec![0u8; coverage.len() * 4];
    for (px, &cov) in out.chunks_exact_mut(4).zip(coverage) {
        for c in 0..4 {
            px[c] = scale255(u32::from(tint_premul[c]), u32::from(cov)) as u8;
        }
    }
    out
}

fn scale255(x: u32, y: u32) -> u32 {
    (x * y + 127) / 255
}
