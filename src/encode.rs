//! Output encoding: tier-driven format and quality selection, post-raster
//! filtering, and the uncompressed fallback when a codec fails.

use crate::{
    config::QualityTable,
    error::{CardpressError, CardpressResult},
    model::{OutputFormat, QualityTier, RenderResult},
};

/// Sharpening applied to every non-preview tier, approximating the original
/// pipeline's output filter.
const SHARPEN_SIGMA: f32 = 1.0;
const SHARPEN_THRESHOLD: i32 = 3;

/// Channel quantization for preview output, 32 levels per channel.
const POSTERIZE_KEEP_BITS: u32 = 5;

/// The format actually encoded: low-bandwidth tiers force JPEG regardless of
/// the request.
pub fn effective_format(tier: QualityTier, requested: OutputFormat) -> OutputFormat {
    match tier {
        QualityTier::Preview | QualityTier::Low => OutputFormat::Jpeg,
        _ => requested,
    }
}

/// Encode a premultiplied RGBA8 canvas into the output bytes for `tier`.
///
/// Falls back to uncompressed BMP if the selected codec fails; only when that
/// also fails does the render as a whole fail.
pub fn encode_canvas(
    premul_rgba8: &[u8],
    width: u32,
    height: u32,
    tier: QualityTier,
    requested: OutputFormat,
    quality: &QualityTable,
) -> CardpressResult<RenderResult> {
    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(4))
        .ok_or_else(|| CardpressError::encoding("canvas size overflow"))?;
    if premul_rgba8.len() != expected {
        return Err(CardpressError::encoding(
            "canvas byte length does not match dimensions",
        ));
    }

    let mut rgba = image::RgbaImage::from_raw(width, height, unpremultiply(premul_rgba8))
        .ok_or_else(|| CardpressError::encoding("canvas buffer rejected by image crate"))?;

    if tier == QualityTier::Preview {
        posterize(&mut rgba, POSTERIZE_KEEP_BITS);
    } else {
        rgba = image::imageops::unsharpen(&rgba, SHARPEN_SIGMA, SHARPEN_THRESHOLD);
    }

    let format = effective_format(tier, requested);
    let q = quality.for_tier(tier);

    match encode_as(&rgba, width, height, format, q) {
        Ok(bytes) => Ok(RenderResult {
            bytes,
            format,
            width,
            height,
        }),
        Err(e) => {
            tracing::warn!(?format, error = %e, "primary codec failed, falling back to bmp");
            let bytes = encode_as(&rgba, width, height, OutputFormat::Bmp, q).map_err(|bmp_e| {
                CardpressError::encoding(format!(
                    "all encoders failed: {e}; bmp fallback: {bmp_e}"
                ))
            })?;
            Ok(RenderResult {
                bytes,
                format: OutputFormat::Bmp,
                width,
                height,
            })
        }
    }
}

fn encode_as(
    rgba: &image::RgbaImage,
    width: u32,
    height: u32,
    format: OutputFormat,
    jpeg_quality: u8,
) -> CardpressResult<Vec<u8>> {
    let mut out = Vec::new();
    match format {
        OutputFormat::Png => {
            let encoder = image::codecs::png::PngEncoder::new(&mut out);
            image::ImageEncoder::write_image(
                encoder,
                rgba.as_raw(),
                width,
                height,
                image::ExtendedColorType::Rgba8,
            )
            .map_err(|e| CardpressError::encoding(format!("png: {e}")))?;
        }
        OutputFormat::Jpeg => {
            // JPEG carries no alpha; the canvas is opaque over its white base.
            let rgb = image::DynamicImage::ImageRgba8(rgba.clone()).to_rgb8();
            let encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, jpeg_quality);
            image::ImageEncoder::write_image(
                encoder,
                rgb.as_raw(),
                width,
                height,
                image::ExtendedColorType::Rgb8,
            )
            .map_err(|e| CardpressError::encoding(format!("jpeg: {e}")))?;
        }
        OutputFormat::Bmp => {
            let encoder = image::codecs::bmp::BmpEncoder::new(&mut out);
            image::ImageEncoder::write_image(
                encoder,
                rgba.as_raw(),
                width,
                height,
                image::ExtendedColorType::Rgba8,
            )
            .map_err(|e| CardpressError::encoding(format!("bmp: {e}")))?;
        }
    }
    Ok(out)
}

fn unpremultiply(premul: &[u8]) -> Vec<u8> {
    let mut out = premul.to_vec();
    for px in out.chunks_exact_mut(4) {
        let a = px[3];
        if a == 0 || a == 255 {
            continue;
        }
        for c in 0..3 {
            let v = (u32::from(px[c]) * 255 + u32::from(a) / 2) / u32::from(a);
            px[c] = v.min(255) as u8;
        }
    }
    out
}

fn posterize(img: &mut image::RgbaImage, keep_bits: u32) {
    let shift = 8 - keep_bits;
    let mask = (0xffu16 << shift) as u8;
    for px in img.pixels_mut() {
        for c in 0..3 {
            px.0[c] &= mask;
        }
    }
}
