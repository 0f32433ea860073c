//! Background compositing: fitting the template image to the canvas under an
//! aspect policy, repairing orientation mismatches, and the legibility
//! overlay.
//!
//! The white base, the template image and the overlay are recorded into one
//! render context and rasterized together; rasterizing a context replaces the
//! surface contents, so splitting these across contexts would drop the
//! earlier layers.

use crate::{
    error::CardpressResult,
    model::{AspectPolicy, Orientation, Template},
    sources::{AssetStore, DecodedImage, decode_image},
    surface::{Surface, affine_to_cpu, image_paint_from_premul},
};

/// Overlay paint darkening the background under text, rgba(0,0,0,0.3).
const OVERLAY_ALPHA: u8 = 77;

/// Destination rectangle for a `src_w`x`src_h` image on a `canvas_w`x
/// `canvas_h` canvas under `policy`. Pure placement math; the rect may exceed
/// the canvas for covering policies, overflow is cropped at draw time.
pub fn place_background(
    src_w: u32,
    src_h: u32,
    canvas_w: u32,
    canvas_h: u32,
    policy: AspectPolicy,
) -> kurbo::Rect {
    let (cw, ch) = (f64::from(canvas_w), f64::from(canvas_h));
    if src_w == 0 || src_h == 0 {
        return kurbo::Rect::new(0.0, 0.0, cw, ch);
    }
    let src_ratio = f64::from(src_w) / f64::from(src_h);

    let (ratio, cover) = match policy {
        AspectPolicy::Stretch => return kurbo::Rect::new(0.0, 0.0, cw, ch),
        AspectPolicy::Fit => (src_ratio, false),
        AspectPolicy::Fill => (src_ratio, true),
        AspectPolicy::Square => (1.0, true),
        AspectPolicy::Custom { w, h } => (f64::from(w) / f64::from(h), true),
    };

    let canvas_ratio = cw / ch;
    let (dw, dh) = if (ratio > canvas_ratio) != cover {
        // Width-bound for contain, height-bound for cover.
        (cw, cw / ratio)
    } else {
        (ch * ratio, ch)
    };

    let x0 = (cw - dw) / 2.0;
    let y0 = (ch - dh) / 2.0;
    kurbo::Rect::new(x0, y0, x0 + dw, y0 + dh)
}

/// Whether a non-square image disagrees with the template's declared
/// orientation on which axis is the long one.
pub fn orientation_mismatch(src_w: u32, src_h: u32, declared: Orientation) -> bool {
    if src_w == src_h {
        return false;
    }
    match declared {
        Orientation::Portrait => src_w > src_h,
        Orientation::Landscape => src_h > src_w,
    }
}

/// Rotate a premultiplied RGBA8 image 90° clockwise, swapping the axes.
pub fn rotate_90_cw(img: &DecodedImage) -> DecodedImage {
    let (w, h) = (img.width as usize, img.height as usize);
    let mut out = vec![0u8; img.premul_rgba8.len()];
    for y in 0..h {
        for x in 0..w {
            let src = (y * w + x) * 4;
            // (x, y) lands at (h - 1 - y, x) in the rotated image.
            let dst = (x * h + (h - 1 - y)) * 4;
            out[dst..dst + 4].copy_from_slice(&img.premul_rgba8[src..src + 4]);
        }
    }
    DecodedImage {
        width: img.height,
        height: img.width,
        premul_rgba8: out,
    }
}

/// Paint the template background onto `canvas`. An unreadable, undecodable
/// or unpaintable background degrades to the opaque white placeholder with a
/// warning, never a failed render.
pub fn draw_background(
    canvas: &mut Surface,
    store: &dyn AssetStore,
    template: &Template,
) -> CardpressResult<()> {
    let full = vello_cpu::kurbo::Rect::new(
        0.0,
        0.0,
        f64::from(canvas.width()),
        f64::from(canvas.height()),
    );

    let mut ctx = canvas.new_context();

    // White base first: letterboxed and placeholder regions show through it.
    ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(255, 255, 255, 255));
    ctx.fill_rect(&full);

    match load_background(store, template) {
        Ok(decoded) => {
            let decoded = if orientation_mismatch(
                decoded.width,
                decoded.height,
                template.orientation,
            ) {
                tracing::debug!(template = template.id, "rotating background 90 degrees");
                rotate_90_cw(&decoded)
            } else {
                decoded
            };

            let dest = place_background(
                decoded.width,
                decoded.height,
                canvas.width(),
                canvas.height(),
                template.aspect,
            );

            match image_paint_from_premul(&decoded.premul_rgba8, decoded.width, decoded.height) {
                Ok(paint) => {
                    let sx = dest.width() / f64::from(decoded.width);
                    let sy = dest.height() / f64::from(decoded.height);
                    let transform = kurbo::Affine::translate((dest.x0, dest.y0))
                        * kurbo::Affine::scale_non_uniform(sx, sy);

                    ctx.set_transform(affine_to_cpu(transform));
                    ctx.set_paint(paint);
                    ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
                        0.0,
                        0.0,
                        f64::from(decoded.width),
                        f64::from(decoded.height),
                    ));
                    ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
                }
                Err(e) => {
                    tracing::warn!(
                        template = template.id,
                        error = %e,
                        "background not paintable, using placeholder"
                    );
                }
            }
        }
        Err(e) => {
            tracing::warn!(
                template = template.id,
                image_ref = %template.image_ref,
                error = %e,
                "background unavailable, using placeholder"
            );
        }
    }

    if template.overlay {
        ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(0, 0, 0, OVERLAY_ALPHA));
        ctx.fill_rect(&full);
    }

    canvas.render(ctx);
    Ok(())
}

fn load_background(store: &dyn AssetStore, template: &Template) -> CardpressResult<DecodedImage> {
    let bytes = store.read(&template.image_ref)?;
    decode_image(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::error::CardpressError;

    struct MemStore {
        assets: HashMap<String, Vec<u8>>,
    }

    impl MemStore {
        fn new() -> Self {
            Self {
                assets: HashMap::new(),
            }
        }

        fn with_png(mut self, name: &str, img: image::RgbaImage) -> Self {
            let mut buf = std::io::Cursor::new(Vec::new());
            img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
            self.assets.insert(name.to_string(), buf.into_inner());
            self
        }
    }

    impl AssetStore for MemStore {
        fn read(&self, asset_ref: &str) -> CardpressResult<Vec<u8>> {
            self.assets
                .get(asset_ref)
                .cloned()
                .ok_or_else(|| CardpressError::field_asset(asset_ref.to_string()))
        }

        fn persist(&self, _filename: &str, _bytes: &[u8]) -> CardpressResult<String> {
            Err(CardpressError::field_asset("read-only store"))
        }
    }

    fn template(image_ref: &str, orientation: Orientation) -> Template {
        Template {
            id: 1,
            image_ref: image_ref.to_string(),
            orientation,
            custom_size: None,
            paper: None,
            aspect: AspectPolicy::default(),
            overlay: false,
            text_shadow: false,
        }
    }

    fn pixel(canvas: &Surface, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * canvas.width() + x) * 4) as usize;
        let d = canvas.data();
        [d[i], d[i + 1], d[i + 2], d[i + 3]]
    }

    #[test]
    fn fit_letterboxes_wide_image_on_tall_canvas() {
        // 2:1 image on a 400x800 canvas: full width, 200 tall, centered.
        let r = place_background(1000, 500, 400, 800, AspectPolicy::Fit);
        assert_eq!((r.x0, r.y0, r.x1, r.y1), (0.0, 300.0, 400.0, 500.0));
    }

    #[test]
    fn fill_covers_and_overflows() {
        let r = place_background(1000, 500, 400, 800, AspectPolicy::Fill);
        assert_eq!(r.height(), 800.0);
        assert_eq!(r.width(), 1600.0);
        assert_eq!(r.x0, -600.0);
    }

    #[test]
    fn stretch_uses_full_canvas() {
        let r = place_background(1000, 500, 400, 800, AspectPolicy::Stretch);
        assert_eq!((r.x0, r.y0, r.x1, r.y1), (0.0, 0.0, 400.0, 800.0));
    }

    #[test]
    fn square_covers_with_unit_ratio() {
        let r = place_background(1000, 500, 400, 800, AspectPolicy::Square);
        assert_eq!(r.width(), 800.0);
        assert_eq!(r.height(), 800.0);
        assert_eq!(r.x0, -200.0);
    }

    #[test]
    fn custom_ratio_covers() {
        let r = place_background(100, 100, 400, 800, AspectPolicy::Custom { w: 1, h: 2 });
        assert_eq!((r.x0, r.y0, r.x1, r.y1), (0.0, 0.0, 400.0, 800.0));
    }

    #[test]
    fn matching_aspect_fills_exactly() {
        let r = place_background(500, 1000, 400, 800, AspectPolicy::Fit);
        assert_eq!((r.x0, r.y0, r.x1, r.y1), (0.0, 0.0, 400.0, 800.0));
    }

    #[test]
    fn mismatch_is_against_declared_orientation() {
        assert!(orientation_mismatch(1000, 500, Orientation::Portrait));
        assert!(!orientation_mismatch(1000, 500, Orientation::Landscape));
        assert!(orientation_mismatch(500, 1000, Orientation::Landscape));
        assert!(!orientation_mismatch(500, 1000, Orientation::Portrait));
        assert!(!orientation_mismatch(500, 500, Orientation::Portrait));
        assert!(!orientation_mismatch(500, 500, Orientation::Landscape));
    }

    #[test]
    fn rotate_90_swaps_axes_and_moves_pixels() {
        // 2x1 image: [A B] rotates clockwise to a 1x2 column [A; B].
        let img = DecodedImage {
            width: 2,
            height: 1,
            premul_rgba8: vec![1, 1, 1, 255, 2, 2, 2, 255],
        };
        let rot = rotate_90_cw(&img);
        assert_eq!((rot.width, rot.height), (1, 2));
        assert_eq!(&rot.premul_rgba8[0..4], &[1, 1, 1, 255]);
        assert_eq!(&rot.premul_rgba8[4..8], &[2, 2, 2, 255]);
    }

    #[test]
    fn missing_background_leaves_opaque_white_canvas() {
        let store = MemStore::new();
        let mut canvas = Surface::new(4, 4).unwrap();
        draw_background(&mut canvas, &store, &template("nope.png", Orientation::Portrait))
            .unwrap();
        for px in canvas.data().chunks_exact(4) {
            assert_eq!(px, &[255, 255, 255, 255]);
        }
    }

    #[test]
    fn letterbox_regions_keep_the_white_base() {
        // 8x4 red image, declared landscape (no rotation), 8x8 canvas:
        // rows 2..6 red, rows above and below white.
        let store = MemStore::new().with_png(
            "bg.png",
            image::RgbaImage::from_pixel(8, 4, image::Rgba([255, 0, 0, 255])),
        );
        let mut canvas = Surface::new(8, 8).unwrap();
        draw_background(&mut canvas, &store, &template("bg.png", Orientation::Landscape))
            .unwrap();

        assert_eq!(pixel(&canvas, 4, 0), [255, 255, 255, 255]);
        assert_eq!(pixel(&canvas, 4, 4), [255, 0, 0, 255]);
        assert_eq!(pixel(&canvas, 4, 7), [255, 255, 255, 255]);
    }

    #[test]
    fn overlay_darkens_image_and_base_together() {
        let store = MemStore::new().with_png(
            "bg.png",
            image::RgbaImage::from_pixel(4, 4, image::Rgba([255, 255, 255, 255])),
        );
        let mut t = template("bg.png", Orientation::Portrait);
        t.overlay = true;

        let mut canvas = Surface::new(4, 4).unwrap();
        draw_background(&mut canvas, &store, &t).unwrap();

        // White under rgba(0,0,0,0.3) is ~178, and the result stays opaque.
        let px = pixel(&canvas, 2, 2);
        assert_eq!(px[3], 255);
        assert!((i32::from(px[0]) - 178).abs() <= 4, "{px:?}");
    }

    #[test]
    fn declared_portrait_rotates_landscape_image() {
        // 8x4 image, left half red, right half blue. Rotated clockwise for a
        // portrait template the red half ends up on top.
        let mut img = image::RgbaImage::from_pixel(8, 4, image::Rgba([0, 0, 255, 255]));
        for y in 0..4 {
            for x in 0..4 {
                img.put_pixel(x, y, image::Rgba([255, 0, 0, 255]));
            }
        }
        let store = MemStore::new().with_png("bg.png", img);

        let mut canvas = Surface::new(8, 8).unwrap();
        draw_background(&mut canvas, &store, &template("bg.png", Orientation::Portrait))
            .unwrap();

        // Rotated 4x8 image letterboxed to columns 2..6, full height.
        assert_eq!(pixel(&canvas, 4, 1), [255, 0, 0, 255]);
        assert_eq!(pixel(&canvas, 4, 6), [0, 0, 255, 255]);
        assert_eq!(pixel(&canvas, 0, 4), [255, 255, 255, 255]);
    }

    #[test]
    fn unpaintable_background_degrades_to_placeholder() {
        // Wider than a surface allows: decodes fine, cannot become a paint.
        let store = MemStore::new().with_png(
            "huge.png",
            image::RgbaImage::from_pixel(70_000, 1, image::Rgba([255, 0, 0, 255])),
        );
        let mut canvas = Surface::new(4, 4).unwrap();
        draw_background(&mut canvas, &store, &template("huge.png", Orientation::Landscape))
            .unwrap();
        for px in canvas.data().chunks_exact(4) {
            assert_eq!(px, &[255, 255, 255, 255]);
        }
    }
}
