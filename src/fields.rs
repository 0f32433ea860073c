//! Field rendering: layer sequencing, text and image field rasterization,
//! and the per-field shadow/composite pipeline.
//!
//! Each field draws into its own scratch surface which is then composited
//! over the canvas, so a half-drawn failing field never leaks pixels and
//! shadows can be derived from the field's alpha alone.

use kurbo::Shape as _;

use crate::{
    blur::blur_coverage,
    composite::{coverage_of, over_in_place, tint_coverage},
    config::RenderConfig,
    error::{CardpressError, CardpressResult},
    fonts::{FontRegistry, TextBrushRgba8, TextEngine},
    model::{
        Align, BorderStyle, FieldDefinition, FieldStyle, ImageStyle, ShadowStyle, Template,
        TextStyle, ValueMap, VerticalAnchor,
    },
    scale::{font_px, percent_to_px},
    sources::{AssetStore, decode_image},
    surface::{Surface, affine_to_cpu, bezpath_to_cpu, image_paint_from_premul, rect_to_cpu},
};

/// Reference-width margin subtracted from the canvas for the default wrap
/// budget when a text style sets no max width.
const DEFAULT_WRAP_MARGIN_REF_PX: f64 = 100.0;

/// Draw order: ascending layer, definition order for equal layers.
pub fn sequence_fields(fields: &[FieldDefinition]) -> Vec<&FieldDefinition> {
    let mut out: Vec<&FieldDefinition> = fields.iter().collect();
    out.sort_by_key(|f| f.layer);
    out
}

/// Everything a field draw needs beyond the field itself.
pub struct FieldContext<'a> {
    pub config: &'a RenderConfig,
    pub registry: &'a FontRegistry,
    pub store: &'a dyn AssetStore,
    pub template: &'a Template,
    /// output_width / reference_width, applied to reference-relative style
    /// quantities.
    pub scale: f64,
}

/// Render every field with a value onto `canvas`, in layer order. A failing
/// field is logged and skipped; the render carries on with the rest.
pub fn render_fields(
    canvas: &mut Surface,
    fctx: &FieldContext<'_>,
    fields: &[FieldDefinition],
    values: &ValueMap,
) -> CardpressResult<()> {
    let mut engine = TextEngine::new();

    for field in sequence_fields(fields) {
        let Some(value) = values.get(&field.name).filter(|v| !v.trim().is_empty()) else {
            tracing::debug!(field = %field.name, "no value, skipping field");
            continue;
        };

        let outcome = match &field.style {
            FieldStyle::Text(style) => {
                render_text_field(canvas, fctx, &mut engine, field, style, value)
            }
            FieldStyle::Image(style) => render_image_field(canvas, fctx, field, style, value),
        };

        if let Err(e) = outcome {
            tracing::warn!(field = %field.name, error = %e, "field failed, skipping");
        }
    }
    Ok(())
}

fn render_text_field(
    canvas: &mut Surface,
    fctx: &FieldContext<'_>,
    engine: &mut TextEngine,
    field: &FieldDefinition,
    style: &TextStyle,
    value: &str,
) -> CardpressResult<()> {
    let family = style
        .font_family
        .as_deref()
        .unwrap_or(&fctx.config.default_font_family);
    let (family_key, font_bytes) = fctx
        .registry
        .resolve(family, &fctx.config.default_font_family)?;

    let font_size_px = font_px(style.font_size, fctx.scale) as f32;
    let line_height_px = (f64::from(font_size_px) * style.line_height).round();

    let budget = match style.max_width_pct {
        Some(pct) => f64::from(percent_to_px(pct, canvas.width())),
        None => f64::from(canvas.width()) - DEFAULT_WRAP_MARGIN_REF_PX * fctx.scale,
    };

    let mut measure = |s: &str| {
        engine.measure(s, &family_key, &font_bytes, font_size_px, style.font_weight)
    };
    let lines = crate::shape::wrap_text(value, budget, &mut measure)?;
    if lines.is_empty() {
        return Ok(());
    }

    let color = style.color.unwrap_or(fctx.config.default_text_color);
    let [r, g, b, a] = color.to_rgba8();
    let brush = TextBrushRgba8 { r, g, b, a };

    let anchor_x = f64::from(percent_to_px(field.position.x, canvas.width()));
    let anchor_y = f64::from(percent_to_px(field.position.y, canvas.height()));

    // Each line is anchored by its vertical center (the editor draws with a
    // middle baseline), so the block start depends on the anchor mode.
    let total = line_height_px * lines.len() as f64;
    let first_center_y = match style.vertical {
        VerticalAnchor::Top => anchor_y,
        VerticalAnchor::Middle => anchor_y - total / 2.0 + line_height_px / 2.0,
        VerticalAnchor::Bottom => anchor_y - total + line_height_px / 2.0,
    };

    let mut scratch = Surface::new(canvas.width(), canvas.height())?;
    let mut ctx = scratch.new_context();
    let font = engine.font_data(&font_bytes);

    for (i, line) in lines.iter().enumerate() {
        if line.is_empty() {
            continue;
        }
        let layout = engine.layout_line(
            line,
            &family_key,
            &font_bytes,
            font_size_px,
            style.font_weight,
            brush,
        )?;

        let line_w = f64::from(layout.width());
        let x = match style.align {
            Align::Left => anchor_x,
            Align::Center => anchor_x - line_w / 2.0,
            Align::Right => anchor_x - line_w,
        };
        let center_y = first_center_y + line_height_px * i as f64;
        let y = center_y - f64::from(layout.height()) / 2.0;

        ctx.set_transform(affine_to_cpu(kurbo::Affine::translate((
            x.round(),
            y.round(),
        ))));

        for layout_line in layout.lines() {
            for item in layout_line.items() {
                let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                    continue;
                };
                let brush = run.style().brush;
                ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                    brush.r, brush.g, brush.b, brush.a,
                ));
                let glyphs = run.glyphs().map(|g| vello_cpu::Glyph {
                    id: g.id,
                    x: g.x,
                    y: g.y,
                });
                ctx.glyph_run(&font)
                    .font_size(run.run().font_size())
                    .fill_glyphs(glyphs);
            }
        }
    }
    scratch.render(ctx);

    let shadow = resolve_text_shadow(style, fctx.template);
    composite_field(canvas, &scratch, shadow.as_ref(), fctx.scale, 1.0)
}

/// A text style's own shadow wins; absent one, the template-level toggle
/// supplies the defaults.
fn resolve_text_shadow(style: &TextStyle, template: &Template) -> Option<ShadowStyle> {
    match &style.shadow {
        Some(s) => s.enabled.then(|| s.clone()),
        None => template.text_shadow.then(ShadowStyle::default),
    }
}

fn render_image_field(
    canvas: &mut Surface,
    fctx: &FieldContext<'_>,
    field: &FieldDefinition,
    style: &ImageStyle,
    value: &str,
) -> CardpressResult<()> {
    let bytes = fctx.store.read(value)?;
    let img = decode_image(&bytes)?;

    // Bounding box: styled dims are reference pixels, the fallback is a
    // quarter of the canvas per axis.
    let box_w = style
        .max_width
        .map_or(f64::from(canvas.width()) / 4.0, |w| w * fctx.scale);
    let box_h = style
        .max_height
        .map_or(f64::from(canvas.height()) / 4.0, |h| h * fctx.scale);
    if box_w <= 0.0 || box_h <= 0.0 {
        return Err(CardpressError::validation("image box must be positive"));
    }

    let (disp_w, disp_h) = fit_within(img.width, img.height, box_w, box_h);

    let anchor_x = f64::from(percent_to_px(field.position.x, canvas.width()));
    let anchor_y = f64::from(percent_to_px(field.position.y, canvas.height()));
    let x0 = match style.align {
        Align::Left => anchor_x,
        Align::Center => anchor_x - disp_w / 2.0,
        Align::Right => anchor_x - disp_w,
    };
    let y0 = anchor_y - disp_h / 2.0;

    let rotation = if style.rotation_deg != 0.0 {
        let pivot = kurbo::Point::new(anchor_x, anchor_y);
        kurbo::Affine::translate(pivot.to_vec2())
            * kurbo::Affine::rotate(style.rotation_deg.to_radians())
            * kurbo::Affine::translate(-pivot.to_vec2())
    } else {
        kurbo::Affine::IDENTITY
    };
    let local = rotation * kurbo::Affine::translate((x0, y0));

    let paint = image_paint_from_premul(&img.premul_rgba8, img.width, img.height)?;
    let paint_scale = kurbo::Affine::scale_non_uniform(
        disp_w / f64::from(img.width),
        disp_h / f64::from(img.height),
    );

    let mut scratch = Surface::new(canvas.width(), canvas.height())?;
    let mut ctx = scratch.new_context();
    ctx.set_transform(affine_to_cpu(local));
    ctx.set_paint_transform(affine_to_cpu(paint_scale));
    ctx.set_paint(paint);

    if style.rounded {
        let circle = inscribed_circle(disp_w, disp_h);
        ctx.fill_path(&bezpath_to_cpu(&circle.to_path(0.1)));
    } else {
        ctx.fill_rect(&rect_to_cpu(kurbo::Rect::new(0.0, 0.0, disp_w, disp_h)));
    }

    if let Some(border) = &style.border
        && border.enabled
    {
        draw_border(&mut ctx, border, style.rounded, disp_w, disp_h, fctx.scale);
    }
    scratch.render(ctx);

    let shadow = style.shadow.as_ref().filter(|s| s.enabled).cloned();
    composite_field(
        canvas,
        &scratch,
        shadow.as_ref(),
        fctx.scale,
        style.opacity.clamp(0.0, 1.0) as f32,
    )
}

/// Largest width/height preserving `src` aspect inside the box, never larger
/// than the image's natural size. Small images stay sharp instead of being
/// stretched to fill the box.
pub fn fit_within(src_w: u32, src_h: u32, box_w: f64, box_h: f64) -> (f64, f64) {
    if src_w == 0 || src_h == 0 {
        return (0.0, 0.0);
    }
    let s = (box_w / f64::from(src_w))
        .min(box_h / f64::from(src_h))
        .min(1.0);
    (f64::from(src_w) * s, f64::from(src_h) * s)
}

fn inscribed_circle(w: f64, h: f64) -> kurbo::Circle {
    kurbo::Circle::new((w / 2.0, h / 2.0), w.min(h) / 2.0)
}

fn draw_border(
    ctx: &mut vello_cpu::RenderContext,
    border: &BorderStyle,
    rounded: bool,
    w: f64,
    h: f64,
    scale: f64,
) {
    let bw = (border.width * scale).max(1.0);
    let [r, g, b, a] = border.color.to_rgba8();
    ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
    ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(r, g, b, a));

    if rounded {
        let outer = inscribed_circle(w, h);
        let inner = kurbo::Circle::new(outer.center, (outer.radius - bw).max(0.0));
        let mut ring = outer.to_path(0.1);
        ring.extend(inner.to_path(0.1).reverse_subpaths());
        ctx.fill_path(&bezpath_to_cpu(&ring));
    } else {
        for rect in [
            kurbo::Rect::new(0.0, 0.0, w, bw),
            kurbo::Rect::new(0.0, h - bw, w, h),
            kurbo::Rect::new(0.0, bw, bw, h - bw),
            kurbo::Rect::new(w - bw, bw, w, h - bw),
        ] {
            ctx.fill_rect(&rect_to_cpu(rect));
        }
    }
}

/// Composite a field's scratch surface onto the canvas, drawing its blurred
/// shadow plate first when a shadow applies.
fn composite_field(
    canvas: &mut Surface,
    scratch: &Surface,
    shadow: Option<&ShadowStyle>,
    scale: f64,
    opacity: f32,
) -> CardpressResult<()> {
    if let Some(shadow) = shadow {
        let blur_px = (shadow.blur * scale).max(0.0);
        let radius = blur_px.ceil() as u32;

        // The plate is the shadow tint weighted by the field's coverage;
        // blur is linear, so blurring coverage alone gives the same plate.
        let mut coverage = coverage_of(scratch.data())?;
        if radius > 0 {
            let sigma = (blur_px / 2.0).max(0.5) as f32;
            coverage = blur_coverage(&coverage, canvas.width(), canvas.height(), radius, sigma)?;
        }
        let plate = tint_coverage(&coverage, shadow.color.to_rgba8_premul());
        over_in_place(canvas.data_mut(), &plate, opacity)?;
    }

    over_in_place(canvas.data_mut(), scratch.data(), opacity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldStyle, PercentPos, TextStyle};

    fn field(name: &str, layer: i32) -> FieldDefinition {
        FieldDefinition {
            name: name.to_string(),
            position: PercentPos::default(),
            layer,
            style: FieldStyle::Text(TextStyle::default()),
        }
    }

    #[test]
    fn sequence_sorts_ascending_by_layer() {
        let fields = vec![field("c", 3), field("a", 1), field("b", 2)];
        let ordered: Vec<_> = sequence_fields(&fields).iter().map(|f| f.layer).collect();
        assert_eq!(ordered, vec![1, 2, 3]);
    }

    #[test]
    fn sequence_keeps_definition_order_on_ties() {
        let fields = vec![field("first", 2), field("second", 2), field("zero", 1)];
        let names: Vec<_> = sequence_fields(&fields)
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, vec!["zero", "first", "second"]);
    }

    #[test]
    fn fit_within_preserves_aspect() {
        // 2:1 image in a 300x300 box displays at 300x150.
        assert_eq!(fit_within(1000, 500, 300.0, 300.0), (300.0, 150.0));
        assert_eq!(fit_within(0, 10, 300.0, 300.0), (0.0, 0.0));
    }

    #[test]
    fn fit_within_never_upscales() {
        assert_eq!(fit_within(10, 10, 300.0, 300.0), (10.0, 10.0));
        assert_eq!(fit_within(100, 100, 300.0, 400.0), (100.0, 100.0));
        // A box smaller on one axis still scales down.
        assert_eq!(fit_within(100, 100, 50.0, 400.0), (50.0, 50.0));
    }

    #[test]
    fn text_shadow_resolution() {
        let mut template = Template {
            id: 1,
            image_ref: String::new(),
            orientation: Default::default(),
            custom_size: None,
            paper: None,
            aspect: Default::default(),
            overlay: false,
            text_shadow: false,
        };
        let mut style = TextStyle::default();

        assert!(resolve_text_shadow(&style, &template).is_none());

        template.text_shadow = true;
        assert!(resolve_text_shadow(&style, &template).is_some());

        style.shadow = Some(ShadowStyle {
            enabled: false,
            ..Default::default()
        });
        assert!(resolve_text_shadow(&style, &template).is_none());
    }
}
