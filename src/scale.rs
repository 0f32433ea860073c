//! Scale resolution: the single bridge between editor-reference coordinates
//! and output-canvas pixels.

use crate::{
    error::{CardpressError, CardpressResult},
    model::{Orientation, PaperSpec, PaperUnit, Template},
};

pub const MM_PER_INCH: f64 = 25.4;

/// Ratio relating the requested output width to the editor's reference
/// preview width. Applied to every reference-relative style quantity and to
/// nothing else; percentage positions are resolution-independent already.
pub fn scale_factor(output_width: u32, reference_width: f64) -> f64 {
    f64::from(output_width) / reference_width
}

/// Percentage position to whole output pixels. Out-of-range input is clamped
/// to [0, 100], never rejected.
pub fn percent_to_px(percent: f64, extent: u32) -> i32 {
    let clamped = percent.clamp(0.0, 100.0);
    ((clamped / 100.0) * f64::from(extent)).round() as i32
}

/// Font size in output pixels: the reference size scaled, then rounded to a
/// whole pixel the way the editor rounds before drawing. Fractional sizes
/// would otherwise wrap differently across output widths.
pub fn font_px(reference_size: f64, scale: f64) -> f64 {
    (reference_size * scale).round()
}

/// Inverse of [`percent_to_px`], used to map editor pixel positions back to
/// percentages.
pub fn px_to_percent(px: i32, extent: u32) -> f64 {
    if extent == 0 {
        return 0.0;
    }
    (f64::from(px) / f64::from(extent) * 100.0).clamp(0.0, 100.0)
}

/// Physical paper size to pixels at `dpi`, swapping axes for landscape
/// orientation so the long edge follows the page.
pub fn paper_to_pixels(
    paper: &PaperSpec,
    orientation: Orientation,
    dpi: f64,
) -> CardpressResult<(u32, u32)> {
    if paper.width <= 0.0 || paper.height <= 0.0 {
        return Err(CardpressError::invalid_dimensions(
            "paper dimensions must be > 0",
        ));
    }

    let px_per_unit = match paper.unit {
        PaperUnit::Mm => dpi / MM_PER_INCH,
        PaperUnit::Cm => dpi / (MM_PER_INCH / 10.0),
        PaperUnit::Inch => dpi,
    };

    let w = (paper.width * px_per_unit).round() as u32;
    let h = (paper.height * px_per_unit).round() as u32;

    let (short, long) = if w <= h { (w, h) } else { (h, w) };
    let (w, h) = match orientation {
        Orientation::Portrait => (short, long),
        Orientation::Landscape => (long, short),
    };

    if w == 0 || h == 0 {
        return Err(CardpressError::invalid_dimensions(
            "paper size rounds to a zero-pixel canvas",
        ));
    }
    Ok((w, h))
}

/// Resolve the output canvas: explicit template size wins, then paper size at
/// the configured DPI, then the caller-supplied dimensions.
pub fn resolve_canvas(
    template: &Template,
    requested_width: u32,
    requested_height: u32,
    dpi: f64,
) -> CardpressResult<(u32, u32)> {
    if let Some([w, h]) = template.custom_size {
        if w == 0 || h == 0 {
            return Err(CardpressError::invalid_dimensions(
                "template custom size must be positive",
            ));
        }
        return Ok((w, h));
    }

    if let Some(paper) = &template.paper {
        return paper_to_pixels(paper, template.orientation, dpi);
    }

    if requested_width == 0 || requested_height == 0 {
        return Err(CardpressError::invalid_dimensions(format!(
            "output canvas must be positive, got {requested_width}x{requested_height}"
        )));
    }
    Ok((requested_width, requested_height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AspectPolicy, Orientation};

    fn template() -> Template {
        Template {
            id: 1,
            image_ref: "bg.png".to_string(),
            orientation: Orientation::Portrait,
            custom_size: None,
            paper: None,
            aspect: AspectPolicy::default(),
            overlay: false,
            text_shadow: false,
        }
    }

    #[test]
    fn scale_factor_is_output_over_reference() {
        assert_eq!(scale_factor(1600, 800.0), 2.0);
        assert_eq!(scale_factor(400, 800.0), 0.5);
        assert_eq!(scale_factor(2000, 800.0), 2.5);
    }

    #[test]
    fn percent_round_trips_within_tolerance() {
        for &(p, extent) in &[(0.0, 1000u32), (50.0, 1000), (100.0, 1000), (33.3, 777)] {
            let px = percent_to_px(p, extent);
            let back = px_to_percent(px, extent);
            assert!(
                (back - p).abs() <= 100.0 / f64::from(extent),
                "p={p} extent={extent} px={px} back={back}"
            );
        }
    }

    #[test]
    fn font_px_rounds_to_whole_pixels() {
        assert_eq!(font_px(24.0, 1.0), 24.0);
        assert_eq!(font_px(24.0, 2.5), 60.0);
        // 24 * 1.3 = 31.2 rounds down, 24 * 1.35 = 32.4 still rounds to 32.
        assert_eq!(font_px(24.0, 1.3), 31.0);
        assert_eq!(font_px(24.0, 1.35), 32.0);
    }

    #[test]
    fn percent_clamps_out_of_range() {
        assert_eq!(percent_to_px(-20.0, 1000), 0);
        assert_eq!(percent_to_px(140.0, 1000), 1000);
    }

    #[test]
    fn a4_at_300dpi() {
        let paper = PaperSpec {
            width: 210.0,
            height: 297.0,
            unit: PaperUnit::Mm,
        };
        let (w, h) = paper_to_pixels(&paper, Orientation::Portrait, 300.0).unwrap();
        assert_eq!((w, h), (2480, 3508));

        let (w, h) = paper_to_pixels(&paper, Orientation::Landscape, 300.0).unwrap();
        assert_eq!((w, h), (3508, 2480));
    }

    #[test]
    fn cm_and_inch_units() {
        let paper = PaperSpec {
            width: 1.0,
            height: 2.0,
            unit: PaperUnit::Inch,
        };
        assert_eq!(
            paper_to_pixels(&paper, Orientation::Portrait, 300.0).unwrap(),
            (300, 600)
        );

        let paper = PaperSpec {
            width: 2.54,
            height: 5.08,
            unit: PaperUnit::Cm,
        };
        assert_eq!(
            paper_to_pixels(&paper, Orientation::Portrait, 300.0).unwrap(),
            (300, 600)
        );
    }

    #[test]
    fn canvas_prefers_custom_size_then_paper_then_request() {
        let mut t = template();
        t.custom_size = Some([640, 480]);
        t.paper = Some(PaperSpec {
            width: 210.0,
            height: 297.0,
            unit: PaperUnit::Mm,
        });
        assert_eq!(resolve_canvas(&t, 1200, 1600, 300.0).unwrap(), (640, 480));

        t.custom_size = None;
        assert_eq!(resolve_canvas(&t, 1200, 1600, 300.0).unwrap(), (2480, 3508));

        t.paper = None;
        assert_eq!(resolve_canvas(&t, 1200, 1600, 300.0).unwrap(), (1200, 1600));
    }

    #[test]
    fn zero_request_is_invalid() {
        let t = template();
        assert!(matches!(
            resolve_canvas(&t, 0, 100, 300.0),
            Err(CardpressError::InvalidDimensions(_))
        ));
    }
}
