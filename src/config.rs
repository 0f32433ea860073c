use serde::Deserialize;

use crate::{color::ColorDef, model::QualityTier};

/// Process-level render configuration.
///
/// `reference_width` must stay in lock-step with the interactive editor's
/// preview canvas width: every reference-relative style quantity (font size,
/// image max dimensions, shadow blur, border width) is scaled by
/// `output_width / reference_width`. A mismatch silently breaks layout
/// fidelity, which is why the value lives in configuration shared with the
/// editor rather than in code.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Editor preview canvas width in pixels.
    pub reference_width: f64,
    /// Dots per inch used when converting paper sizes to pixels.
    pub dpi: f64,
    /// Font family used when a text field names none.
    pub default_font_family: String,
    /// Text color used when a text field names none.
    pub default_text_color: ColorDef,
    /// Per-tier encoder quality percentages.
    pub quality: QualityTable,
    /// Preview cache entry lifetime in seconds.
    pub preview_cache_ttl_secs: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            reference_width: 800.0,
            dpi: 300.0,
            default_font_family: "Cairo".to_string(),
            default_text_color: ColorDef::WHITE,
            quality: QualityTable::default(),
            preview_cache_ttl_secs: 180,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct QualityTable {
    pub preview: u8,
    pub low: u8,
    pub medium: u8,
    pub high: u8,
    pub download: u8,
}

impl Default for QualityTable {
    fn default() -> Self {
        Self {
            preview: 50,
            low: 70,
            medium: 80,
            high: 95,
            download: 95,
        }
    }
}

impl QualityTable {
    pub fn for_tier(&self, tier: QualityTier) -> u8 {
        match tier {
            QualityTier::Preview => self.preview,
            QualityTier::Low => self.low,
            QualityTier::Medium => self.medium,
            QualityTier::High => self.high,
            QualityTier::Download => self.download,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_editor_contract() {
        let cfg = RenderConfig::default();
        assert_eq!(cfg.reference_width, 800.0);
        assert_eq!(cfg.dpi, 300.0);
        assert_eq!(cfg.default_font_family, "Cairo");
        assert_eq!(cfg.quality.for_tier(QualityTier::Preview), 50);
        assert_eq!(cfg.quality.for_tier(QualityTier::Download), 95);
    }

    #[test]
    fn deserializes_partial_config() {
        let cfg: RenderConfig =
            serde_json::from_str(r#"{"reference_width": 1000, "quality": {"preview": 60}}"#)
                .unwrap();
        assert_eq!(cfg.reference_width, 1000.0);
        assert_eq!(cfg.quality.preview, 60);
        assert_eq!(cfg.quality.high, 95);
    }
}
