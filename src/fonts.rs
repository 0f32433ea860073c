use std::{collections::HashMap, path::Path, sync::Arc};

use crate::{
    error::{CardpressError, CardpressResult},
    model::FontWeight,
};

/// RGBA8 brush color carried through Parley layouts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextBrushRgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

/// Process-wide font registry: family name to raw font bytes.
///
/// Populated once during startup and injected into the compositor, so tests
/// can substitute a minimal font set without touching global state. Read-only
/// after construction; share via `Arc`.
#[derive(Clone, Debug, Default)]
pub struct FontRegistry {
    families: HashMap<String, Arc<Vec<u8>>>,
}

impl FontRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_bytes(&mut self, family: impl Into<String>, bytes: Vec<u8>) {
        self.families.insert(family.into(), Arc::new(bytes));
    }

    /// Load every ttf/otf/ttc file in `dir`, keyed by file stem. Unreadable
    /// entries are skipped with a warning; a missing directory is not an
    /// error.
    pub fn load_dir(&mut self, dir: &Path) {
        let Ok(rd) = std::fs::read_dir(dir) else {
            return;
        };

        for entry in rd.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(ext) = path.extension().and_then(|s| s.to_str()) else {
                continue;
            };
            let ext = ext.to_ascii_lowercase();
            if ext != "ttf" && ext != "otf" && ext != "ttc" {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match std::fs::read(&path) {
                Ok(bytes) => self.register_bytes(stem.to_string(), bytes),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable font file");
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    /// Exact family lookup, then `fallback` family, then any registered
    /// family so a misnamed style still renders in *some* script-appropriate
    /// face rather than dropping the field.
    pub fn resolve(&self, family: &str, fallback: &str) -> CardpressResult<(String, Arc<Vec<u8>>)> {
        if let Some(bytes) = self.families.get(family) {
            return Ok((family.to_string(), bytes.clone()));
        }
        if let Some(bytes) = self.families.get(fallback) {
            tracing::warn!(requested = family, fallback, "font family not registered, using fallback");
            return Ok((fallback.to_string(), bytes.clone()));
        }
        if let Some((name, bytes)) = self.families.iter().next() {
            tracing::warn!(requested = family, using = %name, "neither requested nor fallback family registered");
            return Ok((name.clone(), bytes.clone()));
        }
        Err(CardpressError::font(format!(
            "no fonts registered (requested family '{family}')"
        )))
    }
}

/// Render-scoped helper for building Parley text layouts from registry font
/// bytes. One engine per render call; Parley contexts are not shared across
/// threads.
pub struct TextEngine {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<TextBrushRgba8>,
    registered: HashMap<String, String>,
}

impl Default for TextEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TextEngine {
    pub fn new() -> Self {
        Self {
            font_ctx: parley::FontContext::default(),
            layout_ctx: parley::LayoutContext::new(),
            registered: HashMap::new(),
        }
    }

    fn ensure_family(&mut self, key: &str, bytes: &Arc<Vec<u8>>) -> CardpressResult<String> {
        if let Some(name) = self.registered.get(key) {
            return Ok(name.clone());
        }

        let families = self
            .font_ctx
            .collection
            .register_fonts(parley::fontique::Blob::from(bytes.as_ref().clone()), None);
        let family_id = families.first().map(|(id, _)| *id).ok_or_else(|| {
            CardpressError::font(format!("no font families registered from '{key}' bytes"))
        })?;
        let family_name = self
            .font_ctx
            .collection
            .family_name(family_id)
            .ok_or_else(|| CardpressError::font(format!("font family '{key}' has no name")))?
            .to_string();

        self.registered.insert(key.to_string(), family_name.clone());
        Ok(family_name)
    }

    /// Shape and lay out a single line (no wrapping) ready for glyph drawing.
    pub fn layout_line(
        &mut self,
        text: &str,
        family_key: &str,
        font_bytes: &Arc<Vec<u8>>,
        size_px: f32,
        weight: FontWeight,
        brush: TextBrushRgba8,
    ) -> CardpressResult<parley::Layout<TextBrushRgba8>> {
        if !size_px.is_finite() || size_px <= 0.0 {
            return Err(CardpressError::validation(
                "text size_px must be finite and > 0",
            ));
        }

        let family_name = self.ensure_family(family_key, font_bytes)?;

        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(std::borrow::Cow::Owned(family_name)),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(size_px));
        builder.push_default(parley::style::StyleProperty::FontWeight(match weight {
            FontWeight::Normal => parley::style::FontWeight::NORMAL,
            FontWeight::Bold => parley::style::FontWeight::BOLD,
        }));
        builder.push_default(parley::style::StyleProperty::Brush(brush));

        let mut layout: parley::Layout<TextBrushRgba8> = builder.build(text);
        layout.break_all_lines(None);
        Ok(layout)
    }

    /// Advance width of `text` at `size_px`, the measurement the wrapping
    /// algorithm budgets against.
    pub fn measure(
        &mut self,
        text: &str,
        family_key: &str,
        font_bytes: &Arc<Vec<u8>>,
        size_px: f32,
        weight: FontWeight,
    ) -> CardpressResult<f64> {
        let layout = self.layout_line(
            text,
            family_key,
            font_bytes,
            size_px,
            weight,
            TextBrushRgba8::default(),
        )?;
        Ok(f64::from(layout.width()))
    }

    /// Raw bytes of the font backing `family_key`, as registered by
    /// [`Self::layout_line`], in the form the CPU glyph renderer consumes.
    pub fn font_data(&self, bytes: &Arc<Vec<u8>>) -> vello_cpu::peniko::FontData {
        vello_cpu::peniko::FontData::new(vello_cpu::peniko::Blob::from(bytes.as_ref().clone()), 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_registry_is_a_font_error() {
        let reg = FontRegistry::new();
        let err = reg.resolve("Cairo", "Cairo").unwrap_err();
        assert!(matches!(err, CardpressError::FontUnavailable(_)));
    }

    #[test]
    fn resolve_prefers_exact_then_fallback_then_any() {
        let mut reg = FontRegistry::new();
        reg.register_bytes("Amiri", vec![1, 2, 3]);
        reg.register_bytes("Cairo", vec![4, 5, 6]);

        let (name, _) = reg.resolve("Amiri", "Cairo").unwrap();
        assert_eq!(name, "Amiri");

        let (name, _) = reg.resolve("Tajawal", "Cairo").unwrap();
        assert_eq!(name, "Cairo");

        let (name, _) = reg.resolve("Tajawal", "Missing").unwrap();
        assert!(name == "Amiri" || name == "Cairo");
    }

    #[test]
    fn load_dir_ignores_missing_directory() {
        let mut reg = FontRegistry::new();
        reg.load_dir(Path::new("/nonexistent/fonts"));
        assert!(reg.is_empty());
    }

    #[test]
    fn engine_rejects_nonpositive_size() {
        let mut engine = TextEngine::new();
        let bytes = Arc::new(vec![0u8; 4]);
        let err = engine
            .layout_line("x", "k", &bytes, 0.0, FontWeight::Normal, TextBrushRgba8::default())
            .err();
        assert!(matches!(err, Some(CardpressError::Validation(_))));
    }
}
