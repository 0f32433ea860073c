use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    color::ColorDef,
    error::{CardpressError, CardpressResult},
};

/// Background template descriptor. Immutable per render call; authored and
/// persisted by an external collaborator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Template {
    pub id: i64,
    /// Background image reference: absolute path, uploads-relative path or
    /// `data:image/...;base64,` payload, resolved by the storage layer.
    pub image_ref: String,
    #[serde(default)]
    pub orientation: Orientation,
    /// Explicit canvas size in pixels; takes precedence over `paper`.
    #[serde(default)]
    pub custom_size: Option<[u32; 2]>,
    /// Physical paper size converted to pixels at the configured DPI.
    #[serde(default)]
    pub paper: Option<PaperSpec>,
    #[serde(default)]
    pub aspect: AspectPolicy,
    /// Semi-transparent darkening overlay painted over the background to keep
    /// overlaid text legible.
    #[serde(default)]
    pub overlay: bool,
    /// Default shadow toggle for text fields that do not set their own.
    #[serde(default)]
    pub text_shadow: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaperSpec {
    pub width: f64,
    pub height: f64,
    pub unit: PaperUnit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaperUnit {
    Mm,
    Cm,
    Inch,
}

/// Rule for fitting the background image into a differently-proportioned
/// canvas. The wire form is a string: `fit`, `fill` (alias `cover`),
/// `square`, `stretch` or `custom:W:H`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AspectPolicy {
    /// Preserve aspect, centered, letterboxed. The default.
    #[default]
    Fit,
    /// Preserve aspect, centered, cropped to cover the canvas.
    Fill,
    /// Force 1:1, centered crop.
    Square,
    /// Force an explicit W:H ratio.
    Custom { w: u32, h: u32 },
    /// Direct stretch to canvas. Explicit opt-in only.
    Stretch,
}

impl AspectPolicy {
    fn as_wire(&self) -> String {
        match self {
            Self::Fit => "fit".to_string(),
            Self::Fill => "fill".to_string(),
            Self::Square => "square".to_string(),
            Self::Custom { w, h } => format!("custom:{w}:{h}"),
            Self::Stretch => "stretch".to_string(),
        }
    }

    fn from_wire(s: &str) -> Result<Self, String> {
        match s {
            "fit" => Ok(Self::Fit),
            "fill" | "cover" => Ok(Self::Fill),
            "square" => Ok(Self::Square),
            "stretch" => Ok(Self::Stretch),
            other => {
                let Some(ratio) = other.strip_prefix("custom:") else {
                    return Err(format!("unknown aspect policy \"{other}\""));
                };
                let mut it = ratio.split(':');
                let (Some(w), Some(h), None) = (it.next(), it.next(), it.next()) else {
                    return Err("custom aspect policy must be custom:W:H".to_string());
                };
                let w: u32 = w
                    .parse()
                    .map_err(|_| format!("invalid ratio width \"{w}\""))?;
                let h: u32 = h
                    .parse()
                    .map_err(|_| format!("invalid ratio height \"{h}\""))?;
                if w == 0 || h == 0 {
                    return Err("custom aspect ratio terms must be > 0".to_string());
                }
                Ok(Self::Custom { w, h })
            }
        }
    }
}

impl Serialize for AspectPolicy {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_wire())
    }
}

impl<'de> Deserialize<'de> for AspectPolicy {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_wire(&s).map_err(serde::de::Error::custom)
    }
}

/// One positioned overlay element defined against a template.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Unique key into the render request's value map.
    pub name: String,
    #[serde(default)]
    pub position: PercentPos,
    /// Draw-order key; lower draws first, ties keep definition order.
    #[serde(default = "default_layer")]
    pub layer: i32,
    #[serde(flatten)]
    pub style: FieldStyle,
}

fn default_layer() -> i32 {
    1
}

/// Position as percentages of the output canvas, resolution-independent.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PercentPos {
    pub x: f64,
    pub y: f64,
}

impl Default for PercentPos {
    fn default() -> Self {
        Self { x: 50.0, y: 50.0 }
    }
}

/// Closed style schema, tagged by field kind at the load boundary.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", content = "style", rename_all = "lowercase")]
pub enum FieldStyle {
    Text(TextStyle),
    Image(ImageStyle),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TextStyle {
    pub font_family: Option<String>,
    /// Pixels at the editor's reference preview width.
    pub font_size: f64,
    pub font_weight: FontWeight,
    pub color: Option<ColorDef>,
    pub align: Align,
    pub vertical: VerticalAnchor,
    /// Wrap budget as a percentage of the output canvas width.
    pub max_width_pct: Option<f64>,
    pub line_height: f64,
    pub shadow: Option<ShadowStyle>,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_family: None,
            font_size: 24.0,
            font_weight: FontWeight::Normal,
            color: None,
            align: Align::Center,
            vertical: VerticalAnchor::Top,
            max_width_pct: None,
            line_height: 1.3,
            shadow: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageStyle {
    /// Bounding box in pixels at the reference preview width. Defaults to a
    /// quarter of the canvas on each axis.
    pub max_width: Option<f64>,
    pub max_height: Option<f64>,
    pub align: Align,
    pub border: Option<BorderStyle>,
    /// Circular clip.
    pub rounded: bool,
    pub rotation_deg: f64,
    pub opacity: f64,
    pub shadow: Option<ShadowStyle>,
}

impl Default for ImageStyle {
    fn default() -> Self {
        Self {
            max_width: None,
            max_height: None,
            align: Align::Center,
            border: None,
            rounded: false,
            rotation_deg: 0.0,
            opacity: 1.0,
            shadow: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontWeight {
    #[default]
    Normal,
    Bold,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    Left,
    #[default]
    Center,
    Right,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerticalAnchor {
    #[default]
    Top,
    Middle,
    Bottom,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowStyle {
    pub enabled: bool,
    pub color: ColorDef,
    /// Blur radius in pixels at the reference preview width.
    pub blur: f64,
}

impl Default for ShadowStyle {
    fn default() -> Self {
        Self {
            enabled: true,
            color: ColorDef::rgba(0.0, 0.0, 0.0, 0.5),
            blur: 3.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BorderStyle {
    pub enabled: bool,
    pub color: ColorDef,
    /// Stroke width in pixels at the reference preview width.
    pub width: f64,
}

impl Default for BorderStyle {
    fn default() -> Self {
        Self {
            enabled: true,
            color: ColorDef::BLACK,
            width: 2.0,
        }
    }
}

/// Runtime values keyed by field name. Text fields carry the string to draw;
/// image fields carry a byte-source reference (path or data URL). Absent or
/// empty values skip the field.
pub type ValueMap = BTreeMap<String, String>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Preview,
    Low,
    Medium,
    #[default]
    High,
    Download,
}

impl QualityTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Preview => "preview",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Download => "download",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
    Jpeg,
    /// Uncompressed fallback when the primary codec fails; never requested
    /// directly.
    Bmp,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Bmp => "bmp",
        }
    }
}

/// One render invocation: a pure function of its contents plus the font
/// registry and storage layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RenderRequest {
    pub template: Template,
    pub fields: Vec<FieldDefinition>,
    pub values: ValueMap,
    pub output_width: u32,
    pub output_height: u32,
    #[serde(default)]
    pub tier: QualityTier,
    #[serde(default)]
    pub format: OutputFormat,
}

impl RenderRequest {
    pub fn validate(&self) -> CardpressResult<()> {
        if self.output_width == 0 || self.output_height == 0 {
            return Err(CardpressError::invalid_dimensions(format!(
                "output canvas must be positive, got {}x{}",
                self.output_width, self.output_height
            )));
        }

        let mut seen = std::collections::BTreeSet::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(CardpressError::validation("field name must be non-empty"));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(CardpressError::validation(format!(
                    "duplicate field name '{}'",
                    field.name
                )));
            }
            if let FieldStyle::Text(style) = &field.style {
                if !style.font_size.is_finite() || style.font_size <= 0.0 {
                    return Err(CardpressError::validation(format!(
                        "field '{}' font_size must be finite and > 0",
                        field.name
                    )));
                }
                if !style.line_height.is_finite() || style.line_height <= 0.0 {
                    return Err(CardpressError::validation(format!(
                        "field '{}' line_height must be finite and > 0",
                        field.name
                    )));
                }
            }
        }

        if let Some(paper) = &self.template.paper
            && (paper.width <= 0.0 || paper.height <= 0.0)
        {
            return Err(CardpressError::validation("paper dimensions must be > 0"));
        }

        Ok(())
    }
}

/// Encoded output handed back to the caller.
#[derive(Clone)]
pub struct RenderResult {
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Debug for RenderResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderResult")
            .field("bytes_len", &self.bytes.len())
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic_request() -> RenderRequest {
        let mut values = ValueMap::new();
        values.insert("title".to_string(), "hello".to_string());
        RenderRequest {
            template: Template {
                id: 7,
                image_ref: "uploads/bg.png".to_string(),
                orientation: Orientation::Portrait,
                custom_size: None,
                paper: None,
                aspect: AspectPolicy::default(),
                overlay: false,
                text_shadow: false,
            },
            fields: vec![FieldDefinition {
                name: "title".to_string(),
                position: PercentPos { x: 50.0, y: 20.0 },
                layer: 1,
                style: FieldStyle::Text(TextStyle::default()),
            }],
            values,
            output_width: 1000,
            output_height: 1400,
            tier: QualityTier::High,
            format: OutputFormat::Png,
        }
    }

    #[test]
    fn json_roundtrip() {
        let req = basic_request();
        let s = serde_json::to_string_pretty(&req).unwrap();
        let de: RenderRequest = serde_json::from_str(&s).unwrap();
        assert_eq!(de.output_width, 1000);
        assert_eq!(de.fields.len(), 1);
        assert!(matches!(de.fields[0].style, FieldStyle::Text(_)));
    }

    #[test]
    fn field_json_uses_kind_tag() {
        let json = r#"{
            "name": "photo",
            "position": {"x": 10, "y": 90},
            "layer": 3,
            "kind": "image",
            "style": {"rounded": true, "rotation_deg": 15}
        }"#;
        let field: FieldDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(field.layer, 3);
        let FieldStyle::Image(style) = &field.style else {
            panic!("expected image style");
        };
        assert!(style.rounded);
        assert_eq!(style.opacity, 1.0);
    }

    #[test]
    fn aspect_policy_wire_forms() {
        assert_eq!(AspectPolicy::from_wire("fit").unwrap(), AspectPolicy::Fit);
        assert_eq!(
            AspectPolicy::from_wire("cover").unwrap(),
            AspectPolicy::Fill
        );
        assert_eq!(
            AspectPolicy::from_wire("custom:4:3").unwrap(),
            AspectPolicy::Custom { w: 4, h: 3 }
        );
        assert!(AspectPolicy::from_wire("custom:0:3").is_err());
        assert!(AspectPolicy::from_wire("diagonal").is_err());

        let s = serde_json::to_string(&AspectPolicy::Custom { w: 16, h: 9 }).unwrap();
        assert_eq!(s, "\"custom:16:9\"");
    }

    #[test]
    fn validate_rejects_zero_dimensions() {
        let mut req = basic_request();
        req.output_width = 0;
        let err = req.validate().unwrap_err();
        assert!(matches!(err, CardpressError::InvalidDimensions(_)));
    }

    #[test]
    fn validate_rejects_duplicate_field_names() {
        let mut req = basic_request();
        req.fields.push(req.fields[0].clone());
        assert!(req.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_font_size() {
        let mut req = basic_request();
        if let FieldStyle::Text(style) = &mut req.fields[0].style {
            style.font_size = 0.0;
        }
        assert!(req.validate().is_err());
    }
}
