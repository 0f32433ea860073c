#![forbid(unsafe_code)]

//! Template overlay compositor: renders text and image fields onto a
//! background template so the output reproduces, in relative layout, what an
//! interactive editor previewed at a different canvas width.

pub mod background;
pub mod blur;
pub mod cache;
pub mod color;
pub mod compose;
pub mod composite;
pub mod config;
pub mod encode;
pub mod error;
pub mod fields;
pub mod fonts;
pub mod model;
pub mod scale;
pub mod shape;
pub mod sources;
pub mod surface;

pub use color::ColorDef;
pub use compose::Compositor;
pub use config::{QualityTable, RenderConfig};
pub use error::{CardpressError, CardpressResult};
pub use fonts::FontRegistry;
pub use model::{
    AspectPolicy, FieldDefinition, FieldStyle, OutputFormat, QualityTier, RenderRequest,
    RenderResult, Template, ValueMap,
};
pub use sources::{AssetStore, DiskStore};
