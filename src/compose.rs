//! The compositor facade: one entry point that takes a render request and
//! returns encoded bytes, owning the fallback ladder along the way.

use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use sha2::{Digest, Sha256};

use crate::{
    background::draw_background,
    cache::{PreviewCache, cache_key},
    config::RenderConfig,
    encode::encode_canvas,
    error::CardpressResult,
    fields::{FieldContext, render_fields},
    fonts::FontRegistry,
    model::{QualityTier, RenderRequest, RenderResult},
    scale::{resolve_canvas, scale_factor},
    sources::AssetStore,
    surface::Surface,
};

/// Stateless apart from configuration, shared collaborators and the preview
/// cache; callers may render from multiple threads concurrently.
pub struct Compositor {
    config: RenderConfig,
    registry: Arc<FontRegistry>,
    store: Arc<dyn AssetStore>,
    preview_cache: PreviewCache,
}

impl Compositor {
    pub fn new(
        config: RenderConfig,
        registry: Arc<FontRegistry>,
        store: Arc<dyn AssetStore>,
    ) -> Self {
        let ttl = Duration::from_secs(config.preview_cache_ttl_secs);
        Self {
            config,
            registry,
            store,
            preview_cache: PreviewCache::new(ttl),
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Render `request` to encoded bytes.
    ///
    /// Field-level failures degrade (skip the field, keep the render);
    /// invalid dimensions and total encoding failure are the fatal errors.
    #[tracing::instrument(
        skip(self, request),
        fields(template = request.template.id, tier = request.tier.as_str())
    )]
    pub fn render(&self, request: &RenderRequest) -> CardpressResult<Arc<RenderResult>> {
        request.validate()?;

        let (width, height) = resolve_canvas(
            &request.template,
            request.output_width,
            request.output_height,
            self.config.dpi,
        )?;

        let key = cache_key(
            request.template.id,
            &request.values,
            request.tier,
            width,
            height,
            request.format,
        );
        if request.tier == QualityTier::Preview
            && let Some(hit) = self.preview_cache.get(&key)
        {
            tracing::debug!("preview cache hit");
            return Ok(hit);
        }

        let scale = scale_factor(width, self.config.reference_width);
        tracing::debug!(width, height, scale, "canvas resolved");

        let mut canvas = Surface::new(width, height)?;
        draw_background(&mut canvas, self.store.as_ref(), &request.template)?;

        let fctx = FieldContext {
            config: &self.config,
            registry: &self.registry,
            store: self.store.as_ref(),
            template: &request.template,
            scale,
        };
        render_fields(&mut canvas, &fctx, &request.fields, &request.values)?;

        let result = Arc::new(encode_canvas(
            canvas.data(),
            width,
            height,
            request.tier,
            request.format,
            &self.config.quality,
        )?);

        if request.tier == QualityTier::Preview {
            self.preview_cache.insert(key, result.clone());
        }
        Ok(result)
    }

    /// Render and persist through the asset store, returning the result and
    /// the stored reference (`<hash>-<tier>.<ext>` under the store's
    /// generated area).
    pub fn render_and_store(
        &self,
        request: &RenderRequest,
    ) -> CardpressResult<(Arc<RenderResult>, String)> {
        let result = self.render(request)?;
        let filename = output_filename(request, result.format);
        let stored_ref = self.store.persist(&filename, &result.bytes)?;
        tracing::debug!(%stored_ref, bytes = result.bytes.len(), "output persisted");
        Ok((result, stored_ref))
    }
}

/// `<hex-hash>-<tier>.<ext>`, unique per render via a timestamp token so
/// repeated renders of the same request never overwrite each other.
fn output_filename(request: &RenderRequest, format: crate::model::OutputFormat) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);

    let mut hasher = Sha256::new();
    hasher.update(request.template.id.to_le_bytes());
    for (name, value) in &request.values {
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update(value.as_bytes());
    }
    hasher.update(nanos.to_le_bytes());
    let digest = hasher.finalize();

    let mut hex = String::with_capacity(32);
    for byte in digest.iter().take(16) {
        use std::fmt::Write as _;
        let _ = write!(hex, "{byte:02x}");
    }

    format!("{hex}-{}.{}", request.tier.as_str(), format.extension())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{OutputFormat, Template, ValueMap};

    fn request(tier: QualityTier) -> RenderRequest {
        RenderRequest {
            template: Template {
                id: 3,
                image_ref: "bg.png".to_string(),
                orientation: Default::default(),
                custom_size: None,
                paper: None,
                aspect: Default::default(),
                overlay: false,
                text_shadow: false,
            },
            fields: Vec::new(),
            values: ValueMap::new(),
            output_width: 400,
            output_height: 600,
            tier,
            format: OutputFormat::Png,
        }
    }

    #[test]
    fn filename_carries_tier_and_extension() {
        let name = output_filename(&request(QualityTier::High), OutputFormat::Png);
        assert!(name.ends_with("-high.png"), "{name}");
        assert_eq!(name.len(), 32 + "-high.png".len());
    }

    #[test]
    fn filename_is_unique_per_call() {
        let req = request(QualityTier::Download);
        let a = output_filename(&req, OutputFormat::Jpeg);
        let b = output_filename(&req, OutputFormat::Jpeg);
        assert_ne!(a, b);
        assert!(a.ends_with("-download.jpg"));
    }
}
