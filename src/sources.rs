//! Asset access: reading background and field images by reference, persisting
//! rendered output, and decoding image bytes into premultiplied RGBA8.

use std::path::{Path, PathBuf};

use base64::Engine as _;

use crate::error::{CardpressError, CardpressResult};

/// Where asset bytes come from and where rendered output goes. The compositor
/// never touches the filesystem directly, so tests and alternative backends
/// (object storage, in-memory fixtures) plug in here.
pub trait AssetStore: Send + Sync {
    /// Resolve `asset_ref` to raw bytes. Implementations decide what a
    /// reference means: a path, a URL, an inline data URL.
    fn read(&self, asset_ref: &str) -> CardpressResult<Vec<u8>>;

    /// Persist `bytes` under `filename`, returning the reference a later
    /// [`Self::read`] would accept.
    fn persist(&self, filename: &str, bytes: &[u8]) -> CardpressResult<String>;
}

/// Filesystem-backed store rooted at an uploads directory.
///
/// References may be absolute paths, paths relative to the uploads root, or
/// `data:image/...;base64,` payloads. Stale references from older editor
/// sessions are repaired by prefix rewriting (`temp/` assets get promoted
/// into `uploads/`, `generated/` output lives under `uploads/generated/`)
/// before the candidate paths are probed in order.
#[derive(Clone, Debug)]
pub struct DiskStore {
    uploads_root: PathBuf,
}

impl DiskStore {
    pub fn new(uploads_root: impl Into<PathBuf>) -> Self {
        Self {
            uploads_root: uploads_root.into(),
        }
    }

    pub fn uploads_root(&self) -> &Path {
        &self.uploads_root
    }

    fn candidates(&self, asset_ref: &str) -> Vec<PathBuf> {
        let trimmed = asset_ref.trim_start_matches('/');
        let mut out = Vec::new();

        let p = Path::new(asset_ref);
        if p.is_absolute() {
            out.push(p.to_path_buf());
        }
        out.push(self.uploads_root.join(trimmed));

        if let Some(rest) = trimmed.strip_prefix("temp/") {
            out.push(self.uploads_root.join(rest));
        }
        if let Some(rest) = trimmed.strip_prefix("generated/") {
            out.push(self.uploads_root.join("generated").join(rest));
        }
        if let Some(rest) = trimmed.strip_prefix("uploads/") {
            out.push(self.uploads_root.join(rest));
        }

        // Bare filenames may have landed in the generated area.
        if !trimmed.contains('/') {
            out.push(self.uploads_root.join("generated").join(trimmed));
        }

        out
    }
}

impl AssetStore for DiskStore {
    fn read(&self, asset_ref: &str) -> CardpressResult<Vec<u8>> {
        if let Some(bytes) = decode_data_url(asset_ref)? {
            return Ok(bytes);
        }

        let candidates = self.candidates(asset_ref);
        for path in &candidates {
            match std::fs::read(path) {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(CardpressError::field_asset(format!(
                        "reading '{}': {e}",
                        path.display()
                    )));
                }
            }
        }
        Err(CardpressError::field_asset(format!(
            "asset '{asset_ref}' not found in any of {} candidate paths",
            candidates.len()
        )))
    }

    fn persist(&self, filename: &str, bytes: &[u8]) -> CardpressResult<String> {
        let dir = self.uploads_root.join("generated");
        std::fs::create_dir_all(&dir)
            .map_err(|e| CardpressError::field_asset(format!("creating '{}': {e}", dir.display())))?;
        let path = dir.join(filename);
        std::fs::write(&path, bytes)
            .map_err(|e| CardpressError::field_asset(format!("writing '{}': {e}", path.display())))?;
        Ok(format!("generated/{filename}"))
    }
}

/// Decode a `data:image/...;base64,` reference, `Ok(None)` when `asset_ref`
/// is not a data URL at all.
pub fn decode_data_url(asset_ref: &str) -> CardpressResult<Option<Vec<u8>>> {
    let Some(rest) = asset_ref.strip_prefix("data:") else {
        return Ok(None);
    };
    let (_mime, payload) = rest.split_once(";base64,").ok_or_else(|| {
        CardpressError::field_asset("data URL is not base64-encoded")
    })?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| CardpressError::field_asset(format!("invalid base64 data URL: {e}")))?;
    Ok(Some(bytes))
}

/// RGBA8 pixels with premultiplied alpha, ready for compositing.
#[derive(Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub premul_rgba8: Vec<u8>,
}

impl std::fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// Decode encoded image bytes (any format the `image` crate sniffs) and
/// premultiply alpha.
pub fn decode_image(bytes: &[u8]) -> CardpressResult<DecodedImage> {
    let dynamic = image::load_from_memory(bytes)
        .map_err(|e| CardpressError::field_asset(format!("decoding image: {e}")))?;
    let rgba = dynamic.to_rgba8();
    let (width, height) = rgba.dimensions();
    if width == 0 || height == 0 {
        return Err(CardpressError::field_asset("decoded image is empty"));
    }

    let mut premul = rgba.into_raw();
    for px in premul.chunks_exact_mut(4) {
        let a = u16::from(px[3]);
        if a == 255 {
            continue;
        }
        for c in 0..3 {
            px[c] = ((u16::from(px[c]) * a + 127) / 255) as u8;
        }
    }

    Ok(DecodedImage {
        width,
        height,
        premul_rgba8: premul,
    })
}
