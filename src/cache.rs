//! Preview-tier result cache. Preview renders are cheap to regenerate but
//! requested in bursts while a template is being edited; a short TTL map
//! absorbs the bursts without any invalidation protocol.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use sha2::{Digest, Sha256};

use crate::model::{OutputFormat, QualityTier, RenderResult, ValueMap};

pub type CacheKey = [u8; 32];

/// Content hash identifying one render outcome. Template-scoped: two
/// templates with identical field values never collide.
pub fn cache_key(
    template_id: i64,
    values: &ValueMap,
    tier: QualityTier,
    width: u32,
    height: u32,
    format: OutputFormat,
) -> CacheKey {
    let mut hasher = Sha256::new();
    hasher.update(template_id.to_le_bytes());
    for (name, value) in values {
        hasher.update([0u8]);
        hasher.update(name.as_bytes());
        hasher.update([1u8]);
        hasher.update(value.as_bytes());
    }
    hasher.update(tier.as_str().as_bytes());
    hasher.update(width.to_le_bytes());
    hasher.update(height.to_le_bytes());
    hasher.update(format.extension().as_bytes());
    hasher.finalize().into()
}

struct Entry {
    inserted_at: Instant,
    result: Arc<RenderResult>,
}

pub struct PreviewCache {
    ttl: Duration,
    entries: Mutex<HashMap<CacheKey, Entry>>,
}

impl PreviewCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Entries expire `ttl` after insertion, unconditionally; a hit does not
    /// refresh the clock.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<RenderResult>> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(entry.result.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: CacheKey, result: Arc<RenderResult>) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        entries.retain(|_, e| e.inserted_at.elapsed() < self.ttl);
        entries.insert(
            key,
            Entry {
                inserted_at: Instant::now(),
                result,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
