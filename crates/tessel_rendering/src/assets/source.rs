//! Where asset content comes from.

use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use super::{AssetData, AssetKind};
use crate::error::LoadError;

/// Produces decoded asset content by name.
///
/// Called from load workers; implementations must tolerate concurrent calls
/// for different names.
pub trait AssetSource: Send + Sync {
    /// Loads one asset.
    ///
    /// # Errors
    ///
    /// [`LoadError::NotFound`], [`LoadError::Malformed`] and
    /// [`LoadError::Io`] fail only this asset.
    /// [`LoadError::HeaderMismatch`] is fatal for the whole batch.
    fn load(&self, name: &str, kind: AssetKind) -> Result<AssetData, LoadError>;
}

/// In-memory asset table. Used for synthetic content such as generated
/// terrain, and by tests.
#[derive(Default)]
pub struct MemoryAssetSource {
    assets: RwLock<FxHashMap<String, AssetData>>,
    loads: Mutex<FxHashMap<String, u32>>,
    delay: Option<Duration>,
}

impl MemoryAssetSource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps this long in every `load`, to mimic I/O latency.
    #[must_use]
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Adds or replaces an asset.
    pub fn insert(&self, name: impl Into<String>, data: AssetData) {
        self.assets.write().insert(name.into(), data);
    }

    /// Builder form of [`Self::insert`].
    #[must_use]
    pub fn with_asset(self, name: impl Into<String>, data: AssetData) -> Self {
        self.insert(name, data);
        self
    }

    /// Removes an asset.
    pub fn remove(&self, name: &str) -> Option<AssetData> {
        self.assets.write().remove(name)
    }

    /// How often `name` was loaded.
    #[must_use]
    pub fn load_count(&self, name: &str) -> u32 {
        self.loads.lock().get(name).copied().unwrap_or(0)
    }

    /// Loads across all names.
    #[must_use]
    pub fn total_loads(&self) -> u32 {
        self.loads.lock().values().sum()
    }
}

impl AssetSource for MemoryAssetSource {
    fn load(&self, name: &str, _kind: AssetKind) -> Result<AssetData, LoadError> {
        *self.loads.lock().entry(name.to_owned()).or_insert(0) += 1;
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.assets
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| LoadError::NotFound(name.to_owned()))
    }
}
