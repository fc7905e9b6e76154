//! # Asset Load Cache
//!
//! Deduplicates loads by content key. However many placements reference an
//! asset, and however many workers process them at once, exactly one of them
//! loads it.
//!
//! ## Locking
//!
//! ```text
//!   index (RwLock)          short: key -> id, slot creation
//!     ├── records[id]       RwLock<LoadedAsset>, written by the loader only
//!     └── gates[id]         Mutex<AssetStatus> + Condvar, side table
//! ```
//!
//! The index lock is released before any I/O. The thread that created the
//! slot loads the asset and publishes the terminal status through the gate;
//! every other caller for that key blocks on the gate until then.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, RwLock};
use rustc_hash::FxHashMap;
use tessel_core::{
    BufferHandle, BufferUsage, CoreResult, DeviceVector, GpuDevice, RangeAllocation,
    RangeAllocator, SyncOutcome,
};
use tracing::{debug, error, warn};

use super::{
    AssetData, AssetId, AssetKey, AssetKind, AssetSource, AssetStatus, CullingVolume,
    DrawCallTemplate, LoadedAsset, Vertex,
};
use crate::error::{LoadError, RenderResult};
use crate::instancing::Bucket;

/// Answer of [`AssetLoadCache::get_or_create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEntry {
    /// Slot of the asset.
    pub id: AssetId,
    /// This call created the slot and must load the asset.
    pub newly_created: bool,
}

/// Terminal result of [`AssetLoadCache::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acquired {
    /// Slot of the asset.
    pub id: AssetId,
    /// This call performed the load.
    pub loaded_here: bool,
    /// `Ready` or `Failed`.
    pub status: AssetStatus,
}

struct LoadGate {
    status: Mutex<AssetStatus>,
    done: Condvar,
}

impl LoadGate {
    fn new() -> Self {
        Self {
            status: Mutex::new(AssetStatus::Loading),
            done: Condvar::new(),
        }
    }

    fn publish(&self, status: AssetStatus) {
        *self.status.lock() = status;
        self.done.notify_all();
    }

    fn wait(&self) -> AssetStatus {
        let mut status = self.status.lock();
        while *status == AssetStatus::Loading {
            self.done.wait(&mut status);
        }
        *status
    }
}

#[derive(Default)]
struct CacheIndex {
    by_key: FxHashMap<AssetKey, AssetId>,
    records: Vec<Arc<RwLock<LoadedAsset>>>,
    gates: Vec<Arc<LoadGate>>,
}

struct GeometryArena {
    vertices: RangeAllocator,
    indices: RangeAllocator,
}

impl GeometryArena {
    fn new(growth_factor: f64) -> Self {
        Self {
            vertices: RangeAllocator::new(0, Vertex::SIZE).with_growth_factor(growth_factor),
            indices: RangeAllocator::new(0, 4).with_growth_factor(growth_factor),
        }
    }
}

/// Content-addressed asset cache for one renderer kind.
///
/// Owns the shared vertex, index and culling-volume buffers that every
/// loaded asset of the kind lives in.
pub struct AssetLoadCache {
    kind: AssetKind,
    growth_factor: f64,
    index: RwLock<CacheIndex>,
    geometry: Mutex<GeometryArena>,
    vertices: DeviceVector<Vertex>,
    indices: DeviceVector<u32>,
    culling_volumes: DeviceVector<CullingVolume>,
    loaded: AtomicU32,
    failed: AtomicU32,
}

impl AssetLoadCache {
    /// Creates an empty cache for `kind`.
    pub fn new(device: &Arc<dyn GpuDevice>, kind: AssetKind, growth_factor: f64) -> Self {
        let label = kind.label();
        Self {
            kind,
            growth_factor,
            index: RwLock::new(CacheIndex::default()),
            geometry: Mutex::new(GeometryArena::new(growth_factor)),
            vertices: DeviceVector::new(Arc::clone(device), format!("{label}/vertices"), BufferUsage::VERTEX),
            indices: DeviceVector::new(Arc::clone(device), format!("{label}/indices"), BufferUsage::INDEX),
            culling_volumes: DeviceVector::new(
                Arc::clone(device),
                format!("{label}/culling_volumes"),
                BufferUsage::STORAGE,
            ),
            loaded: AtomicU32::new(0),
            failed: AtomicU32::new(0),
        }
    }

    /// Renderer kind this cache serves.
    #[must_use]
    pub const fn kind(&self) -> AssetKind {
        self.kind
    }

    /// Looks up `key`, creating a `Loading` slot if it is new.
    ///
    /// The slot becomes visible to concurrent lookups before this returns,
    /// so exactly one caller ever sees `newly_created == true`.
    pub fn get_or_create(&self, key: AssetKey, debug_name: &str) -> CacheEntry {
        if let Some(&id) = self.index.read().by_key.get(&key) {
            return CacheEntry { id, newly_created: false };
        }

        let mut index = self.index.write();
        if let Some(&id) = index.by_key.get(&key) {
            return CacheEntry { id, newly_created: false };
        }
        let id = AssetId(index.records.len() as u32);
        index.by_key.insert(key, id);
        index
            .records
            .push(Arc::new(RwLock::new(LoadedAsset::loading(id, debug_name, self.kind))));
        index.gates.push(Arc::new(LoadGate::new()));
        // Culling volume slot mirrors the asset id.
        self.culling_volumes.push_back(CullingVolume::default());
        CacheEntry { id, newly_created: true }
    }

    /// Returns the terminal status of `name`, loading it from `source` if no
    /// one has yet. Concurrent callers for the same name block until the
    /// single load finishes.
    ///
    /// # Errors
    ///
    /// Fatal only: a header mismatch reported by the source, or device
    /// memory exhaustion while storing geometry. The asset is marked
    /// `Failed` before the error is returned so waiters are released.
    pub fn acquire(&self, name: &str, source: &dyn AssetSource) -> RenderResult<Acquired> {
        let entry = self.get_or_create(AssetKey::from_name(name), name);
        let Some(gate) = self.gate(entry.id) else {
            return Ok(Acquired {
                id: entry.id,
                loaded_here: false,
                status: AssetStatus::Failed,
            });
        };

        if !entry.newly_created {
            return Ok(Acquired {
                id: entry.id,
                loaded_here: false,
                status: gate.wait(),
            });
        }

        let result = self.load(entry.id, name, source);
        let status = if result.is_ok() { AssetStatus::Ready } else { AssetStatus::Failed };
        if let Some(record) = self.record(entry.id) {
            record.write().status = status;
        }
        gate.publish(status);

        match result {
            Ok(()) => {
                self.loaded.fetch_add(1, Ordering::Relaxed);
                Ok(Acquired { id: entry.id, loaded_here: true, status })
            }
            Err(LoadFailure::Asset(err)) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                if err.is_fatal() {
                    error!(asset = name, kind = self.kind.label(), %err, "asset pipeline mismatch");
                } else {
                    warn!(asset = name, kind = self.kind.label(), %err, "asset failed to load");
                }
                match err.into_fatal() {
                    Some(fatal) => Err(fatal),
                    None => Ok(Acquired { id: entry.id, loaded_here: true, status }),
                }
            }
            Err(LoadFailure::Device(err)) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                error!(asset = name, %err, "no device memory for asset geometry");
                Err(err.into())
            }
        }
    }

    fn load(&self, id: AssetId, name: &str, source: &dyn AssetSource) -> Result<(), LoadFailure> {
        let data = source.load(name, self.kind).map_err(LoadFailure::Asset)?;
        data.validate().map_err(|reason| {
            LoadFailure::Asset(LoadError::Malformed {
                name: name.to_owned(),
                reason,
            })
        })?;

        let (vertex_range, index_range) = self.append_geometry(&data).map_err(LoadFailure::Device)?;
        let templates = self.build_templates(id, &data, vertex_range, index_range);

        if let Some(record) = self.record(id) {
            let mut record = record.write();
            record.vertex_range = vertex_range;
            record.index_range = index_range;
            record.templates = templates;
            record.bone_count = data.bone_count;
            record.is_animated = data.bone_count > 0;
            record.culling_volume = data.bounds;
            record.decorations = data.decorations;
        }
        self.culling_volumes.set(id.index(), CullingVolume::from(data.bounds));
        debug!(
            asset = name,
            vertices = vertex_range.size / Vertex::SIZE,
            indices = index_range.size / 4,
            "asset loaded"
        );
        Ok(())
    }

    fn append_geometry(&self, data: &AssetData) -> CoreResult<(RangeAllocation, RangeAllocation)> {
        let vertex_bytes = data.vertices.len() as u64 * Vertex::SIZE;
        let index_bytes = data.indices.len() as u64 * 4;

        let mut arena = self.geometry.lock();
        let vertices = arena.vertices.allocate_or_grow(vertex_bytes)?;
        let indices = arena.indices.allocate_or_grow(index_bytes)?;
        if let Some(capacity) = vertices.grew_to.or(indices.grew_to) {
            debug!(kind = self.kind.label(), capacity, "geometry arena grew");
        }
        // Allocations are element aligned and contiguous, so they line up
        // with the end of the vectors.
        self.vertices.extend_from_slice(&data.vertices);
        self.indices.extend_from_slice(&data.indices);
        Ok((vertices.allocation, indices.allocation))
    }

    fn build_templates(
        &self,
        id: AssetId,
        data: &AssetData,
        vertex_range: RangeAllocation,
        index_range: RangeAllocation,
    ) -> [Vec<DrawCallTemplate>; 2] {
        let base_vertex = (vertex_range.offset / Vertex::SIZE) as i32;
        let base_index = (index_range.offset / 4) as u32;
        let mut templates = [Vec::new(), Vec::new()];
        for desc in &data.draw_calls {
            let bucket = if desc.transparent || self.kind == AssetKind::Water {
                Bucket::Transparent
            } else {
                Bucket::Opaque
            };
            templates[bucket.index()].push(DrawCallTemplate {
                first_index: base_index + desc.first_index,
                index_count: desc.index_count,
                vertex_offset: base_vertex + desc.vertex_offset,
                texture_unit_range: desc.texture_units,
                render_priority: desc.render_priority,
                culling_volume_id: id.0,
            });
        }
        templates
    }

    fn record(&self, id: AssetId) -> Option<Arc<RwLock<LoadedAsset>>> {
        self.index.read().records.get(id.index()).cloned()
    }

    fn gate(&self, id: AssetId) -> Option<Arc<LoadGate>> {
        self.index.read().gates.get(id.index()).cloned()
    }

    /// Runs `f` on an asset record.
    pub fn with_asset<R>(&self, id: AssetId, f: impl FnOnce(&LoadedAsset) -> R) -> Option<R> {
        let record = self.record(id)?;
        let asset = record.read();
        Some(f(&asset))
    }

    /// Copy of an asset record.
    #[must_use]
    pub fn asset(&self, id: AssetId) -> Option<LoadedAsset> {
        self.with_asset(id, Clone::clone)
    }

    /// Current status of an asset.
    #[must_use]
    pub fn status(&self, id: AssetId) -> Option<AssetStatus> {
        self.gate(id).map(|gate| *gate.status.lock())
    }

    /// Id of a previously requested name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<AssetId> {
        self.index.read().by_key.get(&AssetKey::from_name(name)).copied()
    }

    /// Number of assets (any status).
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.read().records.len()
    }

    /// Whether the cache holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Assets loaded successfully.
    #[must_use]
    pub fn loaded_count(&self) -> u32 {
        self.loaded.load(Ordering::Relaxed)
    }

    /// Assets that failed.
    #[must_use]
    pub fn failed_count(&self) -> u32 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Shared vertex buffer.
    #[must_use]
    pub fn vertex_buffer(&self) -> Option<BufferHandle> {
        self.vertices.buffer()
    }

    /// Shared index buffer.
    #[must_use]
    pub fn index_buffer(&self) -> Option<BufferHandle> {
        self.indices.buffer()
    }

    /// Culling volume buffer, indexed by asset id.
    #[must_use]
    pub fn culling_volume_buffer(&self) -> Option<BufferHandle> {
        self.culling_volumes.buffer()
    }

    /// Vertices stored so far.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Syncs the shared buffers.
    ///
    /// # Errors
    ///
    /// Device failures; fatal.
    pub fn sync(&self) -> CoreResult<SyncOutcome> {
        let mut outcome = self.vertices.sync_to_device()?;
        outcome.merge(self.indices.sync_to_device()?);
        outcome.merge(self.culling_volumes.sync_to_device()?);
        Ok(outcome)
    }

    /// Drops every asset and all shared geometry.
    pub fn clear(&self) {
        let mut index = self.index.write();
        let mut geometry = self.geometry.lock();
        *index = CacheIndex::default();
        *geometry = GeometryArena::new(self.growth_factor);
        self.vertices.clear();
        self.indices.clear();
        self.culling_volumes.clear();
        self.loaded.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
    }
}

enum LoadFailure {
    Asset(LoadError),
    Device(tessel_core::CoreError),
}
