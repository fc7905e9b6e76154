//! # Instance Table
//!
//! Expands loaded assets into concrete instances and per-instance draw
//! calls.
//!
//! ```text
//!   instances        DeviceVector<InstanceData>           one per instance
//!   opaque     ┌──── DeviceVector<DrawCall>                first_instance = own index
//!              └──── DeviceVector<DrawCallData>            instance_id, material
//!   transparent ...same pair...
//! ```
//!
//! Every append happens with the record list write-locked, so instance ids
//! and draw-call indices are dense and the per-bucket vectors stay parallel.

use std::ops::Range;
use std::sync::Arc;

use glam::Mat4;
use parking_lot::RwLock;
use tessel_core::{BufferHandle, BufferUsage, CoreResult, DeviceVector, GpuDevice, SyncOutcome};

use super::{BoneRanges, BoneStorage, Bucket, DrawCall, DrawCallData, InstanceData, InstanceId};
use crate::assets::{AssetId, AssetKind, LoadedAsset};
use crate::culling::Aabb;

/// Host-side bookkeeping for one instance.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceRecord {
    /// Asset shown by the instance.
    pub asset_id: AssetId,
    /// Object to world.
    pub transform: Mat4,
    /// Asset bounds in object space.
    pub local_bounds: Aabb,
    /// Bounds in world space.
    pub world_bounds: Aabb,
    /// Bone ranges of animated instances.
    pub bones: Option<BoneRanges>,
    /// Draw-call index range per bucket.
    pub draw_calls: [Range<u32>; 2],
}

impl InstanceRecord {
    /// Draw calls of one bucket.
    #[inline]
    #[must_use]
    pub fn draw_calls(&self, bucket: Bucket) -> Range<u32> {
        self.draw_calls[bucket.index()].clone()
    }
}

struct BucketTable {
    draw_calls: DeviceVector<DrawCall>,
    draw_call_data: DeviceVector<DrawCallData>,
    /// Reverse lookup for tooling.
    assets: RwLock<Vec<AssetId>>,
}

impl BucketTable {
    fn new(device: &Arc<dyn GpuDevice>, label: &str, bucket: Bucket) -> Self {
        let bucket = bucket.label();
        Self {
            draw_calls: DeviceVector::new(
                Arc::clone(device),
                format!("{label}/{bucket}/draw_calls"),
                BufferUsage::INDIRECT | BufferUsage::STORAGE,
            ),
            draw_call_data: DeviceVector::new(
                Arc::clone(device),
                format!("{label}/{bucket}/draw_call_data"),
                BufferUsage::STORAGE,
            ),
            assets: RwLock::new(Vec::new()),
        }
    }

    fn clear(&self) {
        self.draw_calls.clear();
        self.draw_call_data.clear();
        self.assets.write().clear();
    }
}

/// Instances and draw calls of one renderer.
pub struct InstanceTable {
    label: String,
    instances: DeviceVector<InstanceData>,
    records: RwLock<Vec<InstanceRecord>>,
    buckets: [BucketTable; 2],
    bones: Option<BoneStorage>,
}

impl InstanceTable {
    /// Table without bone storage.
    pub fn new(device: &Arc<dyn GpuDevice>, kind: AssetKind) -> Self {
        let label = kind.label();
        Self {
            label: label.to_owned(),
            instances: DeviceVector::new(Arc::clone(device), format!("{label}/instances"), BufferUsage::STORAGE),
            records: RwLock::new(Vec::new()),
            buckets: Bucket::ALL.map(|bucket| BucketTable::new(device, label, bucket)),
            bones: None,
        }
    }

    /// Adds bone storage for animated assets.
    #[must_use]
    pub fn with_bones(mut self, bones: BoneStorage) -> Self {
        self.bones = Some(bones);
        self
    }

    /// Debug label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Creates an instance of a ready asset and its draw calls.
    ///
    /// Animated assets get bone ranges when the table has bone storage.
    ///
    /// # Errors
    ///
    /// Bone arena exhaustion after one growth; fatal.
    pub fn add_instance(&self, asset: &LoadedAsset, transform: Mat4) -> CoreResult<InstanceId> {
        debug_assert!(asset.is_ready(), "instancing asset '{}' that is not ready", asset.debug_name);

        let mut records = self.records.write();
        let bones = match &self.bones {
            Some(storage) if asset.is_animated => Some(storage.allocate(asset.bone_count)?),
            _ => None,
        };

        let mut data = InstanceData::new(asset.id.0, &transform);
        if let Some(ranges) = bones {
            data.bone_deform_offset = ranges.deform_offset();
            data.bone_instance_offset = ranges.instance_offset();
            data.bone_count = asset.bone_count;
        }
        let id = self.instances.push_back(data) as u32;
        debug_assert_eq!(id as usize, records.len());

        let mut draw_calls = [0..0, 0..0];
        for bucket in Bucket::ALL {
            let table = &self.buckets[bucket.index()];
            let templates = asset.templates(bucket);
            let range = table.draw_calls.write_locked(|calls| {
                let start = calls.len() as u32;
                for (i, template) in templates.iter().enumerate() {
                    calls.push(DrawCall {
                        index_count: template.index_count,
                        instance_count: 1,
                        first_index: template.first_index,
                        base_vertex: template.vertex_offset,
                        first_instance: start + i as u32,
                    });
                }
                start..calls.len() as u32
            });
            table.draw_call_data.write_locked(|meta| {
                for template in templates {
                    meta.push(DrawCallData {
                        instance_id: id,
                        texture_unit_range: template.texture_unit_range,
                        culling_volume_id: template.culling_volume_id,
                        render_priority: template.render_priority,
                        _padding: [0; 3],
                    });
                }
            });
            table
                .assets
                .write()
                .extend(std::iter::repeat(asset.id).take(templates.len()));
            draw_calls[bucket.index()] = range;
        }

        records.push(InstanceRecord {
            asset_id: asset.id,
            transform,
            local_bounds: asset.culling_volume,
            world_bounds: asset.culling_volume.transformed(&transform),
            bones,
            draw_calls,
        });
        Ok(InstanceId(id))
    }

    /// Moves an instance. Only that instance is re-uploaded on the next
    /// sync. Returns `false` for an unknown id.
    pub fn set_transform(&self, id: InstanceId, transform: Mat4) -> bool {
        let mut records = self.records.write();
        debug_assert!(id.index() < records.len(), "set_transform on unknown instance {}", id.0);
        let Some(record) = records.get_mut(id.index()) else {
            return false;
        };
        record.transform = transform;
        record.world_bounds = record.local_bounds.transformed(&transform);
        self.instances.write_locked(|w| {
            w.elements_mut()[id.index()].transform = transform.to_cols_array_2d();
            w.set_dirty_element(id.index());
        });
        true
    }

    /// Copy of an instance record.
    #[must_use]
    pub fn instance(&self, id: InstanceId) -> Option<InstanceRecord> {
        self.records.read().get(id.index()).cloned()
    }

    /// GPU data of an instance.
    #[must_use]
    pub fn instance_data(&self, id: InstanceId) -> Option<InstanceData> {
        self.instances.get(id.index())
    }

    /// Draw-call range of an instance in one bucket.
    #[must_use]
    pub fn draw_call_range(&self, id: InstanceId, bucket: Bucket) -> Option<Range<u32>> {
        self.records.read().get(id.index()).map(|r| r.draw_calls(bucket))
    }

    /// Runs `f` over every instance record.
    pub fn with_records<R>(&self, f: impl FnOnce(&[InstanceRecord]) -> R) -> R {
        f(&self.records.read())
    }

    /// Runs `f` over the draw calls of a bucket.
    pub fn with_draw_calls<R>(&self, bucket: Bucket, f: impl FnOnce(&[DrawCall]) -> R) -> R {
        self.buckets[bucket.index()].draw_calls.read_locked(f)
    }

    /// Draw-call metadata.
    #[must_use]
    pub fn draw_call_data(&self, bucket: Bucket, index: u32) -> Option<DrawCallData> {
        self.buckets[bucket.index()].draw_call_data.get(index as usize)
    }

    /// Asset behind a draw call. [`AssetId::INVALID`] for an index that does
    /// not exist.
    #[must_use]
    pub fn resolve_asset(&self, draw_call_index: u32, bucket: Bucket) -> AssetId {
        let assets = self.buckets[bucket.index()].assets.read();
        debug_assert!(
            (draw_call_index as usize) < assets.len(),
            "draw call {draw_call_index} out of range in {} bucket",
            bucket.label()
        );
        assets.get(draw_call_index as usize).copied().unwrap_or(AssetId::INVALID)
    }

    /// Number of instances.
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.records.read().len()
    }

    /// Number of draw calls in a bucket.
    #[must_use]
    pub fn draw_call_count(&self, bucket: Bucket) -> usize {
        self.buckets[bucket.index()].draw_calls.len()
    }

    /// Instance buffer.
    #[must_use]
    pub fn instance_buffer(&self) -> Option<BufferHandle> {
        self.instances.buffer()
    }

    /// Draw-call buffer of a bucket.
    #[must_use]
    pub fn draw_call_buffer(&self, bucket: Bucket) -> Option<BufferHandle> {
        self.buckets[bucket.index()].draw_calls.buffer()
    }

    /// Draw-call metadata buffer of a bucket.
    #[must_use]
    pub fn draw_call_data_buffer(&self, bucket: Bucket) -> Option<BufferHandle> {
        self.buckets[bucket.index()].draw_call_data.buffer()
    }

    /// Bone storage, for animated renderers.
    #[must_use]
    pub fn bones(&self) -> Option<&BoneStorage> {
        self.bones.as_ref()
    }

    /// Syncs every vector of the table.
    ///
    /// # Errors
    ///
    /// Device failures; fatal.
    pub fn sync(&self) -> CoreResult<SyncOutcome> {
        let mut outcome = self.instances.sync_to_device()?;
        for table in &self.buckets {
            outcome.merge(table.draw_calls.sync_to_device()?);
            outcome.merge(table.draw_call_data.sync_to_device()?);
        }
        if let Some(bones) = &self.bones {
            outcome.merge(bones.sync()?);
        }
        Ok(outcome)
    }

    /// Removes every instance. The next id is 0 again.
    pub fn clear(&self) {
        let mut records = self.records.write();
        records.clear();
        self.instances.clear();
        for table in &self.buckets {
            table.clear();
        }
        if let Some(bones) = &self.bones {
            bones.clear();
        }
    }
}
