//! # Visibility Pipeline
//!
//! Per renderer, per bucket, every frame:
//!
//! ```text
//!   Reset ──▶ Cull ──▶ Compact ──▶ DrawIndirect ──┐
//!     ▲                                            │
//!     └──────────────── next frame ◀───────────────┘
//!
//!   Reset         zero counters, swap bitmasks, collect last readback
//!   Cull          frustum, then occlusion against last frame's proxy
//!   Compact       bitmask -> ascending visible instance list
//!   DrawIndirect  expand draw calls, sort (transparent), draw with count
//! ```
//!
//! Survivor and triangle counts reach the host through a readback that is
//! resolved when the device finishes the frame, so [`BucketStats::survivors`]
//! and [`BucketStats::triangles`] always describe an earlier frame. At most
//! [`MAX_READBACKS_IN_FLIGHT`] are kept; older ones are dropped unread.
//!
//! The bitmasks are double-buffered so last frame's mask stays readable
//! through [`VisibilityPipeline::previous_mask`]. Cull never consults it;
//! occlusion is decided by the [`OcclusionProxy`] alone.

use std::collections::VecDeque;
use std::sync::Arc;

use tessel_core::{
    BufferUsage, CoreResult, DeviceVector, DoubleBuffered, DrawIndexedIndirectArgs, GpuDevice,
    IndirectDraw, Readback, ReadbackState, SyncOutcome,
};
use tracing::{debug, warn};

use super::compact::{compact_into, mask_words, popcount, set_bit};
use super::{Frustum, OcclusionProxy};
use crate::instancing::{Bucket, DrawCall, InstanceTable};
use crate::pipeline::{BucketStats, FrameContext};
use crate::sorting::{depth_sort_key, TransparencyOrderer};

/// Draw calls that reached the indirect draw.
const COUNTER_DRAWS: usize = 0;
/// Instances that passed Cull.
const COUNTER_VISIBLE: usize = 1;
/// Low and high halves of the triangle count.
const COUNTER_TRIANGLES_LO: usize = 2;
const COUNTER_TRIANGLES_HI: usize = 3;
const COUNTER_WORDS: usize = 4;

/// Unresolved counter readbacks kept per pipeline.
pub const MAX_READBACKS_IN_FLIGHT: usize = 3;

/// Step the pipeline completed last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityStage {
    /// Counters zeroed, ready to cull.
    Reset,
    /// Bitmask written.
    Culled,
    /// Visible list built.
    Compacted,
    /// Indirect draw issued.
    Drawn,
}

/// Two-phase visibility for one bucket of one renderer.
pub struct VisibilityPipeline {
    bucket: Bucket,
    device: Arc<dyn GpuDevice>,
    masks: DoubleBuffered<DeviceVector<u32>>,
    compacted: DeviceVector<u32>,
    culled: DeviceVector<DrawCall>,
    counters: DeviceVector<u32>,
    in_flight: VecDeque<Readback>,
    stage: VisibilityStage,
    stats: BucketStats,
    bypassed: bool,
    instance_count: usize,
    words: Vec<u32>,
    visible: Vec<u32>,
    draws: Vec<DrawCall>,
    keys: Vec<u64>,
    orderer: TransparencyOrderer,
}

impl VisibilityPipeline {
    /// Creates the pipeline and its device vectors.
    pub fn new(device: &Arc<dyn GpuDevice>, label: &str, bucket: Bucket) -> Self {
        let prefix = format!("{label}/{}", bucket.label());
        let mut mask_slot = 0;
        Self {
            bucket,
            device: Arc::clone(device),
            masks: DoubleBuffered::from_fn(|| {
                mask_slot += 1;
                DeviceVector::new(Arc::clone(device), format!("{prefix}/visibility_{mask_slot}"), BufferUsage::STORAGE)
            }),
            compacted: DeviceVector::new(Arc::clone(device), format!("{prefix}/visible"), BufferUsage::STORAGE),
            culled: DeviceVector::new(
                Arc::clone(device),
                format!("{prefix}/culled_draws"),
                BufferUsage::INDIRECT | BufferUsage::STORAGE,
            ),
            counters: DeviceVector::new(
                Arc::clone(device),
                format!("{prefix}/counters"),
                BufferUsage::INDIRECT | BufferUsage::STORAGE,
            ),
            in_flight: VecDeque::new(),
            stage: VisibilityStage::Drawn,
            stats: BucketStats::default(),
            bypassed: false,
            instance_count: 0,
            words: Vec::new(),
            visible: Vec::new(),
            draws: Vec::new(),
            keys: Vec::new(),
            orderer: TransparencyOrderer::new(),
        }
    }

    /// Bucket this pipeline serves.
    #[must_use]
    pub const fn bucket(&self) -> Bucket {
        self.bucket
    }

    /// Step completed last.
    #[must_use]
    pub const fn stage(&self) -> VisibilityStage {
        self.stage
    }

    /// Counters of the current frame, with survivors and triangles from the
    /// newest resolved readback.
    #[must_use]
    pub const fn stats(&self) -> BucketStats {
        self.stats
    }

    /// Surviving draw calls as last read back from the device.
    #[must_use]
    pub const fn survivor_count(&self) -> u32 {
        self.stats.survivors
    }

    /// Visible instances of the current frame, ascending.
    #[must_use]
    pub fn visible_instances(&self) -> &[u32] {
        &self.visible
    }

    /// Host copy of this frame's bitmask.
    #[must_use]
    pub fn current_mask(&self) -> Vec<u32> {
        self.masks.current().read_locked(<[u32]>::to_vec)
    }

    /// Host copy of last frame's bitmask.
    #[must_use]
    pub fn previous_mask(&self) -> Vec<u32> {
        self.masks.previous().read_locked(<[u32]>::to_vec)
    }

    /// Readbacks not yet resolved.
    #[must_use]
    pub fn readbacks_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Zeroes the counters, swaps the bitmasks and folds in any readback the
    /// device has resolved since.
    pub fn reset(&mut self) {
        self.collect_readbacks();
        self.masks.swap();
        self.counters.assign(&[0; COUNTER_WORDS]);
        self.stats.visible_instances = 0;
        self.stats.frustum_culled = 0;
        self.stats.occlusion_culled = 0;
        self.bypassed = false;
        self.visible.clear();
        self.stage = VisibilityStage::Reset;
    }

    fn collect_readbacks(&mut self) {
        while let Some(readback) = self.in_flight.front_mut() {
            match readback.poll() {
                ReadbackState::Pending => break,
                ReadbackState::Ready(bytes) => {
                    if let Some(counters) = read_counters(&bytes) {
                        self.stats.survivors = counters[COUNTER_DRAWS];
                        self.stats.triangles = u64::from(counters[COUNTER_TRIANGLES_LO])
                            | (u64::from(counters[COUNTER_TRIANGLES_HI]) << 32);
                    }
                }
                ReadbackState::Dropped => {
                    warn!(bucket = self.bucket.label(), "visibility readback dropped by device");
                }
            }
            self.in_flight.pop_front();
        }
    }

    /// Tests every instance with draw calls in this bucket.
    ///
    /// Instances outside `frustum` are rejected without an occlusion test.
    /// With culling disabled in `ctx`, every such instance is visible and
    /// Compact has nothing to do.
    pub fn cull(
        &mut self,
        ctx: &FrameContext,
        frustum: &Frustum,
        occlusion: Option<&OcclusionProxy>,
        table: &InstanceTable,
    ) {
        debug_assert_eq!(self.stage, VisibilityStage::Reset, "cull before reset");
        let bucket = self.bucket;
        let occlusion = occlusion.filter(|_| ctx.config.occlusion_culling_enabled);
        let bypass = !ctx.config.culling_enabled;

        let words = &mut self.words;
        let visible = &mut self.visible;
        let stats = &mut self.stats;
        self.instance_count = table.with_records(|records| {
            words.clear();
            words.resize(mask_words(records.len()), 0);
            stats.instances = 0;
            for (i, record) in records.iter().enumerate() {
                if record.draw_calls(bucket).is_empty() {
                    continue;
                }
                stats.instances += 1;
                if bypass {
                    set_bit(words, i);
                    visible.push(i as u32);
                } else if !frustum.test_aabb(&record.world_bounds) {
                    stats.frustum_culled += 1;
                } else if occlusion.is_some_and(|proxy| proxy.is_occluded(&record.world_bounds)) {
                    stats.occlusion_culled += 1;
                } else {
                    set_bit(words, i);
                }
            }
            records.len()
        });

        self.bypassed = bypass;
        self.masks.current().assign(&self.words);
        self.stage = VisibilityStage::Culled;
    }

    /// Converts the bitmask into the dense visible list. Returns its length.
    pub fn compact(&mut self) -> usize {
        debug_assert_eq!(self.stage, VisibilityStage::Culled, "compact before cull");
        if !self.bypassed {
            compact_into(&self.words, self.instance_count, &mut self.visible);
        }
        debug_assert_eq!(self.visible.len(), popcount(&self.words, self.instance_count));
        self.compacted.assign(&self.visible);
        self.stats.visible_instances = self.visible.len() as u32;
        self.stage = VisibilityStage::Compacted;
        self.visible.len()
    }

    /// Expands visible instances into draw calls and issues one
    /// indirect draw with count.
    ///
    /// Opaque survivors are rasterized into `occluders` for the next frame.
    /// The transparent bucket is sorted back to front when enabled.
    ///
    /// # Errors
    ///
    /// Device failures; fatal.
    pub fn draw_indirect(
        &mut self,
        ctx: &FrameContext,
        table: &InstanceTable,
        mut occluders: Option<&mut OcclusionProxy>,
    ) -> CoreResult<SyncOutcome> {
        debug_assert_eq!(self.stage, VisibilityStage::Compacted, "draw before compact");
        let bucket = self.bucket;
        let sort = bucket == Bucket::Transparent && ctx.config.transparency_sort_enabled;
        let camera = &ctx.camera;

        let visible = &self.visible;
        let draws = &mut self.draws;
        let keys = &mut self.keys;
        draws.clear();
        keys.clear();
        let mut triangles = 0u64;
        table.with_records(|records| {
            table.with_draw_calls(bucket, |calls| {
                // The table may have been cleared since Cull.
                for record in visible.iter().filter_map(|&i| records.get(i as usize)) {
                    let depth = camera.view_depth(record.world_bounds.center());
                    for index in record.draw_calls(bucket) {
                        let Some(&call) = calls.get(index as usize) else {
                            continue;
                        };
                        triangles += u64::from(call.triangles());
                        draws.push(call);
                        if sort {
                            keys.push(depth_sort_key(depth, index));
                        }
                    }
                    if let Some(proxy) = occluders.as_deref_mut() {
                        proxy.add_occluder(&record.world_bounds);
                    }
                }
            });
        });

        let count = self.draws.len();
        if sort {
            self.orderer.sort(&mut self.draws, &self.keys, count);
        }

        let total = table.draw_call_count(bucket).max(count);
        self.culled.resize_zeroed(total);
        let draws = &self.draws;
        self.culled.write_locked(|w| {
            w.elements_mut()[..count].copy_from_slice(draws);
            w.set_dirty(0..count as u64 * DrawIndexedIndirectArgs::SIZE);
        });

        let mut counters = [0u32; COUNTER_WORDS];
        counters[COUNTER_DRAWS] = count as u32;
        counters[COUNTER_VISIBLE] = self.visible.len() as u32;
        counters[COUNTER_TRIANGLES_LO] = triangles as u32;
        counters[COUNTER_TRIANGLES_HI] = (triangles >> 32) as u32;
        self.counters.assign(&counters);

        let mut outcome = self.masks.current().sync_to_device()?;
        outcome.merge(self.compacted.sync_to_device()?);
        outcome.merge(self.culled.sync_to_device()?);
        outcome.merge(self.counters.sync_to_device()?);

        self.stats.draw_calls = total as u32;
        if let (Some(draw_buffer), Some(count_buffer)) = (self.culled.buffer(), self.counters.buffer()) {
            self.device.draw_indexed_indirect_count(&IndirectDraw {
                draw_buffer,
                draw_offset: 0,
                count_buffer,
                count_offset: (COUNTER_DRAWS * 4) as u64,
                max_count: total as u32,
            })?;
            let readback = self
                .device
                .request_readback(count_buffer, 0, (COUNTER_WORDS * 4) as u64)?;
            if self.in_flight.len() == MAX_READBACKS_IN_FLIGHT {
                self.in_flight.pop_front();
                debug!(bucket = bucket.label(), "oldest visibility readback dropped unread");
            }
            self.in_flight.push_back(readback);
        }

        debug!(
            bucket = bucket.label(),
            instances = self.stats.instances,
            visible = self.visible.len(),
            draws = count,
            triangles,
            "visibility"
        );
        self.stage = VisibilityStage::Drawn;
        Ok(outcome)
    }

    /// Runs all four steps.
    ///
    /// # Errors
    ///
    /// Device failures; fatal.
    pub fn run_frame(
        &mut self,
        ctx: &FrameContext,
        frustum: &Frustum,
        occlusion: Option<&OcclusionProxy>,
        table: &InstanceTable,
        occluders: Option<&mut OcclusionProxy>,
    ) -> CoreResult<SyncOutcome> {
        self.reset();
        self.cull(ctx, frustum, occlusion, table);
        self.compact();
        self.draw_indirect(ctx, table, occluders)
    }

    /// Drops every buffer and pending readback.
    pub fn clear(&mut self) {
        for mask in self.masks.both_mut() {
            mask.clear();
        }
        self.compacted.clear();
        self.culled.clear();
        self.counters.clear();
        self.in_flight.clear();
        self.stats = BucketStats::default();
        self.visible.clear();
        self.words.clear();
        self.instance_count = 0;
        self.stage = VisibilityStage::Drawn;
    }
}

fn read_counters(bytes: &[u8]) -> Option<[u32; COUNTER_WORDS]> {
    if bytes.len() < COUNTER_WORDS * 4 {
        return None;
    }
    let mut counters = [0u32; COUNTER_WORDS];
    for (slot, chunk) in counters.iter_mut().zip(bytes.chunks_exact(4)) {
        *slot = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    Some(counters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{AssetData, AssetKind, AssetLoadCache, MemoryAssetSource};
    use crate::pipeline::{Camera, RenderConfig};
    use glam::{Mat4, Vec3};
    use tessel_core::HostDevice;

    struct Fixture {
        device: Arc<HostDevice>,
        table: InstanceTable,
        opaque: VisibilityPipeline,
        transparent: VisibilityPipeline,
    }

    /// Boxes along the x axis at the given positions.
    fn fixture(xs: &[f32], parts: &[bool]) -> Fixture {
        let device = Arc::new(HostDevice::new());
        let dyn_device: Arc<dyn GpuDevice> = device.clone();
        let source = MemoryAssetSource::new().with_asset("box", AssetData::cuboid(Vec3::splat(0.5)).with_parts(parts));
        let cache = AssetLoadCache::new(&dyn_device, AssetKind::MapObject, 1.25);
        let id = cache.acquire("box", &source).unwrap().id;
        let asset = cache.asset(id).unwrap();
        let table = InstanceTable::new(&dyn_device, AssetKind::MapObject);
        for &x in xs {
            table
                .add_instance(&asset, Mat4::from_translation(Vec3::new(x, 0.0, 0.0)))
                .unwrap();
        }
        table.sync().unwrap();
        Fixture {
            opaque: VisibilityPipeline::new(&dyn_device, "test", Bucket::Opaque),
            transparent: VisibilityPipeline::new(&dyn_device, "test", Bucket::Transparent),
            device,
            table,
        }
    }

    fn ctx(config: RenderConfig) -> FrameContext {
        FrameContext::new(Camera::default(), config)
    }

    fn frustum(ctx: &FrameContext) -> Frustum {
        Frustum::from_view_projection(&ctx.camera.view_projection())
    }

    #[test]
    fn test_offscreen_instances_are_culled() {
        let mut f = fixture(&[0.0, 500.0, 2.0], &[false]);
        let ctx = ctx(RenderConfig::default());
        f.opaque.reset();
        f.opaque.cull(&ctx, &frustum(&ctx), None, &f.table);
        assert_eq!(f.opaque.compact(), 2);
        assert_eq!(f.opaque.visible_instances(), &[0, 2]);
        assert_eq!(f.opaque.stats().frustum_culled, 1);
        assert_eq!(f.opaque.current_mask(), vec![0b101]);
    }

    #[test]
    fn test_draw_issues_survivors_only() {
        let mut f = fixture(&[0.0, 500.0, 2.0], &[false, false]);
        let ctx = ctx(RenderConfig::default());
        f.opaque.run_frame(&ctx, &frustum(&ctx), None, &f.table, None).unwrap();

        let draws = f.device.take_executed_draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].count, 4);
        assert_eq!(draws[0].draws.len(), 4);
        assert_eq!(draws[0].triangles(), 4 * 6);
        let firsts: Vec<u32> = draws[0].draws.iter().map(|d| d.first_instance).collect();
        assert_eq!(firsts, vec![0, 1, 4, 5]);
    }

    #[test]
    fn test_counts_arrive_one_frame_late() {
        let mut f = fixture(&[0.0, 1.0], &[false]);
        let ctx = ctx(RenderConfig::default());
        let frustum = frustum(&ctx);

        f.opaque.run_frame(&ctx, &frustum, None, &f.table, None).unwrap();
        assert_eq!(f.opaque.survivor_count(), 0);
        assert_eq!(f.opaque.readbacks_in_flight(), 1);

        f.device.submit_frame().unwrap();
        f.opaque.run_frame(&ctx, &frustum, None, &f.table, None).unwrap();
        assert_eq!(f.opaque.survivor_count(), 2);
        assert_eq!(f.opaque.stats().triangles, 24);
    }

    #[test]
    fn test_masks_swap_each_frame() {
        let mut f = fixture(&[0.0, 500.0], &[false]);
        let ctx = ctx(RenderConfig::default());
        let frustum = frustum(&ctx);
        f.opaque.run_frame(&ctx, &frustum, None, &f.table, None).unwrap();
        assert_eq!(f.opaque.current_mask(), vec![0b01]);

        f.opaque.reset();
        assert_eq!(f.opaque.previous_mask(), vec![0b01]);
    }

    #[test]
    fn test_disabled_culling_draws_everything() {
        let mut f = fixture(&[0.0, 500.0, -500.0], &[false]);
        let config = RenderConfig {
            culling_enabled: false,
            ..RenderConfig::default()
        };
        let ctx = ctx(config);
        f.opaque.run_frame(&ctx, &frustum(&ctx), None, &f.table, None).unwrap();
        assert_eq!(f.opaque.visible_instances(), &[0, 1, 2]);
        assert_eq!(f.opaque.stats().frustum_culled, 0);
        assert_eq!(f.device.take_executed_draws()[0].count, 3);
    }

    #[test]
    fn test_disabling_culling_rewrites_the_mask() {
        let mut f = fixture(&[0.0, 500.0, 2.0], &[false]);
        let culled = ctx(RenderConfig::default());
        let frustum = frustum(&culled);
        f.opaque.run_frame(&culled, &frustum, None, &f.table, None).unwrap();
        f.opaque.run_frame(&culled, &frustum, None, &f.table, None).unwrap();
        assert_eq!(f.opaque.current_mask(), vec![0b101]);

        let bypassed = ctx(RenderConfig {
            culling_enabled: false,
            ..RenderConfig::default()
        });
        f.opaque.run_frame(&bypassed, &frustum, None, &f.table, None).unwrap();
        let mask = f.opaque.current_mask();
        assert_eq!(f.opaque.visible_instances(), &[0, 1, 2]);
        assert_eq!(mask, vec![0b111]);
        assert_eq!(popcount(&mask, 3), f.opaque.visible_instances().len());
    }

    #[test]
    fn test_table_cleared_before_draw() {
        let mut f = fixture(&[0.0, 2.0], &[false, true]);
        let ctx = ctx(RenderConfig::default());
        f.opaque.reset();
        f.opaque.cull(&ctx, &frustum(&ctx), None, &f.table);
        assert_eq!(f.opaque.compact(), 2);

        f.table.clear();
        f.opaque.draw_indirect(&ctx, &f.table, None).unwrap();
        assert!(f.device.take_executed_draws().iter().all(|d| d.count == 0));
        assert_eq!(f.opaque.stage(), VisibilityStage::Drawn);
    }

    #[test]
    fn test_readbacks_in_flight_are_capped() {
        let mut f = fixture(&[0.0, 1.0], &[false]);
        let ctx = ctx(RenderConfig::default());
        let frustum = frustum(&ctx);
        for _ in 0..MAX_READBACKS_IN_FLIGHT + 4 {
            f.opaque.run_frame(&ctx, &frustum, None, &f.table, None).unwrap();
        }
        assert_eq!(f.opaque.readbacks_in_flight(), MAX_READBACKS_IN_FLIGHT);

        f.device.submit_frame().unwrap();
        f.opaque.run_frame(&ctx, &frustum, None, &f.table, None).unwrap();
        assert_eq!(f.opaque.readbacks_in_flight(), 1);
        assert_eq!(f.opaque.survivor_count(), 2);
    }

    #[test]
    fn test_opaque_survivors_become_occluders() {
        let mut f = fixture(&[0.0], &[false]);
        let ctx = ctx(RenderConfig::default());
        let mut proxy = OcclusionProxy::new([16, 16]);
        proxy.begin(&ctx.camera);
        f.opaque
            .run_frame(&ctx, &frustum(&ctx), None, &f.table, Some(&mut proxy))
            .unwrap();
        assert_eq!(proxy.stats().occluders, 1);
    }

    #[test]
    fn test_occluded_instances_are_rejected() {
        let mut f = fixture(&[0.0], &[false]);
        let ctx = ctx(RenderConfig::default());
        let mut proxy = OcclusionProxy::new([64, 32]);
        proxy.begin(&ctx.camera);
        proxy.add_occluder(&crate::culling::Aabb::new(Vec3::new(-5.0, -5.0, 4.0), Vec3::new(5.0, 5.0, 5.0)));

        f.opaque.reset();
        f.opaque.cull(&ctx, &frustum(&ctx), Some(&proxy), &f.table);
        assert_eq!(f.opaque.compact(), 0);
        assert_eq!(f.opaque.stats().occlusion_culled, 1);

        let no_occlusion = FrameContext::new(
            ctx.camera,
            RenderConfig {
                occlusion_culling_enabled: false,
                ..RenderConfig::default()
            },
        );
        f.opaque.reset();
        f.opaque.cull(&no_occlusion, &frustum(&no_occlusion), Some(&proxy), &f.table);
        assert_eq!(f.opaque.compact(), 1);
    }

    #[test]
    fn test_transparent_draws_back_to_front() {
        // Camera at z = 10 looking down -z; offsets along z change depth.
        let device = Arc::new(HostDevice::new());
        let dyn_device: Arc<dyn GpuDevice> = device.clone();
        let source = MemoryAssetSource::new().with_asset("glass", AssetData::cuboid(Vec3::splat(0.5)).transparent());
        let cache = AssetLoadCache::new(&dyn_device, AssetKind::Model, 1.25);
        let asset = cache.asset(cache.acquire("glass", &source).unwrap().id).unwrap();
        let table = InstanceTable::new(&dyn_device, AssetKind::Model);
        for z in [5.0, -20.0, 0.0] {
            table
                .add_instance(&asset, Mat4::from_translation(Vec3::new(0.0, 0.0, z)))
                .unwrap();
        }
        let mut pipeline = VisibilityPipeline::new(&dyn_device, "test", Bucket::Transparent);
        let ctx = ctx(RenderConfig::default());
        pipeline.run_frame(&ctx, &frustum(&ctx), None, &table, None).unwrap();

        let firsts: Vec<u32> = device.take_executed_draws()[0]
            .draws
            .iter()
            .map(|d| d.first_instance)
            .collect();
        assert_eq!(firsts, vec![1, 2, 0]);

        let unsorted = FrameContext::new(
            ctx.camera,
            RenderConfig {
                transparency_sort_enabled: false,
                ..RenderConfig::default()
            },
        );
        pipeline.run_frame(&unsorted, &frustum(&unsorted), None, &table, None).unwrap();
        let firsts: Vec<u32> = device.take_executed_draws()[0]
            .draws
            .iter()
            .map(|d| d.first_instance)
            .collect();
        assert_eq!(firsts, vec![0, 1, 2]);
    }

    #[test]
    fn test_empty_bucket_issues_no_draw() {
        let mut f = fixture(&[0.0], &[false]);
        let ctx = ctx(RenderConfig::default());
        f.transparent.run_frame(&ctx, &frustum(&ctx), None, &f.table, None).unwrap();
        assert_eq!(f.transparent.stats().instances, 0);
        assert!(f.device.take_executed_draws().is_empty());
    }
}
