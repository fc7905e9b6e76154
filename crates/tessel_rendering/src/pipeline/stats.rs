//! Load and frame statistics.

use std::time::Duration;

/// Visibility counters for one bucket of one renderer.
///
/// `survivors` and `triangles` come from device readbacks and lag one frame
/// behind the host-side counters. A zero there right after a load is
/// expected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BucketStats {
    /// Instances with draw calls in this bucket.
    pub instances: u32,
    /// Instances that passed Cull this frame.
    pub visible_instances: u32,
    /// Instances rejected by the frustum test.
    pub frustum_culled: u32,
    /// Instances rejected by the occlusion test.
    pub occlusion_culled: u32,
    /// Draw calls in this bucket.
    pub draw_calls: u32,
    /// Surviving draw calls, read back from the device.
    pub survivors: u32,
    /// Triangles drawn, read back from the device.
    pub triangles: u64,
}

impl BucketStats {
    /// Adds another bucket's counters.
    pub fn accumulate(&mut self, other: &Self) {
        self.instances += other.instances;
        self.visible_instances += other.visible_instances;
        self.frustum_culled += other.frustum_culled;
        self.occlusion_culled += other.occlusion_culled;
        self.draw_calls += other.draw_calls;
        self.survivors += other.survivors;
        self.triangles += other.triangles;
    }
}

/// Totals for a rendered frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Frame number.
    pub frame: u64,
    /// Opaque buckets of all renderers.
    pub opaque: BucketStats,
    /// Transparent buckets of all renderers.
    pub transparent: BucketStats,
    /// Indirect submissions issued.
    pub submissions: u32,
}

/// Outcome of one `execute_load`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Assets loaded successfully.
    pub assets_loaded: u32,
    /// Assets that failed to load.
    pub assets_failed: u32,
    /// Instances created.
    pub instances_created: u32,
    /// Placements skipped because their asset failed.
    pub placements_skipped: u32,
    /// Draw calls created.
    pub draw_calls_created: u32,
    /// Decoration placements spawned by composite assets.
    pub decorations_spawned: u32,
    /// A device buffer was replaced; bindings must be rebuilt.
    pub rebind_required: bool,
    /// Wall time.
    pub elapsed: Duration,
}

impl LoadReport {
    /// Adds another report's counters.
    pub fn merge(&mut self, other: &Self) {
        self.assets_loaded += other.assets_loaded;
        self.assets_failed += other.assets_failed;
        self.instances_created += other.instances_created;
        self.placements_skipped += other.placements_skipped;
        self.draw_calls_created += other.draw_calls_created;
        self.decorations_spawned += other.decorations_spawned;
        self.rebind_required |= other.rebind_required;
        self.elapsed += other.elapsed;
    }
}
