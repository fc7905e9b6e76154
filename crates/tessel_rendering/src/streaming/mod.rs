//! The four streaming renderers.
//!
//! Every kind shares one [`StreamingCore`]; the variants add what is
//! specific to them (bones, decorations, chunk grids, forced transparency).
//!
//! ```text
//!   register_load ──▶ pending ──execute_load──▶ cache ──▶ table
//!                                                           │
//!   render frame:  cull (reset, cull, compact) ──▶ draw ◀───┘
//! ```

mod core;
mod map_object;
mod model;
mod terrain;
mod water;

use std::sync::Arc;

use rayon::ThreadPool;
use tessel_core::{CoreResult, GpuDevice, SyncOutcome};

use crate::assets::{AssetId, AssetKind, AssetSource};
use crate::culling::{Frustum, OcclusionProxy};
use crate::error::RenderResult;
use crate::instancing::Bucket;
use crate::pipeline::{BucketStats, FrameContext, LoadReport, RenderConfig};

pub use self::core::{InstanceHook, Placement, StreamingCore};
pub use map_object::MapObjectRenderer;
pub use model::ModelRenderer;
pub use terrain::{terrain_chunk_name, TerrainRenderer, TERRAIN_CHUNK_SIZE};
pub use water::WaterRenderer;

/// A renderer of one asset kind.
pub enum StreamingRenderer {
    /// Models, possibly animated.
    Model(ModelRenderer),
    /// Map objects and their decorations.
    MapObject(MapObjectRenderer),
    /// Terrain chunks.
    Terrain(TerrainRenderer),
    /// Water patches.
    Water(WaterRenderer),
}

impl StreamingRenderer {
    /// Creates an empty renderer of `kind`.
    pub fn new(device: &Arc<dyn GpuDevice>, kind: AssetKind, config: &RenderConfig) -> Self {
        match kind {
            AssetKind::Model => Self::Model(ModelRenderer::new(device, config)),
            AssetKind::MapObject => Self::MapObject(MapObjectRenderer::new(device, config)),
            AssetKind::Terrain => Self::Terrain(TerrainRenderer::new(device, config)),
            AssetKind::Water => Self::Water(WaterRenderer::new(device, config)),
        }
    }

    /// Shared renderer state.
    #[must_use]
    pub const fn core(&self) -> &StreamingCore {
        match self {
            Self::Model(r) => r.core(),
            Self::MapObject(r) => r.core(),
            Self::Terrain(r) => r.core(),
            Self::Water(r) => r.core(),
        }
    }

    fn core_mut(&mut self) -> &mut StreamingCore {
        match self {
            Self::Model(r) => r.core_mut(),
            Self::MapObject(r) => r.core_mut(),
            Self::Terrain(r) => r.core_mut(),
            Self::Water(r) => r.core_mut(),
        }
    }

    /// Asset kind this renderer draws.
    #[must_use]
    pub const fn kind(&self) -> AssetKind {
        self.core().kind()
    }

    /// Queues a placement for the next [`execute_load`](Self::execute_load).
    pub fn register_load(&self, placement: Placement) {
        self.core().register_load(placement);
    }

    /// Loads and instantiates every queued placement.
    ///
    /// # Errors
    ///
    /// Fatal errors only. Missing or malformed assets are counted in the
    /// report and their placements skipped.
    pub fn execute_load(&self, pool: &ThreadPool, source: &dyn AssetSource) -> RenderResult<LoadReport> {
        match self {
            Self::MapObject(r) => r.execute_load(pool, source),
            _ => self.core().execute_load(pool, source, None),
        }
    }

    /// Reset, Cull and Compact for both buckets.
    pub fn cull(&mut self, ctx: &FrameContext, frustum: &Frustum, occlusion: Option<&OcclusionProxy>) {
        self.core_mut().cull(ctx, frustum, occlusion);
    }

    /// DrawIndirect for both buckets.
    ///
    /// # Errors
    ///
    /// Device failures; fatal.
    pub fn draw(&mut self, ctx: &FrameContext, occluders: Option<&mut OcclusionProxy>) -> CoreResult<SyncOutcome> {
        self.core_mut().draw(ctx, occluders)
    }

    /// Drops every asset and instance. Instance ids restart at zero.
    pub fn clear(&mut self) {
        match self {
            Self::MapObject(r) => r.clear(),
            other => other.core_mut().clear(),
        }
    }

    /// Instances created so far.
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.core().table().instance_count()
    }

    /// Draw calls in `bucket` across all instances.
    #[must_use]
    pub fn draw_call_count(&self, bucket: Bucket) -> usize {
        self.core().table().draw_call_count(bucket)
    }

    /// Draw calls that survived culling in `bucket`, as last read back from
    /// the device.
    #[must_use]
    pub fn survivor_count(&self, bucket: Bucket) -> u32 {
        self.core().visibility(bucket).survivor_count()
    }

    /// Asset that draw call `draw_call_index` of `bucket` belongs to.
    #[must_use]
    pub fn resolve_asset_for_draw_call(&self, draw_call_index: u32, bucket: Bucket) -> AssetId {
        self.core().table().resolve_asset(draw_call_index, bucket)
    }

    /// Visibility counters of `bucket`.
    #[must_use]
    pub fn stats(&self, bucket: Bucket) -> BucketStats {
        self.core().stats(bucket)
    }

    /// Model renderer, if this is one.
    #[must_use]
    pub const fn as_model(&self) -> Option<&ModelRenderer> {
        match self {
            Self::Model(r) => Some(r),
            _ => None,
        }
    }

    /// Map-object renderer, if this is one.
    #[must_use]
    pub const fn as_map_object(&self) -> Option<&MapObjectRenderer> {
        match self {
            Self::MapObject(r) => Some(r),
            _ => None,
        }
    }

    /// Terrain renderer, if this is one.
    #[must_use]
    pub const fn as_terrain(&self) -> Option<&TerrainRenderer> {
        match self {
            Self::Terrain(r) => Some(r),
            _ => None,
        }
    }

    /// Water renderer, if this is one.
    #[must_use]
    pub const fn as_water(&self) -> Option<&WaterRenderer> {
        match self {
            Self::Water(r) => Some(r),
            _ => None,
        }
    }
}
