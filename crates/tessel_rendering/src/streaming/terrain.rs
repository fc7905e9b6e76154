//! Terrain chunks on a regular grid.

use std::sync::Arc;

use glam::{Mat4, Vec3};
use tessel_core::GpuDevice;

use super::{Placement, StreamingCore};
use crate::assets::AssetKind;
use crate::instancing::InstanceTable;
use crate::pipeline::RenderConfig;

/// Edge length of a terrain chunk in world units.
pub const TERRAIN_CHUNK_SIZE: f32 = 32.0;

/// Asset name of a terrain chunk.
#[must_use]
pub fn terrain_chunk_name(map: &str, x: i32, y: i32) -> String {
    format!("terrain/{map}/{x}_{y}")
}

/// Renderer for terrain chunks.
pub struct TerrainRenderer {
    core: StreamingCore,
}

impl TerrainRenderer {
    /// Creates an empty terrain renderer.
    pub fn new(device: &Arc<dyn GpuDevice>, config: &RenderConfig) -> Self {
        let kind = AssetKind::Terrain;
        Self {
            core: StreamingCore::new(
                device,
                kind,
                config.allocator_growth_factor,
                InstanceTable::new(device, kind),
            ),
        }
    }

    /// Queues chunk `(x, y)` of `map`. The chunk's origin is its grid
    /// corner on the ground plane.
    pub fn register_chunk(&self, map: &str, x: i32, y: i32) {
        let origin = Vec3::new(x as f32 * TERRAIN_CHUNK_SIZE, 0.0, y as f32 * TERRAIN_CHUNK_SIZE);
        self.core
            .register_load(Placement::new(terrain_chunk_name(map, x, y), Mat4::from_translation(origin)));
    }

    /// Shared renderer state.
    #[must_use]
    pub const fn core(&self) -> &StreamingCore {
        &self.core
    }

    /// Mutable shared renderer state.
    pub fn core_mut(&mut self) -> &mut StreamingCore {
        &mut self.core
    }
}
