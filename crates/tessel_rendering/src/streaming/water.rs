//! Water patches.

use std::sync::Arc;

use glam::Mat4;
use tessel_core::GpuDevice;

use super::{Placement, StreamingCore};
use crate::assets::AssetKind;
use crate::instancing::InstanceTable;
use crate::pipeline::RenderConfig;

/// Renderer for water. Every draw call of a water asset goes to the
/// transparent bucket, whatever the asset says.
pub struct WaterRenderer {
    core: StreamingCore,
}

impl WaterRenderer {
    /// Creates an empty water renderer.
    pub fn new(device: &Arc<dyn GpuDevice>, config: &RenderConfig) -> Self {
        let kind = AssetKind::Water;
        Self {
            core: StreamingCore::new(
                device,
                kind,
                config.allocator_growth_factor,
                InstanceTable::new(device, kind),
            ),
        }
    }

    /// Queues a water patch.
    pub fn register_patch(&self, name: impl Into<String>, transform: Mat4) {
        self.core.register_load(Placement::new(name, transform));
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
