//! Standalone and animated models.

use std::sync::Arc;

use tessel_core::GpuDevice;

use super::StreamingCore;
use crate::assets::AssetKind;
use crate::instancing::{BoneStorage, InstanceTable};
use crate::pipeline::RenderConfig;

/// Renderer for models. Animated assets get bone-deform and bone-instance
/// ranges for every instance.
pub struct ModelRenderer {
    core: StreamingCore,
}

impl ModelRenderer {
    /// Creates an empty model renderer.
    pub fn new(device: &Arc<dyn GpuDevice>, config: &RenderConfig) -> Self {
        let kind = AssetKind::Model;
        let bones = BoneStorage::new(
            device,
            kind.label(),
            config.initial_bone_capacity,
            config.allocator_growth_factor,
        );
        let table = InstanceTable::new(device, kind).with_bones(bones);
        Self {
            core: StreamingCore::new(device, kind, config.allocator_growth_factor, table),
        }
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

    /// Bone storage.
    #[must_use]
    pub fn bones(&self) -> Option<&BoneStorage> {
        self.core.table().bones()
    }
}
