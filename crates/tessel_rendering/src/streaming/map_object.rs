//! Placed structures and their decorations.
//!
//! A map object can carry decorations: models placed relative to it. Each
//! new instance queues its decorations instead of loading them inline, so a
//! batch never recurses. The scene drains the queue into the model renderer
//! after the batch.

use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use glam::Mat4;
use rayon::ThreadPool;
use tessel_core::GpuDevice;

use super::{Placement, StreamingCore};
use crate::assets::{AssetKind, AssetSource, LoadedAsset};
use crate::error::RenderResult;
use crate::instancing::InstanceTable;
use crate::pipeline::{LoadReport, RenderConfig};

/// Renderer for map objects.
pub struct MapObjectRenderer {
    core: StreamingCore,
    decorations_tx: Sender<Placement>,
    decorations_rx: Receiver<Placement>,
}

impl MapObjectRenderer {
    /// Creates an empty map-object renderer.
    pub fn new(device: &Arc<dyn GpuDevice>, config: &RenderConfig) -> Self {
        let kind = AssetKind::MapObject;
        let (decorations_tx, decorations_rx) = unbounded();
        Self {
            core: StreamingCore::new(
                device,
                kind,
                config.allocator_growth_factor,
                InstanceTable::new(device, kind),
            ),
            decorations_tx,
            decorations_rx,
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

    /// Runs the pending batch, queueing the decorations of every new
    /// instance.
    ///
    /// # Errors
    ///
    /// Fatal errors only.
    pub fn execute_load(&self, pool: &ThreadPool, source: &dyn AssetSource) -> RenderResult<LoadReport> {
        let tx = &self.decorations_tx;
        let spawn = move |asset: &LoadedAsset, parent: &Mat4| {
            for decoration in &asset.decorations {
                // The receiver lives in `self`, so the send cannot fail.
                let _ = tx.send(Placement::new(decoration.name.clone(), *parent * decoration.transform));
            }
        };
        let mut report = self.core.execute_load(pool, source, Some(&spawn))?;
        report.decorations_spawned = self.decorations_rx.len() as u32;
        Ok(report)
    }

    /// Decoration placements queued so far.
    #[must_use]
    pub fn queued_decorations(&self) -> usize {
        self.decorations_rx.len()
    }

    /// Takes every queued decoration placement.
    pub fn drain_decorations(&self) -> Vec<Placement> {
        self.decorations_rx.try_iter().collect()
    }

    /// Drops every asset, instance and queued decoration.
    pub fn clear(&mut self) {
        self.drain_decorations();
        self.core.clear();
    }
}
