//! # Scene
//!
//! Owns one renderer per asset kind and drives them through load batches
//! and frames.
//!
//! ```text
//! execute_load():
//! ┌──────────────────────────────────────────────────────────────┐
//! │ 1. MapObject batch        decorations ──▶ queue              │
//! │ 2. Drain queue            queue ──▶ Model pending            │
//! │ 3. Model/Terrain/Water    one batch each                     │
//! │ 4. Repeat while anything is pending                          │
//! └──────────────────────────────────────────────────────────────┘
//!
//! render_frame(ctx):
//! ┌──────────────────────────────────────────────────────────────┐
//! │ 1. Begin occlusion proxy  (current)                          │
//! │ 2. Resolve frustum        (live or locked)                   │
//! │ 3. Cull every renderer    against previous proxy             │
//! │ 4. Draw every renderer    opaque survivors ──▶ current proxy │
//! │ 5. Swap proxies, submit   readbacks resolve                  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use glam::Mat4;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tessel_core::{DoubleBuffered, GpuDevice};
use tracing::{debug, error, info};

use crate::assets::{AssetId, AssetKind, AssetSource};
use crate::culling::{Frustum, FrustumLock, OcclusionProxy};
use crate::error::{RenderError, RenderResult};
use crate::instancing::{Bucket, InstanceId};
use crate::pipeline::{Camera, FrameContext, LoadReport, RenderConfig, RenderStats};
use crate::streaming::{Placement, StreamingRenderer};

/// Every renderer plus the state shared between frames.
pub struct Scene {
    device: Arc<dyn GpuDevice>,
    source: Arc<dyn AssetSource>,
    pool: ThreadPool,
    config: RenderConfig,
    /// Indexed by [`AssetKind::index`].
    renderers: [StreamingRenderer; 4],
    occlusion: DoubleBuffered<OcclusionProxy>,
    frustum_lock: FrustumLock,
    frame_count: u64,
}

impl Scene {
    /// Creates an empty scene.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::WorkerPool`] if the load pool cannot be built.
    pub fn new(
        device: Arc<dyn GpuDevice>,
        source: Arc<dyn AssetSource>,
        config: RenderConfig,
    ) -> RenderResult<Self> {
        let mut builder = ThreadPoolBuilder::new().thread_name(|n| format!("tessel-load-{n}"));
        if config.worker_threads > 0 {
            builder = builder.num_threads(config.worker_threads);
        }
        let pool = builder.build().map_err(|err| RenderError::WorkerPool(err.to_string()))?;
        info!(threads = pool.current_num_threads(), "scene created");

        let renderers = AssetKind::ALL.map(|kind| StreamingRenderer::new(&device, kind, &config));
        let tiles = config.occlusion_tiles;
        Ok(Self {
            device,
            source,
            pool,
            config,
            renderers,
            occlusion: DoubleBuffered::from_fn(|| OcclusionProxy::new(tiles)),
            frustum_lock: FrustumLock::default(),
            frame_count: 0,
        })
    }

    /// Device the scene renders with.
    #[must_use]
    pub fn device(&self) -> &Arc<dyn GpuDevice> {
        &self.device
    }

    /// Current configuration.
    #[must_use]
    pub const fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Replaces the configuration. Toggles apply from the next frame built
    /// with [`frame_context`](Self::frame_context). Allocator sizing is
    /// fixed when the scene is created.
    pub fn set_config(&mut self, config: RenderConfig) {
        if config.occlusion_tiles != self.config.occlusion_tiles {
            for proxy in self.occlusion.both_mut() {
                proxy.resize(config.occlusion_tiles);
            }
        }
        self.config = config;
    }

    /// Frame context for `camera` at `time` with the scene's configuration.
    #[must_use]
    pub fn frame_context(&self, camera: Camera, time: f32) -> FrameContext {
        FrameContext {
            camera,
            time,
            config: self.config.clone(),
        }
    }

    /// Renderer of `kind`.
    #[must_use]
    pub fn renderer(&self, kind: AssetKind) -> &StreamingRenderer {
        &self.renderers[kind.index()]
    }

    /// Queues `name` at `transform` for the next [`execute_load`](Self::execute_load).
    pub fn register_load(&self, kind: AssetKind, name: impl Into<String>, transform: Mat4) {
        self.renderer(kind).register_load(Placement::new(name, transform));
    }

    /// Queues terrain chunk `(x, y)` of `map` at its grid origin.
    pub fn register_terrain_chunk(&self, map: &str, x: i32, y: i32) {
        if let Some(terrain) = self.renderer(AssetKind::Terrain).as_terrain() {
            terrain.register_chunk(map, x, y);
        }
    }

    /// Placements waiting for a batch, across all kinds.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.renderers.iter().map(|r| r.core().pending_count()).sum()
    }

    /// Runs load batches until nothing is pending. Decorations spawned by
    /// map objects are loaded as models in the same call.
    ///
    /// # Errors
    ///
    /// Fatal errors only.
    pub fn execute_load(&mut self) -> RenderResult<LoadReport> {
        let mut total = LoadReport::default();
        let mut rounds = 0u32;
        while self.pending_count() > 0 {
            rounds += 1;
            for kind in [AssetKind::MapObject, AssetKind::Model, AssetKind::Terrain, AssetKind::Water] {
                let report = self
                    .renderer(kind)
                    .execute_load(&self.pool, self.source.as_ref())
                    .map_err(|err| {
                        error!(kind = kind.label(), %err, "load batch failed");
                        err
                    })?;
                total.merge(&report);
                if kind == AssetKind::MapObject {
                    self.forward_decorations();
                }
            }
        }
        if rounds > 0 {
            info!(
                rounds,
                loaded = total.assets_loaded,
                failed = total.assets_failed,
                instances = total.instances_created,
                decorations = total.decorations_spawned,
                "scene load complete"
            );
        }
        Ok(total)
    }

    fn forward_decorations(&self) {
        let Some(map_objects) = self.renderer(AssetKind::MapObject).as_map_object() else {
            return;
        };
        let decorations = map_objects.drain_decorations();
        if decorations.is_empty() {
            return;
        }
        debug!(count = decorations.len(), "forwarding decorations to models");
        let models = self.renderer(AssetKind::Model);
        for placement in decorations {
            models.register_load(placement);
        }
    }

    /// Overwrites the transform of an existing instance.
    ///
    /// An unknown `id` trips a debug assertion and returns `false`.
    pub fn set_transform(&self, kind: AssetKind, id: InstanceId, transform: Mat4) -> bool {
        self.renderer(kind).core().table().set_transform(id, transform)
    }

    /// Renders one frame with every renderer.
    ///
    /// # Errors
    ///
    /// Device failures; fatal.
    pub fn render_frame(&mut self, ctx: &FrameContext) -> RenderResult<RenderStats> {
        let config = &ctx.config;
        if self.occlusion.current().tiles() != config.occlusion_tiles {
            for proxy in self.occlusion.both_mut() {
                proxy.resize(config.occlusion_tiles);
            }
        }
        let occlusion_on = config.culling_enabled && config.occlusion_culling_enabled;
        if occlusion_on {
            self.occlusion.current_mut().begin(&ctx.camera);
        } else {
            self.occlusion.current_mut().invalidate();
        }

        let live = Frustum::from_view_projection(&ctx.camera.view_projection());
        let frustum = self.frustum_lock.resolve(live, config.lock_frustum);

        let (current, previous) = self.occlusion.split();
        let previous = Some(previous).filter(|proxy| occlusion_on && proxy.is_valid());
        for renderer in &mut self.renderers {
            let outcome = renderer.core().table().sync()?;
            if outcome.resized {
                debug!(kind = renderer.kind().label(), "instance buffers replaced");
            }
            renderer.cull(ctx, &frustum, previous);
        }

        let mut stats = RenderStats {
            frame: self.frame_count,
            ..RenderStats::default()
        };
        for renderer in &mut self.renderers {
            let occluders = occlusion_on.then_some(&mut *current);
            renderer.draw(ctx, occluders)?;
            for bucket in Bucket::ALL {
                if renderer.draw_call_count(bucket) > 0 {
                    stats.submissions += 1;
                }
            }
            stats.opaque.accumulate(&renderer.stats(Bucket::Opaque));
            stats.transparent.accumulate(&renderer.stats(Bucket::Transparent));
        }

        self.occlusion.swap();
        self.device.submit_frame()?;
        self.frame_count += 1;
        debug!(
            frame = stats.frame,
            visible = stats.opaque.visible_instances + stats.transparent.visible_instances,
            submissions = stats.submissions,
            locked = self.frustum_lock.is_locked(),
            "frame rendered"
        );
        Ok(stats)
    }

    /// Frames rendered since creation or the last [`clear`](Self::clear).
    #[must_use]
    pub const fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Unloads everything. Instance ids restart at zero.
    pub fn clear(&mut self) {
        for renderer in &mut self.renderers {
            renderer.clear();
        }
        for proxy in self.occlusion.both_mut() {
            proxy.invalidate();
        }
        self.frustum_lock = FrustumLock::default();
        self.frame_count = 0;
        info!("scene cleared");
    }

    /// Instances of `kind`.
    #[must_use]
    pub fn instance_count(&self, kind: AssetKind) -> usize {
        self.renderer(kind).instance_count()
    }

    /// Draw calls of `kind` in `bucket`.
    #[must_use]
    pub fn draw_call_count(&self, kind: AssetKind, bucket: Bucket) -> usize {
        self.renderer(kind).draw_call_count(bucket)
    }

    /// Draw calls of `kind` in `bucket` that survived culling, one frame
    /// stale.
    #[must_use]
    pub fn survivor_count(&self, kind: AssetKind, bucket: Bucket) -> u32 {
        self.renderer(kind).survivor_count(bucket)
    }

    /// Asset behind draw call `draw_call_index` of `kind` in `bucket`.
    #[must_use]
    pub fn resolve_asset_for_draw_call(&self, kind: AssetKind, draw_call_index: u32, bucket: Bucket) -> AssetId {
        self.renderer(kind).resolve_asset_for_draw_call(draw_call_index, bucket)
    }

    /// Assets of `kind` that loaded.
    #[must_use]
    pub fn loaded_asset_count(&self, kind: AssetKind) -> u32 {
        self.renderer(kind).core().cache().loaded_count()
    }

    /// Assets of `kind` that failed to load.
    #[must_use]
    pub fn failed_asset_count(&self, kind: AssetKind) -> u32 {
        self.renderer(kind).core().cache().failed_count()
    }
}
