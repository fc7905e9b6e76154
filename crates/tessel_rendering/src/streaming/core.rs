//! State and load batch shared by every renderer kind.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use glam::Mat4;
use parking_lot::Mutex;
use rayon::prelude::*;
use rayon::ThreadPool;
use tessel_core::{CoreResult, GpuDevice, SyncOutcome};
use tracing::info;

use crate::assets::{AssetKind, AssetLoadCache, AssetSource, AssetStatus, LoadedAsset};
use crate::culling::{Frustum, OcclusionProxy, VisibilityPipeline};
use crate::error::RenderResult;
use crate::instancing::{Bucket, InstanceTable};
use crate::pipeline::{BucketStats, FrameContext, LoadReport};

/// A request to instantiate a named asset at a transform.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    /// Asset name.
    pub name: String,
    /// Object to world.
    pub transform: Mat4,
}

impl Placement {
    /// Creates a placement.
    #[must_use]
    pub fn new(name: impl Into<String>, transform: Mat4) -> Self {
        Self {
            name: name.into(),
            transform,
        }
    }
}

/// Called for every instance a batch creates.
pub type InstanceHook<'a> = &'a (dyn Fn(&LoadedAsset, &Mat4) + Sync);

/// Cache, table, visibility and pending placements of one renderer kind.
pub struct StreamingCore {
    kind: AssetKind,
    cache: AssetLoadCache,
    table: InstanceTable,
    visibility: [VisibilityPipeline; 2],
    pending: Mutex<Vec<Placement>>,
}

impl StreamingCore {
    /// Creates the core of a `kind` renderer around `table`.
    pub fn new(device: &Arc<dyn GpuDevice>, kind: AssetKind, growth_factor: f64, table: InstanceTable) -> Self {
        Self {
            kind,
            cache: AssetLoadCache::new(device, kind, growth_factor),
            table,
            visibility: Bucket::ALL.map(|bucket| VisibilityPipeline::new(device, kind.label(), bucket)),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Renderer kind.
    #[must_use]
    pub const fn kind(&self) -> AssetKind {
        self.kind
    }

    /// Asset cache.
    #[must_use]
    pub const fn cache(&self) -> &AssetLoadCache {
        &self.cache
    }

    /// Instance table.
    #[must_use]
    pub const fn table(&self) -> &InstanceTable {
        &self.table
    }

    /// Visibility pipeline of a bucket.
    #[must_use]
    pub fn visibility(&self, bucket: Bucket) -> &VisibilityPipeline {
        &self.visibility[bucket.index()]
    }

    /// Queues a placement for the next batch.
    pub fn register_load(&self, placement: Placement) {
        self.pending.lock().push(placement);
    }

    /// Placements waiting for a batch.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Loads and instantiates every pending placement on `pool`, then syncs
    /// the cache and table.
    ///
    /// Placements whose asset failed are skipped. `on_instance` runs for
    /// each instance created, on the worker that created it.
    ///
    /// # Errors
    ///
    /// Fatal errors only; the batch stops at the first.
    pub fn execute_load(
        &self,
        pool: &ThreadPool,
        source: &dyn AssetSource,
        on_instance: Option<InstanceHook<'_>>,
    ) -> RenderResult<LoadReport> {
        let batch = std::mem::take(&mut *self.pending.lock());
        if batch.is_empty() {
            return Ok(LoadReport::default());
        }
        let started = Instant::now();
        let loaded = AtomicU32::new(0);
        let failed = AtomicU32::new(0);
        let instances = AtomicU32::new(0);
        let skipped = AtomicU32::new(0);
        let draw_calls = AtomicU32::new(0);

        // `install` returns once every placement is processed.
        pool.install(|| {
            batch.par_iter().try_for_each(|placement| -> RenderResult<()> {
                let acquired = self.cache.acquire(&placement.name, source)?;
                if acquired.loaded_here {
                    match acquired.status {
                        AssetStatus::Ready => loaded.fetch_add(1, Ordering::Relaxed),
                        _ => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
                if acquired.status != AssetStatus::Ready {
                    skipped.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }

                let created = self.cache.with_asset(acquired.id, |asset| -> CoreResult<()> {
                    self.table.add_instance(asset, placement.transform)?;
                    draw_calls.fetch_add(asset.draw_call_count() as u32, Ordering::Relaxed);
                    if let Some(hook) = on_instance {
                        hook(asset, &placement.transform);
                    }
                    Ok(())
                });
                if let Some(result) = created {
                    result?;
                    instances.fetch_add(1, Ordering::Relaxed);
                }
                Ok(())
            })
        })?;

        let mut outcome = self.cache.sync()?;
        outcome.merge(self.table.sync()?);

        let report = LoadReport {
            assets_loaded: loaded.into_inner(),
            assets_failed: failed.into_inner(),
            instances_created: instances.into_inner(),
            placements_skipped: skipped.into_inner(),
            draw_calls_created: draw_calls.into_inner(),
            decorations_spawned: 0,
            rebind_required: outcome.resized,
            elapsed: started.elapsed(),
        };
        info!(
            kind = self.kind.label(),
            placements = batch.len(),
            loaded = report.assets_loaded,
            failed = report.assets_failed,
            instances = report.instances_created,
            skipped = report.placements_skipped,
            draw_calls = report.draw_calls_created,
            uploaded = outcome.bytes,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "load batch complete"
        );
        Ok(report)
    }

    /// Reset, Cull and Compact for both buckets.
    pub fn cull(&mut self, ctx: &FrameContext, frustum: &Frustum, occlusion: Option<&OcclusionProxy>) {
        let table = &self.table;
        for pipeline in &mut self.visibility {
            pipeline.reset();
            pipeline.cull(ctx, frustum, occlusion, table);
            pipeline.compact();
        }
    }

    /// DrawIndirect for both buckets, opaque first. Opaque survivors are
    /// written to `occluders`.
    ///
    /// # Errors
    ///
    /// Device failures; fatal.
    pub fn draw(&mut self, ctx: &FrameContext, occluders: Option<&mut OcclusionProxy>) -> CoreResult<SyncOutcome> {
        let table = &self.table;
        let [opaque, transparent] = &mut self.visibility;
        let mut outcome = opaque.draw_indirect(ctx, table, occluders)?;
        outcome.merge(transparent.draw_indirect(ctx, table, None)?);
        Ok(outcome)
    }

    /// Visibility counters of a bucket.
    #[must_use]
    pub fn stats(&self, bucket: Bucket) -> BucketStats {
        self.visibility[bucket.index()].stats()
    }

    /// Drops every asset, instance and pending placement.
    pub fn clear(&mut self) {
        self.pending.lock().clear();
        self.table.clear();
        self.cache.clear();
        for pipeline in &mut self.visibility {
            pipeline.clear();
        }
    }
}
