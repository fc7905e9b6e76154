//! # wgpu Backend
//!
//! Maps the device contract onto `wgpu`. Uploads and copies are recorded
//! into one command encoder so they execute in call order; uploads go
//! through short-lived `COPY_SRC` staging buffers for that reason instead of
//! `Queue::write_buffer`, which would jump ahead of already recorded copies.
//!
//! Indirect draws are recorded and handed back to the caller through
//! [`WgpuDevice::take_recorded_draws`], since render passes belong to the
//! embedding application.
//!
//! Requires `Features::MULTI_DRAW_INDIRECT_COUNT` on the device for the
//! replayed draws.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{error, warn};
use wgpu::util::DeviceExt;

use super::{
    BufferDesc, BufferHandle, BufferUsage, GpuDevice, IndirectDraw, Readback, ReadbackSender,
    COPY_ALIGNMENT,
};
use crate::error::{CoreError, CoreResult};
use crate::memory::align_up;

/// An indirect draw ready to be encoded into a render pass.
#[derive(Debug, Clone)]
pub struct RecordedDraw {
    draw_buffer: Arc<wgpu::Buffer>,
    draw_offset: u64,
    count_buffer: Arc<wgpu::Buffer>,
    count_offset: u64,
    max_count: u32,
}

impl RecordedDraw {
    /// Encodes the draw. The pipeline and vertex/index bindings are the
    /// caller's.
    pub fn encode<'a>(&'a self, pass: &mut wgpu::RenderPass<'a>) {
        pass.multi_draw_indexed_indirect_count(
            &self.draw_buffer,
            self.draw_offset,
            &self.count_buffer,
            self.count_offset,
            self.max_count,
        );
    }
}

struct PendingReadback {
    staging: Arc<wgpu::Buffer>,
    size: u64,
    sender: Option<ReadbackSender>,
    /// Set by the map callback: `Some(true)` mapped, `Some(false)` failed.
    mapped: Arc<Mutex<Option<bool>>>,
    map_requested: bool,
}

/// [`GpuDevice`] over a `wgpu` device and queue.
pub struct WgpuDevice {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    buffers: RwLock<Vec<Option<Arc<wgpu::Buffer>>>>,
    encoder: Mutex<Option<wgpu::CommandEncoder>>,
    draws: Mutex<Vec<RecordedDraw>>,
    readbacks: Mutex<Vec<PendingReadback>>,
}

impl WgpuDevice {
    /// Wraps an existing device and queue.
    #[must_use]
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self {
            device,
            queue,
            buffers: RwLock::new(Vec::new()),
            encoder: Mutex::new(None),
            draws: Mutex::new(Vec::new()),
            readbacks: Mutex::new(Vec::new()),
        }
    }

    /// The underlying buffer, for bind group creation.
    #[must_use]
    pub fn raw_buffer(&self, buffer: BufferHandle) -> Option<Arc<wgpu::Buffer>> {
        self.buffers.read().get(buffer.0 as usize).and_then(Clone::clone)
    }

    /// Drains the indirect draws recorded since the last call.
    pub fn take_recorded_draws(&self) -> Vec<RecordedDraw> {
        std::mem::take(&mut *self.draws.lock())
    }

    fn lookup(&self, buffer: BufferHandle) -> CoreResult<Arc<wgpu::Buffer>> {
        self.raw_buffer(buffer).ok_or(CoreError::UnknownBuffer(buffer))
    }

    fn with_encoder<R>(&self, f: impl FnOnce(&mut wgpu::CommandEncoder) -> R) -> R {
        let mut slot = self.encoder.lock();
        let encoder = slot.get_or_insert_with(|| {
            self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("tessel transfer"),
            })
        });
        f(encoder)
    }

    fn check_range(buffer: BufferHandle, raw: &wgpu::Buffer, offset: u64, size: u64) -> CoreResult<()> {
        let capacity = raw.size();
        match offset.checked_add(size) {
            Some(end) if end <= capacity => Ok(()),
            _ => Err(CoreError::OutOfBounds { buffer, offset, size, capacity }),
        }
    }

    fn check_usage(buffer: BufferHandle, raw: &wgpu::Buffer, required: wgpu::BufferUsages) -> CoreResult<()> {
        if raw.usage().contains(required) {
            Ok(())
        } else {
            Err(CoreError::MissingUsage {
                buffer,
                required: from_wgpu_usage(required),
            })
        }
    }
}

fn to_wgpu_usage(usage: BufferUsage) -> wgpu::BufferUsages {
    let mut out = wgpu::BufferUsages::empty();
    for (flag, raw) in [
        (BufferUsage::VERTEX, wgpu::BufferUsages::VERTEX),
        (BufferUsage::INDEX, wgpu::BufferUsages::INDEX),
        (BufferUsage::STORAGE, wgpu::BufferUsages::STORAGE),
        (BufferUsage::INDIRECT, wgpu::BufferUsages::INDIRECT),
        (BufferUsage::COPY_SRC, wgpu::BufferUsages::COPY_SRC),
        (BufferUsage::COPY_DST, wgpu::BufferUsages::COPY_DST),
        (BufferUsage::MAP_READ, wgpu::BufferUsages::MAP_READ),
        (BufferUsage::UNIFORM, wgpu::BufferUsages::UNIFORM),
    ] {
        if usage.contains(flag) {
            out |= raw;
        }
    }
    out
}

fn from_wgpu_usage(usage: wgpu::BufferUsages) -> BufferUsage {
    let mut out = BufferUsage::empty();
    if usage.contains(wgpu::BufferUsages::COPY_SRC) {
        out |= BufferUsage::COPY_SRC;
    }
    if usage.contains(wgpu::BufferUsages::COPY_DST) {
        out |= BufferUsage::COPY_DST;
    }
    if usage.contains(wgpu::BufferUsages::INDIRECT) {
        out |= BufferUsage::INDIRECT;
    }
    out
}

impl GpuDevice for WgpuDevice {
    fn create_buffer(&self, desc: &BufferDesc<'_>) -> CoreResult<BufferHandle> {
        let size = align_up(desc.size.max(COPY_ALIGNMENT), COPY_ALIGNMENT);

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(desc.label),
            size,
            usage: to_wgpu_usage(desc.usage),
            mapped_at_creation: false,
        });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            error!(label = desc.label, size, %err, "device buffer creation failed");
            return Err(CoreError::OutOfDeviceMemory {
                label: desc.label.to_owned(),
                requested: size,
            });
        }

        let mut buffers = self.buffers.write();
        let handle = BufferHandle(buffers.len() as u32);
        buffers.push(Some(Arc::new(buffer)));
        Ok(handle)
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        let removed = self
            .buffers
            .write()
            .get_mut(buffer.0 as usize)
            .and_then(Option::take);
        // In-flight commands keep their own reference; wgpu frees it after use.
        drop(removed);
    }

    fn buffer_size(&self, buffer: BufferHandle) -> Option<u64> {
        self.raw_buffer(buffer).map(|b| b.size())
    }

    fn copy_buffer(
        &self,
        src: BufferHandle,
        src_offset: u64,
        dst: BufferHandle,
        dst_offset: u64,
        size: u64,
    ) -> CoreResult<()> {
        let src_raw = self.lookup(src)?;
        let dst_raw = self.lookup(dst)?;
        Self::check_usage(src, &src_raw, wgpu::BufferUsages::COPY_SRC)?;
        Self::check_usage(dst, &dst_raw, wgpu::BufferUsages::COPY_DST)?;
        Self::check_range(src, &src_raw, src_offset, size)?;
        Self::check_range(dst, &dst_raw, dst_offset, size)?;
        self.with_encoder(|encoder| {
            encoder.copy_buffer_to_buffer(&src_raw, src_offset, &dst_raw, dst_offset, size);
        });
        Ok(())
    }

    fn upload(&self, dst: BufferHandle, offset: u64, data: &[u8]) -> CoreResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        let dst_raw = self.lookup(dst)?;
        Self::check_usage(dst, &dst_raw, wgpu::BufferUsages::COPY_DST)?;

        let padded_len = align_up(data.len() as u64, COPY_ALIGNMENT);
        Self::check_range(dst, &dst_raw, offset, padded_len)?;
        let mut contents = data.to_vec();
        contents.resize(padded_len as usize, 0);

        let staging = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("tessel upload"),
            contents: &contents,
            usage: wgpu::BufferUsages::COPY_SRC,
        });
        self.with_encoder(|encoder| {
            encoder.copy_buffer_to_buffer(&staging, 0, &dst_raw, offset, padded_len);
        });
        Ok(())
    }

    fn draw_indexed_indirect_count(&self, draw: &IndirectDraw) -> CoreResult<()> {
        let draw_buffer = self.lookup(draw.draw_buffer)?;
        let count_buffer = self.lookup(draw.count_buffer)?;
        Self::check_usage(draw.draw_buffer, &draw_buffer, wgpu::BufferUsages::INDIRECT)?;
        Self::check_usage(draw.count_buffer, &count_buffer, wgpu::BufferUsages::INDIRECT)?;
        self.draws.lock().push(RecordedDraw {
            draw_buffer,
            draw_offset: draw.draw_offset,
            count_buffer,
            count_offset: draw.count_offset,
            max_count: draw.max_count,
        });
        Ok(())
    }

    fn request_readback(&self, src: BufferHandle, offset: u64, size: u64) -> CoreResult<Readback> {
        let src_raw = self.lookup(src)?;
        Self::check_usage(src, &src_raw, wgpu::BufferUsages::COPY_SRC)?;
        let copy_size = align_up(size.max(COPY_ALIGNMENT), COPY_ALIGNMENT);
        Self::check_range(src, &src_raw, offset, copy_size)?;

        let staging = Arc::new(self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("tessel readback"),
            size: copy_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }));
        self.with_encoder(|encoder| {
            encoder.copy_buffer_to_buffer(&src_raw, offset, &staging, 0, copy_size);
        });

        let (sender, readback) = Readback::channel();
        self.readbacks.lock().push(PendingReadback {
            staging,
            size,
            sender: Some(sender),
            mapped: Arc::new(Mutex::new(None)),
            map_requested: false,
        });
        Ok(readback)
    }

    fn submit_frame(&self) -> CoreResult<()> {
        if let Some(encoder) = self.encoder.lock().take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }

        let mut readbacks = self.readbacks.lock();
        for pending in readbacks.iter_mut().filter(|p| !p.map_requested) {
            let flag = Arc::clone(&pending.mapped);
            pending.staging.slice(..).map_async(wgpu::MapMode::Read, move |result| {
                *flag.lock() = Some(result.is_ok());
            });
            pending.map_requested = true;
        }
        let _ = self.device.poll(wgpu::Maintain::Poll);

        readbacks.retain_mut(|pending| {
            let state = *pending.mapped.lock();
            match state {
                None => true,
                Some(true) => {
                    let bytes = {
                        let view = pending.staging.slice(..).get_mapped_range();
                        view[..pending.size as usize].to_vec()
                    };
                    pending.staging.unmap();
                    if let Some(sender) = pending.sender.take() {
                        sender.resolve(bytes);
                    }
                    false
                }
                Some(false) => {
                    warn!(size = pending.size, "readback mapping failed");
                    false
                }
            }
        });
        Ok(())
    }
}
