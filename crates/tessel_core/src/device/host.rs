//! # Software Device
//!
//! [`HostDevice`] implements [`GpuDevice`] with plain byte vectors. Work
//! executes immediately in call order, which is exactly the order a real
//! queue would observe. Readbacks snapshot their bytes when requested and are
//! delivered by [`GpuDevice::submit_frame`], so callers see the same
//! one-frame latency as on hardware.
//!
//! Besides being a working device, it keeps the books tests need: call
//! counters, a log of every upload range, and the draws each indirect
//! submission actually issued.

use parking_lot::Mutex;
use tracing::{trace, warn};

use super::{
    BufferDesc, BufferHandle, BufferUsage, DrawIndexedIndirectArgs, GpuDevice, IndirectDraw,
    Readback, ReadbackSender,
};
use crate::error::{CoreError, CoreResult};

/// Counters kept by a [`HostDevice`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    /// Buffers created.
    pub buffers_created: u64,
    /// Buffers destroyed.
    pub buffers_destroyed: u64,
    /// Buffer-to-buffer copies.
    pub copies: u64,
    /// Host uploads.
    pub uploads: u64,
    /// Total bytes uploaded.
    pub bytes_uploaded: u64,
    /// Indirect submissions.
    pub indirect_submissions: u64,
    /// Individual draws issued by indirect submissions.
    pub draws_issued: u64,
    /// Readbacks requested.
    pub readbacks: u64,
    /// Frames submitted.
    pub frames: u64,
    /// Bytes held by live buffers.
    pub live_bytes: u64,
}

/// One upload as seen by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadRecord {
    /// Destination buffer.
    pub buffer: BufferHandle,
    /// Destination offset.
    pub offset: u64,
    /// Bytes written.
    pub size: u64,
}

impl UploadRecord {
    /// Byte range written.
    #[must_use]
    pub const fn range(&self) -> std::ops::Range<u64> {
        self.offset..self.offset + self.size
    }
}

/// The draws one indirect submission issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedDraw {
    /// Frame the submission was recorded in.
    pub frame: u64,
    /// Buffer the arguments were read from.
    pub draw_buffer: BufferHandle,
    /// Count read from the count buffer.
    pub count: u32,
    /// The issued draws, `min(count, max_count)` of them.
    pub draws: Vec<DrawIndexedIndirectArgs>,
}

impl ExecutedDraw {
    /// Triangles emitted by the submission.
    #[must_use]
    pub fn triangles(&self) -> u64 {
        self.draws.iter().map(|d| u64::from(d.triangles())).sum()
    }
}

struct HostBuffer {
    label: String,
    usage: BufferUsage,
    data: Vec<u8>,
}

#[derive(Default)]
struct HostState {
    /// Slot per handle; destroyed buffers leave `None`.
    buffers: Vec<Option<HostBuffer>>,
    memory_budget: Option<u64>,
    stats: DeviceStats,
    upload_log: Vec<UploadRecord>,
    pending_readbacks: Vec<(Vec<u8>, ReadbackSender)>,
    executed_draws: Vec<ExecutedDraw>,
}

impl HostState {
    fn buffer(&self, handle: BufferHandle, required: BufferUsage) -> CoreResult<&HostBuffer> {
        let buffer = self
            .buffers
            .get(handle.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(CoreError::UnknownBuffer(handle))?;
        if !buffer.usage.contains(required) {
            return Err(CoreError::MissingUsage { buffer: handle, required });
        }
        Ok(buffer)
    }

    fn buffer_mut(
        &mut self,
        handle: BufferHandle,
        required: BufferUsage,
    ) -> CoreResult<&mut HostBuffer> {
        let buffer = self
            .buffers
            .get_mut(handle.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(CoreError::UnknownBuffer(handle))?;
        if !buffer.usage.contains(required) {
            return Err(CoreError::MissingUsage { buffer: handle, required });
        }
        Ok(buffer)
    }

    fn read(
        &self,
        handle: BufferHandle,
        required: BufferUsage,
        offset: u64,
        size: u64,
    ) -> CoreResult<&[u8]> {
        let buffer = self.buffer(handle, required)?;
        let range = checked_range(handle, offset, size, buffer.data.len())?;
        Ok(&buffer.data[range])
    }
}

fn checked_range(
    buffer: BufferHandle,
    offset: u64,
    size: u64,
    len: usize,
) -> CoreResult<std::ops::Range<usize>> {
    let capacity = len as u64;
    match offset.checked_add(size) {
        Some(end) if end <= capacity => Ok(offset as usize..end as usize),
        _ => Err(CoreError::OutOfBounds { buffer, offset, size, capacity }),
    }
}

/// A software [`GpuDevice`].
#[derive(Default)]
pub struct HostDevice {
    state: Mutex<HostState>,
}

impl HostDevice {
    /// Creates a device with unlimited memory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a device that fails buffer creation once live buffers would
    /// exceed `bytes`.
    #[must_use]
    pub fn with_memory_budget(bytes: u64) -> Self {
        let device = Self::default();
        device.state.lock().memory_budget = Some(bytes);
        device
    }

    /// Changes the memory budget. `None` removes the limit.
    pub fn set_memory_budget(&self, bytes: Option<u64>) {
        self.state.lock().memory_budget = bytes;
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> DeviceStats {
        self.state.lock().stats
    }

    /// Every upload since the log was last cleared, in order.
    #[must_use]
    pub fn upload_log(&self) -> Vec<UploadRecord> {
        self.state.lock().upload_log.clone()
    }

    /// Uploads into one buffer since the log was last cleared.
    #[must_use]
    pub fn uploads_to(&self, buffer: BufferHandle) -> Vec<UploadRecord> {
        self.state
            .lock()
            .upload_log
            .iter()
            .filter(|record| record.buffer == buffer)
            .copied()
            .collect()
    }

    /// Empties the upload log.
    pub fn clear_upload_log(&self) {
        self.state.lock().upload_log.clear();
    }

    /// Full contents of a live buffer.
    #[must_use]
    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<Vec<u8>> {
        let state = self.state.lock();
        state
            .buffers
            .get(buffer.0 as usize)
            .and_then(Option::as_ref)
            .map(|b| b.data.clone())
    }

    /// Debug label of a live buffer.
    #[must_use]
    pub fn buffer_label(&self, buffer: BufferHandle) -> Option<String> {
        let state = self.state.lock();
        state
            .buffers
            .get(buffer.0 as usize)
            .and_then(Option::as_ref)
            .map(|b| b.label.clone())
    }

    /// Number of live buffers.
    #[must_use]
    pub fn live_buffer_count(&self) -> usize {
        self.state.lock().buffers.iter().filter(|b| b.is_some()).count()
    }

    /// Drains the record of executed indirect submissions.
    pub fn take_executed_draws(&self) -> Vec<ExecutedDraw> {
        std::mem::take(&mut self.state.lock().executed_draws)
    }
}

impl GpuDevice for HostDevice {
    fn create_buffer(&self, desc: &BufferDesc<'_>) -> CoreResult<BufferHandle> {
        let mut state = self.state.lock();
        let live = state.stats.live_bytes.saturating_add(desc.size);
        if state.memory_budget.is_some_and(|budget| live > budget) {
            return Err(CoreError::OutOfDeviceMemory {
                label: desc.label.to_owned(),
                requested: desc.size,
            });
        }
        let len = usize::try_from(desc.size).map_err(|_| CoreError::OutOfDeviceMemory {
            label: desc.label.to_owned(),
            requested: desc.size,
        })?;

        let handle = BufferHandle(state.buffers.len() as u32);
        state.buffers.push(Some(HostBuffer {
            label: desc.label.to_owned(),
            usage: desc.usage,
            data: vec![0; len],
        }));
        state.stats.buffers_created += 1;
        state.stats.live_bytes = live;
        trace!(buffer = handle.0, label = desc.label, size = desc.size, "buffer created");
        Ok(handle)
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        let mut state = self.state.lock();
        let removed = state.buffers.get_mut(buffer.0 as usize).and_then(Option::take);
        if let Some(removed) = removed {
            state.stats.buffers_destroyed += 1;
            state.stats.live_bytes -= removed.data.len() as u64;
        }
    }

    fn buffer_size(&self, buffer: BufferHandle) -> Option<u64> {
        let state = self.state.lock();
        state
            .buffers
            .get(buffer.0 as usize)
            .and_then(Option::as_ref)
            .map(|b| b.data.len() as u64)
    }

    fn copy_buffer(
        &self,
        src: BufferHandle,
        src_offset: u64,
        dst: BufferHandle,
        dst_offset: u64,
        size: u64,
    ) -> CoreResult<()> {
        let mut state = self.state.lock();
        let bytes = state.read(src, BufferUsage::COPY_SRC, src_offset, size)?.to_vec();
        let target = state.buffer_mut(dst, BufferUsage::COPY_DST)?;
        let range = checked_range(dst, dst_offset, size, target.data.len())?;
        target.data[range].copy_from_slice(&bytes);
        state.stats.copies += 1;
        Ok(())
    }

    fn upload(&self, dst: BufferHandle, offset: u64, data: &[u8]) -> CoreResult<()> {
        let mut state = self.state.lock();
        let size = data.len() as u64;
        let target = state.buffer_mut(dst, BufferUsage::COPY_DST)?;
        let range = checked_range(dst, offset, size, target.data.len())?;
        target.data[range].copy_from_slice(data);

        state.stats.uploads += 1;
        state.stats.bytes_uploaded += size;
        state.upload_log.push(UploadRecord { buffer: dst, offset, size });
        trace!(buffer = dst.0, offset, bytes = size, "upload");
        Ok(())
    }

    fn draw_indexed_indirect_count(&self, draw: &IndirectDraw) -> CoreResult<()> {
        let mut state = self.state.lock();
        let count_bytes = state.read(draw.count_buffer, BufferUsage::INDIRECT, draw.count_offset, 4)?;
        let count = u32::from_le_bytes([count_bytes[0], count_bytes[1], count_bytes[2], count_bytes[3]]);
        let issued = count.min(draw.max_count);

        let args_bytes = state.read(
            draw.draw_buffer,
            BufferUsage::INDIRECT,
            draw.draw_offset,
            u64::from(issued) * DrawIndexedIndirectArgs::SIZE,
        )?;
        let draws: Vec<DrawIndexedIndirectArgs> = args_bytes
            .chunks_exact(DrawIndexedIndirectArgs::SIZE as usize)
            .map(bytemuck::pod_read_unaligned)
            .collect();

        let frame = state.stats.frames;
        state.stats.indirect_submissions += 1;
        state.stats.draws_issued += u64::from(issued);
        state.executed_draws.push(ExecutedDraw {
            frame,
            draw_buffer: draw.draw_buffer,
            count,
            draws,
        });
        Ok(())
    }

    fn request_readback(&self, src: BufferHandle, offset: u64, size: u64) -> CoreResult<Readback> {
        let mut state = self.state.lock();
        let snapshot = state.read(src, BufferUsage::COPY_SRC, offset, size)?.to_vec();
        let (sender, readback) = Readback::channel();
        state.pending_readbacks.push((snapshot, sender));
        state.stats.readbacks += 1;
        Ok(readback)
    }

    fn submit_frame(&self) -> CoreResult<()> {
        let pending = {
            let mut state = self.state.lock();
            state.stats.frames += 1;
            std::mem::take(&mut state.pending_readbacks)
        };
        for (bytes, sender) in pending {
            sender.resolve(bytes);
        }
        Ok(())
    }
}

impl Drop for HostDevice {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        let leaked = state.buffers.iter().filter(|b| b.is_some()).count();
        if leaked > 0 && !std::thread::panicking() {
            warn!(buffers = leaked, bytes = state.stats.live_bytes, "device dropped with live buffers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::ReadbackState;

    fn desc(size: u64, usage: BufferUsage) -> BufferDesc<'static> {
        BufferDesc { label: "test", size, usage }
    }

    #[test]
    fn test_upload_and_copy() {
        let device = HostDevice::new();
        let usage = BufferUsage::COPY_SRC | BufferUsage::COPY_DST;
        let a = device.create_buffer(&desc(8, usage)).unwrap();
        let b = device.create_buffer(&desc(8, usage)).unwrap();

        device.upload(a, 0, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        device.copy_buffer(a, 4, b, 0, 4).unwrap();
        assert_eq!(device.buffer_contents(b).unwrap(), vec![5, 6, 7, 8, 0, 0, 0, 0]);

        let stats = device.stats();
        assert_eq!(stats.uploads, 1);
        assert_eq!(stats.copies, 1);
        assert_eq!(stats.live_bytes, 16);

        device.destroy_buffer(a);
        device.destroy_buffer(b);
    }

    #[test]
    fn test_bounds_and_usage_checked() {
        let device = HostDevice::new();
        let buffer = device.create_buffer(&desc(4, BufferUsage::COPY_DST)).unwrap();
        assert!(matches!(
            device.upload(buffer, 2, &[0; 4]),
            Err(CoreError::OutOfBounds { .. })
        ));
        assert!(matches!(
            device.request_readback(buffer, 0, 4),
            Err(CoreError::MissingUsage { .. })
        ));
        device.destroy_buffer(buffer);
        assert_eq!(
            device.upload(buffer, 0, &[0; 4]),
            Err(CoreError::UnknownBuffer(buffer))
        );
    }

    #[test]
    fn test_memory_budget() {
        let device = HostDevice::with_memory_budget(100);
        let a = device.create_buffer(&desc(64, BufferUsage::STORAGE)).unwrap();
        assert!(matches!(
            device.create_buffer(&desc(64, BufferUsage::STORAGE)),
            Err(CoreError::OutOfDeviceMemory { requested: 64, .. })
        ));
        device.destroy_buffer(a);
        assert!(device.create_buffer(&desc(64, BufferUsage::STORAGE)).is_ok());
    }

    #[test]
    fn test_readback_resolves_on_submit() {
        let device = HostDevice::new();
        let buffer = device
            .create_buffer(&desc(4, BufferUsage::COPY_SRC | BufferUsage::COPY_DST))
            .unwrap();
        device.upload(buffer, 0, &7u32.to_le_bytes()).unwrap();

        let mut readback = device.request_readback(buffer, 0, 4).unwrap();
        // Later writes in the same frame do not leak into the snapshot.
        device.upload(buffer, 0, &9u32.to_le_bytes()).unwrap();
        assert_eq!(readback.poll(), ReadbackState::Pending);

        device.submit_frame().unwrap();
        assert_eq!(readback.poll(), ReadbackState::Ready(7u32.to_le_bytes().to_vec()));
    }

    #[test]
    fn test_indirect_draw_respects_count() {
        let device = HostDevice::new();
        let usage = BufferUsage::INDIRECT | BufferUsage::COPY_DST;
        let draws: Vec<DrawIndexedIndirectArgs> = (0..3)
            .map(|i| DrawIndexedIndirectArgs {
                index_count: 3 * (i + 1),
                instance_count: 1,
                first_instance: i,
                ..Default::default()
            })
            .collect();
        let bytes: &[u8] = bytemuck::cast_slice(&draws);
        // Only room for the three entries: reading further would fail.
        let draw_buffer = device.create_buffer(&desc(bytes.len() as u64, usage)).unwrap();
        device.upload(draw_buffer, 0, bytes).unwrap();
        let count_buffer = device.create_buffer(&desc(4, usage)).unwrap();
        device.upload(count_buffer, 0, &2u32.to_le_bytes()).unwrap();

        let draw = IndirectDraw {
            draw_buffer,
            draw_offset: 0,
            count_buffer,
            count_offset: 0,
            max_count: 3,
        };
        device.draw_indexed_indirect_count(&draw).unwrap();
        device.upload(count_buffer, 0, &50u32.to_le_bytes()).unwrap();
        device.draw_indexed_indirect_count(&draw).unwrap();

        let executed = device.take_executed_draws();
        assert_eq!(executed.len(), 2);
        assert_eq!(executed[0].draws.len(), 2);
        assert_eq!(executed[0].triangles(), 3);
        assert_eq!(executed[1].count, 50);
        assert_eq!(executed[1].draws.len(), 3);
    }
}
