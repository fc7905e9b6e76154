//! # Device Boundary
//!
//! The contract between the streaming renderer and a graphics backend.
//! Everything the renderer needs from the GPU is expressed here: create and
//! destroy buffers, copy and upload bytes, read bytes back asynchronously and
//! issue an indirect draw whose count lives in device memory.
//!
//! ```text
//! ┌──────────────────┐    upload / copy     ┌──────────────────┐
//! │  DeviceVector<T> │ ───────────────────► │                  │
//! └──────────────────┘                      │                  │
//! ┌──────────────────┐  draw_indexed_       │    GpuDevice     │
//! │VisibilityPipeline│  indirect_count      │  (HostDevice /   │
//! │                  │ ───────────────────► │   WgpuDevice)    │
//! │                  │ ◄─────────────────── │                  │
//! └──────────────────┘   Readback::poll     └──────────────────┘
//! ```
//!
//! Operations are recorded in call order. [`GpuDevice::submit_frame`] ends a
//! frame: all recorded work completes and readbacks requested during the
//! frame resolve.

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};

use crate::error::CoreResult;

pub mod host;
pub mod readback;
#[cfg(feature = "wgpu")]
pub mod wgpu_device;

pub use host::{DeviceStats, ExecutedDraw, HostDevice, UploadRecord};
pub use readback::{Readback, ReadbackSender, ReadbackState};
#[cfg(feature = "wgpu")]
pub use wgpu_device::{RecordedDraw, WgpuDevice};

/// Required alignment for copy offsets and sizes.
pub const COPY_ALIGNMENT: u64 = 4;

/// Opaque handle to a device buffer. Handles are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u32);

bitflags! {
    /// How a buffer may be used.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Vertex input.
        const VERTEX = 1 << 0;
        /// Index input.
        const INDEX = 1 << 1;
        /// Shader storage.
        const STORAGE = 1 << 2;
        /// Indirect draw arguments and draw counts.
        const INDIRECT = 1 << 3;
        /// Source of copies and readbacks.
        const COPY_SRC = 1 << 4;
        /// Destination of copies and uploads.
        const COPY_DST = 1 << 5;
        /// Host-mappable for reading.
        const MAP_READ = 1 << 6;
        /// Uniform block.
        const UNIFORM = 1 << 7;
    }
}

/// Buffer creation parameters.
#[derive(Debug, Clone, Copy)]
pub struct BufferDesc<'a> {
    /// Debug label.
    pub label: &'a str,
    /// Size in bytes.
    pub size: u64,
    /// Allowed usages.
    pub usage: BufferUsage,
}

/// GPU indexed indirect draw arguments.
///
/// Layout matches `VkDrawIndexedIndirectCommand` and wgpu's
/// `DrawIndexedIndirectArgs`. `first_instance` is used as a dense draw-call
/// index that shaders use to fetch per-draw metadata.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct DrawIndexedIndirectArgs {
    /// Indices per instance.
    pub index_count: u32,
    /// Number of instances to draw.
    pub instance_count: u32,
    /// First index.
    pub first_index: u32,
    /// Base vertex.
    pub base_vertex: i32,
    /// First instance.
    pub first_instance: u32,
}

impl DrawIndexedIndirectArgs {
    /// Size in bytes.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    /// Triangles emitted by this draw.
    #[inline]
    #[must_use]
    pub const fn triangles(&self) -> u32 {
        (self.index_count / 3) * self.instance_count
    }
}

/// An indirect-draw-with-count submission.
///
/// The device reads a `u32` draw count at `count_offset` in `count_buffer`
/// and issues `min(count, max_count)` consecutive draws starting at
/// `draw_offset` in `draw_buffer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndirectDraw {
    /// Buffer holding [`DrawIndexedIndirectArgs`] entries.
    pub draw_buffer: BufferHandle,
    /// Byte offset of the first entry.
    pub draw_offset: u64,
    /// Buffer holding the actual draw count.
    pub count_buffer: BufferHandle,
    /// Byte offset of the count.
    pub count_offset: u64,
    /// Upper bound on issued draws.
    pub max_count: u32,
}

/// A graphics backend as seen by the renderer.
pub trait GpuDevice: Send + Sync {
    /// Creates a zero-initialized buffer.
    ///
    /// # Errors
    ///
    /// [`CoreError::OutOfDeviceMemory`](crate::CoreError::OutOfDeviceMemory)
    /// if the allocation cannot be satisfied.
    fn create_buffer(&self, desc: &BufferDesc<'_>) -> CoreResult<BufferHandle>;

    /// Releases a buffer. Unknown handles are ignored.
    fn destroy_buffer(&self, buffer: BufferHandle);

    /// Size of a live buffer.
    fn buffer_size(&self, buffer: BufferHandle) -> Option<u64>;

    /// Records a device-side copy of `size` bytes.
    ///
    /// # Errors
    ///
    /// Fails on unknown handles, missing usages or out-of-bounds ranges.
    fn copy_buffer(
        &self,
        src: BufferHandle,
        src_offset: u64,
        dst: BufferHandle,
        dst_offset: u64,
        size: u64,
    ) -> CoreResult<()>;

    /// Records an upload of host bytes into `dst` at `offset`.
    ///
    /// # Errors
    ///
    /// Fails on unknown handles, missing usages or out-of-bounds ranges.
    fn upload(&self, dst: BufferHandle, offset: u64, data: &[u8]) -> CoreResult<()>;

    /// Records an indirect draw with a device-side count.
    ///
    /// # Errors
    ///
    /// Fails on unknown handles or missing `INDIRECT` usage.
    fn draw_indexed_indirect_count(&self, draw: &IndirectDraw) -> CoreResult<()>;

    /// Requests the bytes `offset..offset + size` of `src` as they are at
    /// this point of the command stream. The result becomes ready once the
    /// device has finished the frame.
    ///
    /// # Errors
    ///
    /// Fails on unknown handles, missing `COPY_SRC` usage or out-of-bounds
    /// ranges.
    fn request_readback(&self, src: BufferHandle, offset: u64, size: u64) -> CoreResult<Readback>;

    /// Ends the frame: executes everything recorded so far and resolves
    /// finished readbacks.
    ///
    /// # Errors
    ///
    /// Backend-specific submission failures.
    fn submit_frame(&self) -> CoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indirect_args_layout() {
        assert_eq!(DrawIndexedIndirectArgs::SIZE, 20);
        let args = DrawIndexedIndirectArgs {
            index_count: 36,
            instance_count: 1,
            ..Default::default()
        };
        assert_eq!(args.triangles(), 12);
    }

    #[test]
    fn test_usage_flags_combine() {
        let usage = BufferUsage::STORAGE | BufferUsage::COPY_DST;
        assert!(usage.contains(BufferUsage::COPY_DST));
        assert!(!usage.contains(BufferUsage::INDIRECT));
    }
}
