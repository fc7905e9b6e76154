//! # Tessel Core
//!
//! Device memory primitives for the streaming instance renderer.
//!
//! ## Layers
//!
//! ```text
//! ┌────────────────────────────────────────────────┐
//! │ DeviceVector<T>   host mirror + dirty ranges   │
//! ├────────────────────────────────────────────────┤
//! │ RangeAllocator    capacity that only grows     │
//! ├────────────────────────────────────────────────┤
//! │ GpuDevice         HostDevice | WgpuDevice      │
//! └────────────────────────────────────────────────┘
//! ```
//!
//! ## Rules
//!
//! 1. **Growth preserves content** - a resize copies every synced byte into
//!    the new buffer before anything else is uploaded.
//! 2. **Out of device memory is fatal** - it is returned as
//!    [`CoreError::OutOfDeviceMemory`] and never retried.
//! 3. **Readbacks are futures** - results arrive one frame later through
//!    [`Readback::poll`].

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod device;
pub mod device_vector;
pub mod error;
pub mod memory;
pub mod sync;

pub use device::{
    BufferDesc, BufferHandle, BufferUsage, DeviceStats, DrawIndexedIndirectArgs, ExecutedDraw,
    GpuDevice, HostDevice, IndirectDraw, Readback, ReadbackSender, ReadbackState, UploadRecord,
    COPY_ALIGNMENT,
};
#[cfg(feature = "wgpu")]
pub use device::{RecordedDraw, WgpuDevice};
pub use device_vector::{coalesce_ranges, DeviceVector, SyncOutcome, WriteAccess};
pub use error::{CoreError, CoreResult};
pub use memory::{AllocationOutcome, RangeAllocation, RangeAllocator};
pub use sync::DoubleBuffered;
