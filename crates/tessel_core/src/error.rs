//! # Core Error Types
//!
//! Everything that can go wrong below the asset layer. All of these are
//! fatal for a load batch or a frame: the renderer propagates them and never
//! retries.

use thiserror::Error;

use crate::device::{BufferHandle, BufferUsage};

/// Errors raised by device memory primitives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The device could not create a buffer of the requested size.
    #[error("out of device memory: buffer '{label}' needs {requested} bytes")]
    OutOfDeviceMemory {
        /// Debug label of the buffer being created.
        label: String,
        /// Requested size in bytes.
        requested: u64,
    },

    /// A range allocator still could not satisfy a request after growing once.
    #[error("range allocator exhausted: {requested} bytes requested, capacity {capacity}")]
    AllocatorExhausted {
        /// Requested allocation size in bytes.
        requested: u64,
        /// Capacity after the growth attempt.
        capacity: u64,
    },

    /// Attempted to shrink a range allocator.
    #[error("invalid grow: capacity {current} cannot shrink to {requested}")]
    InvalidGrow {
        /// Current capacity.
        current: u64,
        /// Requested capacity.
        requested: u64,
    },

    /// The handle does not name a live buffer.
    #[error("unknown buffer handle {0:?}")]
    UnknownBuffer(BufferHandle),

    /// A copy, upload or read touched bytes outside a buffer.
    #[error("out of bounds access on {buffer:?}: {offset}+{size} exceeds {capacity}")]
    OutOfBounds {
        /// Buffer that was accessed.
        buffer: BufferHandle,
        /// Start of the access.
        offset: u64,
        /// Size of the access.
        size: u64,
        /// Buffer size.
        capacity: u64,
    },

    /// The buffer was created without a usage the operation requires.
    #[error("buffer {buffer:?} lacks usage {required:?}")]
    MissingUsage {
        /// Buffer that was used.
        buffer: BufferHandle,
        /// Usage the operation needs.
        required: BufferUsage,
    },
}

/// Result type for device memory operations.
pub type CoreResult<T> = Result<T, CoreError>;
