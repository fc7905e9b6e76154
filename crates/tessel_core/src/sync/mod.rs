//! # Synchronization Primitives
//!
//! Frame-to-frame handoff of GPU-side state.

pub mod double_buffer;

pub use double_buffer::DoubleBuffered;
