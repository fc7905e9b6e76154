//! Frame inputs, configuration and statistics.

mod config;
mod frame;
mod stats;

pub use config::RenderConfig;
pub use frame::{Camera, FrameContext};
pub use stats::{BucketStats, LoadReport, RenderStats};
