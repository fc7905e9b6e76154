//! Visibility determination.
//!
//! Frustum and occlusion tests decide, per instance, whether its draw calls
//! are worth issuing. The result is a bitmask per bucket that is compacted
//! into the list the indirect draw is built from.

pub mod compact;
mod frustum;
mod occlusion;
mod visibility;

pub use compact::{compact, compact_into, mask_words, popcount};
pub use frustum::{Aabb, Frustum, FrustumLock, Plane};
pub use occlusion::{view_depth_range, OcclusionProxy, OcclusionStats, ScreenRect};
pub use visibility::{VisibilityPipeline, VisibilityStage, MAX_READBACKS_IN_FLIGHT};
