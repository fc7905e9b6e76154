//! # Tessel Rendering
//!
//! Streaming instance renderer: placed assets in, culled indirect draws out.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Scene                                   │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  Model │ MapObject │ Terrain │ Water        StreamingRenderer     │
//! │    ↓                                                             │
//! │  AssetLoadCache → InstanceTable → VisibilityPipeline (x2 bucket) │
//! │                                      ↓                           │
//! │                 Reset → Cull → Compact → DrawIndirect            │
//! │                                      ↓                           │
//! │                         TransparencyOrderer (transparent only)   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rules
//!
//! - One loader per asset, ever. Everyone else waits for it.
//! - Device memory only grows inside a load batch.
//! - Counts read back from the device are one frame stale.
//! - A failed asset never appears; a header mismatch ends the batch.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod assets;
pub mod culling;
pub mod error;
pub mod instancing;
pub mod pipeline;
pub mod scene;
pub mod sorting;
pub mod streaming;

pub use assets::{
    AssetData, AssetId, AssetKey, AssetKind, AssetLoadCache, AssetSource, AssetStatus, FileAssetSource,
    LoadedAsset, MemoryAssetSource,
};
pub use culling::{Aabb, Frustum, OcclusionProxy, VisibilityPipeline};
pub use error::{LoadError, RenderError, RenderResult};
pub use instancing::{Bucket, DrawCall, InstanceId, InstanceTable};
pub use pipeline::{BucketStats, Camera, FrameContext, LoadReport, RenderConfig, RenderStats};
pub use scene::Scene;
pub use sorting::TransparencyOrderer;
pub use streaming::{
    MapObjectRenderer, ModelRenderer, Placement, StreamingRenderer, TerrainRenderer, WaterRenderer,
};
