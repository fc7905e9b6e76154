//! Asset identity, content and the load cache.
//!
//! ```text
//!   name ──SipHash──▶ AssetKey ──cache──▶ AssetId ──▶ LoadedAsset
//!                                   │
//!                                   └── AssetSource::load (once per key)
//! ```

mod cache;
mod data;
mod file_source;
mod key;
mod source;

pub use cache::{Acquired, AssetLoadCache, CacheEntry};
pub use data::{
    AssetData, AssetKind, AssetStatus, CullingVolume, Decoration, DrawCallDesc, DrawCallTemplate,
    LoadedAsset, Vertex,
};
pub use file_source::{
    decode_asset, encode_asset, write_asset, FileAssetSource, ASSET_FORMAT_VERSION, ASSET_TOKEN,
};
pub use key::{AssetId, AssetKey};
pub use source::{AssetSource, MemoryAssetSource};
