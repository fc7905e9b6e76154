//! # Asset Container Files
//!
//! ```text
//! Container:
//! ├── "TSAS" (4 bytes) - Token
//! ├── Version (4 bytes, little-endian u32)
//! └── Body - bincode-encoded AssetData
//! ```
//!
//! A token or version mismatch means the asset pipeline and the runtime were
//! built from different revisions. That is reported as
//! [`LoadError::HeaderMismatch`], which the cache escalates to a fatal error.

use std::io;
use std::path::{Component, Path, PathBuf};

use super::{AssetData, AssetKind, AssetSource};
use crate::error::LoadError;

/// Container token.
pub const ASSET_TOKEN: [u8; 4] = *b"TSAS";

/// Container format version understood by this build.
pub const ASSET_FORMAT_VERSION: u32 = 1;

const HEADER_LEN: usize = 8;

/// Encodes an asset into container bytes.
///
/// # Errors
///
/// Returns the bincode error if the asset cannot be serialized.
pub fn encode_asset(data: &AssetData) -> Result<Vec<u8>, bincode::Error> {
    let body = bincode::serialize(data)?;
    let mut bytes = Vec::with_capacity(HEADER_LEN + body.len());
    bytes.extend_from_slice(&ASSET_TOKEN);
    bytes.extend_from_slice(&ASSET_FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

/// Decodes container bytes.
///
/// # Errors
///
/// [`LoadError::HeaderMismatch`] for a wrong token or version,
/// [`LoadError::Malformed`] for a truncated file or undecodable body.
pub fn decode_asset(name: &str, bytes: &[u8]) -> Result<AssetData, LoadError> {
    if bytes.len() < HEADER_LEN {
        return Err(LoadError::Malformed {
            name: name.to_owned(),
            reason: format!("{} bytes is shorter than the header", bytes.len()),
        });
    }
    let token = &bytes[..4];
    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if token != ASSET_TOKEN || version != ASSET_FORMAT_VERSION {
        return Err(LoadError::HeaderMismatch {
            name: name.to_owned(),
            expected: format!("{} v{ASSET_FORMAT_VERSION}", String::from_utf8_lossy(&ASSET_TOKEN)),
            found: format!("{} v{version}", String::from_utf8_lossy(token)),
        });
    }
    bincode::deserialize(&bytes[HEADER_LEN..]).map_err(|err| LoadError::Malformed {
        name: name.to_owned(),
        reason: err.to_string(),
    })
}

/// Writes an asset container to disk.
///
/// # Errors
///
/// I/O failures, or serialization failures wrapped as
/// [`io::ErrorKind::InvalidData`].
pub fn write_asset(path: impl AsRef<Path>, data: &AssetData) -> io::Result<()> {
    let bytes = encode_asset(data).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    if let Some(parent) = path.as_ref().parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)
}

/// Loads asset containers from a directory. Asset names are paths relative
/// to the root.
#[derive(Debug, Clone)]
pub struct FileAssetSource {
    root: PathBuf,
}

impl FileAssetSource {
    /// Source rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, LoadError> {
        let relative = Path::new(name);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(LoadError::Malformed {
                name: name.to_owned(),
                reason: "name must be a relative path inside the asset root".to_owned(),
            });
        }
        Ok(self.root.join(relative))
    }
}

impl AssetSource for FileAssetSource {
    fn load(&self, name: &str, _kind: AssetKind) -> Result<AssetData, LoadError> {
        let path = self.resolve(name)?;
        let bytes = std::fs::read(&path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => LoadError::NotFound(name.to_owned()),
            _ => LoadError::Io {
                name: name.to_owned(),
                source,
            },
        })?;
        decode_asset(name, &bytes)
    }
}
