//! Renderer configuration.
//!
//! ```toml
//! culling_enabled = true
//! occlusion_culling_enabled = true
//! transparency_sort_enabled = true
//! lock_frustum = false
//! worker_threads = 0
//! occlusion_tiles = [64, 32]
//! allocator_growth_factor = 1.25
//! initial_bone_capacity = 65536
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RenderError, RenderResult};

/// Runtime toggles and sizing for the streaming renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Run Cull/Compact. When off, every instance is drawn.
    pub culling_enabled: bool,
    /// Test frustum survivors against last frame's occlusion proxy.
    pub occlusion_culling_enabled: bool,
    /// Sort the transparent bucket back to front.
    pub transparency_sort_enabled: bool,
    /// Keep culling against the frustum captured when the lock was set.
    pub lock_frustum: bool,
    /// Load worker threads. 0 lets rayon pick.
    pub worker_threads: usize,
    /// Occlusion proxy resolution in tiles (width, height).
    pub occlusion_tiles: [u32; 2],
    /// Range allocator growth factor.
    pub allocator_growth_factor: f64,
    /// Initial bone range allocator capacity in bytes.
    pub initial_bone_capacity: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            culling_enabled: true,
            occlusion_culling_enabled: true,
            transparency_sort_enabled: true,
            lock_frustum: false,
            worker_threads: 0,
            occlusion_tiles: [64, 32],
            allocator_growth_factor: tessel_core::memory::DEFAULT_GROWTH_FACTOR,
            initial_bone_capacity: 64 * 1024,
        }
    }
}

impl RenderConfig {
    /// Parses a TOML document. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Config`] on syntax or type errors.
    pub fn from_toml_str(text: &str) -> RenderResult<Self> {
        Self::parse(text, None)
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Config`] if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> RenderResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| RenderError::Config {
            path: Some(path.to_path_buf()),
            reason: err.to_string(),
        })?;
        Self::parse(&text, Some(path))
    }

    /// Parses and validates; `path` only labels errors.
    fn parse(text: &str, path: Option<&Path>) -> RenderResult<Self> {
        let config: Self = toml::from_str(text).map_err(|err| RenderError::Config {
            path: path.map(Path::to_path_buf),
            reason: err.to_string(),
        })?;
        config.validated(path)
    }

    /// Serializes to TOML.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Config`] if serialization fails.
    pub fn to_toml_string(&self) -> RenderResult<String> {
        toml::to_string(self).map_err(|err| RenderError::Config {
            path: None,
            reason: err.to_string(),
        })
    }

    fn validated(self, path: Option<&Path>) -> RenderResult<Self> {
        let reason = if self.occlusion_tiles.contains(&0) {
            Some("occlusion_tiles must be non-zero")
        } else if !(self.allocator_growth_factor >= 1.0 && self.allocator_growth_factor.is_finite()) {
            Some("allocator_growth_factor must be a finite number >= 1.0")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(RenderError::Config {
                path: path.map(Path::to_path_buf),
                reason: reason.to_owned(),
            }),
            None => Ok(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RenderConfig::default();
        assert!(config.culling_enabled);
        assert!(config.occlusion_culling_enabled);
        assert!(config.transparency_sort_enabled);
        assert!(!config.lock_frustum);
        assert!((config.allocator_growth_factor - 1.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_partial_toml() {
        let config = RenderConfig::from_toml_str("culling_enabled = false\nworker_threads = 2\n").unwrap();
        assert!(!config.culling_enabled);
        assert_eq!(config.worker_threads, 2);
        assert!(config.transparency_sort_enabled);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            RenderConfig::from_toml_str("culling_enabled = 3"),
            Err(RenderError::Config { .. })
        ));
        assert!(matches!(
            RenderConfig::from_toml_str("occlusion_tiles = [0, 4]"),
            Err(RenderError::Config { .. })
        ));
    }

    #[test]
    fn test_toml_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("render.toml");
        let config = RenderConfig {
            lock_frustum: true,
            occlusion_tiles: [16, 8],
            ..RenderConfig::default()
        };
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();
        assert_eq!(RenderConfig::load(&path).unwrap(), config);
        assert!(RenderConfig::load(dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_file_errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let bad_syntax = dir.path().join("syntax.toml");
        let bad_value = dir.path().join("value.toml");
        std::fs::write(&bad_syntax, "culling_enabled = 3").unwrap();
        std::fs::write(&bad_value, "allocator_growth_factor = 0.5").unwrap();

        for path in [&bad_syntax, &bad_value] {
            match RenderConfig::load(path) {
                Err(RenderError::Config { path: Some(reported), .. }) => assert_eq!(&reported, path),
                other => panic!("expected config error for {path:?}, got {other:?}"),
            }
        }
        assert!(matches!(
            RenderConfig::from_toml_str("culling_enabled = 3"),
            Err(RenderError::Config { path: None, .. })
        ));
    }
}
