//! # Rendering Error Types
//!
//! Two families:
//!
//! - [`LoadError`] - what an asset source reports for one asset. Most
//!   variants are absorbed by the cache and become `AssetStatus::Failed`.
//! - [`RenderError`] - fatal failures that abort a load batch or a frame.

use std::path::PathBuf;

use tessel_core::CoreError;
use thiserror::Error;

/// Fatal renderer errors.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Device memory failure.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// An asset container was produced by an incompatible toolchain.
    #[error("asset '{asset}' header mismatch: expected {expected}, found {found}")]
    AssetHeaderMismatch {
        /// Asset name.
        asset: String,
        /// Expected token/version.
        expected: String,
        /// Token/version found in the file.
        found: String,
    },

    /// The configuration could not be read or parsed.
    #[error("invalid configuration {path:?}: {reason}")]
    Config {
        /// File the configuration came from, if any.
        path: Option<PathBuf>,
        /// Parser or I/O message.
        reason: String,
    },

    /// The load worker pool could not be created.
    #[error("worker pool: {0}")]
    WorkerPool(String),
}

/// Result type for fatal renderer operations.
pub type RenderResult<T> = Result<T, RenderError>;

/// Failure to load one asset.
#[derive(Error, Debug)]
pub enum LoadError {
    /// No asset with this name exists.
    #[error("asset '{0}' not found")]
    NotFound(String),

    /// The asset exists but its content is unusable.
    #[error("asset '{name}' is malformed: {reason}")]
    Malformed {
        /// Asset name.
        name: String,
        /// What was wrong.
        reason: String,
    },

    /// Header token or format version does not match this build.
    #[error("asset '{name}' header mismatch: expected {expected}, found {found}")]
    HeaderMismatch {
        /// Asset name.
        name: String,
        /// Expected token/version.
        expected: String,
        /// Token/version found.
        found: String,
    },

    /// The asset could not be read.
    #[error("asset '{name}' could not be read")]
    Io {
        /// Asset name.
        name: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl LoadError {
    /// Whether this failure indicates a build mismatch rather than a bad
    /// asset.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::HeaderMismatch { .. })
    }

    /// Converts a fatal load error into the renderer error it escalates to.
    #[must_use]
    pub fn into_fatal(self) -> Option<RenderError> {
        match self {
            Self::HeaderMismatch { name, expected, found } => Some(RenderError::AssetHeaderMismatch {
                asset: name,
                expected,
                found,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_header_mismatch_is_fatal() {
        assert!(!LoadError::NotFound("a".into()).is_fatal());
        assert!(!LoadError::Malformed { name: "a".into(), reason: "x".into() }.is_fatal());

        let mismatch = LoadError::HeaderMismatch {
            name: "a".into(),
            expected: "TSAS v1".into(),
            found: "TSAS v9".into(),
        };
        assert!(mismatch.is_fatal());
        assert!(matches!(
            mismatch.into_fatal(),
            Some(RenderError::AssetHeaderMismatch { .. })
        ));
    }

    #[test]
    fn test_core_error_converts() {
        let err: RenderError = CoreError::AllocatorExhausted { requested: 8, capacity: 4 }.into();
        assert!(err.to_string().contains("exhausted"));
    }
}
