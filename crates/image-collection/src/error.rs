//! Error types for coverage reads.

use std::path::{Path, PathBuf};

use coverage_common::GeometryError;
use thiserror::Error;

/// Errors that can occur while resolving a coverage read.
///
/// `Decode` and `Config` never reach the caller of
/// [`ImageCollectionReader::read`](crate::ImageCollectionReader::read): a
/// failed decode degrades to background fill and a bad configuration
/// property falls back to its default.
#[derive(Error, Debug)]
pub enum CoverageError {
    /// The path is not a directory, does not exist, or cannot be read.
    #[error("source input error for {}: {reason}", .path.display())]
    SourceInput { path: PathBuf, reason: String },

    /// No registered codec recognizes the file.
    #[error("no reader available for {}", .path.display())]
    NoReaderAvailable { path: PathBuf },

    /// A grid-to-world transform could not be inverted.
    #[error("non-invertible transform for {}: {reason}", .path.display())]
    TransformNoninvertible { path: PathBuf, reason: String },

    /// The decoded pixel layout has no band interpretation.
    #[error("unsupported sample format in {}: {reason}", .path.display())]
    UnsupportedSampleFormat { path: PathBuf, reason: String },

    /// A selected path resolves outside of the collection root.
    #[error("path {} escapes collection root {}", .path.display(), .root.display())]
    PathTraversalRejected { path: PathBuf, root: PathBuf },

    /// The path filter is not a `PATH = '<value>'` equality.
    #[error("invalid path filter: {0}")]
    InvalidPathFilter(String),

    /// I/O or codec failure while decoding a granule.
    #[error("failed to decode {}: {reason}", .path.display())]
    Decode { path: PathBuf, reason: String },

    /// Malformed directory configuration.
    #[error("configuration error in {}: {reason}", .path.display())]
    Config { path: PathBuf, reason: String },
}

impl CoverageError {
    /// Create a SourceInput error.
    pub fn source_input(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::SourceInput {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Create a NoReaderAvailable error.
    pub fn no_reader(path: impl AsRef<Path>) -> Self {
        Self::NoReaderAvailable {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Create a TransformNoninvertible error.
    pub fn noninvertible(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::TransformNoninvertible {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Create an UnsupportedSampleFormat error.
    pub fn unsupported_format(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::UnsupportedSampleFormat {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Create a PathTraversalRejected error.
    pub fn traversal(path: impl AsRef<Path>, root: impl AsRef<Path>) -> Self {
        Self::PathTraversalRejected {
            path: path.as_ref().to_path_buf(),
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Create a Decode error.
    pub fn decode(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::Decode {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Create a Config error.
    pub fn config(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::Config {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Attach `path` to an error created without one (through `From`).
    pub fn with_path(mut self, path: impl AsRef<Path>) -> Self {
        let slot = match &mut self {
            Self::SourceInput { path, .. }
            | Self::NoReaderAvailable { path }
            | Self::TransformNoninvertible { path, .. }
            | Self::UnsupportedSampleFormat { path, .. }
            | Self::Decode { path, .. }
            | Self::Config { path, .. } => Some(path),
            Self::PathTraversalRejected { .. } | Self::InvalidPathFilter(_) => None,
        };
        if let Some(slot) = slot {
            if slot.as_os_str().is_empty() {
                *slot = path.as_ref().to_path_buf();
            }
        }
        self
    }

    /// True for errors that must be returned to the caller.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Decode { .. } | Self::Config { .. })
    }
}

impl From<std::io::Error> for CoverageError {
    fn from(err: std::io::Error) -> Self {
        Self::decode(PathBuf::new(), err.to_string())
    }
}

impl From<image::ImageError> for CoverageError {
    fn from(err: image::ImageError) -> Self {
        Self::decode(PathBuf::new(), err.to_string())
    }
}

impl From<tiff::TiffError> for CoverageError {
    fn from(err: tiff::TiffError) -> Self {
        Self::decode(PathBuf::new(), err.to_string())
    }
}

impl From<GeometryError> for CoverageError {
    fn from(err: GeometryError) -> Self {
        Self::noninvertible(PathBuf::new(), err.to_string())
    }
}

/// Result type for coverage operations.
pub type Result<T> = std::result::Result<T, CoverageError>;
