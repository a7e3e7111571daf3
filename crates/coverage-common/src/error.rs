//! Geometry error types.

use thiserror::Error;

/// Errors raised by geometry primitives.
#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("Transform is not invertible: {0}")]
    NonInvertible(String),

    #[error("Raster area has no pixels: {width}x{height}")]
    EmptyRaster { width: usize, height: usize },

    #[error("Envelope has no area: {0}")]
    EmptyEnvelope(String),
}
