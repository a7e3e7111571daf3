//! Geometry primitives shared across the image-collection workspace.

pub mod affine;
pub mod bbox;
pub mod crs;
pub mod error;
pub mod grid;

pub use affine::{AffineTransform, AFFINE_IDENTITY_EPS};
pub use bbox::{BboxParseError, BoundingBox};
pub use crs::{Crs, CrsParseError};
pub use error::GeometryError;
pub use grid::{GridGeometry, PixelRect, EDGE_SNAP_EPS};
