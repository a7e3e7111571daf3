//! Two dimensional affine transforms.
//!
//! Coefficients follow the usual GDAL/rasterio naming:
//!
//! ```text
//! x' = a * x + b * y + c
//! y' = d * x + e * y + f
//! ```
//!
//! Grid-to-world transforms in this workspace are stored in cell-center
//! convention (pixel `(0, 0)` maps to the center of the first cell). Use
//! [`AffineTransform::center_to_corner`] before inverting a transform to map
//! world extents onto pixel edges.

use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;
use crate::error::GeometryError;

/// Tolerance used when deciding whether a transform is the identity.
pub const AFFINE_IDENTITY_EPS: f64 = 1e-6;

/// Relative tolerance for singularity: a determinant this small compared
/// to the magnitude of its two products is treated as zero.
const SINGULAR_EPS: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl AffineTransform {
    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0)
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self::new(sx, 0.0, 0.0, 0.0, sy, 0.0)
    }

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self::new(1.0, 0.0, tx, 0.0, 1.0, ty)
    }

    /// Corner-convention grid-to-world transform mapping a `width` x `height`
    /// raster onto `bbox`, first row at the top (`max_y`).
    pub fn from_bbox_corner(bbox: &BoundingBox, width: usize, height: usize) -> Self {
        Self::new(
            bbox.width() / width as f64,
            0.0,
            bbox.min_x,
            0.0,
            -bbox.height() / height as f64,
            bbox.max_y,
        )
    }

    /// Compose two transforms: the result applies `other` first, then `self`.
    pub fn concat(&self, other: &AffineTransform) -> Self {
        Self {
            a: self.a * other.a + self.b * other.d,
            b: self.a * other.b + self.b * other.e,
            c: self.a * other.c + self.b * other.f + self.c,
            d: self.d * other.a + self.e * other.d,
            e: self.d * other.b + self.e * other.e,
            f: self.d * other.c + self.e * other.f + self.f,
        }
    }

    pub fn determinant(&self) -> f64 {
        self.a * self.e - self.b * self.d
    }

    /// Invert the transform.
    pub fn inverse(&self) -> Result<Self, GeometryError> {
        let det = self.determinant();
        let magnitude = (self.a * self.e).abs() + (self.b * self.d).abs();
        if !det.is_finite() || det == 0.0 || det.abs() <= SINGULAR_EPS * magnitude {
            return Err(GeometryError::NonInvertible(format!("{:?}", self)));
        }

        Ok(Self {
            a: self.e / det,
            b: -self.b / det,
            c: (self.b * self.f - self.e * self.c) / det,
            d: -self.d / det,
            e: self.a / det,
            f: (self.d * self.c - self.a * self.f) / det,
        })
    }

    /// Map a single point.
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.b * y + self.c,
            self.d * x + self.e * y + self.f,
        )
    }

    /// Map all four corners of `bbox` and return their envelope.
    pub fn transform_bbox(&self, bbox: &BoundingBox) -> BoundingBox {
        let mut out = BoundingBox::new(
            f64::INFINITY,
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::NEG_INFINITY,
        );
        for (x, y) in bbox.corners() {
            let (tx, ty) = self.apply(x, y);
            out.min_x = out.min_x.min(tx);
            out.min_y = out.min_y.min(ty);
            out.max_x = out.max_x.max(tx);
            out.max_y = out.max_y.max(ty);
        }
        out
    }

    pub fn is_identity(&self, tolerance: f64) -> bool {
        (self.a - 1.0).abs() <= tolerance
            && self.b.abs() <= tolerance
            && self.c.abs() <= tolerance
            && self.d.abs() <= tolerance
            && (self.e - 1.0).abs() <= tolerance
            && self.f.abs() <= tolerance
    }

    /// True for pure scale + translation (no shear, no rotation).
    pub fn is_scale_translate(&self) -> bool {
        self.b == 0.0 && self.d == 0.0
    }

    /// Convert a cell-center transform to cell-corner convention.
    pub fn center_to_corner(&self) -> Self {
        self.concat(&Self::translation(-0.5, -0.5))
    }

    /// Convert a cell-corner transform to cell-center convention.
    pub fn corner_to_center(&self) -> Self {
        self.concat(&Self::translation(0.5, 0.5))
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity()
    }
}
