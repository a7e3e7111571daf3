//! Raster-space rectangles and grid geometries.

use serde::{Deserialize, Serialize};

use crate::affine::AffineTransform;
use crate::bbox::BoundingBox;
use crate::error::GeometryError;

/// Distance from an integer under which a pixel edge is considered to lie
/// on it.
pub const EDGE_SNAP_EPS: f64 = 1e-6;

fn snap(v: f64) -> f64 {
    let rounded = v.round();
    if (v - rounded).abs() < EDGE_SNAP_EPS {
        rounded
    } else {
        v
    }
}

/// An integer rectangle in raster (pixel) space.
///
/// The origin may be negative: a destination area computed against a
/// requested grid can start left of or above that grid's first cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: i64,
    pub y: i64,
    pub width: usize,
    pub height: usize,
}

impl PixelRect {
    pub fn new(x: i64, y: i64, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// A rectangle anchored at the origin.
    pub fn sized(width: usize, height: usize) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Round each edge of a floating point box to the nearest integer.
    pub fn from_bbox_rounded(bbox: &BoundingBox) -> Self {
        let x0 = bbox.min_x.round() as i64;
        let y0 = bbox.min_y.round() as i64;
        let x1 = bbox.max_x.round() as i64;
        let y1 = bbox.max_y.round() as i64;
        Self::from_edges(x0, y0, x1, y1)
    }

    /// Smallest integer rectangle covering a floating point box.
    ///
    /// Edges within [`EDGE_SNAP_EPS`] of an integer snap to it, so round
    /// off from a transform does not grow the rectangle by a pixel.
    pub fn from_bbox_outer(bbox: &BoundingBox) -> Self {
        let x0 = snap(bbox.min_x).floor() as i64;
        let y0 = snap(bbox.min_y).floor() as i64;
        let x1 = snap(bbox.max_x).ceil() as i64;
        let y1 = snap(bbox.max_y).ceil() as i64;
        Self::from_edges(x0, y0, x1, y1)
    }

    fn from_edges(x0: i64, y0: i64, x1: i64, y1: i64) -> Self {
        Self {
            x: x0,
            y: y0,
            width: (x1 - x0).max(0) as usize,
            height: (y1 - y0).max(0) as usize,
        }
    }

    pub fn max_x(&self) -> i64 {
        self.x + self.width as i64
    }

    pub fn max_y(&self) -> i64 {
        self.y + self.height as i64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Intersection of two rectangles; empty (zero sized) when disjoint.
    pub fn intersection(&self, other: &PixelRect) -> PixelRect {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.max_x().min(other.max_x());
        let y1 = self.max_y().min(other.max_y());
        Self::from_edges(x0, y0, x1, y1)
    }

    /// The rectangle as a floating point box in raster space.
    pub fn to_bbox(&self) -> BoundingBox {
        BoundingBox::new(
            self.x as f64,
            self.y as f64,
            self.max_x() as f64,
            self.max_y() as f64,
        )
    }
}

/// A raster grid placed in world space: raster area plus grid-to-world.
///
/// `grid_to_world` uses cell-center convention.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry {
    pub envelope: BoundingBox,
    pub raster_area: PixelRect,
    pub grid_to_world: AffineTransform,
}

impl GridGeometry {
    /// Grid of `width` x `height` cells covering `envelope`, north up.
    pub fn from_envelope(
        envelope: BoundingBox,
        width: usize,
        height: usize,
    ) -> Result<Self, GeometryError> {
        if width == 0 || height == 0 {
            return Err(GeometryError::EmptyRaster { width, height });
        }
        if envelope.is_empty() {
            return Err(GeometryError::EmptyEnvelope(format!("{:?}", envelope)));
        }

        let corner = AffineTransform::from_bbox_corner(&envelope, width, height);
        Ok(Self {
            envelope,
            raster_area: PixelRect::sized(width, height),
            grid_to_world: corner.corner_to_center(),
        })
    }

    /// Grid from an explicit center-convention transform.
    ///
    /// The envelope is derived by mapping the raster area through the
    /// corner form of the transform.
    pub fn from_transform(raster_area: PixelRect, grid_to_world: AffineTransform) -> Self {
        let envelope = grid_to_world
            .center_to_corner()
            .transform_bbox(&raster_area.to_bbox());
        Self {
            envelope,
            raster_area,
            grid_to_world,
        }
    }

    /// Resolution of the grid along each axis, from the envelope span.
    pub fn resolution(&self) -> (f64, f64) {
        (
            self.envelope.width() / self.raster_area.width as f64,
            self.envelope.height() / self.raster_area.height as f64,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_rect_rounding() {
        let bbox = BoundingBox::new(0.4, 0.6, 9.5, 10.2);
        assert_eq!(PixelRect::from_bbox_rounded(&bbox), PixelRect::new(0, 1, 10, 9));
        assert_eq!(PixelRect::from_bbox_outer(&bbox), PixelRect::new(0, 0, 10, 11));

        let nearly = BoundingBox::new(1.999_999_999_9, 0.0, 4.000_000_000_1, 2.0);
        assert_eq!(PixelRect::from_bbox_outer(&nearly), PixelRect::new(2, 0, 2, 2));
    }

    #[test]
    fn test_pixel_rect_intersection() {
        let a = PixelRect::new(0, 0, 10, 10);
        let b = PixelRect::new(5, -5, 10, 10);
        assert_eq!(a.intersection(&b), PixelRect::new(5, 0, 5, 5));

        let c = PixelRect::new(20, 20, 5, 5);
        assert!(a.intersection(&c).is_empty());
    }

    #[test]
    fn test_grid_geometry_from_envelope() {
        let geometry =
            GridGeometry::from_envelope(BoundingBox::new(0.0, 0.0, 100.0, 50.0), 100, 50).unwrap();
        assert_eq!(geometry.resolution(), (1.0, 1.0));
        // center of the top left cell
        assert_eq!(geometry.grid_to_world.apply(0.0, 0.0), (0.5, 49.5));

        let rebuilt = GridGeometry::from_transform(geometry.raster_area, geometry.grid_to_world);
        assert_eq!(rebuilt.envelope, geometry.envelope);
    }

    #[test]
    fn test_grid_geometry_rejects_empty_raster() {
        let result = GridGeometry::from_envelope(BoundingBox::new(0.0, 0.0, 1.0, 1.0), 0, 10);
        assert!(matches!(result, Err(GeometryError::EmptyRaster { .. })));
    }
}
