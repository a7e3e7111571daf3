//! Request geometry resolution.
//!
//! Turns a requested grid (bounding box, raster size, grid-to-world) into
//! the pieces the rest of the pipeline works with:
//!
//! ```text
//! requested bbox ∩ coverage bbox ──► crop bbox
//!                                      │
//!   requested grid-to-world (corner)⁻¹ │
//!                                      ▼
//!                        destination raster area (pixels of the requested grid)
//! ```
//!
//! Requests and coverages share one CRS; nothing is reprojected here.

use coverage_common::{AffineTransform, BoundingBox, GeometryError, GridGeometry, PixelRect};
use serde::{Deserialize, Serialize};

use crate::catalog::CoverageEnvelope;

/// Geometry of a request after intersecting it with a coverage.
///
/// Only produced for non-empty requests: `crop_bbox` lies inside the
/// coverage bounding box and `destination` has at least one pixel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedGeometry {
    pub crop_bbox: BoundingBox,
    /// Area of the requested grid covered by the crop, in requested pixels.
    pub destination: PixelRect,
    pub requested_resolution: (f64, f64),
    /// Requested grid-to-world in cell-corner convention.
    pub grid_to_world_corner: AffineTransform,
}

/// Intersect the requested box with the coverage box.
///
/// `None` when they do not overlap (touching edges included).
pub fn compute_crop_bbox(requested: &BoundingBox, coverage: &BoundingBox) -> Option<BoundingBox> {
    requested.intersection(coverage)
}

/// Pixel rectangle of `crop` in the requested grid.
///
/// `grid_to_world` is the requested transform in cell-center convention;
/// it is shifted to cell corners before being inverted. Each edge is
/// rounded to the nearest integer. `None` when the rectangle is empty.
pub fn compute_destination_raster_area(
    crop: &BoundingBox,
    grid_to_world: &AffineTransform,
) -> Result<Option<PixelRect>, GeometryError> {
    let world_to_grid = grid_to_world.center_to_corner().inverse()?;
    let area = PixelRect::from_bbox_rounded(&world_to_grid.transform_bbox(crop));
    Ok((!area.is_empty()).then_some(area))
}

/// Resolution implied by the requested transform.
///
/// Only scale and translation are understood; for a sheared or rotated
/// transform the coverage's native `fallback` resolution is used.
pub fn compute_requested_resolution(
    grid_to_world: &AffineTransform,
    fallback: (f64, f64),
) -> (f64, f64) {
    if grid_to_world.is_scale_translate() {
        (grid_to_world.a.abs(), grid_to_world.e.abs())
    } else {
        tracing::warn!(
            transform = ?grid_to_world,
            fallback = ?fallback,
            "Requested grid-to-world is not a pure scale/translate, using native resolution"
        );
        fallback
    }
}

/// Resolve a requested grid against a coverage.
///
/// `Ok(None)` means nothing of the coverage falls in the request.
pub fn resolve(
    requested: &GridGeometry,
    coverage: &CoverageEnvelope,
) -> Result<Option<ResolvedGeometry>, GeometryError> {
    let Some(crop_bbox) = compute_crop_bbox(&requested.envelope, &coverage.bbox) else {
        tracing::debug!(
            requested = ?requested.envelope,
            coverage = ?coverage.bbox,
            "Requested envelope does not intersect coverage"
        );
        return Ok(None);
    };

    let Some(destination) = compute_destination_raster_area(&crop_bbox, &requested.grid_to_world)?
    else {
        tracing::debug!(crop = ?crop_bbox, "Requested envelope too small, empty raster area");
        return Ok(None);
    };

    Ok(Some(ResolvedGeometry {
        crop_bbox,
        destination,
        requested_resolution: compute_requested_resolution(
            &requested.grid_to_world,
            coverage.full_resolution,
        ),
        grid_to_world_corner: requested.grid_to_world.center_to_corner(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use coverage_common::Crs;

    fn coverage() -> CoverageEnvelope {
        CoverageEnvelope::new(BoundingBox::new(0.0, 0.0, 1000.0, 1000.0), Crs::raster_space(), 1000, 1000)
            .unwrap()
    }

    #[test]
    fn test_crop_bbox_is_intersection() {
        let crop = compute_crop_bbox(
            &BoundingBox::new(-500.0, 500.0, 500.0, 1500.0),
            &BoundingBox::new(0.0, 0.0, 1000.0, 1000.0),
        )
        .unwrap();
        assert_eq!(crop, BoundingBox::new(0.0, 500.0, 500.0, 1000.0));
    }

    #[test]
    fn test_crop_bbox_disjoint() {
        assert!(compute_crop_bbox(
            &BoundingBox::new(2000.0, 2000.0, 3000.0, 3000.0),
            &BoundingBox::new(0.0, 0.0, 1000.0, 1000.0),
        )
        .is_none());
    }

    #[test]
    fn test_destination_area_of_partial_overlap() {
        // 100x100 request over -500..500, 10 world units per pixel
        let requested =
            GridGeometry::from_envelope(BoundingBox::new(-500.0, -500.0, 500.0, 500.0), 100, 100)
                .unwrap();
        let resolved = resolve(&requested, &coverage()).unwrap().unwrap();

        assert_eq!(resolved.crop_bbox, BoundingBox::new(0.0, 0.0, 500.0, 500.0));
        assert_eq!(resolved.destination, PixelRect::new(50, 0, 50, 50));
        assert_eq!(resolved.requested_resolution, (10.0, 10.0));
    }

    #[test]
    fn test_destination_area_too_small_is_empty() {
        let crop = BoundingBox::new(0.0, 0.0, 0.1, 0.1);
        let g2w = AffineTransform::new(1.0, 0.0, 0.5, 0.0, -1.0, 999.5);
        assert!(compute_destination_raster_area(&crop, &g2w).unwrap().is_none());
    }

    #[test]
    fn test_singular_transform_is_rejected() {
        let crop = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let g2w = AffineTransform::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        assert!(matches!(
            compute_destination_raster_area(&crop, &g2w),
            Err(GeometryError::NonInvertible(_))
        ));
    }

    #[test]
    fn test_rotated_transform_falls_back_to_native() {
        let rotated = AffineTransform::new(0.0, 2.0, 0.0, 2.0, 0.0, 0.0);
        assert_eq!(compute_requested_resolution(&rotated, (1.0, 1.0)), (1.0, 1.0));

        let flipped = AffineTransform::new(4.0, 0.0, 0.0, 0.0, -4.0, 0.0);
        assert_eq!(compute_requested_resolution(&flipped, (1.0, 1.0)), (4.0, 4.0));
    }

    #[test]
    fn test_disjoint_request_resolves_to_none() {
        let requested =
            GridGeometry::from_envelope(BoundingBox::new(5000.0, 5000.0, 6000.0, 6000.0), 10, 10)
                .unwrap();
        assert!(resolve(&requested, &coverage()).unwrap().is_none());
    }

    #[test]
    fn test_crop_is_inside_coverage() {
        let coverage = coverage();
        let requests = [
            BoundingBox::new(-10.0, -10.0, 10.0, 10.0),
            BoundingBox::new(990.0, 990.0, 2000.0, 2000.0),
            BoundingBox::new(-1e6, 400.0, 1e6, 600.0),
            BoundingBox::new(100.0, 100.0, 200.0, 200.0),
        ];
        for bbox in requests {
            let requested = GridGeometry::from_envelope(bbox, 64, 64).unwrap();
            if let Some(resolved) = resolve(&requested, &coverage).unwrap() {
                assert!(coverage.bbox.contains(&resolved.crop_bbox));
            }
        }
    }
}
