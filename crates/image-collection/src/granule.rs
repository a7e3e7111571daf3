//! Granule loading.
//!
//! Reads the part of one granule that falls in a crop box and aligns it
//! with the requested grid:
//!
//! ```text
//! crop bbox ──world_to_grid(level)──► source region (clipped to level)
//!                                          │ decode (level, subsampling)
//!                                          ▼
//!                                     decoded block
//!                                          │ residual transform
//!                                          ▼
//!                        block on the requested grid (+ grid-to-world)
//! ```
//!
//! The residual transform maps decoded pixels to requested pixels. When
//! decimation lands exactly on the requested resolution and origin it is
//! the identity and the decoded block is returned untouched.

use coverage_common::{AffineTransform, BoundingBox, GeometryError, PixelRect, AFFINE_IDENTITY_EPS};
use tracing::{debug, warn};

use crate::catalog::CatalogEntry;
use crate::codec::{DecodeRequest, ReadStrategy};
use crate::error::{CoverageError, Result};
use crate::overview::OverviewLevel;
use crate::raster::PixelBlock;

/// Geometry of one overview level of a granule.
#[derive(Debug, Clone, PartialEq)]
pub struct Level {
    pub index: usize,
    /// Base pixels per level pixel along x.
    pub scale_x: f64,
    /// Base pixels per level pixel along y.
    pub scale_y: f64,
    pub width: usize,
    pub height: usize,
    pub level_to_base: AffineTransform,
    /// Level grid-to-world, cell-corner convention.
    pub grid_to_world: AffineTransform,
    world_to_grid: AffineTransform,
    pub raster_bounds: PixelRect,
}

impl Level {
    /// Build the geometry of `overview` from the base level's corner
    /// grid-to-world and dimensions.
    pub fn new(
        base_grid_to_world: &AffineTransform,
        base: (usize, usize),
        overview: &OverviewLevel,
    ) -> std::result::Result<Self, GeometryError> {
        if overview.width == 0 || overview.height == 0 {
            return Err(GeometryError::EmptyRaster {
                width: overview.width,
                height: overview.height,
            });
        }

        let scale_x = base.0 as f64 / overview.width as f64;
        let scale_y = base.1 as f64 / overview.height as f64;
        let level_to_base = AffineTransform::scale(scale_x, scale_y);
        let grid_to_world = base_grid_to_world.concat(&level_to_base);
        let world_to_grid = grid_to_world.inverse()?;

        Ok(Self {
            index: overview.index,
            scale_x,
            scale_y,
            width: overview.width,
            height: overview.height,
            level_to_base,
            grid_to_world,
            world_to_grid,
            raster_bounds: PixelRect::sized(overview.width, overview.height),
        })
    }

    /// Pixels of this level covering `crop`, clipped to the level.
    pub fn source_region(&self, crop: &BoundingBox) -> PixelRect {
        PixelRect::from_bbox_outer(&self.world_to_grid.transform_bbox(crop))
            .intersection(&self.raster_bounds)
    }
}

/// What to load from a granule.
#[derive(Debug, Clone, Copy)]
pub struct GranuleRequest<'a> {
    /// Overview page index.
    pub level: usize,
    pub subsampling: (usize, usize),
    pub crop_bbox: BoundingBox,
    /// Requested grid-to-world, cell-corner convention.
    pub grid_to_world: AffineTransform,
    /// Area of the requested grid to fill.
    pub destination: PixelRect,
    /// Advisory tile size, only logged.
    pub tile_hint: Option<(usize, usize)>,
    pub background: Option<&'a [f64]>,
}

/// Result of loading a granule.
#[derive(Debug, Clone, PartialEq)]
pub enum GranuleLoad {
    /// Pixels plus their cell-corner grid-to-world.
    Loaded {
        block: PixelBlock,
        grid_to_world: AffineTransform,
    },
    /// Nothing could be read: no overlap, or the decode failed.
    Empty,
}

/// Decodes granule regions.
#[derive(Debug, Clone, Copy, Default)]
pub struct GranuleLoader {
    pub strategy: ReadStrategy,
    /// Turn palette indices into RGB after decoding.
    pub expand_palette: bool,
}

impl GranuleLoader {
    pub fn new(strategy: ReadStrategy, expand_palette: bool) -> Self {
        Self {
            strategy,
            expand_palette,
        }
    }

    /// Load the part of `entry` described by `request`.
    ///
    /// Decode failures are logged and reported as [`GranuleLoad::Empty`];
    /// only geometry errors are returned.
    pub fn load(&self, entry: &CatalogEntry, request: &GranuleRequest<'_>) -> Result<GranuleLoad> {
        match self.try_load(entry, request) {
            Ok(load) => Ok(load),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(
                    path = %entry.path().display(),
                    level = request.level,
                    error = %e,
                    "Granule load failed, treating as empty"
                );
                Ok(GranuleLoad::Empty)
            }
        }
    }

    fn try_load(&self, entry: &CatalogEntry, request: &GranuleRequest<'_>) -> Result<GranuleLoad> {
        let path = entry.path();
        let level = entry.level(request.level)?;

        let region = level.source_region(&request.crop_bbox);
        if region.is_empty() {
            debug!(
                path = %path.display(),
                level = level.index,
                crop = ?request.crop_bbox,
                "Crop does not cover any pixel of the level"
            );
            return Ok(GranuleLoad::Empty);
        }

        let decode = DecodeRequest {
            level: level.index,
            region,
            subsampling: request.subsampling,
            strategy: self.strategy,
        };
        debug!(
            path = %path.display(),
            level = level.index,
            region = ?region,
            subsampling = ?request.subsampling,
            strategy = ?self.strategy,
            tile_hint = ?request.tile_hint,
            "Decoding granule region"
        );

        let mut block = entry
            .metadata
            .codec
            .decode(path, &decode)
            .map_err(|e| e.with_path(path))?;
        if self.expand_palette {
            block = block.expand_palette();
        }
        if block.width() == 0 || block.height() == 0 {
            return Ok(GranuleLoad::Empty);
        }

        let decoded_to_world = level
            .grid_to_world
            .concat(&AffineTransform::translation(region.x as f64, region.y as f64))
            .concat(&AffineTransform::scale(
                region.width as f64 / block.width() as f64,
                region.height as f64 / block.height() as f64,
            ));
        let world_to_requested = request
            .grid_to_world
            .inverse()
            .map_err(|e| CoverageError::noninvertible(path, e.to_string()))?;
        let residual = world_to_requested.concat(&decoded_to_world);

        if residual.is_identity(AFFINE_IDENTITY_EPS) {
            return Ok(GranuleLoad::Loaded {
                block,
                grid_to_world: decoded_to_world,
            });
        }

        let dest = request.destination;
        let output_to_requested = AffineTransform::translation(dest.x as f64, dest.y as f64);
        let output_to_decoded = residual
            .inverse()
            .map_err(|e| CoverageError::noninvertible(path, e.to_string()))?
            .concat(&output_to_requested);

        debug!(
            path = %path.display(),
            decoded = ?(block.width(), block.height()),
            destination = ?dest,
            "Resampling through residual transform"
        );
        let block = block.resample_nearest(dest.width, dest.height, &output_to_decoded, request.background);
        Ok(GranuleLoad::Loaded {
            block,
            grid_to_world: request.grid_to_world.concat(&output_to_requested),
        })
    }
}
