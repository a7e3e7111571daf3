//! Response assembly: the read pipeline end to end.
//!
//! ```text
//! Query ─► granule source ─► catalog entry ─► resolved geometry ─┐
//!                                                                │ None: nothing to read
//!          overview level + decimation ◄─────────────────────────┘
//!                      │
//!                      ▼
//!               granule load ── Empty ──► background fill
//!                      │                        │
//!                      ▼                        ▼
//!                   CoverageResult (block, corner grid-to-world, bands, path)
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use coverage_common::{AffineTransform, BoundingBox, PixelRect};
use tracing::debug;

use crate::catalog::{CatalogEntry, DatasetCatalog};
use crate::codec::ReadStrategy;
use crate::decimation;
use crate::error::{CoverageError, Result};
use crate::geometry;
use crate::granule::{GranuleLoad, GranuleLoader, GranuleRequest};
use crate::path::{select_source, GranuleSource};
use crate::query::Query;
use crate::raster::{BandDescriptor, PixelBlock};

/// The answer to one read.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageResult {
    pub block: PixelBlock,
    /// Block grid-to-world, cell-corner convention.
    pub grid_to_world: AffineTransform,
    pub bands: Vec<BandDescriptor>,
    pub source_path: PathBuf,
}

impl CoverageResult {
    /// World extent of the block.
    pub fn envelope(&self) -> BoundingBox {
        self.grid_to_world
            .transform_bbox(&PixelRect::sized(self.block.width(), self.block.height()).to_bbox())
    }
}

/// Runs queries against one collection.
#[derive(Debug)]
pub struct ResponseAssembler {
    root: PathBuf,
    catalog: DatasetCatalog,
    default_path: Option<String>,
    expand: bool,
    strategy: ReadStrategy,
}

impl ResponseAssembler {
    /// # Arguments
    /// * `root` - Collection root; every granule path must stay inside it
    /// * `catalog` - Granule metadata
    /// * `default_path` - Granule read when a query names none
    /// * `expand` - Expand palette rasters to RGB
    /// * `strategy` - Read strategy for queries that do not pick one
    pub fn new(
        root: impl Into<PathBuf>,
        catalog: DatasetCatalog,
        default_path: Option<String>,
        expand: bool,
        strategy: ReadStrategy,
    ) -> Self {
        Self {
            root: root.into(),
            catalog,
            default_path,
            expand,
            strategy,
        }
    }

    pub fn catalog(&self) -> &DatasetCatalog {
        &self.catalog
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run `query`.
    ///
    /// `Ok(None)` when the requested area misses the granule. A granule
    /// that overlaps but cannot be decoded yields a background filled block.
    pub fn resolve(&self, query: &Query) -> Result<Option<CoverageResult>> {
        let entry = self.entry_for(query)?;
        let path = entry.path().to_path_buf();

        // without a requested grid read the native one, undecimated
        let (grid, requested_resolution) = match &query.grid {
            Some(grid) => (*grid, true),
            None => (entry.envelope.native_grid(), false),
        };

        let Some(resolved) = geometry::resolve(&grid, &entry.envelope)
            .map_err(|e| CoverageError::noninvertible(&path, e.to_string()))?
        else {
            debug!(path = %path.display(), "Request does not overlap granule");
            return Ok(None);
        };
        let requested_resolution = requested_resolution.then_some(resolved.requested_resolution);

        let level_index = match requested_resolution {
            Some(resolution) => entry.overviews.pick(resolution, query.overview_policy),
            None => entry.overviews.base().index,
        };
        let level = entry
            .overviews
            .level(level_index)
            .unwrap_or_else(|| entry.overviews.base());
        let subsampling = decimation::factors_for(level, requested_resolution);

        debug!(
            path = %path.display(),
            level = level.index,
            subsampling = ?subsampling,
            policy = %query.overview_policy,
            crop = ?resolved.crop_bbox,
            destination = ?resolved.destination,
            "Resolved read"
        );

        let loader = GranuleLoader::new(query.read_strategy.unwrap_or(self.strategy), self.expand);
        let request = GranuleRequest {
            level: level.index,
            subsampling,
            crop_bbox: resolved.crop_bbox,
            grid_to_world: resolved.grid_to_world_corner,
            destination: resolved.destination,
            tile_hint: query.tile_hint,
            background: query.background.as_deref(),
        };

        let (block, grid_to_world) = match loader.load(&entry, &request)? {
            GranuleLoad::Loaded {
                block,
                grid_to_world,
            } => (block, grid_to_world),
            GranuleLoad::Empty => {
                debug!(
                    path = %path.display(),
                    destination = ?resolved.destination,
                    "Nothing loaded, filling with background"
                );
                self.background(&entry, &resolved.destination, &resolved.grid_to_world_corner, query)?
            }
        };

        let bands = block
            .layout()
            .band_descriptors()
            .map_err(|reason| CoverageError::unsupported_format(&path, reason))?;

        Ok(Some(CoverageResult {
            block,
            grid_to_world,
            bands,
            source_path: path,
        }))
    }

    fn entry_for(&self, query: &Query) -> Result<Arc<CatalogEntry>> {
        match select_source(&self.root, query.path.as_ref(), self.default_path.as_deref())? {
            GranuleSource::File(path) => self.catalog.get(&path),
            GranuleSource::Placeholder => Ok(self.catalog.placeholder()),
        }
    }

    /// Constant block covering `destination` in the granule's layout.
    fn background(
        &self,
        entry: &CatalogEntry,
        destination: &PixelRect,
        requested_grid_to_world: &AffineTransform,
        query: &Query,
    ) -> Result<(PixelBlock, AffineTransform)> {
        let layout = if self.expand {
            entry.metadata.info.layout.expanded()
        } else {
            entry.metadata.info.layout.clone()
        };
        let block = PixelBlock::constant(
            destination.width,
            destination.height,
            layout,
            query.background.as_deref(),
        )
        .map_err(|e| e.with_path(entry.path()))?;

        let grid_to_world = requested_grid_to_world.concat(&AffineTransform::translation(
            destination.x as f64,
            destination.y as f64,
        ));
        Ok((block, grid_to_world))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Georeferencing, ManualClock};
    use crate::codec::{CodecRegistry, DecodeRequest, RasterCodec, RasterInfo};
    use crate::raster::{ColorLayout, SampleType};
    use chrono::Duration;
    use coverage_common::GridGeometry;
    use std::num::NonZeroUsize;
    use tempfile::TempDir;

    fn assembler(root: &Path, codecs: CodecRegistry, default_path: Option<&str>) -> ResponseAssembler {
        let catalog = DatasetCatalog::new(
            codecs,
            Georeferencing::default(),
            NonZeroUsize::new(4).unwrap(),
            Duration::minutes(10),
            Arc::new(ManualClock::default()),
        )
        .unwrap();
        ResponseAssembler::new(
            root,
            catalog,
            default_path.map(str::to_string),
            false,
            ReadStrategy::WholeImageRead,
        )
    }

    #[test]
    fn test_placeholder_without_any_path() {
        let dir = TempDir::new().unwrap();
        let assembler = assembler(dir.path(), CodecRegistry::default(), None);

        let result = assembler.resolve(&Query::new()).unwrap().unwrap();
        assert_eq!((result.block.width(), result.block.height()), (1, 1));
        assert_eq!(result.source_path, PathBuf::from(crate::catalog::PLACEHOLDER_PATH));
        assert_eq!(result.bands.len(), 1);
        assert_eq!(result.envelope(), BoundingBox::new(0.0, 0.0, 1.0, 1.0));
    }

    #[derive(Debug)]
    struct FailingCodec(ColorLayout);

    impl RasterCodec for FailingCodec {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn can_decode(&self, _path: &Path) -> bool {
            true
        }

        fn probe(&self, _path: &Path) -> Result<RasterInfo> {
            Ok(RasterInfo {
                levels: vec![(20, 20)],
                layout: self.0.clone(),
            })
        }

        fn decode(&self, path: &Path, _request: &DecodeRequest) -> Result<PixelBlock> {
            Err(CoverageError::decode(path, "bad huffman table"))
        }
    }

    #[test]
    fn test_failed_decode_fills_background() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("g.raw"), b"x").unwrap();
        let codecs =
            CodecRegistry::empty().with_codec(Arc::new(FailingCodec(ColorLayout::Rgb(SampleType::U8))));
        let assembler = assembler(dir.path(), codecs, Some("g.raw"));

        // half of the request lies left of the granule
        let grid =
            GridGeometry::from_envelope(BoundingBox::new(-10.0, 0.0, 10.0, 20.0), 20, 20).unwrap();
        let query = Query::new().with_grid(grid).with_background(vec![1.0, 2.0, 3.0]);
        let result = assembler.resolve(&query).unwrap().unwrap();

        assert_eq!((result.block.width(), result.block.height()), (10, 20));
        assert_eq!(result.block.sample(0, 0, 2), Some(3.0));
        assert_eq!(result.envelope(), BoundingBox::new(0.0, 0.0, 10.0, 20.0));
        assert_eq!(result.bands.len(), 3);
    }

    #[test]
    fn test_unsupported_layout_is_fatal() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("g.raw"), b"x").unwrap();
        let codecs = CodecRegistry::empty()
            .with_codec(Arc::new(FailingCodec(ColorLayout::Unsupported("cmyk".to_string()))));
        let assembler = assembler(dir.path(), codecs, Some("g.raw"));

        let err = assembler.resolve(&Query::new()).unwrap_err();
        assert!(matches!(err, CoverageError::UnsupportedSampleFormat { .. }));
    }

    #[test]
    fn test_traversal_is_rejected() {
        let dir = TempDir::new().unwrap();
        let assembler = assembler(dir.path(), CodecRegistry::default(), None);
        let err = assembler
            .resolve(&Query::new().with_path("../outside.png"))
            .unwrap_err();
        assert!(matches!(err, CoverageError::PathTraversalRejected { .. }));
    }
}
