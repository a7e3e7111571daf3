//! Format and reader boundary.
//!
//! [`ImageCollectionFormat`] decides whether a path is a collection and
//! opens readers on it; [`ImageCollectionReader`] answers reads.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use coverage_common::{BoundingBox, Crs, PixelRect};
use tracing::{info, warn};

use crate::catalog::{CatalogStats, Clock, DatasetCatalog, SystemClock};
use crate::codec::CodecRegistry;
use crate::config::{DirectoryConfig, ReaderConfig};
use crate::error::{CoverageError, Result};
use crate::params::ReadParameter;
use crate::query::Query;
use crate::response::{CoverageResult, ResponseAssembler};

/// Entry point for hosts discovering collections.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCollectionFormat;

impl ImageCollectionFormat {
    pub fn name(&self) -> &'static str {
        "ImageCollection"
    }

    /// True only for an existing directory.
    pub fn accepts(&self, source: &Path) -> bool {
        source.is_dir()
    }

    /// Open a reader, `None` (with a warning) when `source` is not a
    /// usable collection.
    pub fn create_reader(&self, source: &Path, config: ReaderConfig) -> Option<ImageCollectionReader> {
        if !self.accepts(source) {
            warn!(source = %source.display(), "Not an image collection directory");
            return None;
        }

        match ImageCollectionReader::open(source, config) {
            Ok(reader) => Some(reader),
            Err(e) => {
                warn!(source = %source.display(), error = %e, "Failed to open image collection");
                None
            }
        }
    }
}

/// Reads from one collection directory.
#[derive(Debug)]
pub struct ImageCollectionReader {
    root: PathBuf,
    directory: DirectoryConfig,
    assembler: ResponseAssembler,
}

impl ImageCollectionReader {
    /// Open the collection at `root` with the wall clock.
    pub fn open(root: &Path, config: ReaderConfig) -> Result<Self> {
        Self::open_with_clock(root, config, Arc::new(SystemClock))
    }

    /// Open the collection at `root`, timing catalog checks with `clock`.
    ///
    /// An invalid `config` is logged and replaced by the defaults.
    pub fn open_with_clock(root: &Path, config: ReaderConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let config = match config.validate() {
            Ok(()) => config,
            Err(reason) => {
                let err = CoverageError::config(root, reason);
                warn!(error = %err, "Invalid reader configuration, using defaults");
                ReaderConfig::default()
            }
        };

        let root = root
            .canonicalize()
            .map_err(|e| CoverageError::source_input(root, e.to_string()))?;
        let codecs = CodecRegistry::default();
        let directory = DirectoryConfig::load_or_create(&root, &codecs)?;

        let capacity = NonZeroUsize::new(config.catalog_capacity).unwrap_or(NonZeroUsize::MIN);
        let catalog = DatasetCatalog::new(
            codecs,
            directory.georeferencing(),
            capacity,
            config.check_interval(&directory),
            clock,
        )?;

        info!(
            root = %root.display(),
            coverage = %directory.coverage_name,
            crs = %directory.crs(),
            default_path = ?directory.default_path,
            strategy = ?config.read_strategy,
            "Opened image collection"
        );

        let assembler = ResponseAssembler::new(
            root.clone(),
            catalog,
            directory.default_path.clone(),
            directory.expand,
            config.read_strategy,
        );
        Ok(Self {
            root,
            directory,
            assembler,
        })
    }

    /// Read with named parameters.
    ///
    /// `Ok(None)` when the requested area misses the selected granule.
    pub fn read(&self, params: &[ReadParameter]) -> Result<Option<CoverageResult>> {
        let query = Query::from_parameters(params)?;
        self.read_query(&query)
    }

    pub fn read_query(&self, query: &Query) -> Result<Option<CoverageResult>> {
        self.assembler.resolve(query)
    }

    /// Envelope advertised for the collection.
    pub fn original_envelope(&self) -> BoundingBox {
        self.directory.advertised_envelope()
    }

    /// Raster area advertised for the collection.
    pub fn original_grid_range(&self) -> PixelRect {
        PixelRect::sized(self.directory.max_width, self.directory.max_height)
    }

    pub fn crs(&self) -> Crs {
        self.directory.crs()
    }

    pub fn coverage_name(&self) -> &str {
        &self.directory.coverage_name
    }

    pub fn directory_config(&self) -> &DirectoryConfig {
        &self.directory
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn catalog(&self) -> &DatasetCatalog {
        self.assembler.catalog()
    }

    pub fn catalog_stats(&self) -> CatalogStats {
        self.catalog().stats()
    }
}
