//! Per-file metadata catalog.
//!
//! The catalog probes each granule once, derives its coverage envelope and
//! overview table, and keeps the result in a bounded cache keyed by path.
//! Entries older than the check interval are revalidated against the
//! file's modification time before being handed out again.

mod cache;
mod clock;

use std::collections::HashMap;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use coverage_common::{AffineTransform, BoundingBox, Crs, GeometryError, GridGeometry, PixelRect};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::codec::{CodecRegistry, PlaceholderCodec, RasterCodec, RasterInfo};
use crate::error::{CoverageError, Result};
use crate::granule::Level;
use crate::overview::OverviewTable;

pub use cache::{CatalogStats, MetadataCache, Revalidation};
pub use clock::{Clock, ManualClock, SystemClock};

/// Default time an entry is trusted without checking the file.
pub const DEFAULT_CHECK_INTERVAL_SECS: i64 = 600;

/// Default number of granules kept in the catalog.
pub const DEFAULT_CATALOG_CAPACITY: usize = 256;

/// Path reported for the built-in placeholder granule.
pub const PLACEHOLDER_PATH: &str = "<placeholder>";

/// How granules are placed in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Georeferencing {
    /// Envelope every granule is stretched onto. Without one a granule
    /// covers `(0, 0, width, height)` in raster space.
    pub envelope: Option<BoundingBox>,
    pub crs: Crs,
}

impl Georeferencing {
    fn envelope_for(&self, width: usize, height: usize) -> BoundingBox {
        self.envelope
            .unwrap_or_else(|| BoundingBox::new(0.0, 0.0, width as f64, height as f64))
    }
}

/// What the catalog knows about one granule file.
#[derive(Debug, Clone)]
pub struct ImageMetadata {
    pub path: PathBuf,
    pub width: usize,
    pub height: usize,
    pub overview_count: usize,
    pub codec: Arc<dyn RasterCodec>,
    pub info: RasterInfo,
    pub last_modified: DateTime<Utc>,
}

/// World placement of a granule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageEnvelope {
    pub bbox: BoundingBox,
    pub crs: Crs,
    pub raster_area: PixelRect,
    pub full_resolution: (f64, f64),
    /// Native grid-to-world, cell-center convention.
    pub grid_to_world: AffineTransform,
}

impl CoverageEnvelope {
    pub fn new(
        bbox: BoundingBox,
        crs: Crs,
        width: usize,
        height: usize,
    ) -> std::result::Result<Self, GeometryError> {
        let grid = GridGeometry::from_envelope(bbox, width, height)?;
        Ok(Self {
            bbox,
            crs,
            raster_area: grid.raster_area,
            full_resolution: grid.resolution(),
            grid_to_world: grid.grid_to_world,
        })
    }

    /// The native grid of the granule.
    pub fn native_grid(&self) -> GridGeometry {
        GridGeometry {
            envelope: self.bbox,
            raster_area: self.raster_area,
            grid_to_world: self.grid_to_world,
        }
    }
}

/// A cached granule: metadata, placement, overviews and the per-level
/// geometry computed so far.
#[derive(Debug)]
pub struct CatalogEntry {
    pub metadata: ImageMetadata,
    pub envelope: CoverageEnvelope,
    pub overviews: OverviewTable,
    levels: Mutex<HashMap<usize, Arc<Level>>>,
}

impl CatalogEntry {
    fn build(metadata: ImageMetadata, georef: &Georeferencing) -> Result<Self> {
        let (width, height) = (metadata.width, metadata.height);
        let bbox = georef.envelope_for(width, height);
        let envelope = CoverageEnvelope::new(bbox, georef.crs, width, height)
            .map_err(|e| CoverageError::source_input(&metadata.path, e.to_string()))?;

        let overviews = OverviewTable::from_pages(
            &bbox,
            (width, height),
            metadata.info.levels.get(1..).unwrap_or(&[]),
        );

        Ok(Self {
            metadata,
            envelope,
            overviews,
            levels: Mutex::new(HashMap::new()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.metadata.path
    }

    /// Geometry of overview `index`, computed on first use.
    pub fn level(&self, index: usize) -> Result<Arc<Level>> {
        let mut levels = self.levels.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(level) = levels.get(&index) {
            return Ok(Arc::clone(level));
        }

        let overview = self.overviews.level(index).ok_or_else(|| {
            CoverageError::decode(self.path(), format!("no overview level {}", index))
        })?;
        let base_corner = self.envelope.grid_to_world.center_to_corner();
        let level = Level::new(
            &base_corner,
            (self.metadata.width, self.metadata.height),
            overview,
        )
        .map_err(|e| CoverageError::noninvertible(self.path(), e.to_string()))?;

        debug!(
            path = %self.path().display(),
            level = index,
            width = level.width,
            height = level.height,
            "Computed level geometry"
        );
        let level = Arc::new(level);
        levels.insert(index, Arc::clone(&level));
        Ok(level)
    }
}

/// Path-keyed granule metadata, revalidated against file modification
/// times.
pub struct DatasetCatalog {
    cache: MetadataCache<PathBuf, CatalogEntry>,
    codecs: CodecRegistry,
    georef: Georeferencing,
    placeholder: Arc<CatalogEntry>,
}

impl DatasetCatalog {
    /// Create a catalog.
    ///
    /// # Arguments
    /// * `codecs` - Codecs tried in order when a granule is first opened
    /// * `georef` - Placement applied to every granule
    /// * `capacity` - Maximum number of cached granules
    /// * `check_interval` - How long an entry is trusted without a stat
    /// * `clock` - Time source for staleness checks
    pub fn new(
        codecs: CodecRegistry,
        georef: Georeferencing,
        capacity: NonZeroUsize,
        check_interval: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let placeholder = CatalogEntry::build(
            ImageMetadata {
                path: PathBuf::from(PLACEHOLDER_PATH),
                width: 1,
                height: 1,
                overview_count: 0,
                codec: Arc::new(PlaceholderCodec),
                info: PlaceholderCodec::info(),
                last_modified: DateTime::<Utc>::UNIX_EPOCH,
            },
            &georef,
        )?;

        Ok(Self {
            cache: MetadataCache::new(capacity, check_interval, clock),
            codecs,
            georef,
            placeholder: Arc::new(placeholder),
        })
    }

    /// A catalog with default codecs, capacity, interval and wall clock.
    pub fn with_defaults(georef: Georeferencing) -> Result<Self> {
        let capacity = NonZeroUsize::new(DEFAULT_CATALOG_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self::new(
            CodecRegistry::default(),
            georef,
            capacity,
            Duration::seconds(DEFAULT_CHECK_INTERVAL_SECS),
            Arc::new(SystemClock),
        )
    }

    /// Entry for the granule at `path`.
    ///
    /// Fails with `SourceInput` when the file is missing (evicting any
    /// cached entry) and with `NoReaderAvailable` when no codec can read it.
    pub fn get(&self, path: &Path) -> Result<Arc<CatalogEntry>> {
        self.cache.get_or_build(
            &path.to_path_buf(),
            |entry| {
                let modified = modification_time(path)?;
                if modified == entry.metadata.last_modified {
                    debug!(path = %path.display(), "Granule unchanged");
                    Ok(Revalidation::Unchanged)
                } else {
                    Ok(Revalidation::Changed)
                }
            },
            || self.build(path),
        )
    }

    /// The built-in 1x1 granule.
    pub fn placeholder(&self) -> Arc<CatalogEntry> {
        Arc::clone(&self.placeholder)
    }

    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    pub fn georeferencing(&self) -> &Georeferencing {
        &self.georef
    }

    pub fn stats(&self) -> CatalogStats {
        self.cache.stats()
    }

    /// When the entry for `path` was last built or revalidated.
    pub fn checked_at(&self, path: &Path) -> Option<DateTime<Utc>> {
        self.cache.checked_at(&path.to_path_buf())
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    fn build(&self, path: &Path) -> Result<CatalogEntry> {
        let last_modified = modification_time(path)?;
        let codec = self
            .codecs
            .find(path)
            .ok_or_else(|| CoverageError::no_reader(path))?;

        let info = codec.probe(path).map_err(|e| {
            warn!(path = %path.display(), codec = codec.name(), error = %e, "Probe failed");
            CoverageError::no_reader(path)
        })?;
        if info.width() == 0 || info.height() == 0 {
            warn!(path = %path.display(), codec = codec.name(), "Granule has no pixels");
            return Err(CoverageError::no_reader(path));
        }

        let metadata = ImageMetadata {
            path: path.to_path_buf(),
            width: info.width(),
            height: info.height(),
            overview_count: info.overview_count(),
            codec,
            info,
            last_modified,
        };

        info!(
            path = %path.display(),
            codec = metadata.codec.name(),
            width = metadata.width,
            height = metadata.height,
            overviews = metadata.overview_count,
            "Built catalog entry"
        );
        CatalogEntry::build(metadata, &self.georef)
    }
}

impl std::fmt::Debug for DatasetCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetCatalog")
            .field("codecs", &self.codecs.names())
            .field("georef", &self.georef)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Modification time of a regular file.
fn modification_time(path: &Path) -> Result<DateTime<Utc>> {
    let meta = fs::metadata(path).map_err(|e| CoverageError::source_input(path, e.to_string()))?;
    if !meta.is_file() {
        return Err(CoverageError::source_input(path, "not a regular file"));
    }
    let modified = meta
        .modified()
        .map_err(|e| CoverageError::source_input(path, e.to_string()))?;
    Ok(DateTime::<Utc>::from(modified))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;
    use tempfile::TempDir;

    fn write_png(path: &Path, width: u32, height: u32) {
        GrayImage::from_pixel(width, height, image::Luma([9])).save(path).unwrap();
    }

    fn catalog(clock: Arc<ManualClock>) -> DatasetCatalog {
        DatasetCatalog::new(
            CodecRegistry::default(),
            Georeferencing::default(),
            NonZeroUsize::new(8).unwrap(),
            Duration::minutes(10),
            clock,
        )
        .unwrap()
    }

    #[test]
    fn test_builds_entry_in_raster_space() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.png");
        write_png(&path, 40, 20);

        let catalog = catalog(Arc::new(ManualClock::default()));
        let entry = catalog.get(&path).unwrap();

        assert_eq!((entry.metadata.width, entry.metadata.height), (40, 20));
        assert_eq!(entry.metadata.overview_count, 0);
        assert_eq!(entry.envelope.bbox, BoundingBox::new(0.0, 0.0, 40.0, 20.0));
        assert_eq!(entry.envelope.crs, Crs::raster_space());
        assert_eq!(entry.envelope.full_resolution, (1.0, 1.0));
        assert_eq!(entry.overviews.overview_count(), 0);
    }

    #[test]
    fn test_configured_envelope_applies_to_every_granule() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.png");
        write_png(&path, 10, 10);

        let georef = Georeferencing {
            envelope: Some(BoundingBox::new(-180.0, -90.0, 180.0, 90.0)),
            crs: Crs::epsg(4326),
        };
        let catalog = DatasetCatalog::new(
            CodecRegistry::default(),
            georef,
            NonZeroUsize::new(8).unwrap(),
            Duration::minutes(10),
            Arc::new(ManualClock::default()),
        )
        .unwrap();
        let entry = catalog.get(&path).unwrap();
        assert_eq!(entry.envelope.full_resolution, (36.0, 18.0));
        assert_eq!(entry.envelope.crs, Crs::epsg(4326));
    }

    #[test]
    fn test_missing_file_is_source_input_error() {
        let dir = TempDir::new().unwrap();
        let catalog = catalog(Arc::new(ManualClock::default()));
        let err = catalog.get(&dir.path().join("nope.png")).unwrap_err();
        assert!(matches!(err, CoverageError::SourceInput { .. }));
    }

    #[test]
    fn test_unknown_format_has_no_reader() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, "not an image").unwrap();

        let catalog = catalog(Arc::new(ManualClock::default()));
        let err = catalog.get(&path).unwrap_err();
        assert!(matches!(err, CoverageError::NoReaderAvailable { .. }));
    }

    #[test]
    fn test_deleted_file_evicts_after_interval() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.png");
        write_png(&path, 4, 4);

        let clock = Arc::new(ManualClock::default());
        let catalog = catalog(Arc::clone(&clock));
        catalog.get(&path).unwrap();

        fs::remove_file(&path).unwrap();
        // still trusted inside the interval
        assert!(catalog.get(&path).is_ok());

        clock.advance(Duration::minutes(11));
        let err = catalog.get(&path).unwrap_err();
        assert!(matches!(err, CoverageError::SourceInput { .. }));
        assert_eq!(catalog.stats().entries, 0);
    }

    #[test]
    fn test_level_geometry_is_cached() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.png");
        write_png(&path, 8, 8);

        let catalog = catalog(Arc::new(ManualClock::default()));
        let entry = catalog.get(&path).unwrap();
        let first = entry.level(0).unwrap();
        let second = entry.level(0).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(entry.level(3).is_err());
    }

    #[test]
    fn test_placeholder_entry() {
        let catalog = catalog(Arc::new(ManualClock::default()));
        let placeholder = catalog.placeholder();
        assert_eq!(placeholder.path(), Path::new(PLACEHOLDER_PATH));
        assert_eq!(placeholder.envelope.raster_area, PixelRect::sized(1, 1));
        assert_eq!(catalog.stats().misses, 0);
    }
}
