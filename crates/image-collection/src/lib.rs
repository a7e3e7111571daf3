//! A directory of raster images exposed as one queryable coverage.
//!
//! Each read picks one granule (a file in the directory), resolves the
//! requested grid against it, decodes just the overview level and region it
//! needs and returns a block aligned with the requested grid:
//!
//! - **Cached metadata**: granules are probed once and revalidated against
//!   their modification time after a configurable interval
//! - **Overviews and decimation**: reduced pages and integer subsampling
//!   keep coarse reads cheap
//! - **Graceful degradation**: unreadable granules turn into background
//!   fill instead of failed reads
//!
//! # Architecture
//!
//! ```text
//! ImageCollectionReader::read(params)
//!      │
//!      ▼
//! ResponseAssembler::resolve(query)
//!      │
//!      ├─► select granule (PATH filter → defaultPath → placeholder)
//!      │
//!      ├─► DatasetCatalog::get(path)       metadata, envelope, overviews
//!      │
//!      ├─► geometry::resolve               crop bbox, destination area
//!      │         │
//!      │         └─► no overlap: Ok(None)
//!      │
//!      ├─► OverviewTable::pick + decimation::factors_for
//!      │
//!      ├─► GranuleLoader::load             decode region, residual resample
//!      │         │
//!      │         └─► Empty: background fill
//!      │
//!      └─► CoverageResult
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use coverage_common::{BoundingBox, GridGeometry};
//! use image_collection::{ImageCollectionFormat, ReadParameter, ReaderConfig};
//!
//! let reader = ImageCollectionFormat
//!     .create_reader(Path::new("/data/scans"), ReaderConfig::from_env())
//!     .expect("not a collection");
//!
//! let grid = GridGeometry::from_envelope(BoundingBox::new(0.0, 0.0, 1000.0, 1000.0), 250, 250)?;
//! let result = reader.read(&[
//!     ReadParameter::GridGeometry(grid),
//!     ReadParameter::Filter("PATH='2024/scan_001.tif'".to_string()),
//! ])?;
//!
//! if let Some(result) = result {
//!     println!("{}x{} from {}", result.block.width(), result.block.height(), result.source_path.display());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod catalog;
pub mod codec;
pub mod config;
pub mod decimation;
pub mod error;
pub mod geometry;
pub mod granule;
pub mod overview;
pub mod params;
pub mod path;
pub mod query;
pub mod raster;
pub mod reader;
pub mod response;

// Re-export commonly used types at crate root
pub use catalog::{
    CatalogEntry, CatalogStats, Clock, CoverageEnvelope, DatasetCatalog, Georeferencing,
    ImageMetadata, ManualClock, SystemClock,
};
pub use codec::{CodecRegistry, DecodeRequest, RasterCodec, RasterInfo, ReadStrategy};
pub use config::{DirectoryConfig, DirectoryConfigBuilder, ReaderConfig};
pub use error::{CoverageError, Result};
pub use geometry::ResolvedGeometry;
pub use granule::{GranuleLoad, GranuleLoader, GranuleRequest, Level};
pub use overview::{OverviewLevel, OverviewPolicy, OverviewTable};
pub use params::ReadParameter;
pub use path::{GranuleSource, PathSelector};
pub use query::Query;
pub use raster::{BandDescriptor, ColorInterpretation, ColorLayout, PixelBlock, SampleBuffer, SampleType};
pub use reader::{ImageCollectionFormat, ImageCollectionReader};
pub use response::{CoverageResult, ResponseAssembler};
