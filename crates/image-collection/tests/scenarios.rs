//! End to end reads against collection directories on disk.

use std::fs::File;
use std::sync::Arc;
use std::time::{Duration as StdDuration, SystemTime};

use chrono::Duration;
use coverage_common::{BoundingBox, Crs, GridGeometry};
use image_collection::{
    Clock, ColorLayout, CoverageError, ImageCollectionReader, ManualClock, OverviewPolicy, Query,
    ReadParameter, ReadStrategy, ReaderConfig,
};
use test_utils::{assert_approx_eq, assert_coords_approx_eq, ramp_value, sizes, CoverageDir};

fn open(dir: &CoverageDir) -> ImageCollectionReader {
    ImageCollectionReader::open(dir.path(), ReaderConfig::default()).unwrap()
}

fn grid(bbox: (f64, f64, f64, f64), width: usize, height: usize) -> GridGeometry {
    GridGeometry::from_envelope(BoundingBox::new(bbox.0, bbox.1, bbox.2, bbox.3), width, height)
        .unwrap()
}

fn large_png() -> CoverageDir {
    let (w, h) = sizes::LARGE;
    CoverageDir::new().with_gray_png("granule.png", w, h)
}

// =============================================================================
// Resolution and overlap
// =============================================================================

#[test]
fn test_full_extent_at_native_resolution() {
    let dir = large_png();
    let reader = open(&dir);

    let query = Query::new().with_grid(grid((0.0, 0.0, 1000.0, 1000.0), 1000, 1000));
    let result = reader.read_query(&query).unwrap().unwrap();

    assert_eq!((result.block.width(), result.block.height()), (1000, 1000));
    assert_eq!(result.envelope(), BoundingBox::new(0.0, 0.0, 1000.0, 1000.0));
    assert_eq!(result.block.sample(999, 3, 0), Some(ramp_value(999, 3) as f64));
    assert_eq!(result.bands.len(), 1);
    assert_eq!(result.source_path, dir.file("granule.png").canonicalize().unwrap());
}

#[test]
fn test_coarse_request_is_decimated() {
    let dir = large_png();
    let reader = open(&dir);

    let query = Query::new().with_grid(grid((0.0, 0.0, 1000.0, 1000.0), 250, 250));
    let result = reader.read_query(&query).unwrap().unwrap();

    assert_eq!((result.block.width(), result.block.height()), (250, 250));
    assert_eq!(result.envelope(), BoundingBox::new(0.0, 0.0, 1000.0, 1000.0));
    // every fourth pixel of the native grid
    assert_eq!(result.block.sample(10, 7, 0), Some(ramp_value(40, 28) as f64));
    assert_approx_eq!(result.grid_to_world.a, 4.0, 1e-9);
    assert_approx_eq!(result.grid_to_world.e, -4.0, 1e-9);
}

#[test]
fn test_very_coarse_request_reads_one_pixel() {
    let dir = large_png();
    let reader = open(&dir);

    // one cell far larger than the whole granule, centred on it
    let half = 5e11;
    let query = Query::new().with_grid(grid((500.0 - half, 500.0 - half, 500.0 + half, 500.0 + half), 1, 1));
    let result = reader.read_query(&query).unwrap().unwrap();

    assert_eq!((result.block.width(), result.block.height()), (1, 1));
    assert_eq!(result.block.sample(0, 0, 0), Some(ramp_value(0, 0) as f64));
    let envelope = result.envelope();
    assert_coords_approx_eq!((envelope.min_x, envelope.min_y), (500.0 - half, 500.0 - half), 1e-3);
    assert_coords_approx_eq!((envelope.max_x, envelope.max_y), (500.0 + half, 500.0 + half), 1e-3);
}

#[test]
fn test_disjoint_request_reads_nothing() {
    let dir = large_png();
    let reader = open(&dir);

    let query = Query::new().with_grid(grid((2000.0, 2000.0, 3000.0, 3000.0), 100, 100));
    assert!(reader.read_query(&query).unwrap().is_none());
}

#[test]
fn test_partial_overlap_is_cropped() {
    let dir = large_png();
    let reader = open(&dir);

    let query = Query::new().with_grid(grid((500.0, 500.0, 1500.0, 1500.0), 100, 100));
    let result = reader.read_query(&query).unwrap().unwrap();

    // lower-left quarter of the request, at 10 world units per pixel
    assert_eq!((result.block.width(), result.block.height()), (50, 50));
    assert_eq!(result.envelope(), BoundingBox::new(500.0, 500.0, 1000.0, 1000.0));
    // world (500, 1000) is granule column 500, row 0
    assert_eq!(result.block.sample(0, 0, 0), Some(ramp_value(500, 0) as f64));
    assert_eq!(result.block.sample(1, 1, 0), Some(ramp_value(510, 10) as f64));
}

#[test]
fn test_read_without_grid_returns_native_raster() {
    let dir = CoverageDir::new().with_rgb_png("rgb.png", 40, 30);
    let reader = open(&dir);

    let result = reader.read(&[]).unwrap().unwrap();
    assert_eq!((result.block.width(), result.block.height()), (40, 30));
    assert!(matches!(result.block.layout(), ColorLayout::Rgb(_)));
    assert_eq!(result.bands.len(), 3);
    assert_eq!(result.envelope(), BoundingBox::new(0.0, 0.0, 40.0, 30.0));
}

// =============================================================================
// Overviews and read strategies
// =============================================================================

fn pyramid() -> CoverageDir {
    CoverageDir::new().with_gray_tiff("pyramid.tif", &[(1000, 1000), (500, 500), (250, 250)])
}

#[test]
fn test_overview_matches_decimated_base() {
    let dir = pyramid();
    let reader = open(&dir);
    let request = grid((0.0, 0.0, 1000.0, 1000.0), 250, 250);

    let from_overview = reader
        .read_query(&Query::new().with_grid(request))
        .unwrap()
        .unwrap();
    let from_base = reader
        .read_query(&Query::new().with_grid(request).with_policy(OverviewPolicy::Ignore))
        .unwrap()
        .unwrap();

    assert_eq!((from_overview.block.width(), from_overview.block.height()), (250, 250));
    assert_eq!(from_overview.block, from_base.block);
    assert_eq!(from_overview.grid_to_world, from_base.grid_to_world);
}

#[test]
fn test_direct_read_matches_whole_image_read() {
    let dir = pyramid();
    let reader = open(&dir);
    let request = grid((100.0, 300.0, 612.0, 812.0), 128, 128);

    let whole = reader
        .read_query(&Query::new().with_grid(request))
        .unwrap()
        .unwrap();
    let direct = reader
        .read(&[
            ReadParameter::GridGeometry(request),
            ReadParameter::UseDirectRead(true),
        ])
        .unwrap()
        .unwrap();

    assert_eq!(whole, direct);
    assert_eq!(
        reader
            .read_query(&Query::new().with_grid(request).with_read_strategy(ReadStrategy::TiledDirectRead))
            .unwrap()
            .unwrap(),
        whole
    );
}

#[test]
fn test_direct_read_of_tiled_granule() {
    let dir = CoverageDir::new().with_tiled_gray_tiff("tiled.tif", 100, 70, 32);
    let reader = open(&dir);
    // crosses every tile column and reaches into the padded edge tiles
    let request = grid((20.0, 0.0, 100.0, 50.0), 80, 50);

    let whole = reader
        .read_query(&Query::new().with_grid(request))
        .unwrap()
        .unwrap();
    let direct = reader
        .read_query(&Query::new().with_grid(request).with_read_strategy(ReadStrategy::TiledDirectRead))
        .unwrap()
        .unwrap();

    assert_eq!(whole, direct);
    assert_eq!((direct.block.width(), direct.block.height()), (80, 50));
    // world (20, 50) is granule column 20, row 20
    assert_eq!(direct.block.sample(0, 0, 0), Some(ramp_value(20, 20) as f64));
    assert_eq!(direct.block.sample(79, 49, 0), Some(ramp_value(99, 69) as f64));
}

// =============================================================================
// Granule selection
// =============================================================================

#[test]
fn test_path_filter_selects_granule() {
    let dir = CoverageDir::new()
        .with_gray_png("a.png", 10, 10)
        .with_gray_png("nested/b.png", 20, 5)
        .with_config("defaultPath=a.png\n");
    let reader = open(&dir);

    let default = reader.read(&[]).unwrap().unwrap();
    assert_eq!(default.block.width(), 10);

    let selected = reader
        .read(&[ReadParameter::Filter("path = 'nested/b.png'".to_string())])
        .unwrap()
        .unwrap();
    assert_eq!((selected.block.width(), selected.block.height()), (20, 5));
}

#[test]
fn test_bad_filter_is_rejected() {
    let dir = large_png();
    let reader = open(&dir);

    let err = reader
        .read(&[ReadParameter::Filter("NAME='granule.png'".to_string())])
        .unwrap_err();
    assert!(matches!(err, CoverageError::InvalidPathFilter(_)));

    let err = reader
        .read(&[ReadParameter::Filter("PATH='../granule.png'".to_string())])
        .unwrap_err();
    assert!(matches!(err, CoverageError::PathTraversalRejected { .. }));
}

#[test]
fn test_missing_granule_is_an_error() {
    let dir = large_png();
    let reader = open(&dir);

    let err = reader
        .read_query(&Query::new().with_path("missing.png"))
        .unwrap_err();
    assert!(matches!(err, CoverageError::SourceInput { .. }));
}

#[test]
fn test_configured_envelope_georeferences_granules() {
    let dir = CoverageDir::new()
        .with_gray_png("a.png", 100, 50)
        .with_config("defaultPath=a.png\nepsgCode=4326\nenvelope=-180,-90 180,90\n");
    let reader = open(&dir);
    assert_eq!(reader.crs(), Crs::epsg(4326));

    let query = Query::new().with_grid(grid((0.0, 0.0, 180.0, 90.0), 50, 25));
    let result = reader.read_query(&query).unwrap().unwrap();
    assert_eq!((result.block.width(), result.block.height()), (50, 25));
    assert_eq!(result.envelope(), BoundingBox::new(0.0, 0.0, 180.0, 90.0));
    // north-east quarter starts at granule column 50, row 0
    assert_eq!(result.block.sample(0, 0, 0), Some(ramp_value(50, 0) as f64));
}

// =============================================================================
// Catalog refresh
// =============================================================================

fn set_mtime(path: &std::path::Path, secs: u64) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::UNIX_EPOCH + StdDuration::from_secs(secs))
        .unwrap();
}

#[test]
fn test_unchanged_granule_is_served_from_cache() {
    let dir = CoverageDir::new().with_gray_png("a.png", 30, 20);
    let path = dir.file("a.png").canonicalize().unwrap();
    let clock = Arc::new(ManualClock::default());
    let reader =
        ImageCollectionReader::open_with_clock(dir.path(), ReaderConfig::default(), clock.clone()).unwrap();

    let first = reader.catalog().get(&path).unwrap();
    clock.advance(Duration::minutes(11));
    let second = reader.catalog().get(&path).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    let stats = reader.catalog_stats();
    assert_eq!((stats.misses, stats.hits, stats.rebuilds), (1, 1, 0));
    assert_eq!(reader.catalog().checked_at(&path), Some(clock.now()));
}

#[test]
fn test_changed_granule_is_rebuilt_after_interval() {
    let dir = CoverageDir::new().with_gray_png("a.png", 30, 20);
    let path = dir.file("a.png").canonicalize().unwrap();
    set_mtime(&path, 1_000);
    let clock = Arc::new(ManualClock::default());
    let reader =
        ImageCollectionReader::open_with_clock(dir.path(), ReaderConfig::default(), clock.clone()).unwrap();
    assert_eq!(reader.catalog().get(&path).unwrap().metadata.width, 30);

    test_utils::write_gray_png(&path, 60, 40);
    set_mtime(&path, 2_000);

    // still inside the check interval
    clock.advance(Duration::minutes(5));
    assert_eq!(reader.catalog().get(&path).unwrap().metadata.width, 30);

    clock.advance(Duration::minutes(6));
    let entry = reader.catalog().get(&path).unwrap();
    assert_eq!((entry.metadata.width, entry.metadata.height), (60, 40));
    assert_eq!(reader.catalog_stats().rebuilds, 1);

    let result = reader.read(&[]).unwrap().unwrap();
    assert_eq!((result.block.width(), result.block.height()), (60, 40));
}
