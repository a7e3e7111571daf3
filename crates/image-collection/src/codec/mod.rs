//! Pixel codecs.
//!
//! A codec turns a file on disk into [`PixelBlock`]s. The rest of the
//! crate only sees the [`RasterCodec`] trait: it probes a file once when
//! the catalog builds an entry, then decodes one source region per read.
//!
//! Codecs are looked up through a [`CodecRegistry`], first match wins:
//!
//! | codec | files | overviews | direct region reads |
//! |---|---|---|---|
//! | [`TiffCodec`] | `.tif`, `.tiff` | pages after the first | yes, per tile or strip |
//! | [`ImageCodec`] | anything the `image` crate recognizes | no | no |

mod image_codec;
mod tiff_codec;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use coverage_common::PixelRect;
use serde::{Deserialize, Serialize};

use crate::error::{CoverageError, Result};
use crate::raster::{ColorLayout, PixelBlock, SampleType};

pub use image_codec::ImageCodec;
pub use tiff_codec::TiffCodec;

/// How a codec reads the source region of a granule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadStrategy {
    /// Decode the whole page, then cut the region out of it.
    #[default]
    WholeImageRead,
    /// Decode only the tiles or strips intersecting the region.
    TiledDirectRead,
}

impl ReadStrategy {
    pub fn from_direct_read(direct: bool) -> Self {
        if direct {
            Self::TiledDirectRead
        } else {
            Self::WholeImageRead
        }
    }
}

/// What a codec learned about a file without decoding its pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterInfo {
    /// Page dimensions, native page first, then overviews.
    pub levels: Vec<(usize, usize)>,
    pub layout: ColorLayout,
}

impl RasterInfo {
    pub fn width(&self) -> usize {
        self.levels.first().map_or(0, |(w, _)| *w)
    }

    pub fn height(&self) -> usize {
        self.levels.first().map_or(0, |(_, h)| *h)
    }

    pub fn overview_count(&self) -> usize {
        self.levels.len().saturating_sub(1)
    }
}

/// One decode call: a region of one page, decimated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeRequest {
    /// Page index, 0 is the native resolution page.
    pub level: usize,
    /// Region in page pixels; lies inside the page.
    pub region: PixelRect,
    /// Keep every n-th column and row.
    pub subsampling: (usize, usize),
    pub strategy: ReadStrategy,
}

impl DecodeRequest {
    /// Dimensions of the block the codec returns: `ceil(region / factor)`.
    pub fn output_size(&self) -> (usize, usize) {
        (
            self.region.width.div_ceil(self.subsampling.0.max(1)),
            self.region.height.div_ceil(self.subsampling.1.max(1)),
        )
    }

    /// Reject regions that do not fit in a `width` x `height` page.
    pub(crate) fn check_region(&self, width: usize, height: usize) -> Result<(usize, usize)> {
        let r = &self.region;
        if r.is_empty() || r.x < 0 || r.y < 0 || r.max_x() > width as i64 || r.max_y() > height as i64
        {
            return Err(CoverageError::decode(
                std::path::PathBuf::new(),
                format!(
                    "region {:?} outside of level {} ({}x{})",
                    r, self.level, width, height
                ),
            ));
        }
        Ok((r.x as usize, r.y as usize))
    }
}

/// A pixel codec.
///
/// Implementations open the file inside each call and release it before
/// returning, on success and on error.
pub trait RasterCodec: Send + Sync + fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Whether this codec handles `path`.
    fn can_decode(&self, path: &Path) -> bool;

    /// Read dimensions, overview pages and color layout.
    fn probe(&self, path: &Path) -> Result<RasterInfo>;

    /// Decode one region of one page.
    fn decode(&self, path: &Path, request: &DecodeRequest) -> Result<PixelBlock>;
}

/// Ordered list of codecs.
#[derive(Debug, Clone)]
pub struct CodecRegistry {
    codecs: Vec<Arc<dyn RasterCodec>>,
}

impl CodecRegistry {
    /// A registry with no codecs.
    pub fn empty() -> Self {
        Self { codecs: Vec::new() }
    }

    /// Append a codec; earlier codecs take precedence.
    pub fn with_codec(mut self, codec: Arc<dyn RasterCodec>) -> Self {
        self.codecs.push(codec);
        self
    }

    /// The first codec that accepts `path`.
    pub fn find(&self, path: &Path) -> Option<Arc<dyn RasterCodec>> {
        self.codecs.iter().find(|c| c.can_decode(path)).cloned()
    }

    /// True when some codec accepts `path`.
    pub fn supports(&self, path: &Path) -> bool {
        self.codecs.iter().any(|c| c.can_decode(path))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.codecs.iter().map(|c| c.name()).collect()
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::empty()
            .with_codec(Arc::new(TiffCodec))
            .with_codec(Arc::new(ImageCodec))
    }
}

/// Codec behind the built-in 1x1 image used when a collection has no
/// usable file.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderCodec;

impl PlaceholderCodec {
    pub fn info() -> RasterInfo {
        RasterInfo {
            levels: vec![(1, 1)],
            layout: ColorLayout::Gray(SampleType::U8),
        }
    }
}

impl RasterCodec for PlaceholderCodec {
    fn name(&self) -> &'static str {
        "placeholder"
    }

    fn can_decode(&self, _path: &Path) -> bool {
        false
    }

    fn probe(&self, _path: &Path) -> Result<RasterInfo> {
        Ok(Self::info())
    }

    fn decode(&self, _path: &Path, request: &DecodeRequest) -> Result<PixelBlock> {
        request.check_region(1, 1)?;
        PixelBlock::constant(1, 1, ColorLayout::Gray(SampleType::U8), None)
    }
}
