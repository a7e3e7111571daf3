//! Turning read results into printable summaries and image files.

use std::path::Path;

use anyhow::{bail, Context, Result};
use coverage_common::{AffineTransform, BoundingBox};
use image::{DynamicImage, ImageBuffer, Luma, LumaA, Rgb, Rgba};
use image_collection::{BandDescriptor, ColorLayout, CoverageResult, ImageCollectionReader, SampleBuffer};
use serde::Serialize;

/// What `info` prints.
#[derive(Debug, Serialize)]
pub struct CollectionSummary {
    pub name: String,
    pub root: String,
    pub crs: String,
    pub envelope: BoundingBox,
    pub grid_range: (usize, usize),
    pub default_path: Option<String>,
    pub expand: bool,
    pub time_between_checks: u64,
}

impl CollectionSummary {
    pub fn of(reader: &ImageCollectionReader) -> Self {
        let config = reader.directory_config();
        let range = reader.original_grid_range();
        Self {
            name: reader.coverage_name().to_string(),
            root: reader.root().display().to_string(),
            crs: reader.crs().to_string(),
            envelope: reader.original_envelope(),
            grid_range: (range.width, range.height),
            default_path: config.default_path.clone(),
            expand: config.expand,
            time_between_checks: config.time_between_checks,
        }
    }
}

/// What `read` prints.
#[derive(Debug, Serialize)]
pub struct ReadSummary {
    pub source: String,
    pub width: usize,
    pub height: usize,
    pub bands: Vec<BandDescriptor>,
    pub envelope: BoundingBox,
    pub grid_to_world: AffineTransform,
}

impl ReadSummary {
    pub fn of(result: &CoverageResult) -> Self {
        Self {
            source: result.source_path.display().to_string(),
            width: result.block.width(),
            height: result.block.height(),
            bands: result.bands.clone(),
            envelope: result.envelope(),
            grid_to_world: result.grid_to_world,
        }
    }
}

/// Save the block of `result` as an image, format from the extension.
///
/// Float samples are clamped to 0..255; palette indices are written as
/// gray.
pub fn save_block(result: &CoverageResult, path: &Path) -> Result<()> {
    let image = to_image(result)?;
    image
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))
}

fn to_image(result: &CoverageResult) -> Result<DynamicImage> {
    let block = &result.block;
    let (w, h) = (block.width() as u32, block.height() as u32);
    let samples = match block.samples() {
        SampleBuffer::U8(data) => data.clone(),
        SampleBuffer::U16(data) => return u16_image(block.layout(), w, h, data.clone()),
        SampleBuffer::F32(data) => data.iter().map(|v| v.round().clamp(0.0, 255.0) as u8).collect(),
    };

    let image = match block.layout() {
        ColorLayout::Gray(_) | ColorLayout::Indexed(_) => {
            ImageBuffer::<Luma<u8>, _>::from_raw(w, h, samples).map(DynamicImage::ImageLuma8)
        }
        ColorLayout::GrayAlpha(_) => {
            ImageBuffer::<LumaA<u8>, _>::from_raw(w, h, samples).map(DynamicImage::ImageLumaA8)
        }
        ColorLayout::Rgb(_) => {
            ImageBuffer::<Rgb<u8>, _>::from_raw(w, h, samples).map(DynamicImage::ImageRgb8)
        }
        ColorLayout::Rgba(_) => {
            ImageBuffer::<Rgba<u8>, _>::from_raw(w, h, samples).map(DynamicImage::ImageRgba8)
        }
        ColorLayout::Unsupported(desc) => bail!("Cannot write {} pixels", desc),
    };
    image.context("Sample buffer does not match block size")
}

fn u16_image(layout: &ColorLayout, w: u32, h: u32, samples: Vec<u16>) -> Result<DynamicImage> {
    let image = match layout {
        ColorLayout::Gray(_) => {
            ImageBuffer::<Luma<u16>, _>::from_raw(w, h, samples).map(DynamicImage::ImageLuma16)
        }
        ColorLayout::GrayAlpha(_) => {
            ImageBuffer::<LumaA<u16>, _>::from_raw(w, h, samples).map(DynamicImage::ImageLumaA16)
        }
        ColorLayout::Rgb(_) => {
            ImageBuffer::<Rgb<u16>, _>::from_raw(w, h, samples).map(DynamicImage::ImageRgb16)
        }
        ColorLayout::Rgba(_) => {
            ImageBuffer::<Rgba<u16>, _>::from_raw(w, h, samples).map(DynamicImage::ImageRgba16)
        }
        other => bail!("Cannot write 16 bit {:?} pixels", other),
    };
    image.context("Sample buffer does not match block size")
}
