//! In-memory pixel blocks and their band layout.
//!
//! Samples are stored band-interleaved by pixel, row-major, first row at
//! the top. Three sample types cover what the codecs produce: 8 bit and
//! 16 bit unsigned integers and 32 bit floats.

use std::path::PathBuf;
use std::sync::Arc;

use coverage_common::AffineTransform;
use serde::{Deserialize, Serialize};

use crate::error::{CoverageError, Result};

/// Storage type of a single sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleType {
    U8,
    U16,
    F32,
}

impl SampleType {
    pub fn bits(&self) -> u8 {
        match self {
            Self::U8 => 8,
            Self::U16 => 16,
            Self::F32 => 32,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::F32 => "f32",
        }
    }
}

/// RGB palette attached to indexed rasters.
pub type Palette = Arc<Vec<[u8; 3]>>;

/// Band layout of a raster as reported by its codec.
#[derive(Debug, Clone, PartialEq)]
pub enum ColorLayout {
    Gray(SampleType),
    GrayAlpha(SampleType),
    Rgb(SampleType),
    Rgba(SampleType),
    /// 8 bit palette indices.
    Indexed(Palette),
    /// A layout no band interpretation exists for (CMYK, YCbCr, ...).
    Unsupported(String),
}

impl ColorLayout {
    /// Number of bands, `None` for unsupported layouts.
    pub fn bands(&self) -> Option<usize> {
        match self {
            Self::Gray(_) | Self::Indexed(_) => Some(1),
            Self::GrayAlpha(_) => Some(2),
            Self::Rgb(_) => Some(3),
            Self::Rgba(_) => Some(4),
            Self::Unsupported(_) => None,
        }
    }

    pub fn sample_type(&self) -> Option<SampleType> {
        match self {
            Self::Gray(t) | Self::GrayAlpha(t) | Self::Rgb(t) | Self::Rgba(t) => Some(*t),
            Self::Indexed(_) => Some(SampleType::U8),
            Self::Unsupported(_) => None,
        }
    }

    pub fn is_indexed(&self) -> bool {
        matches!(self, Self::Indexed(_))
    }

    /// Layout after palette expansion: indexed rasters become 8 bit RGB.
    pub fn expanded(&self) -> ColorLayout {
        match self {
            Self::Indexed(_) => Self::Rgb(SampleType::U8),
            other => other.clone(),
        }
    }

    /// One descriptor per band.
    ///
    /// Fails with the layout description for unsupported layouts.
    pub fn band_descriptors(&self) -> std::result::Result<Vec<BandDescriptor>, String> {
        use ColorInterpretation::*;

        let (sample_type, interpretations): (SampleType, &[ColorInterpretation]) = match self {
            Self::Gray(t) => (*t, &[Gray]),
            Self::GrayAlpha(t) => (*t, &[Gray, Alpha]),
            Self::Rgb(t) => (*t, &[Red, Green, Blue]),
            Self::Rgba(t) => (*t, &[Red, Green, Blue, Alpha]),
            Self::Indexed(_) => (SampleType::U8, &[PaletteIndex]),
            Self::Unsupported(desc) => return Err(desc.clone()),
        };

        Ok(interpretations
            .iter()
            .map(|&interpretation| BandDescriptor {
                name: interpretation.band_name().to_string(),
                interpretation,
                sample_type,
            })
            .collect())
    }
}

/// Meaning of a band's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorInterpretation {
    Gray,
    Red,
    Green,
    Blue,
    Alpha,
    PaletteIndex,
}

impl ColorInterpretation {
    pub fn band_name(&self) -> &'static str {
        match self {
            Self::Gray => "GRAY_INDEX",
            Self::Red => "RED_BAND",
            Self::Green => "GREEN_BAND",
            Self::Blue => "BLUE_BAND",
            Self::Alpha => "ALPHA_BAND",
            Self::PaletteIndex => "PALETTE_INDEX",
        }
    }
}

/// Description of one band of a coverage result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandDescriptor {
    pub name: String,
    pub interpretation: ColorInterpretation,
    pub sample_type: SampleType,
}

/// Typed sample storage.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleBuffer {
    U8(Vec<u8>),
    U16(Vec<u16>),
    F32(Vec<f32>),
}

impl SampleBuffer {
    pub fn len(&self) -> usize {
        match self {
            Self::U8(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sample_type(&self) -> SampleType {
        match self {
            Self::U8(_) => SampleType::U8,
            Self::U16(_) => SampleType::U16,
            Self::F32(_) => SampleType::F32,
        }
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        match self {
            Self::U8(v) => v.get(index).map(|&s| s as f64),
            Self::U16(v) => v.get(index).map(|&s| s as f64),
            Self::F32(v) => v.get(index).map(|&s| s as f64),
        }
    }

    /// Build an output buffer by copying whole pixels from `self`.
    ///
    /// `sources[i]` is the source pixel for output pixel `i`; `None` takes
    /// the fill pixel.
    fn gather(&self, bands: usize, sources: &[Option<usize>], fill: &[f64]) -> Self {
        match self {
            Self::U8(v) => Self::U8(gather(v, bands, sources, &fill_pixel(fill, bands, cast_u8))),
            Self::U16(v) => {
                Self::U16(gather(v, bands, sources, &fill_pixel(fill, bands, cast_u16)))
            }
            Self::F32(v) => {
                Self::F32(gather(v, bands, sources, &fill_pixel(fill, bands, |s| s as f32)))
            }
        }
    }

    fn constant(sample_type: SampleType, pixels: usize, pixel: &[f64]) -> Self {
        let bands = pixel.len();
        match sample_type {
            SampleType::U8 => Self::U8(fill_pixel(pixel, bands, cast_u8).repeat(pixels)),
            SampleType::U16 => Self::U16(fill_pixel(pixel, bands, cast_u16).repeat(pixels)),
            SampleType::F32 => Self::F32(fill_pixel(pixel, bands, |s| s as f32).repeat(pixels)),
        }
    }
}

fn gather<T: Copy>(src: &[T], bands: usize, sources: &[Option<usize>], fill: &[T]) -> Vec<T> {
    let mut out = Vec::with_capacity(sources.len() * bands);
    for source in sources {
        match source {
            Some(index) => out.extend_from_slice(&src[index * bands..(index + 1) * bands]),
            None => out.extend_from_slice(fill),
        }
    }
    out
}

/// One pixel worth of fill values: extra values ignored, missing ones zero.
fn fill_pixel<T>(values: &[f64], bands: usize, cast: impl Fn(f64) -> T) -> Vec<T> {
    (0..bands)
        .map(|band| cast(values.get(band).copied().unwrap_or(0.0)))
        .collect()
}

fn cast_u8(value: f64) -> u8 {
    if value.is_nan() {
        0
    } else {
        value.round().clamp(0.0, u8::MAX as f64) as u8
    }
}

fn cast_u16(value: f64) -> u16 {
    if value.is_nan() {
        0
    } else {
        value.round().clamp(0.0, u16::MAX as f64) as u16
    }
}

/// Band count and sample type of a supported layout.
fn shape(layout: &ColorLayout) -> Result<(usize, SampleType)> {
    match (layout.bands(), layout.sample_type()) {
        (Some(bands), Some(sample_type)) => Ok((bands, sample_type)),
        _ => Err(CoverageError::unsupported_format(
            PathBuf::new(),
            format!("no band layout for {:?}", layout),
        )),
    }
}

/// A decoded rectangular block of pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBlock {
    width: usize,
    height: usize,
    layout: ColorLayout,
    samples: SampleBuffer,
}

impl PixelBlock {
    /// Wrap decoded samples, checking them against the layout.
    pub fn new(
        width: usize,
        height: usize,
        layout: ColorLayout,
        samples: SampleBuffer,
    ) -> Result<Self> {
        let (bands, sample_type) = shape(&layout)?;

        if samples.sample_type() != sample_type {
            return Err(CoverageError::decode(
                PathBuf::new(),
                format!(
                    "sample type {} does not match layout {:?}",
                    samples.sample_type().as_str(),
                    layout
                ),
            ));
        }
        if samples.len() != width * height * bands {
            return Err(CoverageError::decode(
                PathBuf::new(),
                format!(
                    "expected {} samples for {}x{}x{}, got {}",
                    width * height * bands,
                    width,
                    height,
                    bands,
                    samples.len()
                ),
            ));
        }

        Ok(Self {
            width,
            height,
            layout,
            samples,
        })
    }

    /// A block where every pixel holds `background`.
    ///
    /// Values beyond the band count are ignored and missing values are
    /// zero; no background at all means zero fill.
    pub fn constant(
        width: usize,
        height: usize,
        layout: ColorLayout,
        background: Option<&[f64]>,
    ) -> Result<Self> {
        let (bands, sample_type) = shape(&layout)?;

        let pixel: Vec<f64> = (0..bands)
            .map(|band| background.and_then(|b| b.get(band)).copied().unwrap_or(0.0))
            .collect();

        Ok(Self {
            width,
            height,
            samples: SampleBuffer::constant(sample_type, width * height, &pixel),
            layout,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn bands(&self) -> usize {
        self.layout.bands().unwrap_or(0)
    }

    pub fn layout(&self) -> &ColorLayout {
        &self.layout
    }

    pub fn samples(&self) -> &SampleBuffer {
        &self.samples
    }

    pub fn into_samples(self) -> SampleBuffer {
        self.samples
    }

    /// Value of one sample, `None` when out of range.
    pub fn sample(&self, x: usize, y: usize, band: usize) -> Option<f64> {
        let bands = self.bands();
        if x >= self.width || y >= self.height || band >= bands {
            return None;
        }
        self.samples.get((y * self.width + x) * bands + band)
    }

    /// Copy `region` keeping every `step_x`-th column and `step_y`-th row.
    ///
    /// Output dimensions are `ceil(region / step)` per axis. The region must
    /// lie inside the block.
    pub fn subsample(
        &self,
        x: usize,
        y: usize,
        width: usize,
        height: usize,
        step_x: usize,
        step_y: usize,
    ) -> Self {
        let step_x = step_x.max(1);
        let step_y = step_y.max(1);
        let out_w = width.div_ceil(step_x);
        let out_h = height.div_ceil(step_y);

        let mut sources = Vec::with_capacity(out_w * out_h);
        for row in 0..out_h {
            let src_row = y + row * step_y;
            for col in 0..out_w {
                sources.push(Some(src_row * self.width + x + col * step_x));
            }
        }

        Self {
            width: out_w,
            height: out_h,
            layout: self.layout.clone(),
            samples: self.samples.gather(self.bands(), &sources, &[]),
        }
    }

    /// Nearest-neighbor resample into a `width` x `height` block.
    ///
    /// `output_to_source` maps output pixel coordinates to source pixel
    /// coordinates; each output pixel takes the source pixel containing the
    /// image of its center. Pixels landing outside the source take
    /// `background` (zero when absent).
    pub fn resample_nearest(
        &self,
        width: usize,
        height: usize,
        output_to_source: &AffineTransform,
        background: Option<&[f64]>,
    ) -> Self {
        let mut sources = Vec::with_capacity(width * height);
        for row in 0..height {
            for col in 0..width {
                let (sx, sy) = output_to_source.apply(col as f64 + 0.5, row as f64 + 0.5);
                let (sx, sy) = (sx.floor(), sy.floor());
                let inside = sx >= 0.0
                    && sy >= 0.0
                    && sx < self.width as f64
                    && sy < self.height as f64;
                sources.push(inside.then(|| sy as usize * self.width + sx as usize));
            }
        }

        Self {
            width,
            height,
            layout: self.layout.clone(),
            samples: self
                .samples
                .gather(self.bands(), &sources, background.unwrap_or(&[])),
        }
    }

    /// Replace palette indices with their RGB colors.
    ///
    /// Non-indexed blocks are returned unchanged. Indices past the end of
    /// the palette map to black.
    pub fn expand_palette(self) -> Self {
        let (ColorLayout::Indexed(palette), SampleBuffer::U8(indices)) =
            (&self.layout, &self.samples)
        else {
            return self;
        };

        let mut rgb = Vec::with_capacity(indices.len() * 3);
        for &index in indices {
            rgb.extend_from_slice(&palette.get(index as usize).copied().unwrap_or([0, 0, 0]));
        }

        Self {
            width: self.width,
            height: self.height,
            layout: ColorLayout::Rgb(SampleType::U8),
            samples: SampleBuffer::U8(rgb),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_ramp(width: usize, height: usize) -> PixelBlock {
        let data: Vec<u8> = (0..width * height).map(|i| i as u8).collect();
        PixelBlock::new(width, height, ColorLayout::Gray(SampleType::U8), SampleBuffer::U8(data))
            .unwrap()
    }

    #[test]
    fn test_new_rejects_wrong_length() {
        let result = PixelBlock::new(
            2,
            2,
            ColorLayout::Rgb(SampleType::U8),
            SampleBuffer::U8(vec![0; 4]),
        );
        assert!(matches!(result, Err(CoverageError::Decode { .. })));
    }

    #[test]
    fn test_new_rejects_unsupported_layout() {
        let result = PixelBlock::new(
            1,
            1,
            ColorLayout::Unsupported("CMYK".into()),
            SampleBuffer::U8(vec![0; 4]),
        );
        assert!(matches!(result, Err(CoverageError::UnsupportedSampleFormat { .. })));
    }

    #[test]
    fn test_constant_fill_uses_background_per_band() {
        let block =
            PixelBlock::constant(3, 2, ColorLayout::Rgb(SampleType::U8), Some(&[10.0, 300.0]))
                .unwrap();
        assert_eq!(block.samples().len(), 18);
        assert_eq!(block.sample(2, 1, 0), Some(10.0));
        // clamped to the sample range
        assert_eq!(block.sample(2, 1, 1), Some(255.0));
        // missing values are zero
        assert_eq!(block.sample(2, 1, 2), Some(0.0));
    }

    #[test]
    fn test_constant_fill_without_background_is_zero() {
        let block = PixelBlock::constant(2, 2, ColorLayout::Gray(SampleType::F32), None).unwrap();
        assert_eq!(block.samples(), &SampleBuffer::F32(vec![0.0; 4]));
    }

    #[test]
    fn test_subsample_rounds_up() {
        let block = gray_ramp(5, 5);
        let sub = block.subsample(0, 0, 5, 5, 2, 2);
        assert_eq!((sub.width(), sub.height()), (3, 3));
        assert_eq!(sub.samples(), &SampleBuffer::U8(vec![0, 2, 4, 10, 12, 14, 20, 22, 24]));

        let region = block.subsample(1, 2, 3, 2, 1, 1);
        assert_eq!(region.samples(), &SampleBuffer::U8(vec![11, 12, 13, 16, 17, 18]));
    }

    #[test]
    fn test_resample_identity_copies_pixels() {
        let block = gray_ramp(4, 3);
        let out = block.resample_nearest(4, 3, &AffineTransform::identity(), None);
        assert_eq!(out, block);
    }

    #[test]
    fn test_resample_fills_outside_with_background() {
        let block = gray_ramp(2, 2);
        // output pixel (i, j) samples source pixel (i - 1, j)
        let shift = AffineTransform::translation(-1.0, 0.0);
        let out = block.resample_nearest(3, 2, &shift, Some(&[99.0]));
        assert_eq!(out.samples(), &SampleBuffer::U8(vec![99, 0, 1, 99, 2, 3]));
    }

    #[test]
    fn test_resample_upscales_by_two() {
        let block = gray_ramp(2, 1);
        let half = AffineTransform::scale(0.5, 0.5);
        let out = block.resample_nearest(4, 2, &half, None);
        assert_eq!(out.samples(), &SampleBuffer::U8(vec![0, 0, 1, 1, 0, 0, 1, 1]));
    }

    #[test]
    fn test_expand_palette() {
        let palette: Palette = Arc::new(vec![[255, 0, 0], [0, 0, 255]]);
        let block = PixelBlock::new(
            3,
            1,
            ColorLayout::Indexed(palette),
            SampleBuffer::U8(vec![1, 0, 7]),
        )
        .unwrap();

        let rgb = block.expand_palette();
        assert_eq!(rgb.layout(), &ColorLayout::Rgb(SampleType::U8));
        assert_eq!(
            rgb.samples(),
            &SampleBuffer::U8(vec![0, 0, 255, 255, 0, 0, 0, 0, 0])
        );
    }

    #[test]
    fn test_band_descriptors() {
        let bands = ColorLayout::Rgba(SampleType::U16).band_descriptors().unwrap();
        let names: Vec<_> = bands.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, ["RED_BAND", "GREEN_BAND", "BLUE_BAND", "ALPHA_BAND"]);
        assert!(bands.iter().all(|b| b.sample_type == SampleType::U16));

        assert!(ColorLayout::Unsupported("YCbCr".into()).band_descriptors().is_err());
    }
}
