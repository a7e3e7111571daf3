//! Codec backed by the `image` crate.
//!
//! Handles PNG, JPEG, GIF, BMP and single page TIFF. These formats carry
//! no overviews, so every read decodes the whole image and cuts the
//! requested region out of it regardless of the read strategy.

use std::path::Path;

use image::codecs::{bmp::BmpDecoder, gif::GifDecoder, jpeg::JpegDecoder, png::PngDecoder};
use image::io::Reader as ImageReader;
use image::{ColorType, DynamicImage, ImageDecoder, ImageFormat};

use super::{DecodeRequest, RasterCodec, RasterInfo};
use crate::error::{CoverageError, Result};
use crate::raster::{ColorLayout, PixelBlock, SampleBuffer, SampleType};

#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCodec;

impl ImageCodec {
    fn open(path: &Path) -> Result<DynamicImage> {
        image::open(path).map_err(|e| CoverageError::from(e).with_path(path))
    }

    /// Dimensions and color type from the file header, without decoding
    /// pixels. Formats without a header decoder here are fully decoded.
    fn read_header(path: &Path) -> Result<((u32, u32), ColorType)> {
        let reader = ImageReader::open(path)?.with_guessed_format()?;
        let format = reader.format();
        let input = reader.into_inner();

        match format {
            Some(ImageFormat::Png) => Ok(header(PngDecoder::new(input)?)),
            Some(ImageFormat::Jpeg) => Ok(header(JpegDecoder::new(input)?)),
            Some(ImageFormat::Gif) => Ok(header(GifDecoder::new(input)?)),
            Some(ImageFormat::Bmp) => Ok(header(BmpDecoder::new(input)?)),
            _ => {
                let image = Self::open(path)?;
                Ok(((image.width(), image.height()), image.color()))
            }
        }
    }
}

fn header<'a, D: ImageDecoder<'a>>(decoder: D) -> ((u32, u32), ColorType) {
    (decoder.dimensions(), decoder.color_type())
}

impl RasterCodec for ImageCodec {
    fn name(&self) -> &'static str {
        "image"
    }

    fn can_decode(&self, path: &Path) -> bool {
        ImageFormat::from_path(path).is_ok()
    }

    fn probe(&self, path: &Path) -> Result<RasterInfo> {
        let ((width, height), color) = Self::read_header(path).map_err(|e| e.with_path(path))?;
        Ok(RasterInfo {
            levels: vec![(width as usize, height as usize)],
            layout: layout_of(color),
        })
    }

    fn decode(&self, path: &Path, request: &DecodeRequest) -> Result<PixelBlock> {
        if request.level != 0 {
            return Err(CoverageError::decode(
                path,
                format!("no overview {} in single page image", request.level),
            ));
        }

        let image = Self::open(path)?;
        let (width, height) = (image.width() as usize, image.height() as usize);
        let (x, y) = request.check_region(width, height).map_err(|e| e.with_path(path))?;

        tracing::debug!(
            path = %path.display(),
            region = ?request.region,
            subsampling = ?request.subsampling,
            "Decoding image region"
        );

        let block = to_pixel_block(image).map_err(|e| e.with_path(path))?;
        Ok(block.subsample(
            x,
            y,
            request.region.width,
            request.region.height,
            request.subsampling.0,
            request.subsampling.1,
        ))
    }
}

/// Map an `image` color type onto a band layout.
fn layout_of(color: ColorType) -> ColorLayout {
    match color {
        ColorType::L8 => ColorLayout::Gray(SampleType::U8),
        ColorType::La8 => ColorLayout::GrayAlpha(SampleType::U8),
        ColorType::Rgb8 => ColorLayout::Rgb(SampleType::U8),
        ColorType::Rgba8 => ColorLayout::Rgba(SampleType::U8),
        ColorType::L16 => ColorLayout::Gray(SampleType::U16),
        ColorType::La16 => ColorLayout::GrayAlpha(SampleType::U16),
        ColorType::Rgb16 => ColorLayout::Rgb(SampleType::U16),
        ColorType::Rgba16 => ColorLayout::Rgba(SampleType::U16),
        ColorType::Rgb32F => ColorLayout::Rgb(SampleType::F32),
        ColorType::Rgba32F => ColorLayout::Rgba(SampleType::F32),
        other => ColorLayout::Unsupported(format!("{:?}", other)),
    }
}

fn to_pixel_block(image: DynamicImage) -> Result<PixelBlock> {
    let (width, height) = (image.width() as usize, image.height() as usize);
    let layout = layout_of(image.color());

    let samples = match &layout {
        ColorLayout::Gray(SampleType::U8) => SampleBuffer::U8(image.into_luma8().into_raw()),
        ColorLayout::GrayAlpha(SampleType::U8) => {
            SampleBuffer::U8(image.into_luma_alpha8().into_raw())
        }
        ColorLayout::Rgb(SampleType::U8) => SampleBuffer::U8(image.into_rgb8().into_raw()),
        ColorLayout::Rgba(SampleType::U8) => SampleBuffer::U8(image.into_rgba8().into_raw()),
        ColorLayout::Gray(SampleType::U16) => SampleBuffer::U16(image.into_luma16().into_raw()),
        ColorLayout::GrayAlpha(SampleType::U16) => {
            SampleBuffer::U16(image.into_luma_alpha16().into_raw())
        }
        ColorLayout::Rgb(SampleType::U16) => SampleBuffer::U16(image.into_rgb16().into_raw()),
        ColorLayout::Rgba(SampleType::U16) => SampleBuffer::U16(image.into_rgba16().into_raw()),
        ColorLayout::Rgb(SampleType::F32) => SampleBuffer::F32(image.into_rgb32f().into_raw()),
        ColorLayout::Rgba(SampleType::F32) => SampleBuffer::F32(image.into_rgba32f().into_raw()),
        other => {
            return Err(CoverageError::unsupported_format(
                std::path::PathBuf::new(),
                format!("{:?}", other),
            ))
        }
    };

    PixelBlock::new(width, height, layout, samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ReadStrategy;
    use coverage_common::PixelRect;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    #[test]
    fn test_probe_and_decode_gray_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ramp.png");
        GrayImage::from_fn(8, 4, |x, y| Luma([(y * 8 + x) as u8]))
            .save(&path)
            .unwrap();

        let info = ImageCodec.probe(&path).unwrap();
        assert_eq!(info.levels, vec![(8, 4)]);
        assert_eq!(info.layout, ColorLayout::Gray(SampleType::U8));
        assert_eq!(info.overview_count(), 0);

        let request = DecodeRequest {
            level: 0,
            region: PixelRect::new(2, 1, 6, 3),
            subsampling: (2, 2),
            strategy: ReadStrategy::TiledDirectRead,
        };
        let block = ImageCodec.decode(&path, &request).unwrap();
        assert_eq!((block.width(), block.height()), request.output_size());
        assert_eq!(block.samples(), &SampleBuffer::U8(vec![10, 12, 14, 26, 28, 30]));
    }

    #[test]
    fn test_decode_rgb_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rgb.png");
        RgbImage::from_pixel(3, 3, Rgb([1, 2, 3])).save(&path).unwrap();

        let request = DecodeRequest {
            level: 0,
            region: PixelRect::sized(3, 3),
            subsampling: (1, 1),
            strategy: ReadStrategy::WholeImageRead,
        };
        let block = ImageCodec.decode(&path, &request).unwrap();
        assert_eq!(block.bands(), 3);
        assert_eq!(block.sample(2, 2, 2), Some(3.0));
    }

    #[test]
    fn test_decode_rejects_overview_level() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.png");
        GrayImage::new(2, 2).save(&path).unwrap();

        let request = DecodeRequest {
            level: 1,
            region: PixelRect::sized(1, 1),
            subsampling: (1, 1),
            strategy: ReadStrategy::WholeImageRead,
        };
        assert!(matches!(
            ImageCodec.decode(&path, &request),
            Err(CoverageError::Decode { .. })
        ));
    }

    #[test]
    fn test_info_reads_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut.png");
        GrayImage::from_fn(64, 64, |x, y| Luma([(x ^ y) as u8]))
            .save(&path)
            .unwrap();

        // keep the header chunks, drop most of the pixel data
        let bytes = std::fs::read(&path).unwrap();
        let idat = bytes.windows(4).position(|w| w == b"IDAT").unwrap();
        std::fs::write(&path, &bytes[..idat + 8]).unwrap();

        let info = ImageCodec.probe(&path).unwrap();
        assert_eq!(info.levels, vec![(64, 64)]);
        assert_eq!(info.layout, ColorLayout::Gray(SampleType::U8));

        let request = DecodeRequest {
            level: 0,
            region: PixelRect::sized(64, 64),
            subsampling: (1, 1),
            strategy: ReadStrategy::WholeImageRead,
        };
        assert!(ImageCodec.decode(&path, &request).is_err());
    }

    #[test]
    fn test_probe_corrupt_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not a png").unwrap();
        let err = ImageCodec.probe(&path).unwrap_err();
        assert!(matches!(err, CoverageError::Decode { path: p, .. } if p == path));
    }
}
