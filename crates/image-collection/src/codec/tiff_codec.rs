//! Multi-page TIFF codec backed by the `tiff` crate.
//!
//! Page 0 is the native raster; every following page is treated as a
//! reduced resolution overview of it. With [`ReadStrategy::TiledDirectRead`]
//! only the tiles (or strips) intersecting the requested region are
//! decoded.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tiff::ColorType;

use super::{DecodeRequest, RasterCodec, RasterInfo, ReadStrategy};
use crate::error::{CoverageError, Result};
use crate::raster::{ColorLayout, PixelBlock, SampleBuffer, SampleType};

/// SampleFormat tag value for IEEE floating point samples.
const SAMPLE_FORMAT_IEEE_FP: u32 = 3;

type TiffDecoder = Decoder<BufReader<File>>;

#[derive(Debug, Clone, Copy, Default)]
pub struct TiffCodec;

impl TiffCodec {
    /// Open `path` positioned on page `level`.
    fn open_page(path: &Path, level: usize) -> Result<TiffDecoder> {
        let file = File::open(path)?;
        let mut decoder = Decoder::new(BufReader::new(file))?.with_limits(Limits::unlimited());
        for page in 0..level {
            if !decoder.more_images() {
                return Err(CoverageError::decode(
                    path,
                    format!("overview {} requested, only {} pages", level, page + 1),
                ));
            }
            decoder.next_image()?;
        }
        Ok(decoder)
    }

    fn decode_page(path: &Path, request: &DecodeRequest) -> Result<PixelBlock> {
        let mut decoder = Self::open_page(path, request.level)?;
        let (width, height) = dimensions(&mut decoder)?;
        let layout = layout_of(&mut decoder)?;
        let (x, y) = request.check_region(width, height)?;

        let (region, origin) = match request.strategy {
            ReadStrategy::WholeImageRead => {
                let samples = to_samples(decoder.read_image()?)?;
                (PixelBlock::new(width, height, layout, samples)?, (x, y))
            }
            ReadStrategy::TiledDirectRead => {
                (read_region_chunks(&mut decoder, width, request, layout)?, (0, 0))
            }
        };

        Ok(region.subsample(
            origin.0,
            origin.1,
            request.region.width,
            request.region.height,
            request.subsampling.0,
            request.subsampling.1,
        ))
    }
}

impl RasterCodec for TiffCodec {
    fn name(&self) -> &'static str {
        "tiff"
    }

    fn can_decode(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("tif") || ext.eq_ignore_ascii_case("tiff"))
    }

    fn probe(&self, path: &Path) -> Result<RasterInfo> {
        let probe = || -> Result<RasterInfo> {
            let mut decoder = Self::open_page(path, 0)?;
            let layout = layout_of(&mut decoder)?;
            let mut levels = vec![dimensions(&mut decoder)?];
            while decoder.more_images() {
                decoder.next_image()?;
                levels.push(dimensions(&mut decoder)?);
            }
            Ok(RasterInfo { levels, layout })
        };
        probe().map_err(|e| e.with_path(path))
    }

    fn decode(&self, path: &Path, request: &DecodeRequest) -> Result<PixelBlock> {
        tracing::debug!(
            path = %path.display(),
            level = request.level,
            region = ?request.region,
            subsampling = ?request.subsampling,
            strategy = ?request.strategy,
            "Decoding TIFF region"
        );
        Self::decode_page(path, request).map_err(|e| e.with_path(path))
    }
}

fn dimensions(decoder: &mut TiffDecoder) -> Result<(usize, usize)> {
    let (width, height) = decoder.dimensions()?;
    Ok((width as usize, height as usize))
}

/// Band layout of the current page.
fn layout_of(decoder: &mut TiffDecoder) -> Result<ColorLayout> {
    let float = decoder
        .get_tag_u32_vec(Tag::SampleFormat)
        .map(|formats| formats.first() == Some(&SAMPLE_FORMAT_IEEE_FP))
        .unwrap_or(false);

    let sample_type = |bits: u8| match (bits, float) {
        (8, false) => Some(SampleType::U8),
        (16, false) => Some(SampleType::U16),
        (32, true) => Some(SampleType::F32),
        _ => None,
    };

    let color = decoder.colortype()?;
    let layout = match color {
        ColorType::Gray(bits) => sample_type(bits).map(ColorLayout::Gray),
        ColorType::GrayA(bits) => sample_type(bits).map(ColorLayout::GrayAlpha),
        ColorType::RGB(bits) => sample_type(bits).map(ColorLayout::Rgb),
        ColorType::RGBA(bits) => sample_type(bits).map(ColorLayout::Rgba),
        ColorType::Palette(8) => Some(ColorLayout::Indexed(read_palette(decoder)?)),
        _ => None,
    };

    Ok(layout.unwrap_or_else(|| ColorLayout::Unsupported(format!("TIFF {:?}", color))))
}

/// Read the ColorMap tag: all reds, then all greens, then all blues, as
/// 16 bit intensities.
fn read_palette(decoder: &mut TiffDecoder) -> Result<Arc<Vec<[u8; 3]>>> {
    let map = decoder.get_tag_u32_vec(Tag::ColorMap)?;
    let entries = map.len() / 3;
    let channel = |c: usize, i: usize| (map[c * entries + i] >> 8) as u8;
    Ok(Arc::new(
        (0..entries)
            .map(|i| [channel(0, i), channel(1, i), channel(2, i)])
            .collect(),
    ))
}

fn to_samples(result: DecodingResult) -> Result<SampleBuffer> {
    match result {
        DecodingResult::U8(v) => Ok(SampleBuffer::U8(v)),
        DecodingResult::U16(v) => Ok(SampleBuffer::U16(v)),
        DecodingResult::F32(v) => Ok(SampleBuffer::F32(v)),
        _ => Err(CoverageError::unsupported_format(
            PathBuf::new(),
            "TIFF sample type other than u8, u16 or f32",
        )),
    }
}

/// Decode the chunks covering `request.region` and assemble them into a
/// block of exactly the region's size.
fn read_region_chunks(
    decoder: &mut TiffDecoder,
    width: usize,
    request: &DecodeRequest,
    layout: ColorLayout,
) -> Result<PixelBlock> {
    let bands = layout.bands().unwrap_or(1);
    let (chunk_w, chunk_h) = decoder.chunk_dimensions();
    let (chunk_w, chunk_h) = (chunk_w.max(1) as usize, chunk_h.max(1) as usize);
    let chunks_across = width.div_ceil(chunk_w);

    let region = request.region;
    let (rx, ry) = (region.x as usize, region.y as usize);
    let (rw, rh) = (region.width, region.height);

    let mut out = PixelBlock::constant(rw, rh, layout.clone(), None)?.into_samples();

    let mut chunks_read = 0;
    for chunk_row in ry / chunk_h..=(ry + rh - 1) / chunk_h {
        for chunk_col in rx / chunk_w..=(rx + rw - 1) / chunk_w {
            let index = (chunk_row * chunks_across + chunk_col) as u32;
            let (data_w, data_h) = decoder.chunk_data_dimensions(index);
            let chunk = to_samples(decoder.read_chunk(index)?)?;

            let (cx, cy) = (chunk_col * chunk_w, chunk_row * chunk_h);
            let x0 = rx.max(cx);
            let y0 = ry.max(cy);
            let x1 = (rx + rw).min(cx + data_w as usize);
            let y1 = (ry + rh).min(cy + data_h as usize);
            if x0 >= x1 || y0 >= y1 {
                continue;
            }

            blit(
                &mut out,
                rw,
                &chunk,
                data_w as usize,
                bands,
                (x0 - cx, y0 - cy),
                (x0 - rx, y0 - ry),
                (x1 - x0, y1 - y0),
            )?;
            chunks_read += 1;
        }
    }

    tracing::debug!(chunks = chunks_read, region = ?region, "Assembled region from chunks");
    PixelBlock::new(rw, rh, layout, out)
}

/// Copy a `size` rectangle from `src` at `from` into `dst` at `to`.
#[allow(clippy::too_many_arguments)]
fn blit(
    dst: &mut SampleBuffer,
    dst_width: usize,
    src: &SampleBuffer,
    src_width: usize,
    bands: usize,
    from: (usize, usize),
    to: (usize, usize),
    size: (usize, usize),
) -> Result<()> {
    #[allow(clippy::too_many_arguments)]
    fn rows<T: Copy>(
        dst: &mut [T],
        dst_width: usize,
        src: &[T],
        src_width: usize,
        bands: usize,
        from: (usize, usize),
        to: (usize, usize),
        size: (usize, usize),
    ) {
        let len = size.0 * bands;
        for row in 0..size.1 {
            let s = ((from.1 + row) * src_width + from.0) * bands;
            let d = ((to.1 + row) * dst_width + to.0) * bands;
            dst[d..d + len].copy_from_slice(&src[s..s + len]);
        }
    }

    match (dst, src) {
        (SampleBuffer::U8(d), SampleBuffer::U8(s)) => {
            rows(d, dst_width, s, src_width, bands, from, to, size)
        }
        (SampleBuffer::U16(d), SampleBuffer::U16(s)) => {
            rows(d, dst_width, s, src_width, bands, from, to, size)
        }
        (SampleBuffer::F32(d), SampleBuffer::F32(s)) => {
            rows(d, dst_width, s, src_width, bands, from, to, size)
        }
        (_, src) => {
            return Err(CoverageError::decode(
                PathBuf::new(),
                format!("chunk holds {} samples", src.sample_type().as_str()),
            ))
        }
    }
    Ok(())
}
