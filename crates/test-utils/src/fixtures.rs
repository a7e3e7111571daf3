//! Raster files and collection directories for tests.
//!
//! Writers panic on failure: they only run inside tests.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use image::{GrayImage, RgbImage};
use tempfile::TempDir;
use tiff::encoder::{colortype, TiffEncoder};

use crate::generators::{ramp_u8, ramp_value, rgb_position};

/// Common raster sizes.
pub mod sizes {
    /// Scenario-sized square granule.
    pub const LARGE: (usize, usize) = (1000, 1000);

    /// Small granule for fast tests.
    pub const SMALL: (usize, usize) = (64, 48);
}

fn create_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent directory");
    }
}

/// Write an 8 bit gray PNG holding [`ramp_u8`].
pub fn write_gray_png(path: &Path, width: usize, height: usize) {
    create_parent(path);
    GrayImage::from_raw(width as u32, height as u32, ramp_u8(width, height))
        .expect("buffer matches dimensions")
        .save(path)
        .expect("write png");
}

/// Write an 8 bit RGB PNG holding [`rgb_position`].
pub fn write_rgb_png(path: &Path, width: usize, height: usize) {
    create_parent(path);
    RgbImage::from_raw(width as u32, height as u32, rgb_position(width, height))
        .expect("buffer matches dimensions")
        .save(path)
        .expect("write png");
}

/// Write a gray TIFF with one page per entry of `pages`.
///
/// Page 0 holds [`ramp_u8`]; every following page holds the ramp sampled
/// at the base pixel its top-left corner covers, i.e. a nearest-neighbor
/// overview of page 0.
pub fn write_gray_tiff(path: &Path, pages: &[(usize, usize)]) {
    create_parent(path);
    let Some(&(base_w, base_h)) = pages.first() else {
        panic!("a TIFF needs at least one page");
    };

    let mut encoder = TiffEncoder::new(File::create(path).expect("create tiff")).expect("tiff encoder");
    for &(w, h) in pages {
        let mut data = Vec::with_capacity(w * h);
        for y in 0..h {
            for x in 0..w {
                data.push(ramp_value(x * base_w / w, y * base_h / h));
            }
        }
        encoder
            .write_image::<colortype::Gray8>(w as u32, h as u32, &data)
            .expect("write tiff page");
    }
}

/// Write an uncompressed, tiled, 8 bit gray TIFF holding [`ramp_u8`].
///
/// The `tiff` encoder only writes strips, so the file is laid out by hand:
/// little-endian header, one IFD, tile offset and byte count arrays, then
/// `tile` x `tile` tiles in row-major order. Tiles on the right and bottom
/// edges are zero padded.
pub fn write_tiled_gray_tiff(path: &Path, width: usize, height: usize, tile: usize) {
    assert!(width > 0 && height > 0 && tile > 0, "empty tiled TIFF");
    create_parent(path);

    let across = width.div_ceil(tile);
    let down = height.div_ceil(tile);
    let count = across * down;
    let tile_bytes = tile * tile;

    const ENTRIES: usize = 11;
    let ifd_len = 2 + ENTRIES * 12 + 4;
    let arrays_at = 8 + ifd_len;
    let offsets_at = arrays_at;
    let counts_at = arrays_at + count * 4;
    let data_at = counts_at + count * 4;

    let mut out = Vec::with_capacity(data_at + count * tile_bytes);
    out.extend_from_slice(b"II");
    out.extend_from_slice(&42u16.to_le_bytes());
    out.extend_from_slice(&8u32.to_le_bytes());

    // (tag, type, count, value); type 3 = SHORT, 4 = LONG
    let array = |at: usize| if count == 1 { None } else { Some(at as u32) };
    let first_offset = data_at as u32;
    let entries: [(u16, u16, u32, u32); ENTRIES] = [
        (256, 4, 1, width as u32),
        (257, 4, 1, height as u32),
        (258, 3, 1, 8),
        (259, 3, 1, 1),
        (262, 3, 1, 1),
        (277, 3, 1, 1),
        (284, 3, 1, 1),
        (322, 4, 1, tile as u32),
        (323, 4, 1, tile as u32),
        (324, 4, count as u32, array(offsets_at).unwrap_or(first_offset)),
        (325, 4, count as u32, array(counts_at).unwrap_or(tile_bytes as u32)),
    ];
    out.extend_from_slice(&(ENTRIES as u16).to_le_bytes());
    for (tag, kind, n, value) in entries {
        out.extend_from_slice(&tag.to_le_bytes());
        out.extend_from_slice(&kind.to_le_bytes());
        out.extend_from_slice(&n.to_le_bytes());
        if kind == 3 {
            out.extend_from_slice(&(value as u16).to_le_bytes());
            out.extend_from_slice(&[0, 0]);
        } else {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
    out.extend_from_slice(&0u32.to_le_bytes());

    if count > 1 {
        for i in 0..count {
            out.extend_from_slice(&((data_at + i * tile_bytes) as u32).to_le_bytes());
        }
        for _ in 0..count {
            out.extend_from_slice(&(tile_bytes as u32).to_le_bytes());
        }
    }

    for ty in 0..down {
        for tx in 0..across {
            for row in 0..tile {
                for col in 0..tile {
                    let (x, y) = (tx * tile + col, ty * tile + row);
                    out.push(if x < width && y < height { ramp_value(x, y) } else { 0 });
                }
            }
        }
    }

    fs::write(path, out).expect("write tiled tiff");
}

/// A throwaway collection directory, removed on drop.
///
/// # Example
///
/// ```
/// use test_utils::CoverageDir;
///
/// let dir = CoverageDir::new()
///     .with_gray_png("a.png", 8, 8)
///     .with_config("coverageName=test\ndefaultPath=a.png\n");
/// assert!(dir.file("a.png").is_file());
/// ```
pub struct CoverageDir {
    dir: TempDir,
}

impl CoverageDir {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Absolute path of `relative` inside the directory.
    pub fn file(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    pub fn with_gray_png(self, relative: &str, width: usize, height: usize) -> Self {
        write_gray_png(&self.file(relative), width, height);
        self
    }

    pub fn with_rgb_png(self, relative: &str, width: usize, height: usize) -> Self {
        write_rgb_png(&self.file(relative), width, height);
        self
    }

    pub fn with_gray_tiff(self, relative: &str, pages: &[(usize, usize)]) -> Self {
        write_gray_tiff(&self.file(relative), pages);
        self
    }

    pub fn with_tiled_gray_tiff(self, relative: &str, width: usize, height: usize, tile: usize) -> Self {
        write_tiled_gray_tiff(&self.file(relative), width, height, tile);
        self
    }

    /// Write `config.properties`.
    pub fn with_config(self, properties: &str) -> Self {
        self.with_file("config.properties", properties.as_bytes())
    }

    pub fn with_file(self, relative: &str, contents: &[u8]) -> Self {
        let path = self.file(relative);
        create_parent(&path);
        fs::write(path, contents).expect("write file");
        self
    }
}

impl Default for CoverageDir {
    fn default() -> Self {
        Self::new()
    }
}
