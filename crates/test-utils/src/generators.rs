//! Synthetic pixel patterns.
//!
//! Every pattern is a pure function of the pixel position so tests can
//! compute the expected value of any decoded pixel.

/// Value of the 8 bit ramp at `(x, y)`: `(x + y) % 256`.
pub fn ramp_value(x: usize, y: usize) -> u8 {
    ((x + y) % 256) as u8
}

/// Row-major 8 bit ramp, see [`ramp_value`].
///
/// # Example
///
/// ```
/// use test_utils::ramp_u8;
///
/// let ramp = ramp_u8(4, 2);
/// assert_eq!(ramp, vec![0, 1, 2, 3, 1, 2, 3, 4]);
/// ```
pub fn ramp_u8(width: usize, height: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            data.push(ramp_value(x, y));
        }
    }
    data
}

/// Row-major 16 bit values: `x * 100 + y`, saturating.
pub fn position_u16(width: usize, height: usize) -> Vec<u16> {
    let mut data = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            data.push((x * 100 + y).min(u16::MAX as usize) as u16);
        }
    }
    data
}

/// Row-major RGB pixels: red = x, green = y, blue = 200 (all mod 256).
pub fn rgb_position(width: usize, height: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        for x in 0..width {
            data.extend_from_slice(&[(x % 256) as u8, (y % 256) as u8, 200]);
        }
    }
    data
}

/// Row-major buffer with every sample set to `value`.
pub fn constant_u8(width: usize, height: usize, value: u8) -> Vec<u8> {
    vec![value; width * height]
}
