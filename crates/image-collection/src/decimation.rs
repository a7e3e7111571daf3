//! Integer subsampling factors for reading a level at a coarser
//! resolution.
//!
//! Once an overview level is chosen, the remaining gap between the level's
//! resolution and the requested one is closed by keeping every n-th pixel
//! while decoding. Factors are rounded down so the result is never coarser
//! than requested.

use crate::overview::OverviewLevel;

/// Subsampling factors `(x, y)` for reading `level` at `requested`
/// resolution.
///
/// Both factors are at least 1, and dividing the level dimensions by them
/// never yields zero. Without a requested resolution no decimation happens.
pub fn factors_for(level: &OverviewLevel, requested: Option<(f64, f64)>) -> (usize, usize) {
    let Some((req_x, req_y)) = requested else {
        return (1, 1);
    };

    (
        axis_factor(req_x, level.resolution_x, level.width),
        axis_factor(req_y, level.resolution_y, level.height),
    )
}

/// Subsampling factor along one axis.
///
/// # Arguments
/// * `requested` - Requested resolution in world units per pixel
/// * `level_resolution` - Resolution of the level being read
/// * `level_dim` - Level size along this axis in pixels
pub fn axis_factor(requested: f64, level_resolution: f64, level_dim: usize) -> usize {
    if !requested.is_finite() || !level_resolution.is_finite() || level_resolution <= 0.0 {
        return 1;
    }
    let ratio = (requested / level_resolution).floor();
    if ratio < 1.0 {
        return 1;
    }

    // a factor larger than the level would read nothing
    let factor = ratio.min(usize::MAX as f64) as usize;
    factor.min(level_dim).max(1)
}
