//! Named read parameters accepted by
//! [`ImageCollectionReader::read`](crate::ImageCollectionReader::read).

use coverage_common::GridGeometry;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::overview::OverviewPolicy;

/// One named read parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "value", rename_all = "snake_case")]
pub enum ReadParameter {
    /// Requested bounding box, raster size and grid-to-world.
    GridGeometry(GridGeometry),
    OverviewPolicy(OverviewPolicy),
    /// Raw `"W,H"` tile size; malformed values are ignored.
    SuggestedTileSize(String),
    /// Fill values used where no pixels could be read, one per band.
    BackgroundValues(Vec<f64>),
    /// Granule filter; only `PATH = '<relative path>'` is understood.
    Filter(String),
    /// Decode only the tiles intersecting the request.
    UseDirectRead(bool),
}

impl ReadParameter {
    pub fn name(&self) -> &'static str {
        match self {
            Self::GridGeometry(_) => "grid_geometry",
            Self::OverviewPolicy(_) => "overview_policy",
            Self::SuggestedTileSize(_) => "suggested_tile_size",
            Self::BackgroundValues(_) => "background_values",
            Self::Filter(_) => "filter",
            Self::UseDirectRead(_) => "use_direct_read",
        }
    }
}

/// Parse a `"W,H"` tile size.
///
/// Anything else, including zero sizes, logs a warning and yields `None`.
pub fn parse_tile_size(value: &str) -> Option<(usize, usize)> {
    let parsed = value.split_once(',').and_then(|(w, h)| {
        let w: usize = w.trim().parse().ok()?;
        let h: usize = h.trim().parse().ok()?;
        (w > 0 && h > 0).then_some((w, h))
    });

    if parsed.is_none() {
        warn!(value, "Ignoring malformed suggested tile size");
    }
    parsed
}
