//! Read queries.
//!
//! A [`Query`] is built per read, either through the builder methods or
//! from a list of [`ReadParameter`]s, and discarded once the result is
//! assembled.
//!
//! # Examples
//!
//! ```rust
//! use coverage_common::{BoundingBox, GridGeometry};
//! use image_collection::{OverviewPolicy, Query};
//!
//! let grid = GridGeometry::from_envelope(BoundingBox::new(0.0, 0.0, 512.0, 512.0), 128, 128)?;
//! let query = Query::new()
//!     .with_grid(grid)
//!     .with_policy(OverviewPolicy::Quality)
//!     .with_path("scans/a.tif")
//!     .with_background(vec![255.0]);
//! # Ok::<(), coverage_common::GeometryError>(())
//! ```

use coverage_common::GridGeometry;
use serde::{Deserialize, Serialize};

use crate::codec::ReadStrategy;
use crate::error::Result;
use crate::overview::OverviewPolicy;
use crate::params::{parse_tile_size, ReadParameter};
use crate::path::PathSelector;

/// Everything a single read asks for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Requested grid. `None` reads the granule's native grid.
    pub grid: Option<GridGeometry>,
    pub overview_policy: OverviewPolicy,
    pub tile_hint: Option<(usize, usize)>,
    pub background: Option<Vec<f64>>,
    pub path: Option<PathSelector>,
    /// `None` keeps the reader's configured strategy.
    pub read_strategy: Option<ReadStrategy>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a query from read parameters. Later parameters override
    /// earlier ones.
    ///
    /// Fails only on a filter that is not a path equality.
    pub fn from_parameters(params: &[ReadParameter]) -> Result<Self> {
        let mut query = Self::new();
        for param in params {
            query = match param {
                ReadParameter::GridGeometry(grid) => query.with_grid(*grid),
                ReadParameter::OverviewPolicy(policy) => query.with_policy(*policy),
                ReadParameter::SuggestedTileSize(raw) => Self {
                    tile_hint: parse_tile_size(raw).or(query.tile_hint),
                    ..query
                },
                ReadParameter::BackgroundValues(values) => query.with_background(values.clone()),
                ReadParameter::Filter(filter) => Self {
                    path: Some(PathSelector::parse(filter)?),
                    ..query
                },
                ReadParameter::UseDirectRead(direct) => {
                    query.with_read_strategy(ReadStrategy::from_direct_read(*direct))
                }
            };
        }
        Ok(query)
    }

    pub fn with_grid(mut self, grid: GridGeometry) -> Self {
        self.grid = Some(grid);
        self
    }

    pub fn with_policy(mut self, policy: OverviewPolicy) -> Self {
        self.overview_policy = policy;
        self
    }

    pub fn with_tile_hint(mut self, width: usize, height: usize) -> Self {
        self.tile_hint = Some((width, height));
        self
    }

    pub fn with_background(mut self, values: Vec<f64>) -> Self {
        self.background = Some(values);
        self
    }

    pub fn with_path(mut self, relative: impl Into<String>) -> Self {
        self.path = Some(PathSelector::new(relative));
        self
    }

    pub fn with_read_strategy(mut self, strategy: ReadStrategy) -> Self {
        self.read_strategy = Some(strategy);
        self
    }
}
