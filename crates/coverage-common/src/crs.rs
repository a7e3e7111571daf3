//! Coordinate reference system identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// EPSG code used for coverages that live in raster space (pixels as
/// world units, no real-world georeferencing).
pub const RASTER_SPACE_EPSG: u32 = 404000;

/// A coordinate reference system identified by its EPSG code.
///
/// Queries never reproject: a request is interpreted in the coverage CRS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Crs {
    pub epsg: u32,
}

impl Crs {
    pub fn epsg(code: u32) -> Self {
        Self { epsg: code }
    }

    /// Engineering CRS with pixel units.
    pub fn raster_space() -> Self {
        Self::epsg(RASTER_SPACE_EPSG)
    }

    pub fn is_raster_space(&self) -> bool {
        self.epsg == RASTER_SPACE_EPSG
    }

    /// Parse `"EPSG:4326"`, `"epsg:4326"` or a bare `"4326"`.
    pub fn parse(s: &str) -> Result<Self, CrsParseError> {
        let trimmed = s.trim();
        let code = match trimmed.split_once(':') {
            Some((authority, code)) if authority.eq_ignore_ascii_case("EPSG") => code,
            Some(_) => return Err(CrsParseError::UnsupportedAuthority(s.to_string())),
            None => trimmed,
        };

        code.trim()
            .parse()
            .map(Self::epsg)
            .map_err(|_| CrsParseError::InvalidCode(s.to_string()))
    }
}

impl Default for Crs {
    fn default() -> Self {
        Self::raster_space()
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CrsParseError {
    #[error("Unsupported CRS authority: {0}")]
    UnsupportedAuthority(String),

    #[error("Invalid EPSG code: {0}")]
    InvalidCode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_crs() {
        assert_eq!(Crs::parse("EPSG:4326").unwrap(), Crs::epsg(4326));
        assert_eq!(Crs::parse("epsg:3857").unwrap(), Crs::epsg(3857));
        assert_eq!(Crs::parse(" 32633 ").unwrap(), Crs::epsg(32633));
        assert!(matches!(
            Crs::parse("CRS:84"),
            Err(CrsParseError::UnsupportedAuthority(_))
        ));
        assert!(matches!(Crs::parse("EPSG:abc"), Err(CrsParseError::InvalidCode(_))));
    }

    #[test]
    fn test_display_and_default() {
        assert_eq!(Crs::epsg(4326).to_string(), "EPSG:4326");
        assert!(Crs::default().is_raster_space());
    }
}
