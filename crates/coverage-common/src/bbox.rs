//! Bounding box types and operations.

use serde::{Deserialize, Serialize};

/// An axis-aligned bounding box in the coordinate units of a coverage CRS.
///
/// Raster-space coverages use pixels as units, projected coverages use
/// meters and geographic coverages use degrees. Requests and coverages are
/// assumed to share the same CRS.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a new bounding box from corner coordinates.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Build the smallest box containing every given point.
    ///
    /// Returns `None` for an empty iterator.
    pub fn from_points(points: impl IntoIterator<Item = (f64, f64)>) -> Option<Self> {
        let mut iter = points.into_iter();
        let (x, y) = iter.next()?;
        let mut bbox = Self::new(x, y, x, y);
        for (x, y) in iter {
            bbox.min_x = bbox.min_x.min(x);
            bbox.min_y = bbox.min_y.min(y);
            bbox.max_x = bbox.max_x.max(x);
            bbox.max_y = bbox.max_y.max(y);
        }
        Some(bbox)
    }

    /// Parse a comma separated `"minx,miny,maxx,maxy"` string.
    pub fn from_csv(s: &str) -> Result<Self, BboxParseError> {
        let parts: Vec<&str> = s.split(',').collect();
        if parts.len() != 4 {
            return Err(BboxParseError::InvalidFormat(s.to_string()));
        }

        Ok(Self {
            min_x: parse_coord(parts[0])?,
            min_y: parse_coord(parts[1])?,
            max_x: parse_coord(parts[2])?,
            max_y: parse_coord(parts[3])?,
        })
    }

    /// Parse an envelope property string: `"minx,miny maxx,maxy"`.
    pub fn from_envelope_string(s: &str) -> Result<Self, BboxParseError> {
        let corners: Vec<&str> = s.split_whitespace().collect();
        if corners.len() != 2 {
            return Err(BboxParseError::InvalidFormat(s.to_string()));
        }

        let lower: Vec<&str> = corners[0].split(',').collect();
        let upper: Vec<&str> = corners[1].split(',').collect();
        if lower.len() != 2 || upper.len() != 2 {
            return Err(BboxParseError::InvalidFormat(s.to_string()));
        }

        let bbox = Self {
            min_x: parse_coord(lower[0])?,
            min_y: parse_coord(lower[1])?,
            max_x: parse_coord(upper[0])?,
            max_y: parse_coord(upper[1])?,
        };
        if bbox.is_empty() {
            return Err(BboxParseError::Degenerate(s.to_string()));
        }
        Ok(bbox)
    }

    /// Format as an envelope property string (`"minx,miny maxx,maxy"`).
    pub fn to_envelope_string(&self) -> String {
        format!(
            "{},{} {},{}",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }

    /// Width of the bounding box in coordinate units.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height of the bounding box in coordinate units.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// True when the box has no area (or is inverted).
    pub fn is_empty(&self) -> bool {
        !(self.width() > 0.0 && self.height() > 0.0)
    }

    /// Check if this bbox intersects another.
    ///
    /// Boxes that only touch along an edge do not intersect.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x < other.max_x
            && self.max_x > other.min_x
            && self.min_y < other.max_y
            && self.max_y > other.min_y
    }

    /// Compute the intersection of two bounding boxes.
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        if !self.intersects(other) {
            return None;
        }

        Some(BoundingBox {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        })
    }

    /// Check if `other` lies entirely inside this box (edges included).
    pub fn contains(&self, other: &BoundingBox) -> bool {
        other.min_x >= self.min_x
            && other.max_x <= self.max_x
            && other.min_y >= self.min_y
            && other.max_y <= self.max_y
    }

    /// Check if a point is contained within this bbox.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// The four corners, counter-clockwise from the lower left.
    pub fn corners(&self) -> [(f64, f64); 4] {
        [
            (self.min_x, self.min_y),
            (self.max_x, self.min_y),
            (self.max_x, self.max_y),
            (self.min_x, self.max_y),
        ]
    }
}

fn parse_coord(s: &str) -> Result<f64, BboxParseError> {
    let value: f64 = s
        .parse()
        .map_err(|_| BboxParseError::InvalidNumber(s.to_string()))?;
    if !value.is_finite() {
        return Err(BboxParseError::InvalidNumber(s.to_string()));
    }
    Ok(value)
}

#[derive(Debug, thiserror::Error)]
pub enum BboxParseError {
    #[error("Invalid bounding box format: {0}")]
    InvalidFormat(String),

    #[error("Invalid number in bounding box: {0}")]
    InvalidNumber(String),

    #[error("Bounding box has no area: {0}")]
    Degenerate(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_csv_bbox() {
        let bbox = BoundingBox::from_csv("-125.0,24.0,-66.0,50.0").unwrap();
        assert_eq!(bbox.min_x, -125.0);
        assert_eq!(bbox.min_y, 24.0);
        assert_eq!(bbox.max_x, -66.0);
        assert_eq!(bbox.max_y, 50.0);
    }

    #[test]
    fn test_parse_envelope_string() {
        let bbox = BoundingBox::from_envelope_string("0,0 1000,500").unwrap();
        assert_eq!(bbox, BoundingBox::new(0.0, 0.0, 1000.0, 500.0));
        assert_eq!(
            BoundingBox::from_envelope_string(&bbox.to_envelope_string()).unwrap(),
            bbox
        );
    }

    #[test]
    fn test_parse_envelope_string_rejects_garbage() {
        assert!(BoundingBox::from_envelope_string("0,0,10,10").is_err());
        assert!(BoundingBox::from_envelope_string("0,0 x,10").is_err());
        assert!(matches!(
            BoundingBox::from_envelope_string("10,10 0,0"),
            Err(BboxParseError::Degenerate(_))
        ));
    }

    #[test]
    fn test_intersection() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 5.0, 15.0, 15.0);
        let c = BoundingBox::new(20.0, 20.0, 30.0, 30.0);

        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));

        let intersection = a.intersection(&b).unwrap();
        assert_eq!(intersection.min_x, 5.0);
        assert_eq!(intersection.min_y, 5.0);
        assert_eq!(intersection.max_x, 10.0);
        assert_eq!(intersection.max_y, 10.0);
        assert!(a.contains(&intersection));
        assert!(b.contains(&intersection));
    }

    #[test]
    fn test_from_points() {
        let bbox = BoundingBox::from_points([(3.0, -1.0), (-2.0, 4.0), (1.0, 1.0)]).unwrap();
        assert_eq!(bbox, BoundingBox::new(-2.0, -1.0, 3.0, 4.0));
        assert!(BoundingBox::from_points(Vec::new()).is_none());
    }
}
