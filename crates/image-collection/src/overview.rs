//! Overview level table and selection policy.
//!
//! A granule's pages form a resolution pyramid: level 0 is the native
//! raster, every following page is coarser. Given a requested resolution
//! the selector picks the page to decode; decimation then covers the rest
//! of the reduction (see [`crate::decimation`]).

use coverage_common::BoundingBox;
use serde::{Deserialize, Serialize};

/// Which overview to prefer when the requested resolution falls between
/// two levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverviewPolicy {
    /// Always read the native level.
    Ignore,
    /// The level whose scale factor is numerically closest.
    #[default]
    Nearest,
    /// The finer of the two bracketing levels.
    Quality,
    /// The coarser of the two bracketing levels.
    Speed,
}

impl OverviewPolicy {
    /// Parse from string (case-insensitive), `None` if unknown.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "ignore" => Some(Self::Ignore),
            "nearest" => Some(Self::Nearest),
            "quality" => Some(Self::Quality),
            "speed" => Some(Self::Speed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ignore => "ignore",
            Self::Nearest => "nearest",
            Self::Quality => "quality",
            Self::Speed => "speed",
        }
    }
}

impl std::fmt::Display for OverviewPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One page of a granule's resolution pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverviewLevel {
    /// Page index in the file (0 = native).
    pub index: usize,
    /// X resolution relative to level 0.
    pub scale_factor: f64,
    pub resolution_x: f64,
    pub resolution_y: f64,
    pub width: usize,
    pub height: usize,
}

impl OverviewLevel {
    pub fn resolution(&self) -> (f64, f64) {
        (self.resolution_x, self.resolution_y)
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }
}

/// Overview levels of one granule, sorted ascending by scale factor.
///
/// Level 0 is always present with a scale factor of exactly 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverviewTable {
    levels: Vec<OverviewLevel>,
}

impl OverviewTable {
    /// Build the table for a granule covering `envelope`.
    ///
    /// `base` is the native page size and `overviews` the sizes of the
    /// following pages; every page covers the whole envelope. Pages with a
    /// zero dimension are skipped.
    pub fn from_pages(
        envelope: &BoundingBox,
        base: (usize, usize),
        overviews: &[(usize, usize)],
    ) -> Self {
        let resolution = |(w, h): (usize, usize)| {
            (envelope.width() / w as f64, envelope.height() / h as f64)
        };
        let (base_x, base_y) = resolution(base);

        let mut levels = vec![OverviewLevel {
            index: 0,
            scale_factor: 1.0,
            resolution_x: base_x,
            resolution_y: base_y,
            width: base.0,
            height: base.1,
        }];

        for (i, &(w, h)) in overviews.iter().enumerate() {
            if w == 0 || h == 0 {
                continue;
            }
            let (res_x, res_y) = resolution((w, h));
            levels.push(OverviewLevel {
                index: i + 1,
                scale_factor: res_x / base_x,
                resolution_x: res_x,
                resolution_y: res_y,
                width: w,
                height: h,
            });
        }

        // stable, so equal factors keep page order and level 0 stays first
        levels[1..].sort_by(|a, b| a.scale_factor.total_cmp(&b.scale_factor));
        Self { levels }
    }

    pub fn levels(&self) -> &[OverviewLevel] {
        &self.levels
    }

    /// The native level.
    pub fn base(&self) -> &OverviewLevel {
        &self.levels[0]
    }

    /// Level by page index.
    pub fn level(&self, index: usize) -> Option<&OverviewLevel> {
        self.levels.iter().find(|l| l.index == index)
    }

    /// Number of overviews, native level excluded.
    pub fn overview_count(&self) -> usize {
        self.levels.len() - 1
    }

    /// Pick the page to read for `requested` resolution.
    ///
    /// The least reduced axis drives the choice so the axis needing the
    /// most detail never ends up coarser than requested by more than the
    /// policy allows.
    pub fn pick(&self, requested: (f64, f64), policy: OverviewPolicy) -> usize {
        let base = self.base();
        if policy == OverviewPolicy::Ignore || self.overview_count() == 0 {
            return base.index;
        }

        let factor_x = requested.0 / base.resolution_x;
        let factor_y = requested.1 / base.resolution_y;
        let requested_factor = if factor_x <= factor_y { factor_x } else { factor_y };

        // never pick a coarser level for a finer request
        if requested_factor <= 1.0 || requested_factor.is_nan() {
            return base.index;
        }

        let coarsest = &self.levels[self.levels.len() - 1];
        if requested_factor >= coarsest.scale_factor {
            return coarsest.index;
        }

        let mut prev = base;
        for (i, curr) in self.levels.iter().enumerate().skip(1) {
            if curr.scale_factor == requested_factor {
                return curr.index;
            }

            // the last level also closes the bracket when the request's aspect
            // ratio differs from the overviews'
            if curr.scale_factor > requested_factor || i == self.levels.len() - 1 {
                return match policy {
                    OverviewPolicy::Quality => prev.index,
                    OverviewPolicy::Speed => curr.index,
                    _ => {
                        if requested_factor - prev.scale_factor
                            < curr.scale_factor - requested_factor
                        {
                            prev.index
                        } else {
                            curr.index
                        }
                    }
                };
            }
            prev = curr;
        }

        base.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 1024x1024 over 0..1024 with 2x, 4x and 8x overviews.
    fn pyramid() -> OverviewTable {
        OverviewTable::from_pages(
            &BoundingBox::new(0.0, 0.0, 1024.0, 1024.0),
            (1024, 1024),
            &[(512, 512), (256, 256), (128, 128)],
        )
    }

    #[test]
    fn test_table_is_sorted_with_base_first() {
        let table = OverviewTable::from_pages(
            &BoundingBox::new(0.0, 0.0, 100.0, 100.0),
            (100, 100),
            &[(25, 25), (50, 50)],
        );
        let order: Vec<_> = table.levels().iter().map(|l| l.index).collect();
        assert_eq!(order, vec![0, 2, 1]);
        assert_eq!(table.base().scale_factor, 1.0);
        assert_eq!(table.level(1).unwrap().scale_factor, 4.0);
        assert_eq!(table.overview_count(), 2);
    }

    #[test]
    fn test_finer_than_native_picks_base() {
        let table = pyramid();
        for policy in [
            OverviewPolicy::Nearest,
            OverviewPolicy::Quality,
            OverviewPolicy::Speed,
        ] {
            assert_eq!(table.pick((0.25, 0.25), policy), 0);
            assert_eq!(table.pick((1.0, 1.0), policy), 0);
        }
    }

    #[test]
    fn test_coarser_than_coarsest_picks_coarsest() {
        assert_eq!(pyramid().pick((100.0, 100.0), OverviewPolicy::Quality), 3);
    }

    #[test]
    fn test_exact_match() {
        let table = pyramid();
        assert_eq!(table.pick((4.0, 4.0), OverviewPolicy::Quality), 2);
        assert_eq!(table.pick((4.0, 4.0), OverviewPolicy::Speed), 2);
    }

    #[test]
    fn test_policies_between_levels() {
        let table = pyramid();
        // between 2x (level 1) and 4x (level 2)
        assert_eq!(table.pick((2.5, 2.5), OverviewPolicy::Quality), 1);
        assert_eq!(table.pick((2.5, 2.5), OverviewPolicy::Speed), 2);
        assert_eq!(table.pick((2.5, 2.5), OverviewPolicy::Nearest), 1);
        assert_eq!(table.pick((3.5, 3.5), OverviewPolicy::Nearest), 2);
        // equidistant goes to the coarser level
        assert_eq!(table.pick((3.0, 3.0), OverviewPolicy::Nearest), 2);
    }

    #[test]
    fn test_least_reduced_axis_drives_choice() {
        // x wants 8x, y only 2x: y wins
        assert_eq!(pyramid().pick((8.0, 2.0), OverviewPolicy::Nearest), 1);
    }

    #[test]
    fn test_ignore_policy() {
        assert_eq!(pyramid().pick((8.0, 8.0), OverviewPolicy::Ignore), 0);
    }

    #[test]
    fn test_no_overviews() {
        let table = OverviewTable::from_pages(
            &BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            (10, 10),
            &[],
        );
        assert_eq!(table.pick((4.0, 4.0), OverviewPolicy::Speed), 0);
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!(OverviewPolicy::parse("QUALITY"), Some(OverviewPolicy::Quality));
        assert_eq!(OverviewPolicy::parse(" speed "), Some(OverviewPolicy::Speed));
        assert_eq!(OverviewPolicy::parse("fastest"), None);
        assert_eq!(OverviewPolicy::default(), OverviewPolicy::Nearest);
    }
}
