//! Geographic Regions
//!
//! Rectangular latitude/longitude filters used both for the upstream
//! subscription and for per-subscriber delivery filtering.
//!
//! Boxes crossing the anti-meridian (`min_lon > max_lon`) are rejected at
//! construction; split them into two boxes instead.

use std::fmt;
use std::str::FromStr;

/// Errors produced when building a bounding box.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegionError {
    /// Wrong number of comma-separated components.
    #[error("bounding box must have 4 components (minLat,minLon,maxLat,maxLon), got {0}")]
    ComponentCount(usize),

    /// A component is not a number.
    #[error("bounding box component {0:?} is not a number")]
    InvalidNumber(String),

    /// Latitude outside [-90, 90].
    #[error("latitude {0} is outside [-90, 90]")]
    LatitudeOutOfRange(f64),

    /// Longitude outside [-180, 180].
    #[error("longitude {0} is outside [-180, 180]")]
    LongitudeOutOfRange(f64),

    /// Minimum latitude above maximum latitude.
    #[error("min latitude {min} is greater than max latitude {max}")]
    InvertedLatitude {
        /// Minimum latitude.
        min: f64,
        /// Maximum latitude.
        max: f64,
    },

    /// Box crosses the anti-meridian.
    #[error("min longitude {min} is greater than max longitude {max}; anti-meridian boxes are not supported")]
    CrossesAntimeridian {
        /// Minimum longitude.
        min: f64,
        /// Maximum longitude.
        max: f64,
    },
}

/// Inclusive rectangular region `[min_lat, min_lon, max_lat, max_lon]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    min_lat: f64,
    min_lon: f64,
    max_lat: f64,
    max_lon: f64,
}

impl BoundingBox {
    /// The whole globe.
    pub const GLOBE: Self = Self {
        min_lat: -90.0,
        min_lon: -180.0,
        max_lat: 90.0,
        max_lon: 180.0,
    };

    /// Create a validated bounding box.
    ///
    /// # Errors
    ///
    /// Returns `RegionError` if a coordinate is out of range, the latitudes
    /// are inverted, or the box crosses the anti-meridian.
    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Result<Self, RegionError> {
        for lat in [min_lat, max_lat] {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(RegionError::LatitudeOutOfRange(lat));
            }
        }
        for lon in [min_lon, max_lon] {
            if !(-180.0..=180.0).contains(&lon) {
                return Err(RegionError::LongitudeOutOfRange(lon));
            }
        }
        if min_lat > max_lat {
            return Err(RegionError::InvertedLatitude {
                min: min_lat,
                max: max_lat,
            });
        }
        if min_lon > max_lon {
            return Err(RegionError::CrossesAntimeridian {
                min: min_lon,
                max: max_lon,
            });
        }

        Ok(Self {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        })
    }

    /// Whether a point lies inside the box (edges included).
    #[must_use]
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lon..=self.max_lon).contains(&lon)
    }

    /// Corner pair `[[min_lat, min_lon], [max_lat, max_lon]]` as sent upstream.
    #[must_use]
    pub const fn to_corners(&self) -> [[f64; 2]; 2] {
        [[self.min_lat, self.min_lon], [self.max_lat, self.max_lon]]
    }

    /// Parse a `;`-separated list of boxes.
    ///
    /// # Errors
    ///
    /// Returns the first `RegionError` encountered.
    pub fn parse_list(s: &str) -> Result<Vec<Self>, RegionError> {
        s.split(';')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::parse)
            .collect()
    }

    /// Minimum latitude.
    #[must_use]
    pub const fn min_lat(&self) -> f64 {
        self.min_lat
    }

    /// Minimum longitude.
    #[must_use]
    pub const fn min_lon(&self) -> f64 {
        self.min_lon
    }

    /// Maximum latitude.
    #[must_use]
    pub const fn max_lat(&self) -> f64 {
        self.max_lat
    }

    /// Maximum longitude.
    #[must_use]
    pub const fn max_lon(&self) -> f64 {
        self.max_lon
    }
}

impl FromStr for BoundingBox {
    type Err = RegionError;

    /// Parse `"minLat,minLon,maxLat,maxLon"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(RegionError::ComponentCount(parts.len()));
        }

        let mut values = [0.0_f64; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part
                .parse::<f64>()
                .ok()
                .filter(|v: &f64| v.is_finite())
                .ok_or_else(|| RegionError::InvalidNumber((*part).to_string()))?;
        }

        Self::new(values[0], values[1], values[2], values[3])
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.min_lat, self.min_lon, self.max_lat, self.max_lon
        )
    }
}
