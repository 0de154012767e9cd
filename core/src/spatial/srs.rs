use std::fmt;

use crate::prelude::{EnmError, EnmResult};
use crate::spatial::projection;

const WGS84_GEOGRAPHIC: u32 = 4326;
const WEB_MERCATOR: u32 = 3857;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Projection {
    Geographic,
    Utm { zone: u32, north: bool },
    WebMercator,
}

/// Coordinate system identified by its EPSG code.
///
/// Live references stay inside one process. Anything that crosses a worker
/// boundary carries the PROJ.4 string from [`SpatialReference::to_proj4`] and
/// rebuilds the reference with [`SpatialReference::from_proj4`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpatialReference {
    epsg: u32,
    projection: Projection,
}

impl SpatialReference {
    pub fn from_epsg(code: u32) -> EnmResult<Self> {
        let projection = match code {
            WGS84_GEOGRAPHIC => Projection::Geographic,
            WEB_MERCATOR => Projection::WebMercator,
            32601..=32660 => Projection::Utm {
                zone: code - 32600,
                north: true,
            },
            32701..=32760 => Projection::Utm {
                zone: code - 32700,
                north: false,
            },
            other => {
                return Err(EnmError::Projection(format!(
                    "EPSG:{} is not a supported spatial reference",
                    other
                )))
            }
        };
        Ok(Self {
            epsg: code,
            projection,
        })
    }

    pub fn wgs84() -> Self {
        Self {
            epsg: WGS84_GEOGRAPHIC,
            projection: Projection::Geographic,
        }
    }

    pub fn epsg(&self) -> u32 {
        self.epsg
    }

    pub fn is_same(&self, other: &SpatialReference) -> bool {
        self.epsg == other.epsg
    }

    pub fn is_geographic(&self) -> bool {
        matches!(self.projection, Projection::Geographic)
    }

    pub fn to_proj4(&self) -> String {
        match self.projection {
            Projection::Geographic => "+proj=longlat +datum=WGS84 +no_defs".to_string(),
            Projection::Utm { zone, north } => format!(
                "+proj=utm +zone={}{} +datum=WGS84 +units=m +no_defs",
                zone,
                if north { "" } else { " +south" }
            ),
            Projection::WebMercator => "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 \
                 +x_0=0 +y_0=0 +k=1 +units=m +nadgrids=@null +wktext +no_defs"
                .to_string(),
        }
    }

    pub fn from_proj4(definition: &str) -> EnmResult<Self> {
        let mut proj = None;
        let mut zone = None;
        let mut south = false;
        let mut datum = None;
        let mut semi_major = None;

        for token in definition.split_whitespace() {
            let token = token.trim_start_matches('+');
            let (key, value) = match token.split_once('=') {
                Some((key, value)) => (key, Some(value)),
                None => (token, None),
            };
            match (key, value) {
                ("proj", Some(value)) => proj = Some(value),
                ("zone", Some(value)) => {
                    zone = Some(value.parse::<u32>().map_err(|_| {
                        EnmError::Projection(format!("invalid UTM zone in '{}'", definition))
                    })?)
                }
                ("south", None) => south = true,
                ("datum", Some(value)) | ("ellps", Some(value)) => datum = Some(value),
                ("a", Some(value)) => semi_major = value.parse::<f64>().ok(),
                _ => {}
            }
        }

        if let Some(datum) = datum {
            if !datum.eq_ignore_ascii_case("WGS84") {
                return Err(EnmError::Projection(format!(
                    "datum {} is not supported in '{}'",
                    datum, definition
                )));
            }
        }

        match proj {
            Some("longlat") | Some("latlong") => Ok(Self::wgs84()),
            Some("utm") => {
                let zone = zone.ok_or_else(|| {
                    EnmError::Projection(format!("UTM definition without zone: '{}'", definition))
                })?;
                let base = if south { 32700 } else { 32600 };
                Self::from_epsg(base + zone)
            }
            Some("merc") if semi_major == Some(6_378_137.0) => Self::from_epsg(WEB_MERCATOR),
            _ => Err(EnmError::Projection(format!(
                "unsupported PROJ.4 definition '{}'",
                definition
            ))),
        }
    }

    /// Reprojects a single coordinate from this reference into `target`.
    pub fn transform_point(
        &self,
        target: &SpatialReference,
        x: f64,
        y: f64,
    ) -> EnmResult<(f64, f64)> {
        if self.is_same(target) {
            return Ok((x, y));
        }
        let (lon, lat) = self.unproject(x, y);
        if !(lon.is_finite() && lat.is_finite()) || lat.abs() > 90.0 {
            return Err(EnmError::Projection(format!(
                "({}, {}) in {} has no geographic position",
                x, y, self
            )));
        }
        Ok(target.project(lon, lat))
    }

    fn unproject(&self, x: f64, y: f64) -> (f64, f64) {
        match self.projection {
            Projection::Geographic => (x, y),
            Projection::Utm { zone, north } => projection::utm_to_geographic(x, y, zone, north),
            Projection::WebMercator => projection::web_mercator_to_geographic(x, y),
        }
    }

    fn project(&self, lon: f64, lat: f64) -> (f64, f64) {
        match self.projection {
            Projection::Geographic => (lon, lat),
            Projection::Utm { zone, north } => {
                projection::geographic_to_utm(lon, lat, zone, north)
            }
            Projection::WebMercator => projection::geographic_to_web_mercator(lon, lat),
        }
    }
}

impl fmt::Display for SpatialReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg)
    }
}

/// Parses an authority field such as `epsg:32612` into its integer code.
pub fn parse_authority_code(field: &str) -> Option<u32> {
    let (_, code) = field.trim().split_once(':')?;
    code.trim().parse::<u32>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proj4_round_trip_for_supported_codes() {
        for code in [4326, 3857, 32612, 32601, 32660, 32721] {
            let srs = SpatialReference::from_epsg(code).unwrap();
            let decoded = SpatialReference::from_proj4(&srs.to_proj4()).unwrap();
            assert!(srs.is_same(&decoded), "EPSG:{} did not survive", code);
        }
    }

    #[test]
    fn unsupported_code_is_rejected() {
        assert!(matches!(
            SpatialReference::from_epsg(2163),
            Err(EnmError::Projection(_))
        ));
        assert!(SpatialReference::from_proj4("+proj=lcc +lat_1=33").is_err());
        assert!(SpatialReference::from_proj4("+proj=longlat +datum=NAD27").is_err());
    }

    #[test]
    fn authority_code_requires_colon_and_integer() {
        assert_eq!(parse_authority_code("epsg:32612"), Some(32612));
        assert_eq!(parse_authority_code("EPSG: 4326"), Some(4326));
        assert_eq!(parse_authority_code("epsg"), None);
        assert_eq!(parse_authority_code("epsg:utm"), None);
    }

    #[test]
    fn same_reference_transform_is_identity() {
        let srs = SpatialReference::from_epsg(32612).unwrap();
        let (x, y) = srs.transform_point(&srs, 374_187.0, 4_124_593.0).unwrap();
        assert_eq!((x, y), (374_187.0, 4_124_593.0));
    }

    #[test]
    fn utm_to_mercator_goes_through_geographic() {
        let utm = SpatialReference::from_epsg(32612).unwrap();
        let merc = SpatialReference::from_epsg(3857).unwrap();
        let (x, y) = utm.transform_point(&merc, 374_187.0, 4_124_593.0).unwrap();
        let (e, n) = merc.transform_point(&utm, x, y).unwrap();
        assert!((e - 374_187.0).abs() < 0.05);
        assert!((n - 4_124_593.0).abs() < 0.05);
    }
}
