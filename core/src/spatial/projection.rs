//! Pure-Rust WGS84 projection math (Snyder 1987, USGS Prof. Paper 1395).
//!
//! Transverse Mercator series for UTM (forward eqs. 8-9/8-10, inverse
//! eqs. 8-12 to 8-25) and spherical Web Mercator.

const A: f64 = 6_378_137.0;
const F: f64 = 1.0 / 298.257_223_563;
const E2: f64 = 2.0 * F - F * F;
const E_PRIME2: f64 = E2 / (1.0 - E2);
const K0: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

fn central_meridian(zone: u32) -> f64 {
    ((zone as f64 - 1.0) * 6.0 - 180.0 + 3.0).to_radians()
}

/// Meridional arc from the equator to `lat` (radians), eq. 3-21.
fn meridional_arc(lat: f64) -> f64 {
    let e4 = E2 * E2;
    let e6 = e4 * E2;

    A * ((1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * lat
        - (3.0 * E2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * lat).sin()
        + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * lat).sin()
        - (35.0 * e6 / 3072.0) * (6.0 * lat).sin())
}

/// WGS84 (lon, lat) in degrees to UTM (easting, northing) in metres.
pub fn geographic_to_utm(lon_deg: f64, lat_deg: f64, zone: u32, north: bool) -> (f64, f64) {
    let lat = lat_deg.to_radians();
    let lon = lon_deg.to_radians();

    let sin_lat = lat.sin();
    let cos_lat = lat.cos();
    let tan_lat = lat.tan();

    let n = A / (1.0 - E2 * sin_lat * sin_lat).sqrt();
    let t = tan_lat * tan_lat;
    let c = E_PRIME2 * cos_lat * cos_lat;
    let a1 = cos_lat * (lon - central_meridian(zone));
    let a2 = a1 * a1;
    let a4 = a2 * a2;
    let a6 = a4 * a2;

    let easting = K0
        * n
        * (a1
            + (1.0 - t + c) * a2 * a1 / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * E_PRIME2) * a4 * a1 / 120.0)
        + FALSE_EASTING;

    let northing = K0
        * (meridional_arc(lat)
            + n * tan_lat
                * (a2 / 2.0
                    + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                    + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * E_PRIME2) * a6 / 720.0));

    if north {
        (easting, northing)
    } else {
        (easting, northing + FALSE_NORTHING_SOUTH)
    }
}

/// UTM (easting, northing) in metres to WGS84 (lon, lat) in degrees.
pub fn utm_to_geographic(easting: f64, northing: f64, zone: u32, north: bool) -> (f64, f64) {
    let x = easting - FALSE_EASTING;
    let y = if north {
        northing
    } else {
        northing - FALSE_NORTHING_SOUTH
    };

    let e4 = E2 * E2;
    let e6 = e4 * E2;
    let mu = (y / K0) / (A * (1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));

    let root = (1.0 - E2).sqrt();
    let e1 = (1.0 - root) / (1.0 + root);
    let e1_2 = e1 * e1;
    let e1_3 = e1_2 * e1;
    let e1_4 = e1_3 * e1;

    // Footpoint latitude, eq. 3-26.
    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1_3 / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1_2 / 16.0 - 55.0 * e1_4 / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1_3 / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1_4 / 512.0) * (8.0 * mu).sin();

    let sin_phi = phi1.sin();
    let cos_phi = phi1.cos();
    let tan_phi = phi1.tan();

    let c1 = E_PRIME2 * cos_phi * cos_phi;
    let t1 = tan_phi * tan_phi;
    let denom = 1.0 - E2 * sin_phi * sin_phi;
    let n1 = A / denom.sqrt();
    let r1 = A * (1.0 - E2) / denom.powf(1.5);
    let d = x / (n1 * K0);
    let d2 = d * d;
    let d3 = d2 * d;
    let d4 = d2 * d2;
    let d5 = d4 * d;
    let d6 = d4 * d2;

    let lat = phi1
        - (n1 * tan_phi / r1)
            * (d2 / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * E_PRIME2) * d4 / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * E_PRIME2 - 3.0 * c1 * c1)
                    * d6
                    / 720.0);

    let lon = central_meridian(zone)
        + (d - (1.0 + 2.0 * t1 + c1) * d3 / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * E_PRIME2 + 24.0 * t1 * t1) * d5
                / 120.0)
            / cos_phi;

    (lon.to_degrees(), lat.to_degrees())
}

/// WGS84 (lon, lat) in degrees to spherical Web Mercator metres.
pub fn geographic_to_web_mercator(lon_deg: f64, lat_deg: f64) -> (f64, f64) {
    let x = A * lon_deg.to_radians();
    let y = A * (std::f64::consts::FRAC_PI_4 + lat_deg.to_radians() / 2.0).tan().ln();
    (x, y)
}

/// Spherical Web Mercator metres to WGS84 (lon, lat) in degrees.
pub fn web_mercator_to_geographic(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / A).to_degrees();
    let lat = (2.0 * (y / A).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
    (lon, lat)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64, tol: f64, what: &str) {
        let diff = (actual - expected).abs();
        assert!(
            diff < tol,
            "{what}: expected {expected}, got {actual} (diff {diff})"
        );
    }

    #[test]
    fn utm_12n_sample_point_maps_to_geographic() {
        let (lon, lat) = utm_to_geographic(374_187.0, 4_124_593.0, 12, true);
        assert_close(lon, -112.418_804_905, 1e-6, "lon");
        assert_close(lat, 37.259_406_381, 1e-6, "lat");
    }

    #[test]
    fn madrid_forward_matches_reference() {
        let (e, n) = geographic_to_utm(-3.7037, 40.4168, 30, true);
        assert_close(e, 440_298.94, 1.0, "easting");
        assert_close(n, 4_474_257.31, 1.0, "northing");
    }

    #[test]
    fn southern_hemisphere_round_trip() {
        let (e, n) = geographic_to_utm(-58.3816, -34.6037, 21, false);
        assert_close(e, 373_317.50, 1.0, "easting");
        assert_close(n, 6_170_036.17, 1.0, "northing");

        let (lon, lat) = utm_to_geographic(e, n, 21, false);
        assert_close(lon, -58.3816, 1e-6, "lon");
        assert_close(lat, -34.6037, 1e-6, "lat");
    }

    #[test]
    fn web_mercator_round_trip() {
        let (x, y) = geographic_to_web_mercator(-112.5, 37.25);
        let (lon, lat) = web_mercator_to_geographic(x, y);
        assert_close(lon, -112.5, 1e-9, "lon");
        assert_close(lat, 37.25, 1e-9, "lat");
    }
}
