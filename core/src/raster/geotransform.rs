//! North-up affine mapping between pixel and ground coordinates.

/// ```text
/// x = origin_x + col * pixel_width
/// y = origin_y + row * pixel_height
/// ```
///
/// `origin` is the upper-left corner and `pixel_height` is negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Ground coordinates of the centre of pixel (`col`, `row`).
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.pixel_width,
            self.origin_y + (row as f64 + 0.5) * self.pixel_height,
        )
    }

    /// Fractional pixel coordinates of a ground point; floor them for indices.
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.pixel_width,
            (y - self.origin_y) / self.pixel_height,
        )
    }

    /// Integer (col, row) of the pixel containing a ground point, if any.
    pub fn locate(&self, x: f64, y: f64, ncols: usize, nrows: usize) -> Option<(usize, usize)> {
        let (col, row) = self.geo_to_pixel(x, y);
        if !(col.is_finite() && row.is_finite()) || col < 0.0 || row < 0.0 {
            return None;
        }
        let (col, row) = (col.floor() as usize, row.floor() as usize);
        (col < ncols && row < nrows).then_some((col, row))
    }

    /// (min_x, min_y, max_x, max_y) of a raster with the given dimensions.
    pub fn bounds(&self, ncols: usize, nrows: usize) -> (f64, f64, f64, f64) {
        let x0 = self.origin_x;
        let x1 = self.origin_x + ncols as f64 * self.pixel_width;
        let y0 = self.origin_y;
        let y1 = self.origin_y + nrows as f64 * self.pixel_height;
        (x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_centre_round_trips() {
        let gt = GeoTransform::new(100.0, 200.0, 10.0, -10.0);
        let (x, y) = gt.pixel_to_geo(5, 10);
        let (col, row) = gt.geo_to_pixel(x, y);
        assert!((col - 5.5).abs() < 1e-10);
        assert!((row - 10.5).abs() < 1e-10);
    }

    #[test]
    fn locate_rejects_points_off_the_grid() {
        let gt = GeoTransform::new(0.0, 100.0, 1.0, -1.0);
        assert_eq!(gt.locate(0.5, 99.5, 100, 100), Some((0, 0)));
        assert_eq!(gt.locate(99.9, 0.1, 100, 100), Some((99, 99)));
        assert_eq!(gt.locate(-0.1, 50.0, 100, 100), None);
        assert_eq!(gt.locate(50.0, 100.1, 100, 100), None);
        assert_eq!(gt.locate(100.0, 50.0, 100, 100), None);
    }

    #[test]
    fn bounds_cover_the_grid() {
        let gt = GeoTransform::new(0.0, 100.0, 1.0, -1.0);
        assert_eq!(gt.bounds(100, 50), (0.0, 50.0, 100.0, 100.0));
    }
}
