use std::path::Path;

use crate::prelude::EnmResult;
use crate::raster::GeospatialImage;
use crate::spatial::{Envelope, SpatialReference};

/// Raster operations behind the preparation stages.
///
/// Implementations must be shareable across worker threads; each call writes
/// a new file at `dest` and leaves its input untouched.
pub trait RasterBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Extension of the intermediate files this backend writes.
    fn intermediate_extension(&self) -> &'static str;

    fn clip_reproject(
        &self,
        image: &GeospatialImage,
        target: &SpatialReference,
        envelope: &Envelope,
        dest: &Path,
    ) -> EnmResult<GeospatialImage>;

    /// Absolute (x, y) pixel size in the image's own units.
    fn pixel_size(&self, image: &GeospatialImage) -> EnmResult<(f64, f64)>;

    fn resample(
        &self,
        image: &GeospatialImage,
        pixel_size: f64,
        dest: &Path,
    ) -> EnmResult<GeospatialImage>;

    /// Writes a Float32 ASCII grid at `precision` decimals with the
    /// [`NO_DATA`](crate::prelude::NO_DATA) sentinel.
    fn convert(
        &self,
        image: &GeospatialImage,
        dest: &Path,
        precision: usize,
    ) -> EnmResult<GeospatialImage>;
}

/// One pixel size for both axes: the finer of the two, so no axis loses detail.
pub fn square_scale(dx: f64, dy: f64) -> f64 {
    dx.abs().min(dy.abs())
}
