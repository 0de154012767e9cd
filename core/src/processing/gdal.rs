//! Backend driving the GDAL command-line utilities.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::external::ExternalCommand;
use crate::prelude::{EnmError, EnmResult, NO_DATA};
use crate::processing::backend::RasterBackend;
use crate::raster::GeospatialImage;
use crate::spatial::{Envelope, SpatialReference};

/// Locations of the GDAL executables; bare names resolve through `PATH`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GdalTools {
    pub gdalwarp: PathBuf,
    pub gdal_translate: PathBuf,
    pub gdalinfo: PathBuf,
}

impl Default for GdalTools {
    fn default() -> Self {
        Self {
            gdalwarp: PathBuf::from("gdalwarp"),
            gdal_translate: PathBuf::from("gdal_translate"),
            gdalinfo: PathBuf::from("gdalinfo"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GdalBackend {
    tools: GdalTools,
}

#[derive(Deserialize)]
struct GdalInfo {
    #[serde(rename = "geoTransform")]
    geo_transform: Option<Vec<f64>>,
}

impl GdalBackend {
    pub fn new(tools: GdalTools) -> Self {
        Self { tools }
    }

    pub fn tools(&self) -> &GdalTools {
        &self.tools
    }

    pub fn clip_command(
        &self,
        image: &GeospatialImage,
        target: &SpatialReference,
        envelope: &Envelope,
        dest: &Path,
    ) -> ExternalCommand {
        ExternalCommand::new(&self.tools.gdalwarp)
            .args(["-overwrite", "-r", "near"])
            .arg("-s_srs")
            .arg(image.srs().to_string())
            .arg("-t_srs")
            .arg(target.to_string())
            .arg("-te")
            .args(
                [envelope.min_x, envelope.min_y, envelope.max_x, envelope.max_y]
                    .iter()
                    .map(|v| v.to_string()),
            )
            .arg("-te_srs")
            .arg(envelope.srs.to_string())
            .arg(image.path())
            .arg(dest)
    }

    pub fn resample_command(
        &self,
        image: &GeospatialImage,
        pixel_size: f64,
        dest: &Path,
    ) -> ExternalCommand {
        let size = pixel_size.to_string();
        ExternalCommand::new(&self.tools.gdalwarp)
            .args(["-overwrite", "-r", "near", "-tr"])
            .args([&size, &size])
            .arg(image.path())
            .arg(dest)
    }

    pub fn convert_command(
        &self,
        image: &GeospatialImage,
        dest: &Path,
        precision: usize,
    ) -> ExternalCommand {
        ExternalCommand::new(&self.tools.gdal_translate)
            .args(["-ot", "Float32", "-of", "AAIGrid", "-a_nodata"])
            .arg(format!("{:.1}", NO_DATA))
            .arg("-co")
            .arg(format!("DECIMAL_PRECISION={}", precision))
            .arg(image.path())
            .arg(dest)
    }
}

/// Pixel size from `gdalinfo -json` output, as absolute values.
pub fn parse_pixel_size(json: &str) -> EnmResult<(f64, f64)> {
    let info: GdalInfo = serde_json::from_str(json)?;
    match info.geo_transform.as_deref() {
        Some([_, width, _, _, _, height, ..]) => Ok((width.abs(), height.abs())),
        _ => Err(EnmError::Raster(
            "gdalinfo reported no six-term geoTransform".to_string(),
        )),
    }
}

impl RasterBackend for GdalBackend {
    fn name(&self) -> &'static str {
        "gdal"
    }

    fn intermediate_extension(&self) -> &'static str {
        "tif"
    }

    fn clip_reproject(
        &self,
        image: &GeospatialImage,
        target: &SpatialReference,
        envelope: &Envelope,
        dest: &Path,
    ) -> EnmResult<GeospatialImage> {
        self.clip_command(image, target, envelope, dest).run()?;
        Ok(GeospatialImage::new(dest, *target))
    }

    fn pixel_size(&self, image: &GeospatialImage) -> EnmResult<(f64, f64)> {
        let output = ExternalCommand::new(&self.tools.gdalinfo)
            .arg("-json")
            .arg(image.path())
            .run()?;
        parse_pixel_size(&String::from_utf8_lossy(&output.stdout))
    }

    fn resample(
        &self,
        image: &GeospatialImage,
        pixel_size: f64,
        dest: &Path,
    ) -> EnmResult<GeospatialImage> {
        self.resample_command(image, pixel_size, dest).run()?;
        Ok(GeospatialImage::new(dest, *image.srs()))
    }

    fn convert(
        &self,
        image: &GeospatialImage,
        dest: &Path,
        precision: usize,
    ) -> EnmResult<GeospatialImage> {
        self.convert_command(image, dest, precision).run()?;
        Ok(GeospatialImage::new(dest, *image.srs()))
    }
}
