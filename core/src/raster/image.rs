use std::path::{Path, PathBuf};

use crate::prelude::{EnmError, EnmResult};
use crate::raster::chunker::Chunker;
use crate::raster::geotransform::GeoTransform;
use crate::raster::grid::{GridHeader, GridReader};
use crate::spatial::{Envelope, SpatialReference};

/// Result of reading one pixel at a ground location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PixelSample {
    Value(f32),
    NoData,
    OutsideRaster,
}

impl PixelSample {
    pub fn value(&self) -> Option<f32> {
        match self {
            PixelSample::Value(value) => Some(*value),
            _ => None,
        }
    }
}

/// A raster file paired with the spatial reference its coordinates are in.
#[derive(Debug, Clone, PartialEq)]
pub struct GeospatialImage {
    path: PathBuf,
    srs: SpatialReference,
}

impl GeospatialImage {
    pub fn new(path: impl Into<PathBuf>, srs: SpatialReference) -> Self {
        Self {
            path: path.into(),
            srs,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn srs(&self) -> &SpatialReference {
        &self.srs
    }

    pub fn file_name(&self) -> EnmResult<&str> {
        self.path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| EnmError::Raster(format!("{} has no file name", self.path.display())))
    }

    pub fn file_stem(&self) -> EnmResult<&str> {
        self.path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| EnmError::Raster(format!("{} has no file name", self.path.display())))
    }

    /// Reads the grid header; only ASCII grids can be inspected in-process.
    pub fn header(&self) -> EnmResult<GridHeader> {
        let (header, _) = GridReader::open(&self.path)?;
        Ok(header)
    }

    pub fn geo_transform(&self) -> EnmResult<GeoTransform> {
        Ok(self.header()?.geo_transform())
    }

    /// Absolute (x, y) pixel size in ground units.
    pub fn pixel_size(&self) -> EnmResult<(f64, f64)> {
        let header = self.header()?;
        Ok((header.dx, header.dy))
    }

    pub fn envelope(&self) -> EnmResult<Envelope> {
        let header = self.header()?;
        let (min_x, min_y, max_x, max_y) = header
            .geo_transform()
            .bounds(header.ncols, header.nrows);
        Ok(Envelope::new(min_x, min_y, max_x, max_y, self.srs))
    }

    /// Ground point to (col, row), `None` when it falls off the grid.
    pub fn locate(&self, x: f64, y: f64) -> EnmResult<Option<(usize, usize)>> {
        let header = self.header()?;
        Ok(header
            .geo_transform()
            .locate(x, y, header.ncols, header.nrows))
    }

    /// Samples every point in one top-to-bottom pass over the grid.
    ///
    /// The pass stops after the last row any point falls in; results are in
    /// the order of `points`.
    pub fn sample(&self, points: &[(f64, f64)]) -> EnmResult<Vec<PixelSample>> {
        let mut chunker = Chunker::open(&self.path)?;
        let header = *chunker.header();
        let transform = header.geo_transform();

        let mut samples = vec![PixelSample::OutsideRaster; points.len()];
        let mut wanted: Vec<(usize, usize, usize)> = points
            .iter()
            .enumerate()
            .filter_map(|(index, &(x, y))| {
                transform
                    .locate(x, y, header.ncols, header.nrows)
                    .map(|(col, row)| (row, col, index))
            })
            .collect();
        wanted.sort_unstable();

        let mut next = 0;
        while next < wanted.len() && !chunker.is_complete() {
            let chunk = chunker.get_chunk()?;
            while let Some(&(row, col, index)) = wanted.get(next) {
                if row >= chunk.rows.end {
                    break;
                }
                let value = chunk.values[[row - chunk.rows.start, col]];
                samples[index] = if chunk.is_valid(value) {
                    PixelSample::Value(value)
                } else {
                    PixelSample::NoData
                };
                next += 1;
            }
        }
        Ok(samples)
    }

    pub fn read_pixel(&self, x: f64, y: f64) -> EnmResult<PixelSample> {
        Ok(self
            .sample(&[(x, y)])?
            .pop()
            .unwrap_or(PixelSample::OutsideRaster))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(dir: &Path) -> GeospatialImage {
        let path = dir.join("suitability.asc");
        std::fs::write(
            &path,
            "ncols 3\nnrows 3\nxllcorner 10\nyllcorner 20\ncellsize 1\nNODATA_value -9999\n\
             0.1 0.2 0.3\n0.4 -9999 0.6\n0.7 0.8 0.9\n",
        )
        .unwrap();
        GeospatialImage::new(path, SpatialReference::wgs84())
    }

    #[test]
    fn samples_keep_point_order() {
        let dir = tempfile::tempdir().unwrap();
        let img = image(dir.path());
        let samples = img
            .sample(&[(12.5, 20.5), (10.5, 22.5), (11.5, 21.5), (9.0, 21.0)])
            .unwrap();
        assert_eq!(
            samples,
            vec![
                PixelSample::Value(0.9),
                PixelSample::Value(0.1),
                PixelSample::NoData,
                PixelSample::OutsideRaster,
            ]
        );
    }

    #[test]
    fn envelope_and_locate_agree() {
        let dir = tempfile::tempdir().unwrap();
        let img = image(dir.path());
        let env = img.envelope().unwrap();
        assert_eq!((env.min_x, env.min_y, env.max_x, env.max_y), (10.0, 20.0, 13.0, 23.0));
        assert_eq!(img.locate(12.9, 22.9).unwrap(), Some((2, 0)));
        assert_eq!(img.locate(13.1, 22.9).unwrap(), None);
        assert_eq!(img.read_pixel(10.5, 21.5).unwrap().value(), Some(0.4));
    }
}
