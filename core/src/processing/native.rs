//! In-process backend for ESRI ASCII grid inputs.
//!
//! Clipping, reprojection and resampling all use nearest-neighbour lookups.
//! Only conversion streams; the other operations hold one grid in memory.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use ndarray::{s, Array2};

use crate::prelude::{EnmError, EnmResult, NO_DATA};
use crate::processing::backend::RasterBackend;
use crate::raster::grid::write_row;
use crate::raster::{Chunker, GeospatialImage, GridHeader, GridRaster};
use crate::spatial::{Envelope, SpatialReference};

/// Decimals kept in intermediate grids so later stages see full f32 values.
const INTERMEDIATE_PRECISION: usize = 9;

#[derive(Debug, Clone, Copy, Default)]
pub struct NativeBackend;

impl NativeBackend {
    pub fn new() -> Self {
        Self
    }
}

impl RasterBackend for NativeBackend {
    fn name(&self) -> &'static str {
        "native"
    }

    fn intermediate_extension(&self) -> &'static str {
        "asc"
    }

    fn clip_reproject(
        &self,
        image: &GeospatialImage,
        target: &SpatialReference,
        envelope: &Envelope,
        dest: &Path,
    ) -> EnmResult<GeospatialImage> {
        let source = GridRaster::read(image.path())?;
        let window = envelope.transform_to(target)?;

        let clipped = if image.srs().is_same(target) {
            clip_aligned(&source, image.srs(), &window)
        } else {
            warp(&source, image.srs(), target, &window)
        }
        .map_err(|e| match e {
            EnmError::Raster(message) => {
                EnmError::Raster(format!("{}: {}", image.path().display(), message))
            }
            other => other,
        })?;

        clipped.write(dest, INTERMEDIATE_PRECISION)?;
        Ok(GeospatialImage::new(dest, *target))
    }

    fn pixel_size(&self, image: &GeospatialImage) -> EnmResult<(f64, f64)> {
        image.pixel_size()
    }

    fn resample(
        &self,
        image: &GeospatialImage,
        pixel_size: f64,
        dest: &Path,
    ) -> EnmResult<GeospatialImage> {
        if !(pixel_size.is_finite() && pixel_size > 0.0) {
            return Err(EnmError::Raster(format!(
                "cannot resample {} to pixel size {}",
                image.path().display(),
                pixel_size
            )));
        }
        let source = GridRaster::read(image.path())?;
        let header = source.header;
        let origin = header.geo_transform();

        let ncols = ((header.ncols as f64 * header.dx / pixel_size).round() as usize).max(1);
        let nrows = ((header.nrows as f64 * header.dy / pixel_size).round() as usize).max(1);
        let resampled_header = GridHeader::from_origin(
            origin.origin_x,
            origin.origin_y,
            pixel_size,
            pixel_size,
            ncols,
            nrows,
            header.nodata,
        );

        let source_index = |index: usize, step: f64, limit: usize| -> usize {
            (((index as f64 + 0.5) * pixel_size / step).floor() as usize).min(limit - 1)
        };
        let data = Array2::from_shape_fn((nrows, ncols), |(row, col)| {
            source.data[[
                source_index(row, header.dy, header.nrows),
                source_index(col, header.dx, header.ncols),
            ]]
        });

        GridRaster {
            header: resampled_header,
            data,
        }
        .write(dest, INTERMEDIATE_PRECISION)?;
        Ok(GeospatialImage::new(dest, *image.srs()))
    }

    fn convert(
        &self,
        image: &GeospatialImage,
        dest: &Path,
        precision: usize,
    ) -> EnmResult<GeospatialImage> {
        let mut chunker = Chunker::open(image.path())?;
        let header = GridHeader {
            nodata: Some(NO_DATA),
            ..*chunker.header()
        };
        let source_nodata = chunker.nodata();

        let mut out = BufWriter::new(File::create(dest)?);
        header.write(&mut out)?;
        while !chunker.is_complete() {
            let chunk = chunker.get_chunk()?;
            for row in chunk.values.rows() {
                let values = row
                    .iter()
                    .map(|&value| if value == source_nodata { NO_DATA } else { value });
                write_row(&mut out, values, precision)?;
            }
        }
        out.flush()?;
        Ok(GeospatialImage::new(dest, *image.srs()))
    }
}

fn no_overlap() -> EnmError {
    EnmError::Raster("clip envelope does not overlap the raster".to_string())
}

/// Cuts the pixel window covering `window` out of a grid already in the
/// target reference; the source pixel lattice is kept.
fn clip_aligned(
    source: &GridRaster,
    srs: &SpatialReference,
    window: &Envelope,
) -> EnmResult<GridRaster> {
    let header = source.header;
    let transform = header.geo_transform();
    let (min_x, min_y, max_x, max_y) = transform.bounds(header.ncols, header.nrows);
    let overlap = Envelope::new(min_x, min_y, max_x, max_y, *srs)
        .intersection(window)
        .ok_or_else(no_overlap)?;

    let span = |from: f64, to: f64, limit: usize| -> (usize, usize) {
        let start = (from.floor().max(0.0) as usize).min(limit - 1);
        let end = (to.ceil().max(0.0) as usize).min(limit).max(start + 1);
        (start, end)
    };
    let (left, top) = transform.geo_to_pixel(overlap.min_x, overlap.max_y);
    let (right, bottom) = transform.geo_to_pixel(overlap.max_x, overlap.min_y);
    let (col0, col1) = span(left, right, header.ncols);
    let (row0, row1) = span(top, bottom, header.nrows);

    let data = source.data.slice(s![row0..row1, col0..col1]).to_owned();
    let clipped_header = GridHeader::from_origin(
        transform.origin_x + col0 as f64 * header.dx,
        transform.origin_y - row0 as f64 * header.dy,
        header.dx,
        header.dy,
        col1 - col0,
        row1 - row0,
        header.nodata,
    );
    Ok(GridRaster {
        header: clipped_header,
        data,
    })
}

/// Resamples a grid into `target`, limited to `window`; pixel size follows
/// the projected size of the source's central pixel.
fn warp(
    source: &GridRaster,
    source_srs: &SpatialReference,
    target: &SpatialReference,
    window: &Envelope,
) -> EnmResult<GridRaster> {
    let header = source.header;
    let transform = header.geo_transform();
    let (min_x, min_y, max_x, max_y) = transform.bounds(header.ncols, header.nrows);
    let footprint = Envelope::new(min_x, min_y, max_x, max_y, *source_srs).transform_to(target)?;
    let overlap = footprint.intersection(window).ok_or_else(no_overlap)?;

    let (cx, cy) = transform.pixel_to_geo(header.ncols / 2, header.nrows / 2);
    let (x0, y0) = source_srs.transform_point(target, cx, cy)?;
    let (x1, y1) = source_srs.transform_point(target, cx + header.dx, cy)?;
    let (x2, y2) = source_srs.transform_point(target, cx, cy - header.dy)?;
    let dx = (x1 - x0).hypot(y1 - y0);
    let dy = (x2 - x0).hypot(y2 - y0);
    if !(dx > 0.0 && dy > 0.0 && dx.is_finite() && dy.is_finite()) {
        return Err(EnmError::Raster(format!(
            "projected pixel size {}x{} is degenerate",
            dx, dy
        )));
    }

    let ncols = ((overlap.width() / dx).ceil() as usize).max(1);
    let nrows = ((overlap.height() / dy).ceil() as usize).max(1);
    let nodata = header.nodata.unwrap_or(NO_DATA);
    let warped_header =
        GridHeader::from_origin(overlap.min_x, overlap.max_y, dx, dy, ncols, nrows, Some(nodata));
    let warped_transform = warped_header.geo_transform();

    let data = Array2::from_shape_fn((nrows, ncols), |(row, col)| {
        let (x, y) = warped_transform.pixel_to_geo(col, row);
        target
            .transform_point(source_srs, x, y)
            .ok()
            .and_then(|(sx, sy)| source.value_at(sx, sy))
            .unwrap_or(nodata)
    });

    Ok(GridRaster {
        header: warped_header,
        data,
    })
}
