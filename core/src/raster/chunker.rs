use std::fs::File;
use std::io::BufReader;
use std::ops::Range;
use std::path::{Path, PathBuf};

use ndarray::Array2;

use crate::prelude::{EnmError, EnmResult, NO_DATA};
use crate::raster::grid::{GridHeader, GridReader};

/// A band of consecutive rows read from a grid.
#[derive(Debug, Clone)]
pub struct RasterChunk {
    pub rows: Range<usize>,
    pub values: Array2<f32>,
    pub nodata: f32,
}

impl RasterChunk {
    /// False for the no-data sentinel and for non-finite values.
    pub fn is_valid(&self, value: f32) -> bool {
        value.is_finite() && value != self.nodata
    }

    pub fn valid_sum(&self) -> f64 {
        self.values
            .iter()
            .filter(|&&value| self.is_valid(value))
            .map(|&value| value as f64)
            .sum()
    }
}

/// Walks a grid top to bottom, holding only the current chunk in memory.
pub struct Chunker {
    path: PathBuf,
    header: GridHeader,
    reader: GridReader<BufReader<File>>,
    next_row: usize,
    rows_per_chunk: usize,
}

impl Chunker {
    /// Opens a grid with one-row chunks.
    pub fn open(path: impl AsRef<Path>) -> EnmResult<Self> {
        let path = path.as_ref().to_path_buf();
        let (header, reader) = GridReader::open(&path)?;
        Ok(Self {
            path,
            header,
            reader,
            next_row: 0,
            rows_per_chunk: 1,
        })
    }

    pub fn with_rows_per_chunk(mut self, rows: usize) -> Self {
        self.rows_per_chunk = rows.max(1);
        self
    }

    pub fn header(&self) -> &GridHeader {
        &self.header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn nodata(&self) -> f32 {
        self.header.nodata.unwrap_or(NO_DATA)
    }

    pub fn is_complete(&self) -> bool {
        self.next_row >= self.header.nrows
    }

    pub fn get_chunk(&mut self) -> EnmResult<RasterChunk> {
        if self.is_complete() {
            return Err(EnmError::ChunkerExhausted);
        }

        let start = self.next_row;
        let end = (start + self.rows_per_chunk).min(self.header.nrows);
        let ncols = self.header.ncols;
        let mut buffer = vec![0.0f32; (end - start) * ncols];
        for row in buffer.chunks_mut(ncols) {
            self.reader.read_row(row)?;
        }
        let values = Array2::from_shape_vec((end - start, ncols), buffer)
            .map_err(|e| EnmError::Raster(format!("{}: {}", self.path.display(), e)))?;

        self.next_row = end;
        Ok(RasterChunk {
            rows: start..end,
            values,
            nodata: self.nodata(),
        })
    }
}
