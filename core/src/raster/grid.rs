//! ESRI ASCII grid reading and writing.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use ndarray::Array2;

use crate::prelude::{EnmError, EnmResult};
use crate::raster::geotransform::GeoTransform;

/// Header of an ASCII grid, normalized to lower-left corner coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridHeader {
    pub ncols: usize,
    pub nrows: usize,
    pub x_ll: f64,
    pub y_ll: f64,
    pub dx: f64,
    pub dy: f64,
    pub nodata: Option<f32>,
}

impl GridHeader {
    pub fn geo_transform(&self) -> GeoTransform {
        GeoTransform::new(
            self.x_ll,
            self.y_ll + self.nrows as f64 * self.dy,
            self.dx,
            -self.dy,
        )
    }

    /// Builds a header from an upper-left origin and positive pixel sizes.
    pub fn from_origin(
        origin_x: f64,
        origin_y: f64,
        dx: f64,
        dy: f64,
        ncols: usize,
        nrows: usize,
        nodata: Option<f32>,
    ) -> Self {
        Self {
            ncols,
            nrows,
            x_ll: origin_x,
            y_ll: origin_y - nrows as f64 * dy,
            dx,
            dy,
            nodata,
        }
    }

    pub fn is_square(&self) -> bool {
        (self.dx - self.dy).abs() <= 1e-12 * self.dx.abs().max(self.dy.abs())
    }

    pub fn write<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        writeln!(out, "ncols        {}", self.ncols)?;
        writeln!(out, "nrows        {}", self.nrows)?;
        writeln!(out, "xllcorner    {}", self.x_ll)?;
        writeln!(out, "yllcorner    {}", self.y_ll)?;
        if self.is_square() {
            writeln!(out, "cellsize     {}", self.dx)?;
        } else {
            writeln!(out, "dx           {}", self.dx)?;
            writeln!(out, "dy           {}", self.dy)?;
        }
        if let Some(nodata) = self.nodata {
            writeln!(out, "NODATA_value {}", nodata)?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct HeaderFields {
    ncols: Option<usize>,
    nrows: Option<usize>,
    x_corner: Option<f64>,
    x_center: Option<f64>,
    y_corner: Option<f64>,
    y_center: Option<f64>,
    cellsize: Option<f64>,
    dx: Option<f64>,
    dy: Option<f64>,
    nodata: Option<f32>,
}

/// Streaming reader over the values of an ASCII grid, one row at a time.
pub struct GridReader<R> {
    reader: R,
    path: PathBuf,
    line: String,
    pending: VecDeque<f32>,
}

impl GridReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> EnmResult<(GridHeader, Self)> {
        let path = path.as_ref();
        let file = File::open(path)?;
        GridReader::from_reader(BufReader::new(file), path)
    }
}

impl<R: BufRead> GridReader<R> {
    pub fn from_reader(reader: R, path: &Path) -> EnmResult<(GridHeader, Self)> {
        let mut grid = Self {
            reader,
            path: path.to_path_buf(),
            line: String::new(),
            pending: VecDeque::new(),
        };
        let header = grid.read_header()?;
        Ok((header, grid))
    }

    fn read_header(&mut self) -> EnmResult<GridHeader> {
        let mut fields = HeaderFields::default();
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                break;
            }
            let mut tokens = self.line.split_whitespace();
            let Some(key) = tokens.next() else {
                continue;
            };
            let key = key.to_ascii_lowercase();
            let value = tokens.next();
            let number = || -> EnmResult<f64> {
                value
                    .and_then(|v| v.parse::<f64>().ok())
                    .ok_or_else(|| EnmError::format(&self.path, format!("invalid {} in header", key)))
            };
            match key.as_str() {
                "ncols" => fields.ncols = Some(number()? as usize),
                "nrows" => fields.nrows = Some(number()? as usize),
                "xllcorner" => fields.x_corner = Some(number()?),
                "xllcenter" => fields.x_center = Some(number()?),
                "yllcorner" => fields.y_corner = Some(number()?),
                "yllcenter" => fields.y_center = Some(number()?),
                "cellsize" => fields.cellsize = Some(number()?),
                "dx" => fields.dx = Some(number()?),
                "dy" => fields.dy = Some(number()?),
                // Parsed like the cells so the sentinel compares equal to them.
                "nodata_value" => {
                    fields.nodata = Some(
                        value
                            .and_then(|v| v.parse::<f32>().ok())
                            .ok_or_else(|| EnmError::format(&self.path, "invalid nodata_value in header"))?,
                    )
                }
                _ => {
                    // First data line; keep its values for the row reader.
                    self.push_line_values()?;
                    break;
                }
            }
        }
        self.finish_header(fields)
    }

    fn finish_header(&self, fields: HeaderFields) -> EnmResult<GridHeader> {
        let missing = |name: &str| EnmError::format(&self.path, format!("grid header lacks {}", name));
        let ncols = fields.ncols.ok_or_else(|| missing("ncols"))?;
        let nrows = fields.nrows.ok_or_else(|| missing("nrows"))?;
        let (dx, dy) = match (fields.cellsize, fields.dx, fields.dy) {
            (Some(size), _, _) => (size, size),
            (None, Some(dx), Some(dy)) => (dx, dy),
            _ => return Err(missing("cellsize or dx/dy")),
        };
        if ncols == 0 || nrows == 0 || dx <= 0.0 || dy <= 0.0 {
            return Err(EnmError::format(
                &self.path,
                format!("degenerate grid {}x{} with cell {}x{}", ncols, nrows, dx, dy),
            ));
        }
        let x_ll = match (fields.x_corner, fields.x_center) {
            (Some(x), _) => x,
            (None, Some(x)) => x - dx / 2.0,
            _ => return Err(missing("xllcorner")),
        };
        let y_ll = match (fields.y_corner, fields.y_center) {
            (Some(y), _) => y,
            (None, Some(y)) => y - dy / 2.0,
            _ => return Err(missing("yllcorner")),
        };
        Ok(GridHeader {
            ncols,
            nrows,
            x_ll,
            y_ll,
            dx,
            dy,
            nodata: fields.nodata,
        })
    }

    fn push_line_values(&mut self) -> EnmResult<()> {
        for token in self.line.split_whitespace() {
            let value = token.parse::<f32>().map_err(|_| {
                EnmError::format(&self.path, format!("'{}' is not a grid value", token))
            })?;
            self.pending.push_back(value);
        }
        Ok(())
    }

    /// Fills `row` with the next `row.len()` values of the grid.
    pub fn read_row(&mut self, row: &mut [f32]) -> EnmResult<()> {
        for slot in row.iter_mut() {
            while self.pending.is_empty() {
                self.line.clear();
                if self.reader.read_line(&mut self.line)? == 0 {
                    return Err(EnmError::format(&self.path, "grid ends before its last row"));
                }
                self.push_line_values()?;
            }
            if let Some(value) = self.pending.pop_front() {
                *slot = value;
            }
        }
        Ok(())
    }
}

/// Whole grid held in memory.
#[derive(Debug, Clone)]
pub struct GridRaster {
    pub header: GridHeader,
    pub data: Array2<f32>,
}

impl GridRaster {
    pub fn read(path: impl AsRef<Path>) -> EnmResult<Self> {
        let (header, mut reader) = GridReader::open(path)?;
        let mut data = Array2::<f32>::zeros((header.nrows, header.ncols));
        let mut row = vec![0.0f32; header.ncols];
        for mut target in data.rows_mut() {
            reader.read_row(&mut row)?;
            for (cell, value) in target.iter_mut().zip(&row) {
                *cell = *value;
            }
        }
        Ok(Self { header, data })
    }

    /// Nearest-neighbour value at a ground coordinate.
    pub fn value_at(&self, x: f64, y: f64) -> Option<f32> {
        let (col, row) = self
            .header
            .geo_transform()
            .locate(x, y, self.header.ncols, self.header.nrows)?;
        Some(self.data[[row, col]])
    }

    pub fn write(&self, path: impl AsRef<Path>, precision: usize) -> EnmResult<()> {
        let mut out = BufWriter::new(File::create(path)?);
        self.header.write(&mut out)?;
        for row in self.data.rows() {
            write_row(&mut out, row.iter().copied(), precision)?;
        }
        out.flush()?;
        Ok(())
    }
}

/// Writes one grid row at a fixed number of decimals.
pub fn write_row<W: Write>(
    out: &mut W,
    values: impl IntoIterator<Item = f32>,
    precision: usize,
) -> std::io::Result<()> {
    let mut first = true;
    for value in values {
        if !first {
            out.write_all(b" ")?;
        }
        write!(out, "{:.*}", precision, value)?;
        first = false;
    }
    out.write_all(b"\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const GRID: &str = "ncols 3\nnrows 2\nxllcenter 0.5\nyllcenter 0.5\ncellsize 1\n\
                        NODATA_value -9999\n1 2 3\n4 -9999 6\n";

    #[test]
    fn header_is_normalized_to_corners() {
        let (header, _) = GridReader::from_reader(Cursor::new(GRID), Path::new("mem.asc")).unwrap();
        assert_eq!(header.ncols, 3);
        assert_eq!(header.nrows, 2);
        assert_eq!(header.x_ll, 0.0);
        assert_eq!(header.y_ll, 0.0);
        assert_eq!(header.nodata, Some(-9999.0));
        assert_eq!(header.geo_transform().origin_y, 2.0);
    }

    #[test]
    fn rows_may_wrap_across_lines() {
        let text = "ncols 3\nnrows 2\nxllcorner 0\nyllcorner 0\ndx 1\ndy 2\n1 2\n3 4 5\n6\n";
        let (header, mut reader) =
            GridReader::from_reader(Cursor::new(text), Path::new("mem.asc")).unwrap();
        assert!(!header.is_square());
        let mut row = [0.0f32; 3];
        reader.read_row(&mut row).unwrap();
        assert_eq!(row, [1.0, 2.0, 3.0]);
        reader.read_row(&mut row).unwrap();
        assert_eq!(row, [4.0, 5.0, 6.0]);
        assert!(reader.read_row(&mut row).is_err());
    }

    #[test]
    fn missing_cell_size_is_a_format_error() {
        let text = "ncols 3\nnrows 2\nxllcorner 0\nyllcorner 0\n1 2 3\n4 5 6\n";
        let result = GridReader::from_reader(Cursor::new(text), Path::new("mem.asc"));
        assert!(matches!(result, Err(EnmError::Format { .. })));
    }

    #[test]
    fn written_grid_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.asc");
        std::fs::write(&path, GRID).unwrap();

        let grid = GridRaster::read(&path).unwrap();
        assert_eq!(grid.data[[1, 2]], 6.0);
        assert_eq!(grid.value_at(1.5, 0.5), Some(-9999.0));
        assert_eq!(grid.value_at(3.5, 0.5), None);

        let copy = dir.path().join("copy.asc");
        grid.write(&copy, 2).unwrap();
        let text = std::fs::read_to_string(&copy).unwrap();
        assert!(text.contains("1.00 2.00 3.00"));
        assert!(text.contains("NODATA_value -9999"));
        assert_eq!(GridRaster::read(&copy).unwrap().data, grid.data);
    }

    #[test]
    fn nodata_sentinel_matches_identical_cells() {
        // Just above the midpoint between 1.0 and the next f32.
        let sentinel = "1.00000005960464477539063";
        let text = format!(
            "ncols 2\nnrows 1\nxllcorner 0\nyllcorner 0\ncellsize 1\nNODATA_value {sentinel}\n{sentinel} 2\n"
        );
        let (header, mut reader) =
            GridReader::from_reader(Cursor::new(text), Path::new("mem.asc")).unwrap();
        let mut row = [0.0f32; 2];
        reader.read_row(&mut row).unwrap();
        assert_eq!(header.nodata, Some(row[0]));
        assert_eq!(row[0], 1.0 + f32::EPSILON);
    }
}
