//! The per-image preparation chain.
//!
//! Each stage writes a new file inside the unit's working directory and hands
//! the result to the next stage.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::prelude::{EnmError, EnmResult, PreparationStage, StageInput, StageOutput};
use crate::processing::backend::{square_scale, RasterBackend};
use crate::raster::GeospatialImage;
use crate::spatial::{Envelope, SpatialReference};

/// Written in place of every not-a-number token.
pub const NAN_REPLACEMENT: &str = "-9999";

fn stage_path(input: &StageInput, stage: &str, extension: &str) -> PathBuf {
    input.work_dir.join(format!("{}.{}", stage, extension))
}

/// Path of the `.prj` sidecar that may accompany a raster.
pub fn sidecar_path(path: &Path) -> PathBuf {
    path.with_extension("prj")
}

/// Copies the source raster, and its `.prj` sidecar, into the working
/// directory so the original is never modified.
pub struct CopyStage;

impl PreparationStage for CopyStage {
    fn name(&self) -> &'static str {
        "copy"
    }

    fn execute(&mut self, input: StageInput) -> EnmResult<StageOutput> {
        let source = input.image.path();
        let file_name = input.image.file_name()?;
        let copy_dir = input.work_dir.join("source");
        fs::create_dir_all(&copy_dir)?;

        let copy = copy_dir.join(file_name);
        fs::copy(source, &copy)?;
        let mut notes = vec![format!("copied {}", source.display())];

        let sidecar = sidecar_path(source);
        if sidecar.is_file() {
            fs::copy(&sidecar, sidecar_path(&copy))?;
            notes.push(format!("copied {}", sidecar.display()));
        }

        Ok(StageOutput {
            image: GeospatialImage::new(copy, *input.image.srs()),
            notes,
        })
    }
}

pub struct ClipReprojectStage {
    backend: Arc<dyn RasterBackend>,
    target: SpatialReference,
    envelope: Envelope,
}

impl ClipReprojectStage {
    pub fn new(
        backend: Arc<dyn RasterBackend>,
        target: SpatialReference,
        envelope: Envelope,
    ) -> Self {
        Self {
            backend,
            target,
            envelope,
        }
    }
}

impl PreparationStage for ClipReprojectStage {
    fn name(&self) -> &'static str {
        "clip"
    }

    fn execute(&mut self, input: StageInput) -> EnmResult<StageOutput> {
        let dest = stage_path(&input, self.name(), self.backend.intermediate_extension());
        let image = self
            .backend
            .clip_reproject(&input.image, &self.target, &self.envelope, &dest)?;
        Ok(StageOutput {
            image,
            notes: vec![format!("clipped to {} in {}", describe(&self.envelope), self.target)],
        })
    }
}

fn describe(envelope: &Envelope) -> String {
    format!(
        "[{}, {}, {}, {}]",
        envelope.min_x, envelope.min_y, envelope.max_x, envelope.max_y
    )
}

/// Resamples to square pixels using the finer of the two axis sizes.
pub struct ResampleStage {
    backend: Arc<dyn RasterBackend>,
}

impl ResampleStage {
    pub fn new(backend: Arc<dyn RasterBackend>) -> Self {
        Self { backend }
    }
}

impl PreparationStage for ResampleStage {
    fn name(&self) -> &'static str {
        "resample"
    }

    fn execute(&mut self, input: StageInput) -> EnmResult<StageOutput> {
        let (dx, dy) = self.backend.pixel_size(&input.image)?;
        let scale = square_scale(dx, dy);
        let dest = stage_path(&input, self.name(), self.backend.intermediate_extension());
        let image = self.backend.resample(&input.image, scale, &dest)?;
        Ok(StageOutput {
            image,
            notes: vec![format!("resampled {}x{} to {}", dx, dy, scale)],
        })
    }
}

pub struct ConvertStage {
    backend: Arc<dyn RasterBackend>,
    precision: usize,
}

impl ConvertStage {
    pub fn new(backend: Arc<dyn RasterBackend>, precision: usize) -> Self {
        Self { backend, precision }
    }
}

impl PreparationStage for ConvertStage {
    fn name(&self) -> &'static str {
        "convert"
    }

    fn execute(&mut self, input: StageInput) -> EnmResult<StageOutput> {
        let dest = stage_path(&input, self.name(), "asc");
        let image = self.backend.convert(&input.image, &dest, self.precision)?;
        Ok(StageOutput {
            image,
            notes: vec![format!("converted at {} decimals", self.precision)],
        })
    }
}

/// Rewrites not-a-number tokens left by the conversion tool.
pub struct SanitizeStage;

impl PreparationStage for SanitizeStage {
    fn name(&self) -> &'static str {
        "sanitize"
    }

    fn execute(&mut self, input: StageInput) -> EnmResult<StageOutput> {
        let dest = stage_path(&input, self.name(), "asc");
        let replaced = sanitize_nan_tokens(input.image.path(), &dest)?;
        let sidecar = sidecar_path(input.image.path());
        if sidecar.is_file() {
            fs::copy(&sidecar, sidecar_path(&dest))?;
        }
        Ok(StageOutput {
            image: GeospatialImage::new(dest, *input.image.srs()),
            notes: vec![format!("replaced {} not-a-number tokens", replaced)],
        })
    }
}

/// Matches the spellings C runtimes print for NaN: `nan`, `-nan`, `NaN`,
/// `nan(ind)`, `1.#QNAN`, `-1.#IND` and the like.
pub fn is_nan_token(token: &str) -> bool {
    let lower = token
        .trim_start_matches(|c: char| c == '-' || c == '+')
        .to_ascii_lowercase();
    lower == "nan"
        || lower.starts_with("nan(")
        || lower.contains("#qnan")
        || lower.contains("#snan")
        || lower.contains("#ind")
}

/// Streams `src` to `dest` line by line, replacing whole not-a-number tokens
/// with the sentinel. Returns how many tokens were replaced.
pub fn sanitize_nan_tokens(src: &Path, dest: &Path) -> EnmResult<usize> {
    let reader = BufReader::new(File::open(src)?);
    let mut out = BufWriter::new(File::create(dest)?);
    let mut replaced = 0;

    for line in reader.lines() {
        let line = line?;
        if line.split_whitespace().any(is_nan_token) {
            let tokens: Vec<&str> = line
                .split_whitespace()
                .map(|token| {
                    if is_nan_token(token) {
                        replaced += 1;
                        NAN_REPLACEMENT
                    } else {
                        token
                    }
                })
                .collect();
            writeln!(out, "{}", tokens.join(" "))?;
        } else {
            writeln!(out, "{}", line)?;
        }
    }
    out.flush()?;
    Ok(replaced)
}

/// Runs `stages` in order, feeding each output image into the next stage.
pub fn run_chain(
    stages: &mut [Box<dyn PreparationStage>],
    image: GeospatialImage,
    work_dir: &Path,
) -> EnmResult<StageOutput> {
    let mut output = StageOutput {
        image,
        notes: Vec::new(),
    };
    for stage in stages.iter_mut() {
        let input = StageInput {
            image: output.image,
            work_dir: work_dir.to_path_buf(),
        };
        let result = stage.execute(input).map_err(|e| match e {
            EnmError::Raster(message) => {
                EnmError::Raster(format!("{} stage: {}", stage.name(), message))
            }
            other => other,
        })?;
        output.notes.extend(result.notes);
        output.image = result.image;
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::native::NativeBackend;
    use crate::raster::GridRaster;

    #[test]
    fn nan_spellings_are_recognized() {
        for token in ["nan", "-nan", "NaN", "NAN", "nan(ind)", "-nan(ind)", "1.#QNAN", "-1.#IND"] {
            assert!(is_nan_token(token), "{token}");
        }
        for token in ["0.5", "-9999", "nodata_value", "banana", "NODATA_value"] {
            assert!(!is_nan_token(token), "{token}");
        }
    }

    #[test]
    fn sanitize_replaces_whole_tokens_only() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in.asc");
        let dest = dir.path().join("out.asc");
        fs::write(
            &src,
            "ncols 3\nnrows 2\nxllcorner 0\nyllcorner 0\ncellsize 1\nNODATA_value -9999\n\
             1.5 nan 2.5\n-nan(ind) 3.0 NaN\n",
        )
        .unwrap();

        assert_eq!(sanitize_nan_tokens(&src, &dest).unwrap(), 3);
        let text = fs::read_to_string(&dest).unwrap();
        assert!(text.contains("1.5 -9999 2.5\n-9999 3.0 -9999\n"));
        assert!(text.contains("NODATA_value -9999\n"));
        let grid = GridRaster::read(&dest).unwrap();
        assert_eq!(grid.data[[1, 2]], -9999.0);
    }

    #[test]
    fn copy_keeps_original_and_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("bio1.asc");
        fs::write(&source, "ncols 1\nnrows 1\nxllcorner 0\nyllcorner 0\ncellsize 1\n7\n").unwrap();
        fs::write(dir.path().join("bio1.prj"), "GEOGCS[\"WGS 84\"]").unwrap();
        let work_dir = dir.path().join("work");

        let output = CopyStage
            .execute(StageInput {
                image: GeospatialImage::new(&source, SpatialReference::wgs84()),
                work_dir: work_dir.clone(),
            })
            .unwrap();

        assert_eq!(output.image.path(), work_dir.join("source").join("bio1.asc"));
        assert!(work_dir.join("source").join("bio1.prj").is_file());
        assert!(source.is_file());
        assert_eq!(output.notes.len(), 2);
    }

    #[test]
    fn chain_produces_square_sentinel_grid() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("bio2.asc");
        fs::write(
            &source,
            "ncols 4\nnrows 2\nxllcorner 0\nyllcorner 0\ndx 1\ndy 2\nNODATA_value -1\n\
             1 2 3 4\n5 -1 7 8\n",
        )
        .unwrap();
        let work_dir = dir.path().join("work");
        fs::create_dir_all(&work_dir).unwrap();

        let backend: Arc<dyn RasterBackend> = Arc::new(NativeBackend::new());
        let srs = SpatialReference::wgs84();
        let envelope = Envelope::new(0.5, 0.5, 3.5, 3.5, srs);
        let mut stages: Vec<Box<dyn PreparationStage>> = vec![
            Box::new(CopyStage),
            Box::new(ClipReprojectStage::new(backend.clone(), srs, envelope)),
            Box::new(ResampleStage::new(backend.clone())),
            Box::new(ConvertStage::new(backend, 2)),
            Box::new(SanitizeStage),
        ];

        let output = run_chain(&mut stages, GeospatialImage::new(&source, srs), &work_dir).unwrap();
        let grid = GridRaster::read(output.image.path()).unwrap();
        assert!(grid.header.is_square());
        assert_eq!(grid.header.dx, 1.0);
        assert_eq!(grid.header.nodata, Some(-9999.0));
        assert_eq!((grid.header.ncols, grid.header.nrows), (4, 4));
        assert_eq!(grid.data[[2, 1]], -9999.0);
        assert_eq!(grid.data[[0, 3]], 4.0);
        assert_eq!(output.notes.len(), 5);
    }
}
