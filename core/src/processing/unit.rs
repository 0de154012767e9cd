//! One image's idempotent preparation, and the descriptor that carries it
//! across the worker boundary.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::prelude::{EnmError, EnmResult, PreparationStage};
use crate::processing::backend::RasterBackend;
use crate::processing::stages::{
    run_chain, sidecar_path, ClipReprojectStage, ConvertStage, CopyStage, ResampleStage,
    SanitizeStage,
};
use crate::raster::GeospatialImage;
use crate::spatial::{Envelope, SpatialReference};
use crate::telemetry::{LogManager, MetricsRecorder};

/// Decimal places written into prepared grids unless configured otherwise.
pub const DEFAULT_PRECISION: usize = 6;

/// Directory, inside the output directory, holding per-unit working directories.
pub const WORK_DIR: &str = ".work";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeDescriptor {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub srs: String,
}

impl EnvelopeDescriptor {
    pub fn from_envelope(envelope: &Envelope) -> Self {
        Self {
            min_x: envelope.min_x,
            min_y: envelope.min_y,
            max_x: envelope.max_x,
            max_y: envelope.max_y,
            srs: envelope.srs.to_proj4(),
        }
    }

    pub fn to_envelope(&self) -> EnmResult<Envelope> {
        let srs = SpatialReference::from_proj4(&self.srs)?;
        Ok(Envelope::new(self.min_x, self.min_y, self.max_x, self.max_y, srs))
    }
}

/// Plain-value description of one preparation unit.
///
/// Spatial references travel as PROJ.4 strings and are rebuilt on the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitDescriptor {
    pub source: PathBuf,
    pub source_srs: String,
    pub target_srs: String,
    pub envelope: EnvelopeDescriptor,
    pub output_dir: PathBuf,
}

impl UnitDescriptor {
    pub fn new(
        image: &GeospatialImage,
        target: &SpatialReference,
        envelope: &Envelope,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source: image.path().to_path_buf(),
            source_srs: image.srs().to_proj4(),
            target_srs: target.to_proj4(),
            envelope: EnvelopeDescriptor::from_envelope(envelope),
            output_dir: output_dir.into(),
        }
    }

    fn stem(&self) -> EnmResult<&str> {
        self.source
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| {
                EnmError::Configuration(format!("{} has no file name", self.source.display()))
            })
    }

    /// `<output_dir>/<stem>.asc`; depends only on the source's base name.
    pub fn output_path(&self) -> EnmResult<PathBuf> {
        Ok(self.output_dir.join(format!("{}.asc", self.stem()?)))
    }

    pub fn work_dir(&self) -> EnmResult<PathBuf> {
        Ok(self.output_dir.join(WORK_DIR).join(self.stem()?))
    }

    pub fn encode(&self) -> EnmResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(json: &str) -> EnmResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Rebuilds live spatial references from the descriptor.
    pub fn resolve(&self) -> EnmResult<PreparationUnit> {
        Ok(PreparationUnit {
            image: GeospatialImage::new(&self.source, SpatialReference::from_proj4(&self.source_srs)?),
            target: SpatialReference::from_proj4(&self.target_srs)?,
            envelope: self.envelope.to_envelope()?,
            output_path: self.output_path()?,
            work_dir: self.work_dir()?,
        })
    }
}

/// A descriptor with its spatial references resolved, ready to run.
#[derive(Debug, Clone)]
pub struct PreparationUnit {
    pub image: GeospatialImage,
    pub target: SpatialReference,
    pub envelope: Envelope,
    pub output_path: PathBuf,
    pub work_dir: PathBuf,
}

/// Runs preparation units; one instance is shared by every worker.
pub struct PreparationWorker {
    backend: Arc<dyn RasterBackend>,
    precision: usize,
    metrics: Arc<MetricsRecorder>,
    logger: LogManager,
}

impl PreparationWorker {
    pub fn new(backend: Arc<dyn RasterBackend>, precision: usize) -> Self {
        Self {
            backend,
            precision,
            metrics: Arc::new(MetricsRecorder::new()),
            logger: LogManager::new("prepare"),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.metrics
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Prepares one image, or returns the existing output untouched.
    pub fn prepare(&self, descriptor: &UnitDescriptor) -> EnmResult<PathBuf> {
        let output_path = descriptor.output_path()?;
        if output_path.exists() {
            self.logger.record(&format!(
                "{} was previously prepared",
                descriptor.source.display()
            ));
            self.metrics.record_skipped();
            return Ok(output_path);
        }

        let unit = descriptor.resolve()?;
        self.logger
            .record(&format!("Processing {}", unit.image.path().display()));
        match self.run(&unit) {
            Ok(path) => {
                self.metrics.record_prepared();
                Ok(path)
            }
            Err(e) => {
                self.metrics.record_failed();
                self.logger.warn(&format!(
                    "{} failed: {}; intermediates kept in {}",
                    unit.image.path().display(),
                    e,
                    unit.work_dir.display()
                ));
                Err(e)
            }
        }
    }

    fn run(&self, unit: &PreparationUnit) -> EnmResult<PathBuf> {
        match fs::remove_dir_all(&unit.work_dir) {
            Err(e) if e.kind() != ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }
        fs::create_dir_all(&unit.work_dir)?;

        let mut stages: Vec<Box<dyn PreparationStage>> = vec![
            Box::new(CopyStage),
            Box::new(ClipReprojectStage::new(
                Arc::clone(&self.backend),
                unit.target,
                unit.envelope,
            )),
            Box::new(ResampleStage::new(Arc::clone(&self.backend))),
            Box::new(ConvertStage::new(Arc::clone(&self.backend), self.precision)),
            Box::new(SanitizeStage),
        ];
        let output = run_chain(&mut stages, unit.image.clone(), &unit.work_dir)?;
        for note in &output.notes {
            self.logger.detail(note);
        }

        publish(output.image.path(), &unit.output_path)?;
        self.discard_work_dir(&unit.work_dir);
        Ok(unit.output_path.clone())
    }

    /// Removes a published unit's working directory. The output is already in
    /// place, so a failure here is only logged.
    fn discard_work_dir(&self, work_dir: &Path) -> bool {
        match fs::remove_dir_all(work_dir) {
            Ok(()) => true,
            Err(e) => {
                self.logger.warn(&format!(
                    "could not remove working directory {}: {}",
                    work_dir.display(),
                    e
                ));
                false
            }
        }
    }
}

/// Moves the finished grid into place; the sidecar goes first so a visible
/// grid is always complete.
fn publish(prepared: &Path, output_path: &Path) -> EnmResult<()> {
    let sidecar = sidecar_path(prepared);
    if sidecar.is_file() {
        fs::rename(&sidecar, sidecar_path(output_path))?;
    }
    fs::rename(prepared, output_path)?;
    Ok(())
}
