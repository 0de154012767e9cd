use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::observation::ObservationSet;
use crate::prelude::{EnmError, EnmResult};
use crate::processing::executor::Executor;
use crate::processing::unit::{PreparationWorker, UnitDescriptor, WORK_DIR};
use crate::raster::GeospatialImage;
use crate::spatial::{Envelope, SpatialReference};
use crate::telemetry::LogManager;

/// Name of the directory, inside the output directory, holding prepared grids.
pub const ASC_DIR: &str = "asc";

/// Prepares a batch of images that share one spatial reference, clipped to
/// the envelope of the observations.
pub struct PreparationOrchestrator {
    images: Vec<GeospatialImage>,
    srs: SpatialReference,
    envelope: Envelope,
    output_dir: PathBuf,
    asc_dir: PathBuf,
    executor: Box<dyn Executor>,
    worker: Arc<PreparationWorker>,
    logger: LogManager,
}

impl PreparationOrchestrator {
    /// Validates the batch and reprojects `observations` into the images'
    /// reference.
    pub fn new(
        images: Vec<GeospatialImage>,
        observations: &mut ObservationSet,
        output_dir: impl Into<PathBuf>,
        executor: Box<dyn Executor>,
        worker: Arc<PreparationWorker>,
    ) -> EnmResult<Self> {
        let output_dir = output_dir.into();
        if !output_dir.is_dir() {
            return Err(EnmError::Configuration(format!(
                "output directory {} does not exist",
                output_dir.display()
            )));
        }

        let srs = match images.first() {
            Some(image) => *image.srs(),
            None => {
                return Err(EnmError::Configuration(
                    "no images were given to prepare".to_string(),
                ))
            }
        };
        if let Some(stray) = images.iter().find(|image| !image.srs().is_same(&srs)) {
            return Err(EnmError::Consistency(format!(
                "image {} is in {}, not {} like the others",
                stray.path().display(),
                stray.srs(),
                srs
            )));
        }

        observations.transform_to(&srs)?;
        let envelope = *observations.envelope();

        let asc_dir = output_dir.join(ASC_DIR);
        match fs::create_dir(&asc_dir) {
            Err(e) if e.kind() != ErrorKind::AlreadyExists => return Err(e.into()),
            _ => {}
        }

        Ok(Self {
            images,
            srs,
            envelope,
            output_dir,
            asc_dir,
            executor,
            worker,
            logger: LogManager::new("orchestrator"),
        })
    }

    pub fn images(&self) -> &[GeospatialImage] {
        &self.images
    }

    pub fn srs(&self) -> &SpatialReference {
        &self.srs
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn asc_dir(&self) -> &Path {
        &self.asc_dir
    }

    pub fn descriptors(&self) -> Vec<UnitDescriptor> {
        self.images
            .iter()
            .map(|image| UnitDescriptor::new(image, &self.srs, &self.envelope, &self.asc_dir))
            .collect()
    }

    /// Prepared grid paths, in the order the images were given.
    pub fn prepare_images(&self) -> EnmResult<Vec<PathBuf>> {
        self.logger.record(&format!(
            "preparing {} images in {} with the {} executor and {} backend",
            self.images.len(),
            self.srs,
            self.executor.name(),
            self.worker.backend_name()
        ));
        let result = self
            .executor
            .submit_and_wait(self.descriptors(), Arc::clone(&self.worker));
        self.remove_empty_work_root();

        let metrics = self.worker.metrics().snapshot();
        self.logger.record(&format!(
            "prepared {}, previously prepared {}, failed {}",
            metrics.prepared, metrics.skipped, metrics.failed
        ));
        result
    }

    /// Drops `<asc>/.work` once no unit has intermediates left in it, so the
    /// modeling tool only sees prepared grids.
    fn remove_empty_work_root(&self) {
        let work_root = self.asc_dir.join(WORK_DIR);
        match fs::remove_dir(&work_root) {
            Err(e) if e.kind() != ErrorKind::NotFound => self.logger.detail(&format!(
                "keeping {}: {}",
                work_root.display(),
                e
            )),
            _ => {}
        }
    }
}
