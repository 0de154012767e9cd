use crate::workflow::config::WorkflowConfig;
use anyhow::Context;
use enmcore::evaluation::{load_occurrence_points, Evaluation, ModelEvaluator};
use enmcore::model::{write_samples_file, ModelInvoker};
use enmcore::observation::ObservationSet;
use enmcore::processing::{PreparationOrchestrator, PreparationWorker};
use enmcore::raster::GeospatialImage;
use enmcore::spatial::SpatialReference;
use log::info;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Outputs of the preparation step that the model run consumes.
pub struct PreparedRun {
    pub images: Vec<PathBuf>,
    pub asc_dir: PathBuf,
    pub samples_file: PathBuf,
}

#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Prepares every image and writes the samples file next to them.
    pub fn prepare(&self) -> anyhow::Result<PreparedRun> {
        let config = &self.config;
        let mut observations = ObservationSet::parse(&config.observation_file, &config.species)
            .with_context(|| {
                format!("reading observations {}", config.observation_file.display())
            })?;
        let images = config.discover_images().context("collecting images")?;
        info!(
            "{} images with extension {} found in {}",
            images.len(),
            config.image_extension,
            config.image_dir.display()
        );

        let worker = Arc::new(PreparationWorker::new(
            config.backend.build(),
            config.backend.precision(),
        ));
        let executor = config.executor.build()?;
        let orchestrator = PreparationOrchestrator::new(
            images,
            &mut observations,
            &config.output_dir,
            executor,
            worker,
        )
        .context("validating preparation inputs")?;

        let images = orchestrator
            .prepare_images()
            .context("preparing images")?;
        let samples_file = write_samples_file(&observations, &config.output_dir)
            .context("writing samples file")?;

        Ok(PreparedRun {
            images,
            asc_dir: orchestrator.asc_dir().to_path_buf(),
            samples_file,
        })
    }

    /// Prepares the inputs, then runs the modeling tool over them.
    pub fn run(&self) -> anyhow::Result<PreparedRun> {
        let prepared = self.prepare()?;
        ModelInvoker::new(self.config.model.clone())
            .run(
                &prepared.samples_file,
                &prepared.asc_dir,
                &self.config.output_dir,
            )
            .context("running the model")?;
        Ok(prepared)
    }
}

/// AICc of a model output surface against an occurrence or samples file.
pub fn evaluate_surface(
    surface: &Path,
    surface_srs: SpatialReference,
    parameter_file: &Path,
    occurrence_file: &Path,
) -> anyhow::Result<Evaluation> {
    let points = load_occurrence_points(occurrence_file, &surface_srs)
        .with_context(|| format!("reading occurrences {}", occurrence_file.display()))?;
    let evaluator = ModelEvaluator::new(GeospatialImage::new(surface, surface_srs), parameter_file);
    evaluator
        .evaluate(&points)
        .with_context(|| format!("evaluating {}", surface.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::synthetic::{generate_dataset, GeneratorConfig};
    use crate::workflow::config::ExecutorConfig;
    use std::fs;

    fn workflow(dir: &Path, workers: usize) -> WorkflowConfig {
        let dataset = generate_dataset(&GeneratorConfig::default(), &dir.join("input")).unwrap();
        let output_dir = dir.join("output");
        fs::create_dir_all(&output_dir).unwrap();
        WorkflowConfig::from_args(
            GeneratorConfig::default().species,
            dataset.observation_file,
            dataset.image_dir,
            4326,
            output_dir,
            workers,
        )
    }

    #[test]
    fn runner_prepares_synthetic_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = workflow(dir.path(), 2);
        assert_eq!(cfg.executor, ExecutorConfig::Pooled { workers: 2 });
        let runner = Runner::new(cfg.clone());

        let prepared = runner.prepare().unwrap();
        assert_eq!(prepared.images.len(), GeneratorConfig::default().rasters);
        assert!(prepared.images.iter().all(|p| p.starts_with(&prepared.asc_dir)));
        assert!(prepared.samples_file.is_file());
        let samples = fs::read_to_string(&prepared.samples_file).unwrap();
        assert!(samples.starts_with("species,x,y\nSage_Sparrow,"));

        let again = runner.prepare().unwrap();
        assert_eq!(again.images, prepared.images);
    }

    #[cfg(unix)]
    #[test]
    fn run_invokes_configured_model_command() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = workflow(dir.path(), 0);
        cfg.model.java = PathBuf::from("true");
        assert!(Runner::new(cfg).run().is_ok());
    }

    #[test]
    fn prepared_surface_can_be_scored() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = workflow(dir.path(), 0);
        let prepared = Runner::new(cfg.clone()).prepare().unwrap();
        let lambdas = dir.path().join("input").join("Sage_Sparrow.lambdas");

        let evaluation = evaluate_surface(
            &prepared.images[0],
            SpatialReference::wgs84(),
            &lambdas,
            &cfg.observation_file,
        )
        .unwrap();
        assert_eq!(evaluation.k, 3);
        assert!(evaluation.n > evaluation.k + 1);
        assert!(evaluation.aicc.is_finite());
    }
}
