use anyhow::{bail, Context};
use enmcore::model::InvokerConfig;
use enmcore::processing::{
    Executor, GdalBackend, GdalTools, InProcessExecutor, NativeBackend, PooledExecutor,
    RasterBackend, DEFAULT_PRECISION,
};
use enmcore::raster::GeospatialImage;
use enmcore::spatial::SpatialReference;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn default_extension() -> String {
    "asc".to_string()
}

fn default_epsg() -> u32 {
    4326
}

fn default_precision() -> usize {
    DEFAULT_PRECISION
}

/// How preparation units are executed.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ExecutorConfig {
    #[default]
    Sequential,
    Pooled { workers: usize },
}

impl ExecutorConfig {
    /// Zero workers means sequential execution.
    pub fn from_workers(workers: usize) -> Self {
        if workers == 0 {
            ExecutorConfig::Sequential
        } else {
            ExecutorConfig::Pooled { workers }
        }
    }

    pub fn build(&self) -> anyhow::Result<Box<dyn Executor>> {
        Ok(match self {
            ExecutorConfig::Sequential => Box::new(InProcessExecutor::new()),
            ExecutorConfig::Pooled { workers } => Box::new(
                PooledExecutor::new(*workers)
                    .with_context(|| format!("starting pool of {} workers", workers))?,
            ),
        })
    }
}

/// Which raster backend performs the preparation stages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    Native {
        #[serde(default = "default_precision")]
        precision: usize,
    },
    Gdal {
        #[serde(default = "default_precision")]
        precision: usize,
        #[serde(default)]
        tools: GdalTools,
    },
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Native {
            precision: DEFAULT_PRECISION,
        }
    }
}

impl BackendConfig {
    pub fn precision(&self) -> usize {
        match self {
            BackendConfig::Native { precision } | BackendConfig::Gdal { precision, .. } => {
                *precision
            }
        }
    }

    pub fn build(&self) -> Arc<dyn RasterBackend> {
        match self {
            BackendConfig::Native { .. } => Arc::new(NativeBackend::new()),
            BackendConfig::Gdal { tools, .. } => Arc::new(GdalBackend::new(tools.clone())),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub species: String,
    pub observation_file: PathBuf,
    pub image_dir: PathBuf,
    #[serde(default = "default_extension")]
    pub image_extension: String,
    #[serde(default = "default_epsg")]
    pub image_epsg: u32,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub model: InvokerConfig,
}

impl WorkflowConfig {
    /// Reads a YAML workflow; relative paths are taken from the file's directory.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let mut config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        if let Some(base) = path_ref.parent() {
            config.rebase(base);
        }
        Ok(config)
    }

    pub fn from_args(
        species: String,
        observation_file: PathBuf,
        image_dir: PathBuf,
        image_epsg: u32,
        output_dir: PathBuf,
        workers: usize,
    ) -> Self {
        Self {
            species,
            observation_file,
            image_dir,
            image_extension: default_extension(),
            image_epsg,
            output_dir,
            executor: ExecutorConfig::from_workers(workers),
            backend: BackendConfig::default(),
            model: InvokerConfig::default(),
        }
    }

    pub fn with_image_extension(mut self, extension: impl Into<String>) -> Self {
        self.image_extension = extension.into();
        self
    }

    fn rebase(&mut self, base: &Path) {
        for path in [
            &mut self.observation_file,
            &mut self.image_dir,
            &mut self.output_dir,
            &mut self.model.jar,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    pub fn image_srs(&self) -> anyhow::Result<SpatialReference> {
        SpatialReference::from_epsg(self.image_epsg)
            .with_context(|| format!("resolving image_epsg {}", self.image_epsg))
    }

    /// Images in `image_dir` with the configured extension, sorted by name.
    pub fn discover_images(&self) -> anyhow::Result<Vec<GeospatialImage>> {
        if !self.image_dir.is_dir() {
            bail!("{} is an invalid directory", self.image_dir.display());
        }
        let srs = self.image_srs()?;
        let extension = self.image_extension.trim_start_matches('.');

        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.image_dir)
            .with_context(|| format!("listing {}", self.image_dir.display()))?
        {
            let path = entry?.path();
            let matches = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
            if path.is_file() && matches {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths
            .into_iter()
            .map(|path| GeospatialImage::new(path, srs))
            .collect())
    }
}
