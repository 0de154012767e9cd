use std::path::PathBuf;

use crate::raster::GeospatialImage;

/// Sentinel written into every prepared grid for pixels without a measurement.
pub const NO_DATA: f32 = -9999.0;

/// Input handed to each preparation stage.
#[derive(Debug, Clone)]
pub struct StageInput {
    pub image: GeospatialImage,
    pub work_dir: PathBuf,
}

/// Output produced by each stage; the image becomes the next stage's input.
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub image: GeospatialImage,
    pub notes: Vec<String>,
}

/// Common error type for the preparation pipeline and the evaluator.
#[derive(thiserror::Error, Debug)]
pub enum EnmError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("format error in {path}: {message}")]
    Format { path: PathBuf, message: String },
    #[error("inconsistent inputs: {0}")]
    Consistency(String),
    #[error("projection error: {0}")]
    Projection(String),
    #[error(
        "cannot compute log likelihood because the sum of all values in the model output \
         is less than or equal to zero (total {total})"
    )]
    DegenerateModel { total: f64 },
    #[error("AICc is undefined for n = {n} occurrences and K = {k} parameters (n - K - 1 <= 0)")]
    InsufficientSamples { n: usize, k: usize },
    #[error("{command} exited with {status}: {stderr}")]
    ExternalTool {
        command: String,
        status: String,
        stderr: String,
    },
    #[error("index {index} out of range for {len} observations")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("chunker is complete; no chunks remain")]
    ChunkerExhausted,
    #[error("raster error: {0}")]
    Raster(String),
    #[error("worker failure: {0}")]
    Worker(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EnmError {
    pub fn format(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        EnmError::Format {
            path: path.into(),
            message: message.into(),
        }
    }
}

pub type EnmResult<T> = Result<T, EnmError>;

/// One step of the per-image preparation chain.
pub trait PreparationStage {
    fn name(&self) -> &'static str;
    fn execute(&mut self, input: StageInput) -> EnmResult<StageOutput>;
}
