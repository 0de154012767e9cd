pub mod backend;
pub mod executor;
pub mod gdal;
pub mod native;
pub mod orchestrator;
pub mod stages;
pub mod unit;

pub use backend::{square_scale, RasterBackend};
pub use executor::{Executor, InProcessExecutor, PooledExecutor, TaskGroup};
pub use gdal::{GdalBackend, GdalTools};
pub use native::NativeBackend;
pub use orchestrator::PreparationOrchestrator;
pub use stages::{
    ClipReprojectStage, ConvertStage, CopyStage, ResampleStage, SanitizeStage,
};
pub use unit::{PreparationUnit, PreparationWorker, UnitDescriptor, DEFAULT_PRECISION};
