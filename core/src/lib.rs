//! Core raster preparation and model evaluation for ecological niche model runs.
//!
//! Heterogeneous environmental rasters are normalized into a common spatial
//! reference, clip window and square pixel grid before the modeling tool runs,
//! and the tool's output surface is scored against the occurrence points with
//! a streaming AICc computation.

pub mod evaluation;
pub mod external;
pub mod math;
pub mod model;
pub mod observation;
pub mod prelude;
pub mod processing;
pub mod raster;
pub mod spatial;
pub mod telemetry;

pub use prelude::{EnmError, EnmResult, NO_DATA};
