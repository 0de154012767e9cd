//! Scoring a fitted model's output surface against occurrence points.

pub mod evaluator;
pub mod parameters;

pub use evaluator::{load_occurrence_points, Evaluation, Likelihood, ModelEvaluator};
pub use parameters::{ParameterEntry, ParameterFile, RESERVED_PARAMETERS};
