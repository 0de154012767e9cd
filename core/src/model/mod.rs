//! Boundary with the external niche-modeling tool.

pub mod invoker;
pub mod samples;

pub use invoker::{InvokerConfig, ModelInvoker};
pub use samples::{read_samples_file, write_samples_file};
