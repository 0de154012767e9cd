pub mod envelope;
pub mod projection;
pub mod srs;

pub use envelope::Envelope;
pub use srs::{parse_authority_code, SpatialReference};
