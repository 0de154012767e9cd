pub mod chunker;
pub mod geotransform;
pub mod grid;
pub mod image;

pub use chunker::{Chunker, RasterChunk};
pub use geotransform::GeoTransform;
pub use grid::{GridHeader, GridRaster, GridReader};
pub use image::{GeospatialImage, PixelSample};
