use anyhow::Context;
use enmcore::raster::grid::write_row;
use enmcore::raster::GridHeader;
use enmcore::spatial::SpatialReference;
use enmcore::NO_DATA;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Configuration for generating a synthetic occurrence file and rasters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub species: String,
    pub rasters: usize,
    pub ncols: usize,
    pub nrows: usize,
    /// Upper-left corner of every raster, in degrees.
    pub west: f64,
    pub north: f64,
    pub cell_width: f64,
    pub cell_height: f64,
    pub points: usize,
    pub presence_ratio: f64,
    pub nodata_ratio: f64,
    pub observation_epsg: u32,
    pub seed: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            species: "Sage Sparrow".to_string(),
            rasters: 3,
            ncols: 40,
            nrows: 30,
            west: -113.0,
            north: 38.0,
            cell_width: 0.05,
            cell_height: 0.04,
            points: 60,
            presence_ratio: 0.6,
            nodata_ratio: 0.02,
            observation_epsg: 32612,
            seed: 7,
        }
    }
}

/// Files written by [`generate_dataset`].
#[derive(Debug, Clone)]
pub struct SyntheticDataset {
    pub observation_file: PathBuf,
    pub image_dir: PathBuf,
    pub images: Vec<PathBuf>,
    pub parameter_file: PathBuf,
}

fn write_raster(
    path: &Path,
    config: &GeneratorConfig,
    index: usize,
    rng: &mut StdRng,
) -> anyhow::Result<()> {
    let header = GridHeader::from_origin(
        config.west,
        config.north,
        config.cell_width,
        config.cell_height,
        config.ncols,
        config.nrows,
        Some(NO_DATA),
    );
    let mut out = BufWriter::new(
        File::create(path).with_context(|| format!("creating {}", path.display()))?,
    );
    header.write(&mut out)?;

    let phase = index as f64 * 0.7;
    let mut row_values = Vec::with_capacity(config.ncols);
    for row in 0..config.nrows {
        row_values.clear();
        let v = row as f64 / config.nrows as f64;
        for col in 0..config.ncols {
            let u = col as f64 / config.ncols as f64;
            let value = if rng.gen_bool(config.nodata_ratio) {
                NO_DATA
            } else {
                let wave = (2.0 * PI * u + phase).sin() * (PI * v + phase).cos();
                let jitter = rng.gen_range(-0.02..0.02);
                (0.5 + 0.4 * wave + jitter).max(0.01) as f32
            };
            row_values.push(value);
        }
        write_row(&mut out, row_values.iter().copied(), 4)?;
    }
    out.flush()?;
    Ok(())
}

fn write_observations(
    path: &Path,
    config: &GeneratorConfig,
    rng: &mut StdRng,
) -> anyhow::Result<()> {
    let target = SpatialReference::from_epsg(config.observation_epsg)
        .with_context(|| format!("resolving observation_epsg {}", config.observation_epsg))?;
    let width = config.ncols as f64 * config.cell_width;
    let height = config.nrows as f64 * config.cell_height;

    let mut out = BufWriter::new(
        File::create(path).with_context(|| format!("creating {}", path.display()))?,
    );
    writeln!(out, "x,y,response,epsg:{}", config.observation_epsg)?;
    for _ in 0..config.points {
        // Keep points off the outer tenth so every clip window has margin.
        let lon = config.west + width * rng.gen_range(0.1..0.9);
        let lat = config.north - height * rng.gen_range(0.1..0.9);
        let (x, y) = SpatialReference::wgs84().transform_point(&target, lon, lat)?;
        let response = u8::from(rng.gen_bool(config.presence_ratio));
        writeln!(out, "{:.3},{:.3},{}", x, y, response)?;
    }
    out.flush()?;
    Ok(())
}

fn write_parameters(path: &Path, config: &GeneratorConfig) -> anyhow::Result<()> {
    let mut body = String::new();
    for index in 0..config.rasters {
        // Every third feature is zeroed out, as regularization would.
        let coefficient = if index % 3 == 2 { 0.0 } else { 0.75 - index as f64 * 0.5 };
        body.push_str(&format!("bio{}, {}, 0.01, 0.99\n", index + 1, coefficient));
    }
    body.push_str("bio1^2, 0.125, 0.0001, 0.98\n");
    body.push_str("linearPredictorNormalizer, 4.21\n");
    body.push_str("densityNormalizer, 118.6\n");
    body.push_str(&format!("numBackgroundPoints, {}\n", config.ncols * config.nrows));
    body.push_str("entropy, 6.93\n");
    fs::write(path, body).with_context(|| format!("writing {}", path.display()))
}

/// Writes `<dir>/observations.csv`, `<dir>/images/bioN.asc` and a parameter
/// file named after the species.
pub fn generate_dataset(config: &GeneratorConfig, dir: &Path) -> anyhow::Result<SyntheticDataset> {
    let image_dir = dir.join("images");
    fs::create_dir_all(&image_dir)
        .with_context(|| format!("creating {}", image_dir.display()))?;
    let mut rng = StdRng::seed_from_u64(config.seed);

    let mut images = Vec::with_capacity(config.rasters);
    for index in 0..config.rasters {
        let path = image_dir.join(format!("bio{}.asc", index + 1));
        write_raster(&path, config, index, &mut rng)?;
        images.push(path);
    }

    let observation_file = dir.join("observations.csv");
    write_observations(&observation_file, config, &mut rng)?;

    let parameter_file = dir.join(format!("{}.lambdas", config.species.replace(' ', "_")));
    write_parameters(&parameter_file, config)?;

    Ok(SyntheticDataset {
        observation_file,
        image_dir,
        images,
        parameter_file,
    })
}
