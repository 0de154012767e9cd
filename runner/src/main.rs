use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use enmcore::spatial::SpatialReference;
use generator::synthetic::{generate_dataset, GeneratorConfig};
use std::path::PathBuf;
use workflow::config::WorkflowConfig;
use workflow::runner::{evaluate_surface, Runner};

mod generator;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Niche-model raster preparation, model runs and AICc scoring")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Normalize every environmental raster into <output-dir>/asc
    Prepare(WorkflowArgs),
    /// Prepare the rasters, write the samples file and run the modeling tool
    Run(WorkflowArgs),
    /// Compute AICc for a model output surface
    Aicc(AiccArgs),
    /// Write a synthetic occurrence file, rasters and parameter file
    Generate(GenerateArgs),
}

#[derive(ClapArgs)]
struct WorkflowArgs {
    /// Load the workflow from YAML; the remaining flags are then ignored
    #[arg(long)]
    workflow: Option<PathBuf>,
    #[arg(long)]
    species: Option<String>,
    /// Occurrence CSV with an x,y,response,epsg:<code> header
    #[arg(long)]
    observations: Option<PathBuf>,
    #[arg(long)]
    image_dir: Option<PathBuf>,
    /// EPSG code shared by every image in --image-dir
    #[arg(short = 'e', long)]
    epsg: Option<u32>,
    /// Image file extension, matched case-insensitively
    #[arg(long, default_value = "asc")]
    extension: String,
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Pooled worker count; 0 prepares images sequentially
    #[arg(long, default_value_t = 0)]
    workers: usize,
}

#[derive(ClapArgs)]
struct AiccArgs {
    /// Model output surface (ASCII grid)
    #[arg(short = 'a', long)]
    surface: PathBuf,
    /// Occurrence file or the model's samples file
    #[arg(short = 'f', long)]
    observations: PathBuf,
    /// Model parameter (lambdas) file
    #[arg(short = 'l', long)]
    lambdas: PathBuf,
    /// EPSG code of the surface
    #[arg(long, default_value_t = 4326)]
    epsg: u32,
}

#[derive(ClapArgs)]
struct GenerateArgs {
    #[arg(long)]
    output_dir: PathBuf,
    #[arg(long, default_value_t = 7)]
    seed: u64,
    #[arg(long, default_value_t = 3)]
    rasters: usize,
    #[arg(long, default_value_t = 60)]
    points: usize,
}

impl WorkflowArgs {
    fn into_config(self) -> anyhow::Result<WorkflowConfig> {
        if let Some(path) = self.workflow {
            return WorkflowConfig::load(path);
        }
        Ok(WorkflowConfig::from_args(
            self.species.context("--species is required without --workflow")?,
            self.observations
                .context("--observations is required without --workflow")?,
            self.image_dir
                .context("--image-dir is required without --workflow")?,
            self.epsg.context("--epsg is required without --workflow")?,
            self.output_dir
                .context("--output-dir is required without --workflow")?,
            self.workers,
        )
        .with_image_extension(self.extension))
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Command::Prepare(workflow) => {
            let runner = Runner::new(workflow.into_config()?);
            let prepared = runner.prepare()?;
            println!(
                "Prepared {} images in {}; samples file {}",
                prepared.images.len(),
                prepared.asc_dir.display(),
                prepared.samples_file.display()
            );
        }
        Command::Run(workflow) => {
            let runner = Runner::new(workflow.into_config()?);
            let prepared = runner.run()?;
            println!(
                "Model run complete over {} images; output in {}",
                prepared.images.len(),
                runner.config().output_dir.display()
            );
        }
        Command::Aicc(aicc) => {
            let srs = SpatialReference::from_epsg(aicc.epsg)
                .with_context(|| format!("resolving --epsg {}", aicc.epsg))?;
            println!("ASC file: {}", aicc.surface.display());
            println!("Lambda file: {}", aicc.lambdas.display());
            println!("Observation file: {}", aicc.observations.display());
            let evaluation =
                evaluate_surface(&aicc.surface, srs, &aicc.lambdas, &aicc.observations)?;
            println!(
                "AICc: {} (log likelihood {}, n {}, K {})",
                evaluation.aicc, evaluation.log_likelihood, evaluation.n, evaluation.k
            );
        }
        Command::Generate(generate) => {
            let config = GeneratorConfig {
                seed: generate.seed,
                rasters: generate.rasters,
                points: generate.points,
                ..Default::default()
            };
            let dataset = generate_dataset(&config, &generate.output_dir)?;
            println!(
                "Wrote {} rasters to {}, observations {}, parameters {}",
                dataset.images.len(),
                dataset.image_dir.display(),
                dataset.observation_file.display(),
                dataset.parameter_file.display()
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepare_args(extra: &[&str]) -> WorkflowArgs {
        let mut argv = vec![
            "enm",
            "prepare",
            "--species",
            "Sage Sparrow",
            "--observations",
            "obs.csv",
            "--image-dir",
            "images",
            "--output-dir",
            "out",
        ];
        argv.extend_from_slice(extra);
        match Args::try_parse_from(argv).unwrap().command {
            Command::Prepare(workflow) => workflow,
            _ => panic!("expected the prepare command"),
        }
    }

    #[test]
    fn flags_carry_image_reference_and_extension() {
        let cfg = prepare_args(&["-e", "32612", "--extension", "tif"])
            .into_config()
            .unwrap();
        assert_eq!(cfg.image_epsg, 32612);
        assert_eq!(cfg.image_extension, "tif");
    }

    #[test]
    fn flags_without_epsg_are_rejected() {
        let err = prepare_args(&[]).into_config().unwrap_err();
        assert!(err.to_string().contains("--epsg"));
    }
}
