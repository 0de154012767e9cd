use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, Trim};

use crate::evaluation::parameters::ParameterFile;
use crate::math::StatsHelper;
use crate::model::read_samples_file;
use crate::observation::ObservationSet;
use crate::prelude::{EnmError, EnmResult};
use crate::raster::{Chunker, GeospatialImage, PixelSample};
use crate::spatial::{parse_authority_code, SpatialReference};
use crate::telemetry::LogManager;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Likelihood {
    pub log_likelihood: f64,
    /// Occurrences that landed on a valid pixel.
    pub n: usize,
    /// Sum of every valid pixel in the output surface.
    pub total: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub aicc: f64,
    pub log_likelihood: f64,
    pub n: usize,
    pub k: usize,
}

/// AICc of one model output surface and its parameter file.
///
/// Holds only paths; the surface is streamed on every call and never held in
/// memory as a whole.
pub struct ModelEvaluator {
    output_raster: GeospatialImage,
    parameter_file: PathBuf,
    logger: LogManager,
}

impl ModelEvaluator {
    pub fn new(output_raster: GeospatialImage, parameter_file: impl Into<PathBuf>) -> Self {
        Self {
            output_raster,
            parameter_file: parameter_file.into(),
            logger: LogManager::new("aicc"),
        }
    }

    pub fn output_raster(&self) -> &GeospatialImage {
        &self.output_raster
    }

    pub fn parameter_file(&self) -> &Path {
        &self.parameter_file
    }

    /// Row-by-row sum of the valid pixels.
    pub fn streamed_total(&self) -> EnmResult<f64> {
        let mut chunker = Chunker::open(self.output_raster.path())?;
        let mut total = 0.0;
        while !chunker.is_complete() {
            total += chunker.get_chunk()?.valid_sum();
        }
        Ok(total)
    }

    /// Log-likelihood of `points`, given in the surface's reference.
    ///
    /// Points off the surface or on no-data pixels are left out of both the
    /// sum and `n`.
    pub fn likelihood(&self, points: &[(f64, f64)]) -> EnmResult<Likelihood> {
        let samples = self.output_raster.sample(points)?;
        let values: Vec<f32> = samples.iter().filter_map(PixelSample::value).collect();
        let outside = samples
            .iter()
            .filter(|s| matches!(s, PixelSample::OutsideRaster))
            .count();
        if values.len() < points.len() {
            self.logger.detail(&format!(
                "{} of {} occurrences excluded ({} outside the surface, {} on no-data)",
                points.len() - values.len(),
                points.len(),
                outside,
                points.len() - values.len() - outside
            ));
        }

        let total = self.streamed_total()?;
        if total <= 0.0 || total.is_nan() {
            return Err(EnmError::DegenerateModel { total });
        }

        Ok(Likelihood {
            log_likelihood: StatsHelper::log_likelihood(&values, total),
            n: values.len(),
            total,
        })
    }

    pub fn parameter_count(&self) -> EnmResult<usize> {
        Ok(ParameterFile::parse(&self.parameter_file)?.parameter_count())
    }

    pub fn evaluate(&self, points: &[(f64, f64)]) -> EnmResult<Evaluation> {
        let likelihood = self.likelihood(points)?;
        let k = self.parameter_count()?;
        let aicc = StatsHelper::aicc(likelihood.log_likelihood, likelihood.n, k)?;
        self.logger.record(&format!(
            "AICc {} (log likelihood {}, n {}, K {})",
            aicc, likelihood.log_likelihood, likelihood.n, k
        ));
        Ok(Evaluation {
            aicc,
            log_likelihood: likelihood.log_likelihood,
            n: likelihood.n,
            k,
        })
    }
}

/// Presence points from either an occurrence file (`x,y,response,epsg:<code>`,
/// reprojected into `raster_srs`) or a samples file (`species,x,y`, assumed
/// to be in `raster_srs` already).
pub fn load_occurrence_points(
    path: &Path,
    raster_srs: &SpatialReference,
) -> EnmResult<Vec<(f64, f64)>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)?;
    let header = match reader.records().next() {
        Some(record) => record?,
        None => return Err(EnmError::format(path, "the occurrence file is empty")),
    };

    if header.get(3).and_then(parse_authority_code).is_some() {
        let species = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "occurrences".to_string());
        let mut observations = ObservationSet::parse(path, species)?;
        observations.transform_to(raster_srs)?;
        Ok(observations.presence_points())
    } else if header
        .get(0)
        .is_some_and(|field| field.eq_ignore_ascii_case("species"))
    {
        read_samples_file(path)
    } else {
        Err(EnmError::format(
            path,
            "expected an x,y,response,epsg:<code> or species,x,y header",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const LAMBDAS: &str = "bio1, 0.8, 0, 30\nbio12, -1.1, 0, 900\nbio5, 0.0, 0, 40\n\
                           linearPredictorNormalizer, 3.2\ndensityNormalizer, 55.0\n\
                           numBackgroundPoints, 10000\nentropy, 7.9\n";

    fn evaluator(dir: &Path, grid: &str) -> ModelEvaluator {
        let raster = dir.join("Cassins_Sparrow.asc");
        fs::write(&raster, grid).unwrap();
        let lambdas = dir.join("Cassins_Sparrow.lambdas");
        fs::write(&lambdas, LAMBDAS).unwrap();
        ModelEvaluator::new(GeospatialImage::new(raster, SpatialReference::wgs84()), lambdas)
    }

    // Upper-left pixel covers x 0..1, y 2..3.
    const SURFACE: &str = "ncols 3\nnrows 3\nxllcorner 0\nyllcorner 0\ncellsize 1\n\
                           NODATA_value -9999\n1 2 3\n4 -9999 6\n7 8 9\n";

    #[test]
    fn likelihood_uses_in_bound_valid_samples() {
        let dir = tempfile::tempdir().unwrap();
        let eval = evaluator(dir.path(), SURFACE);
        let points = [(0.5, 2.5), (2.5, 0.5), (1.5, 1.5), (5.0, 5.0)];

        let likelihood = eval.likelihood(&points).unwrap();
        assert_eq!(likelihood.total, 40.0);
        assert_eq!(likelihood.n, 2);
        let expected = (1.0f64 / 40.0).ln() + (9.0f64 / 40.0).ln();
        assert!((likelihood.log_likelihood - expected).abs() < 1e-12);
    }

    #[test]
    fn raster_away_from_points_counts_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let eval = evaluator(dir.path(), SURFACE);
        let likelihood = eval.likelihood(&[(-10.0, -10.0), (100.0, 1.0)]).unwrap();
        assert_eq!(likelihood.n, 0);
        assert_eq!(likelihood.log_likelihood, 0.0);
        assert_eq!(likelihood.total, 40.0);
    }

    #[test]
    fn all_no_data_surface_is_degenerate() {
        let dir = tempfile::tempdir().unwrap();
        let eval = evaluator(
            dir.path(),
            "ncols 2\nnrows 2\nxllcorner 0\nyllcorner 0\ncellsize 1\n\
             NODATA_value -9999\n-9999 -9999\n-9999 -9999\n",
        );
        assert_eq!(eval.streamed_total().unwrap(), 0.0);
        match eval.likelihood(&[(0.5, 0.5)]) {
            Err(EnmError::DegenerateModel { total }) => assert_eq!(total, 0.0),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn evaluate_combines_likelihood_and_parameter_count() {
        let dir = tempfile::tempdir().unwrap();
        let eval = evaluator(dir.path(), SURFACE);
        let points = [
            (0.5, 2.5),
            (1.5, 2.5),
            (2.5, 2.5),
            (0.5, 1.5),
            (2.5, 1.5),
            (0.5, 0.5),
            (1.5, 0.5),
            (2.5, 0.5),
        ];

        let evaluation = eval.evaluate(&points).unwrap();
        assert_eq!(evaluation.k, 2);
        assert_eq!(evaluation.n, 8);
        let log_l: f64 = [1.0f64, 2.0, 3.0, 4.0, 6.0, 7.0, 8.0, 9.0]
            .iter()
            .map(|v| (v / 40.0).ln())
            .sum();
        let expected = (4.0 - 2.0 * log_l) + 12.0 / 5.0;
        assert!((evaluation.aicc - expected).abs() < 1e-9);
    }

    #[test]
    fn too_few_occurrences_for_the_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let eval = evaluator(dir.path(), SURFACE);
        assert!(matches!(
            eval.evaluate(&[(0.5, 2.5), (2.5, 0.5), (1.5, 0.5)]),
            Err(EnmError::InsufficientSamples { n: 3, k: 2 })
        ));
    }

    #[test]
    fn occurrence_files_are_reprojected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("occurrences.csv");
        fs::write(
            &path,
            "x,y,response,epsg:32612\n374187,4124593,1\n393543,4100640,0\n",
        )
        .unwrap();
        let points = load_occurrence_points(&path, &SpatialReference::wgs84()).unwrap();
        assert_eq!(points.len(), 1);
        assert!((points[0].0 - -112.418_804_9).abs() < 1e-6);
        assert!((points[0].1 - 37.259_406_4).abs() < 1e-6);
    }

    #[test]
    fn samples_files_are_read_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples.csv");
        fs::write(&path, "species,x,y\nsp,-103.5,33.25\n").unwrap();
        let points = load_occurrence_points(&path, &SpatialReference::wgs84()).unwrap();
        assert_eq!(points, vec![(-103.5, 33.25)]);

        let other = dir.path().join("other.csv");
        fs::write(&other, "a,b\n1,2\n").unwrap();
        assert!(load_occurrence_points(&other, &SpatialReference::wgs84()).is_err());
    }
}
