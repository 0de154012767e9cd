//! Occurrence observations for one species.
//!
//! The occurrence file is a CSV whose header names the spatial reference:
//!
//! ```text
//! x,y,response,epsg:32612
//! 374187,4124593,1
//! 393543,4100640,0
//! ```

use std::cell::OnceCell;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, Trim};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::prelude::{EnmError, EnmResult};
use crate::spatial::{parse_authority_code, Envelope, SpatialReference};

/// A single occurrence point and its response value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub x: f64,
    pub y: f64,
    pub response: f64,
}

impl Observation {
    pub fn is_presence(&self) -> bool {
        self.response > 0.0
    }
}

/// Parsed occurrence file with a lazily computed envelope.
///
/// Serializes as `{"PathToFile": ..., "Species": ...}`; deserializing
/// re-reads the source file.
#[derive(Debug)]
pub struct ObservationSet {
    path: PathBuf,
    species: String,
    srs: SpatialReference,
    observations: Vec<Observation>,
    envelope: OnceCell<Envelope>,
}

#[derive(Serialize, Deserialize)]
struct PersistedObservationSet<P> {
    #[serde(rename = "PathToFile")]
    path_to_file: P,
    #[serde(rename = "Species")]
    species: String,
}

impl ObservationSet {
    pub fn parse(path: impl AsRef<Path>, species: impl Into<String>) -> EnmResult<Self> {
        let path = path.as_ref().to_path_buf();
        let species = species.into();
        if species.trim().is_empty() {
            return Err(EnmError::Configuration(
                "a species must be specified".to_string(),
            ));
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .from_path(&path)?;
        let mut records = reader.records();

        let header = match records.next() {
            Some(record) => record?,
            None => return Err(EnmError::format(&path, "the observation file is empty")),
        };
        let srs = parse_header(&path, &header)?;

        let mut observations = Vec::new();
        for record in records {
            let record = record?;
            observations.push(parse_row(&path, &record)?);
        }
        if observations.is_empty() {
            return Err(EnmError::format(&path, "the observation file has no data rows"));
        }

        Ok(Self {
            path,
            species,
            srs,
            observations,
            envelope: OnceCell::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn species(&self) -> &str {
        &self.species
    }

    pub fn srs(&self) -> &SpatialReference {
        &self.srs
    }

    pub fn num_observations(&self) -> usize {
        self.observations.len()
    }

    pub fn observation(&self, index: usize) -> EnmResult<&Observation> {
        self.observations
            .get(index)
            .ok_or(EnmError::IndexOutOfRange {
                index,
                len: self.observations.len(),
            })
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// Coordinates of every observation with a positive response.
    pub fn presence_points(&self) -> Vec<(f64, f64)> {
        self.observations
            .iter()
            .filter(|obs| obs.is_presence())
            .map(|obs| (obs.x, obs.y))
            .collect()
    }

    pub fn envelope(&self) -> &Envelope {
        self.envelope.get_or_init(|| {
            let first = &self.observations[0];
            let mut env = Envelope::from_point(first.x, first.y, self.srs);
            for obs in &self.observations[1..] {
                env.expand_to_include(obs.x, obs.y);
            }
            env
        })
    }

    /// Reprojects every point into `target`; a no-op when already there.
    pub fn transform_to(&mut self, target: &SpatialReference) -> EnmResult<()> {
        if self.srs.is_same(target) {
            return Ok(());
        }

        let mut moved = Vec::with_capacity(self.observations.len());
        for obs in &self.observations {
            let (x, y) = self.srs.transform_point(target, obs.x, obs.y)?;
            moved.push(Observation { x, y, ..*obs });
        }

        self.observations = moved;
        self.srs = *target;
        self.envelope = OnceCell::new();
        Ok(())
    }
}

fn parse_header(path: &Path, header: &StringRecord) -> EnmResult<SpatialReference> {
    let first = header.get(0).unwrap_or_default();
    if first.parse::<f64>().is_ok() {
        return Err(EnmError::format(
            path,
            "the observation file must have a header",
        ));
    }
    let srs_field = header.get(3).ok_or_else(|| {
        EnmError::format(
            path,
            "the header must have the form x,y,response,srs:<code>",
        )
    })?;
    let code = parse_authority_code(srs_field).ok_or_else(|| {
        EnmError::format(
            path,
            format!(
                "SRS in header field '{}' must contain a colon then an integer EPSG code",
                srs_field
            ),
        )
    })?;
    SpatialReference::from_epsg(code)
}

fn parse_row(path: &Path, record: &StringRecord) -> EnmResult<Observation> {
    let line = record.position().map(|pos| pos.line()).unwrap_or_default();
    let field = |index: usize, name: &str| -> EnmResult<f64> {
        record
            .get(index)
            .and_then(|value| value.parse::<f64>().ok())
            .ok_or_else(|| {
                EnmError::format(path, format!("line {}: missing or invalid {}", line, name))
            })
    };
    Ok(Observation {
        x: field(0, "x")?,
        y: field(1, "y")?,
        response: field(2, "response")?,
    })
}

impl Serialize for ObservationSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        PersistedObservationSet {
            path_to_file: &self.path,
            species: self.species.clone(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ObservationSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let persisted = PersistedObservationSet::<PathBuf>::deserialize(deserializer)?;
        ObservationSet::parse(persisted.path_to_file, persisted.species)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SPECIES: &str = "Cheat Grass";

    fn write_csv(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn sample_file() -> NamedTempFile {
        write_csv(
            "x,y,pres/abs,epsg:32612\n\
             374187,4124593,1\n\
             393543,4100640,0\n\
             395099,4130094,0\n\
             486130,4202663,1\n\
             501598,4142175,0\n",
        )
    }

    #[test]
    fn parses_rows_in_order() {
        let file = sample_file();
        let obs = ObservationSet::parse(file.path(), SPECIES).unwrap();
        assert_eq!(obs.num_observations(), 5);
        assert_eq!(obs.species(), SPECIES);
        assert_eq!(obs.srs().epsg(), 32612);
        assert_eq!(obs.observation(0).unwrap().x, 374_187.0);
        assert_eq!(obs.observation(1).unwrap().response, 0.0);
        assert_eq!(obs.observation(2).unwrap().y, 4_130_094.0);
        assert_eq!(obs.observation(3).unwrap().response, 1.0);
        assert_eq!(obs.presence_points().len(), 2);
    }

    #[test]
    fn out_of_range_index_fails() {
        let file = sample_file();
        let obs = ObservationSet::parse(file.path(), SPECIES).unwrap();
        assert!(matches!(
            obs.observation(5),
            Err(EnmError::IndexOutOfRange { index: 5, len: 5 })
        ));
    }

    #[test]
    fn envelope_matches_explicit_extremes() {
        let file = sample_file();
        let obs = ObservationSet::parse(file.path(), SPECIES).unwrap();
        let expected = Envelope::new(
            374_187.0,
            4_100_640.0,
            501_598.0,
            4_202_663.0,
            SpatialReference::from_epsg(32612).unwrap(),
        );
        assert!(obs.envelope().equals(&expected, 0.0));
    }

    #[test]
    fn transform_to_same_reference_is_identity() {
        let file = sample_file();
        let mut obs = ObservationSet::parse(file.path(), SPECIES).unwrap();
        let before: Vec<Observation> = obs.observations().to_vec();
        let envelope = *obs.envelope();
        let srs = *obs.srs();
        obs.transform_to(&srs).unwrap();
        assert_eq!(obs.observations(), before.as_slice());
        assert!(obs.envelope().equals(&envelope, 0.0));
    }

    #[test]
    fn transform_to_geographic_moves_points_and_envelope() {
        let file = sample_file();
        let mut obs = ObservationSet::parse(file.path(), SPECIES).unwrap();
        let _ = obs.envelope();
        obs.transform_to(&SpatialReference::wgs84()).unwrap();

        let first = obs.observation(0).unwrap();
        assert!((first.x - -112.418_804_905).abs() < 1e-6);
        assert!((first.y - 37.259_406_381).abs() < 1e-6);
        assert!(obs.srs().is_geographic());

        let env = obs.envelope();
        assert!(env.srs.is_geographic());
        let min_x = obs
            .observations()
            .iter()
            .map(|o| o.x)
            .fold(f64::INFINITY, f64::min);
        assert_eq!(env.min_x, min_x);
    }

    #[test]
    fn transform_there_and_back_restores_coordinates() {
        let file = sample_file();
        let mut obs = ObservationSet::parse(file.path(), SPECIES).unwrap();
        let original: Vec<Observation> = obs.observations().to_vec();
        let utm = *obs.srs();

        obs.transform_to(&SpatialReference::wgs84()).unwrap();
        obs.transform_to(&utm).unwrap();

        for (restored, expected) in obs.observations().iter().zip(&original) {
            assert!((restored.x - expected.x).abs() < 0.01);
            assert!((restored.y - expected.y).abs() < 0.01);
            assert_eq!(restored.response, expected.response);
        }
    }

    #[test]
    fn persisted_form_round_trips() {
        let file = sample_file();
        let obs = ObservationSet::parse(file.path(), SPECIES).unwrap();

        let json = serde_json::to_value(&obs).unwrap();
        let map = json.as_object().unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["Species"], SPECIES);
        assert!(map.contains_key("PathToFile"));

        let restored: ObservationSet = serde_json::from_value(json).unwrap();
        assert_eq!(restored.path(), obs.path());
        assert_eq!(restored.species(), obs.species());
        assert!(restored.srs().is_same(obs.srs()));
        assert!(restored.envelope().equals(obs.envelope(), 0.0));
        assert_eq!(restored.observations(), obs.observations());
    }

    #[test]
    fn missing_header_is_a_format_error() {
        let file = write_csv("374187,4124593,1\n393543,4100640,0\n");
        let err = ObservationSet::parse(file.path(), SPECIES).unwrap_err();
        assert!(matches!(err, EnmError::Format { .. }));
        assert!(err.to_string().contains("must have a header"));
    }

    #[test]
    fn srs_field_without_colon_is_rejected() {
        let file = write_csv("x,y,pres/abs,epsg\n374187,4124593,1\n");
        let err = ObservationSet::parse(file.path(), SPECIES).unwrap_err();
        assert!(err.to_string().contains("must contain a colon"));
    }

    #[test]
    fn non_csv_input_is_rejected() {
        let file = write_csv("# -*- coding: utf-8 -*-\nimport csv\n");
        assert!(ObservationSet::parse(file.path(), SPECIES).is_err());
    }

    #[test]
    fn malformed_row_names_its_line() {
        let file = write_csv("x,y,response,epsg:4326\n-112.4,37.2,1\n-112.5,abc,0\n");
        let err = ObservationSet::parse(file.path(), SPECIES).unwrap_err();
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn species_is_required() {
        let file = sample_file();
        assert!(matches!(
            ObservationSet::parse(file.path(), "  "),
            Err(EnmError::Configuration(_))
        ));
    }
}
