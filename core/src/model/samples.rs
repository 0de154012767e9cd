//! The modeling tool's samples file: `species,x,y`, presence points only.

use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, Trim, Writer};

use crate::observation::ObservationSet;
use crate::prelude::{EnmError, EnmResult};

/// Writes `<output_dir>/<observation file name>` and returns its path.
///
/// Absences are dropped and blanks in the species name become underscores.
pub fn write_samples_file(observations: &ObservationSet, output_dir: &Path) -> EnmResult<PathBuf> {
    let file_name = observations.path().file_name().ok_or_else(|| {
        EnmError::Configuration(format!(
            "{} has no file name",
            observations.path().display()
        ))
    })?;
    let path = output_dir.join(file_name);
    let species = observations.species().replace(' ', "_");

    let mut writer = Writer::from_path(&path)?;
    writer.write_record(["species", "x", "y"])?;
    for observation in observations.observations().iter().filter(|o| o.is_presence()) {
        let x = observation.x.to_string();
        let y = observation.y.to_string();
        writer.write_record([species.as_str(), x.as_str(), y.as_str()])?;
    }
    writer.flush()?;
    Ok(path)
}

/// Point coordinates from a samples file.
pub fn read_samples_file(path: &Path) -> EnmResult<Vec<(f64, f64)>> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)?;

    let mut points = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map(|pos| pos.line()).unwrap_or_default();
        let coordinate = |index: usize| {
            record
                .get(index)
                .and_then(|value| value.parse::<f64>().ok())
                .ok_or_else(|| EnmError::format(path, format!("line {}: invalid coordinate", line)))
        };
        points.push((coordinate(1)?, coordinate(2)?));
    }
    Ok(points)
}
