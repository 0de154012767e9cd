//! Model parameter ("lambdas") files.
//!
//! Each row is `name, coefficient[, min, max]`. Summary rows share the file
//! with the fitted features and are not parameters.

use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, Trim};

use crate::prelude::{EnmError, EnmResult};

/// Summary rows that never count towards `K`.
pub const RESERVED_PARAMETERS: [&str; 4] = [
    "linearPredictorNormalizer",
    "densityNormalizer",
    "numBackgroundPoints",
    "entropy",
];

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterEntry {
    pub name: String,
    pub coefficient: f64,
}

impl ParameterEntry {
    pub fn is_reserved(&self) -> bool {
        RESERVED_PARAMETERS.contains(&self.name.as_str())
    }

    /// A fitted parameter: not a summary row and not zeroed out.
    pub fn is_effective(&self) -> bool {
        !self.is_reserved() && self.coefficient != 0.0
    }
}

#[derive(Debug, Clone)]
pub struct ParameterFile {
    path: PathBuf,
    entries: Vec<ParameterEntry>,
}

impl ParameterFile {
    pub fn parse(path: impl AsRef<Path>) -> EnmResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .from_path(&path)?;

        let mut entries = Vec::new();
        for record in reader.records() {
            let record = record?;
            let line = record.position().map(|pos| pos.line()).unwrap_or_default();
            let name = record.get(0).unwrap_or_default();
            if name.is_empty() {
                continue;
            }
            let coefficient = record
                .get(1)
                .and_then(|value| value.parse::<f64>().ok())
                .ok_or_else(|| {
                    EnmError::format(
                        &path,
                        format!("line {}: parameter '{}' has no numeric coefficient", line, name),
                    )
                })?;
            entries.push(ParameterEntry {
                name: name.to_string(),
                coefficient,
            });
        }

        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[ParameterEntry] {
        &self.entries
    }

    /// `K`, the number of effective parameters.
    pub fn parameter_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_effective()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("species.lambdas");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn reserved_rows_and_zero_coefficients_are_not_counted() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "bio1, 1.25, 10.0, 30.0\n\
             bio12, -0.5, 100.0, 900.0\n\
             bio5^2, 0.0, 0.0, 1.0\n\
             linearPredictorNormalizer, 4.2\n\
             densityNormalizer, 112.3\n\
             numBackgroundPoints, 10000\n\
             entropy, 8.1\n",
        );
        let file = ParameterFile::parse(&path).unwrap();
        assert_eq!(file.entries().len(), 7);
        assert_eq!(file.parameter_count(), 2);
        assert!(file.entries()[3].is_reserved());
    }

    #[test]
    fn unparsable_coefficient_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "bio1, 1.0, 0, 1\nbio2, heavy, 0, 1\n");
        match ParameterFile::parse(&path) {
            Err(EnmError::Format { message, .. }) => assert!(message.contains("line 2")),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn empty_file_has_no_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "");
        assert_eq!(ParameterFile::parse(&path).unwrap().parameter_count(), 0);
    }
}
