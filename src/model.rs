//! # Fitted Network Artifacts
//!
//! The structures here define the public, human-readable format of a
//! trained mutual hazard network. An artifact is a labeled CSV matrix:
//! a header row of event names with an empty corner cell, one row of
//! log-scale hazard parameters per event, and, for the omega variant, a
//! final `Observation` row holding the observation-rate effects. Floats
//! are serialized with shortest round-trip formatting, so identical models
//! produce byte-identical files.

use crate::data::MutationData;
use crate::statespace;
use ndarray::{Array1, Array2};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Row label used for the observation-rate effects in serialized oMHN files.
const OBSERVATION_ROW: &str = "Observation";

/// The two training formulations for a mutual hazard network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    /// Classical state-space formulation, unit observation rate.
    Classical,
    /// Omega formulation with learned observation-rate effects.
    Omega,
}

impl ModelKind {
    /// Short name used in artifact filenames and console output.
    pub fn variant_name(&self) -> &'static str {
        match self {
            ModelKind::Omega => "oMHN",
            ModelKind::Classical => "cMHN",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.variant_name())
    }
}

/// Custom error type for model loading, saving, and quality queries.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("failed to read or write model file: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error in model file: {0}")]
    Csv(#[from] csv::Error),
    #[error("model file has no event columns")]
    NoEvents,
    #[error(
        "model file has {rows} value rows for {events} events; expected a square matrix, optionally with one extra observation row"
    )]
    MalformedShape { rows: usize, events: usize },
    #[error("row {row}: label '{found}' does not match expected label '{expected}'")]
    LabelMismatch {
        row: usize,
        found: String,
        expected: String,
    },
    #[error("row {row}: could not parse '{value}' as a number")]
    BadNumber { row: usize, value: String },
    #[error("data has {found} events, but the model was trained on {expected}")]
    MismatchedEvents { found: usize, expected: usize },
}

/// A fitted mutual hazard network. Produced by training, persisted to a
/// CSV artifact, and queryable for the likelihood of held-out cohorts.
#[derive(Debug, Clone)]
pub struct MhnModel {
    kind: ModelKind,
    event_names: Vec<String>,
    theta: Array2<f64>,
    omega: Option<Array1<f64>>,
}

impl MhnModel {
    pub(crate) fn new(
        kind: ModelKind,
        event_names: Vec<String>,
        theta: Array2<f64>,
        omega: Option<Array1<f64>>,
    ) -> Self {
        debug_assert_eq!(theta.nrows(), event_names.len());
        debug_assert_eq!(theta.ncols(), event_names.len());
        debug_assert_eq!(omega.is_some(), kind == ModelKind::Omega);
        Self {
            kind,
            event_names,
            theta,
            omega,
        }
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn n_events(&self) -> usize {
        self.event_names.len()
    }

    pub fn event_names(&self) -> &[String] {
        &self.event_names
    }

    /// Log-scale hazard matrix, `n x n`.
    pub fn theta(&self) -> &Array2<f64> {
        &self.theta
    }

    /// Observation-rate effects; present exactly for the omega variant.
    pub fn omega(&self) -> Option<&Array1<f64>> {
        self.omega.as_ref()
    }

    /// Log-likelihood of a cohort under this network.
    pub fn log_likelihood(&self, data: &MutationData) -> Result<f64, ModelError> {
        if data.n_events() != self.event_names.len() {
            return Err(ModelError::MismatchedEvents {
                found: data.n_events(),
                expected: self.event_names.len(),
            });
        }
        Ok(statespace::data_log_likelihood(
            &self.theta,
            self.omega.as_ref(),
            &data.unique_weighted(),
        ))
    }

    /// Saves the network to a labeled CSV matrix.
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let mut writer = csv::Writer::from_path(path)?;
        let mut buffer = ryu::Buffer::new();
        let n = self.event_names.len();

        let mut header = Vec::with_capacity(n + 1);
        header.push(String::new());
        header.extend(self.event_names.iter().cloned());
        writer.write_record(&header)?;

        for (i, name) in self.event_names.iter().enumerate() {
            let mut record = Vec::with_capacity(n + 1);
            record.push(name.clone());
            for j in 0..n {
                record.push(buffer.format(self.theta[[i, j]]).to_string());
            }
            writer.write_record(&record)?;
        }
        if let Some(effects) = &self.omega {
            let mut record = Vec::with_capacity(n + 1);
            record.push(OBSERVATION_ROW.to_string());
            for j in 0..n {
                record.push(buffer.format(effects[j]).to_string());
            }
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Loads a network from a CSV artifact, inferring the variant from the
    /// row count: `n x n` is classical, `(n+1) x n` carries an observation
    /// row and is the omega variant.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)?;
        let headers = reader.headers()?.clone();
        let event_names: Vec<String> = headers.iter().skip(1).map(str::to_owned).collect();
        if event_names.is_empty() {
            return Err(ModelError::NoEvents);
        }
        let n = event_names.len();

        let mut labels = Vec::new();
        let mut values: Vec<Vec<f64>> = Vec::new();
        for (idx, record) in reader.records().enumerate() {
            let record = record?;
            let row = idx + 2;
            let mut parsed = Vec::with_capacity(n);
            for field in record.iter().skip(1) {
                parsed.push(field.parse::<f64>().map_err(|_| ModelError::BadNumber {
                    row,
                    value: field.to_string(),
                })?);
            }
            labels.push(record.get(0).unwrap_or_default().to_string());
            values.push(parsed);
        }

        let kind = match values.len() {
            rows if rows == n => ModelKind::Classical,
            rows if rows == n + 1 => ModelKind::Omega,
            rows => return Err(ModelError::MalformedShape { rows, events: n }),
        };
        for (i, expected) in event_names.iter().enumerate() {
            if labels[i] != *expected {
                return Err(ModelError::LabelMismatch {
                    row: i + 2,
                    found: labels[i].clone(),
                    expected: expected.clone(),
                });
            }
        }
        if kind == ModelKind::Omega && labels[n] != OBSERVATION_ROW {
            return Err(ModelError::LabelMismatch {
                row: n + 2,
                found: labels[n].clone(),
                expected: OBSERVATION_ROW.to_string(),
            });
        }

        let theta = Array2::from_shape_fn((n, n), |(i, j)| values[i][j]);
        let omega = (kind == ModelKind::Omega).then(|| Array1::from(values[n].clone()));
        Ok(Self {
            kind,
            event_names,
            theta,
            omega,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MutationData;
    use approx::assert_relative_eq;
    use tempfile::TempDir;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("GENE{i}")).collect()
    }

    fn sample_theta(n: usize) -> Array2<f64> {
        Array2::from_shape_fn((n, n), |(i, j)| 0.1 * (i as f64) - 0.2 * (j as f64))
    }

    #[test]
    fn classical_round_trip_preserves_everything() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("net.csv");
        let model = MhnModel::new(ModelKind::Classical, names(3), sample_theta(3), None);
        model.save(&path).unwrap();

        let loaded = MhnModel::load(&path).unwrap();
        assert_eq!(loaded.kind(), ModelKind::Classical);
        assert_eq!(loaded.event_names(), model.event_names());
        assert!(loaded.omega().is_none());
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(loaded.theta()[[i, j]], model.theta()[[i, j]]);
            }
        }
    }

    #[test]
    fn omega_round_trip_preserves_observation_row() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("net.csv");
        let omega = Array1::from(vec![0.25, -0.5, 0.125]);
        let model = MhnModel::new(
            ModelKind::Omega,
            names(3),
            sample_theta(3),
            Some(omega.clone()),
        );
        model.save(&path).unwrap();

        let loaded = MhnModel::load(&path).unwrap();
        assert_eq!(loaded.kind(), ModelKind::Omega);
        let restored = loaded.omega().unwrap();
        for j in 0..3 {
            assert_eq!(restored[j], omega[j]);
        }
    }

    #[test]
    fn save_is_byte_stable() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("a.csv");
        let second = dir.path().join("b.csv");
        let model = MhnModel::new(ModelKind::Classical, names(4), sample_theta(4), None);
        model.save(&first).unwrap();
        model.save(&second).unwrap();
        assert_eq!(
            std::fs::read(&first).unwrap(),
            std::fs::read(&second).unwrap()
        );
    }

    #[test]
    fn load_rejects_wrong_row_count() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, ",A,B\nA,0.0,0.0\n").unwrap();
        assert!(matches!(
            MhnModel::load(&path),
            Err(ModelError::MalformedShape { rows: 1, events: 2 })
        ));
    }

    #[test]
    fn load_rejects_label_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, ",A,B\nA,0.0,0.0\nC,0.0,0.0\n").unwrap();
        assert!(matches!(
            MhnModel::load(&path),
            Err(ModelError::LabelMismatch { row: 3, .. })
        ));
    }

    #[test]
    fn log_likelihood_rejects_mismatched_events() {
        let model = MhnModel::new(ModelKind::Classical, names(3), sample_theta(3), None);
        let data = MutationData::new(names(2), vec![0b01]).unwrap();
        assert!(matches!(
            model.log_likelihood(&data),
            Err(ModelError::MismatchedEvents {
                found: 2,
                expected: 3
            })
        ));
    }

    #[test]
    fn log_likelihood_matches_statespace() {
        let model = MhnModel::new(ModelKind::Classical, names(2), sample_theta(2), None);
        let data = MutationData::new(names(2), vec![0b01, 0b01, 0b10]).unwrap();
        let expected = 2.0 * statespace::genotype_log_likelihood(model.theta(), None, 0b01)
            + statespace::genotype_log_likelihood(model.theta(), None, 0b10);
        assert_relative_eq!(
            model.log_likelihood(&data).unwrap(),
            expected,
            max_relative = 1e-12
        );
    }
}
