//! # Mutation Matrix Loading and Validation
//!
//! This module is the exclusive entry point for user-provided tumor data.
//! It reads CSV matrices of per-sample mutation indicators (rows = samples,
//! columns = genetic events), validates them against a strict 0/1 schema,
//! and produces the compact bitmask representation consumed by the
//! likelihood core.
//!
//! - Strict schema: every data cell must be `0` or `1`. Anything else is
//!   assumed to be a user-input error and is reported with row and column
//!   context.
//! - Index column: TCGA exports carry an unnamed leading column of sample
//!   identifiers. A file whose first header field is empty is treated as
//!   having one, and that column is skipped.

use ndarray::Array1;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Hard cap on the number of genetic events per dataset. The likelihood of
/// a single sample is evaluated on the lattice of subsets of its mutations,
/// so cost grows as `2^k` in the per-sample mutation count.
pub const MAX_EVENTS: usize = 25;

/// A comprehensive error type for all data loading and validation failures.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV parsing failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("the input file contains no event columns")]
    NoEvents,
    #[error("the input file contains no sample rows")]
    NoSamples,
    #[error("the input has {found} event columns, but at most {} are supported", MAX_EVENTS)]
    TooManyEvents { found: usize },
    #[error("row {row}, column '{column}': expected a 0/1 mutation indicator, found '{value}'")]
    NonBinaryValue {
        row: usize,
        column: String,
        value: String,
    },
    #[error("genotype mask {mask:#b} addresses events beyond the {events} declared columns")]
    GenotypeOutOfRange { mask: u32, events: usize },
}

/// A validated cohort of tumor samples over a fixed set of genetic events.
///
/// Each sample is stored as a bitmask over the event columns, bit `j` set
/// when event `j` was observed in that sample.
#[derive(Debug, Clone)]
pub struct MutationData {
    event_names: Vec<String>,
    genotypes: Vec<u32>,
}

impl MutationData {
    /// Builds a cohort from parts, enforcing the schema invariants.
    pub fn new(event_names: Vec<String>, genotypes: Vec<u32>) -> Result<Self, DataError> {
        if event_names.is_empty() {
            return Err(DataError::NoEvents);
        }
        if event_names.len() > MAX_EVENTS {
            return Err(DataError::TooManyEvents {
                found: event_names.len(),
            });
        }
        if genotypes.is_empty() {
            return Err(DataError::NoSamples);
        }
        let n = event_names.len();
        for &mask in &genotypes {
            if mask >> n != 0 {
                return Err(DataError::GenotypeOutOfRange { mask, events: n });
            }
        }
        Ok(Self {
            event_names,
            genotypes,
        })
    }

    pub fn n_samples(&self) -> usize {
        self.genotypes.len()
    }

    pub fn n_events(&self) -> usize {
        self.event_names.len()
    }

    pub fn event_names(&self) -> &[String] {
        &self.event_names
    }

    pub fn genotypes(&self) -> &[u32] {
        &self.genotypes
    }

    /// Marginal frequency of each event across the cohort.
    pub fn frequencies(&self) -> Array1<f64> {
        let n = self.n_events();
        let mut counts = vec![0usize; n];
        for &mask in &self.genotypes {
            let mut bits = mask;
            while bits != 0 {
                counts[bits.trailing_zeros() as usize] += 1;
                bits &= bits - 1;
            }
        }
        let total = self.n_samples() as f64;
        Array1::from_iter(counts.into_iter().map(|c| c as f64 / total))
    }

    /// Deduplicated genotypes with their multiplicities, in ascending mask
    /// order. The likelihood of a cohort only depends on these counts.
    pub fn unique_weighted(&self) -> Vec<(u32, f64)> {
        let mut counts: BTreeMap<u32, f64> = BTreeMap::new();
        for &mask in &self.genotypes {
            *counts.entry(mask).or_insert(0.0) += 1.0;
        }
        counts.into_iter().collect()
    }

    /// Row selection, used to carve cross-validation folds. Indices must be
    /// in bounds and non-empty.
    pub fn subset(&self, indices: &[usize]) -> MutationData {
        MutationData {
            event_names: self.event_names.clone(),
            genotypes: indices.iter().map(|&i| self.genotypes[i]).collect(),
        }
    }
}

/// Loads and validates a mutation matrix for model training.
pub fn load_mutation_matrix(path: &Path) -> Result<MutationData, DataError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;
    let headers = reader.headers()?.clone();
    let skip = usize::from(headers.get(0).is_some_and(str::is_empty));
    let event_names: Vec<String> = headers.iter().skip(skip).map(str::to_owned).collect();
    if event_names.is_empty() {
        return Err(DataError::NoEvents);
    }
    if event_names.len() > MAX_EVENTS {
        return Err(DataError::TooManyEvents {
            found: event_names.len(),
        });
    }

    let mut genotypes = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record?;
        let mut mask = 0u32;
        for (col, field) in record.iter().skip(skip).enumerate() {
            match field {
                "0" => {}
                "1" => mask |= 1 << col,
                other => {
                    return Err(DataError::NonBinaryValue {
                        // 1-based, counting the header row
                        row: idx + 2,
                        column: event_names.get(col).cloned().unwrap_or_default(),
                        value: other.to_string(),
                    });
                }
            }
        }
        genotypes.push(mask);
    }
    MutationData::new(event_names, genotypes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write");
        file
    }

    #[test]
    fn loads_plain_matrix() {
        let file = write_csv("TP53,KRAS,APC\n1,0,1\n0,0,0\n1,1,1\n");
        let data = load_mutation_matrix(file.path()).unwrap();
        assert_eq!(data.n_samples(), 3);
        assert_eq!(data.n_events(), 3);
        assert_eq!(data.event_names(), ["TP53", "KRAS", "APC"]);
        assert_eq!(data.genotypes(), [0b101, 0b000, 0b111]);
    }

    #[test]
    fn skips_unnamed_index_column() {
        let file = write_csv(",TP53,KRAS\nTCGA-01,1,0\nTCGA-02,0,1\n");
        let data = load_mutation_matrix(file.path()).unwrap();
        assert_eq!(data.n_events(), 2);
        assert_eq!(data.genotypes(), [0b01, 0b10]);
    }

    #[test]
    fn rejects_non_binary_cell() {
        let file = write_csv("TP53,KRAS\n1,0\n2,1\n");
        let err = load_mutation_matrix(file.path()).unwrap_err();
        match err {
            DataError::NonBinaryValue { row, column, value } => {
                assert_eq!(row, 3);
                assert_eq!(column, "TP53");
                assert_eq!(value, "2");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_empty_matrix() {
        let file = write_csv("TP53,KRAS\n");
        assert!(matches!(
            load_mutation_matrix(file.path()),
            Err(DataError::NoSamples)
        ));
    }

    #[test]
    fn unique_weighted_counts_duplicates() {
        let data = MutationData::new(
            vec!["A".into(), "B".into()],
            vec![0b01, 0b01, 0b11, 0b00],
        )
        .unwrap();
        assert_eq!(
            data.unique_weighted(),
            vec![(0b00, 1.0), (0b01, 2.0), (0b11, 1.0)]
        );
    }

    #[test]
    fn frequencies_count_set_bits() {
        let data = MutationData::new(
            vec!["A".into(), "B".into()],
            vec![0b01, 0b01, 0b11, 0b00],
        )
        .unwrap();
        let freqs = data.frequencies();
        assert_eq!(freqs[0], 0.75);
        assert_eq!(freqs[1], 0.25);
    }

    #[test]
    fn subset_selects_rows() {
        let data = MutationData::new(
            vec!["A".into(), "B".into()],
            vec![0b01, 0b10, 0b11],
        )
        .unwrap();
        let picked = data.subset(&[2, 0]);
        assert_eq!(picked.genotypes(), [0b11, 0b01]);
        assert_eq!(picked.event_names(), data.event_names());
    }

    #[test]
    fn rejects_out_of_range_genotype() {
        let err = MutationData::new(vec!["A".into()], vec![0b10]).unwrap_err();
        assert!(matches!(err, DataError::GenotypeOutOfRange { .. }));
    }
}
