//! # Mutual Hazard Networks
//!
//! A mutual hazard network models how acquired genetic events raise or
//! lower each other's hazard during tumor progression, fit to
//! cross-sectional mutation data. Two training formulations are provided:
//! the classical state-space variant (`cMHN`), which observes every tumor
//! at unit rate, and the omega variant (`oMHN`), which additionally learns
//! how each acquired event distorts the rate at which tumors come under
//! observation.
//!
//! The [`driver`] module wires the pieces into the reproduction sequence
//! this crate exists for: load a cohort, select a regularization strength
//! by cross-validation, train both variants under the symmetric-sparsity
//! penalty, and persist the fitted networks as labeled CSV matrices.

pub mod data;
pub mod driver;
pub mod fit;
pub mod lambda;
pub mod model;
pub mod penalty;
pub mod statespace;

pub use data::{MutationData, load_mutation_matrix};
pub use fit::{FitConfig, train};
pub use lambda::{LambdaGrid, find_lambda, select_lambda};
pub use model::{MhnModel, ModelKind};
pub use penalty::Penalty;
