//! The ANI family of neural-network interatomic potentials.
//!
//! An ANI potential turns each atom's neighbourhood into an atomic environment vector
//! ([`aev`]), feeds it through a per-species network ([`network`]), and sums the atomic
//! outputs together with per-species self energies. A published potential is an ensemble of
//! independently trained sub-models ([`model`]) whose spread estimates the prediction
//! uncertainty. The closed set of supported potentials lives in [`parameterization`], and
//! [`loader`] reads their weights from a model directory.

pub mod aev;
pub mod loader;
pub mod model;
pub mod network;
pub mod parameterization;

#[cfg(test)]
pub(crate) mod testing;

pub use loader::{ModelLoadError, load};
pub use model::{AniModel, EvaluationError, MoleculeEvaluation};
pub use parameterization::{MODEL_FAMILY, Parameterization, SelectionError};
