//! Structure optimization.
//!
//! A [`Structure`] couples positions with a [`Calculator`] and caches the latest energy and
//! forces. Each minimizer implements [`Optimizer::step`], and [`run`] drives any of them until
//! the largest per-atom force drops below the threshold or the step budget is spent. The
//! closed set of minimizers is resolved by name through [`Minimizer`].

mod bfgs;
mod bfgs_linesearch;
mod fire;
mod gpmin;
mod lbfgs;
pub mod linesearch;
mod mdmin;
pub mod structure;

pub use bfgs::Bfgs;
pub use bfgs_linesearch::BfgsLineSearch;
pub use fire::Fire;
pub use gpmin::GpMin;
pub use lbfgs::Lbfgs;
pub use mdmin::MdMin;
pub use structure::{AniCalculator, Calculator, Evaluation, HARTREE_TO_EV, Structure};

use super::error::ComputeError;
use super::single_point::vectors_to_json;
use nalgebra::{DVector, Vector3};
use serde_json::{Map, Value, json};
use std::fmt;
use tracing::debug;

/// Per-atom displacement limit, in Å, shared by the minimizers.
pub const DEFAULT_MAX_STEP: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Minimizer {
    Bfgs,
    Lbfgs,
    BfgsLineSearch,
    LbfgsLineSearch,
    GpMin,
    Fire,
    MdMin,
}

const MINIMIZERS: [(&str, Minimizer); 7] = [
    ("BFGS", Minimizer::Bfgs),
    ("LBFGS", Minimizer::Lbfgs),
    ("BFGSLineSearch", Minimizer::BfgsLineSearch),
    ("LBFGSLineSearch", Minimizer::LbfgsLineSearch),
    ("GPMin", Minimizer::GpMin),
    ("FIRE", Minimizer::Fire),
    ("MDMin", Minimizer::MdMin),
];

impl Minimizer {
    pub fn from_name(name: &str) -> Option<Self> {
        MINIMIZERS
            .iter()
            .find(|(n, _)| *n == name.trim())
            .map(|(_, m)| *m)
    }

    pub fn name(self) -> &'static str {
        MINIMIZERS
            .iter()
            .find(|(_, m)| *m == self)
            .map_or("", |(n, _)| *n)
    }

    pub fn all() -> impl Iterator<Item = Minimizer> {
        MINIMIZERS.iter().map(|(_, m)| *m)
    }

    /// A fresh minimizer with its standard settings.
    pub fn build(self) -> Box<dyn Optimizer> {
        match self {
            Self::Bfgs => Box::new(Bfgs::default()),
            Self::Lbfgs => Box::new(Lbfgs::default()),
            Self::BfgsLineSearch => Box::new(BfgsLineSearch::default()),
            Self::LbfgsLineSearch => Box::new(Lbfgs::with_line_search()),
            Self::GpMin => Box::new(GpMin::default()),
            Self::Fire => Box::new(Fire::default()),
            Self::MdMin => Box::new(MdMin::default()),
        }
    }
}

impl fmt::Display for Minimizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub trait Optimizer {
    /// Tells the minimizer the convergence threshold it is being run against.
    fn set_force_threshold(&mut self, _fmax: f64) {}

    /// Moves the structure one iteration closer to a minimum.
    fn step(&mut self, structure: &mut Structure<'_>) -> Result<(), ComputeError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub converged: bool,
    pub steps: u64,
}

/// Steps until the largest per-atom force is below `fmax` or `max_steps` steps have been
/// taken. `observer` sees the step count, energy and largest force after every step,
/// starting with the initial geometry at step 0.
pub fn run(
    optimizer: &mut dyn Optimizer,
    structure: &mut Structure<'_>,
    fmax: f64,
    max_steps: u64,
    mut observer: impl FnMut(u64, f64, f64),
) -> Result<RunSummary, ComputeError> {
    optimizer.set_force_threshold(fmax);
    let mut steps = 0;
    let mut largest = structure.fmax()?;
    observer(steps, structure.energy()?, largest);

    while largest >= fmax && steps < max_steps {
        optimizer.step(structure)?;
        steps += 1;
        largest = structure.fmax()?;
        observer(steps, structure.energy()?, largest);
    }
    Ok(RunSummary {
        converged: largest < fmax,
        steps,
    })
}

/// Scales `dr` so that no atom moves further than `max_step`.
pub(crate) fn cap_atom_steps(dr: &mut DVector<f64>, max_step: f64) {
    let longest = dr
        .as_slice()
        .chunks_exact(3)
        .map(|c| (c[0] * c[0] + c[1] * c[1] + c[2] * c[2]).sqrt())
        .fold(0.0, f64::max);
    if longest >= max_step {
        *dr *= max_step / longest;
    }
}

/// The final state of an optimized structure.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizedStructure {
    pub steps: u64,
    pub converged: bool,
    /// eV
    pub energy: f64,
    /// Å
    pub coordinates: Vec<Vector3<f64>>,
    /// eV/Å, stored under `"gradients"` in the record.
    pub forces: Vec<Vector3<f64>>,
}

impl OptimizedStructure {
    pub fn to_record(&self) -> Map<String, Value> {
        let mut record = Map::new();
        record.insert("number of optimization steps".to_string(), json!(self.steps));
        record.insert("converged".to_string(), json!(self.converged));
        record.insert("energy".to_string(), json!(self.energy));
        record.insert("coordinates".to_string(), vectors_to_json(&self.coordinates));
        record.insert("gradients".to_string(), vectors_to_json(&self.forces));
        record.insert(
            "units".to_string(),
            json!({"energy": "eV", "coordinates": "Å", "gradients": "eV/Å"}),
        );
        record
    }
}

/// Minimizes one geometry with a fresh instance of `minimizer`.
pub fn optimize(
    calculator: &dyn Calculator,
    positions: Vec<Vector3<f64>>,
    minimizer: Minimizer,
    fmax: f64,
    max_steps: u64,
    observer: impl FnMut(u64, f64, f64),
) -> Result<OptimizedStructure, ComputeError> {
    let mut structure = Structure::new(positions, calculator);
    let mut optimizer = minimizer.build();
    let summary = run(optimizer.as_mut(), &mut structure, fmax, max_steps, observer)?;
    debug!(
        "{} finished after {} steps ({} calculator calls), converged: {}",
        minimizer,
        summary.steps,
        structure.evaluations(),
        summary.converged
    );

    let energy = structure.energy()?;
    let forces = structure.forces()?;
    Ok(OptimizedStructure {
        steps: summary.steps,
        converged: summary.converged,
        energy,
        coordinates: structure.positions().to_vec(),
        forces,
    })
}
