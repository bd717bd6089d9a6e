use crate::core::ani::AniModel;
use crate::engine::error::ComputeError;
use nalgebra::{DVector, Vector3};

/// Electron volts per Hartree (CODATA 2014, as used by ASE).
pub const HARTREE_TO_EV: f64 = 27.211386024367243;

/// Energy and forces of one geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// eV
    pub energy: f64,
    /// eV/Å, one vector per atom.
    pub forces: Vec<Vector3<f64>>,
}

/// A source of energies and forces for positions in Å.
pub trait Calculator {
    fn calculate(&self, positions: &[Vector3<f64>]) -> Result<Evaluation, ComputeError>;
}

/// Reports the mean over the selected sub-models of an ANI ensemble, converted to eV and eV/Å.
pub struct AniCalculator<'a> {
    model: &'a AniModel,
    species: Vec<usize>,
    submodels: Vec<usize>,
    label: String,
}

impl<'a> AniCalculator<'a> {
    pub fn new(
        model: &'a AniModel,
        species: Vec<usize>,
        submodels: Vec<usize>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            model,
            species,
            submodels,
            label: label.into(),
        }
    }
}

impl Calculator for AniCalculator<'_> {
    fn calculate(&self, positions: &[Vector3<f64>]) -> Result<Evaluation, ComputeError> {
        let (energy, gradient) = self
            .model
            .evaluate_mean(&self.species, positions, &self.submodels)
            .map_err(|e| ComputeError::Evaluation {
                configuration: self.label.clone(),
                source: e,
            })?;
        Ok(Evaluation {
            energy: energy * HARTREE_TO_EV,
            forces: gradient.iter().map(|g| -g * HARTREE_TO_EV).collect(),
        })
    }
}

/// Positions being optimized, with the most recent energy and forces cached.
pub struct Structure<'a> {
    positions: Vec<Vector3<f64>>,
    calculator: &'a dyn Calculator,
    cache: Option<Evaluation>,
    evaluations: usize,
}

impl<'a> Structure<'a> {
    pub fn new(positions: Vec<Vector3<f64>>, calculator: &'a dyn Calculator) -> Self {
        Self {
            positions,
            calculator,
            cache: None,
            evaluations: 0,
        }
    }

    pub fn n_atoms(&self) -> usize {
        self.positions.len()
    }

    pub fn positions(&self) -> &[Vector3<f64>] {
        &self.positions
    }

    /// Number of calls made to the calculator so far.
    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    pub fn set_positions(&mut self, positions: Vec<Vector3<f64>>) {
        if positions != self.positions {
            self.positions = positions;
            self.cache = None;
        }
    }

    pub fn flat_positions(&self) -> DVector<f64> {
        flatten(&self.positions)
    }

    pub fn set_flat_positions(&mut self, positions: &DVector<f64>) {
        self.set_positions(unflatten(positions));
    }

    pub fn evaluate(&mut self) -> Result<&Evaluation, ComputeError> {
        let evaluation = match self.cache.take() {
            Some(evaluation) => evaluation,
            None => {
                let evaluation = self.calculator.calculate(&self.positions)?;
                self.evaluations += 1;
                if !evaluation.energy.is_finite() {
                    return Err(ComputeError::NonFinite("energy"));
                }
                if evaluation.forces.iter().any(|f| !f.iter().all(|x| x.is_finite())) {
                    return Err(ComputeError::NonFinite("force"));
                }
                evaluation
            }
        };
        Ok(self.cache.insert(evaluation))
    }

    pub fn energy(&mut self) -> Result<f64, ComputeError> {
        Ok(self.evaluate()?.energy)
    }

    pub fn forces(&mut self) -> Result<Vec<Vector3<f64>>, ComputeError> {
        Ok(self.evaluate()?.forces.clone())
    }

    pub fn flat_forces(&mut self) -> Result<DVector<f64>, ComputeError> {
        Ok(flatten(&self.evaluate()?.forces))
    }

    /// Largest per-atom force norm.
    pub fn fmax(&mut self) -> Result<f64, ComputeError> {
        Ok(max_atom_norm(&self.evaluate()?.forces))
    }
}

pub fn flatten(vectors: &[Vector3<f64>]) -> DVector<f64> {
    DVector::from_iterator(
        vectors.len() * 3,
        vectors.iter().flat_map(|v| v.iter().copied()),
    )
}

pub fn unflatten(flat: &DVector<f64>) -> Vec<Vector3<f64>> {
    flat.as_slice()
        .chunks_exact(3)
        .map(|c| Vector3::new(c[0], c[1], c[2]))
        .collect()
}

pub fn max_atom_norm(vectors: &[Vector3<f64>]) -> f64 {
    vectors.iter().map(|v| v.norm()).fold(0.0, f64::max)
}
