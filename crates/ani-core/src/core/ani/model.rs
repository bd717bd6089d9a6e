use super::aev::AevComputer;
use super::network::AtomicNetwork;
use super::parameterization::Parameterization;
use nalgebra::{DVector, Vector3};
use rayon::prelude::*;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum EvaluationError {
    #[error("Sub-model {index} does not exist; the ensemble has {size} sub-models")]
    SubmodelOutOfRange { index: usize, size: usize },
    #[error("Species index {index} at atom {atom} is outside the {n_species} species of the model")]
    SpeciesOutOfRange {
        atom: usize,
        index: usize,
        n_species: usize,
    },
    #[error("Got {species} species for {positions} positions")]
    LengthMismatch { species: usize, positions: usize },
    #[error("Sub-model {submodel} produced a non-finite {quantity}")]
    NonFinite {
        submodel: usize,
        quantity: &'static str,
    },
    #[error("No sub-models were selected for evaluation")]
    NoSubmodels,
}

/// One independently trained member of an ensemble: a network per species.
#[derive(Debug, Clone)]
pub struct SubModel {
    networks: Vec<AtomicNetwork>,
}

impl SubModel {
    pub fn new(networks: Vec<AtomicNetwork>) -> Self {
        Self { networks }
    }

    pub fn network(&self, species: usize) -> &AtomicNetwork {
        &self.networks[species]
    }
}

/// Per-sub-model results for one molecule, in Hartree and Hartree/Å.
#[derive(Debug, Clone, PartialEq)]
pub struct MoleculeEvaluation {
    /// Sub-model indices, in the order of `energies` and `gradients`.
    pub submodels: Vec<usize>,
    pub energies: Vec<f64>,
    /// Present when gradients were requested.
    pub gradients: Option<Vec<Vec<Vector3<f64>>>>,
}

/// A loaded ANI potential: the environment-vector computer, the self energies, and the
/// ensemble of sub-models.
#[derive(Debug, Clone)]
pub struct AniModel {
    parameterization: Parameterization,
    aev: AevComputer,
    self_energies: Vec<f64>,
    submodels: Vec<SubModel>,
}

impl AniModel {
    pub fn new(
        parameterization: Parameterization,
        self_energies: Vec<f64>,
        submodels: Vec<SubModel>,
    ) -> Self {
        let n_species = parameterization.species().len();
        Self {
            parameterization,
            aev: AevComputer::new(parameterization.aev_params(), n_species),
            self_energies,
            submodels,
        }
    }

    pub fn parameterization(&self) -> Parameterization {
        self.parameterization
    }

    pub fn aev_length(&self) -> usize {
        self.aev.length()
    }

    pub fn ensemble_size(&self) -> usize {
        self.submodels.len()
    }

    pub fn species_index(&self, symbol: &str) -> Option<usize> {
        self.parameterization.species_index(symbol)
    }

    fn check_inputs(
        &self,
        species: &[usize],
        positions: &[Vector3<f64>],
        submodels: &[usize],
    ) -> Result<(), EvaluationError> {
        if species.len() != positions.len() {
            return Err(EvaluationError::LengthMismatch {
                species: species.len(),
                positions: positions.len(),
            });
        }
        if submodels.is_empty() {
            return Err(EvaluationError::NoSubmodels);
        }
        let n_species = self.self_energies.len();
        if let Some((atom, index)) = species.iter().enumerate().find(|(_, s)| **s >= n_species) {
            return Err(EvaluationError::SpeciesOutOfRange {
                atom,
                index: *index,
                n_species,
            });
        }
        if let Some(index) = submodels.iter().find(|i| **i >= self.submodels.len()) {
            return Err(EvaluationError::SubmodelOutOfRange {
                index: *index,
                size: self.submodels.len(),
            });
        }
        Ok(())
    }

    /// Evaluates the selected sub-models on one molecule.
    ///
    /// The environment vectors are computed once and shared; each sub-model then contributes
    /// its energy and, if requested, the gradient of that energy with respect to the positions.
    pub fn evaluate(
        &self,
        species: &[usize],
        positions: &[Vector3<f64>],
        submodels: &[usize],
        with_gradients: bool,
    ) -> Result<MoleculeEvaluation, EvaluationError> {
        self.check_inputs(species, positions, submodels)?;

        let aevs = self.aev.compute(species, positions);
        let self_energy: f64 = species.iter().map(|s| self.self_energies[*s]).sum();

        let mut energies = Vec::with_capacity(submodels.len());
        let mut gradients = with_gradients.then(|| Vec::with_capacity(submodels.len()));

        for &index in submodels {
            let submodel = &self.submodels[index];
            let network_energy = if let Some(gradients) = gradients.as_mut() {
                let (atomic, weights): (Vec<f64>, Vec<DVector<f64>>) = species
                    .par_iter()
                    .zip(aevs.par_iter())
                    .map(|(s, aev)| submodel.network(*s).forward_with_gradient(aev))
                    .unzip();
                let grad = self.aev.backward(species, positions, &weights);
                if grad.iter().any(|g| !g.iter().all(|v| v.is_finite())) {
                    return Err(EvaluationError::NonFinite {
                        submodel: index,
                        quantity: "gradient",
                    });
                }
                gradients.push(grad);
                atomic.iter().sum::<f64>()
            } else {
                species
                    .par_iter()
                    .zip(aevs.par_iter())
                    .map(|(s, aev)| submodel.network(*s).forward(aev))
                    .sum::<f64>()
            };
            let energy = network_energy + self_energy;

            if !energy.is_finite() {
                return Err(EvaluationError::NonFinite {
                    submodel: index,
                    quantity: "energy",
                });
            }
            energies.push(energy);
        }

        Ok(MoleculeEvaluation {
            submodels: submodels.to_vec(),
            energies,
            gradients,
        })
    }

    /// Mean energy and gradient over the selected sub-models, in Hartree and Hartree/Å.
    pub fn evaluate_mean(
        &self,
        species: &[usize],
        positions: &[Vector3<f64>],
        submodels: &[usize],
    ) -> Result<(f64, Vec<Vector3<f64>>), EvaluationError> {
        let evaluation = self.evaluate(species, positions, submodels, true)?;
        let n = evaluation.energies.len() as f64;
        let energy = evaluation.energies.iter().sum::<f64>() / n;

        let mut gradient = vec![Vector3::zeros(); positions.len()];
        for member in evaluation.gradients.iter().flatten() {
            for (acc, g) in gradient.iter_mut().zip(member) {
                *acc += g / n;
            }
        }
        Ok((energy, gradient))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ani::testing::synthetic_model;

    fn methane() -> (Vec<usize>, Vec<Vector3<f64>>) {
        (
            vec![1, 0, 0, 0, 0],
            vec![
                Vector3::new(0.0, 0.0, 0.0),
                Vector3::new(0.629, 0.629, 0.629),
                Vector3::new(-0.629, -0.629, 0.629),
                Vector3::new(-0.629, 0.629, -0.629),
                Vector3::new(0.629, -0.629, -0.629),
            ],
        )
    }

    #[test]
    fn each_selected_submodel_yields_one_energy() {
        let model = synthetic_model(Parameterization::Ani1x, 3);
        let (species, positions) = methane();
        let evaluation = model.evaluate(&species, &positions, &[0, 2], false).unwrap();
        assert_eq!(evaluation.submodels, vec![0, 2]);
        assert_eq!(evaluation.energies.len(), 2);
        assert!(evaluation.gradients.is_none());
        assert_ne!(evaluation.energies[0], evaluation.energies[1]);
    }

    #[test]
    fn energies_include_the_self_energies() {
        let model = synthetic_model(Parameterization::Ani1x, 1);
        let evaluation = model
            .evaluate(&[1], &[Vector3::zeros()], &[0], false)
            .unwrap();
        // An isolated atom has a zero AEV, so its energy is the network bias path plus the
        // carbon self energy, which dominates.
        assert!((evaluation.energies[0] - model.self_energies[1]).abs() < 1.0);
    }

    #[test]
    fn gradients_match_finite_differences_of_the_energy() {
        let model = synthetic_model(Parameterization::Ani2x, 2);
        let (species, positions) = methane();
        let evaluation = model.evaluate(&species, &positions, &[1], true).unwrap();
        let gradient = &evaluation.gradients.unwrap()[0];

        let energy = |pos: &[Vector3<f64>]| {
            model.evaluate(&species, pos, &[1], false).unwrap().energies[0]
        };
        let h = 1e-6;
        for atom in 0..positions.len() {
            for axis in 0..3 {
                let mut plus = positions.clone();
                let mut minus = positions.clone();
                plus[atom][axis] += h;
                minus[atom][axis] -= h;
                let numeric = (energy(&plus) - energy(&minus)) / (2.0 * h);
                assert!(
                    (numeric - gradient[atom][axis]).abs() < 1e-6,
                    "atom {} axis {}: numeric {} analytic {}",
                    atom,
                    axis,
                    numeric,
                    gradient[atom][axis]
                );
            }
        }
    }

    #[test]
    fn mean_evaluation_averages_the_members() {
        let model = synthetic_model(Parameterization::Ani1x, 3);
        let (species, positions) = methane();
        let all = model.evaluate(&species, &positions, &[0, 1, 2], true).unwrap();
        let (energy, gradient) = model.evaluate_mean(&species, &positions, &[0, 1, 2]).unwrap();

        let expected = all.energies.iter().sum::<f64>() / 3.0;
        assert!((energy - expected).abs() < 1e-12);

        let members = all.gradients.unwrap();
        let expected_x = (members[0][1].x + members[1][1].x + members[2][1].x) / 3.0;
        assert!((gradient[1].x - expected_x).abs() < 1e-12);
    }

    #[test]
    fn out_of_range_inputs_are_rejected() {
        let model = synthetic_model(Parameterization::Ani1x, 2);
        let (species, positions) = methane();
        assert_eq!(
            model.evaluate(&species, &positions, &[5], false),
            Err(EvaluationError::SubmodelOutOfRange { index: 5, size: 2 })
        );
        assert_eq!(
            model.evaluate(&[9], &[Vector3::zeros()], &[0], false),
            Err(EvaluationError::SpeciesOutOfRange {
                atom: 0,
                index: 9,
                n_species: 4
            })
        );
        assert_eq!(
            model.evaluate(&species, &positions[..2], &[0], false),
            Err(EvaluationError::LengthMismatch {
                species: 5,
                positions: 2
            })
        );
        assert_eq!(
            model.evaluate(&species, &positions, &[], false),
            Err(EvaluationError::NoSubmodels)
        );
    }
}
