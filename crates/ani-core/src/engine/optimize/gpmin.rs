//! Gaussian-process minimizer.
//!
//! Every evaluated geometry contributes its energy and gradient to a Gaussian-process model of
//! the potential energy surface with a squared-exponential kernel. Each step minimizes the
//! model's mean from the current geometry and moves towards it, no atom further than
//! `max_step`. If the real energy does not drop, the new point is added to the model and the
//! step is retried with half the displacement limit.

use super::lbfgs::LbfgsMemory;
use super::linesearch::LineSearch;
use super::{DEFAULT_MAX_STEP, Optimizer, Structure, cap_atom_steps};
use crate::engine::error::ComputeError;
use nalgebra::{Cholesky, DMatrix, DVector};
use tracing::debug;

pub const DEFAULT_SCALE: f64 = 0.4;
pub const DEFAULT_WEIGHT: f64 = 1.0;
pub const DEFAULT_NOISE: f64 = 0.005;
pub const MAX_ATTEMPTS: usize = 30;
/// Failed attempts after which a step follows the forces instead of the surrogate.
const SURROGATE_ATTEMPTS: usize = 3;

const INNER_MAX_ITERATIONS: usize = 1000;
const INNER_MEMORY: usize = 10;
const INNER_GRADIENT_TOLERANCE: f64 = 1e-5;
const INNER_RELATIVE_DECREASE: f64 = 2.2e-9;
const INNER_MAX_ALPHA: f64 = 10.0;

#[derive(Debug, Clone)]
pub struct GpMin {
    /// Kernel length scale, in Å.
    pub scale: f64,
    /// Kernel amplitude.
    pub weight: f64,
    /// Regularization of the observations.
    pub noise: f64,
    pub max_attempts: usize,
    /// Per-atom displacement limit of the first attempt, in Å.
    pub max_step: f64,
    fmax: f64,
    positions: Vec<DVector<f64>>,
    /// Energy followed by the gradient, one per observed geometry.
    observations: Vec<DVector<f64>>,
}

impl Default for GpMin {
    fn default() -> Self {
        Self {
            scale: DEFAULT_SCALE,
            weight: DEFAULT_WEIGHT,
            noise: DEFAULT_NOISE,
            max_attempts: MAX_ATTEMPTS,
            max_step: DEFAULT_MAX_STEP,
            fmax: 0.0,
            positions: Vec::new(),
            observations: Vec::new(),
        }
    }
}

/// Posterior mean of the trained process.
struct Surrogate<'a> {
    positions: &'a [DVector<f64>],
    prior: f64,
    weights: DVector<f64>,
    scale: f64,
    amplitude: f64,
}

impl Surrogate<'_> {
    /// Predicted energy and gradient at `x`.
    fn predict(&self, x: &DVector<f64>) -> (f64, DVector<f64>) {
        let dim = x.len();
        let l2 = self.scale * self.scale;
        let mut value = self.prior;
        let mut gradient = DVector::zeros(dim);
        for (b, xb) in self.positions.iter().enumerate() {
            let d = x - xb;
            let k = self.amplitude * (-0.5 * d.norm_squared() / l2).exp();
            let offset = b * (dim + 1);
            let a0 = self.weights[offset];
            let ag = self.weights.rows(offset + 1, dim);
            let d_ag = d.dot(&ag);

            value += k * a0 + k / l2 * d_ag;
            gradient += &d * (-k * a0 / l2 - k * d_ag / (l2 * l2));
            gradient += ag * (k / l2);
        }
        (value, gradient)
    }
}

impl GpMin {
    fn observe(&mut self, r: DVector<f64>, energy: f64, forces: &DVector<f64>) {
        let mut y = DVector::zeros(forces.len() + 1);
        y[0] = energy;
        y.rows_mut(1, forces.len()).copy_from(&(-forces));
        self.positions.push(r);
        self.observations.push(y);
    }

    fn train(&self) -> Result<Surrogate<'_>, ComputeError> {
        let n = self.positions.len();
        let dim = self.positions.first().map_or(0, DVector::len);
        let block = dim + 1;
        let l2 = self.scale * self.scale;
        let amplitude = self.weight * self.weight;
        let prior = self
            .observations
            .iter()
            .map(|y| y[0])
            .fold(f64::NEG_INFINITY, f64::max);

        let mut covariance = DMatrix::zeros(n * block, n * block);
        for i in 0..n {
            for j in 0..n {
                let d = &self.positions[i] - &self.positions[j];
                let k = amplitude * (-0.5 * d.norm_squared() / l2).exp();
                let (row, col) = (i * block, j * block);
                covariance[(row, col)] = k;
                for q in 0..dim {
                    covariance[(row, col + 1 + q)] = k * d[q] / l2;
                    covariance[(row + 1 + q, col)] = -k * d[q] / l2;
                    for p in 0..dim {
                        let delta = if p == q { 1.0 } else { 0.0 };
                        covariance[(row + 1 + p, col + 1 + q)] = k * (delta - d[p] * d[q] / l2) / l2;
                    }
                }
            }
            let energy_noise = self.noise * self.scale;
            covariance[(i * block, i * block)] += energy_noise * energy_noise;
            for q in 0..dim {
                covariance[(i * block + 1 + q, i * block + 1 + q)] += self.noise * self.noise;
            }
        }

        let mut residual = DVector::zeros(n * block);
        for (i, y) in self.observations.iter().enumerate() {
            residual.rows_mut(i * block, block).copy_from(y);
            residual[i * block] -= prior;
        }
        let cholesky = Cholesky::new(covariance).ok_or_else(|| {
            ComputeError::Surrogate("the covariance matrix is not positive definite".to_string())
        })?;

        Ok(Surrogate {
            positions: &self.positions,
            prior,
            weights: cholesky.solve(&residual),
            scale: self.scale,
            amplitude,
        })
    }

    /// Minimizes the surrogate mean from `start` with L-BFGS.
    fn relax_model(&self, start: &DVector<f64>) -> Result<DVector<f64>, ComputeError> {
        let surrogate = self.train()?;
        let search = LineSearch { c1: 1e-4, c2: 0.9 };
        let mut memory = LbfgsMemory::new(INNER_MEMORY);
        let mut x = start.clone();
        let (mut value, mut gradient) = surrogate.predict(&x);

        for iteration in 0..INNER_MAX_ITERATIONS {
            if gradient.amax() < INNER_GRADIENT_TOLERANCE {
                return Ok(x);
            }
            let h0 = match memory.is_empty() {
                true => 1.0 / gradient.norm(),
                false => memory.scaling(),
            };
            let mut p = memory.direction(&gradient, h0);
            let mut slope = gradient.dot(&p);
            if !(slope < 0.0) {
                memory.clear();
                p = &gradient * (-1.0 / gradient.norm());
                slope = gradient.dot(&p);
            }

            let accepted = search.search(
                |alpha| {
                    let (v, g) = surrogate.predict(&(&x + &p * alpha));
                    Ok((v, g.dot(&p)))
                },
                value,
                slope,
                1.0,
                INNER_MAX_ALPHA,
            );
            let accepted = match accepted {
                Ok(accepted) => accepted,
                Err(e) if iteration == 0 => return Err(ComputeError::Surrogate(e.to_string())),
                // Stalled line searches close to the optimum end the inner minimization.
                Err(_) => return Ok(x),
            };

            let next = &x + &p * accepted.alpha;
            let (next_value, next_gradient) = surrogate.predict(&next);
            memory.push(&next - &x, &next_gradient - &gradient);

            let decrease = (value - next_value) / value.abs().max(next_value.abs()).max(1.0);
            x = next;
            value = next_value;
            gradient = next_gradient;
            if decrease <= INNER_RELATIVE_DECREASE {
                return Ok(x);
            }
        }
        Err(ComputeError::Surrogate(format!(
            "the surrogate minimization did not converge in {} iterations",
            INNER_MAX_ITERATIONS
        )))
    }
}

impl Optimizer for GpMin {
    fn set_force_threshold(&mut self, fmax: f64) {
        self.fmax = fmax;
    }

    fn step(&mut self, structure: &mut Structure<'_>) -> Result<(), ComputeError> {
        let r0 = structure.flat_positions();
        let e0 = structure.energy()?;
        let f0 = structure.flat_forces()?;
        self.observe(r0.clone(), e0, &f0);

        let mut max_step = self.max_step;
        let mut attempts = 0;
        loop {
            let mut dr = match self.relax_model(&r0) {
                Ok(r1) => r1 - &r0,
                Err(e) => {
                    debug!("GPMin falls back to the forces: {}", e);
                    f0.clone()
                }
            };
            // Uphill surrogate steps, and late retries, follow the forces.
            if attempts >= SURROGATE_ATTEMPTS || dr.dot(&f0) <= 0.0 {
                dr = f0.clone();
            }
            cap_atom_steps(&mut dr, max_step);
            let r1 = &r0 + dr;
            structure.set_flat_positions(&r1);
            let e1 = structure.energy()?;
            if e1 < e0 || structure.fmax()? < self.fmax {
                return Ok(());
            }

            attempts += 1;
            debug!("GPMin attempt {} did not lower the energy", attempts);
            if attempts >= self.max_attempts {
                return Err(ComputeError::NoDescentModel { attempts });
            }
            let f1 = structure.flat_forces()?;
            self.observe(r1, e1, &f1);
            max_step *= 0.5;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::structure::testing::{Harmonic, LennardJones, lj_trimer};
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn surrogate_interpolates_its_observations() {
        let mut gp = GpMin::default();
        let points = [
            (DVector::from_vec(vec![0.0, 0.0, 0.0]), 1.0, DVector::from_vec(vec![0.5, 0.0, -0.2])),
            (DVector::from_vec(vec![0.3, 0.1, 0.0]), 0.7, DVector::from_vec(vec![0.4, 0.1, 0.0])),
        ];
        for (r, e, f) in &points {
            gp.observe(r.clone(), *e, f);
        }
        let surrogate = gp.train().unwrap();
        for (r, e, f) in &points {
            let (value, gradient) = surrogate.predict(r);
            assert!((value - e).abs() < 1e-3, "{} vs {}", value, e);
            assert!((gradient + f).amax() < 1e-2);
        }
    }

    #[test]
    fn surrogate_gradient_is_the_derivative_of_its_mean() {
        let mut gp = GpMin::default();
        gp.observe(DVector::from_vec(vec![0.0, 0.0, 0.0]), 0.2, &DVector::from_vec(vec![0.1, -0.3, 0.2]));
        gp.observe(DVector::from_vec(vec![0.2, -0.1, 0.05]), -0.1, &DVector::from_vec(vec![0.0, 0.1, 0.0]));
        let surrogate = gp.train().unwrap();

        let x = DVector::from_vec(vec![0.1, 0.05, -0.1]);
        let (_, gradient) = surrogate.predict(&x);
        let h = 1e-6;
        for k in 0..3 {
            let mut plus = x.clone();
            let mut minus = x.clone();
            plus[k] += h;
            minus[k] -= h;
            let numeric = (surrogate.predict(&plus).0 - surrogate.predict(&minus).0) / (2.0 * h);
            assert!((numeric - gradient[k]).abs() < 1e-6);
        }
    }

    #[test]
    fn steps_lower_the_energy_of_a_harmonic_well() {
        let calculator = Harmonic::new(vec![Vector3::new(0.2, -0.1, 0.1)], 5.0);
        let mut structure = Structure::new(vec![Vector3::zeros()], &calculator);
        let mut gp = GpMin::default();
        gp.set_force_threshold(0.01);

        let mut energy = structure.energy().unwrap();
        for _ in 0..20 {
            if structure.fmax().unwrap() < 0.01 {
                break;
            }
            gp.step(&mut structure).unwrap();
            let next = structure.energy().unwrap();
            assert!(next < energy || structure.fmax().unwrap() < 0.01);
            energy = next;
        }
        assert!(structure.fmax().unwrap() < 0.01);
    }

    #[test]
    fn steps_stay_within_the_displacement_limit() {
        let calculator = LennardJones { epsilon: 0.1 };
        let mut structure = Structure::new(lj_trimer(), &calculator);
        let mut gp = GpMin::default();
        gp.set_force_threshold(0.01);

        for _ in 0..10 {
            let before = structure.positions().to_vec();
            let energy = structure.energy().unwrap();
            gp.step(&mut structure).unwrap();
            let longest = before
                .iter()
                .zip(structure.positions())
                .map(|(a, b)| (b - a).norm())
                .fold(0.0, f64::max);
            assert!(longest <= DEFAULT_MAX_STEP + 1e-12, "moved {} Å", longest);
            assert!(structure.energy().unwrap() < energy || structure.fmax().unwrap() < 0.01);
        }
    }

    #[test]
    fn relaxes_a_lennard_jones_trimer_to_its_minimum() {
        let calculator = LennardJones { epsilon: 0.1 };
        let mut structure = Structure::new(lj_trimer(), &calculator);
        let mut gp = GpMin::default();
        let summary = super::super::run(&mut gp, &mut structure, 0.01, 200, |_, _, _| {}).unwrap();
        assert!(summary.converged);
        assert!((structure.energy().unwrap() + 0.3).abs() < 1e-3);
    }
}
