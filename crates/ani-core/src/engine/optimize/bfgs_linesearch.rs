use super::linesearch::{LineSearch, normalize_tiny_direction, search_structure};
use super::{DEFAULT_MAX_STEP, Optimizer, Structure};
use crate::engine::error::ComputeError;
use nalgebra::{DMatrix, DVector};

/// Initial inverse Hessian, in Å²/eV.
pub const DEFAULT_INVERSE_HESSIAN: f64 = 0.1;

/// BFGS on the inverse Hessian with a strong-Wolfe line search along each direction.
#[derive(Debug, Clone)]
pub struct BfgsLineSearch {
    pub max_step: f64,
    pub inverse_hessian_guess: f64,
    search: LineSearch,
    inverse_hessian: Option<DMatrix<f64>>,
    /// Positions, gradient and search direction at the start of the previous step.
    previous: Option<(DVector<f64>, DVector<f64>, DVector<f64>)>,
    previous_energy: Option<f64>,
    curvature: bool,
}

impl Default for BfgsLineSearch {
    fn default() -> Self {
        Self {
            max_step: DEFAULT_MAX_STEP,
            inverse_hessian_guess: DEFAULT_INVERSE_HESSIAN,
            search: LineSearch::default(),
            inverse_hessian: None,
            previous: None,
            previous_energy: None,
            curvature: false,
        }
    }
}

impl BfgsLineSearch {
    fn update(&mut self, r: &DVector<f64>, g: &DVector<f64>) {
        let n = r.len();
        if self.inverse_hessian.is_none() {
            self.inverse_hessian = Some(DMatrix::identity(n, n) * self.inverse_hessian_guess);
            return;
        }
        let (Some(h), Some((r0, g0, p0))) = (self.inverse_hessian.as_mut(), self.previous.as_ref())
        else {
            return;
        };
        // Only learn from steps whose end point flattened the slope along the old direction.
        if !self.curvature || g.dot(p0).abs() >= g0.dot(p0).abs() {
            return;
        }
        let dr = r - r0;
        let dg = g - g0;
        let dgdr = dg.dot(&dr);
        if !(dgdr.is_finite() && dgdr > 0.0) {
            return;
        }
        let rho = 1.0 / dgdr;
        let identity = DMatrix::<f64>::identity(n, n);
        let a1 = &identity - (&dr * dg.transpose()) * rho;
        let a2 = &identity - (&dg * dr.transpose()) * rho;
        *h = &a1 * &*h * &a2 + (&dr * dr.transpose()) * rho;
    }
}

impl Optimizer for BfgsLineSearch {
    fn step(&mut self, structure: &mut Structure<'_>) -> Result<(), ComputeError> {
        let r = structure.flat_positions();
        let g = -structure.flat_forces()?;
        self.update(&r, &g);
        let energy = structure.energy()?;

        let Some(h) = &self.inverse_hessian else {
            return Err(ComputeError::NonFinite("inverse Hessian"));
        };
        let mut p = -(h * &g);
        normalize_tiny_direction(&mut p, structure.n_atoms());
        let mut slope = g.dot(&p);
        if !(slope < 0.0) {
            // The approximation lost positive definiteness; start over.
            let n = r.len();
            self.inverse_hessian = Some(DMatrix::identity(n, n) * self.inverse_hessian_guess);
            p = &g * -self.inverse_hessian_guess;
            normalize_tiny_direction(&mut p, structure.n_atoms());
            slope = g.dot(&p);
        }

        let accepted = search_structure(
            &self.search,
            structure,
            &r,
            &p,
            energy,
            slope,
            self.previous_energy,
            self.max_step,
        )?;
        self.curvature = accepted.curvature;
        self.previous_energy = Some(energy);
        self.previous = Some((r, g, p));
        Ok(())
    }
}
