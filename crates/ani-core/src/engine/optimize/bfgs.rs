use super::{DEFAULT_MAX_STEP, Optimizer, Structure, cap_atom_steps};
use crate::engine::error::ComputeError;
use nalgebra::{DMatrix, DVector, SymmetricEigen};

/// Initial Hessian guess, in eV/Å².
pub const DEFAULT_HESSIAN_GUESS: f64 = 70.0;

/// Quasi-Newton minimizer keeping a full Hessian approximation.
///
/// Steps follow the eigen-decomposition of the Hessian with absolute eigenvalues, so a Hessian
/// that has lost positive definiteness still produces a descent-like step.
#[derive(Debug, Clone)]
pub struct Bfgs {
    pub max_step: f64,
    pub hessian_guess: f64,
    hessian: Option<DMatrix<f64>>,
    previous: Option<(DVector<f64>, DVector<f64>)>,
}

impl Default for Bfgs {
    fn default() -> Self {
        Self {
            max_step: DEFAULT_MAX_STEP,
            hessian_guess: DEFAULT_HESSIAN_GUESS,
            hessian: None,
            previous: None,
        }
    }
}

impl Bfgs {
    fn update(&mut self, r: &DVector<f64>, f: &DVector<f64>) {
        if self.hessian.is_none() {
            self.hessian = Some(DMatrix::identity(r.len(), r.len()) * self.hessian_guess);
            return;
        }
        let (Some(hessian), Some((r0, f0))) = (self.hessian.as_mut(), self.previous.as_ref())
        else {
            return;
        };
        let dr = r - r0;
        if dr.amax() < 1e-7 {
            return;
        }
        let df = f - f0;
        let a = dr.dot(&df);
        let dg = &*hessian * &dr;
        let b = dr.dot(&dg);
        if a == 0.0 || b == 0.0 {
            return;
        }
        *hessian -= (&df * df.transpose()) / a + (&dg * dg.transpose()) / b;
    }
}

impl Optimizer for Bfgs {
    fn step(&mut self, structure: &mut Structure<'_>) -> Result<(), ComputeError> {
        let r = structure.flat_positions();
        let f = structure.flat_forces()?;
        self.update(&r, &f);

        let Some(hessian) = &self.hessian else {
            return Err(ComputeError::NonFinite("Hessian"));
        };
        let eigen = SymmetricEigen::new(hessian.clone());
        let projected = eigen.eigenvectors.tr_mul(&f);
        let scaled = projected.zip_map(&eigen.eigenvalues, |p, w| p / w.abs());
        let mut dr = &eigen.eigenvectors * scaled;
        if dr.iter().any(|x| !x.is_finite()) {
            return Err(ComputeError::NonFinite("BFGS step"));
        }
        cap_atom_steps(&mut dr, self.max_step);

        structure.set_flat_positions(&(&r + dr));
        self.previous = Some((r, f));
        Ok(())
    }
}
