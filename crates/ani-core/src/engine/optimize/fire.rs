use super::{Optimizer, Structure};
use crate::engine::error::ComputeError;
use nalgebra::DVector;

/// Fast inertial relaxation engine: damped dynamics whose time step grows while the motion
/// stays downhill and collapses as soon as it turns uphill.
#[derive(Debug, Clone)]
pub struct Fire {
    pub dt: f64,
    pub dt_max: f64,
    /// Downhill steps required before the time step may grow.
    pub n_min: usize,
    pub f_inc: f64,
    pub f_dec: f64,
    pub a_start: f64,
    pub f_a: f64,
    /// Limit on the length of the whole displacement, in Å.
    pub max_step: f64,
    a: f64,
    downhill: usize,
    velocity: Option<DVector<f64>>,
}

impl Default for Fire {
    fn default() -> Self {
        Self {
            dt: 0.1,
            dt_max: 1.0,
            n_min: 5,
            f_inc: 1.1,
            f_dec: 0.5,
            a_start: 0.1,
            f_a: 0.99,
            max_step: 0.2,
            a: 0.1,
            downhill: 0,
            velocity: None,
        }
    }
}

impl Optimizer for Fire {
    fn step(&mut self, structure: &mut Structure<'_>) -> Result<(), ComputeError> {
        let r = structure.flat_positions();
        let f = structure.flat_forces()?;

        let mut v = match self.velocity.take() {
            None => {
                self.a = self.a_start;
                DVector::zeros(r.len())
            }
            Some(v) if f.dot(&v) > 0.0 => {
                let f_norm = f.norm();
                let mixed = match f_norm > 0.0 {
                    true => &v * (1.0 - self.a) + &f * (self.a * v.norm() / f_norm),
                    false => v,
                };
                if self.downhill > self.n_min {
                    self.dt = (self.dt * self.f_inc).min(self.dt_max);
                    self.a *= self.f_a;
                }
                self.downhill += 1;
                mixed
            }
            Some(v) => {
                self.a = self.a_start;
                self.dt *= self.f_dec;
                self.downhill = 0;
                DVector::zeros(v.len())
            }
        };

        v.axpy(self.dt, &f, 1.0);
        let mut dr = &v * self.dt;
        let length = dr.norm();
        if length > self.max_step {
            dr *= self.max_step / length;
        }
        structure.set_flat_positions(&(&r + dr));
        self.velocity = Some(v);
        Ok(())
    }
}
