use super::{DEFAULT_MAX_STEP, Optimizer, Structure, cap_atom_steps};
use crate::engine::error::ComputeError;
use nalgebra::DVector;

/// Velocity Verlet dynamics that keep only the velocity component along the force and stop
/// dead whenever the motion turns uphill.
#[derive(Debug, Clone)]
pub struct MdMin {
    pub dt: f64,
    pub max_step: f64,
    velocity: Option<DVector<f64>>,
    previous_forces: Option<DVector<f64>>,
}

impl Default for MdMin {
    fn default() -> Self {
        Self {
            dt: 0.2,
            max_step: DEFAULT_MAX_STEP,
            velocity: None,
            previous_forces: None,
        }
    }
}

impl Optimizer for MdMin {
    fn step(&mut self, structure: &mut Structure<'_>) -> Result<(), ComputeError> {
        let r = structure.flat_positions();
        let f = structure.flat_forces()?;

        let v = match (self.velocity.take(), self.previous_forces.take()) {
            (Some(mut v), Some(f0)) => {
                v += (&f + f0) * (0.5 * self.dt);
                let vf = v.dot(&f);
                let ff = f.dot(&f);
                if vf < 0.0 || ff == 0.0 {
                    DVector::zeros(r.len())
                } else {
                    &f * (vf / ff)
                }
            }
            _ => DVector::zeros(r.len()),
        };

        let mut dr = &v * self.dt + &f * (0.5 * self.dt * self.dt);
        cap_atom_steps(&mut dr, self.max_step);
        structure.set_flat_positions(&(&r + dr));
        self.velocity = Some(v);
        self.previous_forces = Some(f);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::structure::testing::Harmonic;
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn first_step_follows_the_force() {
        let calculator = Harmonic::new(vec![Vector3::zeros()], 1.0);
        let mut structure = Structure::new(vec![Vector3::new(0.5, 0.0, 0.0)], &calculator);
        MdMin::default().step(&mut structure).unwrap();
        // dr = dt²/2 f = 0.02 * -0.5
        assert!((structure.positions()[0].x - 0.49).abs() < 1e-12);
    }

    #[test]
    fn velocity_is_projected_on_the_force() {
        let calculator = Harmonic::new(vec![Vector3::zeros()], 1.0);
        let mut structure = Structure::new(vec![Vector3::new(0.5, 0.5, 0.0)], &calculator);
        let mut mdmin = MdMin::default();
        mdmin.step(&mut structure).unwrap();
        mdmin.step(&mut structure).unwrap();
        let v = mdmin.velocity.clone().unwrap();
        let f = mdmin.previous_forces.clone().unwrap();
        assert!((v[0] * f[1] - v[1] * f[0]).abs() < 1e-12);
        assert!(v.dot(&f) > 0.0);
    }

    #[test]
    fn a_structure_at_rest_stays_put() {
        let sites = vec![Vector3::new(0.1, 0.2, 0.3)];
        let calculator = Harmonic::new(sites.clone(), 4.0);
        let mut structure = Structure::new(sites.clone(), &calculator);
        let mut mdmin = MdMin::default();
        mdmin.step(&mut structure).unwrap();
        mdmin.step(&mut structure).unwrap();
        assert_eq!(structure.positions(), sites.as_slice());
    }
}
