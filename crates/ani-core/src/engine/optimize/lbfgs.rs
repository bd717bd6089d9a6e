use super::linesearch::{LineSearch, normalize_tiny_direction, search_structure};
use super::{DEFAULT_MAX_STEP, Optimizer, Structure, cap_atom_steps};
use crate::engine::error::ComputeError;
use nalgebra::DVector;
use std::collections::VecDeque;

pub const DEFAULT_MEMORY: usize = 100;
/// Initial inverse Hessian, in Å²/eV.
pub const DEFAULT_INVERSE_HESSIAN: f64 = 1.0 / 70.0;

/// The most recent `(s, y)` curvature pairs of a limited-memory BFGS method.
#[derive(Debug, Clone)]
pub struct LbfgsMemory {
    capacity: usize,
    pairs: VecDeque<(DVector<f64>, DVector<f64>, f64)>,
}

impl LbfgsMemory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            pairs: VecDeque::with_capacity(capacity.min(DEFAULT_MEMORY)),
        }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn clear(&mut self) {
        self.pairs.clear();
    }

    /// Stores a step `s` and the matching gradient change `y`. Pairs without positive
    /// curvature are dropped.
    pub fn push(&mut self, s: DVector<f64>, y: DVector<f64>) -> bool {
        let ys = y.dot(&s);
        if !(ys.is_finite() && ys > 0.0) || self.capacity == 0 {
            return false;
        }
        if self.pairs.len() == self.capacity {
            self.pairs.pop_front();
        }
        self.pairs.push_back((s, y, 1.0 / ys));
        true
    }

    /// `s·y / y·y` of the newest pair, the usual scaling of the initial inverse Hessian.
    pub fn scaling(&self) -> f64 {
        self.pairs
            .back()
            .map_or(1.0, |(_, y, rho)| 1.0 / (rho * y.norm_squared()))
    }

    /// Two-loop recursion: returns `-H g` for the implicit inverse Hessian `H` built on
    /// `h0 · I`.
    pub fn direction(&self, gradient: &DVector<f64>, h0: f64) -> DVector<f64> {
        let mut q = gradient.clone();
        let mut a = vec![0.0; self.pairs.len()];
        for (i, (s, y, rho)) in self.pairs.iter().enumerate().rev() {
            a[i] = rho * s.dot(&q);
            q.axpy(-a[i], y, 1.0);
        }
        let mut z = q * h0;
        for (i, (s, y, rho)) in self.pairs.iter().enumerate() {
            let b = rho * y.dot(&z);
            z.axpy(a[i] - b, s, 1.0);
        }
        -z
    }
}

/// Limited-memory BFGS, optionally with a strong-Wolfe line search along each direction.
#[derive(Debug, Clone)]
pub struct Lbfgs {
    pub max_step: f64,
    pub damping: f64,
    pub inverse_hessian_guess: f64,
    line_search: Option<LineSearch>,
    memory: LbfgsMemory,
    previous: Option<(DVector<f64>, DVector<f64>)>,
    previous_energy: Option<f64>,
}

impl Default for Lbfgs {
    fn default() -> Self {
        Self {
            max_step: DEFAULT_MAX_STEP,
            damping: 1.0,
            inverse_hessian_guess: DEFAULT_INVERSE_HESSIAN,
            line_search: None,
            memory: LbfgsMemory::new(DEFAULT_MEMORY),
            previous: None,
            previous_energy: None,
        }
    }
}

impl Lbfgs {
    pub fn with_line_search() -> Self {
        Self {
            line_search: Some(LineSearch::default()),
            ..Self::default()
        }
    }
}

impl Optimizer for Lbfgs {
    fn step(&mut self, structure: &mut Structure<'_>) -> Result<(), ComputeError> {
        let r = structure.flat_positions();
        let f = structure.flat_forces()?;
        if let Some((r0, f0)) = self.previous.take() {
            self.memory.push(&r - r0, f0 - &f);
        }
        let gradient = -&f;
        let mut p = self.memory.direction(&gradient, self.inverse_hessian_guess);

        match &self.line_search {
            Some(search) => {
                let energy = structure.energy()?;
                normalize_tiny_direction(&mut p, structure.n_atoms());
                let mut slope = gradient.dot(&p);
                if !(slope < 0.0) {
                    // Stale curvature pointed uphill; restart from steepest descent.
                    self.memory.clear();
                    p = &f * self.inverse_hessian_guess;
                    normalize_tiny_direction(&mut p, structure.n_atoms());
                    slope = gradient.dot(&p);
                }
                search_structure(
                    search,
                    structure,
                    &r,
                    &p,
                    energy,
                    slope,
                    self.previous_energy,
                    self.max_step,
                )?;
                self.previous_energy = Some(energy);
            }
            None => {
                cap_atom_steps(&mut p, self.max_step);
                p *= self.damping;
                structure.set_flat_positions(&(&r + p));
            }
        }
        self.previous = Some((r, f));
        Ok(())
    }
}
