//! Strong-Wolfe line search by bracketing and cubic-interpolation zoom.

use super::structure::{Structure, max_atom_norm, unflatten};
use crate::engine::error::ComputeError;
use nalgebra::DVector;

/// Sufficient-decrease constant used by the line-search minimizers.
pub const C1: f64 = 0.23;
/// Curvature constant used by the line-search minimizers.
pub const C2: f64 = 0.46;

const MAX_BRACKET_ITERATIONS: usize = 20;
const MAX_ZOOM_ITERATIONS: usize = 30;
const MIN_INTERVAL: f64 = 1e-12;
/// Upper bound on the step length along an unscaled search direction.
const MAX_ALPHA: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSearch {
    pub c1: f64,
    pub c2: f64,
}

impl Default for LineSearch {
    fn default() -> Self {
        Self { c1: C1, c2: C2 }
    }
}

/// The accepted step along the search direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Accepted {
    pub alpha: f64,
    pub value: f64,
    pub slope: f64,
    /// False when the step was accepted at the upper bound without meeting the curvature
    /// condition; curvature updates should be skipped for such steps.
    pub curvature: bool,
}

#[derive(Debug, Clone, Copy)]
struct Trial {
    alpha: f64,
    value: f64,
    slope: f64,
}

impl LineSearch {
    /// Searches `phi(α) = f(x + α p)` for a step satisfying the strong Wolfe conditions.
    ///
    /// `phi` returns the value and the directional derivative at `α`. Steps never exceed
    /// `alpha_max`.
    pub fn search<F>(
        &self,
        mut phi: F,
        value0: f64,
        slope0: f64,
        alpha_init: f64,
        alpha_max: f64,
    ) -> Result<Accepted, ComputeError>
    where
        F: FnMut(f64) -> Result<(f64, f64), ComputeError>,
    {
        if !(slope0 < 0.0) {
            return Err(ComputeError::LineSearch(format!(
                "search direction is not a descent direction (slope {:e})",
                slope0
            )));
        }
        if !(alpha_max > 0.0) {
            return Err(ComputeError::LineSearch(format!(
                "maximum step {:e} is not positive",
                alpha_max
            )));
        }

        let start = Trial {
            alpha: 0.0,
            value: value0,
            slope: slope0,
        };
        let mut previous = start;
        let mut alpha = alpha_init.min(alpha_max);

        for i in 0..MAX_BRACKET_ITERATIONS {
            let (value, slope) = phi(alpha)?;
            let current = Trial {
                alpha,
                value,
                slope,
            };
            if !value.is_finite() || !slope.is_finite() {
                return Err(ComputeError::NonFinite("line search value"));
            }

            if value > value0 + self.c1 * alpha * slope0 || (i > 0 && value >= previous.value) {
                return self.zoom(&mut phi, start, previous, current);
            }
            if slope.abs() <= -self.c2 * slope0 {
                return Ok(accept(current, true));
            }
            if slope >= 0.0 {
                return self.zoom(&mut phi, start, current, previous);
            }
            if alpha >= alpha_max {
                return Ok(accept(current, false));
            }
            previous = current;
            alpha = (2.0 * alpha).min(alpha_max);
        }
        Err(ComputeError::LineSearch(format!(
            "no acceptable step found in {} trials",
            MAX_BRACKET_ITERATIONS
        )))
    }

    fn zoom<F>(
        &self,
        phi: &mut F,
        start: Trial,
        mut lo: Trial,
        mut hi: Trial,
    ) -> Result<Accepted, ComputeError>
    where
        F: FnMut(f64) -> Result<(f64, f64), ComputeError>,
    {
        for _ in 0..MAX_ZOOM_ITERATIONS {
            if (hi.alpha - lo.alpha).abs() < MIN_INTERVAL {
                break;
            }
            let alpha = interpolate(lo, hi);
            let (value, slope) = phi(alpha)?;
            if !value.is_finite() || !slope.is_finite() {
                return Err(ComputeError::NonFinite("line search value"));
            }
            let trial = Trial {
                alpha,
                value,
                slope,
            };

            if value > start.value + self.c1 * alpha * start.slope || value >= lo.value {
                hi = trial;
            } else {
                if slope.abs() <= -self.c2 * start.slope {
                    return Ok(accept(trial, true));
                }
                if slope * (hi.alpha - lo.alpha) >= 0.0 {
                    hi = lo;
                }
                lo = trial;
            }
        }
        if lo.alpha > 0.0 {
            // The bracket collapsed on a point with sufficient decrease.
            let (value, slope) = phi(lo.alpha)?;
            return Ok(accept(
                Trial {
                    alpha: lo.alpha,
                    value,
                    slope,
                },
                false,
            ));
        }
        Err(ComputeError::LineSearch(
            "the bracketing interval collapsed without a decrease".to_string(),
        ))
    }
}

fn accept(trial: Trial, curvature: bool) -> Accepted {
    Accepted {
        alpha: trial.alpha,
        value: trial.value,
        slope: trial.slope,
        curvature,
    }
}

/// Minimizer of the cubic through both end points, kept away from the ends; bisection when the
/// cubic has no usable minimizer.
fn interpolate(a: Trial, b: Trial) -> f64 {
    let (low, high) = (a.alpha.min(b.alpha), a.alpha.max(b.alpha));
    let margin = 0.1 * (high - low);
    let bisection = 0.5 * (low + high);

    let d1 = a.slope + b.slope - 3.0 * (a.value - b.value) / (a.alpha - b.alpha);
    let discriminant = d1 * d1 - a.slope * b.slope;
    if discriminant < 0.0 {
        return bisection;
    }
    let d2 = (b.alpha - a.alpha).signum() * discriminant.sqrt();
    let denominator = b.slope - a.slope + 2.0 * d2;
    if denominator == 0.0 {
        return bisection;
    }
    let alpha = b.alpha - (b.alpha - a.alpha) * (b.slope + d2 - d1) / denominator;
    if alpha.is_finite() && alpha > low + margin && alpha < high - margin {
        alpha
    } else {
        bisection
    }
}

pub(crate) fn displaced(r: &DVector<f64>, p: &DVector<f64>, alpha: f64) -> DVector<f64> {
    r + p * alpha
}

/// Rescales a vanishingly short search direction so the line search has something to bracket.
pub(crate) fn normalize_tiny_direction(p: &mut DVector<f64>, n_atoms: usize) {
    let floor = (n_atoms as f64 * 1e-10).sqrt();
    let norm = p.norm();
    if norm > 0.0 && norm <= floor {
        *p *= floor / norm;
    }
}

/// Runs `search` on the structure's energy along `p` from `r`, leaving the structure at the
/// accepted point. `previous_energy` seeds the initial step length.
pub(crate) fn search_structure(
    search: &LineSearch,
    structure: &mut Structure<'_>,
    r: &DVector<f64>,
    p: &DVector<f64>,
    energy0: f64,
    slope0: f64,
    previous_energy: Option<f64>,
    max_step: f64,
) -> Result<Accepted, ComputeError> {
    let longest = max_atom_norm(&unflatten(p));
    let alpha_max = if longest > 0.0 {
        (max_step / longest).min(MAX_ALPHA)
    } else {
        MAX_ALPHA
    };
    let alpha_init = previous_energy
        .map(|e| 1.01 * 2.0 * (energy0 - e) / slope0)
        .filter(|a| a.is_finite() && *a > 0.0)
        .map_or(1.0, |a| a.min(1.0));

    let accepted = search.search(
        |alpha| {
            structure.set_flat_positions(&displaced(r, p, alpha));
            let energy = structure.energy()?;
            let forces = structure.flat_forces()?;
            Ok((energy, -forces.dot(p)))
        },
        energy0,
        slope0,
        alpha_init,
        alpha_max,
    )?;
    structure.set_flat_positions(&displaced(r, p, accepted.alpha));
    Ok(accepted)
}
