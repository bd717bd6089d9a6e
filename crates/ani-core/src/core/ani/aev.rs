//! Atomic environment vectors (AEVs).
//!
//! Each atom's environment is described by radial terms, one block per neighbour species,
//! followed by angular terms, one block per unordered pair of neighbour species. The
//! functional forms and constants match the published ANI potentials:
//!
//! - radial: `0.25 · exp(-ηR (r - Rs)²) · fc(r)`
//! - angular: `2 · ((1 + cos(θ - θs)) / 2)^ζ · exp(-ηA ((rij + rik)/2 - Rs)²) · fc(rij) · fc(rik)`
//!   with `θ = acos(0.95 · cos θijk)`
//! - cutoff: `fc(r) = 0.5 · cos(π r / Rc) + 0.5` for `r ≤ Rc`, zero beyond
//!
//! [`AevComputer::backward`] is the adjoint of [`AevComputer::compute`]: given per-atom weights
//! `∂E/∂AEV` it returns `∂E/∂x` for every coordinate, which is how forces are obtained without
//! ever materializing the AEV Jacobian.

use nalgebra::{DVector, Vector3};
use rayon::prelude::*;
use std::f64::consts::PI;

/// Scale applied to cos θ before taking the arc cosine; keeps the derivative finite for
/// collinear triples.
const ANGLE_COSINE_SCALE: f64 = 0.95;

#[derive(Debug, Clone, PartialEq)]
pub struct AevParams {
    pub radial_cutoff: f64,
    pub angular_cutoff: f64,
    pub radial_eta: f64,
    pub radial_shifts: Vec<f64>,
    pub angular_eta: f64,
    pub angular_zeta: f64,
    pub angular_shifts: Vec<f64>,
    pub angle_sections: Vec<f64>,
}

impl AevParams {
    pub fn radial_sublength(&self) -> usize {
        self.radial_shifts.len()
    }

    pub fn angular_sublength(&self) -> usize {
        self.angular_shifts.len() * self.angle_sections.len()
    }

    pub fn length(&self, n_species: usize) -> usize {
        n_species * self.radial_sublength()
            + n_species * (n_species + 1) / 2 * self.angular_sublength()
    }
}

#[derive(Debug, Clone)]
pub struct AevComputer {
    params: AevParams,
    n_species: usize,
}

/// A neighbour of a central atom: index, distance, and the vector from the center to it.
#[derive(Debug, Clone, Copy)]
struct Neighbor {
    index: usize,
    distance: f64,
    vector: Vector3<f64>,
}

impl AevComputer {
    pub fn new(params: AevParams, n_species: usize) -> Self {
        Self { params, n_species }
    }

    pub fn params(&self) -> &AevParams {
        &self.params
    }

    pub fn n_species(&self) -> usize {
        self.n_species
    }

    pub fn length(&self) -> usize {
        self.params.length(self.n_species)
    }

    fn radial_length(&self) -> usize {
        self.n_species * self.params.radial_sublength()
    }

    /// Index of the unordered species pair `(a, b)` in upper-triangular, row-major order.
    fn pair_index(&self, a: usize, b: usize) -> usize {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        lo * self.n_species - lo * (lo.saturating_sub(1)) / 2 - lo + hi
    }

    fn neighbors(
        &self,
        center: usize,
        positions: &[Vector3<f64>],
        cutoff: f64,
    ) -> Vec<Neighbor> {
        let origin = positions[center];
        positions
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != center)
            .filter_map(|(j, p)| {
                let vector = p - origin;
                let distance = vector.norm();
                (distance <= cutoff).then_some(Neighbor {
                    index: j,
                    distance,
                    vector,
                })
            })
            .collect()
    }

    /// Computes the AEV of every atom. `species` holds species indices, one per position.
    pub fn compute(&self, species: &[usize], positions: &[Vector3<f64>]) -> Vec<DVector<f64>> {
        (0..positions.len())
            .into_par_iter()
            .map(|i| self.compute_atom(i, species, positions))
            .collect()
    }

    fn compute_atom(
        &self,
        center: usize,
        species: &[usize],
        positions: &[Vector3<f64>],
    ) -> DVector<f64> {
        let p = &self.params;
        let mut aev = DVector::zeros(self.length());
        let n_radial = p.radial_sublength();

        let radial_neighbors = self.neighbors(center, positions, p.radial_cutoff);
        for neighbor in &radial_neighbors {
            let offset = species[neighbor.index] * n_radial;
            let fc = cutoff_cosine(neighbor.distance, p.radial_cutoff);
            for (k, shift) in p.radial_shifts.iter().enumerate() {
                let delta = neighbor.distance - shift;
                aev[offset + k] += 0.25 * (-p.radial_eta * delta * delta).exp() * fc;
            }
        }

        let angular_neighbors: Vec<&Neighbor> = radial_neighbors
            .iter()
            .filter(|n| n.distance <= p.angular_cutoff)
            .collect();
        let n_sections = p.angle_sections.len();
        let radial_length = self.radial_length();

        for (m, a) in angular_neighbors.iter().enumerate() {
            for b in angular_neighbors.iter().skip(m + 1) {
                let geometry = TripleGeometry::new(a, b, p.angular_cutoff);
                let base = radial_length
                    + self.pair_index(species[a.index], species[b.index]) * p.angular_sublength();

                for (ai, shift) in p.angular_shifts.iter().enumerate() {
                    let delta = geometry.mean_distance - shift;
                    let radial_factor = (-p.angular_eta * delta * delta).exp();
                    for (zi, section) in p.angle_sections.iter().enumerate() {
                        let half = 0.5 * (1.0 + (geometry.theta - section).cos());
                        let angular_factor = half.powf(p.angular_zeta);
                        aev[base + ai * n_sections + zi] +=
                            2.0 * angular_factor * radial_factor * geometry.fc_product;
                    }
                }
            }
        }

        aev
    }

    /// Returns `∂/∂x Σᵢ wᵢ · AEVᵢ(x)` for every atom, where `weights[i]` has the AEV length.
    pub fn backward(
        &self,
        species: &[usize],
        positions: &[Vector3<f64>],
        weights: &[DVector<f64>],
    ) -> Vec<Vector3<f64>> {
        let n = positions.len();
        (0..n)
            .into_par_iter()
            .fold(
                || vec![Vector3::zeros(); n],
                |mut grad, i| {
                    self.backward_atom(i, species, positions, &weights[i], &mut grad);
                    grad
                },
            )
            .reduce(
                || vec![Vector3::zeros(); n],
                |mut a, b| {
                    for (x, y) in a.iter_mut().zip(b) {
                        *x += y;
                    }
                    a
                },
            )
    }

    fn backward_atom(
        &self,
        center: usize,
        species: &[usize],
        positions: &[Vector3<f64>],
        weights: &DVector<f64>,
        grad: &mut [Vector3<f64>],
    ) {
        let p = &self.params;
        let n_radial = p.radial_sublength();

        let radial_neighbors = self.neighbors(center, positions, p.radial_cutoff);
        for neighbor in &radial_neighbors {
            let offset = species[neighbor.index] * n_radial;
            let fc = cutoff_cosine(neighbor.distance, p.radial_cutoff);
            let dfc = cutoff_cosine_derivative(neighbor.distance, p.radial_cutoff);

            let mut d_distance = 0.0;
            for (k, shift) in p.radial_shifts.iter().enumerate() {
                let delta = neighbor.distance - shift;
                let gaussian = (-p.radial_eta * delta * delta).exp();
                let d_term = 0.25 * gaussian * (-2.0 * p.radial_eta * delta * fc + dfc);
                d_distance += weights[offset + k] * d_term;
            }

            let g = neighbor.vector * (d_distance / neighbor.distance);
            grad[neighbor.index] += g;
            grad[center] -= g;
        }

        let angular_neighbors: Vec<&Neighbor> = radial_neighbors
            .iter()
            .filter(|n| n.distance <= p.angular_cutoff)
            .collect();
        let n_sections = p.angle_sections.len();
        let radial_length = self.radial_length();
        let zeta = p.angular_zeta;

        for (m, a) in angular_neighbors.iter().enumerate() {
            for b in angular_neighbors.iter().skip(m + 1) {
                let geometry = TripleGeometry::new(a, b, p.angular_cutoff);
                let base = radial_length
                    + self.pair_index(species[a.index], species[b.index]) * p.angular_sublength();

                let mut d_cosine = 0.0;
                let mut d_ra = 0.0;
                let mut d_rb = 0.0;

                for (ai, shift) in p.angular_shifts.iter().enumerate() {
                    let delta = geometry.mean_distance - shift;
                    let radial_factor = (-p.angular_eta * delta * delta).exp();
                    let d_radial_factor = radial_factor * (-2.0 * p.angular_eta * delta) * 0.5;

                    for (zi, section) in p.angle_sections.iter().enumerate() {
                        let w = weights[base + ai * n_sections + zi];
                        if w == 0.0 {
                            continue;
                        }
                        let shifted = geometry.theta - section;
                        let half = 0.5 * (1.0 + shifted.cos());
                        let angular_factor = half.powf(zeta);
                        let d_angular_factor = zeta * half.powf(zeta - 1.0) * (-0.5 * shifted.sin());

                        d_cosine += w
                            * 2.0
                            * d_angular_factor
                            * geometry.d_theta_d_cosine
                            * radial_factor
                            * geometry.fc_product;
                        d_ra += w
                            * 2.0
                            * angular_factor
                            * (d_radial_factor * geometry.fc_product
                                + radial_factor * geometry.dfc_a * geometry.fc_b);
                        d_rb += w
                            * 2.0
                            * angular_factor
                            * (d_radial_factor * geometry.fc_product
                                + radial_factor * geometry.fc_a * geometry.dfc_b);
                    }
                }

                let (ra, rb) = (a.distance, b.distance);
                let cosine = geometry.cosine;
                let dc_da = b.vector / (ra * rb) - a.vector * (cosine / (ra * ra));
                let dc_db = a.vector / (ra * rb) - b.vector * (cosine / (rb * rb));

                let ga = dc_da * d_cosine + a.vector * (d_ra / ra);
                let gb = dc_db * d_cosine + b.vector * (d_rb / rb);

                grad[a.index] += ga;
                grad[b.index] += gb;
                grad[center] -= ga + gb;
            }
        }
    }
}

/// Shared quantities for one center and an unordered pair of its neighbours.
struct TripleGeometry {
    cosine: f64,
    theta: f64,
    d_theta_d_cosine: f64,
    mean_distance: f64,
    fc_a: f64,
    fc_b: f64,
    dfc_a: f64,
    dfc_b: f64,
    fc_product: f64,
}

impl TripleGeometry {
    fn new(a: &Neighbor, b: &Neighbor, cutoff: f64) -> Self {
        let cosine = a.vector.dot(&b.vector) / (a.distance * b.distance);
        let scaled = ANGLE_COSINE_SCALE * cosine;
        let fc_a = cutoff_cosine(a.distance, cutoff);
        let fc_b = cutoff_cosine(b.distance, cutoff);
        Self {
            cosine,
            theta: scaled.acos(),
            d_theta_d_cosine: -ANGLE_COSINE_SCALE / (1.0 - scaled * scaled).sqrt(),
            mean_distance: 0.5 * (a.distance + b.distance),
            fc_a,
            fc_b,
            dfc_a: cutoff_cosine_derivative(a.distance, cutoff),
            dfc_b: cutoff_cosine_derivative(b.distance, cutoff),
            fc_product: fc_a * fc_b,
        }
    }
}

pub fn cutoff_cosine(r: f64, cutoff: f64) -> f64 {
    if r > cutoff {
        0.0
    } else {
        0.5 * (PI * r / cutoff).cos() + 0.5
    }
}

pub fn cutoff_cosine_derivative(r: f64, cutoff: f64) -> f64 {
    if r > cutoff {
        0.0
    } else {
        -0.5 * (PI / cutoff) * (PI * r / cutoff).sin()
    }
}
