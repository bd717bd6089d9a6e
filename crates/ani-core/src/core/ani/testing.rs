//! Deterministic synthetic potentials for tests: published weights are not shipped with the
//! crate, so tests build small networks of the right shape from a fixed pseudo-random sequence.

use super::loader::{MANIFEST_FILE, model_path};
use super::model::{AniModel, SubModel};
use super::network::{AtomicNetwork, DEFAULT_CELU_ALPHA, Layer};
use super::parameterization::Parameterization;
use nalgebra::{DMatrix, DVector};
use serde_json::{Map, Value, json};
use std::fs;
use std::path::Path;

const DEFAULT_HIDDEN: usize = 8;

fn self_energy(symbol: &str) -> f64 {
    match symbol {
        "H" => -0.600952980000,
        "C" => -38.08316124,
        "N" => -54.7077577,
        "O" => -75.19446356,
        "S" => -398.1577,
        "F" => -99.80348,
        "Cl" => -460.1467,
        _ => 0.0,
    }
}

/// Small values in `[-scale, scale]` from a fixed integer hash.
fn pseudo_random(seed: usize, index: usize, scale: f64) -> f64 {
    let mut x = (seed as u64)
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add((index as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9));
    x ^= x >> 31;
    x = x.wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^= x >> 29;
    let unit = (x % 10_000) as f64 / 10_000.0;
    (2.0 * unit - 1.0) * scale
}

fn synthetic_layers(seed: usize, input: usize, hidden: usize) -> Vec<Layer> {
    let shapes = [(hidden, input, 0.05), (hidden, hidden, 0.3), (1, hidden, 0.3)];
    shapes
        .iter()
        .enumerate()
        .map(|(l, &(rows, cols, scale))| {
            let layer_seed = seed * 31 + l;
            Layer {
                weights: DMatrix::from_fn(rows, cols, |r, c| {
                    pseudo_random(layer_seed, r * cols + c, scale)
                }),
                bias: DVector::from_fn(rows, |r, _| pseudo_random(layer_seed + 7, r, 0.1)),
            }
        })
        .collect()
}

fn network_seed(submodel: usize, species: usize) -> usize {
    1 + submodel * 101 + species * 13
}

pub fn synthetic_model(parameterization: Parameterization, n_submodels: usize) -> AniModel {
    let species = parameterization.species();
    let input = parameterization.aev_params().length(species.len());
    let submodels = (0..n_submodels)
        .map(|m| {
            SubModel::new(
                (0..species.len())
                    .map(|s| {
                        AtomicNetwork::new(
                            synthetic_layers(network_seed(m, s), input, DEFAULT_HIDDEN),
                            DEFAULT_CELU_ALPHA,
                        )
                        .unwrap()
                    })
                    .collect(),
            )
        })
        .collect();
    let self_energies = species.iter().map(|s| self_energy(s)).collect();
    AniModel::new(parameterization, self_energies, submodels)
}

/// Writes a model directory for `parameterization` under `model_dir` in the on-disk layout
/// read by [`super::loader::load`].
pub fn write_synthetic_model(
    model_dir: &Path,
    parameterization: Parameterization,
    n_submodels: usize,
    hidden: usize,
) {
    let dir = model_path(model_dir, parameterization);
    fs::create_dir_all(&dir).unwrap();

    let species = parameterization.species();
    let input = parameterization.aev_params().length(species.len());
    let files: Vec<String> = (0..n_submodels).map(|m| format!("network-{m}.json")).collect();

    let quoted = |items: &[String]| {
        items
            .iter()
            .map(|s| format!("\"{s}\""))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let species_names: Vec<String> = species.iter().map(|s| s.to_string()).collect();
    let mut manifest = format!(
        "species = [{}]\ncelu-alpha = {}\nsubmodels = [{}]\n\n[self-energies]\n",
        quoted(&species_names),
        DEFAULT_CELU_ALPHA,
        quoted(&files)
    );
    for symbol in species {
        manifest.push_str(&format!("{symbol} = {:?}\n", self_energy(symbol)));
    }
    fs::write(dir.join(MANIFEST_FILE), manifest).unwrap();

    for (m, file) in files.iter().enumerate() {
        let mut networks = Map::new();
        for (s, symbol) in species.iter().enumerate() {
            let layers: Vec<Value> = synthetic_layers(network_seed(m, s), input, hidden)
                .iter()
                .map(|layer| {
                    let weights: Vec<Vec<f64>> = layer
                        .weights
                        .row_iter()
                        .map(|row| row.iter().copied().collect())
                        .collect();
                    json!({ "weights": weights, "bias": layer.bias.as_slice() })
                })
                .collect();
            networks.insert(symbol.to_string(), Value::Array(layers));
        }
        fs::write(dir.join(file), Value::Object(networks).to_string()).unwrap();
    }
}

#[test]
fn written_models_match_the_in_memory_fixture() {
    let dir = tempfile::tempdir().unwrap();
    write_synthetic_model(dir.path(), Parameterization::Ani1x, 2, DEFAULT_HIDDEN);
    let loaded = super::loader::load(dir.path(), Parameterization::Ani1x).unwrap();
    let built = synthetic_model(Parameterization::Ani1x, 2);

    let species = [1, 0, 0];
    let positions = [
        nalgebra::Vector3::new(0.0, 0.0, 0.0),
        nalgebra::Vector3::new(1.09, 0.0, 0.0),
        nalgebra::Vector3::new(-0.36, 1.03, 0.0),
    ];
    let a = loaded.evaluate(&species, &positions, &[0, 1], false).unwrap();
    let b = built.evaluate(&species, &positions, &[0, 1], false).unwrap();
    for (x, y) in a.energies.iter().zip(&b.energies) {
        assert!((x - y).abs() < 1e-9);
    }
}
