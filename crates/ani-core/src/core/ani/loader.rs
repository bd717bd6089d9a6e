use super::model::{AniModel, SubModel};
use super::network::{AtomicNetwork, DEFAULT_CELU_ALPHA, Layer, NetworkShapeError};
use super::parameterization::Parameterization;
use nalgebra::{DMatrix, DVector};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub const MANIFEST_FILE: &str = "manifest.toml";

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ModelManifest {
    pub species: Vec<String>,
    #[serde(default = "default_celu_alpha")]
    pub celu_alpha: f64,
    pub self_energies: HashMap<String, f64>,
    pub submodels: Vec<String>,
}

fn default_celu_alpha() -> f64 {
    DEFAULT_CELU_ALPHA
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LayerFile {
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
}

/// One sub-model on disk: species symbol to its layers, input side first.
pub type SubModelFile = HashMap<String, Vec<LayerFile>>;

#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("Model directory '{0}' does not exist")]
    MissingDirectory(String),
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    #[error("JSON parsing error for '{path}': {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
    #[error("Manifest species {found:?} do not match the {parameterization} species {expected:?}")]
    SpeciesMismatch {
        parameterization: Parameterization,
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[error("Manifest has no self energy for '{0}'")]
    MissingSelfEnergy(String),
    #[error("Sub-model '{path}' has no network for '{species}'")]
    MissingNetwork { path: String, species: String },
    #[error("Layer {layer} of the '{species}' network in '{path}' has ragged weight rows")]
    RaggedWeights {
        path: String,
        species: String,
        layer: usize,
    },
    #[error("Network for '{species}' in '{path}' is malformed: {source}")]
    Shape {
        path: String,
        species: String,
        source: NetworkShapeError,
    },
    #[error(
        "Network for '{species}' in '{path}' takes {found} inputs, but the environment vector has {expected}"
    )]
    InputWidth {
        path: String,
        species: String,
        expected: usize,
        found: usize,
    },
    #[error("Manifest in '{0}' lists no sub-models")]
    NoSubmodels(String),
}

fn display(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Directory holding the files of one parameterization.
pub fn model_path(model_dir: &Path, parameterization: Parameterization) -> PathBuf {
    model_dir.join(parameterization.directory_name())
}

pub fn load(model_dir: &Path, parameterization: Parameterization) -> Result<AniModel, ModelLoadError> {
    let dir = model_path(model_dir, parameterization);
    if !dir.is_dir() {
        return Err(ModelLoadError::MissingDirectory(display(&dir)));
    }
    info!(
        "Loading {} from '{}'",
        parameterization,
        dir.to_string_lossy()
    );

    let manifest = load_manifest(&dir.join(MANIFEST_FILE))?;
    let species = parameterization.species();
    if manifest.species.iter().map(String::as_str).ne(species.iter().copied()) {
        return Err(ModelLoadError::SpeciesMismatch {
            parameterization,
            expected: species.iter().map(|s| s.to_string()).collect(),
            found: manifest.species.clone(),
        });
    }
    if manifest.submodels.is_empty() {
        return Err(ModelLoadError::NoSubmodels(display(&dir)));
    }

    let self_energies = species
        .iter()
        .map(|s| {
            manifest
                .self_energies
                .get(*s)
                .copied()
                .ok_or_else(|| ModelLoadError::MissingSelfEnergy(s.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let aev_length = parameterization.aev_params().length(species.len());
    let submodels = manifest
        .submodels
        .iter()
        .map(|file| load_submodel(&dir.join(file), species, aev_length, manifest.celu_alpha))
        .collect::<Result<Vec<_>, _>>()?;

    debug!(
        "{} loaded with {} sub-models and AEV length {}",
        parameterization,
        submodels.len(),
        aev_length
    );
    Ok(AniModel::new(parameterization, self_energies, submodels))
}

fn load_manifest(path: &Path) -> Result<ModelManifest, ModelLoadError> {
    let content = std::fs::read_to_string(path).map_err(|e| ModelLoadError::Io {
        path: display(path),
        source: e,
    })?;
    toml::from_str(&content).map_err(|e| ModelLoadError::Toml {
        path: display(path),
        source: e,
    })
}

fn load_submodel(
    path: &Path,
    species: &[&str],
    aev_length: usize,
    alpha: f64,
) -> Result<SubModel, ModelLoadError> {
    let content = std::fs::read_to_string(path).map_err(|e| ModelLoadError::Io {
        path: display(path),
        source: e,
    })?;
    let mut file: SubModelFile =
        serde_json::from_str(&content).map_err(|e| ModelLoadError::Json {
            path: display(path),
            source: e,
        })?;

    let networks = species
        .iter()
        .map(|symbol| {
            let layers = file
                .remove(*symbol)
                .ok_or_else(|| ModelLoadError::MissingNetwork {
                    path: display(path),
                    species: symbol.to_string(),
                })?;
            build_network(path, symbol, layers, aev_length, alpha)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(SubModel::new(networks))
}

fn build_network(
    path: &Path,
    species: &str,
    layers: Vec<LayerFile>,
    aev_length: usize,
    alpha: f64,
) -> Result<AtomicNetwork, ModelLoadError> {
    let layers = layers
        .into_iter()
        .enumerate()
        .map(|(i, layer)| {
            let rows = layer.weights.len();
            let cols = layer.weights.first().map_or(0, Vec::len);
            if layer.weights.iter().any(|row| row.len() != cols) {
                return Err(ModelLoadError::RaggedWeights {
                    path: display(path),
                    species: species.to_string(),
                    layer: i,
                });
            }
            Ok(Layer {
                weights: DMatrix::from_row_iterator(rows, cols, layer.weights.into_iter().flatten()),
                bias: DVector::from_vec(layer.bias),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let network = AtomicNetwork::new(layers, alpha).map_err(|e| ModelLoadError::Shape {
        path: display(path),
        species: species.to_string(),
        source: e,
    })?;
    if network.input_width() != aev_length {
        return Err(ModelLoadError::InputWidth {
            path: display(path),
            species: species.to_string(),
            expected: aev_length,
            found: network.input_width(),
        });
    }
    Ok(network)
}
