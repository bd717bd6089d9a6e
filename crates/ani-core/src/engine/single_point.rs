use super::batch::Batch;
use super::error::ComputeError;
use super::statistics::{mean_and_stdev, vector_mean_and_stdev};
use crate::core::ani::AniModel;
use nalgebra::Vector3;
use serde_json::{Map, Value, json};
use tracing::{debug, instrument};

pub const ENERGY_UNITS: &str = "E_h";
pub const GRADIENT_UNITS: &str = "E_h/Å";

/// Ensemble statistics of one configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SinglePointResult {
    pub all_energies: Vec<f64>,
    pub energy: f64,
    pub energy_stdev: f64,
    pub gradients: Option<(Vec<Vector3<f64>>, Vec<Vector3<f64>>)>,
}

impl SinglePointResult {
    pub fn to_record(&self) -> Map<String, Value> {
        let mut record = Map::new();
        record.insert("all energies".to_string(), json!(self.all_energies));
        record.insert("energy".to_string(), json!(self.energy));
        record.insert("energy, stdev".to_string(), json!(self.energy_stdev));

        let mut units = Map::new();
        units.insert("energy".to_string(), json!(ENERGY_UNITS));
        if let Some((mean, stdev)) = &self.gradients {
            record.insert("gradients".to_string(), vectors_to_json(mean));
            record.insert("gradients, stdev".to_string(), vectors_to_json(stdev));
            units.insert("gradients".to_string(), json!(GRADIENT_UNITS));
        }
        record.insert("units".to_string(), Value::Object(units));
        record
    }
}

pub(crate) fn vectors_to_json(vectors: &[Vector3<f64>]) -> Value {
    Value::Array(vectors.iter().map(|v| json!([v.x, v.y, v.z])).collect())
}

/// Evaluates the selected sub-models on every row of the batch.
///
/// Either every row succeeds or the first failure is returned, so callers never see a partial
/// set of results.
#[instrument(skip_all, fields(rows = batch.len(), submodels = submodels.len()))]
pub fn evaluate(
    model: &AniModel,
    batch: &Batch,
    submodels: &[usize],
    gradients: bool,
) -> Result<Vec<SinglePointResult>, ComputeError> {
    (0..batch.len())
        .map(|row| {
            let (species, positions) = batch.molecule(row)?;
            let evaluation = model
                .evaluate(&species, &positions, submodels, gradients)
                .map_err(|e| ComputeError::Evaluation {
                    configuration: batch.label(row).to_string(),
                    source: e,
                })?;

            let (energy, energy_stdev) = mean_and_stdev(&evaluation.energies);
            debug!(
                "{}: E = {:.8} ± {:.2e} E_h over {} sub-models",
                batch.label(row),
                energy,
                energy_stdev,
                evaluation.energies.len()
            );
            Ok(SinglePointResult {
                energy,
                energy_stdev,
                gradients: evaluation
                    .gradients
                    .as_deref()
                    .map(vector_mean_and_stdev),
                all_energies: evaluation.energies,
            })
        })
        .collect()
}
