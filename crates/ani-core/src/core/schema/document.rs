use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key under which results records are stored on a configuration.
pub const RESULTS_DATA_KEY: &str = "data";

/// A parsed `cms_schema` workflow document.
///
/// Only the fields the driver reads or writes are typed. Every other key, at every level, is
/// captured in an `extra` map so that reading and writing a document preserves its content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// The schema name; `cms_schema` for every document this driver accepts.
    #[serde(rename = "schema name")]
    pub schema_name: String,
    /// The schema version, echoed verbatim (string or number).
    #[serde(rename = "schema version")]
    pub schema_version: Value,
    /// The workflow steps, executed in order.
    pub workflow: Vec<Step>,
    /// The molecular systems every step operates on.
    pub systems: Vec<System>,
    /// Run-wide control parameters, passed through untouched.
    #[serde(
        rename = "control parameters",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub control_parameters: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Document {
    /// The schema version as it appears in the header line.
    pub fn version_label(&self) -> String {
        match &self.schema_version {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Iterates over every configuration of every system, in document order.
    pub fn configurations(&self) -> impl Iterator<Item = &Configuration> {
        self.systems.iter().flat_map(|s| s.configurations.iter())
    }

    pub fn configurations_mut(&mut self) -> impl Iterator<Item = &mut Configuration> {
        self.systems
            .iter_mut()
            .flat_map(|s| s.configurations.iter_mut())
    }

    pub fn configuration_count(&self) -> usize {
        self.systems.iter().map(|s| s.configurations.len()).sum()
    }
}

/// One stage of the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// The potential to use.
    pub model: ModelSpec,
    /// Result kinds requested. The energy is always computed.
    #[serde(
        rename = "required results",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub required_results: Option<Vec<String>>,
    /// Minimizer name, for optimization steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimizer: Option<String>,
    /// Force convergence threshold in eV/Å, for optimization steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convergence: Option<f64>,
    /// Maximum number of minimizer steps, for optimization steps.
    #[serde(
        rename = "maximum steps",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub maximum_steps: Option<u64>,
    /// Set once the step has run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    /// A formatted error trace, set when the step failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Step {
    pub fn requires(&self, kind: &str) -> bool {
        self.required_results
            .as_ref()
            .is_some_and(|kinds| kinds.iter().any(|k| k == kind))
    }

    pub fn record_success(&mut self) {
        self.success = Some(true);
        self.error = None;
    }

    pub fn record_failure(&mut self, trace: String) {
        self.success = Some(false);
        self.error = Some(trace);
    }
}

/// The model block of a step: `{"method": "ML", "model": "ANI", "parameterization": "ANI-2x"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    pub model: String,
    pub parameterization: String,
    /// Sub-model selection: `"all"`, an index, or an expression such as `"0,2-4"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submodel: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A group of configurations (conformers or states) of one molecular system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct System {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub configurations: Vec<Configuration>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One concrete set of atomic species and positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// 0 for molecules; periodic systems are not supported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub periodicity: Option<i64>,
    pub symbols: Vec<String>,
    pub coordinates: Coordinates,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Results>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Configuration {
    pub fn n_atoms(&self) -> usize {
        self.symbols.len()
    }

    pub fn periodicity(&self) -> i64 {
        self.periodicity.unwrap_or(0)
    }

    /// A label for log messages and error reports.
    pub fn label(&self, index: usize) -> String {
        match &self.name {
            Some(name) => format!("configuration {} ('{}')", index, name),
            None => format!("configuration {}", index),
        }
    }

    /// Appends a results record, creating the `results` block if needed and refreshing its
    /// provenance.
    pub fn append_result(&mut self, provenance: Map<String, Value>, record: Map<String, Value>) {
        let results = self.results.get_or_insert_with(Results::default);
        results.provenance = Some(provenance);
        results.data.push(record);
    }
}

/// Atomic coordinates with their unit and coordinate-system tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub values: Vec<[f64; 3]>,
    pub units: String,
    #[serde(rename = "coordinate system")]
    pub coordinate_system: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The results block appended to a configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Results {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Map<String, Value>>,
    #[serde(default)]
    pub data: Vec<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
