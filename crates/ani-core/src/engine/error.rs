use thiserror::Error;

use super::config::ConfigError;
use crate::core::ani::{EvaluationError, ModelLoadError, Parameterization, SelectionError};
use crate::core::schema::FormatError;

/// Problems with what a document asks for. Always fatal for the run.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(
        "Unknown minimizer '{0}'. Expected one of: BFGS, LBFGS, BFGSLineSearch, LBFGSLineSearch, GPMin, FIRE, MDMin."
    )]
    UnknownMinimizer(String),

    #[error("Unknown required result '{0}'")]
    UnknownResultKind(String),

    #[error("Invalid sub-model selection '{expression}': {reason}")]
    InvalidSubmodel { expression: String, reason: String },

    #[error("Sub-model {index} was requested but {parameterization} has {size} sub-models")]
    SubmodelOutOfRange {
        parameterization: Parameterization,
        index: usize,
        size: usize,
    },

    #[error("Convergence threshold must be a positive number, got {0}")]
    InvalidConvergence(f64),

    #[error("{configuration} has periodicity {periodicity}; only molecules (0) are supported")]
    UnsupportedPeriodicity {
        configuration: String,
        periodicity: i64,
    },

    #[error("{configuration} has coordinates in '{units}'; they must be in Ångström")]
    UnsupportedUnits {
        configuration: String,
        units: String,
    },

    #[error("{configuration} uses the '{system}' coordinate system; only Cartesian is supported")]
    UnsupportedCoordinateSystem {
        configuration: String,
        system: String,
    },

    #[error("{configuration} contains '{symbol}', which is not an element symbol")]
    UnknownElement {
        configuration: String,
        symbol: String,
    },

    #[error("{configuration} contains '{symbol}', which {parameterization} does not cover")]
    UncoveredElement {
        configuration: String,
        symbol: String,
        parameterization: Parameterization,
    },

    #[error("{configuration} has {symbols} symbols but {coordinates} coordinate triples")]
    CoordinateCount {
        configuration: String,
        symbols: usize,
        coordinates: usize,
    },

    #[error("Failed to load the model: {0}")]
    Model(#[from] ModelLoadError),
}

/// Failures while evaluating or minimizing. Recorded on the step; the run continues.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Evaluation of {configuration} failed")]
    Evaluation {
        configuration: String,
        #[source]
        source: EvaluationError,
    },

    #[error("Batch row {row} has {found} atoms but the batch is {width} wide")]
    BatchShape {
        row: usize,
        width: usize,
        found: usize,
    },

    #[error("Line search failed: {0}")]
    LineSearch(String),

    #[error("GPMin failed after {attempts} attempts: a descent model could not be built")]
    NoDescentModel { attempts: usize },

    #[error("The GPMin surrogate model failed: {0}")]
    Surrogate(String),

    #[error("The minimizer produced a non-finite {0}")]
    NonFinite(&'static str),

    #[error("Optimization of {configuration} failed")]
    Optimization {
        configuration: String,
        #[source]
        source: Box<ComputeError>,
    },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid document: {0}")]
    Format(#[from] FormatError),

    #[error("Invalid workflow step {step}: {source}")]
    Configuration {
        step: usize,
        #[source]
        source: ConfigurationError,
    },

    #[error("Invalid run configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Computation failed: {0}")]
    Compute(#[from] ComputeError),
}

/// Formats an error and its chain of causes the way they are recorded on a failed step.
pub fn error_trace(error: &(dyn std::error::Error + 'static)) -> String {
    let mut trace = error.to_string();
    let mut source = error.source();
    if source.is_some() {
        trace.push_str("\n\nCaused by:");
    }
    let mut depth = 0;
    while let Some(cause) = source {
        trace.push_str(&format!("\n    {}: {}", depth, cause));
        depth += 1;
        source = cause.source();
    }
    trace
}
