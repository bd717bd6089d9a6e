//! Validation of workflow steps and configurations into execution plans.
//!
//! Everything a document asks for is checked here, before any model is evaluated, so that a
//! bad name or an unsupported configuration fails the run without partial results.

use super::error::ConfigurationError;
use super::optimize::Minimizer;
use crate::core::ani::Parameterization;
use crate::core::elements::is_known_element;
use crate::core::schema::{Configuration, Step};
use serde_json::Value;
use std::fmt;

pub const DEFAULT_MINIMIZER: Minimizer = Minimizer::Bfgs;
/// Largest per-atom force, in eV/Å, at which an optimization is converged.
pub const DEFAULT_CONVERGENCE: f64 = 0.05;
pub const DEFAULT_MAXIMUM_STEPS: u64 = 1000;

const ACCEPTED_UNITS: [&str; 3] = ["Å", "Angstrom", "angstrom"];
const CARTESIAN: &str = "Cartesian";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    Energy,
    Gradients,
    OptimizedStructure,
}

const RESULT_KINDS: [(&str, ResultKind); 3] = [
    ("energy", ResultKind::Energy),
    ("gradients", ResultKind::Gradients),
    ("optimized structure", ResultKind::OptimizedStructure),
];

impl ResultKind {
    pub fn from_name(name: &str) -> Result<Self, ConfigurationError> {
        RESULT_KINDS
            .iter()
            .find(|(n, _)| *n == name.trim())
            .map(|(_, k)| *k)
            .ok_or_else(|| ConfigurationError::UnknownResultKind(name.to_string()))
    }
}

/// Which members of an ensemble a step uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmodelSelection {
    All,
    /// Inclusive `(start, end)` ranges, sorted and merged. They are only expanded once the
    /// ensemble size is known.
    Ranges(Vec<(usize, usize)>),
}

impl SubmodelSelection {
    /// Parses the `submodel` value of a step: absent or `"all"`, a single index, or a
    /// comma-separated list of indices and inclusive ranges such as `"0,2-4"`.
    pub fn parse(value: Option<&Value>) -> Result<Self, ConfigurationError> {
        match value {
            None | Some(Value::Null) => Ok(Self::All),
            Some(Value::Number(n)) => n
                .as_u64()
                .map(|i| Self::Ranges(vec![(i as usize, i as usize)]))
                .ok_or_else(|| invalid_submodel(&n.to_string(), "not a non-negative integer")),
            Some(Value::String(s)) => Self::parse_expression(s),
            Some(other) => Err(invalid_submodel(
                &other.to_string(),
                "expected \"all\", an index, or a list such as \"0,2-4\"",
            )),
        }
    }

    fn parse_expression(expression: &str) -> Result<Self, ConfigurationError> {
        if expression.trim().eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        let mut ranges = Vec::new();
        for part in expression.split(',').map(str::trim) {
            if part.is_empty() {
                return Err(invalid_submodel(expression, "empty list entry"));
            }
            let index = |text: &str| {
                text.trim()
                    .parse::<usize>()
                    .map_err(|_| invalid_submodel(expression, &format!("'{}' is not an index", text.trim())))
            };
            match part.split_once('-') {
                Some((start, end)) => {
                    let (start, end) = (index(start)?, index(end)?);
                    if start > end {
                        return Err(invalid_submodel(
                            expression,
                            &format!("range {}-{} is reversed", start, end),
                        ));
                    }
                    ranges.push((start, end));
                }
                None => {
                    let i = index(part)?;
                    ranges.push((i, i));
                }
            }
        }
        ranges.sort_unstable();
        let mut merged: Vec<(usize, usize)> = Vec::with_capacity(ranges.len());
        for (start, end) in ranges {
            match merged.last_mut() {
                Some(last) if start <= last.1.saturating_add(1) => last.1 = last.1.max(end),
                _ => merged.push((start, end)),
            }
        }
        Ok(Self::Ranges(merged))
    }

    /// Concrete sub-model indices for an ensemble of `size` members.
    pub fn resolve(
        &self,
        parameterization: Parameterization,
        size: usize,
    ) -> Result<Vec<usize>, ConfigurationError> {
        match self {
            Self::All => Ok((0..size).collect()),
            Self::Ranges(ranges) => {
                if let Some(&(start, _)) = ranges.iter().find(|(_, end)| *end >= size) {
                    return Err(ConfigurationError::SubmodelOutOfRange {
                        parameterization,
                        index: start.max(size),
                        size,
                    });
                }
                Ok(ranges.iter().flat_map(|&(start, end)| start..=end).collect())
            }
        }
    }
}

impl fmt::Display for SubmodelSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Ranges(ranges) => {
                let list: Vec<String> = ranges
                    .iter()
                    .map(|&(start, end)| match start == end {
                        true => start.to_string(),
                        false => format!("{}-{}", start, end),
                    })
                    .collect();
                f.write_str(&list.join(","))
            }
        }
    }
}

fn invalid_submodel(expression: &str, reason: &str) -> ConfigurationError {
    ConfigurationError::InvalidSubmodel {
        expression: expression.to_string(),
        reason: reason.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizationSettings {
    pub minimizer: Minimizer,
    /// eV/Å
    pub fmax: f64,
    pub max_steps: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepTask {
    SinglePoint { gradients: bool },
    Optimization(OptimizationSettings),
}

/// A validated workflow step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepPlan {
    pub parameterization: Parameterization,
    pub submodels: SubmodelSelection,
    pub task: StepTask,
}

impl StepPlan {
    pub fn from_step(step: &Step) -> Result<Self, ConfigurationError> {
        let parameterization =
            Parameterization::select(&step.model.model, &step.model.parameterization)?;
        let submodels = SubmodelSelection::parse(step.model.submodel.as_ref())?;

        let kinds = step
            .required_results
            .iter()
            .flatten()
            .map(|name| ResultKind::from_name(name))
            .collect::<Result<Vec<_>, _>>()?;

        let task = if kinds.contains(&ResultKind::OptimizedStructure) {
            let minimizer = match &step.minimizer {
                Some(name) => Minimizer::from_name(name)
                    .ok_or_else(|| ConfigurationError::UnknownMinimizer(name.clone()))?,
                None => DEFAULT_MINIMIZER,
            };
            let fmax = step.convergence.unwrap_or(DEFAULT_CONVERGENCE);
            if !(fmax.is_finite() && fmax > 0.0) {
                return Err(ConfigurationError::InvalidConvergence(fmax));
            }
            StepTask::Optimization(OptimizationSettings {
                minimizer,
                fmax,
                max_steps: step.maximum_steps.unwrap_or(DEFAULT_MAXIMUM_STEPS),
            })
        } else {
            StepTask::SinglePoint {
                gradients: kinds.contains(&ResultKind::Gradients),
            }
        };

        Ok(Self {
            parameterization,
            submodels,
            task,
        })
    }

    /// A human-readable summary of what the step will do.
    pub fn description(&self) -> String {
        let model = self.parameterization;
        let mut text = match &self.task {
            StepTask::SinglePoint { gradients: true } => format!(
                "Calculating the energy and gradients using the ANI machine learning model {}.",
                model
            ),
            StepTask::SinglePoint { gradients: false } => format!(
                "Calculating the energy using the ANI machine learning model {}.",
                model
            ),
            StepTask::Optimization(settings) => format!(
                "Optimizing the structure with the {} minimizer using the ANI machine learning \
                 model {}, until the largest force is below {} eV/Å or {} steps have been taken.",
                settings.minimizer, model, settings.fmax, settings.max_steps
            ),
        };
        match &self.submodels {
            SubmodelSelection::All => text.push_str(
                " All the parameterizations of the model will be used, and the results averaged.",
            ),
            SubmodelSelection::Ranges(ranges) if ranges.len() == 1 && ranges[0].0 == ranges[0].1 => {
                text.push_str(&format!(
                    " The {} parameterization of the model will be used.",
                    ranges[0].0
                ))
            }
            selection => text.push_str(&format!(
                " These parameterizations of the model will be used: {}, and the results will be averaged.",
                selection
            )),
        }
        text
    }
}

/// Checks that a configuration can be evaluated with `parameterization`.
pub fn validate_configuration(
    configuration: &Configuration,
    index: usize,
    parameterization: Parameterization,
) -> Result<(), ConfigurationError> {
    let label = || configuration.label(index);

    let periodicity = configuration.periodicity();
    if periodicity != 0 {
        return Err(ConfigurationError::UnsupportedPeriodicity {
            configuration: label(),
            periodicity,
        });
    }
    let coordinates = &configuration.coordinates;
    if coordinates.coordinate_system != CARTESIAN {
        return Err(ConfigurationError::UnsupportedCoordinateSystem {
            configuration: label(),
            system: coordinates.coordinate_system.clone(),
        });
    }
    if !ACCEPTED_UNITS.contains(&coordinates.units.as_str()) {
        return Err(ConfigurationError::UnsupportedUnits {
            configuration: label(),
            units: coordinates.units.clone(),
        });
    }
    if coordinates.values.len() != configuration.n_atoms() {
        return Err(ConfigurationError::CoordinateCount {
            configuration: label(),
            symbols: configuration.n_atoms(),
            coordinates: coordinates.values.len(),
        });
    }
    if let Some(symbol) = configuration.symbols.iter().find(|s| !is_known_element(s)) {
        return Err(ConfigurationError::UnknownElement {
            configuration: label(),
            symbol: symbol.clone(),
        });
    }
    if let Some(symbol) = configuration
        .symbols
        .iter()
        .find(|s| !parameterization.covers(s))
    {
        return Err(ConfigurationError::UncoveredElement {
            configuration: label(),
            symbol: symbol.clone(),
            parameterization,
        });
    }
    Ok(())
}
