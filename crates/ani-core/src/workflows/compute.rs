use crate::core::ani::{self, AniModel, Parameterization};
use crate::core::device::{Device, gpu_available, select_device};
use crate::core::schema::Document;
use crate::engine::batch::Batch;
use crate::engine::config::RunConfig;
use crate::engine::error::{ComputeError, ConfigurationError, EngineError, error_trace};
use crate::engine::optimize::{self, AniCalculator};
use crate::engine::plan::{OptimizationSettings, StepPlan, StepTask, validate_configuration};
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::single_point;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

pub const SINGLE_POINT_ROUTINE: &str = "seamm_ani::single_point";
pub const OPTIMIZATION_ROUTINE: &str = "seamm_ani::optimize";

/// How one workflow step ended.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub index: usize,
    pub description: String,
    pub success: bool,
    /// The recorded error trace of a failed step.
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComputeReport {
    pub device: Device,
    pub steps: Vec<StepOutcome>,
}

impl ComputeReport {
    pub fn all_succeeded(&self) -> bool {
        self.steps.iter().all(|s| s.success)
    }
}

/// A validated step with everything it needs to run.
struct PreparedStep {
    plan: StepPlan,
    /// Index into the loaded models.
    model: usize,
    submodels: Vec<usize>,
    batch: Batch,
}

/// Runs every step of `document` in order, recording the outcome on each step and appending
/// results to every configuration.
///
/// All steps and configurations are validated, and every named potential is loaded, before the
/// first evaluation; any such problem is returned as an error and the document is left
/// untouched. Failures during evaluation are recorded on the failing step and the run moves on.
#[instrument(skip_all, name = "compute_workflow")]
pub fn run(
    document: &mut Document,
    config: &RunConfig,
    reporter: &ProgressReporter,
) -> Result<ComputeReport, EngineError> {
    let device = select_device(config.device, gpu_available());
    reporter.report(Progress::Message(format!("Running on the {} device.", device)));

    let (models, prepared) = prepare(document, config)?;
    info!(
        steps = prepared.len(),
        configurations = document.configuration_count(),
        "Workflow validated."
    );

    let mut outcomes = Vec::with_capacity(prepared.len());
    for (index, step) in prepared.iter().enumerate() {
        let description = step.plan.description();
        reporter.report(Progress::StepStart {
            index,
            description: description.clone(),
        });
        info!(step = index, "{}", description);

        let model = &models[step.model];
        let result = match &step.plan.task {
            StepTask::SinglePoint { gradients } => {
                run_single_point(document, config, model, step, *gradients)
            }
            StepTask::Optimization(settings) => {
                run_optimization(document, config, model, step, settings, reporter)
            }
        };

        let workflow_step = &mut document.workflow[index];
        let outcome = match result {
            Ok(()) => {
                workflow_step.record_success();
                StepOutcome {
                    index,
                    description,
                    success: true,
                    error: None,
                }
            }
            Err(e) => {
                let trace = error_trace(&e);
                warn!(step = index, "Step failed: {}", e);
                workflow_step.record_failure(trace.clone());
                StepOutcome {
                    index,
                    description,
                    success: false,
                    error: Some(trace),
                }
            }
        };
        reporter.report(Progress::StepFinish {
            index,
            success: outcome.success,
        });
        outcomes.push(outcome);
    }

    Ok(ComputeReport {
        device,
        steps: outcomes,
    })
}

/// Validates every step and loads each named potential once.
fn prepare(
    document: &Document,
    config: &RunConfig,
) -> Result<(Vec<AniModel>, Vec<PreparedStep>), EngineError> {
    let mut models: Vec<AniModel> = Vec::new();
    let mut loaded: HashMap<Parameterization, usize> = HashMap::new();
    let mut prepared = Vec::with_capacity(document.workflow.len());
    for (index, step) in document.workflow.iter().enumerate() {
        let configuration_error = |source: ConfigurationError| EngineError::Configuration {
            step: index,
            source,
        };

        let plan = StepPlan::from_step(step).map_err(configuration_error)?;
        let parameterization = plan.parameterization;
        for (c, configuration) in document.configurations().enumerate() {
            validate_configuration(configuration, c, parameterization)
                .map_err(configuration_error)?;
        }

        let model = match loaded.get(&parameterization) {
            Some(&model) => model,
            None => {
                let model = ani::load(&config.model_dir, parameterization)
                    .map_err(|e| configuration_error(e.into()))?;
                models.push(model);
                loaded.insert(parameterization, models.len() - 1);
                models.len() - 1
            }
        };
        let submodels = plan
            .submodels
            .resolve(parameterization, models[model].ensemble_size())
            .map_err(configuration_error)?;
        let batch = Batch::from_document(document, parameterization).map_err(configuration_error)?;

        debug!(step = index, %parameterization, submodels = ?submodels, "Step validated.");
        prepared.push(PreparedStep {
            plan,
            model,
            submodels,
            batch,
        });
    }
    Ok((models, prepared))
}

fn provenance(config: &RunConfig, routine: &str) -> Map<String, Value> {
    let mut provenance = Map::new();
    provenance.insert("creator".to_string(), json!(config.creator));
    provenance.insert("version".to_string(), json!(env!("CARGO_PKG_VERSION")));
    provenance.insert("routine".to_string(), json!(routine));
    provenance
}

fn run_single_point(
    document: &mut Document,
    config: &RunConfig,
    model: &AniModel,
    step: &PreparedStep,
    gradients: bool,
) -> Result<(), ComputeError> {
    let results = single_point::evaluate(model, &step.batch, &step.submodels, gradients)?;
    for (configuration, result) in document.configurations_mut().zip(&results) {
        configuration.append_result(provenance(config, SINGLE_POINT_ROUTINE), result.to_record());
    }
    Ok(())
}

fn run_optimization(
    document: &mut Document,
    config: &RunConfig,
    model: &AniModel,
    step: &PreparedStep,
    settings: &OptimizationSettings,
    reporter: &ProgressReporter,
) -> Result<(), ComputeError> {
    let mut records = Vec::with_capacity(step.batch.len());
    for row in 0..step.batch.len() {
        let label = step.batch.label(row).to_string();
        let (species, positions) = step.batch.molecule(row)?;
        let calculator =
            AniCalculator::new(model, species, step.submodels.clone(), label.as_str());

        let result = optimize::optimize(
            &calculator,
            positions,
            settings.minimizer,
            settings.fmax,
            settings.max_steps,
            |n, energy, fmax| {
                reporter.report(Progress::OptimizationStep {
                    configuration: row,
                    step: n,
                    energy,
                    fmax,
                })
            },
        )
        .map_err(|e| ComputeError::Optimization {
            configuration: label.clone(),
            source: Box::new(e),
        })?;

        info!(
            "{}: {} after {} steps, E = {:.6} eV",
            label,
            if result.converged { "converged" } else { "not converged" },
            result.steps,
            result.energy
        );
        records.push(result.to_record());
    }

    for (configuration, record) in document.configurations_mut().zip(records) {
        configuration.append_result(provenance(config, OPTIMIZATION_ROUTINE), record);
    }
    Ok(())
}
