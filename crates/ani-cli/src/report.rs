//! What the driver prints on stdout: a description of each step as it starts and a summary of
//! how every step ended.

use seamm_ani::engine::progress::{Progress, ProgressReporter};
use seamm_ani::workflows::compute::{ComputeReport, StepOutcome};
use tracing::{debug, info};

pub fn step_heading(index: usize, description: &str) -> String {
    format!("Step {}: {}", index + 1, description)
}

pub fn outcome_line(outcome: &StepOutcome) -> String {
    match &outcome.error {
        None => format!("Step {} succeeded.", outcome.index + 1),
        Some(error) => format!(
            "Step {} failed: {}",
            outcome.index + 1,
            error.lines().next().unwrap_or_default()
        ),
    }
}

pub fn summary(report: &ComputeReport) -> String {
    let failed = report.steps.iter().filter(|s| !s.success).count();
    let mut lines: Vec<String> = report.steps.iter().map(outcome_line).collect();
    lines.push(match failed {
        0 => format!("All {} step(s) completed on the {} device.", report.steps.len(), report.device),
        n => format!(
            "{} of {} step(s) failed; see the 'error' entries in the output for details.",
            n,
            report.steps.len()
        ),
    });
    lines.join("\n")
}

/// Prints step descriptions as they start and forwards everything else to the log.
pub fn progress_reporter<'a>() -> ProgressReporter<'a> {
    ProgressReporter::with_callback(Box::new(|event| match event {
        Progress::StepStart { index, description } => {
            println!("{}", step_heading(index, &description));
        }
        Progress::OptimizationStep {
            configuration,
            step,
            energy,
            fmax,
        } => {
            debug!(configuration, step, energy, fmax, "Optimization step.");
        }
        Progress::StepFinish { index, success } => {
            debug!(step = index, success, "Step finished.");
        }
        Progress::Message(message) => info!("{}", message),
    }))
}
