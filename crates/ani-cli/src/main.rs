mod cli;
mod config;
mod error;
mod logging;
mod models;
mod report;

use crate::cli::Cli;
use crate::config::{AppConfig, PartialAppConfig};
use crate::error::{CliError, Result};
use crate::models::ModelDirSources;
use clap::Parser;
use seamm_ani::core::schema;
use seamm_ani::workflows::compute::{self, ComputeReport};
use tracing::{debug, error, info, warn};

fn main() {
    if let Err(e) = run_app() {
        eprintln!("\n❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn run_app() -> Result<()> {
    let cli = Cli::parse();
    logging::setup_logging(cli.log_level, cli.log_file.clone())?;

    info!("🚀 SEAMM ANI v{} starting up.", env!("CARGO_PKG_VERSION"));
    debug!("Full CLI arguments parsed: {:?}", &cli);

    let partial = match &cli.config {
        Some(path) => PartialAppConfig::from_file(path)?,
        None => PartialAppConfig::default(),
    };
    let sources = ModelDirSources::discover()?;
    let app = partial.merge_with_cli(&cli, sources)?;
    debug!("Resolved configuration: {:?}", &app);

    if let Some(num_threads) = app.threads {
        info!(
            "Setting Rayon global thread pool to {} threads.",
            num_threads
        );
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build_global()
            .map_err(|e| {
                CliError::Other(anyhow::anyhow!("Failed to build global thread pool: {}", e))
            })?;
    }

    match execute(&app) {
        Ok(report) => {
            println!("{}", report::summary(&report));
            if report.all_succeeded() {
                info!("✅ All steps completed successfully.");
            } else {
                warn!("Some steps failed; their errors are recorded in {:?}.", &app.output);
            }
            Ok(())
        }
        Err(e) => {
            error!("❌ Run failed: {}", e);
            Err(e)
        }
    }
}

/// Reads the document, runs every step, and writes the result. Nothing is written unless the
/// document was read and validated.
fn execute(app: &AppConfig) -> Result<ComputeReport> {
    let mut document = schema::read(&app.schema).map_err(|e| CliError::FileParsing {
        path: app.schema.clone(),
        source: e.into(),
    })?;
    models::check_model_dir(&app.run.model_dir)?;

    let reporter = report::progress_reporter();
    let report = compute::run(&mut document, &app.run, &reporter)?;

    schema::write(&document, &app.output).map_err(|e| CliError::Write {
        path: app.output.clone(),
        source: e,
    })?;
    info!("Wrote the updated document to {:?}", &app.output);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use seamm_ani::core::ani::{self, Parameterization};
    use seamm_ani::engine::config::RunConfigBuilder;
    use std::fs;
    use std::path::Path;

    fn app(dir: &Path, schema: &str) -> AppConfig {
        let input = dir.join("input.json");
        fs::write(&input, schema).unwrap();
        let models = dir.join("models");
        fs::create_dir_all(&models).unwrap();
        AppConfig {
            schema: input,
            output: dir.join("output.json"),
            threads: None,
            run: RunConfigBuilder::new().model_dir(models).build().unwrap(),
        }
    }

    const BODY: &str = r#"{"schema name": "cms_schema", "schema version": "1.0",
        "workflow": [{"model": {"model": "ANI", "parameterization": "ANI-2x"},
                      "required results": ["energy"]}],
        "systems": []}"#;

    #[test]
    fn bad_header_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), &format!("!Other cms_schema 1.0\n{}", BODY));
        let result = execute(&app);
        assert!(matches!(result, Err(CliError::FileParsing { .. })));
        assert!(!app.output.exists());
    }

    #[test]
    fn configuration_errors_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        // The model directory exists but holds no ANI-2x files.
        let app = app(dir.path(), &format!("!MolSSI cms_schema 1.0\n{}", BODY));
        let result = execute(&app);
        assert!(matches!(result, Err(CliError::Engine(_))));
        assert!(!app.output.exists());
    }

    #[test]
    fn missing_model_directory_is_reported_before_any_work() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path(), &format!("!MolSSI cms_schema 1.0\n{}", BODY));
        app.run.model_dir = dir.path().join("nowhere");
        assert!(matches!(execute(&app), Err(CliError::Config(_))));
        assert!(!app.output.exists());
    }

    /// A one-layer network per species, written in the on-disk model layout.
    fn write_ani2x_model(models: &Path, ensemble: usize) {
        let parameterization = Parameterization::Ani2x;
        let dir = ani::loader::model_path(models, parameterization);
        fs::create_dir_all(&dir).unwrap();
        let species = parameterization.species();
        let width = parameterization.aev_params().length(species.len());

        let files: Vec<String> = (0..ensemble).map(|m| format!("\"net-{m}.json\"")).collect();
        let symbols: Vec<String> = species.iter().map(|s| format!("\"{s}\"")).collect();
        let mut manifest = format!(
            "species = [{}]\nsubmodels = [{}]\n[self-energies]\n",
            symbols.join(", "),
            files.join(", ")
        );
        for (i, symbol) in species.iter().enumerate() {
            manifest.push_str(&format!("{symbol} = {:.1}\n", -1.0 - i as f64));
        }
        fs::write(dir.join(ani::loader::MANIFEST_FILE), manifest).unwrap();

        for m in 0..ensemble {
            let networks: Vec<String> = species
                .iter()
                .enumerate()
                .map(|(i, symbol)| {
                    let weights: Vec<String> = (0..width)
                        .map(|k| format!("{:.4}", 1e-3 * ((k + i + m) % 5) as f64))
                        .collect();
                    format!(
                        "\"{symbol}\": [{{\"weights\": [[{}]], \"bias\": [{:.2}]}}]",
                        weights.join(","),
                        -0.01 * m as f64
                    )
                })
                .collect();
            fs::write(dir.join(format!("net-{m}.json")), format!("{{{}}}", networks.join(", ")))
                .unwrap();
        }
    }

    #[test]
    fn successful_run_writes_a_readable_document() {
        let dir = tempfile::tempdir().unwrap();
        let body = r#"{"schema name": "cms_schema", "schema version": "1.0",
            "workflow": [{"model": {"model": "ANI", "parameterization": "ANI-2x"},
                          "required results": ["energy"]}],
            "systems": [{"configurations": [{
                "symbols": ["C", "H"],
                "periodicity": 0,
                "coordinates": {"values": [[0.0, 0.0, 0.0], [1.12, 0.0, 0.0]],
                                "units": "Å", "coordinate system": "Cartesian"}}]}]}"#;
        let app = app(dir.path(), &format!("!MolSSI cms_schema 1.0\n{}", body));
        write_ani2x_model(&app.run.model_dir, 8);

        let report = execute(&app).unwrap();
        assert!(report.all_succeeded());

        let written = fs::read_to_string(&app.output).unwrap();
        let (header, body) = written.split_once('\n').unwrap();
        assert_eq!(header, "!MolSSI cms_schema 1.0");
        assert!(body.starts_with("{\n    \"schema name\": \"cms_schema\",\n"), "{}", body);
        assert!(body.contains("\"values\": [\n"));
        assert!(body.trim_end().ends_with('}'));

        let document = schema::read(&app.output).unwrap();
        assert_eq!(document.workflow[0].success, Some(true));
        let configuration = document.configurations().next().unwrap();
        let data = &configuration.results.as_ref().unwrap().data;
        assert_eq!(data.len(), 1);
        assert_eq!(data[0]["all energies"].as_array().unwrap().len(), 8);
        assert!(data[0]["energy"].is_f64());
        assert!(!data[0].contains_key("gradients"));
    }
}
