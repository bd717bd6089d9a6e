use crate::cli::Cli;
use crate::error::{CliError, Result};
use crate::models::ModelDirSources;
use seamm_ani::core::device::DevicePolicy;
use seamm_ani::engine::config::{RunConfig, RunConfigBuilder};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_OUTPUT: &str = "output.json";

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialModelsConfig {
    directory: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialComputeConfig {
    device: Option<String>,
    threads: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialOutputConfig {
    path: Option<PathBuf>,
    creator: Option<String>,
}

/// The optional TOML configuration file, every field of which can be overridden on the
/// command line.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialAppConfig {
    models: Option<PartialModelsConfig>,
    compute: Option<PartialComputeConfig>,
    output: Option<PartialOutputConfig>,
}

/// Everything a run needs, after merging the command line over the configuration file.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub schema: PathBuf,
    pub output: PathBuf,
    pub threads: Option<usize>,
    pub run: RunConfig,
}

impl PartialAppConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    /// Merges the command line over the file. The model directory comes from the first of
    /// `--model-dir`, the file, and then the remaining `sources`.
    pub fn merge_with_cli(self, cli: &Cli, sources: ModelDirSources) -> Result<AppConfig> {
        let models = self.models.unwrap_or_default();
        let compute = self.compute.unwrap_or_default();
        let output = self.output.unwrap_or_default();

        let device = match (cli.device, compute.device) {
            (Some(choice), _) => choice.into(),
            (None, Some(name)) => name
                .parse::<DevicePolicy>()
                .map_err(|e| CliError::Config(format!("compute.device: {}", e)))?,
            (None, None) => DevicePolicy::default(),
        };

        let model_dir = ModelDirSources {
            cli: cli.model_dir.clone(),
            config_file: models.directory,
            ..sources
        }
        .resolve()?;

        let threads = cli.threads.or(compute.threads);
        if threads == Some(0) {
            return Err(CliError::Argument(
                "The number of threads must be at least 1.".to_string(),
            ));
        }

        let mut builder = RunConfigBuilder::new().model_dir(model_dir).device(device);
        if let Some(creator) = output.creator {
            builder = builder.creator(creator);
        }

        Ok(AppConfig {
            schema: cli.schema.clone(),
            output: cli
                .output
                .clone()
                .or(output.path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT)),
            threads,
            run: builder.build().map_err(|e| CliError::Config(e.to_string()))?,
        })
    }
}
