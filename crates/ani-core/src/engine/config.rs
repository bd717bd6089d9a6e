use crate::core::device::DevicePolicy;
use std::path::PathBuf;
use thiserror::Error;

/// Name recorded as the `creator` of results when none is configured.
pub const DEFAULT_CREATOR: &str = "seamm-ani";

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
}

/// Run-wide settings for evaluating a document.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Directory holding one sub-directory of model files per parameterization.
    pub model_dir: PathBuf,
    pub device: DevicePolicy,
    /// `creator` field of the provenance attached to results.
    pub creator: String,
}

#[derive(Default)]
pub struct RunConfigBuilder {
    model_dir: Option<PathBuf>,
    device: Option<DevicePolicy>,
    creator: Option<String>,
}

impl RunConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model_dir(mut self, path: PathBuf) -> Self {
        self.model_dir = Some(path);
        self
    }
    pub fn device(mut self, policy: DevicePolicy) -> Self {
        self.device = Some(policy);
        self
    }
    pub fn creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = Some(creator.into());
        self
    }

    pub fn build(self) -> Result<RunConfig, ConfigError> {
        Ok(RunConfig {
            model_dir: self
                .model_dir
                .ok_or(ConfigError::MissingParameter("model_dir"))?,
            device: self.device.unwrap_or_default(),
            creator: self.creator.unwrap_or_else(|| DEFAULT_CREATOR.to_string()),
        })
    }
}
