//! Locating the directory of ANI model files.

use crate::error::{CliError, Result};
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming the model directory.
pub const MODELS_ENV: &str = "SEAMM_ANI_MODELS";
const PATH_CONFIG_FILE: &str = "path.conf";

/// Every place a model directory may be configured, highest priority first.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ModelDirSources {
    pub cli: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
    pub environment: Option<String>,
    /// Contents of the user's `path.conf`, if it exists.
    pub path_conf: Option<String>,
    pub default_dir: Option<PathBuf>,
}

impl ModelDirSources {
    /// Gathers the sources that live outside the command line and the configuration file: the
    /// environment, `path.conf` in the user's config directory, and the default data directory.
    pub fn discover() -> Result<Self> {
        let dirs = project_dirs();
        let path_conf = match dirs.as_ref().map(|d| d.config_dir().join(PATH_CONFIG_FILE)) {
            Some(path) if path.exists() => {
                debug!("Reading the model path from {:?}", &path);
                Some(fs::read_to_string(&path)?)
            }
            _ => None,
        };
        Ok(Self {
            cli: None,
            config_file: None,
            environment: std::env::var(MODELS_ENV).ok(),
            path_conf,
            default_dir: dirs.map(|d| d.data_dir().join("models")),
        })
    }

    pub fn resolve(self) -> Result<PathBuf> {
        if let Some(path) = self.cli.or(self.config_file) {
            return Ok(path);
        }
        if let Some(path) = non_empty(self.environment) {
            return Ok(PathBuf::from(path));
        }
        if self.path_conf.is_some() {
            match non_empty(self.path_conf) {
                Some(path) => return Ok(PathBuf::from(path)),
                None => warn!("Custom path config file is empty, falling back to default path."),
            }
        }
        self.default_dir.ok_or_else(|| {
            CliError::Config("Could not determine the default model directory.".to_string())
        })
    }
}

fn non_empty(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "molssi", "seamm-ani")
}

/// Checks that a resolved model directory exists, with a hint on how to point at another one.
pub fn check_model_dir(path: &Path) -> Result<()> {
    if path.is_dir() {
        return Ok(());
    }
    Err(CliError::Config(format!(
        "Model directory {:?} does not exist.\nHint: pass --model-dir, set [models] directory in \
         the configuration file, or set {}.",
        path, MODELS_ENV
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources() -> ModelDirSources {
        ModelDirSources {
            cli: Some(PathBuf::from("/cli")),
            config_file: Some(PathBuf::from("/file")),
            environment: Some("/env".to_string()),
            path_conf: Some("/conf\n".to_string()),
            default_dir: Some(PathBuf::from("/default")),
        }
    }

    #[test]
    fn sources_are_tried_in_priority_order() {
        let mut s = sources();
        assert_eq!(s.clone().resolve().unwrap(), PathBuf::from("/cli"));
        s.cli = None;
        assert_eq!(s.clone().resolve().unwrap(), PathBuf::from("/file"));
        s.config_file = None;
        assert_eq!(s.clone().resolve().unwrap(), PathBuf::from("/env"));
        s.environment = None;
        assert_eq!(s.clone().resolve().unwrap(), PathBuf::from("/conf"));
        s.path_conf = None;
        assert_eq!(s.resolve().unwrap(), PathBuf::from("/default"));
    }

    #[test]
    fn blank_entries_are_skipped() {
        let s = ModelDirSources {
            environment: Some("  ".to_string()),
            path_conf: Some("\n".to_string()),
            default_dir: Some(PathBuf::from("/default")),
            ..Default::default()
        };
        assert_eq!(s.resolve().unwrap(), PathBuf::from("/default"));
    }

    #[test]
    fn nothing_to_fall_back_on_is_an_error() {
        assert!(matches!(
            ModelDirSources::default().resolve(),
            Err(CliError::Config(_))
        ));
    }

    #[test]
    fn missing_model_directory_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check_model_dir(dir.path()).is_ok());
        assert!(check_model_dir(&dir.path().join("absent")).is_err());
    }
}
