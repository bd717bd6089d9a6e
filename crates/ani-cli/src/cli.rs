use clap::{Parser, ValueEnum};
use seamm_ani::core::device::DevicePolicy;
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "SEAMM ANI - Evaluates ANI machine-learning potentials on the systems of a MolSSI cms_schema workflow document.",
    help_template = HELP_TEMPLATE,
)]
pub struct Cli {
    /// Path to the input schema file (starting with a '!MolSSI cms_schema' header line).
    #[arg(required = true, value_name = "SCHEMA")]
    pub schema: PathBuf,

    /// Where to write the updated schema file [default: output.json]
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// The level of informational output
    #[arg(long, value_enum, ignore_case = true, default_value_t = LogLevel::Warning)]
    pub log_level: LogLevel,

    /// The compute device [default: default]
    #[arg(short, long, value_enum, ignore_case = true, value_name = "DEVICE")]
    pub device: Option<DeviceChoice>,

    /// Directory holding the model files, one sub-directory per parameterization.
    #[arg(long, value_name = "PATH")]
    pub model_dir: Option<PathBuf>,

    /// Path to a configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads for parallel computation.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceChoice {
    Default,
    Gpu,
    Cpu,
}

impl From<DeviceChoice> for DevicePolicy {
    fn from(choice: DeviceChoice) -> Self {
        match choice {
            DeviceChoice::Default => DevicePolicy::Default,
            DeviceChoice::Gpu => DevicePolicy::Gpu,
            DeviceChoice::Cpu => DevicePolicy::Cpu,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
#[value(rename_all = "UPPER")]
pub enum LogLevel {
    Notset,
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn defaults_apply_when_only_the_schema_is_given() {
        let cli = Cli::try_parse_from(["seamm-ani", "input.json"]).unwrap();
        assert_eq!(cli.schema, PathBuf::from("input.json"));
        assert_eq!(cli.log_level, LogLevel::Warning);
        assert_eq!(cli.device, None);
        assert_eq!(cli.output, None);
    }

    #[test]
    fn log_level_and_device_are_parsed() {
        let cli = Cli::try_parse_from([
            "seamm-ani",
            "--log-level",
            "DEBUG",
            "-d",
            "cpu",
            "-j",
            "2",
            "input.json",
        ])
        .unwrap();
        assert_eq!(cli.log_level, LogLevel::Debug);
        assert_eq!(cli.device, Some(DeviceChoice::Cpu));
        assert_eq!(cli.device.map(DevicePolicy::from), Some(DevicePolicy::Cpu));
        assert_eq!(cli.threads, Some(2));

        let lower = Cli::try_parse_from(["seamm-ani", "--log-level", "critical", "x"]).unwrap();
        assert_eq!(lower.log_level, LogLevel::Critical);
    }

    #[test]
    fn unknown_choices_are_rejected() {
        assert!(Cli::try_parse_from(["seamm-ani", "--log-level", "LOUD", "x"]).is_err());
        assert!(Cli::try_parse_from(["seamm-ani", "-d", "tpu", "x"]).is_err());
        assert!(Cli::try_parse_from(["seamm-ani"]).is_err());
    }

    #[test]
    fn help_lists_the_device_choices() {
        let rendered = Cli::command().render_help().to_string();
        let help = rendered.split_whitespace().collect::<Vec<_>>().join(" ");
        assert!(help.contains("[possible values: default, gpu, cpu]"), "{}", help);
        assert!(help.contains("[possible values: NOTSET, DEBUG, INFO, WARNING, ERROR, CRITICAL]"));
        let gpu = Cli::try_parse_from(["seamm-ani", "--device", "GPU", "x"]).unwrap();
        assert_eq!(gpu.device, Some(DeviceChoice::Gpu));
    }
}
