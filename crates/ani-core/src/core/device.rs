use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

/// The device policy requested on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePolicy {
    /// Use a GPU when one is available.
    #[default]
    Default,
    /// Use a GPU when one is available.
    Gpu,
    /// Always use the CPU.
    Cpu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Gpu,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown device policy '{0}'. Expected 'default', 'gpu' or 'cpu'.")]
pub struct UnknownDevicePolicy(pub String);

impl FromStr for DevicePolicy {
    type Err = UnknownDevicePolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "gpu" => Ok(Self::Gpu),
            "cpu" => Ok(Self::Cpu),
            _ => Err(UnknownDevicePolicy(s.to_string())),
        }
    }
}

impl fmt::Display for DevicePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Default => "default",
            Self::Gpu => "gpu",
            Self::Cpu => "cpu",
        })
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cpu => "cpu",
            Self::Gpu => "gpu",
        })
    }
}

/// Whether an accelerator can be used by the compute backend.
///
/// The networks and environment vectors are evaluated natively on the CPU, so no
/// accelerator is ever reported.
pub fn gpu_available() -> bool {
    debug!("The native ANI backend has no accelerator support; reporting no GPU.");
    false
}

/// Chooses the run-wide compute device.
///
/// `Default` currently behaves exactly like `Gpu`: a GPU is chosen whenever one is available.
pub fn select_device(policy: DevicePolicy, gpu_available: bool) -> Device {
    let device = match policy {
        DevicePolicy::Cpu => Device::Cpu,
        DevicePolicy::Default | DevicePolicy::Gpu if gpu_available => Device::Gpu,
        DevicePolicy::Default | DevicePolicy::Gpu => Device::Cpu,
    };
    info!(%policy, %device, "Selected compute device.");
    device
}
