use std::str::FromStr;

use ash::vk;
use derivative::Derivative;

use crate::*;

/// Where API entry points come from.
#[derive(Clone, Copy, Debug, Derivative, Eq, PartialEq)]
#[derivative(Default)]
pub enum Backend {
    /// The system Vulkan loader and whatever ICDs and layers it finds.
    Loader,
    /// The in-process driver in `sim`.
    #[derivative(Default)]
    Sim,
}

impl Backend {
    pub fn entry(self) -> HarnessResult<ash::Entry> {
        match self {
            Backend::Loader => unsafe {
                ash::Entry::load().map_err(|e| Error::unsupported(
                    format!("failed to load Vulkan: {}", e)))
            },
            Backend::Sim => Ok(sim::entry()),
        }
    }
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "loader" | "vulkan" => Ok(Backend::Loader),
            "sim" => Ok(Backend::Sim),
            _ => Err(err_msg!("unknown driver: {}", s)),
        }
    }
}

/// Session-wide settings shared by every test.
#[derive(Clone, Debug, Derivative)]
#[derivative(Default)]
pub struct Config {
    pub backend: Backend,
    #[derivative(Default(value = "\"layercheck\".to_owned()"))]
    pub app_name: String,
    /// Highest API version tests may target; the instance is created
    /// with this version.
    #[derivative(Default(value = "vk::API_VERSION_1_1"))]
    pub target_api_version: u32,
    /// Fail initialization instead of running without the validation
    /// layer.
    #[derivative(Default(value = "true"))]
    pub require_validation: bool,
    /// Enable the device-profile layer when present.
    pub device_profile: bool,
    /// Use a debug-report callback even when debug-utils is available.
    pub debug_report: bool,
    /// The physical device must support all of these.
    pub required_features: vk::PhysicalDeviceFeatures,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_backend() {
        assert_eq!("sim".parse::<Backend>().unwrap(), Backend::Sim);
        assert_eq!("loader".parse::<Backend>().unwrap(), Backend::Loader);
        assert!("metal".parse::<Backend>().is_err());
        assert_eq!(Backend::default(), Backend::Sim);
    }

    #[test]
    fn config_defaults() {
        let config = Config::default();
        assert_eq!(config.app_name, "layercheck");
        assert!(config.require_validation);
        assert!(!config.debug_report);
        assert_eq!(config.target_api_version, vk::API_VERSION_1_1);
    }
}
