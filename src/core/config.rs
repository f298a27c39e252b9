// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Harness configuration
//!
//! Everything the harness touches on the filesystem lives at a fixed path on
//! the integrated GPU (PCI 0000:00:02.0). Those paths are the defaults; a
//! TOML file and `PM_RPM_*` environment variables can override them, which
//! is mostly useful for pointing the traversal subtests at another device.
//!
//! ```toml
//! drm_device = "/dev/dri/card0"
//! power_dir = "/sys/devices/pci0000:00/0000:00:02.0/power"
//! debugfs_dir = "/sys/kernel/debug/dri/0"
//! ```
//!
//! Timeouts are not configurable.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::{PmError, Result};

/// Sysfs directory of the integrated GPU
pub const DEFAULT_DEVICE_DIR: &str = "/sys/devices/pci0000:00/0000:00:02.0";

/// Filesystem locations used by the hardware backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// DRM primary node
    pub drm_device: PathBuf,
    /// MSR device of CPU 0
    pub msr_device: PathBuf,
    /// Runtime PM directory of the GPU
    pub power_dir: PathBuf,
    /// DRM debugfs directory
    pub debugfs_dir: PathBuf,
    /// Sysfs directory of the GPU, traversed by `sysfs-read`
    pub sysfs_dir: PathBuf,
    /// Directory holding the `i2c-*` nodes
    pub i2c_dev_dir: PathBuf,
    /// BAR0 resource file used for register reads
    pub mmio_resource: PathBuf,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        let device_dir = Path::new(DEFAULT_DEVICE_DIR);
        Self {
            drm_device: PathBuf::from("/dev/dri/card0"),
            msr_device: PathBuf::from("/dev/cpu/0/msr"),
            power_dir: device_dir.join("power"),
            debugfs_dir: PathBuf::from("/sys/kernel/debug/dri/0"),
            sysfs_dir: device_dir.to_path_buf(),
            i2c_dev_dir: PathBuf::from("/dev"),
            mmio_resource: device_dir.join("resource0"),
        }
    }
}

/// Environment variables recognised by [`HarnessConfig::apply_overrides`]
pub const ENV_OVERRIDES: [&str; 7] = [
    "PM_RPM_DRM_DEVICE",
    "PM_RPM_MSR_DEVICE",
    "PM_RPM_POWER_DIR",
    "PM_RPM_DEBUGFS_DIR",
    "PM_RPM_SYSFS_DIR",
    "PM_RPM_I2C_DEV_DIR",
    "PM_RPM_MMIO_RESOURCE",
];

impl HarnessConfig {
    /// Parse a TOML document; missing keys keep their defaults
    pub fn parse(data: &str) -> Result<Self> {
        toml::from_str(data).map_err(|e| PmError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| PmError::Config(format!("{}: {}", path.display(), e)))?;
        Self::parse(&data)
    }

    /// Apply overrides from `lookup` (normally `std::env::var`)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for var in ENV_OVERRIDES {
            let Some(value) = lookup(var) else {
                continue;
            };
            log::debug!("{} = {}", var, value);
            *self.field_mut(var) = PathBuf::from(value);
        }
    }

    fn field_mut(&mut self, var: &str) -> &mut PathBuf {
        match var {
            "PM_RPM_DRM_DEVICE" => &mut self.drm_device,
            "PM_RPM_MSR_DEVICE" => &mut self.msr_device,
            "PM_RPM_POWER_DIR" => &mut self.power_dir,
            "PM_RPM_DEBUGFS_DIR" => &mut self.debugfs_dir,
            "PM_RPM_SYSFS_DIR" => &mut self.sysfs_dir,
            "PM_RPM_I2C_DEV_DIR" => &mut self.i2c_dev_dir,
            _ => &mut self.mmio_resource,
        }
    }

    /// Defaults, then `path` if given, then the process environment
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|var| std::env::var(var).ok());
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| PmError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_integrated_gpu() {
        let config = HarnessConfig::default();
        assert_eq!(
            config.power_dir,
            PathBuf::from("/sys/devices/pci0000:00/0000:00:02.0/power")
        );
        assert_eq!(config.msr_device, PathBuf::from("/dev/cpu/0/msr"));
        assert_eq!(config.debugfs_dir, PathBuf::from("/sys/kernel/debug/dri/0"));
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = HarnessConfig::parse(r#"drm_device = "/dev/dri/card1""#).unwrap();
        assert_eq!(config.drm_device, PathBuf::from("/dev/dri/card1"));
        assert_eq!(config.i2c_dev_dir, PathBuf::from("/dev"));
    }

    #[test]
    fn test_parse_rejects_bad_toml() {
        let err = HarnessConfig::parse("drm_device = [").unwrap_err();
        assert!(matches!(err, PmError::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PM_RPM_POWER_DIR", "/tmp/power"),
            ("PM_RPM_SYSFS_DIR", "/tmp/sysfs"),
        ]
        .into_iter()
        .collect();

        let mut config = HarnessConfig::default();
        config.apply_overrides(|var| env.get(var).map(|v| v.to_string()));

        assert_eq!(config.power_dir, PathBuf::from("/tmp/power"));
        assert_eq!(config.sysfs_dir, PathBuf::from("/tmp/sysfs"));
        assert_eq!(config.drm_device, PathBuf::from("/dev/dri/card0"));
    }

    #[test]
    fn test_toml_round_trip_keeps_paths() {
        let config = HarnessConfig::default();
        let text = config.to_toml().unwrap();
        assert_eq!(HarnessConfig::parse(&text).unwrap(), config);
    }
}
