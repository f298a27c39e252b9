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

//! Harness context
//!
//! Everything probed at setup lives here and is borrowed by the subtests:
//! the open device, the mode-set data, the capabilities and the oracle built
//! from them.

use std::rc::Rc;

use super::config::HarnessConfig;
use super::device::{Backend, Chipset, Device};
use super::error::{PmError, Result};
use super::kms::{I2cProbe, ModeSetData};
use super::oracle::{Capabilities, SuspendOracle};
use super::residency::ResidencySampler;
use super::runtime_pm::setup_runtime_pm;
use super::timing::Clock;

/// State shared by every subtest of a run
pub struct Harness {
    pub config: HarnessConfig,
    pub caps: Capabilities,
    pub chipset: Chipset,
    pub device: Box<dyn Device>,
    pub mode_set: ModeSetData,
    pub oracle: SuspendOracle,
    pub i2c: Box<dyn I2cProbe>,
    pub clock: Rc<dyn Clock>,
}

impl Harness {
    /// Open the device, probe runtime PM and PC8+ support, and build the
    /// oracle
    ///
    /// Fails with [`PmError::UnsupportedPlatform`] when neither runtime PM
    /// nor PC8+ residency is available.
    pub fn setup(config: HarnessConfig, backend: &mut dyn Backend) -> Result<Self> {
        let clock = backend.clock();
        let mut device = backend.open_device()?;
        let mode_set = ModeSetData::capture(device.as_mut())?;
        let chipset = Chipset::new(device.chipset_id()?);

        let mut power = backend.power_control()?;
        let reader = setup_runtime_pm(power.as_mut())?;

        let sampler = if chipset.is_haswell() {
            let msr = backend.open_msr().map_err(|e| {
                PmError::ProtocolViolation(format!(
                    "can't open the MSR device, is the msr module loaded? ({e})"
                ))
            })?;
            let sampler = ResidencySampler::new(msr);
            sampler.probe_support().then_some(sampler)
        } else {
            None
        };

        let caps = Capabilities {
            has_runtime_pm: reader.is_some(),
            has_pc8: sampler.is_some(),
        };

        log::info!(
            "Runtime PM support: {}",
            if caps.has_runtime_pm { "yes" } else { "no" }
        );
        log::info!("PC8 residency support: {}", if caps.has_pc8 { "yes" } else { "no" });

        let oracle = SuspendOracle::select(caps, sampler, reader, Rc::clone(&clock))
            .ok_or_else(|| {
                PmError::UnsupportedPlatform(
                    "neither runtime PM nor PC8+ residency is available".to_string(),
                )
            })?;
        log::debug!("suspend oracle: {:?}", oracle.strategy());

        let i2c = backend.i2c();

        Ok(Self {
            config,
            caps,
            chipset,
            device,
            mode_set,
            oracle,
            i2c,
            clock,
        })
    }
}
