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

//! Device and backend abstractions
//!
//! A [`Backend`] hands out everything the harness talks to: the DRM device,
//! the runtime PM control files, the MSR device, the I2C buses and a clock.
//! The hardware backend opens the real files; the simulated backend serves
//! all of them from one in-process state machine.

use std::rc::Rc;

use super::error::Result;
use super::gem::GemDevice;
use super::kms::{I2cProbe, KmsDevice};
use super::registers::RegisterReader;
use super::residency::CounterFile;
use super::runtime_pm::PowerControl;
use super::timing::Clock;

/// An open `i915_forcewake_user` file; the GT stays awake while it exists
pub trait ForcewakeHold {
    /// Close the file, reporting close failures
    fn release(self: Box<Self>) -> Result<()>;
}

/// A DRM device node with both mode-setting and GEM
pub trait Device: KmsDevice + GemDevice {
    /// PCI device id (`I915_PARAM_CHIPSET_ID`)
    fn chipset_id(&mut self) -> Result<u16>;

    /// Open the forcewake debugfs file, `None` if it does not exist
    fn open_forcewake(&mut self) -> Result<Option<Box<dyn ForcewakeHold>>>;

    /// Map the register BAR for raw reads
    fn open_registers(&mut self) -> Result<Box<dyn RegisterReader>>;
}

/// Factory for everything the harness needs at setup
pub trait Backend {
    fn clock(&self) -> Rc<dyn Clock>;

    fn open_device(&mut self) -> Result<Box<dyn Device>>;

    fn power_control(&mut self) -> Result<Box<dyn PowerControl>>;

    fn open_msr(&mut self) -> Result<Box<dyn CounterFile>>;

    fn i2c(&mut self) -> Box<dyn I2cProbe>;
}

/// Graphics generation, as far as the harness cares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chipset {
    pub devid: u16,
}

// Haswell GT1/GT2/GT3 desktop, server, mobile, ULT, CRW and SDV ids all
// share these high bytes; no other generation uses them.
const HASWELL_FAMILIES: [u16; 4] = [0x0400, 0x0A00, 0x0C00, 0x0D00];

const GEN2_IDS: [u16; 5] = [0x3577, 0x2562, 0x3582, 0x358E, 0x2572];
const GEN3_IDS: [u16; 11] = [
    0x2582, 0x258A, 0x2592, 0x2772, 0x27A2, 0x27AE, 0x29B2, 0x29C2, 0x29D2, 0xA001, 0xA011,
];
const GEN4_IDS: [u16; 13] = [
    0x2972, 0x2982, 0x2992, 0x29A2, 0x2A02, 0x2A12, 0x2A42, 0x2E02, 0x2E12, 0x2E22, 0x2E32,
    0x2E42, 0x2E92,
];
const GEN5_IDS: [u16; 2] = [0x0042, 0x0046];

impl Chipset {
    pub fn new(devid: u16) -> Self {
        Self { devid }
    }

    /// Only Haswell has PC8+ residency counters
    pub fn is_haswell(self) -> bool {
        HASWELL_FAMILIES.contains(&(self.devid & 0xFF00))
    }

    /// Gen2 through gen5 have no forcewake
    pub fn is_pre_gen6(self) -> bool {
        GEN2_IDS.contains(&self.devid)
            || GEN3_IDS.contains(&self.devid)
            || GEN4_IDS.contains(&self.devid)
            || GEN5_IDS.contains(&self.devid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haswell_detection() {
        assert!(Chipset::new(0x0A16).is_haswell());
        assert!(Chipset::new(0x0412).is_haswell());
        assert!(Chipset::new(0x0D26).is_haswell());
        assert!(!Chipset::new(0x0166).is_haswell());
        assert!(!Chipset::new(0x1616).is_haswell());
    }

    #[test]
    fn test_pre_gen6_detection() {
        assert!(Chipset::new(0x2A42).is_pre_gen6());
        assert!(Chipset::new(0x0046).is_pre_gen6());
        assert!(Chipset::new(0x3577).is_pre_gen6());
        assert!(!Chipset::new(0x0A16).is_pre_gen6());
        assert!(!Chipset::new(0x0116).is_pre_gen6());
    }
}
