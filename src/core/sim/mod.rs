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

//! Simulated GPU
//!
//! An in-process device with a runtime PM state machine driven by a
//! [`ManualClock`]. Every file and ioctl the harness uses is served from one
//! shared [`SimState`], so the whole suite of subtests runs without hardware
//! and a 30 second wait costs nothing.
//!
//! # Power model
//!
//! The device is busy while a CRTC scans out, while forcewake is held, or
//! while runtime PM is not allowed. Once idle it stays active for the
//! autosuspend delay plus [`SimConfig::suspend_latency`], reports
//! `suspending` briefly and then `suspended`. Any GEM or KMS access wakes it
//! and restarts the idle timer. PC8/PC9/PC10 residency counters only advance
//! while suspended.

mod blitter;
mod device;
mod files;
mod state;

#[cfg(test)]
mod tests;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use super::device::{Backend, Device};
use super::error::Result;
use super::kms::{
    I2cProbe, CONNECTOR_TYPE_DISPLAYPORT, CONNECTOR_TYPE_EDP, CONNECTOR_TYPE_HDMIA,
};
use super::residency::CounterFile;
use super::runtime_pm::PowerControl;
use super::timing::{Clock, ManualClock};

pub use device::SimDevice;
pub use state::{SimPower, SimState};

/// A Haswell ULT GT2 id, which has PC8+ residency
pub const SIM_HASWELL_DEVID: u16 = 0x0A16;

/// An Ivy Bridge GT2 id, which does not
pub const SIM_IVYBRIDGE_DEVID: u16 = 0x0166;

/// One simulated display output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimConnector {
    pub connector_type: u32,
    pub connected: bool,
    /// Whether the sink has a (valid) EDID
    pub edid: bool,
    pub width: u16,
    pub height: u16,
}

impl SimConnector {
    pub fn new(connector_type: u32, connected: bool, width: u16, height: u16) -> Self {
        Self {
            connector_type,
            connected,
            edid: connected,
            width,
            height,
        }
    }
}

/// Misbehaviour to inject
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimFaults {
    /// Never suspend
    pub stuck_active: bool,
    /// `runtime_status` always reads back this text
    pub status_text: Option<String>,
    /// Scramble buffer contents and registers on every resume
    pub corrupt_on_resume: bool,
    /// Connector queries and register reads switch every output off
    pub queries_blank_display: bool,
}

/// Shape of the simulated platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimConfig {
    pub has_runtime_pm: bool,
    /// PC8+ residency MSRs are readable; only honoured for Haswell ids
    pub has_pc8: bool,
    pub devid: u16,
    pub connectors: Vec<SimConnector>,
    pub crtcs: usize,
    /// Time between going idle (after the autosuspend delay) and suspending
    pub suspend_latency: Duration,
    pub has_forcewake: bool,
    /// Expose one `i2c-*` adapter per connector
    pub i2c_adapters: bool,
    pub faults: SimFaults,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            has_runtime_pm: true,
            has_pc8: true,
            devid: SIM_HASWELL_DEVID,
            connectors: vec![
                SimConnector::new(CONNECTOR_TYPE_EDP, true, 1920, 1080),
                SimConnector::new(CONNECTOR_TYPE_HDMIA, true, 1280, 720),
                SimConnector::new(CONNECTOR_TYPE_DISPLAYPORT, false, 2560, 1440),
            ],
            crtcs: 3,
            suspend_latency: Duration::from_millis(300),
            has_forcewake: true,
            i2c_adapters: true,
            faults: SimFaults::default(),
        }
    }
}

impl SimConfig {
    /// Only a kernel `runtime_status`, no residency counters
    pub fn runtime_pm_only() -> Self {
        Self {
            has_pc8: false,
            devid: SIM_IVYBRIDGE_DEVID,
            ..Self::default()
        }
    }

    /// Only residency counters, no runtime PM
    pub fn pc8_only() -> Self {
        Self {
            has_runtime_pm: false,
            ..Self::default()
        }
    }
}

/// [`Backend`] serving everything from a shared [`SimState`]
pub struct SimBackend {
    clock: Rc<ManualClock>,
    state: Rc<RefCell<SimState>>,
}

impl SimBackend {
    pub fn new(config: SimConfig) -> Self {
        let clock = Rc::new(ManualClock::new());
        let state = Rc::new(RefCell::new(SimState::new(config, Rc::clone(&clock))));
        Self { clock, state }
    }

    /// Shared state, for inspection and fault injection
    pub fn state(&self) -> Rc<RefCell<SimState>> {
        Rc::clone(&self.state)
    }

    pub fn manual_clock(&self) -> Rc<ManualClock> {
        Rc::clone(&self.clock)
    }
}

impl Backend for SimBackend {
    fn clock(&self) -> Rc<dyn Clock> {
        self.clock.clone()
    }

    fn open_device(&mut self) -> Result<Box<dyn Device>> {
        Ok(Box::new(SimDevice::new(Rc::clone(&self.state))))
    }

    fn power_control(&mut self) -> Result<Box<dyn PowerControl>> {
        Ok(Box::new(files::SimPowerControl::new(Rc::clone(&self.state))))
    }

    fn open_msr(&mut self) -> Result<Box<dyn CounterFile>> {
        Ok(Box::new(files::SimMsr::new(Rc::clone(&self.state))))
    }

    fn i2c(&mut self) -> Box<dyn I2cProbe> {
        Box::new(files::SimI2c::new(Rc::clone(&self.state)))
    }
}
