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

//! Simulated sysfs power files, MSR device and I2C buses

use std::cell::RefCell;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::rc::Rc;
use std::time::Duration;

use super::state::SimState;
use crate::core::error::Result;
use crate::core::kms::I2cProbe;
use crate::core::residency::{CounterFile, ResidencyCounter};
use crate::core::runtime_pm::{PowerControl, StatusFile};

pub struct SimPowerControl {
    state: Rc<RefCell<SimState>>,
}

impl SimPowerControl {
    pub fn new(state: Rc<RefCell<SimState>>) -> Self {
        Self { state }
    }
}

impl PowerControl for SimPowerControl {
    fn open_autosuspend_delay(&mut self) -> Result<Box<dyn Write>> {
        Ok(Box::new(SimDelayFile {
            state: Rc::clone(&self.state),
        }))
    }

    fn write_control(&mut self, value: &[u8]) -> io::Result<usize> {
        if value != b"auto\n" && value != b"on\n" {
            return Err(io::Error::from(io::ErrorKind::InvalidInput));
        }
        self.state.borrow_mut().set_control(value);
        Ok(value.len())
    }

    fn read_control(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let state = self.state.borrow();
        let control = state.control();
        let n = control.len().min(buf.len());
        buf[..n].copy_from_slice(&control[..n]);
        Ok(n)
    }

    fn open_status(&mut self) -> io::Result<Box<dyn StatusFile>> {
        Ok(Box::new(SimStatusFile {
            state: Rc::clone(&self.state),
            pos: 0,
        }))
    }
}

/// `autosuspend_delay_ms`; writes fail when the driver has no runtime PM
struct SimDelayFile {
    state: Rc<RefCell<SimState>>,
}

impl Write for SimDelayFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.borrow_mut();
        if !state.config().has_runtime_pm {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }
        let ms: u64 = std::str::from_utf8(buf)
            .ok()
            .and_then(|text| text.trim().parse().ok())
            .ok_or_else(|| io::Error::from(io::ErrorKind::InvalidInput))?;
        state.set_autosuspend_delay(Duration::from_millis(ms));
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// `runtime_status`; contents are regenerated on every read
struct SimStatusFile {
    state: Rc<RefCell<SimState>>,
    pos: u64,
}

impl Read for SimStatusFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let text = self.state.borrow().status_text();
        let bytes = text.as_bytes();
        let start = (self.pos as usize).min(bytes.len());
        let n = (bytes.len() - start).min(buf.len());
        buf[..n].copy_from_slice(&bytes[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for SimStatusFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = self.state.borrow().status_text().len() as i64;
        let target = match pos {
            SeekFrom::Start(n) => n as i64,
            SeekFrom::Current(d) => self.pos as i64 + d,
            SeekFrom::End(d) => len + d,
        };
        if target < 0 {
            return Err(io::Error::from(io::ErrorKind::InvalidInput));
        }
        self.pos = target as u64;
        Ok(self.pos)
    }
}

/// `/dev/cpu/0/msr`; only the three residency MSRs exist
pub struct SimMsr {
    state: Rc<RefCell<SimState>>,
}

impl SimMsr {
    pub fn new(state: Rc<RefCell<SimState>>) -> Self {
        Self { state }
    }
}

impl CounterFile for SimMsr {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let mut state = self.state.borrow_mut();
        if !state.has_pc8() {
            return Ok(0);
        }
        let counters = state.residency();
        let value = match ResidencyCounter::from_msr(offset) {
            Some(ResidencyCounter::Pc8) => counters.pc8,
            Some(ResidencyCounter::Pc9) => counters.pc9,
            Some(ResidencyCounter::Pc10) => counters.pc10,
            None => return Err(io::Error::from_raw_os_error(libc::EIO)),
        };
        let bytes = value.to_ne_bytes();
        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        Ok(n)
    }
}

/// One adapter per connector; sinks with an EDID answer at 0x50
pub struct SimI2c {
    state: Rc<RefCell<SimState>>,
}

impl SimI2c {
    pub fn new(state: Rc<RefCell<SimState>>) -> Self {
        Self { state }
    }
}

impl I2cProbe for SimI2c {
    fn adapter_count(&mut self) -> Result<usize> {
        let state = self.state.borrow();
        let config = state.config();
        Ok(if config.i2c_adapters {
            config.connectors.len()
        } else {
            0
        })
    }

    fn count_valid_edids(&mut self) -> Result<usize> {
        let mut state = self.state.borrow_mut();
        // GMBUS transfers need the device awake
        state.touch("gmbus");
        Ok(state
            .config()
            .connectors
            .iter()
            .filter(|c| c.connected && c.edid)
            .count())
    }
}
