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

//! Register state across a suspend cycle
//!
//! The driver must restore everything it programmed at init (clock gating
//! workarounds, interrupt enables, DDI buffer translations) when it resumes.
//! Reading MMIO from userspace behind the driver's back is not safe on every
//! platform, so this check only runs on request.

use std::fs::File;
use std::path::Path;

use memmap2::{Mmap, MmapOptions};

use super::error::{PmError, Result};

/// Size of the MMIO window mapped from BAR0
pub const MMIO_SIZE: usize = 2 * 1024 * 1024;

/// A register in the snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterDef {
    pub name: &'static str,
    pub offset: u32,
    /// Whether the value must survive a suspend cycle
    pub compared: bool,
}

const fn reg(name: &'static str, offset: u32, compared: bool) -> RegisterDef {
    RegisterDef {
        name,
        offset,
        compared,
    }
}

/// Registers captured before and after suspend
pub const REGISTERS: [RegisterDef; 12] = [
    reg("ARB_MODE", 0x4030, true),
    reg("TILECTL", 0x101000, true),
    reg("GEN6_UCGCTL2", 0x9404, true),
    reg("GEN7_L3CNTLREG1", 0xB01C, true),
    reg("TRANSA_CHICKEN1", 0xF0060, true),
    reg("DEIER", 0x4400C, false),
    reg("GTIER", 0x4401C, true),
    reg("DDI_BUF_TRANS_A_1", 0x64E00, true),
    reg("DDI_BUF_TRANS_B_5", 0x64E70, true),
    reg("DDI_BUF_TRANS_C_10", 0x64EE0, true),
    reg("DDI_BUF_TRANS_D_15", 0x64F58, true),
    reg("DDI_BUF_TRANS_E_20", 0x64FCC, true),
];

/// 32-bit register reads
pub trait RegisterReader {
    fn read32(&self, offset: u32) -> Result<u32>;
}

/// BAR0 of the GPU mapped through its sysfs `resource0` file
pub struct MmioRegisters {
    map: Mmap,
}

impl MmioRegisters {
    pub fn open(resource: &Path) -> Result<Self> {
        let file = File::open(resource)?;
        // SAFETY: the mapping is only ever read with volatile loads and the
        // device keeps BAR0 mapped for as long as the file is open.
        let map = unsafe { MmapOptions::new().len(MMIO_SIZE).map(&file)? };
        Ok(Self { map })
    }
}

impl RegisterReader for MmioRegisters {
    fn read32(&self, offset: u32) -> Result<u32> {
        let offset = offset as usize;
        if offset % 4 != 0 || offset + 4 > self.map.len() {
            return Err(PmError::ProtocolViolation(format!(
                "register offset {offset:#x} outside MMIO window"
            )));
        }
        // SAFETY: bounds and alignment checked above.
        let value = unsafe { std::ptr::read_volatile(self.map.as_ptr().add(offset) as *const u32) };
        Ok(value)
    }
}

/// Values of [`REGISTERS`] at one point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterSnapshot {
    values: Vec<(RegisterDef, u32)>,
}

impl RegisterSnapshot {
    pub fn capture(regs: &dyn RegisterReader) -> Result<Self> {
        let values = REGISTERS
            .iter()
            .map(|&def| Ok((def, regs.read32(def.offset)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { values })
    }

    pub fn value(&self, name: &str) -> Option<u32> {
        self.values
            .iter()
            .find(|(def, _)| def.name == name)
            .map(|&(_, value)| value)
    }

    /// Fail on the first compared register whose value changed
    pub fn assert_equal(&self, after: &RegisterSnapshot) -> Result<()> {
        for ((def, before), (_, now)) in self.values.iter().zip(&after.values) {
            if def.compared && before != now {
                return Err(PmError::DataIntegrity(format!(
                    "{} ({:#x}) changed across suspend: {:#010x} -> {:#010x}",
                    def.name, def.offset, before, now
                )));
            }
        }
        Ok(())
    }
}
