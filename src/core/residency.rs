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

//! Package C-state residency sampling
//!
//! Haswell ULT parts expose how long the package has spent in PC8, PC9 and
//! PC10 through three model specific registers. The counters only ever grow
//! while the package sits in that state, so the harness never looks at their
//! absolute value: a change in any of them means the package reached PC8+.
//!
//! # MSR Layout
//!
//! ```text
//! 0x630: MSR_PKG_C8_RESIDENCY   (64-bit)
//! 0x631: MSR_PKG_C9_RESIDENCY   (64-bit)
//! 0x632: MSR_PKG_C10_RESIDENCY  (64-bit)
//! ```
//!
//! The `msr` character device is addressed by register number: a positional
//! 8-byte read at offset `0x630` returns PC8 residency. Anything shorter than
//! 8 bytes means the CPU does not implement the register.

use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;

use super::error::{PmError, Result};

/// A file that supports positional reads, such as `/dev/cpu/0/msr`
pub trait CounterFile {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;
}

impl CounterFile for File {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        FileExt::read_at(self, buf, offset)
    }
}

/// One of the three deep package residency counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResidencyCounter {
    Pc8,
    Pc9,
    Pc10,
}

impl ResidencyCounter {
    pub const ALL: [ResidencyCounter; 3] = [Self::Pc8, Self::Pc9, Self::Pc10];

    /// MSR address of the counter
    pub fn msr(self) -> u64 {
        match self {
            Self::Pc8 => 0x630,
            Self::Pc9 => 0x631,
            Self::Pc10 => 0x632,
        }
    }

    /// Inverse of [`ResidencyCounter::msr`]
    pub fn from_msr(msr: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.msr() == msr)
    }
}

/// Snapshot of all three residency counters
///
/// Only meaningful when compared with another snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResidencyCounters {
    pub pc8: u64,
    pub pc9: u64,
    pub pc10: u64,
}

/// Reads residency counters from an MSR device
pub struct ResidencySampler {
    msr: Box<dyn CounterFile>,
}

impl ResidencySampler {
    pub fn new(msr: Box<dyn CounterFile>) -> Self {
        Self { msr }
    }

    /// Read one counter
    ///
    /// A short read is reported as [`PmError::UnsupportedPlatform`], an I/O
    /// failure as [`PmError::Io`].
    pub fn sample(&self, counter: ResidencyCounter) -> Result<u64> {
        let mut buf = [0u8; 8];
        let n = self.msr.read_at(&mut buf, counter.msr())?;
        if n != buf.len() {
            return Err(PmError::UnsupportedPlatform(format!(
                "MSR {:#x} returned {} bytes instead of {}",
                counter.msr(),
                n,
                buf.len()
            )));
        }
        Ok(u64::from_ne_bytes(buf))
    }

    /// Read all three counters
    pub fn sample_all(&self) -> Result<ResidencyCounters> {
        Ok(ResidencyCounters {
            pc8: self.sample(ResidencyCounter::Pc8)?,
            pc9: self.sample(ResidencyCounter::Pc9)?,
            pc10: self.sample(ResidencyCounter::Pc10)?,
        })
    }

    /// Whether every counter can be read
    ///
    /// Non-ULT parts have the MSR device but not the PC8+ registers.
    pub fn probe_support(&self) -> bool {
        ResidencyCounter::ALL.into_iter().all(|counter| {
            let ok = self.sample(counter).is_ok();
            if !ok {
                log::debug!("residency counter {:?} is not readable", counter);
            }
            ok
        })
    }
}
