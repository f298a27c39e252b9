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

//! Kernel runtime PM control and status
//!
//! The PCI device's `power/` directory in sysfs exposes runtime PM:
//!
//! ```text
//! autosuspend_delay_ms  write "0\n"     suspend as soon as the device idles
//! control               write "auto\n"  allow runtime suspend ("on" forbids it)
//! runtime_status        read            "active\n" | "suspended\n" | "suspending\n"
//! ```
//!
//! `autosuspend_delay_ms` must exist; a failed write to it means the driver
//! does not support runtime PM at all. Once `control` is `auto`, the harness keeps
//! `runtime_status` open for the rest of the run and re-reads it from offset
//! zero on every poll.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::error::{PmError, Result};

/// Maximum number of bytes read from `runtime_status` per poll
pub const STATUS_READ_SIZE: usize = 32;

/// Runtime PM state as reported by the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimePmStatus {
    Active,
    Suspended,
    Suspending,
}

impl RuntimePmStatus {
    const LITERALS: [(&'static [u8], RuntimePmStatus); 3] = [
        (b"suspended\n", RuntimePmStatus::Suspended),
        (b"active\n", RuntimePmStatus::Active),
        (b"suspending\n", RuntimePmStatus::Suspending),
    ];

    /// Parse the raw contents of `runtime_status`
    ///
    /// The bytes read must be a non-empty prefix of one of the three
    /// literals. Anything else (including "error" and "resuming", which
    /// this driver never reports) is a protocol violation.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if !raw.is_empty() {
            for (literal, status) in Self::LITERALS {
                if literal.starts_with(raw) {
                    return Ok(status);
                }
            }
        }

        Err(PmError::ProtocolViolation(format!(
            "unknown runtime PM status {:?}",
            String::from_utf8_lossy(raw)
        )))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RuntimePmStatus::Active => "active",
            RuntimePmStatus::Suspended => "suspended",
            RuntimePmStatus::Suspending => "suspending",
        }
    }
}

/// Anything `runtime_status` can be read from
pub trait StatusFile: Read + Seek {}

impl<T: Read + Seek> StatusFile for T {}

/// Re-reads `runtime_status` from the start on every call
pub struct StatusReader {
    file: Box<dyn StatusFile>,
}

impl StatusReader {
    pub fn new(file: Box<dyn StatusFile>) -> Self {
        Self { file }
    }

    /// Current kernel runtime PM state
    pub fn read_status(&mut self) -> Result<RuntimePmStatus> {
        let mut buf = [0u8; STATUS_READ_SIZE];

        self.file.seek(SeekFrom::Start(0))?;
        let n = self.file.read(&mut buf)?;

        RuntimePmStatus::parse(&buf[..n])
    }
}

/// Write/read access to the runtime PM control files
pub trait PowerControl {
    /// Fails if the file is missing, which is a broken setup rather than a
    /// driver without runtime PM
    fn open_autosuspend_delay(&mut self) -> Result<Box<dyn Write>>;

    fn write_control(&mut self, value: &[u8]) -> io::Result<usize>;

    fn read_control(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn open_status(&mut self) -> io::Result<Box<dyn StatusFile>>;
}

/// The real sysfs `power/` directory of a PCI device
#[derive(Debug, Clone)]
pub struct SysfsPowerDir {
    dir: PathBuf,
}

impl SysfsPowerDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn write_file(&self, name: &str, value: &[u8]) -> io::Result<usize> {
        let mut file = OpenOptions::new().write(true).open(self.dir.join(name))?;
        file.write(value)
    }
}

impl PowerControl for SysfsPowerDir {
    fn open_autosuspend_delay(&mut self) -> Result<Box<dyn Write>> {
        let path = self.dir.join("autosuspend_delay_ms");
        let file = OpenOptions::new().write(true).open(&path).map_err(|e| {
            PmError::ProtocolViolation(format!("can't open {}: {}", path.display(), e))
        })?;
        Ok(Box::new(file))
    }

    fn write_control(&mut self, value: &[u8]) -> io::Result<usize> {
        self.write_file("control", value)
    }

    fn read_control(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        File::open(self.dir.join("control"))?.read(buf)
    }

    fn open_status(&mut self) -> io::Result<Box<dyn StatusFile>> {
        Ok(Box::new(File::open(self.dir.join("runtime_status"))?))
    }
}

/// Enable runtime PM with a zero autosuspend delay
///
/// Returns `Ok(None)` when the driver does not support runtime PM, otherwise
/// a reader for `runtime_status`. A zero delay keeps the run short and makes
/// races between submission and suspend more likely to show up.
pub fn setup_runtime_pm(power: &mut dyn PowerControl) -> Result<Option<StatusReader>> {
    let mut delay = power.open_autosuspend_delay()?;
    match delay.write(b"0\n") {
        Ok(2) => {}
        Ok(n) => {
            log::info!("autosuspend_delay_ms accepted {} bytes, no runtime PM", n);
            return Ok(None);
        }
        Err(e) => {
            log::info!("autosuspend_delay_ms not writable ({}), no runtime PM", e);
            return Ok(None);
        }
    }

    let written = power.write_control(b"auto\n")?;
    if written != 5 {
        return Err(PmError::ProtocolViolation(format!(
            "short write to power/control: {} bytes",
            written
        )));
    }

    let mut buf = [0u8; 6];
    let n = power.read_control(&mut buf)?;
    if &buf[..n] != b"auto\n" {
        return Err(PmError::ProtocolViolation(format!(
            "power/control reads back {:?} instead of \"auto\"",
            String::from_utf8_lossy(&buf[..n])
        )));
    }

    Ok(Some(StatusReader::new(power.open_status()?)))
}

#[cfg(test)]
mod tests;
