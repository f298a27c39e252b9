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

//! EDID validation over DRM and raw I2C
//!
//! Reading EDIDs through `/dev/i2c-*` while the device is runtime suspended
//! exercises GMBUS and its interrupts. The harness counts how many valid
//! EDIDs it finds on the raw buses and expects the same number DRM reports.
//! Only the 8-byte header is checked; the checksum is not.

use std::fs::{self, OpenOptions};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use super::PropertyBlob;
use crate::core::error::{PmError, Result};

/// Fixed pattern every EDID base block starts with
pub const EDID_HEADER: [u8; 8] = [0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00];

/// DDC address of the EDID EEPROM
const DDC_ADDR: u16 = 0x50;

const I2C_RDWR: libc::c_ulong = 0x0707;
const I2C_M_RD: u16 = 0x0001;

/// Whether the block starts with a valid EDID header
pub fn edid_is_valid(edid: &[u8]) -> bool {
    edid.starts_with(&EDID_HEADER)
}

/// Number of DRM-reported EDID blobs with a valid header
pub fn count_valid_edids(edids: &[Option<PropertyBlob>]) -> usize {
    edids
        .iter()
        .flatten()
        .filter(|blob| edid_is_valid(&blob.data))
        .count()
}

/// Access to the raw I2C buses
pub trait I2cProbe {
    /// Number of `i2c-*` adapters present
    fn adapter_count(&mut self) -> Result<usize>;

    /// Number of adapters answering at 0x50 with a valid EDID header
    fn count_valid_edids(&mut self) -> Result<usize>;
}

/// `/dev/i2c-*` character devices
#[derive(Debug, Clone)]
pub struct DevI2c {
    dev_dir: PathBuf,
}

#[repr(C)]
struct I2cMsg {
    addr: u16,
    flags: u16,
    len: u16,
    buf: *mut u8,
}

#[repr(C)]
struct I2cRdwrIoctlData {
    msgs: *mut I2cMsg,
    nmsgs: u32,
}

impl DevI2c {
    pub fn new(dev_dir: impl Into<PathBuf>) -> Self {
        Self {
            dev_dir: dev_dir.into(),
        }
    }

    fn adapters(&self) -> Result<Vec<PathBuf>> {
        let mut adapters = Vec::new();
        for entry in fs::read_dir(&self.dev_dir)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with("i2c-") {
                adapters.push(entry.path());
            }
        }
        adapters.sort();
        Ok(adapters)
    }

    /// Set the EEPROM offset to 0, then read one 128-byte block
    fn read_edid(path: &Path) -> Result<Option<[u8; 128]>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| {
                PmError::Io(std::io::Error::new(
                    e.kind(),
                    format!("{}: {e}", path.display()),
                ))
            })?;

        let mut edid = [0u8; 128];
        let mut msgs = [
            I2cMsg {
                addr: DDC_ADDR,
                flags: 0,
                len: 1,
                buf: edid.as_mut_ptr(),
            },
            I2cMsg {
                addr: DDC_ADDR,
                flags: I2C_M_RD,
                len: edid.len() as u16,
                buf: edid.as_mut_ptr(),
            },
        ];
        let mut data = I2cRdwrIoctlData {
            msgs: msgs.as_mut_ptr(),
            nmsgs: msgs.len() as u32,
        };

        // SAFETY: `data` points at two messages whose buffers live in `edid`
        // for the whole call.
        let rc = unsafe { libc::ioctl(file.as_raw_fd(), I2C_RDWR as _, &mut data) };
        if rc < 0 {
            log::debug!(
                "{}: no EDID ({})",
                path.display(),
                std::io::Error::last_os_error()
            );
            return Ok(None);
        }

        Ok(Some(edid))
    }
}

impl I2cProbe for DevI2c {
    fn adapter_count(&mut self) -> Result<usize> {
        Ok(self.adapters()?.len())
    }

    fn count_valid_edids(&mut self) -> Result<usize> {
        let mut valid = 0;
        for path in self.adapters()? {
            if let Some(edid) = Self::read_edid(&path)? {
                if edid_is_valid(&edid) {
                    valid += 1;
                }
            }
        }
        Ok(valid)
    }
}
