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

//! Reading every file under a directory while suspended
//!
//! Plenty of debugfs and sysfs handlers touch hardware. Each one must either
//! wake the device properly or not need it, and in both cases the device has
//! to be allowed back into suspend afterwards.

use std::fs::File;
use std::io::Read;
use std::os::fd::IntoRawFd;
use std::path::Path;

use walkdir::WalkDir;

use super::error::{PmError, Result};
use super::harness::Harness;

/// Directories nested deeper than this are treated as a loop
pub const MAX_DEPTH: usize = 128;

const READ_CHUNK: usize = 128;

/// Read `path` to the end in small chunks, stopping at the first read error
///
/// Returns the number of bytes read, or `None` if the file can't be opened.
/// Failing to close it is fatal.
pub fn read_full_file(path: &Path) -> Result<Option<usize>> {
    let Ok(mut file) = File::open(path) else {
        return Ok(None);
    };
    let mut buf = [0u8; READ_CHUNK];
    let mut total = 0;

    loop {
        match file.read(&mut buf) {
            Ok(n) => {
                total += n;
                if n < READ_CHUNK {
                    break;
                }
            }
            Err(_) => break,
        }
    }

    let fd = file.into_raw_fd();
    // SAFETY: fd was just released by `file` and is closed exactly once.
    if unsafe { libc::close(fd) } != 0 {
        return Err(PmError::driver("close"));
    }
    Ok(Some(total))
}

impl Harness {
    /// Suspend, then read every regular file under `root`, requiring the
    /// device to be suspended before and after each one
    ///
    /// Skips if `root` cannot be listed. Symlinks are not followed; files
    /// that cannot be opened are ignored.
    pub fn read_tree_while_suspended(&mut self, root: &Path) -> Result<()> {
        if let Err(e) = std::fs::read_dir(root) {
            return Err(PmError::PreconditionMissing(format!(
                "can't open {}: {}",
                root.display(),
                e
            )));
        }

        self.force_suspend_and_confirm(&format!("before reading {}", root.display()))?;

        let mut files = 0usize;
        for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            if entry.depth() >= MAX_DEPTH {
                return Err(PmError::ProtocolViolation(format!(
                    "{} is nested more than {} levels deep",
                    entry.path().display(),
                    MAX_DEPTH
                )));
            }
            if !entry.file_type().is_file() {
                continue;
            }

            let context = format!("file: {}", entry.path().display());
            self.confirm_suspended(&context)?;
            if let Some(bytes) = read_full_file(entry.path())? {
                log::debug!("read {} bytes from {}", bytes, entry.path().display());
            }
            self.confirm_suspended(&context)?;
            files += 1;
        }

        log::info!("read {} files under {}", files, root.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_full_file_reads_past_first_chunk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big");
        std::fs::write(&path, vec![7u8; 3 * READ_CHUNK + 5]).unwrap();

        assert_eq!(read_full_file(&path).unwrap(), Some(3 * READ_CHUNK + 5));
    }

    #[test]
    fn test_read_full_file_directory_reads_empty() {
        let dir = TempDir::new().unwrap();
        assert_eq!(read_full_file(dir.path()).unwrap(), Some(0));
    }

    #[test]
    fn test_read_full_file_missing() {
        let dir = TempDir::new().unwrap();
        assert_eq!(read_full_file(&dir.path().join("nope")).unwrap(), None);
    }
}
