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

use super::*;
use proptest::prelude::*;
use std::io::Cursor;
use tempfile::TempDir;

#[test]
fn test_parse_literals() {
    assert_eq!(
        RuntimePmStatus::parse(b"active\n").unwrap(),
        RuntimePmStatus::Active
    );
    assert_eq!(
        RuntimePmStatus::parse(b"suspended\n").unwrap(),
        RuntimePmStatus::Suspended
    );
    assert_eq!(
        RuntimePmStatus::parse(b"suspending\n").unwrap(),
        RuntimePmStatus::Suspending
    );
}

#[test]
fn test_parse_without_newline() {
    assert_eq!(
        RuntimePmStatus::parse(b"active").unwrap(),
        RuntimePmStatus::Active
    );
}

#[test]
fn test_parse_unknown_is_protocol_violation() {
    for raw in [&b"resuming\n"[..], b"error\n", b"unsupported\n", b""] {
        let err = RuntimePmStatus::parse(raw).unwrap_err();
        assert!(matches!(err, PmError::ProtocolViolation(_)), "{:?}", raw);
        assert!(!err.is_skip());
    }
}

#[test]
fn test_status_reader_rewinds() {
    let mut reader = StatusReader::new(Box::new(Cursor::new(b"suspended\n".to_vec())));
    assert_eq!(reader.read_status().unwrap(), RuntimePmStatus::Suspended);
    assert_eq!(reader.read_status().unwrap(), RuntimePmStatus::Suspended);
}

#[test]
fn test_status_reader_sees_file_updates() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("runtime_status");
    std::fs::write(&path, "active\n").unwrap();

    let mut reader = StatusReader::new(Box::new(File::open(&path).unwrap()));
    assert_eq!(reader.read_status().unwrap(), RuntimePmStatus::Active);

    std::fs::write(&path, "suspended\n").unwrap();
    assert_eq!(reader.read_status().unwrap(), RuntimePmStatus::Suspended);
}

fn power_dir_with_files() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("autosuspend_delay_ms"), "").unwrap();
    std::fs::write(dir.path().join("control"), "").unwrap();
    std::fs::write(dir.path().join("runtime_status"), "active\n").unwrap();
    dir
}

#[test]
fn test_setup_runtime_pm_enables_auto() {
    let dir = power_dir_with_files();
    let mut power = SysfsPowerDir::new(dir.path());

    let mut reader = setup_runtime_pm(&mut power).unwrap().unwrap();

    assert_eq!(
        std::fs::read_to_string(dir.path().join("autosuspend_delay_ms")).unwrap(),
        "0\n"
    );
    assert_eq!(
        std::fs::read_to_string(dir.path().join("control")).unwrap(),
        "auto\n"
    );
    assert_eq!(reader.read_status().unwrap(), RuntimePmStatus::Active);
}

#[test]
fn test_setup_runtime_pm_missing_power_dir_is_fatal() {
    let dir = TempDir::new().unwrap();
    let mut power = SysfsPowerDir::new(dir.path().join("no-such-power-dir"));

    let err = setup_runtime_pm(&mut power).err().unwrap();
    assert!(matches!(err, PmError::ProtocolViolation(_)));
    assert!(!err.is_skip());
    assert!(err.to_string().contains("autosuspend_delay_ms"));
}

#[test]
fn test_setup_runtime_pm_missing_delay_file_is_fatal() {
    let dir = power_dir_with_files();
    std::fs::remove_file(dir.path().join("autosuspend_delay_ms")).unwrap();
    let mut power = SysfsPowerDir::new(dir.path());

    assert!(setup_runtime_pm(&mut power).is_err());
}

/// `autosuspend_delay_ms` exists but the driver rejects every write
struct RejectingDelay;

impl Write for RejectingDelay {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::from(io::ErrorKind::PermissionDenied))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct NoRuntimePm;

impl PowerControl for NoRuntimePm {
    fn open_autosuspend_delay(&mut self) -> Result<Box<dyn Write>> {
        Ok(Box::new(RejectingDelay))
    }

    fn write_control(&mut self, _value: &[u8]) -> io::Result<usize> {
        panic!("control must not be touched without runtime PM");
    }

    fn read_control(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        panic!("control must not be touched without runtime PM");
    }

    fn open_status(&mut self) -> io::Result<Box<dyn StatusFile>> {
        panic!("runtime_status must not be opened without runtime PM");
    }
}

#[test]
fn test_setup_runtime_pm_rejected_write_means_unsupported() {
    assert!(setup_runtime_pm(&mut NoRuntimePm).unwrap().is_none());
}

/// Control file that never takes the new policy
struct StubbornControl;

impl PowerControl for StubbornControl {
    fn open_autosuspend_delay(&mut self) -> Result<Box<dyn Write>> {
        Ok(Box::new(io::sink()))
    }

    fn write_control(&mut self, value: &[u8]) -> io::Result<usize> {
        Ok(value.len())
    }

    fn read_control(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        buf[..3].copy_from_slice(b"on\n");
        Ok(3)
    }

    fn open_status(&mut self) -> io::Result<Box<dyn StatusFile>> {
        Ok(Box::new(Cursor::new(b"active\n".to_vec())))
    }
}

#[test]
fn test_setup_runtime_pm_control_readback_mismatch() {
    let err = setup_runtime_pm(&mut StubbornControl).err().unwrap();
    assert!(matches!(err, PmError::ProtocolViolation(_)));
}

proptest! {
    #[test]
    fn prop_parse_rejects_non_prefixes(raw in proptest::collection::vec(any::<u8>(), 0..32)) {
        let is_prefix = !raw.is_empty()
            && [&b"active\n"[..], b"suspended\n", b"suspending\n"]
                .iter()
                .any(|literal| literal.starts_with(&raw));
        prop_assert_eq!(RuntimePmStatus::parse(&raw).is_ok(), is_prefix);
    }
}
