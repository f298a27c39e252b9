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

use std::time::Duration;

use super::*;
use crate::core::gem::batch::BltFill;
use crate::core::gem::{ExecBuffer, ExecObject, GemDevice, GemDomain, MapKind, Relocation, Ring};
use crate::core::kms::{KmsDevice, ModeSetData, ScreenType};
use crate::core::runtime_pm::{setup_runtime_pm, RuntimePmStatus};

fn backend_with_runtime_pm(config: SimConfig) -> SimBackend {
    let mut backend = SimBackend::new(config);
    let mut power = backend.power_control().unwrap();
    setup_runtime_pm(power.as_mut()).unwrap();
    backend
}

fn advance(backend: &SimBackend, ms: u64) {
    backend.manual_clock().advance(Duration::from_millis(ms));
}

#[test]
fn test_stays_active_until_runtime_pm_enabled() {
    let backend = SimBackend::new(SimConfig::runtime_pm_only());
    advance(&backend, 60_000);
    assert_eq!(backend.state().borrow().power(), SimPower::Active);
}

#[test]
fn test_idle_device_suspends_after_latency() {
    let backend = backend_with_runtime_pm(SimConfig::default());
    let state = backend.state();

    assert_eq!(state.borrow().power(), SimPower::Active);
    advance(&backend, 300);
    assert_eq!(state.borrow().power(), SimPower::Suspending);
    advance(&backend, 50);
    assert_eq!(state.borrow().power(), SimPower::Suspended);
    assert_eq!(state.borrow().status_text(), "suspended\n");
}

#[test]
fn test_status_file_parses() {
    let mut backend = backend_with_runtime_pm(SimConfig::default());
    let mut power = backend.power_control().unwrap();
    let mut reader = crate::core::runtime_pm::StatusReader::new(power.open_status().unwrap());

    assert_eq!(reader.read_status().unwrap(), RuntimePmStatus::Active);
    advance(&backend, 1000);
    assert_eq!(reader.read_status().unwrap(), RuntimePmStatus::Suspended);
}

#[test]
fn test_no_runtime_pm_rejects_autosuspend_delay() {
    let mut backend = SimBackend::new(SimConfig::pc8_only());
    let mut power = backend.power_control().unwrap();
    assert!(setup_runtime_pm(power.as_mut()).unwrap().is_none());
}

#[test]
fn test_access_resumes_and_counts() {
    let mut backend = backend_with_runtime_pm(SimConfig::default());
    let state = backend.state();
    let mut device = backend.open_device().unwrap();

    advance(&backend, 1000);
    assert_eq!(state.borrow().power(), SimPower::Suspended);

    let handle = device.gem_create(4096).unwrap();
    assert_eq!(state.borrow().power(), SimPower::Active);
    assert_eq!(state.borrow().resumes(), 1);

    advance(&backend, 1000);
    device.gem_close(handle).unwrap();
    // Closing does not touch the hardware
    assert_eq!(state.borrow().resumes(), 1);
}

#[test]
fn test_residency_only_moves_while_suspended() {
    let backend = SimBackend::new(SimConfig::pc8_only());
    let state = backend.state();

    let before = state.borrow_mut().residency();
    advance(&backend, 200);
    assert_eq!(state.borrow_mut().residency(), before);

    advance(&backend, 1000);
    let after = state.borrow_mut().residency();
    assert!(after.pc8 > before.pc8);
    assert!(after.pc9 > before.pc9);
    assert!(after.pc10 > before.pc10);
}

#[test]
fn test_msr_short_read_without_pc8() {
    let mut backend = SimBackend::new(SimConfig::runtime_pm_only());
    let msr = backend.open_msr().unwrap();
    let mut buf = [0u8; 8];
    assert_eq!(msr.read_at(&mut buf, 0x630).unwrap(), 0);
}

#[test]
fn test_display_keeps_device_awake() {
    let mut backend = backend_with_runtime_pm(SimConfig::default());
    let state = backend.state();
    let mut device = backend.open_device().unwrap();
    let data = ModeSetData::capture(device.as_mut()).unwrap();

    let mut display = crate::core::display::DisplayDriver::new(device.as_mut(), &data);
    assert!(display.enable_one_output(ScreenType::Lpsp).unwrap());
    advance(&backend, 60_000);
    assert_eq!(state.borrow().power(), SimPower::Active);

    display.disable_all_outputs().unwrap();
    display.disable_all_outputs().unwrap();
    advance(&backend, 1000);
    assert_eq!(state.borrow().power(), SimPower::Suspended);
}

#[test]
fn test_stuck_active_never_suspends() {
    let mut config = SimConfig::default();
    config.faults.stuck_active = true;
    let backend = backend_with_runtime_pm(config);

    advance(&backend, 60_000);
    assert_eq!(backend.state().borrow().power(), SimPower::Active);
}

#[test]
fn test_gtt_access_wakes_cpu_access_does_not() {
    let mut backend = backend_with_runtime_pm(SimConfig::default());
    let state = backend.state();
    let mut device = backend.open_device().unwrap();
    let handle = device.gem_create(8192).unwrap();

    let cpu = device.gem_mmap(handle, 8192, MapKind::Cpu).unwrap();
    let gtt = device.gem_mmap(handle, 8192, MapKind::Gtt).unwrap();
    advance(&backend, 1000);

    let mut byte = [0u8; 1];
    cpu.load(0, &mut byte).unwrap();
    assert_eq!(state.borrow().power(), SimPower::Suspended);
    gtt.load(0, &mut byte).unwrap();
    assert_eq!(state.borrow().power(), SimPower::Active);
}

#[test]
fn test_blit_lands_at_relocated_address() {
    let mut backend = backend_with_runtime_pm(SimConfig::default());
    let mut device = backend.open_device().unwrap();

    // A decoy first so the destination is not at the bottom of the GTT
    let decoy = device.gem_create(4096).unwrap();
    let dst = device.gem_create(128 * 128 * 4).unwrap();
    let batch = device.gem_create(4096).unwrap();

    let rect = BltFill {
        x: 1,
        y: 2,
        width: 3,
        height: 4,
        pitch: 512,
        color: 0xCAFE_F00D,
    };
    let encoded = rect.encode(0);
    device.gem_write(batch, 0, &encoded.batch.to_bytes()).unwrap();

    let mut batch_object = ExecObject::new(batch);
    batch_object.relocations.push(Relocation {
        target_handle: dst,
        delta: encoded.offset_in_dst,
        offset: (encoded.reloc_dword * 4) as u64,
        presumed_offset: 0,
        read_domains: GemDomain::RENDER,
        write_domain: GemDomain::RENDER,
    });
    let mut exec = ExecBuffer {
        objects: vec![ExecObject::new(dst), batch_object],
        batch_len: encoded.batch.len_bytes() as u32,
        ring: Ring::Blt,
    };
    device.execbuf(&mut exec).unwrap();
    assert_ne!(exec.objects[1].relocations[0].presumed_offset, 0);

    let mut pixels = vec![0u8; 128 * 128 * 4];
    device.gem_read(dst, 0, &mut pixels).unwrap();
    let px = |x: usize, y: usize| {
        let at = (y * 128 + x) * 4;
        u32::from_ne_bytes([pixels[at], pixels[at + 1], pixels[at + 2], pixels[at + 3]])
    };
    assert_eq!(px(1, 2), 0xCAFE_F00D);
    assert_eq!(px(3, 5), 0xCAFE_F00D);
    assert_eq!(px(4, 2), 0);
    assert_eq!(px(1, 6), 0);

    let mut untouched = vec![0u8; 4096];
    device.gem_read(decoy, 0, &mut untouched).unwrap();
    assert!(untouched.iter().all(|&b| b == 0));
}

#[test]
fn test_blit_on_render_ring_rejected() {
    let mut backend = backend_with_runtime_pm(SimConfig::default());
    let mut device = backend.open_device().unwrap();
    let dst = device.gem_create(4096).unwrap();
    let batch = device.gem_create(4096).unwrap();

    let encoded = BltFill {
        x: 0,
        y: 0,
        width: 1,
        height: 1,
        pitch: 64,
        color: 1,
    }
    .encode(0);
    device.gem_write(batch, 0, &encoded.batch.to_bytes()).unwrap();

    let mut batch_object = ExecObject::new(batch);
    batch_object.relocations.push(Relocation {
        target_handle: dst,
        delta: 0,
        offset: (encoded.reloc_dword * 4) as u64,
        presumed_offset: 0,
        read_domains: GemDomain::RENDER,
        write_domain: GemDomain::RENDER,
    });
    let mut exec = ExecBuffer {
        objects: vec![ExecObject::new(dst), batch_object],
        batch_len: encoded.batch.len_bytes() as u32,
        ring: Ring::Render,
    };
    assert!(device.execbuf(&mut exec).is_err());
}

#[test]
fn test_snapshot_stable_across_suspend() {
    let mut backend = backend_with_runtime_pm(SimConfig::default());
    let mut device = backend.open_device().unwrap();

    let before = crate::core::kms::ModeSetSnapshot::capture(device.as_mut()).unwrap();
    advance(&backend, 1000);
    let after = crate::core::kms::ModeSetSnapshot::capture(device.as_mut()).unwrap();
    before.assert_equal(&after).unwrap();
    assert_eq!(before.edids.iter().flatten().count(), 2);
}

#[test]
fn test_resources_shape() {
    let mut backend = SimBackend::new(SimConfig::default());
    let mut device = backend.open_device().unwrap();
    let res = device.resources().unwrap();
    assert_eq!(res.crtcs.len(), 3);
    assert_eq!(res.connectors.len(), 3);
    assert_eq!(res.encoders.len(), 3);
}
