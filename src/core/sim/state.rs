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

//! Shared state of the simulated device

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::time::Duration;

use super::SimConfig;
use crate::core::device::Chipset;
use crate::core::error::{PmError, Result};
use crate::core::gem::GemHandle;
use crate::core::kms::CrtcConfig;
use crate::core::registers::REGISTERS;
use crate::core::residency::ResidencyCounters;
use crate::core::timing::{Clock, ManualClock};

/// How long the device reports `suspending` before `suspended`
pub const SUSPENDING_TIME: Duration = Duration::from_millis(50);

/// First address handed out in the fake GTT
const GTT_BASE: u64 = 0x0010_0000;

/// Power state of the simulated device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimPower {
    Active,
    Suspending,
    Suspended,
}

impl SimPower {
    pub fn status_text(self) -> &'static str {
        match self {
            SimPower::Active => "active\n",
            SimPower::Suspending => "suspending\n",
            SimPower::Suspended => "suspended\n",
        }
    }
}

/// A GEM object; the backing store is shared with its mappings
#[derive(Debug, Clone)]
pub struct GemObject {
    pub data: Rc<RefCell<Vec<u8>>>,
    pub gtt_offset: u64,
}

/// Everything the simulated device knows
pub struct SimState {
    config: SimConfig,
    clock: Rc<ManualClock>,

    autosuspend_delay: Option<Duration>,
    control: Vec<u8>,

    /// When the device last became idle (or was last touched while idle);
    /// `None` while something keeps it busy
    idle_since: Option<Duration>,
    residency: ResidencyCounters,
    settled_at: Duration,
    resumes: usize,

    crtcs: Vec<(u32, Option<CrtcConfig>)>,
    framebuffers: Vec<(u32, u32, u32)>,
    next_fb: u32,

    objects: HashMap<GemHandle, GemObject>,
    next_handle: GemHandle,
    next_gtt: u64,
    batches: usize,

    forcewake_held: bool,
    registers: BTreeMap<u32, u32>,
}

impl SimState {
    pub fn new(config: SimConfig, clock: Rc<ManualClock>) -> Self {
        let crtcs = (0..config.crtcs).map(|i| (100 + i as u32, None)).collect();
        let registers = REGISTERS
            .iter()
            .enumerate()
            .map(|(i, def)| (def.offset, 0x0101_0000 * (i as u32 + 1)))
            .collect();
        let now = clock.now();

        let mut state = Self {
            config,
            clock,
            autosuspend_delay: None,
            control: b"on\n".to_vec(),
            idle_since: None,
            residency: ResidencyCounters::default(),
            settled_at: now,
            resumes: 0,
            crtcs,
            framebuffers: Vec::new(),
            next_fb: 1,
            objects: HashMap::new(),
            next_handle: 1,
            next_gtt: GTT_BASE,
            batches: 0,
            forcewake_held: false,
            registers,
        };
        state.update_busy();
        state
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    fn may_suspend(&self) -> bool {
        if self.config.faults.stuck_active {
            return false;
        }
        let runtime_pm_allowed = self.config.has_runtime_pm && self.control == b"auto\n";
        let pc8_only = !self.config.has_runtime_pm && self.has_pc8();
        runtime_pm_allowed || pc8_only
    }

    fn busy(&self) -> bool {
        self.display_active() || self.forcewake_held || !self.may_suspend()
    }

    /// Idle time after which the device is fully suspended
    fn suspend_after(&self) -> Duration {
        self.autosuspend_delay.unwrap_or_default() + self.config.suspend_latency
    }

    /// Power state at the current virtual time
    pub fn power(&self) -> SimPower {
        let Some(idle_since) = self.idle_since else {
            return SimPower::Active;
        };
        let idle_for = self.now().saturating_sub(idle_since);
        let threshold = self.suspend_after();

        if idle_for < threshold {
            SimPower::Active
        } else if idle_for < threshold + SUSPENDING_TIME {
            SimPower::Suspending
        } else {
            SimPower::Suspended
        }
    }

    /// Contents of `runtime_status`
    pub fn status_text(&self) -> String {
        match &self.config.faults.status_text {
            Some(text) => text.clone(),
            None => self.power().status_text().to_string(),
        }
    }

    /// Credit residency for the time spent suspended since the last call
    fn settle(&mut self) {
        let now = self.now();
        if let Some(idle_since) = self.idle_since {
            let suspended_from = idle_since + self.suspend_after() + SUSPENDING_TIME;
            let start = suspended_from.max(self.settled_at);
            if now > start {
                let us = (now - start).as_micros() as u64;
                self.residency.pc8 += us;
                self.residency.pc9 += us / 2;
                self.residency.pc10 += us / 4;
            }
        }
        self.settled_at = now;
    }

    /// Recompute idleness after a change to what keeps the device busy
    fn update_busy(&mut self) {
        self.settle();
        if self.busy() {
            self.idle_since = None;
        } else if self.idle_since.is_none() {
            self.idle_since = Some(self.now());
        }
    }

    /// Hardware access: wake the device if needed and restart the idle timer
    pub fn touch(&mut self, what: &str) {
        self.settle();
        if self.power() != SimPower::Active {
            self.resumes += 1;
            log::debug!("sim: {} resumed the device ({} resumes)", what, self.resumes);
            if self.config.faults.corrupt_on_resume {
                self.corrupt();
            }
        }
        if self.idle_since.is_some() {
            self.idle_since = Some(self.now());
        }
    }

    fn corrupt(&mut self) {
        for object in self.objects.values() {
            if let Some(byte) = object.data.borrow_mut().first_mut() {
                *byte ^= 0xA5;
            }
        }
        for value in self.registers.values_mut() {
            *value ^= 0x1;
        }
    }

    pub fn residency(&mut self) -> ResidencyCounters {
        self.settle();
        self.residency
    }

    pub fn has_pc8(&self) -> bool {
        self.config.has_pc8 && Chipset::new(self.config.devid).is_haswell()
    }

    pub fn resumes(&self) -> usize {
        self.resumes
    }

    pub fn set_autosuspend_delay(&mut self, delay: Duration) {
        self.autosuspend_delay = Some(delay);
        self.update_busy();
    }

    pub fn set_control(&mut self, value: &[u8]) {
        self.control = value.to_vec();
        self.update_busy();
    }

    pub fn control(&self) -> &[u8] {
        &self.control
    }

    pub fn set_forcewake(&mut self, held: bool) {
        if held {
            self.touch("forcewake");
        }
        self.forcewake_held = held;
        self.update_busy();
    }

    pub fn forcewake_held(&self) -> bool {
        self.forcewake_held
    }

    pub fn display_active(&self) -> bool {
        self.crtcs.iter().any(|(_, config)| config.is_some())
    }

    pub fn crtcs(&self) -> &[(u32, Option<CrtcConfig>)] {
        &self.crtcs
    }

    pub fn set_crtc(&mut self, crtc_id: u32, config: Option<CrtcConfig>) -> Result<()> {
        if let Some(config) = &config {
            if !self.framebuffers.iter().any(|&(id, _, _)| id == config.fb_id) {
                return Err(PmError::Driver {
                    call: "DRM_IOCTL_MODE_SETCRTC",
                    source: std::io::Error::from_raw_os_error(libc::ENOENT),
                });
            }
        }
        let Some(slot) = self.crtcs.iter_mut().find(|(id, _)| *id == crtc_id) else {
            return Err(PmError::Driver {
                call: "DRM_IOCTL_MODE_SETCRTC",
                source: std::io::Error::from_raw_os_error(libc::ENOENT),
            });
        };
        slot.1 = config;

        self.touch("modeset");
        self.update_busy();
        Ok(())
    }

    pub fn add_framebuffer(&mut self, width: u32, height: u32) -> u32 {
        let id = self.next_fb;
        self.next_fb += 1;
        self.framebuffers.push((id, width, height));
        id
    }

    pub fn framebuffer_ids(&self) -> Vec<u32> {
        self.framebuffers.iter().map(|&(id, _, _)| id).collect()
    }

    pub fn create_object(&mut self, size: u64) -> GemHandle {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.objects.insert(
            handle,
            GemObject {
                data: Rc::new(RefCell::new(vec![0; size as usize])),
                gtt_offset: self.next_gtt,
            },
        );
        // Page aligned, with a guard page between objects
        self.next_gtt += (size + 0x1FFF) & !0xFFF;
        handle
    }

    pub fn object(&self, handle: GemHandle) -> Result<&GemObject> {
        self.objects.get(&handle).ok_or_else(|| PmError::Driver {
            call: "GEM lookup",
            source: std::io::Error::from_raw_os_error(libc::ENOENT),
        })
    }

    pub fn close_object(&mut self, handle: GemHandle) -> Result<()> {
        self.objects
            .remove(&handle)
            .map(|_| ())
            .ok_or_else(|| PmError::Driver {
                call: "DRM_IOCTL_GEM_CLOSE",
                source: std::io::Error::from_raw_os_error(libc::EINVAL),
            })
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Object whose GTT range contains `address`
    pub fn object_at(&self, address: u64) -> Option<&GemObject> {
        self.objects.values().find(|o| {
            address >= o.gtt_offset && address < o.gtt_offset + o.data.borrow().len() as u64
        })
    }

    pub fn count_batch(&mut self) {
        self.batches += 1;
    }

    pub fn batches(&self) -> usize {
        self.batches
    }

    /// Side effect of a read-only query under `queries_blank_display`
    pub fn query_disturbs_display(&mut self) {
        if self.config.faults.queries_blank_display && self.display_active() {
            log::debug!("sim: query blanked the display");
            for (_, config) in self.crtcs.iter_mut() {
                *config = None;
            }
            self.update_busy();
        }
    }

    pub fn read_register(&mut self, offset: u32) -> u32 {
        self.touch("register read");
        self.query_disturbs_display();
        self.registers.get(&offset).copied().unwrap_or(0)
    }
}
