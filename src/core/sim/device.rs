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

//! Simulated DRM device node

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use super::blitter;
use super::state::SimState;
use super::SimConnector;
use crate::core::device::{Device, ForcewakeHold};
use crate::core::error::{PmError, Result};
use crate::core::gem::batch::bytes_to_dwords;
use crate::core::gem::{check_mapping_range, ExecBuffer, GemDevice, GemHandle, GemMapping, MapKind};
use crate::core::kms::{
    Connection, Connector, Crtc, CrtcConfig, Encoder, KmsDevice, ModeInfo, PropertyBlob,
    Resources, EDID_HEADER,
};
use crate::core::registers::RegisterReader;

const CONNECTOR_ID_BASE: u32 = 10;
const ENCODER_ID_BASE: u32 = 20;
const EDID_BLOB_ID_BASE: u32 = 1000;
const EDID_PROP_ID: u32 = 1;
const DPMS_PROP_ID: u32 = 2;
const ENCODER_TYPE_TMDS: u32 = 2;
const MAX_FB_SIDE: u32 = 8192;
const PAGE_SIZE: u64 = 4096;

fn einval(call: &'static str) -> PmError {
    PmError::Driver {
        call,
        source: std::io::Error::from_raw_os_error(libc::EINVAL),
    }
}

fn enoent(call: &'static str) -> PmError {
    PmError::Driver {
        call,
        source: std::io::Error::from_raw_os_error(libc::ENOENT),
    }
}

/// CVT-ish timings for a `width`×`height` 60 Hz mode
fn sim_mode(width: u16, height: u16) -> ModeInfo {
    let htotal = width + width / 4;
    let vtotal = height + height / 20;
    ModeInfo {
        clock: u32::from(htotal) * u32::from(vtotal) * 60 / 1000,
        hdisplay: width,
        hsync_start: width + 48,
        hsync_end: width + 80,
        htotal,
        hskew: 0,
        vdisplay: height,
        vsync_start: height + 3,
        vsync_end: height + 8,
        vtotal,
        vscan: 0,
        vrefresh: 60,
        flags: 0,
        mode_type: 0x48,
        name: format!("{width}x{height}"),
    }
}

fn sim_edid(index: usize) -> Vec<u8> {
    let mut edid = vec![0u8; 128];
    edid[..8].copy_from_slice(&EDID_HEADER);
    // Manufacturer "SIM" and a per-connector serial
    edid[8] = 0x4D;
    edid[9] = 0x2D;
    edid[12] = index as u8;
    edid
}

/// [`Device`] backed by a [`SimState`]
pub struct SimDevice {
    state: Rc<RefCell<SimState>>,
}

impl SimDevice {
    pub fn new(state: Rc<RefCell<SimState>>) -> Self {
        Self { state }
    }

    fn connector_index(&self, connector_id: u32) -> Result<usize> {
        let count = self.state.borrow().config().connectors.len();
        connector_id
            .checked_sub(CONNECTOR_ID_BASE)
            .map(|i| i as usize)
            .filter(|&i| i < count)
            .ok_or_else(|| enoent("DRM_IOCTL_MODE_GETCONNECTOR"))
    }

    fn sim_connector(&self, index: usize) -> SimConnector {
        self.state.borrow().config().connectors[index].clone()
    }
}

impl KmsDevice for SimDevice {
    fn resources(&mut self) -> Result<Resources> {
        let state = self.state.borrow();
        let count = state.config().connectors.len() as u32;
        Ok(Resources {
            fbs: state.framebuffer_ids(),
            crtcs: state.crtcs().iter().map(|&(id, _)| id).collect(),
            connectors: (0..count).map(|i| CONNECTOR_ID_BASE + i).collect(),
            encoders: (0..count).map(|i| ENCODER_ID_BASE + i).collect(),
            min_width: 0,
            max_width: MAX_FB_SIDE,
            min_height: 0,
            max_height: MAX_FB_SIDE,
        })
    }

    fn connector(&mut self, connector_id: u32) -> Result<Connector> {
        let index = self.connector_index(connector_id)?;
        let sim = self.sim_connector(index);
        // Probing a connector goes over DDC/AUX
        self.state.borrow_mut().touch("connector probe");
        self.state.borrow_mut().query_disturbs_display();

        let state = self.state.borrow();
        let connector_type_id = state.config().connectors[..index]
            .iter()
            .filter(|c| c.connector_type == sim.connector_type)
            .count() as u32
            + 1;

        let modes = if sim.connected {
            vec![sim_mode(sim.width, sim.height), sim_mode(1024, 768)]
        } else {
            Vec::new()
        };
        let edid_blob = if sim.connected && sim.edid {
            u64::from(EDID_BLOB_ID_BASE + index as u32)
        } else {
            0
        };

        Ok(Connector {
            connector_id,
            connector_type: sim.connector_type,
            connector_type_id,
            connection: if sim.connected {
                Connection::Connected
            } else {
                Connection::Disconnected
            },
            mm_width: u32::from(sim.width) / 4,
            mm_height: u32::from(sim.height) / 4,
            modes,
            props: vec![EDID_PROP_ID, DPMS_PROP_ID],
            prop_values: vec![edid_blob, 0],
            encoders: vec![ENCODER_ID_BASE + index as u32],
        })
    }

    fn encoder(&mut self, encoder_id: u32) -> Result<Encoder> {
        let state = self.state.borrow();
        let count = state.config().connectors.len() as u32;
        if !(ENCODER_ID_BASE..ENCODER_ID_BASE + count).contains(&encoder_id) {
            return Err(enoent("DRM_IOCTL_MODE_GETENCODER"));
        }
        let connector_id = CONNECTOR_ID_BASE + (encoder_id - ENCODER_ID_BASE);
        let crtc_id = state
            .crtcs()
            .iter()
            .find(|(_, config)| config.as_ref().map(|c| c.connector_id) == Some(connector_id))
            .map_or(0, |&(id, _)| id);

        Ok(Encoder {
            encoder_id,
            encoder_type: ENCODER_TYPE_TMDS,
            crtc_id,
            possible_crtcs: (1u32 << state.crtcs().len()) - 1,
            possible_clones: 0,
        })
    }

    fn crtc(&mut self, crtc_id: u32) -> Result<Crtc> {
        let state = self.state.borrow();
        let (_, config) = state
            .crtcs()
            .iter()
            .find(|&&(id, _)| id == crtc_id)
            .ok_or_else(|| enoent("DRM_IOCTL_MODE_GETCRTC"))?;

        Ok(Crtc {
            crtc_id,
            buffer_id: config.as_ref().map_or(0, |c| c.fb_id),
            x: 0,
            y: 0,
            mode: config.as_ref().map(|c| c.mode.clone()),
        })
    }

    fn connector_edid(&mut self, connector: &Connector) -> Result<Option<PropertyBlob>> {
        let blob_id = connector
            .props
            .iter()
            .zip(&connector.prop_values)
            .find(|&(&prop, _)| prop == EDID_PROP_ID)
            .map_or(0, |(_, &value)| value as u32);
        if blob_id == 0 {
            return Ok(None);
        }
        let index = self.connector_index(connector.connector_id)?;
        Ok(Some(PropertyBlob {
            id: blob_id,
            data: sim_edid(index),
        }))
    }

    fn create_framebuffer(&mut self, width: u32, height: u32) -> Result<u32> {
        if width == 0 || height == 0 || width > MAX_FB_SIDE || height > MAX_FB_SIDE {
            return Err(einval("DRM_IOCTL_MODE_ADDFB"));
        }
        let mut state = self.state.borrow_mut();
        state.touch("framebuffer");
        Ok(state.add_framebuffer(width, height))
    }

    fn set_crtc(&mut self, crtc_id: u32, config: Option<&CrtcConfig>) -> Result<()> {
        if let Some(config) = config {
            self.connector_index(config.connector_id)?;
        }
        self.state.borrow_mut().set_crtc(crtc_id, config.cloned())
    }
}

/// Mapping of a simulated buffer; GTT accesses wake the device
struct SimMapping {
    data: Rc<RefCell<Vec<u8>>>,
    len: usize,
    kind: MapKind,
    state: Rc<RefCell<SimState>>,
}

impl SimMapping {
    fn access(&self) {
        if self.kind == MapKind::Gtt {
            self.state.borrow_mut().touch("GTT mmap access");
        }
    }
}

impl GemMapping for SimMapping {
    fn len(&self) -> usize {
        self.len
    }

    fn load(&self, offset: usize, dst: &mut [u8]) -> Result<()> {
        check_mapping_range(offset, dst.len(), self.len)?;
        self.access();
        dst.copy_from_slice(&self.data.borrow()[offset..offset + dst.len()]);
        Ok(())
    }

    fn store(&mut self, offset: usize, src: &[u8]) -> Result<()> {
        check_mapping_range(offset, src.len(), self.len)?;
        self.access();
        self.data.borrow_mut()[offset..offset + src.len()].copy_from_slice(src);
        Ok(())
    }

    fn unmap(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

impl GemDevice for SimDevice {
    fn gem_create(&mut self, size: u64) -> Result<GemHandle> {
        if size == 0 {
            return Err(einval("DRM_IOCTL_I915_GEM_CREATE"));
        }
        let mut state = self.state.borrow_mut();
        state.touch("gem_create");
        Ok(state.create_object(size.div_ceil(PAGE_SIZE) * PAGE_SIZE))
    }

    fn gem_close(&mut self, handle: GemHandle) -> Result<()> {
        self.state.borrow_mut().close_object(handle)
    }

    fn gem_write(&mut self, handle: GemHandle, offset: u64, data: &[u8]) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.touch("gem_pwrite");
        let object = state.object(handle)?;
        let mut bytes = object.data.borrow_mut();
        let start = offset as usize;
        let end = start
            .checked_add(data.len())
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| einval("DRM_IOCTL_I915_GEM_PWRITE"))?;
        bytes[start..end].copy_from_slice(data);
        Ok(())
    }

    fn gem_read(&mut self, handle: GemHandle, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.touch("gem_pread");
        let object = state.object(handle)?;
        let bytes = object.data.borrow();
        let start = offset as usize;
        let end = start
            .checked_add(buf.len())
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| einval("DRM_IOCTL_I915_GEM_PREAD"))?;
        buf.copy_from_slice(&bytes[start..end]);
        Ok(())
    }

    fn gem_mmap(
        &mut self,
        handle: GemHandle,
        size: usize,
        kind: MapKind,
    ) -> Result<Box<dyn GemMapping>> {
        let state = self.state.borrow();
        let object = state.object(handle)?;
        if size > object.data.borrow().len() {
            return Err(einval("DRM_IOCTL_I915_GEM_MMAP"));
        }
        Ok(Box::new(SimMapping {
            data: Rc::clone(&object.data),
            len: size,
            kind,
            state: Rc::clone(&self.state),
        }))
    }

    fn execbuf(&mut self, exec: &mut ExecBuffer) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.touch("execbuf");

        let Some(batch_object) = exec.objects.last_mut() else {
            return Err(einval("DRM_IOCTL_I915_GEM_EXECBUFFER2"));
        };
        let batch = state.object(batch_object.handle)?.clone();

        for reloc in &mut batch_object.relocations {
            let target = state.object(reloc.target_handle)?.gtt_offset;
            let address = target + u64::from(reloc.delta);
            let at = reloc.offset as usize;
            let mut bytes = batch.data.borrow_mut();
            if at + 4 > bytes.len() {
                return Err(einval("DRM_IOCTL_I915_GEM_EXECBUFFER2"));
            }
            bytes[at..at + 4].copy_from_slice(&(address as u32).to_ne_bytes());
            reloc.presumed_offset = target;
        }

        let dwords = {
            let bytes = batch.data.borrow();
            let len = (exec.batch_len as usize).min(bytes.len());
            bytes_to_dwords(&bytes[..len])
        };
        blitter::execute(&state, &dwords, exec.ring)?;
        state.count_batch();
        Ok(())
    }

    fn gem_wait(&mut self, handle: GemHandle, _timeout: Duration) -> Result<()> {
        // Simulated submissions complete synchronously
        self.state.borrow().object(handle).map(|_| ())
    }
}

/// Forcewake reference; dropping it without `release` also lets go
struct SimForcewake {
    state: Option<Rc<RefCell<SimState>>>,
}

impl ForcewakeHold for SimForcewake {
    fn release(mut self: Box<Self>) -> Result<()> {
        if let Some(state) = self.state.take() {
            state.borrow_mut().set_forcewake(false);
        }
        Ok(())
    }
}

impl Drop for SimForcewake {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            state.borrow_mut().set_forcewake(false);
        }
    }
}

struct SimRegisters {
    state: Rc<RefCell<SimState>>,
}

impl RegisterReader for SimRegisters {
    fn read32(&self, offset: u32) -> Result<u32> {
        Ok(self.state.borrow_mut().read_register(offset))
    }
}

impl Device for SimDevice {
    fn chipset_id(&mut self) -> Result<u16> {
        Ok(self.state.borrow().config().devid)
    }

    fn open_forcewake(&mut self) -> Result<Option<Box<dyn ForcewakeHold>>> {
        if !self.state.borrow().config().has_forcewake {
            return Ok(None);
        }
        self.state.borrow_mut().set_forcewake(true);
        Ok(Some(Box::new(SimForcewake {
            state: Some(Rc::clone(&self.state)),
        })))
    }

    fn open_registers(&mut self) -> Result<Box<dyn RegisterReader>> {
        Ok(Box::new(SimRegisters {
            state: Rc::clone(&self.state),
        }))
    }
}
