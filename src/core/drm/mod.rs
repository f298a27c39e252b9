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

//! Hardware backend
//!
//! Talks to a real i915 device: DRM ioctls on the card node, the runtime PM
//! files in sysfs, `/dev/cpu/0/msr` and the `/dev/i2c-*` buses. Framebuffers
//! are dumb buffers, cached per size so repeated mode sets don't leak one per
//! call.

pub mod ioctl;
mod mapping;

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::{AsRawFd, IntoRawFd, RawFd};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use memmap2::MmapOptions;

use self::ioctl::*;
use self::mapping::{CpuMapping, GttMapping};
use super::config::HarnessConfig;
use super::device::{Backend, Device, ForcewakeHold};
use super::error::{PmError, Result};
use super::gem::{ExecBuffer, GemDevice, GemHandle, GemMapping, MapKind};
use super::kms::{
    Connection, Connector, Crtc, CrtcConfig, DevI2c, Encoder, I2cProbe, KmsDevice, ModeInfo,
    PropertyBlob, Resources,
};
use super::registers::{MmioRegisters, RegisterReader};
use super::residency::CounterFile;
use super::runtime_pm::{PowerControl, SysfsPowerDir};
use super::timing::{Clock, SystemClock};

const FORCEWAKE_FILE: &str = "i915_forcewake_user";
const EDID_PROPERTY: &str = "EDID";
const FB_BPP: u32 = 32;
const FB_DEPTH: u32 = 24;

fn ptr_of<T>(v: &mut [T]) -> u64 {
    v.as_mut_ptr() as u64
}

fn c_name(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

fn mode_from_raw(raw: &drm_mode_modeinfo) -> ModeInfo {
    ModeInfo {
        clock: raw.clock,
        hdisplay: raw.hdisplay,
        hsync_start: raw.hsync_start,
        hsync_end: raw.hsync_end,
        htotal: raw.htotal,
        hskew: raw.hskew,
        vdisplay: raw.vdisplay,
        vsync_start: raw.vsync_start,
        vsync_end: raw.vsync_end,
        vtotal: raw.vtotal,
        vscan: raw.vscan,
        vrefresh: raw.vrefresh,
        flags: raw.flags,
        mode_type: raw.type_,
        name: c_name(&raw.name),
    }
}

fn mode_to_raw(mode: &ModeInfo) -> drm_mode_modeinfo {
    let mut name = [0u8; DRM_DISPLAY_MODE_LEN];
    let bytes = mode.name.as_bytes();
    let n = bytes.len().min(DRM_DISPLAY_MODE_LEN - 1);
    name[..n].copy_from_slice(&bytes[..n]);

    drm_mode_modeinfo {
        clock: mode.clock,
        hdisplay: mode.hdisplay,
        hsync_start: mode.hsync_start,
        hsync_end: mode.hsync_end,
        htotal: mode.htotal,
        hskew: mode.hskew,
        vdisplay: mode.vdisplay,
        vsync_start: mode.vsync_start,
        vsync_end: mode.vsync_end,
        vtotal: mode.vtotal,
        vscan: mode.vscan,
        vrefresh: mode.vrefresh,
        flags: mode.flags,
        type_: mode.mode_type,
        name,
    }
}

/// XOR gradient, so a scanned-out buffer is visibly not garbage
fn paint_pattern(pixels: &mut [u8], width: u32, height: u32, pitch: u32) {
    for y in 0..height as usize {
        let row = &mut pixels[y * pitch as usize..][..width as usize * 4];
        for (x, px) in row.chunks_exact_mut(4).enumerate() {
            let v = ((x ^ y) & 0xFF) as u32;
            px.copy_from_slice(&(v * 0x0001_0101).to_ne_bytes());
        }
    }
}

/// An open `/dev/dri/cardN` node
pub struct DrmDevice {
    file: File,
    debugfs_dir: PathBuf,
    mmio_resource: PathBuf,
    /// Framebuffer id per (width, height)
    framebuffers: HashMap<(u32, u32), u32>,
}

impl DrmDevice {
    pub fn open(config: &HarnessConfig) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&config.drm_device)
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => PmError::UnsupportedPlatform(format!(
                    "no DRM device at {}",
                    config.drm_device.display()
                )),
                _ => PmError::Io(e),
            })?;

        log::debug!("opened {}", config.drm_device.display());

        Ok(Self {
            file,
            debugfs_dir: config.debugfs_dir.clone(),
            mmio_resource: config.mmio_resource.clone(),
            framebuffers: HashMap::new(),
        })
    }

    fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    fn property_name(&self, prop_id: u32) -> Result<String> {
        let mut prop = drm_mode_get_property {
            prop_id,
            ..Default::default()
        };
        // SAFETY: counts are zero, so the kernel writes no arrays.
        unsafe {
            drm_ioctl(
                self.fd(),
                "DRM_IOCTL_MODE_GETPROPERTY",
                DRM_IOCTL_MODE_GETPROPERTY,
                &mut prop,
            )?
        };
        Ok(c_name(&prop.name))
    }

    fn property_blob(&self, blob_id: u32) -> Result<PropertyBlob> {
        let mut blob = drm_mode_get_blob {
            blob_id,
            ..Default::default()
        };
        // SAFETY: length zero, the kernel only reports the size.
        unsafe {
            drm_ioctl(
                self.fd(),
                "DRM_IOCTL_MODE_GETPROPBLOB",
                DRM_IOCTL_MODE_GETPROPBLOB,
                &mut blob,
            )?
        };

        let mut data = vec![0u8; blob.length as usize];
        blob.data = ptr_of(&mut data);
        // SAFETY: data holds `length` bytes.
        unsafe {
            drm_ioctl(
                self.fd(),
                "DRM_IOCTL_MODE_GETPROPBLOB",
                DRM_IOCTL_MODE_GETPROPBLOB,
                &mut blob,
            )?
        };
        data.truncate(blob.length as usize);
        Ok(PropertyBlob { id: blob_id, data })
    }

    fn connector_properties(&self, connector_id: u32) -> Result<(Vec<u32>, Vec<u64>)> {
        loop {
            let mut req = drm_mode_obj_get_properties {
                obj_id: connector_id,
                obj_type: DRM_MODE_OBJECT_CONNECTOR,
                ..Default::default()
            };
            // SAFETY: count zero, no arrays written.
            unsafe {
                drm_ioctl(
                    self.fd(),
                    "DRM_IOCTL_MODE_OBJ_GETPROPERTIES",
                    DRM_IOCTL_MODE_OBJ_GETPROPERTIES,
                    &mut req,
                )?
            };

            let count = req.count_props as usize;
            let mut props = vec![0u32; count];
            let mut values = vec![0u64; count];
            req.props_ptr = ptr_of(&mut props);
            req.prop_values_ptr = ptr_of(&mut values);
            // SAFETY: both arrays hold `count_props` entries.
            unsafe {
                drm_ioctl(
                    self.fd(),
                    "DRM_IOCTL_MODE_OBJ_GETPROPERTIES",
                    DRM_IOCTL_MODE_OBJ_GETPROPERTIES,
                    &mut req,
                )?
            };

            // A hotplug between the two calls can add properties
            if req.count_props as usize <= count {
                props.truncate(req.count_props as usize);
                values.truncate(req.count_props as usize);
                return Ok((props, values));
            }
        }
    }

    fn create_dumb_framebuffer(&self, width: u32, height: u32) -> Result<u32> {
        let mut create = drm_mode_create_dumb {
            width,
            height,
            bpp: FB_BPP,
            ..Default::default()
        };
        // SAFETY: plain in/out struct.
        unsafe {
            drm_ioctl(
                self.fd(),
                "DRM_IOCTL_MODE_CREATE_DUMB",
                DRM_IOCTL_MODE_CREATE_DUMB,
                &mut create,
            )?
        };

        let mut map = drm_mode_map_dumb {
            handle: create.handle,
            ..Default::default()
        };
        // SAFETY: plain in/out struct.
        unsafe {
            drm_ioctl(
                self.fd(),
                "DRM_IOCTL_MODE_MAP_DUMB",
                DRM_IOCTL_MODE_MAP_DUMB,
                &mut map,
            )?
        };

        // SAFETY: the fake offset maps the dumb buffer's own pages, which
        // nothing else in the process aliases.
        let mut pixels = unsafe {
            MmapOptions::new()
                .offset(map.offset)
                .len(create.size as usize)
                .map_mut(&self.file)?
        };
        paint_pattern(&mut pixels, width, height, create.pitch);
        drop(pixels);

        let mut fb = drm_mode_fb_cmd {
            width,
            height,
            pitch: create.pitch,
            bpp: FB_BPP,
            depth: FB_DEPTH,
            handle: create.handle,
            ..Default::default()
        };
        // SAFETY: plain in/out struct.
        unsafe {
            drm_ioctl(
                self.fd(),
                "DRM_IOCTL_MODE_ADDFB",
                DRM_IOCTL_MODE_ADDFB,
                &mut fb,
            )?
        };

        log::debug!("framebuffer {} ({width}x{height}, pitch {})", fb.fb_id, create.pitch);
        Ok(fb.fb_id)
    }
}

impl KmsDevice for DrmDevice {
    fn resources(&mut self) -> Result<Resources> {
        loop {
            let mut res = drm_mode_card_res::default();
            // SAFETY: counts are zero, no arrays written.
            unsafe {
                drm_ioctl(
                    self.fd(),
                    "DRM_IOCTL_MODE_GETRESOURCES",
                    DRM_IOCTL_MODE_GETRESOURCES,
                    &mut res,
                )?
            };

            let counts = [
                res.count_fbs,
                res.count_crtcs,
                res.count_connectors,
                res.count_encoders,
            ];
            let mut fbs = vec![0u32; counts[0] as usize];
            let mut crtcs = vec![0u32; counts[1] as usize];
            let mut connectors = vec![0u32; counts[2] as usize];
            let mut encoders = vec![0u32; counts[3] as usize];
            res.fb_id_ptr = ptr_of(&mut fbs);
            res.crtc_id_ptr = ptr_of(&mut crtcs);
            res.connector_id_ptr = ptr_of(&mut connectors);
            res.encoder_id_ptr = ptr_of(&mut encoders);

            // SAFETY: every array holds the count the kernel reported.
            unsafe {
                drm_ioctl(
                    self.fd(),
                    "DRM_IOCTL_MODE_GETRESOURCES",
                    DRM_IOCTL_MODE_GETRESOURCES,
                    &mut res,
                )?
            };

            let grew = res.count_fbs > counts[0]
                || res.count_crtcs > counts[1]
                || res.count_connectors > counts[2]
                || res.count_encoders > counts[3];
            if grew {
                continue;
            }

            fbs.truncate(res.count_fbs as usize);
            crtcs.truncate(res.count_crtcs as usize);
            connectors.truncate(res.count_connectors as usize);
            encoders.truncate(res.count_encoders as usize);

            return Ok(Resources {
                fbs,
                crtcs,
                connectors,
                encoders,
                min_width: res.min_width,
                max_width: res.max_width,
                min_height: res.min_height,
                max_height: res.max_height,
            });
        }
    }

    fn connector(&mut self, connector_id: u32) -> Result<Connector> {
        loop {
            let mut conn = drm_mode_get_connector {
                connector_id,
                ..Default::default()
            };
            // SAFETY: counts are zero, no arrays written. This call probes
            // the connector.
            unsafe {
                drm_ioctl(
                    self.fd(),
                    "DRM_IOCTL_MODE_GETCONNECTOR",
                    DRM_IOCTL_MODE_GETCONNECTOR,
                    &mut conn,
                )?
            };

            let (n_modes, n_props, n_encoders) =
                (conn.count_modes, conn.count_props, conn.count_encoders);
            let mut modes = vec![drm_mode_modeinfo::default(); n_modes as usize];
            let mut props = vec![0u32; n_props as usize];
            let mut prop_values = vec![0u64; n_props as usize];
            let mut encoders = vec![0u32; n_encoders as usize];
            conn.modes_ptr = ptr_of(&mut modes);
            conn.props_ptr = ptr_of(&mut props);
            conn.prop_values_ptr = ptr_of(&mut prop_values);
            conn.encoders_ptr = ptr_of(&mut encoders);

            // SAFETY: every array holds the count the kernel reported.
            unsafe {
                drm_ioctl(
                    self.fd(),
                    "DRM_IOCTL_MODE_GETCONNECTOR",
                    DRM_IOCTL_MODE_GETCONNECTOR,
                    &mut conn,
                )?
            };

            if conn.count_modes > n_modes
                || conn.count_props > n_props
                || conn.count_encoders > n_encoders
            {
                continue;
            }

            modes.truncate(conn.count_modes as usize);
            props.truncate(conn.count_props as usize);
            prop_values.truncate(conn.count_props as usize);
            encoders.truncate(conn.count_encoders as usize);

            return Ok(Connector {
                connector_id: conn.connector_id,
                connector_type: conn.connector_type,
                connector_type_id: conn.connector_type_id,
                connection: Connection::from_raw(conn.connection),
                mm_width: conn.mm_width,
                mm_height: conn.mm_height,
                modes: modes.iter().map(mode_from_raw).collect(),
                props,
                prop_values,
                encoders,
            });
        }
    }

    fn encoder(&mut self, encoder_id: u32) -> Result<Encoder> {
        let mut enc = drm_mode_get_encoder {
            encoder_id,
            ..Default::default()
        };
        // SAFETY: plain in/out struct.
        unsafe {
            drm_ioctl(
                self.fd(),
                "DRM_IOCTL_MODE_GETENCODER",
                DRM_IOCTL_MODE_GETENCODER,
                &mut enc,
            )?
        };
        Ok(Encoder {
            encoder_id: enc.encoder_id,
            encoder_type: enc.encoder_type,
            crtc_id: enc.crtc_id,
            possible_crtcs: enc.possible_crtcs,
            possible_clones: enc.possible_clones,
        })
    }

    fn crtc(&mut self, crtc_id: u32) -> Result<Crtc> {
        let mut crtc = drm_mode_crtc {
            crtc_id,
            ..Default::default()
        };
        // SAFETY: count_connectors is zero, no array read.
        unsafe {
            drm_ioctl(
                self.fd(),
                "DRM_IOCTL_MODE_GETCRTC",
                DRM_IOCTL_MODE_GETCRTC,
                &mut crtc,
            )?
        };
        Ok(Crtc {
            crtc_id: crtc.crtc_id,
            buffer_id: crtc.fb_id,
            x: crtc.x,
            y: crtc.y,
            mode: (crtc.mode_valid != 0).then(|| mode_from_raw(&crtc.mode)),
        })
    }

    fn connector_edid(&mut self, connector: &Connector) -> Result<Option<PropertyBlob>> {
        let (props, values) = self.connector_properties(connector.connector_id)?;
        for (&prop_id, &value) in props.iter().zip(&values) {
            if self.property_name(prop_id)? != EDID_PROPERTY {
                continue;
            }
            let blob_id = value as u32;
            if blob_id == 0 {
                return Ok(None);
            }
            return self.property_blob(blob_id).map(Some);
        }
        Ok(None)
    }

    fn create_framebuffer(&mut self, width: u32, height: u32) -> Result<u32> {
        if let Some(&fb_id) = self.framebuffers.get(&(width, height)) {
            return Ok(fb_id);
        }
        let fb_id = self.create_dumb_framebuffer(width, height)?;
        self.framebuffers.insert((width, height), fb_id);
        Ok(fb_id)
    }

    fn set_crtc(&mut self, crtc_id: u32, config: Option<&CrtcConfig>) -> Result<()> {
        let mut connector_id = 0u32;
        let mut crtc = drm_mode_crtc {
            crtc_id,
            ..Default::default()
        };
        if let Some(config) = config {
            connector_id = config.connector_id;
            crtc.fb_id = config.fb_id;
            crtc.set_connectors_ptr = &mut connector_id as *mut u32 as u64;
            crtc.count_connectors = 1;
            crtc.mode_valid = 1;
            crtc.mode = mode_to_raw(&config.mode);
        }
        // SAFETY: set_connectors_ptr, when set, points at one live u32.
        unsafe {
            drm_ioctl(
                self.fd(),
                "DRM_IOCTL_MODE_SETCRTC",
                DRM_IOCTL_MODE_SETCRTC,
                &mut crtc,
            )
        }
    }
}

impl GemDevice for DrmDevice {
    fn gem_create(&mut self, size: u64) -> Result<GemHandle> {
        let mut create = drm_i915_gem_create {
            size,
            ..Default::default()
        };
        // SAFETY: plain in/out struct.
        unsafe {
            drm_ioctl(
                self.fd(),
                "DRM_IOCTL_I915_GEM_CREATE",
                DRM_IOCTL_I915_GEM_CREATE,
                &mut create,
            )?
        };
        Ok(create.handle)
    }

    fn gem_close(&mut self, handle: GemHandle) -> Result<()> {
        let mut close = drm_gem_close { handle, pad: 0 };
        // SAFETY: plain input struct.
        unsafe {
            drm_ioctl(
                self.fd(),
                "DRM_IOCTL_GEM_CLOSE",
                DRM_IOCTL_GEM_CLOSE,
                &mut close,
            )
        }
    }

    fn gem_write(&mut self, handle: GemHandle, offset: u64, data: &[u8]) -> Result<()> {
        let mut pwrite = drm_i915_gem_pwrite {
            handle,
            pad: 0,
            offset,
            size: data.len() as u64,
            data_ptr: data.as_ptr() as u64,
        };
        // SAFETY: the kernel reads `size` bytes from data.
        unsafe {
            drm_ioctl(
                self.fd(),
                "DRM_IOCTL_I915_GEM_PWRITE",
                DRM_IOCTL_I915_GEM_PWRITE,
                &mut pwrite,
            )
        }
    }

    fn gem_read(&mut self, handle: GemHandle, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut pread = drm_i915_gem_pread {
            handle,
            pad: 0,
            offset,
            size: buf.len() as u64,
            data_ptr: ptr_of(buf),
        };
        // SAFETY: the kernel writes at most `size` bytes into buf.
        unsafe {
            drm_ioctl(
                self.fd(),
                "DRM_IOCTL_I915_GEM_PREAD",
                DRM_IOCTL_I915_GEM_PREAD,
                &mut pread,
            )
        }
    }

    fn gem_mmap(
        &mut self,
        handle: GemHandle,
        size: usize,
        kind: MapKind,
    ) -> Result<Box<dyn GemMapping>> {
        match kind {
            MapKind::Cpu => {
                let mut mmap = drm_i915_gem_mmap {
                    handle,
                    size: size as u64,
                    ..Default::default()
                };
                // SAFETY: plain in/out struct.
                unsafe {
                    drm_ioctl(
                        self.fd(),
                        "DRM_IOCTL_I915_GEM_MMAP",
                        DRM_IOCTL_I915_GEM_MMAP,
                        &mut mmap,
                    )?
                };
                // SAFETY: the kernel just created this mapping for us.
                let mapping = unsafe { CpuMapping::from_raw(mmap.addr_ptr, size)? };
                Ok(Box::new(mapping))
            }
            MapKind::Gtt => {
                let mut mmap = drm_i915_gem_mmap_gtt {
                    handle,
                    ..Default::default()
                };
                // SAFETY: plain in/out struct.
                unsafe {
                    drm_ioctl(
                        self.fd(),
                        "DRM_IOCTL_I915_GEM_MMAP_GTT",
                        DRM_IOCTL_I915_GEM_MMAP_GTT,
                        &mut mmap,
                    )?
                };
                // SAFETY: the fake offset maps this object only; the harness
                // accesses it solely through the returned mapping.
                let map = unsafe {
                    MmapOptions::new()
                        .offset(mmap.offset)
                        .len(size)
                        .map_mut(&self.file)?
                };
                Ok(Box::new(GttMapping::new(map)))
            }
        }
    }

    fn execbuf(&mut self, exec: &mut ExecBuffer) -> Result<()> {
        let mut relocs: Vec<Vec<drm_i915_gem_relocation_entry>> = exec
            .objects
            .iter()
            .map(|object| {
                object
                    .relocations
                    .iter()
                    .map(|r| drm_i915_gem_relocation_entry {
                        target_handle: r.target_handle,
                        delta: r.delta,
                        offset: r.offset,
                        presumed_offset: r.presumed_offset,
                        read_domains: r.read_domains.bits(),
                        write_domain: r.write_domain.bits(),
                    })
                    .collect()
            })
            .collect();

        let mut objects: Vec<drm_i915_gem_exec_object2> = exec
            .objects
            .iter()
            .zip(relocs.iter_mut())
            .map(|(object, entries)| drm_i915_gem_exec_object2 {
                handle: object.handle,
                relocation_count: entries.len() as u32,
                relocs_ptr: ptr_of(entries),
                alignment: object.alignment,
                ..Default::default()
            })
            .collect();

        let mut execbuf = drm_i915_gem_execbuffer2 {
            buffers_ptr: ptr_of(&mut objects),
            buffer_count: objects.len() as u32,
            batch_len: exec.batch_len,
            flags: exec.ring.exec_flag(),
            ..Default::default()
        };
        // SAFETY: objects and every relocation list outlive the call and
        // their counts match.
        unsafe {
            drm_ioctl(
                self.fd(),
                "DRM_IOCTL_I915_GEM_EXECBUFFER2",
                DRM_IOCTL_I915_GEM_EXECBUFFER2,
                &mut execbuf,
            )?
        };

        // The kernel reports final placements in the object list
        let placed: HashMap<u32, u64> = objects.iter().map(|o| (o.handle, o.offset)).collect();
        for (object, entries) in exec.objects.iter_mut().zip(&relocs) {
            for (reloc, entry) in object.relocations.iter_mut().zip(entries) {
                reloc.presumed_offset = placed
                    .get(&reloc.target_handle)
                    .copied()
                    .unwrap_or(entry.presumed_offset);
            }
        }
        Ok(())
    }

    fn gem_wait(&mut self, handle: GemHandle, timeout: Duration) -> Result<()> {
        let mut wait = drm_i915_gem_wait {
            bo_handle: handle,
            flags: 0,
            timeout_ns: i64::try_from(timeout.as_nanos()).unwrap_or(i64::MAX),
        };
        // SAFETY: plain in/out struct.
        let result = unsafe {
            drm_ioctl(
                self.fd(),
                "DRM_IOCTL_I915_GEM_WAIT",
                DRM_IOCTL_I915_GEM_WAIT,
                &mut wait,
            )
        };
        match result {
            Err(PmError::Driver { source, .. }) if source.raw_os_error() == Some(libc::ETIME) => {
                Err(PmError::Timeout {
                    state: "GPU idle",
                    context: format!("bo {handle}"),
                })
            }
            other => other,
        }
    }
}

/// The debugfs forcewake file held open
struct DrmForcewake {
    file: File,
}

impl ForcewakeHold for DrmForcewake {
    fn release(self: Box<Self>) -> Result<()> {
        let fd = self.file.into_raw_fd();
        // SAFETY: fd was just released from its File, so this is the only
        // close.
        if unsafe { libc::close(fd) } != 0 {
            return Err(PmError::driver("close(i915_forcewake_user)"));
        }
        Ok(())
    }
}

impl Device for DrmDevice {
    fn chipset_id(&mut self) -> Result<u16> {
        let mut value: i32 = 0;
        let mut param = drm_i915_getparam {
            param: I915_PARAM_CHIPSET_ID,
            value: &mut value,
        };
        // SAFETY: value outlives the call.
        unsafe {
            drm_ioctl(
                self.fd(),
                "DRM_IOCTL_I915_GETPARAM",
                DRM_IOCTL_I915_GETPARAM,
                &mut param,
            )?
        };
        Ok(value as u16)
    }

    fn open_forcewake(&mut self) -> Result<Option<Box<dyn ForcewakeHold>>> {
        let path = self.debugfs_dir.join(FORCEWAKE_FILE);
        match File::open(&path) {
            Ok(file) => Ok(Some(Box::new(DrmForcewake { file }))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PmError::Io(e)),
        }
    }

    fn open_registers(&mut self) -> Result<Box<dyn RegisterReader>> {
        Ok(Box::new(MmioRegisters::open(&self.mmio_resource)?))
    }
}

/// Backend over the real machine
pub struct HardwareBackend {
    config: HarnessConfig,
    clock: Rc<SystemClock>,
}

impl HardwareBackend {
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            clock: Rc::new(SystemClock::new()),
        }
    }
}

impl Backend for HardwareBackend {
    fn clock(&self) -> Rc<dyn Clock> {
        self.clock.clone()
    }

    fn open_device(&mut self) -> Result<Box<dyn Device>> {
        Ok(Box::new(DrmDevice::open(&self.config)?))
    }

    fn power_control(&mut self) -> Result<Box<dyn PowerControl>> {
        Ok(Box::new(SysfsPowerDir::new(&self.config.power_dir)))
    }

    fn open_msr(&mut self) -> Result<Box<dyn CounterFile>> {
        Ok(Box::new(File::open(&self.config.msr_device)?))
    }

    fn i2c(&mut self) -> Box<dyn I2cProbe> {
        Box::new(DevI2c::new(&self.config.i2c_dev_dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_conversion_keeps_name() {
        let mode = ModeInfo {
            hdisplay: 1920,
            vdisplay: 1080,
            vrefresh: 60,
            name: "1920x1080".to_string(),
            ..Default::default()
        };
        assert_eq!(mode_from_raw(&mode_to_raw(&mode)), mode);
    }

    #[test]
    fn test_pattern_respects_pitch() {
        let mut pixels = vec![0xAAu8; 16 * 2];
        paint_pattern(&mut pixels, 2, 2, 16);
        assert_eq!(&pixels[0..4], &[0, 0, 0, 0]);
        assert_eq!(&pixels[4..8], &0x0001_0101u32.to_ne_bytes());
        // Padding past the visible width is left alone
        assert_eq!(&pixels[8..16], &[0xAA; 8]);
        assert_eq!(&pixels[20..24], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_missing_card_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let config = HarnessConfig {
            drm_device: dir.path().join("card0"),
            ..Default::default()
        };
        let err = DrmDevice::open(&config).err().unwrap();
        assert!(err.is_skip());
    }
}
