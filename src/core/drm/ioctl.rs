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

//! DRM and i915 uAPI structures and ioctl numbers
//!
//! Layouts follow `include/uapi/drm/drm.h`, `drm_mode.h` and `i915_drm.h`.
//! Only the ioctls the harness issues are defined.

#![allow(non_camel_case_types, non_snake_case)]

use std::mem::size_of;
use std::os::fd::RawFd;

use crate::core::error::{PmError, Result};

const IOC_WRITE: u32 = 1;
const IOC_READ: u32 = 2;

const DRM_IOCTL_BASE: u32 = b'd' as u32;
const DRM_COMMAND_BASE: u32 = 0x40;

const fn IOC(dir: u32, nr: u32, size: usize) -> libc::c_ulong {
    ((dir << 30) | ((size as u32) << 16) | (DRM_IOCTL_BASE << 8) | nr) as libc::c_ulong
}

/// DRM ioctl number with a write-only argument
pub const fn IOW<T>(nr: u32) -> libc::c_ulong {
    IOC(IOC_WRITE, nr, size_of::<T>())
}

/// DRM ioctl number with a read-write argument
pub const fn IOWR<T>(nr: u32) -> libc::c_ulong {
    IOC(IOC_READ | IOC_WRITE, nr, size_of::<T>())
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct drm_gem_close {
    pub handle: u32,
    pub pad: u32,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct drm_mode_card_res {
    pub fb_id_ptr: u64,
    pub crtc_id_ptr: u64,
    pub connector_id_ptr: u64,
    pub encoder_id_ptr: u64,
    pub count_fbs: u32,
    pub count_crtcs: u32,
    pub count_connectors: u32,
    pub count_encoders: u32,
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
}

pub const DRM_DISPLAY_MODE_LEN: usize = 32;

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct drm_mode_modeinfo {
    pub clock: u32,
    pub hdisplay: u16,
    pub hsync_start: u16,
    pub hsync_end: u16,
    pub htotal: u16,
    pub hskew: u16,
    pub vdisplay: u16,
    pub vsync_start: u16,
    pub vsync_end: u16,
    pub vtotal: u16,
    pub vscan: u16,
    pub vrefresh: u32,
    pub flags: u32,
    pub type_: u32,
    pub name: [u8; DRM_DISPLAY_MODE_LEN],
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct drm_mode_crtc {
    pub set_connectors_ptr: u64,
    pub count_connectors: u32,
    pub crtc_id: u32,
    pub fb_id: u32,
    pub x: u32,
    pub y: u32,
    pub gamma_size: u32,
    pub mode_valid: u32,
    pub mode: drm_mode_modeinfo,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct drm_mode_get_encoder {
    pub encoder_id: u32,
    pub encoder_type: u32,
    pub crtc_id: u32,
    pub possible_crtcs: u32,
    pub possible_clones: u32,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct drm_mode_get_connector {
    pub encoders_ptr: u64,
    pub modes_ptr: u64,
    pub props_ptr: u64,
    pub prop_values_ptr: u64,
    pub count_modes: u32,
    pub count_props: u32,
    pub count_encoders: u32,
    pub encoder_id: u32,
    pub connector_id: u32,
    pub connector_type: u32,
    pub connector_type_id: u32,
    pub connection: u32,
    pub mm_width: u32,
    pub mm_height: u32,
    pub subpixel: u32,
    pub pad: u32,
}

pub const DRM_PROP_NAME_LEN: usize = 32;

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct drm_mode_get_property {
    pub values_ptr: u64,
    pub enum_blob_ptr: u64,
    pub prop_id: u32,
    pub flags: u32,
    pub name: [u8; DRM_PROP_NAME_LEN],
    pub count_values: u32,
    pub count_enum_blobs: u32,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct drm_mode_get_blob {
    pub blob_id: u32,
    pub length: u32,
    pub data: u64,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct drm_mode_fb_cmd {
    pub fb_id: u32,
    pub width: u32,
    pub height: u32,
    pub pitch: u32,
    pub bpp: u32,
    pub depth: u32,
    pub handle: u32,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct drm_mode_create_dumb {
    pub height: u32,
    pub width: u32,
    pub bpp: u32,
    pub flags: u32,
    pub handle: u32,
    pub pitch: u32,
    pub size: u64,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct drm_mode_map_dumb {
    pub handle: u32,
    pub pad: u32,
    pub offset: u64,
}

pub const DRM_MODE_OBJECT_CONNECTOR: u32 = 0xc0c0_c0c0;

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct drm_mode_obj_get_properties {
    pub props_ptr: u64,
    pub prop_values_ptr: u64,
    pub count_props: u32,
    pub obj_id: u32,
    pub obj_type: u32,
}

pub const I915_PARAM_CHIPSET_ID: i32 = 4;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct drm_i915_getparam {
    pub param: i32,
    pub value: *mut i32,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct drm_i915_gem_create {
    pub size: u64,
    pub handle: u32,
    pub pad: u32,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct drm_i915_gem_pread {
    pub handle: u32,
    pub pad: u32,
    pub offset: u64,
    pub size: u64,
    pub data_ptr: u64,
}

/// Same layout as pread
pub type drm_i915_gem_pwrite = drm_i915_gem_pread;

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct drm_i915_gem_mmap {
    pub handle: u32,
    pub pad: u32,
    pub offset: u64,
    pub size: u64,
    pub addr_ptr: u64,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct drm_i915_gem_mmap_gtt {
    pub handle: u32,
    pub pad: u32,
    pub offset: u64,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct drm_i915_gem_relocation_entry {
    pub target_handle: u32,
    pub delta: u32,
    pub offset: u64,
    pub presumed_offset: u64,
    pub read_domains: u32,
    pub write_domain: u32,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct drm_i915_gem_exec_object2 {
    pub handle: u32,
    pub relocation_count: u32,
    pub relocs_ptr: u64,
    pub alignment: u64,
    pub offset: u64,
    pub flags: u64,
    pub rsvd1: u64,
    pub rsvd2: u64,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct drm_i915_gem_execbuffer2 {
    pub buffers_ptr: u64,
    pub buffer_count: u32,
    pub batch_start_offset: u32,
    pub batch_len: u32,
    pub DR1: u32,
    pub DR4: u32,
    pub num_cliprects: u32,
    pub cliprects_ptr: u64,
    pub flags: u64,
    pub rsvd1: u64,
    pub rsvd2: u64,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct drm_i915_gem_wait {
    pub bo_handle: u32,
    pub flags: u32,
    pub timeout_ns: i64,
}

pub const DRM_IOCTL_GEM_CLOSE: libc::c_ulong = IOW::<drm_gem_close>(0x09);

pub const DRM_IOCTL_MODE_GETRESOURCES: libc::c_ulong = IOWR::<drm_mode_card_res>(0xA0);
pub const DRM_IOCTL_MODE_GETCRTC: libc::c_ulong = IOWR::<drm_mode_crtc>(0xA1);
pub const DRM_IOCTL_MODE_SETCRTC: libc::c_ulong = IOWR::<drm_mode_crtc>(0xA2);
pub const DRM_IOCTL_MODE_GETENCODER: libc::c_ulong = IOWR::<drm_mode_get_encoder>(0xA6);
pub const DRM_IOCTL_MODE_GETCONNECTOR: libc::c_ulong = IOWR::<drm_mode_get_connector>(0xA7);
pub const DRM_IOCTL_MODE_GETPROPERTY: libc::c_ulong = IOWR::<drm_mode_get_property>(0xAA);
pub const DRM_IOCTL_MODE_GETPROPBLOB: libc::c_ulong = IOWR::<drm_mode_get_blob>(0xAC);
pub const DRM_IOCTL_MODE_ADDFB: libc::c_ulong = IOWR::<drm_mode_fb_cmd>(0xAE);
pub const DRM_IOCTL_MODE_CREATE_DUMB: libc::c_ulong = IOWR::<drm_mode_create_dumb>(0xB2);
pub const DRM_IOCTL_MODE_MAP_DUMB: libc::c_ulong = IOWR::<drm_mode_map_dumb>(0xB3);
pub const DRM_IOCTL_MODE_OBJ_GETPROPERTIES: libc::c_ulong =
    IOWR::<drm_mode_obj_get_properties>(0xB9);

pub const DRM_IOCTL_I915_GETPARAM: libc::c_ulong =
    IOWR::<drm_i915_getparam>(DRM_COMMAND_BASE + 0x06);
pub const DRM_IOCTL_I915_GEM_CREATE: libc::c_ulong =
    IOWR::<drm_i915_gem_create>(DRM_COMMAND_BASE + 0x1b);
pub const DRM_IOCTL_I915_GEM_PREAD: libc::c_ulong =
    IOW::<drm_i915_gem_pread>(DRM_COMMAND_BASE + 0x1c);
pub const DRM_IOCTL_I915_GEM_PWRITE: libc::c_ulong =
    IOW::<drm_i915_gem_pwrite>(DRM_COMMAND_BASE + 0x1d);
pub const DRM_IOCTL_I915_GEM_MMAP: libc::c_ulong =
    IOWR::<drm_i915_gem_mmap>(DRM_COMMAND_BASE + 0x1e);
pub const DRM_IOCTL_I915_GEM_MMAP_GTT: libc::c_ulong =
    IOWR::<drm_i915_gem_mmap_gtt>(DRM_COMMAND_BASE + 0x24);
pub const DRM_IOCTL_I915_GEM_EXECBUFFER2: libc::c_ulong =
    IOW::<drm_i915_gem_execbuffer2>(DRM_COMMAND_BASE + 0x29);
pub const DRM_IOCTL_I915_GEM_WAIT: libc::c_ulong =
    IOWR::<drm_i915_gem_wait>(DRM_COMMAND_BASE + 0x2c);

/// Issue `request` on `fd`, restarting on `EINTR`/`EAGAIN` like `drmIoctl`
///
/// # Safety
///
/// `arg` must be the argument type `request` was built for, and every
/// user pointer inside it must be valid for the kernel to read or write.
pub unsafe fn drm_ioctl<T>(
    fd: RawFd,
    call: &'static str,
    request: libc::c_ulong,
    arg: &mut T,
) -> Result<()> {
    loop {
        // SAFETY: upheld by the caller.
        let rc = unsafe { libc::ioctl(fd, request as _, arg as *mut T) };
        if rc == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINTR) | Some(libc::EAGAIN) => continue,
            _ => return Err(PmError::Driver { call, source: err }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_struct_sizes_match_uapi() {
        assert_eq!(size_of::<drm_mode_modeinfo>(), 68);
        assert_eq!(size_of::<drm_mode_crtc>(), 104);
        assert_eq!(size_of::<drm_mode_get_connector>(), 80);
        assert_eq!(size_of::<drm_mode_obj_get_properties>(), 32);
        assert_eq!(size_of::<drm_i915_gem_exec_object2>(), 56);
        assert_eq!(size_of::<drm_i915_gem_execbuffer2>(), 64);
        assert_eq!(size_of::<drm_i915_gem_relocation_entry>(), 32);
    }

    #[test]
    fn test_known_ioctl_numbers() {
        assert_eq!(DRM_IOCTL_MODE_GETRESOURCES, 0xC040_64A0);
        assert_eq!(DRM_IOCTL_GEM_CLOSE, 0x4008_6409);
        assert_eq!(DRM_IOCTL_I915_GEM_EXECBUFFER2, 0x4040_6469);
        assert_eq!(DRM_IOCTL_I915_GEM_MMAP_GTT, 0xC010_6464);
    }
}
