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

//! GEM buffer objects and command submission
//!
//! The subset of the i915 GEM uAPI the harness needs: create/close, CPU and
//! GTT mappings, pread/pwrite, execbuffer2 with relocations, and waiting for
//! a buffer to go idle.
//!
//! A [`GemMapping`] is owned separately from the handle it maps. Unmapping
//! and closing are both explicit; dropping a mapping unmaps it silently.

pub mod batch;


use std::time::Duration;

use bitflags::bitflags;

use super::error::{PmError, Result};

pub use batch::{BatchBuffer, BltFill, BPP};

/// Opaque GEM object handle
pub type GemHandle = u32;

bitflags! {
    /// `I915_GEM_DOMAIN_*` cache domains
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GemDomain: u32 {
        const CPU = 0x0000_0001;
        const RENDER = 0x0000_0002;
        const SAMPLER = 0x0000_0004;
        const COMMAND = 0x0000_0008;
        const INSTRUCTION = 0x0000_0010;
        const VERTEX = 0x0000_0020;
        const GTT = 0x0000_0040;
    }
}

/// How a buffer is mapped into the process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapKind {
    /// Cacheable CPU mapping of the backing pages (`GEM_MMAP`)
    Cpu,
    /// Write-combined mapping through the GTT aperture (`GEM_MMAP_GTT`)
    Gtt,
}

impl MapKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MapKind::Cpu => "cpu",
            MapKind::Gtt => "gtt",
        }
    }
}

/// Range check shared by the [`GemMapping`] implementations
pub fn check_mapping_range(offset: usize, len: usize, mapping_len: usize) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= mapping_len => Ok(()),
        _ => Err(PmError::ProtocolViolation(format!(
            "access {offset}+{len} outside a {mapping_len}-byte mapping"
        ))),
    }
}

/// A buffer mapped into the process address space
pub trait GemMapping {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy `dst.len()` bytes starting at `offset` out of the mapping
    fn load(&self, offset: usize, dst: &mut [u8]) -> Result<()>;

    /// Copy `src` into the mapping at `offset`
    fn store(&mut self, offset: usize, src: &[u8]) -> Result<()>;

    /// Release the mapping, reporting failure
    fn unmap(self: Box<Self>) -> Result<()>;
}

/// Engine a batch executes on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ring {
    /// `I915_EXEC_RENDER`
    Render,
    /// `I915_EXEC_BLT`
    Blt,
}

impl Ring {
    pub fn exec_flag(self) -> u64 {
        match self {
            Ring::Render => 1,
            Ring::Blt => 3,
        }
    }
}

/// Relocation patching a buffer address into a batch (`drm_i915_gem_relocation_entry`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocation {
    pub target_handle: GemHandle,
    pub delta: u32,
    /// Byte offset in the batch of the dword to patch
    pub offset: u64,
    pub presumed_offset: u64,
    pub read_domains: GemDomain,
    pub write_domain: GemDomain,
}

/// One buffer in an execbuffer list (`drm_i915_gem_exec_object2`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecObject {
    pub handle: GemHandle,
    pub alignment: u64,
    pub relocations: Vec<Relocation>,
}

impl ExecObject {
    pub fn new(handle: GemHandle) -> Self {
        Self {
            handle,
            alignment: 0,
            relocations: Vec::new(),
        }
    }
}

/// A submission; the batch is the last object, as execbuffer2 requires
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecBuffer {
    pub objects: Vec<ExecObject>,
    pub batch_len: u32,
    pub ring: Ring,
}

/// GEM operations used by the harness
pub trait GemDevice {
    fn gem_create(&mut self, size: u64) -> Result<GemHandle>;

    fn gem_close(&mut self, handle: GemHandle) -> Result<()>;

    fn gem_write(&mut self, handle: GemHandle, offset: u64, data: &[u8]) -> Result<()>;

    fn gem_read(&mut self, handle: GemHandle, offset: u64, buf: &mut [u8]) -> Result<()>;

    fn gem_mmap(&mut self, handle: GemHandle, size: usize, kind: MapKind)
        -> Result<Box<dyn GemMapping>>;

    /// Submit `exec`
    ///
    /// On return every relocation's `presumed_offset` holds the address the
    /// kernel actually used, so the next submission can skip relocating.
    fn execbuf(&mut self, exec: &mut ExecBuffer) -> Result<()>;

    /// Wait for all rendering to `handle` to finish
    fn gem_wait(&mut self, handle: GemHandle, timeout: Duration) -> Result<()>;
}
