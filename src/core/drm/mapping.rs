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

//! Process mappings of GEM objects

use std::ptr::NonNull;

use memmap2::MmapMut;

use crate::core::error::{PmError, Result};
use crate::core::gem::{check_mapping_range, GemMapping};

/// Mapping returned by `GEM_MMAP`; the kernel creates it, we unmap it
pub struct CpuMapping {
    ptr: NonNull<u8>,
    len: usize,
    mapped: bool,
}

impl CpuMapping {
    /// # Safety
    ///
    /// `addr` must be the start of a live `len`-byte mapping owned by nobody
    /// else.
    pub unsafe fn from_raw(addr: u64, len: usize) -> Result<Self> {
        let ptr = NonNull::new(addr as *mut u8)
            .ok_or_else(|| PmError::ProtocolViolation("GEM_MMAP returned NULL".to_string()))?;
        Ok(Self {
            ptr,
            len,
            mapped: true,
        })
    }

    fn base(&self, offset: usize, len: usize) -> Result<*mut u8> {
        check_mapping_range(offset, len, self.len)?;
        // SAFETY: the range lies inside the mapping, which stays live until
        // munmap.
        Ok(unsafe { self.ptr.as_ptr().add(offset) })
    }

    fn munmap(&mut self) -> Result<()> {
        if self.mapped {
            self.mapped = false;
            // SAFETY: ptr/len describe the mapping handed to from_raw.
            let rc = unsafe { libc::munmap(self.ptr.as_ptr().cast(), self.len) };
            if rc != 0 {
                return Err(PmError::driver("munmap"));
            }
        }
        Ok(())
    }
}

impl GemMapping for CpuMapping {
    fn len(&self) -> usize {
        self.len
    }

    fn load(&self, offset: usize, dst: &mut [u8]) -> Result<()> {
        let src = self.base(offset, dst.len())?;
        // SAFETY: base() checked the range; dst is a distinct allocation.
        unsafe { std::ptr::copy_nonoverlapping(src, dst.as_mut_ptr(), dst.len()) };
        Ok(())
    }

    fn store(&mut self, offset: usize, src: &[u8]) -> Result<()> {
        let dst = self.base(offset, src.len())?;
        // SAFETY: as in load.
        unsafe { std::ptr::copy_nonoverlapping(src.as_ptr(), dst, src.len()) };
        Ok(())
    }

    fn unmap(mut self: Box<Self>) -> Result<()> {
        self.munmap()
    }
}

impl Drop for CpuMapping {
    fn drop(&mut self) {
        if let Err(e) = self.munmap() {
            log::warn!("dropping CPU mapping: {e}");
        }
    }
}

/// Mapping of the fake offset returned by `GEM_MMAP_GTT`
///
/// The offset is page aligned, so the memmap2 pointer and length are exactly
/// what mmap returned.
pub struct GttMapping {
    map: MmapMut,
}

impl GttMapping {
    pub fn new(map: MmapMut) -> Self {
        Self { map }
    }
}

impl GemMapping for GttMapping {
    fn len(&self) -> usize {
        self.map.len()
    }

    fn load(&self, offset: usize, dst: &mut [u8]) -> Result<()> {
        check_mapping_range(offset, dst.len(), self.map.len())?;
        dst.copy_from_slice(&self.map[offset..offset + dst.len()]);
        Ok(())
    }

    fn store(&mut self, offset: usize, src: &[u8]) -> Result<()> {
        check_mapping_range(offset, src.len(), self.map.len())?;
        self.map[offset..offset + src.len()].copy_from_slice(src);
        Ok(())
    }

    fn unmap(self: Box<Self>) -> Result<()> {
        let GttMapping { mut map } = *self;
        let addr = map.as_mut_ptr();
        let len = map.len();
        // Replaces memmap2's unchecked unmap on drop
        std::mem::forget(map);
        // SAFETY: addr/len are the whole mapping and nothing else owns it.
        let rc = unsafe { libc::munmap(addr.cast(), len) };
        if rc != 0 {
            return Err(PmError::driver("munmap"));
        }
        Ok(())
    }
}
