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

//! GEM workloads across suspend
//!
//! Each workload touches buffer objects on both sides of a transition and
//! checks every byte. Touching a buffer wakes the device up; the driver is
//! expected to let it suspend again by itself, which is what the
//! `confirm_suspended` calls between steps check.

use std::time::Duration;

use super::error::{PmError, Result};
use super::gem::batch::{BatchBuffer, BltFill};
use super::gem::{
    ExecBuffer, ExecObject, GemDomain, GemHandle, GemMapping, MapKind, Relocation, Ring, BPP,
};
use super::harness::Harness;
use super::kms::ScreenType;

/// Size of the buffers used by the mmap and pread workloads
pub const PATTERN_BUF_SIZE: usize = 8192;

/// Side of the square blit destination, in pixels
pub const BLT_DST_SIDE: u32 = 128;

/// Budget for each `gem_wait` after a submission
pub const GEM_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Submissions made by the execbuf stress workload
pub const EXECBUF_STRESS_ROUNDS: usize = 50;

/// The rectangle painted by the execbuf workload
pub const BLT_RECT: BltFill = BltFill {
    x: 5,
    y: 10,
    width: 15,
    height: 20,
    pitch: BLT_DST_SIDE * BPP,
    color: 0x1234_5678,
};

/// Colour of the second blit, submitted while active
pub const BLT_SECOND_COLOR: u32 = 0x8765_4321;

const BATCH_BO_SIZE: u64 = 4096;
const BLT_DST_ALIGNMENT: u64 = 64;

/// Byte patterns written into test buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// `i & 0xFF`
    Index,
    /// `!i & 0xFF`
    Inverse,
}

impl Pattern {
    pub fn byte(self, index: usize) -> u8 {
        match self {
            Pattern::Index => (index & 0xFF) as u8,
            Pattern::Inverse => (!index & 0xFF) as u8,
        }
    }

    pub fn fill(self, buf: &mut [u8]) {
        for (i, b) in buf.iter_mut().enumerate() {
            *b = self.byte(i);
        }
    }

    pub fn to_vec(self, len: usize) -> Vec<u8> {
        let mut buf = vec![0; len];
        self.fill(&mut buf);
        buf
    }

    /// Fail on the first byte that does not follow the pattern
    pub fn verify(self, buf: &[u8], context: &str) -> Result<()> {
        match buf.iter().enumerate().find(|&(i, &b)| b != self.byte(i)) {
            Some((i, &b)) => Err(PmError::mismatch(context, i, self.byte(i), b)),
            None => Ok(()),
        }
    }
}

/// Check a 32bpp linear surface: `rect.color` inside the rectangle, zero
/// everywhere else
pub fn verify_rect(pixels: &[u8], side: u32, rect: &BltFill, context: &str) -> Result<()> {
    let expected_len = (side * side * BPP) as usize;
    if pixels.len() != expected_len {
        return Err(PmError::DataIntegrity(format!(
            "{context}: surface is {} bytes, expected {expected_len}",
            pixels.len()
        )));
    }

    for (i, px) in pixels.chunks_exact(BPP as usize).enumerate() {
        let value = u32::from_ne_bytes([px[0], px[1], px[2], px[3]]);
        let (x, y) = (i as u32 % side, i as u32 / side);
        let expected = if rect.contains(x, y) { rect.color } else { 0 };
        if value != expected {
            return Err(PmError::mismatch(context, i, expected, value));
        }
    }
    Ok(())
}

fn read_mapping(mapping: &dyn GemMapping) -> Result<Vec<u8>> {
    let mut buf = vec![0; mapping.len()];
    mapping.load(0, &mut buf)?;
    Ok(buf)
}

impl Harness {
    fn map_pattern_buffer(
        &mut self,
        handle: GemHandle,
        kind: MapKind,
    ) -> Result<Box<dyn GemMapping>> {
        let mapping = self.device.gem_mmap(handle, PATTERN_BUF_SIZE, kind)?;
        if mapping.len() < PATTERN_BUF_SIZE {
            return Err(PmError::ProtocolViolation(format!(
                "{} mapping is {} bytes, wanted {}",
                kind.as_str(),
                mapping.len(),
                PATTERN_BUF_SIZE
            )));
        }
        Ok(mapping)
    }

    /// Map a buffer, fill and verify it on both sides of a suspend, then map
    /// it again while suspended and repeat
    pub fn gem_mmap_workload(&mut self, kind: MapKind) -> Result<()> {
        let ctx = |step: &str| format!("gem-mmap-{} {}", kind.as_str(), step);

        self.force_active_and_confirm(ScreenType::Any, &ctx("active"))?;
        let handle = self.device.gem_create(PATTERN_BUF_SIZE as u64)?;

        let mut mapping = self.map_pattern_buffer(handle, kind)?;
        mapping.store(0, &Pattern::Index.to_vec(PATTERN_BUF_SIZE))?;
        Pattern::Index.verify(&read_mapping(mapping.as_ref())?, &ctx("active"))?;

        self.force_suspend_and_confirm(&ctx("suspend"))?;
        Pattern::Index.verify(&read_mapping(mapping.as_ref())?, &ctx("read while suspended"))?;
        self.confirm_suspended(&ctx("after read"))?;
        mapping.store(0, &Pattern::Inverse.to_vec(PATTERN_BUF_SIZE))?;
        self.confirm_suspended(&ctx("after write"))?;

        self.force_active_and_confirm(ScreenType::Any, &ctx("resume"))?;
        Pattern::Inverse.verify(&read_mapping(mapping.as_ref())?, &ctx("after resume"))?;
        mapping.unmap()?;

        self.force_suspend_and_confirm(&ctx("second suspend"))?;
        let mut mapping = self.map_pattern_buffer(handle, kind)?;
        self.confirm_suspended(&ctx("after suspended map"))?;
        mapping.store(0, &Pattern::Index.to_vec(PATTERN_BUF_SIZE))?;
        Pattern::Index.verify(&read_mapping(mapping.as_ref())?, &ctx("suspended map"))?;
        self.confirm_suspended(&ctx("after suspended write"))?;

        self.force_active_and_confirm(ScreenType::Any, &ctx("second resume"))?;
        Pattern::Index.verify(&read_mapping(mapping.as_ref())?, &ctx("after second resume"))?;
        mapping.unmap()?;

        self.device.gem_close(handle)
    }

    /// Same battery as [`Harness::gem_mmap_workload`] through pwrite/pread
    pub fn gem_pread_workload(&mut self) -> Result<()> {
        self.force_active_and_confirm(ScreenType::Any, "gem-pread active")?;
        let handle = self.device.gem_create(PATTERN_BUF_SIZE as u64)?;
        let mut read_buf = vec![0u8; PATTERN_BUF_SIZE];

        self.device
            .gem_write(handle, 0, &Pattern::Index.to_vec(PATTERN_BUF_SIZE))?;
        self.device.gem_read(handle, 0, &mut read_buf)?;
        Pattern::Index.verify(&read_buf, "gem-pread active")?;

        self.force_suspend_and_confirm("gem-pread suspend")?;
        read_buf.fill(0);
        self.device.gem_read(handle, 0, &mut read_buf)?;
        Pattern::Index.verify(&read_buf, "gem-pread read while suspended")?;
        self.confirm_suspended("gem-pread after read")?;

        self.device
            .gem_write(handle, 0, &Pattern::Inverse.to_vec(PATTERN_BUF_SIZE))?;
        self.confirm_suspended("gem-pread after write")?;

        self.force_active_and_confirm(ScreenType::Any, "gem-pread resume")?;
        read_buf.fill(0);
        self.device.gem_read(handle, 0, &mut read_buf)?;
        Pattern::Inverse.verify(&read_buf, "gem-pread after resume")?;

        self.device.gem_close(handle)
    }

    /// Submit a colour fill into `dst` on the blitter and wait for it
    ///
    /// `presumed_offset` is both the guess passed to the kernel and where the
    /// address it actually used is written back.
    fn submit_blt(
        &mut self,
        dst: GemHandle,
        rect: &BltFill,
        presumed_offset: &mut u64,
    ) -> Result<()> {
        let encoded = rect.encode(*presumed_offset as u32);
        let batch_bytes = encoded.batch.to_bytes();

        let batch = self.device.gem_create(BATCH_BO_SIZE)?;
        self.device.gem_write(batch, 0, &batch_bytes)?;

        let mut dst_object = ExecObject::new(dst);
        dst_object.alignment = BLT_DST_ALIGNMENT;

        let mut batch_object = ExecObject::new(batch);
        batch_object.relocations.push(Relocation {
            target_handle: dst,
            delta: encoded.offset_in_dst,
            offset: (encoded.reloc_dword * 4) as u64,
            presumed_offset: *presumed_offset,
            read_domains: GemDomain::RENDER,
            write_domain: GemDomain::RENDER,
        });

        let mut exec = ExecBuffer {
            objects: vec![dst_object, batch_object],
            batch_len: batch_bytes.len() as u32,
            ring: Ring::Blt,
        };
        self.device.execbuf(&mut exec)?;

        if let Some(reloc) = exec.objects.last().and_then(|o| o.relocations.first()) {
            *presumed_offset = reloc.presumed_offset;
        }
        log::debug!("blt into {} at presumed offset {:#x}", dst, presumed_offset);

        self.device.gem_wait(batch, GEM_WAIT_TIMEOUT)?;
        self.device.gem_wait(dst, GEM_WAIT_TIMEOUT)?;
        self.device.gem_close(batch)
    }

    fn read_blt_dst(&mut self, dst: GemHandle) -> Result<Vec<u8>> {
        let mut pixels = vec![0u8; (BLT_DST_SIDE * BLT_DST_SIDE * BPP) as usize];
        self.device.gem_read(dst, 0, &mut pixels)?;
        Ok(pixels)
    }

    /// Blit while suspended and read back on both sides, then blit while
    /// active and read back while suspended
    pub fn gem_execbuf_workload(&mut self) -> Result<()> {
        let dst_size = (BLT_DST_SIDE * BLT_DST_SIDE * BPP) as usize;
        let mut presumed_offset = 0u64;

        self.force_active_and_confirm(ScreenType::Any, "gem-execbuf active")?;
        let dst = self.device.gem_create(dst_size as u64)?;
        self.device.gem_write(dst, 0, &vec![0u8; dst_size])?;

        self.force_suspend_and_confirm("gem-execbuf suspend")?;
        self.submit_blt(dst, &BLT_RECT, &mut presumed_offset)?;
        self.confirm_suspended("gem-execbuf after submit")?;
        let pixels = self.read_blt_dst(dst)?;
        self.confirm_suspended("gem-execbuf after read")?;
        verify_rect(&pixels, BLT_DST_SIDE, &BLT_RECT, "gem-execbuf suspended")?;

        self.force_active_and_confirm(ScreenType::Any, "gem-execbuf resume")?;
        let pixels = self.read_blt_dst(dst)?;
        verify_rect(&pixels, BLT_DST_SIDE, &BLT_RECT, "gem-execbuf after resume")?;

        let second = BltFill {
            color: BLT_SECOND_COLOR,
            ..BLT_RECT
        };
        self.submit_blt(dst, &second, &mut presumed_offset)?;
        self.force_suspend_and_confirm("gem-execbuf second suspend")?;
        let pixels = self.read_blt_dst(dst)?;
        verify_rect(&pixels, BLT_DST_SIDE, &second, "gem-execbuf active blit")?;

        self.device.gem_close(dst)
    }

    /// Submit a no-op batch `rounds` times, each time requiring the device
    /// to fall back into suspend
    pub fn gem_execbuf_stress_workload(&mut self, rounds: usize) -> Result<()> {
        self.force_suspend_and_confirm("gem-execbuf-stress suspend")?;

        let batch = BatchBuffer::noop();
        let handle = self.device.gem_create(BATCH_BO_SIZE)?;
        self.device.gem_write(handle, 0, &batch.to_bytes())?;

        let mut exec = ExecBuffer {
            objects: vec![ExecObject::new(handle)],
            batch_len: batch.len_bytes() as u32,
            ring: Ring::Render,
        };

        for round in 0..rounds {
            self.device.execbuf(&mut exec)?;
            self.confirm_suspended(&format!("gem-execbuf-stress round {round}"))?;
        }

        self.device.gem_close(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterns() {
        assert_eq!(Pattern::Index.byte(0x1FF), 0xFF);
        assert_eq!(Pattern::Inverse.byte(0), 0xFF);
        assert_eq!(Pattern::Inverse.byte(0x101), 0xFE);
    }

    #[test]
    fn test_pattern_verify_reports_first_mismatch() {
        let mut buf = Pattern::Index.to_vec(PATTERN_BUF_SIZE);
        Pattern::Index.verify(&buf, "ok").unwrap();

        buf[300] ^= 0xFF;
        buf[400] ^= 0xFF;
        let err = Pattern::Index.verify(&buf, "buf").unwrap_err();
        assert_eq!(
            err.to_string(),
            "data integrity violation: buf: index 300: expected 0x2c, got 0xd3"
        );
    }

    fn painted(rect: &BltFill) -> Vec<u8> {
        let mut pixels = vec![0u8; (BLT_DST_SIDE * BLT_DST_SIDE * BPP) as usize];
        for y in 0..BLT_DST_SIDE {
            for x in 0..BLT_DST_SIDE {
                if rect.contains(x, y) {
                    let at = ((y * BLT_DST_SIDE + x) * BPP) as usize;
                    pixels[at..at + 4].copy_from_slice(&rect.color.to_ne_bytes());
                }
            }
        }
        pixels
    }

    #[test]
    fn test_verify_rect_accepts_exact_fill() {
        verify_rect(&painted(&BLT_RECT), BLT_DST_SIDE, &BLT_RECT, "rect").unwrap();
    }

    #[test]
    fn test_verify_rect_rejects_spill() {
        let wider = BltFill {
            width: BLT_RECT.width + 1,
            ..BLT_RECT
        };
        let err = verify_rect(&painted(&wider), BLT_DST_SIDE, &BLT_RECT, "rect").unwrap_err();
        // First spilled pixel is (20, 10)
        assert!(err.to_string().contains("index 1300"));
    }

    #[test]
    fn test_verify_rect_rejects_wrong_color() {
        let other = BltFill {
            color: BLT_SECOND_COLOR,
            ..BLT_RECT
        };
        assert!(verify_rect(&painted(&other), BLT_DST_SIDE, &BLT_RECT, "rect").is_err());
    }
}
