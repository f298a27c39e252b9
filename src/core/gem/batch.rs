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

//! Batch buffer encoding
//!
//! Only two kinds of batch are ever built: an empty one (a few `MI_NOOP`s and
//! `MI_BATCH_BUFFER_END`) and a single XY colour blit that fills a rectangle.
//!
//! # COLOR_BLT Format
//!
//! ```text
//! DW0: 0x50000003 | WRITE_ALPHA | WRITE_RGB   (client 2, opcode 0x40, length 3)
//! DW1: bits 24-25 colour depth (3 = 32bpp)
//!      bits 16-23 raster op (0xF0 = PATCOPY)
//!      bits 0-15  destination pitch in bytes
//! DW2: bits 16-31 height in rows, bits 0-15 width in bytes
//! DW3: destination address (relocated)
//! DW4: fill colour
//! ```
//!
//! The same decoder is used by the simulated blitter, so encoding and
//! execution agree on the layout.

use crate::core::error::{PmError, Result};

/// Bytes per pixel of every surface the harness draws into
pub const BPP: u32 = 4;

pub const MI_NOOP: u32 = 0;
pub const MI_BATCH_BUFFER_END: u32 = 0xA << 23;

pub const COLOR_BLT_CMD: u32 = (2 << 29) | (0x40 << 22) | (5 - 2);
pub const COLOR_BLT_WRITE_ALPHA: u32 = 1 << 21;
pub const COLOR_BLT_WRITE_RGB: u32 = 1 << 20;

const COLOR_DEPTH_32BPP: u32 = 3;
const ROP_PATCOPY: u32 = 0xF0;

/// A batch under construction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchBuffer {
    dwords: Vec<u32>,
}

impl BatchBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a dword and return its index
    pub fn emit(&mut self, dword: u32) -> usize {
        self.dwords.push(dword);
        self.dwords.len() - 1
    }

    pub fn dwords(&self) -> &[u32] {
        &self.dwords
    }

    pub fn len_bytes(&self) -> usize {
        self.dwords.len() * 4
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.dwords.iter().flat_map(|d| d.to_ne_bytes()).collect()
    }

    /// `NOOP, NOOP, BATCH_BUFFER_END, NOOP`
    pub fn noop() -> Self {
        Self {
            dwords: vec![MI_NOOP, MI_NOOP, MI_BATCH_BUFFER_END, MI_NOOP],
        }
    }
}

/// A solid rectangle fill into a linear 32bpp surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BltFill {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Destination stride in bytes
    pub pitch: u32,
    pub color: u32,
}

/// Encoded blit plus what the relocation needs to know
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBlt {
    pub batch: BatchBuffer,
    /// Index of the dword holding the destination address
    pub reloc_dword: usize,
    /// Byte offset of the rectangle's first pixel in the destination
    pub offset_in_dst: u32,
}

impl BltFill {
    pub fn offset_in_dst(&self) -> u32 {
        self.pitch * self.y + self.x * BPP
    }

    /// Whether pixel (`x`, `y`) lies inside the rectangle
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }

    /// Encode as an 8-dword batch, assuming the destination sits at
    /// `presumed_dst_offset`
    pub fn encode(&self, presumed_dst_offset: u32) -> EncodedBlt {
        let offset_in_dst = self.offset_in_dst();
        let mut batch = BatchBuffer::new();

        batch.emit(COLOR_BLT_CMD | COLOR_BLT_WRITE_ALPHA | COLOR_BLT_WRITE_RGB);
        batch.emit((COLOR_DEPTH_32BPP << 24) | (ROP_PATCOPY << 16) | self.pitch);
        batch.emit((self.height << 16) | (self.width * BPP));
        let reloc_dword = batch.emit(presumed_dst_offset.wrapping_add(offset_in_dst));
        batch.emit(self.color);

        batch.emit(MI_NOOP);
        batch.emit(MI_BATCH_BUFFER_END);
        batch.emit(MI_NOOP);

        EncodedBlt {
            batch,
            reloc_dword,
            offset_in_dst,
        }
    }
}

/// A decoded batch command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Noop,
    BatchBufferEnd,
    ColorBlt {
        pitch: u32,
        width_bytes: u32,
        height: u32,
        dst_address: u32,
        color: u32,
    },
}

/// Decode dwords up to and including `MI_BATCH_BUFFER_END`
///
/// Only the commands [`BatchBuffer`] emits are understood; anything else is
/// a protocol violation. A batch without an end marker is too.
pub fn decode(dwords: &[u32]) -> Result<Vec<Command>> {
    let mut commands = Vec::new();
    let mut i = 0;

    while i < dwords.len() {
        let dw = dwords[i];
        match dw {
            MI_NOOP => {
                commands.push(Command::Noop);
                i += 1;
            }
            MI_BATCH_BUFFER_END => {
                commands.push(Command::BatchBufferEnd);
                return Ok(commands);
            }
            _ if dw & !(COLOR_BLT_WRITE_ALPHA | COLOR_BLT_WRITE_RGB) == COLOR_BLT_CMD => {
                let Some(args) = dwords.get(i + 1..i + 5) else {
                    return Err(PmError::ProtocolViolation(format!(
                        "truncated COLOR_BLT at dword {i}"
                    )));
                };
                if (args[0] >> 24) & 0x3 != COLOR_DEPTH_32BPP {
                    return Err(PmError::ProtocolViolation(format!(
                        "unsupported COLOR_BLT depth in {:#010x}",
                        args[0]
                    )));
                }
                commands.push(Command::ColorBlt {
                    pitch: args[0] & 0xFFFF,
                    width_bytes: args[1] & 0xFFFF,
                    height: args[1] >> 16,
                    dst_address: args[2],
                    color: args[3],
                });
                i += 5;
            }
            _ => {
                return Err(PmError::ProtocolViolation(format!(
                    "unknown command {dw:#010x} at dword {i}"
                )))
            }
        }
    }

    Err(PmError::ProtocolViolation(
        "batch has no MI_BATCH_BUFFER_END".to_string(),
    ))
}

/// Reinterpret native-endian bytes as dwords, ignoring a trailing partial dword
pub fn bytes_to_dwords(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
