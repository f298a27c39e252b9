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

//! Batch interpreter for the simulated engines
//!
//! Runs the commands [`decode`] understands. Destination addresses are
//! looked up in the fake GTT, so a wrong relocation paints the wrong object
//! (or nothing) instead of the intended one.

use super::state::SimState;
use crate::core::error::{PmError, Result};
use crate::core::gem::batch::{decode, Command};
use crate::core::gem::{Ring, BPP};

/// Execute `batch` on `ring`, returning the number of commands run
pub fn execute(state: &SimState, batch: &[u32], ring: Ring) -> Result<usize> {
    let commands = decode(batch)?;

    for command in &commands {
        if let Command::ColorBlt {
            pitch,
            width_bytes,
            height,
            dst_address,
            color,
        } = *command
        {
            if ring != Ring::Blt {
                return Err(PmError::ProtocolViolation(format!(
                    "COLOR_BLT submitted on the {ring:?} ring"
                )));
            }
            color_blt(state, pitch, width_bytes, height, dst_address, color)?;
        }
    }

    Ok(commands.len())
}

fn color_blt(
    state: &SimState,
    pitch: u32,
    width_bytes: u32,
    height: u32,
    dst_address: u32,
    color: u32,
) -> Result<()> {
    let address = u64::from(dst_address);
    let object = state.object_at(address).ok_or_else(|| {
        PmError::ProtocolViolation(format!("COLOR_BLT to unmapped address {address:#x}"))
    })?;

    let base = (address - object.gtt_offset) as usize;
    let mut data = object.data.borrow_mut();
    let last_row_end = base + (height.saturating_sub(1) * pitch + width_bytes) as usize;
    if height > 0 && last_row_end > data.len() {
        return Err(PmError::ProtocolViolation(format!(
            "COLOR_BLT of {width_bytes}x{height} at {address:#x} overruns its object"
        )));
    }

    let pixel = color.to_ne_bytes();
    for row in 0..height as usize {
        let start = base + row * pitch as usize;
        for px in data[start..start + width_bytes as usize].chunks_exact_mut(BPP as usize) {
            px.copy_from_slice(&pixel);
        }
    }
    Ok(())
}
