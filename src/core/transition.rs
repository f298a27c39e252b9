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

//! Forced power transitions
//!
//! A transition is requested through the display and only trusted once the
//! oracle confirms it. `context` strings end up in the timeout error so a
//! failure points at the step that hung.

use super::display::DisplayDriver;
use super::error::{PmError, Result};
use super::harness::Harness;
use super::kms::ScreenType;

impl Harness {
    fn display(&mut self) -> DisplayDriver<'_, dyn super::device::Device> {
        DisplayDriver::new(self.device.as_mut(), &self.mode_set)
    }

    /// Turn every output off without waiting
    pub fn force_suspend_no_wait(&mut self) -> Result<()> {
        self.display().disable_all_outputs()
    }

    /// Light one output of `screen` type without waiting
    ///
    /// Returns `Ok(false)` if no such output is connected.
    pub fn force_active_no_wait(&mut self, screen: ScreenType) -> Result<bool> {
        self.display().enable_one_output(screen)
    }

    /// Fail unless the oracle sees the device suspended
    pub fn confirm_suspended(&mut self, context: &str) -> Result<()> {
        if self.oracle.wait_for_suspended()? {
            Ok(())
        } else {
            Err(PmError::Timeout {
                state: "suspended",
                context: context.to_string(),
            })
        }
    }

    /// Fail unless the oracle sees the device active
    pub fn confirm_active(&mut self, context: &str) -> Result<()> {
        if self.oracle.wait_for_active()? {
            Ok(())
        } else {
            Err(PmError::Timeout {
                state: "active",
                context: context.to_string(),
            })
        }
    }

    pub fn force_suspend_and_confirm(&mut self, context: &str) -> Result<()> {
        self.force_suspend_no_wait()?;
        self.confirm_suspended(context)
    }

    /// Skips with [`PmError::PreconditionMissing`] if no output matches
    pub fn force_active_and_confirm(&mut self, screen: ScreenType, context: &str) -> Result<()> {
        if !self.force_active_no_wait(screen)? {
            return Err(PmError::PreconditionMissing(format!(
                "no connected {} screen",
                screen.as_str()
            )));
        }
        self.confirm_active(context)
    }
}
