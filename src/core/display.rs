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

//! Display on/off switching
//!
//! Scanning out anything keeps the GPU awake, so turning every CRTC off is how
//! the harness asks for a suspend, and lighting a single output is how it asks
//! for a resume.

use super::error::{PmError, Result};
use super::kms::{CrtcConfig, KmsDevice, ModeSetData, ScreenType};

/// Borrowed view over a KMS device and the mode-set data captured at setup
pub struct DisplayDriver<'a, K: KmsDevice + ?Sized> {
    kms: &'a mut K,
    data: &'a ModeSetData,
}

impl<'a, K: KmsDevice + ?Sized> DisplayDriver<'a, K> {
    pub fn new(kms: &'a mut K, data: &'a ModeSetData) -> Self {
        Self { kms, data }
    }

    /// Detach every CRTC
    pub fn disable_all_outputs(&mut self) -> Result<()> {
        for &crtc_id in &self.data.resources.crtcs {
            self.kms.set_crtc(crtc_id, None)?;
        }
        Ok(())
    }

    /// Light the first connected output of `screen` type on the first CRTC
    ///
    /// Returns `Ok(false)` when no connector qualifies.
    pub fn enable_one_output(&mut self, screen: ScreenType) -> Result<bool> {
        let Some(connector) = self.data.find_output(screen) else {
            log::debug!("no connected {} output", screen.as_str());
            return Ok(false);
        };
        let Some(mode) = connector.preferred_mode() else {
            return Ok(false);
        };
        let &crtc_id = self
            .data
            .resources
            .crtcs
            .first()
            .ok_or_else(|| PmError::ProtocolViolation("device has no CRTCs".to_string()))?;

        let fb_id = self
            .kms
            .create_framebuffer(u32::from(mode.hdisplay), u32::from(mode.vdisplay))?;

        log::debug!(
            "enabling connector {} ({}x{}) on crtc {} with fb {}",
            connector.connector_id,
            mode.hdisplay,
            mode.vdisplay,
            crtc_id,
            fb_id
        );

        let config = CrtcConfig {
            fb_id,
            connector_id: connector.connector_id,
            mode: mode.clone(),
        };
        self.kms.set_crtc(crtc_id, Some(&config))?;
        Ok(true)
    }
}
