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

//! Kernel mode-setting resources
//!
//! Plain-data views of the DRM mode objects the harness touches (resources,
//! connectors, encoders, CRTCs, EDID blobs) and the [`KmsDevice`] trait the
//! display code is written against. The hardware backend fills these from
//! `DRM_IOCTL_MODE_*` calls; the simulated backend builds them directly.

pub mod edid;
pub mod snapshot;


use super::error::Result;

pub use edid::{count_valid_edids, edid_is_valid, DevI2c, I2cProbe, EDID_HEADER};
pub use snapshot::ModeSetSnapshot;

/// `DRM_MODE_CONNECTOR_eDP`
pub const CONNECTOR_TYPE_EDP: u32 = 14;

/// `DRM_MODE_CONNECTOR_HDMIA`
pub const CONNECTOR_TYPE_HDMIA: u32 = 11;

/// `DRM_MODE_CONNECTOR_DisplayPort`
pub const CONNECTOR_TYPE_DISPLAYPORT: u32 = 10;

/// Card-wide mode-setting resources (`drmModeRes`)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Resources {
    pub fbs: Vec<u32>,
    pub crtcs: Vec<u32>,
    pub connectors: Vec<u32>,
    pub encoders: Vec<u32>,
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
}

/// Display timing (`drm_mode_modeinfo`)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModeInfo {
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
    pub mode_type: u32,
    pub name: String,
}

/// Connector link state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connection {
    Connected,
    Disconnected,
    Unknown,
}

impl Connection {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Connection::Connected,
            2 => Connection::Disconnected,
            _ => Connection::Unknown,
        }
    }
}

/// A display output (`drmModeConnector`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connector {
    pub connector_id: u32,
    pub connector_type: u32,
    pub connector_type_id: u32,
    pub connection: Connection,
    pub mm_width: u32,
    pub mm_height: u32,
    pub modes: Vec<ModeInfo>,
    pub props: Vec<u32>,
    pub prop_values: Vec<u64>,
    pub encoders: Vec<u32>,
}

impl Connector {
    /// Low-power single pipe outputs are the embedded panel only
    pub fn is_lpsp(&self) -> bool {
        self.connector_type == CONNECTOR_TYPE_EDP
    }

    pub fn matches(&self, screen: ScreenType) -> bool {
        match screen {
            ScreenType::Lpsp => self.is_lpsp(),
            ScreenType::NonLpsp => !self.is_lpsp(),
            ScreenType::Any => true,
        }
    }

    /// Preferred mode: the first one the kernel lists
    pub fn preferred_mode(&self) -> Option<&ModeInfo> {
        self.modes.first()
    }
}

/// Encoder (`drmModeEncoder`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoder {
    pub encoder_id: u32,
    pub encoder_type: u32,
    pub crtc_id: u32,
    pub possible_crtcs: u32,
    pub possible_clones: u32,
}

/// Display pipeline (`drmModeCrtc`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Crtc {
    pub crtc_id: u32,
    pub buffer_id: u32,
    pub x: u32,
    pub y: u32,
    pub mode: Option<ModeInfo>,
}

/// Property blob (`drmModePropertyBlob`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyBlob {
    pub id: u32,
    pub data: Vec<u8>,
}

/// Which connectors an enable request may pick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenType {
    /// eDP only
    Lpsp,
    /// Anything except eDP
    NonLpsp,
    Any,
}

impl ScreenType {
    pub fn as_str(self) -> &'static str {
        match self {
            ScreenType::Lpsp => "lpsp",
            ScreenType::NonLpsp => "non-lpsp",
            ScreenType::Any => "any",
        }
    }
}

/// Configuration committed to a CRTC by [`KmsDevice::set_crtc`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrtcConfig {
    pub fb_id: u32,
    pub connector_id: u32,
    pub mode: ModeInfo,
}

/// Mode-setting operations used by the harness
pub trait KmsDevice {
    fn resources(&mut self) -> Result<Resources>;

    fn connector(&mut self, connector_id: u32) -> Result<Connector>;

    fn encoder(&mut self, encoder_id: u32) -> Result<Encoder>;

    fn crtc(&mut self, crtc_id: u32) -> Result<Crtc>;

    /// EDID blob attached to the connector, if any
    fn connector_edid(&mut self, connector: &Connector) -> Result<Option<PropertyBlob>>;

    /// Allocate a `width`×`height` XRGB8888 framebuffer filled with a test
    /// pattern and return its id
    fn create_framebuffer(&mut self, width: u32, height: u32) -> Result<u32>;

    /// Attach `config` to the CRTC, or detach everything when `None`
    fn set_crtc(&mut self, crtc_id: u32, config: Option<&CrtcConfig>) -> Result<()>;
}

/// Mode-setting state captured once at setup
///
/// Connector list and EDIDs do not change during a run; the display code
/// picks outputs from this instead of re-probing every time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeSetData {
    pub resources: Resources,
    pub connectors: Vec<Connector>,
    pub edids: Vec<Option<PropertyBlob>>,
}

impl ModeSetData {
    pub fn capture<K: KmsDevice + ?Sized>(kms: &mut K) -> Result<Self> {
        let resources = kms.resources()?;
        let mut connectors = Vec::with_capacity(resources.connectors.len());
        let mut edids = Vec::with_capacity(resources.connectors.len());

        for &id in &resources.connectors {
            let connector = kms.connector(id)?;
            edids.push(kms.connector_edid(&connector)?);
            connectors.push(connector);
        }

        log::debug!(
            "mode set data: {} crtcs, {} connectors, {} EDIDs",
            resources.crtcs.len(),
            connectors.len(),
            edids.iter().filter(|e| e.is_some()).count()
        );

        Ok(Self {
            resources,
            connectors,
            edids,
        })
    }

    /// First connected connector of the requested type that has a mode
    pub fn find_output(&self, screen: ScreenType) -> Option<&Connector> {
        self.connectors.iter().find(|c| {
            c.matches(screen) && c.connection == Connection::Connected && !c.modes.is_empty()
        })
    }
}
