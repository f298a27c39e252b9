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

//! Before/after comparison of everything mode-setting reports
//!
//! A snapshot taken while suspended must look exactly like one taken while
//! active: same connectors, same modes, same EDIDs (which proves DP AUX or
//! GMBUS still work), same encoders and CRTCs. Volatile state such as which
//! framebuffer a CRTC scans out is deliberately not compared.

use std::fmt::Debug;

use super::{Connector, Crtc, Encoder, KmsDevice, ModeInfo, PropertyBlob, Resources};
use crate::core::error::{PmError, Result};

/// Upper bounds carried over from libdrm's fixed-size test arrays
pub const MAX_CONNECTORS: usize = 32;
pub const MAX_ENCODERS: usize = 32;
pub const MAX_CRTCS: usize = 16;

/// Everything mode-setting reports at one point in time
#[derive(Debug, Clone)]
pub struct ModeSetSnapshot {
    pub resources: Resources,
    pub connectors: Vec<Connector>,
    pub edids: Vec<Option<PropertyBlob>>,
    pub encoders: Vec<Encoder>,
    pub crtcs: Vec<Crtc>,
}

fn compare<T: PartialEq + Debug>(what: &str, a: T, b: T) -> Result<()> {
    if a == b {
        Ok(())
    } else {
        Err(PmError::DataIntegrity(format!("{what}: {a:?} != {b:?}")))
    }
}

impl ModeSetSnapshot {
    pub fn capture<K: KmsDevice + ?Sized>(kms: &mut K) -> Result<Self> {
        let resources = kms.resources()?;

        if resources.connectors.len() > MAX_CONNECTORS
            || resources.encoders.len() > MAX_ENCODERS
            || resources.crtcs.len() > MAX_CRTCS
        {
            return Err(PmError::ProtocolViolation(format!(
                "implausible resource counts: {} connectors, {} encoders, {} crtcs",
                resources.connectors.len(),
                resources.encoders.len(),
                resources.crtcs.len()
            )));
        }

        let mut connectors = Vec::with_capacity(resources.connectors.len());
        let mut edids = Vec::with_capacity(resources.connectors.len());
        for &id in &resources.connectors {
            let connector = kms.connector(id)?;
            edids.push(kms.connector_edid(&connector)?);
            connectors.push(connector);
        }

        let encoders = resources
            .encoders
            .iter()
            .map(|&id| kms.encoder(id))
            .collect::<Result<Vec<_>>>()?;

        let crtcs = resources
            .crtcs
            .iter()
            .map(|&id| kms.crtc(id))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            resources,
            connectors,
            edids,
            encoders,
            crtcs,
        })
    }

    /// Fail with the first field that differs
    pub fn assert_equal(&self, other: &ModeSetSnapshot) -> Result<()> {
        let (r1, r2) = (&self.resources, &other.resources);
        compare("connector count", r1.connectors.len(), r2.connectors.len())?;
        compare("encoder count", r1.encoders.len(), r2.encoders.len())?;
        compare("crtc count", r1.crtcs.len(), r2.crtcs.len())?;
        compare("min_width", r1.min_width, r2.min_width)?;
        compare("max_width", r1.max_width, r2.max_width)?;
        compare("min_height", r1.min_height, r2.min_height)?;
        compare("max_height", r1.max_height, r2.max_height)?;

        for (c1, c2) in self.connectors.iter().zip(&other.connectors) {
            connectors_equal(c1, c2)?;
        }
        for (i, (e1, e2)) in self.edids.iter().zip(&other.edids).enumerate() {
            edids_equal(i, e1.as_ref(), e2.as_ref())?;
        }
        for (e1, e2) in self.encoders.iter().zip(&other.encoders) {
            compare("encoder id", e1.encoder_id, e2.encoder_id)?;
            compare("encoder type", e1.encoder_type, e2.encoder_type)?;
            compare("possible_crtcs", e1.possible_crtcs, e2.possible_crtcs)?;
            compare("possible_clones", e1.possible_clones, e2.possible_clones)?;
        }
        for (c1, c2) in self.crtcs.iter().zip(&other.crtcs) {
            compare("crtc id", c1.crtc_id, c2.crtc_id)?;
        }

        Ok(())
    }
}

fn connectors_equal(c1: &Connector, c2: &Connector) -> Result<()> {
    let id = c1.connector_id;
    compare("connector id", c1.connector_id, c2.connector_id)?;
    compare(
        &format!("connector {id} type"),
        c1.connector_type,
        c2.connector_type,
    )?;
    compare(
        &format!("connector {id} type id"),
        c1.connector_type_id,
        c2.connector_type_id,
    )?;
    compare(&format!("connector {id} mm_width"), c1.mm_width, c2.mm_width)?;
    compare(&format!("connector {id} mm_height"), c1.mm_height, c2.mm_height)?;
    compare(
        &format!("connector {id} mode count"),
        c1.modes.len(),
        c2.modes.len(),
    )?;
    compare(&format!("connector {id} props"), &c1.props, &c2.props)?;
    compare(&format!("connector {id} encoders"), &c1.encoders, &c2.encoders)?;

    for (m1, m2) in c1.modes.iter().zip(&c2.modes) {
        modes_equal(id, m1, m2)?;
    }
    Ok(())
}

fn modes_equal(connector_id: u32, m1: &ModeInfo, m2: &ModeInfo) -> Result<()> {
    // All fields, name included
    compare(&format!("connector {connector_id} mode {}", m1.name), m1, m2)
}

fn edids_equal(index: usize, e1: Option<&PropertyBlob>, e2: Option<&PropertyBlob>) -> Result<()> {
    match (e1, e2) {
        (None, None) => Ok(()),
        (Some(e1), Some(e2)) => {
            compare(&format!("EDID {index} blob id"), e1.id, e2.id)?;
            compare(
                &format!("EDID {index} length"),
                e1.data.len(),
                e2.data.len(),
            )?;
            match e1.data.iter().zip(&e2.data).position(|(a, b)| a != b) {
                Some(offset) => Err(PmError::mismatch(
                    &format!("EDID {index}"),
                    offset,
                    e1.data[offset],
                    e2.data[offset],
                )),
                None => Ok(()),
            }
        }
        _ => Err(PmError::DataIntegrity(format!(
            "EDID {index} present in only one snapshot"
        ))),
    }
}
