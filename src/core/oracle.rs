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

//! Suspended/active detection
//!
//! Two ways of telling whether the device is suspended exist, and exactly one
//! is chosen at setup:
//!
//! - **Kernel status**: whenever the driver supports runtime PM, poll
//!   `runtime_status` until it reports the wanted state (10 s budget).
//! - **Residency change**: on PC8-capable machines without runtime PM, watch
//!   the PC8/PC9/PC10 residency counters. Movement means the package is in
//!   PC8+. Entering PC8+ is expected to show up quickly, so "suspended" gets
//!   30 s to show movement; "active" means no movement for a full 5 s.
//!
//! A timeout is reported as `Ok(false)`; whether that is fatal is up to the
//! caller.

use std::rc::Rc;
use std::time::Duration;

use super::error::Result;
use super::residency::{ResidencyCounters, ResidencySampler};
use super::runtime_pm::{RuntimePmStatus, StatusReader};
use super::timing::{poll_until, Clock, POLL_INTERVAL};

/// Budget for residency movement when the package should be in PC8+
pub const RESIDENCY_ENABLED_TIMEOUT: Duration = Duration::from_secs(30);

/// Window in which residency must stay still when PC8+ should be blocked
pub const RESIDENCY_DISABLED_TIMEOUT: Duration = Duration::from_secs(5);

/// Budget for `runtime_status` to reach the wanted state
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(10);

/// Platform capabilities, probed once at setup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub has_runtime_pm: bool,
    pub has_pc8: bool,
}

/// Which detection strategy an oracle uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Residency,
    KernelStatus,
}

/// Answers "is the device suspended/active" by polling
pub enum SuspendOracle {
    Residency {
        sampler: ResidencySampler,
        clock: Rc<dyn Clock>,
    },
    KernelStatus {
        reader: StatusReader,
        clock: Rc<dyn Clock>,
    },
}

impl SuspendOracle {
    /// Pick the strategy for the probed capabilities
    ///
    /// Residency is only used when it is the sole source of truth; whenever
    /// the kernel reports runtime PM state that wins. Returns `None` when
    /// neither source was provided for the chosen strategy.
    pub fn select(
        caps: Capabilities,
        sampler: Option<ResidencySampler>,
        reader: Option<StatusReader>,
        clock: Rc<dyn Clock>,
    ) -> Option<Self> {
        if caps.has_pc8 && !caps.has_runtime_pm {
            sampler.map(|sampler| SuspendOracle::Residency { sampler, clock })
        } else if caps.has_runtime_pm {
            reader.map(|reader| SuspendOracle::KernelStatus { reader, clock })
        } else {
            None
        }
    }

    pub fn strategy(&self) -> Strategy {
        match self {
            SuspendOracle::Residency { .. } => Strategy::Residency,
            SuspendOracle::KernelStatus { .. } => Strategy::KernelStatus,
        }
    }

    /// Wait until the device is suspended
    pub fn wait_for_suspended(&mut self) -> Result<bool> {
        match self {
            SuspendOracle::Residency { sampler, clock } => {
                residency_changed(sampler, clock.as_ref(), RESIDENCY_ENABLED_TIMEOUT)
            }
            SuspendOracle::KernelStatus { reader, clock } => {
                wait_for_status(reader, clock.as_ref(), RuntimePmStatus::Suspended)
            }
        }
    }

    /// Wait until the device is active
    pub fn wait_for_active(&mut self) -> Result<bool> {
        match self {
            SuspendOracle::Residency { sampler, clock } => {
                residency_changed(sampler, clock.as_ref(), RESIDENCY_DISABLED_TIMEOUT)
                    .map(|changed| !changed)
            }
            SuspendOracle::KernelStatus { reader, clock } => {
                wait_for_status(reader, clock.as_ref(), RuntimePmStatus::Active)
            }
        }
    }
}

fn residency_changed(
    sampler: &ResidencySampler,
    clock: &dyn Clock,
    timeout: Duration,
) -> Result<bool> {
    let initial: ResidencyCounters = sampler.sample_all()?;

    let changed = poll_until(clock, POLL_INTERVAL, timeout, || -> Result<bool> {
        Ok(sampler.sample_all()? != initial)
    })?;

    log::debug!(
        "residency {} within {:?}",
        if changed { "moved" } else { "stayed" },
        timeout
    );
    Ok(changed)
}

fn wait_for_status(
    reader: &mut StatusReader,
    clock: &dyn Clock,
    wanted: RuntimePmStatus,
) -> Result<bool> {
    let reached = poll_until(clock, POLL_INTERVAL, STATUS_TIMEOUT, || -> Result<bool> {
        let status = reader.read_status()?;
        log::trace!("runtime_status: {}", status.as_str());
        Ok(status == wanted)
    })?;

    if !reached {
        log::debug!("runtime_status never reached {}", wanted.as_str());
    }
    Ok(reached)
}
