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

//! Subtests and the runner that sequences them
//!
//! Every subtest runs against the shared [`Harness`]. A skip (missing
//! screen, missing file, unsupported chipset) never fails the run; a fatal
//! error ends only the subtest that raised it.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error::{require, PmError, Result};
use super::gem::MapKind;
use super::harness::Harness;
use super::kms::{count_valid_edids, ModeSetSnapshot, ScreenType};
use super::registers::RegisterSnapshot;
use super::workload::EXECBUF_STRESS_ROUNDS;

/// Rounds of the `modeset-*-stress*` subtests
pub const MODESET_STRESS_ROUNDS: usize = 50;

/// How long forcewake is held before re-checking that the device stayed up
pub const FORCEWAKE_HOLD: Duration = Duration::from_secs(10);

/// Settle time before the second register capture
pub const REGISTER_SETTLE: Duration = Duration::from_secs(1);

/// Exit status when every subtest passed (or passed and skipped)
pub const EXIT_SUCCESS: i32 = 0;
/// Exit status when every selected subtest skipped
pub const EXIT_SKIP: i32 = 77;
/// Exit status when any subtest failed
pub const EXIT_FAILURE: i32 = 99;

/// Named subtests, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subtest {
    Rte,
    DrmResourcesEqual,
    ModesetLpsp,
    ModesetNonLpsp,
    GemMmapCpu,
    GemMmapGtt,
    GemPread,
    GemExecbuf,
    I2c,
    DebugfsRead,
    DebugfsForcewakeUser,
    SysfsRead,
    ModesetLpspStress,
    ModesetNonLpspStress,
    ModesetLpspStressNoWait,
    ModesetNonLpspStressNoWait,
    GemExecbufStress,
    RegisterCompare,
}

impl Subtest {
    pub const ALL: [Subtest; 18] = [
        Subtest::Rte,
        Subtest::DrmResourcesEqual,
        Subtest::ModesetLpsp,
        Subtest::ModesetNonLpsp,
        Subtest::GemMmapCpu,
        Subtest::GemMmapGtt,
        Subtest::GemPread,
        Subtest::GemExecbuf,
        Subtest::I2c,
        Subtest::DebugfsRead,
        Subtest::DebugfsForcewakeUser,
        Subtest::SysfsRead,
        Subtest::ModesetLpspStress,
        Subtest::ModesetNonLpspStress,
        Subtest::ModesetLpspStressNoWait,
        Subtest::ModesetNonLpspStressNoWait,
        Subtest::GemExecbufStress,
        Subtest::RegisterCompare,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Subtest::Rte => "rte",
            Subtest::DrmResourcesEqual => "drm-resources-equal",
            Subtest::ModesetLpsp => "modeset-lpsp",
            Subtest::ModesetNonLpsp => "modeset-non-lpsp",
            Subtest::GemMmapCpu => "gem-mmap-cpu",
            Subtest::GemMmapGtt => "gem-mmap-gtt",
            Subtest::GemPread => "gem-pread",
            Subtest::GemExecbuf => "gem-execbuf",
            Subtest::I2c => "i2c",
            Subtest::DebugfsRead => "debugfs-read",
            Subtest::DebugfsForcewakeUser => "debugfs-forcewake-user",
            Subtest::SysfsRead => "sysfs-read",
            Subtest::ModesetLpspStress => "modeset-lpsp-stress",
            Subtest::ModesetNonLpspStress => "modeset-non-lpsp-stress",
            Subtest::ModesetLpspStressNoWait => "modeset-lpsp-stress-no-wait",
            Subtest::ModesetNonLpspStressNoWait => "modeset-non-lpsp-stress-no-wait",
            Subtest::GemExecbufStress => "gem-execbuf-stress",
            Subtest::RegisterCompare => "register-compare",
        }
    }
}

impl fmt::Display for Subtest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Subtest {
    type Err = PmError;

    fn from_str(s: &str) -> Result<Self> {
        Subtest::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| PmError::Config(format!("unknown subtest '{s}'")))
    }
}

/// Knobs that change what subtests do
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Allow raw MMIO reads for `register-compare`
    pub do_register_compare: bool,
}

/// Verdict of one subtest
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Skip(String),
    Fail(String),
}

impl Outcome {
    pub fn from_result(result: Result<()>) -> Self {
        match result {
            Ok(()) => Outcome::Pass,
            Err(e) if e.is_skip() => Outcome::Skip(e.to_string()),
            Err(e) => Outcome::Fail(e.to_string()),
        }
    }
}

/// One line of the report
#[derive(Debug, Clone, Serialize)]
pub struct SubtestResult {
    pub name: &'static str,
    #[serde(flatten)]
    pub outcome: Outcome,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
}

/// Results of a whole run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub results: Vec<SubtestResult>,
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            results: Vec::new(),
        }
    }

    /// Report for a run whose setup failed: every selected subtest inherits
    /// the setup verdict
    pub fn setup_failed(selected: &[Subtest], error: &PmError) -> Self {
        let mut report = Self::new();
        let outcome = if error.is_skip() {
            Outcome::Skip(error.to_string())
        } else {
            Outcome::Fail(format!("setup: {error}"))
        };
        for &subtest in selected {
            report.results.push(SubtestResult {
                name: subtest.name(),
                outcome: outcome.clone(),
                started_at: report.started_at,
                duration_secs: 0.0,
            });
        }
        report
    }

    pub fn passed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Pass))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Skip(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Fail(_)))
    }

    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn exit_code(&self) -> i32 {
        if self.failed() > 0 {
            EXIT_FAILURE
        } else if self.passed() == 0 {
            EXIT_SKIP
        } else {
            EXIT_SUCCESS
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| PmError::Io(e.into()))
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs subtests against a set-up harness
pub struct ScenarioRunner<'a> {
    harness: &'a mut Harness,
    options: RunOptions,
}

impl<'a> ScenarioRunner<'a> {
    pub fn new(harness: &'a mut Harness, options: RunOptions) -> Self {
        Self { harness, options }
    }

    /// Run `selected` in order and collect their verdicts
    pub fn run_all(&mut self, selected: &[Subtest]) -> RunReport {
        let mut report = RunReport::new();
        for &subtest in selected {
            let started_at = Utc::now();
            let start = Instant::now();

            log::info!("Starting subtest: {}", subtest);
            let outcome = self.run(subtest);
            match &outcome {
                Outcome::Pass => log::info!("Subtest {}: SUCCESS", subtest),
                Outcome::Skip(reason) => log::warn!("Subtest {}: SKIP ({})", subtest, reason),
                Outcome::Fail(reason) => log::error!("Subtest {}: FAIL ({})", subtest, reason),
            }

            report.results.push(SubtestResult {
                name: subtest.name(),
                outcome,
                started_at,
                duration_secs: start.elapsed().as_secs_f64(),
            });
        }
        report
    }

    pub fn run(&mut self, subtest: Subtest) -> Outcome {
        Outcome::from_result(self.dispatch(subtest))
    }

    fn dispatch(&mut self, subtest: Subtest) -> Result<()> {
        let stress = MODESET_STRESS_ROUNDS;
        match subtest {
            Subtest::Rte => self.rte(),
            Subtest::DrmResourcesEqual => self.drm_resources_equal(),
            Subtest::ModesetLpsp => self.modeset(ScreenType::Lpsp, 1, true),
            Subtest::ModesetNonLpsp => self.modeset(ScreenType::NonLpsp, 1, true),
            Subtest::GemMmapCpu => self.harness.gem_mmap_workload(MapKind::Cpu),
            Subtest::GemMmapGtt => self.harness.gem_mmap_workload(MapKind::Gtt),
            Subtest::GemPread => self.harness.gem_pread_workload(),
            Subtest::GemExecbuf => self.harness.gem_execbuf_workload(),
            Subtest::I2c => self.i2c(),
            Subtest::DebugfsRead => {
                let root = self.harness.config.debugfs_dir.clone();
                self.harness.read_tree_while_suspended(&root)
            }
            Subtest::DebugfsForcewakeUser => self.debugfs_forcewake_user(),
            Subtest::SysfsRead => {
                let root = self.harness.config.sysfs_dir.clone();
                self.harness.read_tree_while_suspended(&root)
            }
            Subtest::ModesetLpspStress => self.modeset(ScreenType::Lpsp, stress, true),
            Subtest::ModesetNonLpspStress => self.modeset(ScreenType::NonLpsp, stress, true),
            Subtest::ModesetLpspStressNoWait => self.modeset(ScreenType::Lpsp, stress, false),
            Subtest::ModesetNonLpspStressNoWait => {
                self.modeset(ScreenType::NonLpsp, stress, false)
            }
            Subtest::GemExecbufStress => self
                .harness
                .gem_execbuf_stress_workload(EXECBUF_STRESS_ROUNDS),
            Subtest::RegisterCompare => self.register_compare(),
        }
    }

    fn rte(&mut self) -> Result<()> {
        self.harness.force_suspend_no_wait()?;
        self.harness.confirm_suspended(
            "machine is not reaching PC8+/runtime suspend, check its configuration",
        )?;
        self.harness
            .force_active_and_confirm(ScreenType::Any, "rte resume")
    }

    fn snapshot(&mut self) -> Result<ModeSetSnapshot> {
        ModeSetSnapshot::capture(self.harness.device.as_mut())
    }

    fn drm_resources_equal(&mut self) -> Result<()> {
        self.harness
            .force_active_and_confirm(ScreenType::Any, "drm-resources-equal active")?;
        let pre = self.snapshot()?;
        self.harness
            .confirm_active("drm-resources-equal after active capture")?;

        self.harness
            .force_suspend_and_confirm("drm-resources-equal suspend")?;
        let during = self.snapshot()?;
        self.harness
            .confirm_suspended("drm-resources-equal after suspended capture")?;

        self.harness
            .force_active_and_confirm(ScreenType::Any, "drm-resources-equal resume")?;
        let post = self.snapshot()?;
        self.harness
            .confirm_active("drm-resources-equal after resumed capture")?;

        pre.assert_equal(&during)?;
        pre.assert_equal(&post)
    }

    fn modeset(&mut self, screen: ScreenType, rounds: usize, wait: bool) -> Result<()> {
        for round in 0..rounds {
            self.harness.force_suspend_no_wait()?;
            if wait {
                self.harness
                    .confirm_suspended(&format!("modeset {} round {round}", screen.as_str()))?;
            }

            let enabled = self.harness.force_active_no_wait(screen)?;
            require(enabled, format!("no connected {} screen", screen.as_str()))?;
            if wait {
                self.harness
                    .confirm_active(&format!("modeset {} round {round}", screen.as_str()))?;
            }
        }
        Ok(())
    }

    fn i2c(&mut self) -> Result<()> {
        require(
            self.harness.i2c.adapter_count()? > 0,
            "no I2C adapters exposed",
        )?;

        self.harness
            .force_active_and_confirm(ScreenType::Any, "i2c resume")?;
        self.harness.force_suspend_and_confirm("i2c suspend")?;

        let i2c_edids = self.harness.i2c.count_valid_edids()?;
        let drm_edids = count_valid_edids(&self.harness.mode_set.edids);
        log::debug!("{} EDIDs over I2C, {} from DRM", i2c_edids, drm_edids);
        if i2c_edids != drm_edids {
            return Err(PmError::DataIntegrity(format!(
                "I2C reports {i2c_edids} valid EDIDs, DRM reports {drm_edids}"
            )));
        }

        self.harness.confirm_suspended("i2c after EDID reads")?;

        // Leave a screen lit for whatever runs next
        self.harness.force_active_no_wait(ScreenType::Any)?;
        Ok(())
    }

    fn debugfs_forcewake_user(&mut self) -> Result<()> {
        require(
            !self.harness.chipset.is_pre_gen6(),
            "no forcewake before gen6",
        )?;

        self.harness
            .force_suspend_and_confirm("debugfs-forcewake-user suspend")?;

        let Some(hold) = self.harness.device.open_forcewake()? else {
            return Err(PmError::PreconditionMissing(
                "i915_forcewake_user not present".to_string(),
            ));
        };

        self.harness
            .confirm_active("debugfs-forcewake-user while held")?;
        self.harness.clock.sleep(FORCEWAKE_HOLD);
        self.harness
            .confirm_active("debugfs-forcewake-user after holding")?;

        hold.release()?;
        self.harness
            .confirm_suspended("debugfs-forcewake-user after release")
    }

    fn register_compare(&mut self) -> Result<()> {
        require(
            self.options.do_register_compare,
            "register comparison not requested (--do-register-compare)",
        )?;

        let regs = self.harness.device.open_registers()?;

        self.harness
            .force_active_and_confirm(ScreenType::Any, "register-compare active")?;
        let before = RegisterSnapshot::capture(regs.as_ref())?;
        self.harness
            .confirm_active("register-compare after first capture")?;

        self.harness
            .force_suspend_and_confirm("register-compare suspend")?;
        self.harness
            .force_active_and_confirm(ScreenType::Any, "register-compare resume")?;
        self.harness.clock.sleep(REGISTER_SETTLE);

        let after = RegisterSnapshot::capture(regs.as_ref())?;
        self.harness
            .confirm_active("register-compare after second capture")?;

        before.assert_equal(&after)
    }
}
