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

//! End-to-end subtest runs against the simulated device
//!
//! Every run uses the virtual clock, so the 10 and 30 second oracle budgets
//! cost nothing.

mod common;

use std::time::Duration;

use common::assertions::{assert_failed_with, assert_passed, assert_skipped};
use common::fixtures::{config_for_tree, create_fake_tree, create_sim_run, run_subtests};
use pm_rpm::core::kms::{CONNECTOR_TYPE_EDP, CONNECTOR_TYPE_HDMIA};
use pm_rpm::core::oracle::Strategy;
use pm_rpm::core::scenario::{EXIT_FAILURE, EXIT_SKIP, EXIT_SUCCESS};
use pm_rpm::core::sim::{SimBackend, SimConfig, SimConnector, SimPower};
use pm_rpm::core::timing::Clock;
use pm_rpm::core::{Harness, HarnessConfig, PmError, RunOptions, RunReport, Subtest};

fn compare_registers() -> RunOptions {
    RunOptions {
        do_register_compare: true,
    }
}

#[test]
fn test_full_run_passes_on_default_platform() {
    let mut run = create_sim_run(SimConfig::default());
    let report = run_subtests(&mut run, &Subtest::ALL, compare_registers());

    for subtest in Subtest::ALL {
        assert_passed(&report, subtest.name());
    }
    assert_eq!(report.exit_code(), EXIT_SUCCESS);
    assert!(run.backend.state().borrow().resumes() > 0);
}

#[test]
fn test_register_compare_skips_without_flag() {
    let mut run = create_sim_run(SimConfig::default());
    let report = run_subtests(&mut run, &[Subtest::RegisterCompare], RunOptions::default());

    assert_skipped(&report, "register-compare");
    assert_eq!(report.exit_code(), EXIT_SKIP);
}

#[test]
fn test_strategy_follows_capabilities() {
    let run = create_sim_run(SimConfig::default());
    assert_eq!(run.harness.oracle.strategy(), Strategy::KernelStatus);
    assert!(run.harness.caps.has_runtime_pm && run.harness.caps.has_pc8);

    let run = create_sim_run(SimConfig::runtime_pm_only());
    assert_eq!(run.harness.oracle.strategy(), Strategy::KernelStatus);
    assert!(!run.harness.caps.has_pc8);

    let run = create_sim_run(SimConfig::pc8_only());
    assert_eq!(run.harness.oracle.strategy(), Strategy::Residency);
    assert!(!run.harness.caps.has_runtime_pm);
}

#[test]
fn test_residency_oracle_runs_core_subtests() {
    let mut run = create_sim_run(SimConfig::pc8_only());
    let subtests = [
        Subtest::Rte,
        Subtest::ModesetLpsp,
        Subtest::GemMmapGtt,
        Subtest::GemExecbuf,
        Subtest::DebugfsForcewakeUser,
    ];
    let report = run_subtests(&mut run, &subtests, RunOptions::default());

    for subtest in subtests {
        assert_passed(&report, subtest.name());
    }
    let counters = run.backend.state().borrow_mut().residency();
    assert!(counters.pc8 > 0);
}

#[test]
fn test_no_power_management_is_unsupported() {
    let sim = SimConfig {
        has_runtime_pm: false,
        ..SimConfig::runtime_pm_only()
    };
    let mut backend = SimBackend::new(sim);

    match Harness::setup(HarnessConfig::default(), &mut backend) {
        Ok(_) => panic!("setup should not succeed without runtime PM or PC8+"),
        Err(e) => {
            assert!(matches!(e, PmError::UnsupportedPlatform(_)));
            let report = RunReport::setup_failed(&Subtest::ALL, &e);
            assert_eq!(report.exit_code(), EXIT_SKIP);
        }
    }
}

#[test]
fn test_lpsp_subtests_skip_without_edp() {
    let sim = SimConfig {
        connectors: vec![SimConnector::new(CONNECTOR_TYPE_HDMIA, true, 1920, 1080)],
        ..SimConfig::default()
    };
    let mut run = create_sim_run(sim);
    let report = run_subtests(
        &mut run,
        &[
            Subtest::ModesetLpsp,
            Subtest::ModesetLpspStress,
            Subtest::ModesetNonLpsp,
        ],
        RunOptions::default(),
    );

    assert_skipped(&report, "modeset-lpsp");
    assert_skipped(&report, "modeset-lpsp-stress");
    assert_passed(&report, "modeset-non-lpsp");
}

#[test]
fn test_non_lpsp_subtests_skip_with_only_edp() {
    let sim = SimConfig {
        connectors: vec![SimConnector::new(CONNECTOR_TYPE_EDP, true, 1920, 1080)],
        ..SimConfig::default()
    };
    let mut run = create_sim_run(sim);
    let report = run_subtests(
        &mut run,
        &[Subtest::ModesetNonLpsp, Subtest::ModesetNonLpspStressNoWait],
        RunOptions::default(),
    );

    assert_skipped(&report, "modeset-non-lpsp");
    assert_skipped(&report, "modeset-non-lpsp-stress-no-wait");
}

#[test]
fn test_no_connected_screen_skips_everything_needing_one() {
    let sim = SimConfig {
        connectors: vec![SimConnector::new(CONNECTOR_TYPE_HDMIA, false, 1920, 1080)],
        ..SimConfig::default()
    };
    let mut run = create_sim_run(sim);
    let report = run_subtests(
        &mut run,
        &[Subtest::Rte, Subtest::GemPread, Subtest::GemMmapCpu],
        RunOptions::default(),
    );

    assert_eq!(report.skipped(), 3);
    assert_eq!(report.exit_code(), EXIT_SKIP);
}

#[test]
fn test_stuck_device_times_out() {
    let mut sim = SimConfig::default();
    sim.faults.stuck_active = true;
    let mut run = create_sim_run(sim);
    let start = run.backend.manual_clock().now();

    let report = run_subtests(&mut run, &[Subtest::Rte], RunOptions::default());

    assert_failed_with(&report, "rte", "timed out waiting for suspended");
    assert_eq!(report.exit_code(), EXIT_FAILURE);
    let waited = run.backend.manual_clock().now() - start;
    assert!(waited >= Duration::from_secs(10));
}

#[test]
fn test_unknown_status_text_is_protocol_violation() {
    let mut sim = SimConfig::default();
    sim.faults.status_text = Some("resuming\n".to_string());
    let mut run = create_sim_run(sim);

    let report = run_subtests(&mut run, &[Subtest::Rte], RunOptions::default());

    assert_failed_with(&report, "rte", "unknown runtime PM status");
}

#[test]
fn test_corruption_across_resume_is_detected() {
    let mut sim = SimConfig::default();
    sim.faults.corrupt_on_resume = true;
    let mut run = create_sim_run(sim);

    let report = run_subtests(
        &mut run,
        &[Subtest::GemPread, Subtest::RegisterCompare],
        compare_registers(),
    );

    assert_failed_with(
        &report,
        "gem-pread",
        "gem-pread read while suspended: index 0: expected 0x0, got 0xa5",
    );
    assert_failed_with(&report, "register-compare", "data integrity violation");
}

#[test]
fn test_failure_does_not_stop_later_subtests() {
    let mut sim = SimConfig::default();
    sim.faults.corrupt_on_resume = true;
    let mut run = create_sim_run(sim);

    let report = run_subtests(
        &mut run,
        &[Subtest::GemPread, Subtest::ModesetLpsp],
        RunOptions::default(),
    );

    assert_eq!(report.results.len(), 2);
    assert_passed(&report, "modeset-lpsp");
    assert_eq!(report.exit_code(), EXIT_FAILURE);
}

#[test]
fn test_traversal_reads_tree_and_skips_missing_root() {
    let mut run = create_sim_run(SimConfig::default());
    let report = run_subtests(
        &mut run,
        &[Subtest::DebugfsRead, Subtest::SysfsRead],
        RunOptions::default(),
    );
    assert_passed(&report, "debugfs-read");
    assert_passed(&report, "sysfs-read");

    run.harness.config.sysfs_dir = run.tree.path().join("does-not-exist");
    let report = run_subtests(&mut run, &[Subtest::SysfsRead], RunOptions::default());
    assert_skipped(&report, "sysfs-read");
}

#[test]
fn test_forcewake_hold_keeps_device_awake_then_releases() {
    let mut run = create_sim_run(SimConfig::default());
    let report = run_subtests(
        &mut run,
        &[Subtest::DebugfsForcewakeUser],
        RunOptions::default(),
    );

    assert_passed(&report, "debugfs-forcewake-user");
    let state = run.backend.state();
    assert!(!state.borrow().forcewake_held());
    assert_eq!(state.borrow().power(), SimPower::Suspended);
}

#[test]
fn test_forcewake_skips_when_absent_or_pre_gen6() {
    let sim = SimConfig {
        has_forcewake: false,
        ..SimConfig::default()
    };
    let mut run = create_sim_run(sim);
    let report = run_subtests(
        &mut run,
        &[Subtest::DebugfsForcewakeUser],
        RunOptions::default(),
    );
    assert_skipped(&report, "debugfs-forcewake-user");

    let sim = SimConfig {
        devid: 0x2A42,
        has_pc8: false,
        ..SimConfig::default()
    };
    let mut run = create_sim_run(sim);
    let report = run_subtests(
        &mut run,
        &[Subtest::DebugfsForcewakeUser],
        RunOptions::default(),
    );
    assert_skipped(&report, "debugfs-forcewake-user");
}

#[test]
fn test_i2c_skips_without_adapters() {
    let sim = SimConfig {
        i2c_adapters: false,
        ..SimConfig::default()
    };
    let mut run = create_sim_run(sim);
    let report = run_subtests(&mut run, &[Subtest::I2c], RunOptions::default());
    assert_skipped(&report, "i2c");
}

#[test]
fn test_stress_subtests_submit_every_round() {
    let mut run = create_sim_run(SimConfig::default());
    let report = run_subtests(
        &mut run,
        &[Subtest::GemExecbufStress, Subtest::ModesetLpspStressNoWait],
        RunOptions::default(),
    );

    assert_passed(&report, "gem-execbuf-stress");
    assert_passed(&report, "modeset-lpsp-stress-no-wait");
    assert!(run.backend.state().borrow().batches() >= 50);
}

#[test]
fn test_each_run_leaves_no_gem_objects_behind() {
    let mut run = create_sim_run(SimConfig::default());
    let report = run_subtests(
        &mut run,
        &[
            Subtest::GemMmapCpu,
            Subtest::GemMmapGtt,
            Subtest::GemPread,
            Subtest::GemExecbuf,
            Subtest::GemExecbufStress,
        ],
        RunOptions::default(),
    );

    assert_eq!(report.passed(), 5);
    assert_eq!(run.backend.state().borrow().object_count(), 0);
}

#[test]
fn test_config_file_points_traversal_elsewhere() {
    let tree = create_fake_tree();
    let toml = format!("debugfs_dir = {:?}\n", tree.path().display().to_string());
    let config = HarnessConfig::parse(&toml).unwrap();
    assert_eq!(config.debugfs_dir, config_for_tree(&tree).debugfs_dir);

    let mut backend = SimBackend::new(SimConfig::default());
    let mut harness = Harness::setup(config, &mut backend).unwrap();
    let report = pm_rpm::core::ScenarioRunner::new(&mut harness, RunOptions::default())
        .run_all(&[Subtest::DebugfsRead]);
    assert_passed(&report, "debugfs-read");
}

#[test]
fn test_json_report_carries_outcomes() {
    let mut config = SimConfig::default();
    config.faults.stuck_active = true;
    let mut run = create_sim_run(config);
    let report = run_subtests(
        &mut run,
        &[Subtest::Rte, Subtest::RegisterCompare],
        RunOptions::default(),
    );

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    let results = json["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["name"], "rte");
    assert_eq!(results[0]["outcome"], "fail");
    assert!(results[0]["reason"]
        .as_str()
        .unwrap()
        .contains("timed out waiting for suspended"));
    assert_eq!(results[1]["name"], "register-compare");
    assert_eq!(results[1]["outcome"], "skip");
    assert!(results[0]["started_at"].is_string());
}

#[test]
fn test_gem_workloads_confirm_active_before_writing() {
    let mut sim = SimConfig::default();
    sim.faults.status_text = Some("suspended\n".to_string());
    let mut run = create_sim_run(sim);

    let report = run_subtests(
        &mut run,
        &[Subtest::GemMmapCpu, Subtest::GemPread, Subtest::GemExecbuf],
        RunOptions::default(),
    );

    assert_failed_with(
        &report,
        "gem-mmap-cpu",
        "timed out waiting for active (gem-mmap-cpu active)",
    );
    assert_failed_with(&report, "gem-pread", "timed out waiting for active (gem-pread active)");
    assert_failed_with(&report, "gem-execbuf", "timed out waiting for active (gem-execbuf active)");
    assert_eq!(run.backend.state().borrow().object_count(), 0);
}

#[test]
fn test_resources_equal_confirms_active_after_capture() {
    let mut sim = SimConfig::pc8_only();
    sim.faults.queries_blank_display = true;
    let mut run = create_sim_run(sim);
    assert_eq!(run.harness.oracle.strategy(), Strategy::Residency);

    let report = run_subtests(&mut run, &[Subtest::DrmResourcesEqual], RunOptions::default());

    assert_failed_with(
        &report,
        "drm-resources-equal",
        "timed out waiting for active (drm-resources-equal after active capture)",
    );
}

#[test]
fn test_register_compare_confirms_active_after_capture() {
    let mut sim = SimConfig::pc8_only();
    sim.faults.queries_blank_display = true;
    let mut run = create_sim_run(sim);

    let report = run_subtests(&mut run, &[Subtest::RegisterCompare], compare_registers());

    assert_failed_with(
        &report,
        "register-compare",
        "timed out waiting for active (register-compare after first capture)",
    );
}

#[test]
fn test_i2c_leaves_a_screen_lit() {
    let mut run = create_sim_run(SimConfig::default());

    let report = run_subtests(&mut run, &[Subtest::I2c], RunOptions::default());

    assert_passed(&report, "i2c");
    assert!(run.backend.state().borrow().display_active());
}
