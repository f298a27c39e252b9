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

//! Hardware Integration Tests
//!
//! These tests run the real subtests against the i915 device of the machine
//! running them.
//!
//! # Requirements
//!
//! Root, an Intel GPU driven by i915, debugfs mounted and the `msr` module
//! loaded on Haswell. Device paths can be overridden with `PM_RPM_*`
//! variables or a `.env` file.
//!
//! # Running
//!
//! ```bash
//! # Run all hardware tests
//! cargo test --test hardware -- --ignored --nocapture
//!
//! # Run a single subtest
//! cargo test --test hardware test_rte -- --ignored --nocapture
//! ```

use pm_rpm::core::scenario::Outcome;
use pm_rpm::core::{
    HardwareBackend, Harness, HarnessConfig, RunOptions, ScenarioRunner, Subtest,
};

fn hardware_harness() -> Option<Harness> {
    let _ = env_logger::builder().is_test(true).try_init();
    dotenvy::dotenv().ok();

    let config = HarnessConfig::resolve(None).expect("Failed to resolve configuration");
    let mut backend = HardwareBackend::new(config.clone());
    match Harness::setup(config, &mut backend) {
        Ok(harness) => Some(harness),
        Err(e) if e.is_skip() => {
            eprintln!("Skipping: {}", e);
            None
        }
        Err(e) => panic!("Setup failed: {}", e),
    }
}

fn run_one(subtest: Subtest) {
    let Some(mut harness) = hardware_harness() else {
        return;
    };
    let mut runner = ScenarioRunner::new(&mut harness, RunOptions::default());
    match runner.run(subtest) {
        Outcome::Pass => {}
        Outcome::Skip(reason) => eprintln!("{} skipped: {}", subtest, reason),
        Outcome::Fail(reason) => panic!("{} failed: {}", subtest, reason),
    }
}

#[test]
#[ignore] // Requires i915 hardware and root
fn test_rte() {
    run_one(Subtest::Rte);
}

#[test]
#[ignore] // Requires i915 hardware and root
fn test_drm_resources_equal() {
    run_one(Subtest::DrmResourcesEqual);
}

#[test]
#[ignore] // Requires i915 hardware and root
fn test_gem_execbuf() {
    run_one(Subtest::GemExecbuf);
}

#[test]
#[ignore] // Requires i915 hardware and root; takes minutes
fn test_full_run() {
    let Some(mut harness) = hardware_harness() else {
        return;
    };
    let report = ScenarioRunner::new(&mut harness, RunOptions::default()).run_all(&Subtest::ALL);
    println!("{}", report.to_json().expect("Failed to serialize report"));
    assert_eq!(report.failed(), 0);
}
