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

use std::fs;

use pm_rpm::core::sim::{SimBackend, SimConfig};
use pm_rpm::core::{Harness, HarnessConfig, RunOptions, RunReport, ScenarioRunner, Subtest};
use tempfile::TempDir;

/// A small debugfs/sysfs stand-in: a few files, a nested directory and a
/// symlink back to the root that must not be followed
#[allow(dead_code)]
pub fn create_fake_tree() -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let root = dir.path();
    fs::write(root.join("i915_capabilities"), "gen: 7\n").expect("write");
    fs::write(root.join("i915_gem_objects"), vec![b'x'; 1000]).expect("write");
    fs::create_dir_all(root.join("power/nested")).expect("mkdir");
    fs::write(root.join("power/runtime_status"), "active\n").expect("write");
    fs::write(root.join("power/nested/empty"), "").expect("write");
    #[cfg(unix)]
    std::os::unix::fs::symlink(root, root.join("power/loop")).expect("symlink");
    dir
}

/// Harness configuration whose traversal roots point at `tree`
#[allow(dead_code)]
pub fn config_for_tree(tree: &TempDir) -> HarnessConfig {
    HarnessConfig {
        debugfs_dir: tree.path().to_path_buf(),
        sysfs_dir: tree.path().to_path_buf(),
        ..Default::default()
    }
}

/// Everything a test needs to drive one simulated run
pub struct SimRun {
    pub backend: SimBackend,
    pub harness: Harness,
    pub tree: TempDir,
}

#[allow(dead_code)]
pub fn create_sim_run(sim: SimConfig) -> SimRun {
    let tree = create_fake_tree();
    let mut backend = SimBackend::new(sim);
    let harness =
        Harness::setup(config_for_tree(&tree), &mut backend).expect("Failed to set up harness");
    SimRun {
        backend,
        harness,
        tree,
    }
}

#[allow(dead_code)]
pub fn run_subtests(run: &mut SimRun, subtests: &[Subtest], options: RunOptions) -> RunReport {
    ScenarioRunner::new(&mut run.harness, options).run_all(subtests)
}
