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

use pm_rpm::core::scenario::{Outcome, RunReport};

fn outcome<'a>(report: &'a RunReport, name: &str) -> &'a Outcome {
    &report
        .results
        .iter()
        .find(|r| r.name == name)
        .unwrap_or_else(|| panic!("Subtest {} did not run", name))
        .outcome
}

#[allow(dead_code)]
pub fn assert_passed(report: &RunReport, name: &str) {
    let actual = outcome(report, name);
    assert_eq!(actual, &Outcome::Pass, "Subtest {} did not pass", name);
}

#[allow(dead_code)]
pub fn assert_skipped(report: &RunReport, name: &str) {
    let actual = outcome(report, name);
    assert!(
        matches!(actual, Outcome::Skip(_)),
        "Subtest {} should skip, got {:?}",
        name,
        actual
    );
}

/// Assert `name` failed with a reason containing `needle`
#[allow(dead_code)]
pub fn assert_failed_with(report: &RunReport, name: &str, needle: &str) {
    match outcome(report, name) {
        Outcome::Fail(reason) => assert!(
            reason.contains(needle),
            "Subtest {} failed with {:?}, expected it to mention {:?}",
            name,
            reason,
            needle
        ),
        other => panic!("Subtest {} should fail, got {:?}", name, other),
    }
}
