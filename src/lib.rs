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

//! Runtime power management test harness for Intel integrated graphics
//!
//! Drives an i915 GPU into runtime suspend, checks that it really got there
//! (through `runtime_status` or the PC8+ residency counters), then wakes it
//! with display, GEM, I2C, debugfs and sysfs traffic and verifies that
//! nothing was lost across the transition.
//!
//! # Example
//!
//! ```
//! use pm_rpm::core::{Harness, HarnessConfig, RunOptions, ScenarioRunner, Subtest};
//! use pm_rpm::core::sim::{SimBackend, SimConfig};
//!
//! let mut backend = SimBackend::new(SimConfig::default());
//! let mut harness = Harness::setup(HarnessConfig::default(), &mut backend).unwrap();
//!
//! let mut runner = ScenarioRunner::new(&mut harness, RunOptions::default());
//! let report = runner.run_all(&[Subtest::Rte, Subtest::GemPread]);
//! assert_eq!(report.failed(), 0);
//! ```

pub mod core;

pub use crate::core::error::{PmError, Result};
