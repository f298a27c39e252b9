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

//! Runtime power management harness
//!
//! - Power plumbing: runtime PM files, PC8+ residency MSRs, the oracle
//! - Device access: KMS, GEM, registers, behind the [`Device`] trait
//! - Harness: setup, transitions, workloads and the subtest runner
//! - Backends: real hardware ([`drm`]) and an in-process simulation ([`sim`])

pub mod config;
pub mod device;
pub mod display;
pub mod drm;
pub mod error;
pub mod gem;
pub mod harness;
pub mod kms;
pub mod oracle;
pub mod registers;
pub mod residency;
pub mod runtime_pm;
pub mod scenario;
pub mod sim;
pub mod timing;
pub mod transition;
pub mod traverse;
pub mod workload;

// Re-export commonly used types
pub use config::HarnessConfig;
pub use device::{Backend, Chipset, Device};
pub use drm::HardwareBackend;
pub use error::{PmError, Result};
pub use harness::Harness;
pub use kms::ScreenType;
pub use oracle::{Capabilities, Strategy, SuspendOracle};
pub use scenario::{RunOptions, RunReport, ScenarioRunner, Subtest};
pub use sim::{SimBackend, SimConfig};
