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

/// Harness error types
use thiserror::Error;

/// Result type for harness operations
pub type Result<T> = std::result::Result<T, PmError>;

/// Main error type for the harness
///
/// The first two variants are skip conditions: the platform or the
/// environment cannot run a subtest, which is not a driver bug. Everything
/// else is fatal and aborts the current subtest.
#[derive(Error, Debug)]
pub enum PmError {
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("precondition missing: {0}")]
    PreconditionMissing(String),

    #[error("timed out waiting for {state} ({context})")]
    Timeout { state: &'static str, context: String },

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("data integrity violation: {0}")]
    DataIntegrity(String),

    #[error("{call} failed: {source}")]
    Driver {
        call: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl PmError {
    /// True for outcomes that should be reported as a skip rather than a failure
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            PmError::UnsupportedPlatform(_) | PmError::PreconditionMissing(_)
        )
    }

    /// Wrap the last OS error of a failed driver call
    pub fn driver(call: &'static str) -> Self {
        PmError::Driver {
            call,
            source: std::io::Error::last_os_error(),
        }
    }

    /// Build a byte/word mismatch error
    pub fn mismatch<T: std::fmt::LowerHex>(
        context: &str,
        index: usize,
        expected: T,
        got: T,
    ) -> Self {
        PmError::DataIntegrity(format!(
            "{context}: index {index}: expected {expected:#x}, got {got:#x}"
        ))
    }
}

/// Skip the current subtest unless `cond` holds
pub fn require(cond: bool, reason: impl Into<String>) -> Result<()> {
    if cond {
        Ok(())
    } else {
        Err(PmError::PreconditionMissing(reason.into()))
    }
}

/// Fail the current subtest with a protocol violation unless `cond` holds
pub fn ensure(cond: bool, what: impl Into<String>) -> Result<()> {
    if cond {
        Ok(())
    } else {
        Err(PmError::ProtocolViolation(what.into()))
    }
}
