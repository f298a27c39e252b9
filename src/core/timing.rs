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

//! Clocks and deadline polling
//!
//! Every wait in the harness is a busy-poll with a fixed sleep interval and a
//! fixed budget. The kernel's power state machine is an external actor whose
//! state can only be observed by polling, so this module provides the one
//! primitive all waits are built on: [`poll_until`].
//!
//! Time is abstracted behind [`Clock`] so the same polling code runs against
//! real hardware ([`SystemClock`]) and against the simulated device
//! ([`ManualClock`]), where sleeping simply advances virtual time.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use pm_rpm::core::timing::{poll_until, ManualClock, Clock};
//!
//! let clock = ManualClock::new();
//! let mut polls = 0;
//! let hit = poll_until(&clock, Duration::from_millis(100), Duration::from_secs(1), || {
//!     polls += 1;
//!     Ok::<_, pm_rpm::core::PmError>(polls == 3)
//! })
//! .unwrap();
//!
//! assert!(hit);
//! assert_eq!(clock.now(), Duration::from_millis(200));
//! ```

use std::cell::Cell;
use std::time::{Duration, Instant};

/// Poll interval shared by every wait in the harness
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Source of time for polling loops
pub trait Clock {
    /// Monotonic time since the clock was created
    fn now(&self) -> Duration;

    /// Block (or pretend to block) for `duration`
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by [`Instant`] and [`std::thread::sleep`]
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Virtual clock that only moves when somebody sleeps on it
///
/// Used by the simulated device so a 30 second residency wait completes
/// instantly while still observing every intermediate state.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move virtual time forward without a sleeper
    pub fn advance(&self, duration: Duration) {
        self.now.set(self.now.get() + duration);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Poll `predicate` every `interval` until it returns `true` or `timeout`
/// worth of intervals has elapsed
///
/// Returns `Ok(true)` as soon as the predicate holds and `Ok(false)` when the
/// budget runs out. Errors from the predicate end the loop immediately. The
/// budget is counted in intervals, so a slow predicate does not shorten the
/// number of observations.
pub fn poll_until<C, F, E>(
    clock: &C,
    interval: Duration,
    timeout: Duration,
    mut predicate: F,
) -> std::result::Result<bool, E>
where
    C: Clock + ?Sized,
    F: FnMut() -> std::result::Result<bool, E>,
{
    let mut waited = Duration::ZERO;

    while waited < timeout {
        if predicate()? {
            return Ok(true);
        }
        clock.sleep(interval);
        waited += interval;
    }

    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_until_immediate() {
        let clock = ManualClock::new();
        let hit: std::result::Result<bool, ()> =
            poll_until(&clock, POLL_INTERVAL, Duration::from_secs(10), || Ok(true));
        assert_eq!(hit, Ok(true));
        assert_eq!(clock.now(), Duration::ZERO);
    }

    #[test]
    fn test_poll_until_timeout_counts_intervals() {
        let clock = ManualClock::new();
        let mut calls = 0;
        let hit: std::result::Result<bool, ()> =
            poll_until(&clock, POLL_INTERVAL, Duration::from_secs(5), || {
                calls += 1;
                Ok(false)
            });

        assert_eq!(hit, Ok(false));
        assert_eq!(calls, 50);
        assert_eq!(clock.now(), Duration::from_secs(5));
    }

    #[test]
    fn test_poll_until_propagates_error() {
        let clock = ManualClock::new();
        let hit: std::result::Result<bool, &str> =
            poll_until(&clock, POLL_INTERVAL, Duration::from_secs(5), || Err("boom"));
        assert_eq!(hit, Err("boom"));
    }

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new();
        clock.advance(Duration::from_millis(250));
        clock.sleep(Duration::from_millis(250));
        assert_eq!(clock.now(), Duration::from_millis(500));
    }
}
