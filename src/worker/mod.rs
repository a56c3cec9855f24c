// Copyright 2016 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The scheduler: a `JobQueue` of ready/pending/distributable work, a pool
//! of `WorkerThread`s that drain it, and the `RemoteDispatcher` seam a
//! surrounding tool plugs a real distribution backend into.

pub mod pool;
pub mod queue;
pub mod remote;
pub mod thread;

use std::sync::Mutex;

use crate::system::Timer;

/// Tracks cumulative time spent "memory stressed" across the whole build,
/// shared by every `WorkerThread`. Workers only ever add to the total, and
/// the total is logged (not reset) each time stress clears.
pub struct MemoryStressTracker {
    state: Mutex<MemoryStressState>,
}

struct MemoryStressState {
    /// Seconds-since-timer-start when the current stress episode began, or
    /// `None` if not currently stressed.
    stressed_since: Option<f64>,
    total_stressed_secs: f64,
}

impl MemoryStressTracker {
    pub fn new() -> MemoryStressTracker {
        MemoryStressTracker {
            state: Mutex::new(MemoryStressState {
                stressed_since: None,
                total_stressed_secs: 0.0,
            }),
        }
    }

    /// Checks current memory pressure against `min_percent_available` and
    /// updates the shared accumulator. Returns `true` if the caller should
    /// back off. `min_percent_available == 0` disables the check entirely.
    pub fn poll(&self, min_percent_available: u32, timer: &Timer) -> bool {
        if min_percent_available == 0 {
            return false;
        }

        let (free, total) = crate::system::system_memory_size();
        if total == 0 {
            return false;
        }

        let mut state = self.state.lock().unwrap();
        let now = timer.elapsed_secs();

        if free * 100 < total * u64::from(min_percent_available) {
            if state.stressed_since.is_none() {
                state.stressed_since = Some(now);
            }
            log::warn!(
                "available system memory under {}% ({} / {} mb available)",
                min_percent_available,
                free >> 20,
                total >> 20
            );
            true
        } else {
            if let Some(since) = state.stressed_since.take() {
                let stressed_for = now - since;
                state.total_stressed_secs += stressed_for;
                log::warn!(
                    "system memory recovered after {:.1}s stressed ({:.1}s total this build)",
                    stressed_for,
                    state.total_stressed_secs
                );
            }
            false
        }
    }
}

impl Default for MemoryStressTracker {
    fn default() -> Self {
        MemoryStressTracker::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_check_never_reports_stressed() {
        let tracker = MemoryStressTracker::new();
        let timer = Timer::new();
        assert!(!tracker.poll(0, &timer));
    }
}
