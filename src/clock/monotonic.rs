// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "quanta")]
use quanta::Instant;
#[cfg(not(feature = "quanta"))]
use std::time::Instant;

use super::Clock;

/// A clock read directly from the host's monotonic timer.
pub struct MonotonicClock {
    epoch: Instant,
    /// Microseconds from the epoch to the last reset.
    origin: AtomicU64,
}

impl MonotonicClock {
    pub fn new() -> MonotonicClock {
        MonotonicClock {
            epoch: Instant::now(),
            origin: AtomicU64::new(0),
        }
    }

    fn since_epoch(&self) -> u64 {
        Instant::now().duration_since(self.epoch).as_micros() as u64
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> u32 {
        self.since_epoch()
            .wrapping_sub(self.origin.load(Ordering::Acquire)) as u32
    }

    fn reset(&self) {
        self.origin.store(self.since_epoch(), Ordering::Release);
    }
}
