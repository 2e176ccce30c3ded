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
use std::sync::atomic::{AtomicU32, Ordering};

use super::Clock;

/// A clock that only moves when told to. Each read advances it by a fixed step, and idling
/// advances it by the requested amount, so wait loops always make progress.
pub struct ManualClock {
    now: AtomicU32,
    step: u32,
}

impl ManualClock {
    pub fn new(step: u32) -> ManualClock {
        ManualClock {
            now: AtomicU32::new(0),
            step,
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, micros: u32) {
        self.now.fetch_add(micros, Ordering::SeqCst);
    }

    /// Sets the clock to the given value.
    pub fn set(&self, micros: u32) {
        self.now.store(micros, Ordering::SeqCst);
    }

    /// Reads the clock without advancing it.
    pub fn peek(&self) -> u32 {
        self.now.load(Ordering::SeqCst)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u32 {
        self.now.fetch_add(self.step, Ordering::SeqCst)
    }

    fn reset(&self) {
        self.set(0);
    }

    fn idle(&self, micros: u32) {
        self.advance(micros);
    }
}
