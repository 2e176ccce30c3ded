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
use std::{
    io,
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use tracing::{debug, error};

use super::Clock;
use crate::thread_priority::promote_current_thread;

/// The default tick period.
pub const DEFAULT_PERIOD: Duration = Duration::from_micros(250);

/// A clock driven by a background tick thread. The thread is the only writer of the
/// counter and only ever stores a larger value; readers never block.
pub struct TickerClock {
    counter: Arc<AtomicU32>,
    /// Counter value at the last reset. Only written by the owner of the clock.
    base: AtomicU32,
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl TickerClock {
    /// Starts a ticker with the given period. Fails if the tick thread can't be started.
    pub fn new(period: Duration) -> io::Result<TickerClock> {
        let counter = Arc::new(AtomicU32::new(0));
        let stop = Arc::new(AtomicBool::new(false));
        let period = period.max(Duration::from_micros(1));

        let join = {
            let counter = counter.clone();
            let stop = stop.clone();
            thread::Builder::new()
                .name("clock-ticker".into())
                .spawn(move || tick(counter, stop, period))?
        };

        Ok(TickerClock {
            counter,
            base: AtomicU32::new(0),
            stop,
            join: Some(join),
        })
    }
}

fn tick(counter: Arc<AtomicU32>, stop: Arc<AtomicBool>, period: Duration) {
    promote_current_thread("clock ticker");
    debug!(period = ?period, "Clock ticker started.");

    let step = period.as_micros() as u32;
    let start = Instant::now();
    let mut next = start + period;
    let mut micros = 0u32;

    while !stop.load(Ordering::Relaxed) {
        spin_sleep::sleep(next.saturating_duration_since(Instant::now()));

        // Catch up on any ticks missed while descheduled.
        let behind = Instant::now().duration_since(next).as_micros() as u32 / step;
        micros = micros.wrapping_add(step.wrapping_mul(behind + 1));
        counter.store(micros, Ordering::Release);
        next += period * (behind + 1);
    }
}

impl Clock for TickerClock {
    fn now(&self) -> u32 {
        self.counter
            .load(Ordering::Acquire)
            .wrapping_sub(self.base.load(Ordering::Relaxed))
    }

    fn reset(&self) {
        self.base
            .store(self.counter.load(Ordering::Acquire), Ordering::Relaxed);
    }
}

impl Drop for TickerClock {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                error!("Clock ticker panicked.");
            }
        }
    }
}
