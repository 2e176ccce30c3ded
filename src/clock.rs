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
use std::{error::Error, sync::Arc, time::Duration};

mod monotonic;
mod ticker;

#[cfg(test)]
mod manual;

#[cfg(test)]
pub use manual::ManualClock;
pub use monotonic::MonotonicClock;
pub use ticker::TickerClock;

/// A monotonic microsecond counter. The counter is 32 bits wide and wraps after about 71
/// minutes, which is why it is reset at the start of every song.
pub trait Clock: Send + Sync {
    /// Microseconds since the last reset, wrapping.
    fn now(&self) -> u32;

    /// Restarts the count from zero.
    fn reset(&self);

    /// Gives up the processor for roughly the given number of microseconds.
    fn idle(&self, micros: u32) {
        spin_sleep::sleep(Duration::from_micros(u64::from(micros)));
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> u32 {
        (**self).now()
    }

    fn reset(&self) {
        (**self).reset()
    }

    fn idle(&self, micros: u32) {
        (**self).idle(micros)
    }
}

/// Returns true once the clock has reached the target. A target more than half the counter
/// range ahead is considered to be behind us, as happens when the counter wraps.
pub fn is_due(now: u32, target: u32) -> bool {
    let ahead = target.wrapping_sub(now);
    ahead == 0 || ahead > u32::MAX / 2
}

/// Creates the clock named in the configuration.
pub fn get(name: &str) -> Result<Box<dyn Clock>, Box<dyn Error>> {
    match name {
        "monotonic" => Ok(Box::new(MonotonicClock::new())),
        "ticker" => Ok(Box::new(TickerClock::new(ticker::DEFAULT_PERIOD)?)),
        _ => Err(format!("unknown clock {}", name).into()),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_is_due() {
        assert!(is_due(0, 0));
        assert!(is_due(100, 50));
        assert!(!is_due(50, 100));
        assert!(!is_due(0, u32::MAX / 2));
        assert!(is_due(0, u32::MAX / 2 + 1));

        // A target just past the wrap point is still ahead.
        assert!(!is_due(u32::MAX - 10, 5));
        assert!(is_due(5, u32::MAX - 10));
    }

    #[test]
    fn test_get() {
        assert!(get("monotonic").is_ok());
        assert!(get("ticker").is_ok());
        let err = get("sundial").err().unwrap();
        assert_eq!("unknown clock sundial", err.to_string());
    }

    #[test]
    fn test_shared_clock() {
        let clock = Arc::new(ManualClock::new(0));
        let shared: Box<dyn Clock> = Box::new(clock.clone());

        clock.advance(500);
        assert_eq!(500, shared.now());
        shared.idle(250);
        assert_eq!(750, clock.peek());
        shared.reset();
        assert_eq!(0, clock.peek());
    }
}
