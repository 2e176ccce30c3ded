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
use crate::event::DEFAULT_TEMPO;

/// Converts MIDI ticks into microseconds at the current tempo. Integer arithmetic only: the
/// fractional microsecond left over by each conversion is carried into the next one so that
/// long songs do not drift.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickConverter {
    /// Microseconds per quarter note.
    tempo: u32,
    ticks_per_quarter: u64,
    /// Fraction of a microsecond not yet emitted, in units of 1/ticks_per_quarter.
    remainder: u64,
}

impl TickConverter {
    /// Creates a converter at the given starting tempo.
    pub fn new(tempo: u32, ticks_per_quarter: u16) -> TickConverter {
        TickConverter {
            tempo: tempo.max(1),
            ticks_per_quarter: u64::from(ticks_per_quarter.max(1)),
            remainder: 0,
        }
    }

    /// Returns the number of microseconds the given number of ticks lasts.
    pub fn micros(&mut self, ticks: u32) -> u64 {
        let scaled = u64::from(ticks) * u64::from(self.tempo) + self.remainder;
        self.remainder = scaled % self.ticks_per_quarter;
        scaled / self.ticks_per_quarter
    }

    /// Changes the tempo. Zero is ignored.
    pub fn set_tempo(&mut self, tempo: u32) {
        if tempo > 0 {
            self.tempo = tempo;
        }
    }

    /// The current tempo in microseconds per quarter note.
    pub fn tempo(&self) -> u32 {
        self.tempo
    }

    /// The current tempo in beats per minute.
    pub fn bpm(&self) -> u32 {
        bpm(self.tempo)
    }
}

impl Default for TickConverter {
    fn default() -> Self {
        TickConverter::new(DEFAULT_TEMPO, 96)
    }
}

/// Converts a tempo in microseconds per quarter note to beats per minute.
pub fn bpm(tempo: u32) -> u32 {
    60_000_000 / tempo.max(1)
}
